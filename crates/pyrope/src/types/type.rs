use strum::EnumString;

use crate::exception::ExcType;

/// Kind tag for a runtime value.
///
/// Used for type inspection, diagnostics, and isinstance checks against
/// builtin kinds. User-defined classes are all tagged `Object`/`Instance`
/// at this level; their identity lives in the class model.
#[derive(Debug, Clone, Copy, EnumString, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum Type {
    Type,
    NoneType,
    Bool,
    Int,
    Float,
    Complex,
    Slice,
    Str,
    Bytes,
    List,
    Tuple,
    Dict,
    Set,
    FrozenSet,
    #[strum(disabled)]
    Exception(ExcType),
    Function,
    BuiltinFunction,
    Method,
    ClassMethod,
    StaticMethod,
    Property,
    Super,
    #[strum(serialize = "iter")]
    Iterator,
    Future,
    Object,
}

impl Type {
    /// Returns the kind's display name, e.g. `"int"` or `"ZeroDivisionError"`.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Type => "type",
            Self::NoneType => "NoneType",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Complex => "complex",
            Self::Slice => "slice",
            Self::Str => "str",
            Self::Bytes => "bytes",
            Self::List => "list",
            Self::Tuple => "tuple",
            Self::Dict => "dict",
            Self::Set => "set",
            Self::FrozenSet => "frozenset",
            Self::Exception(exc_type) => exc_type.name(),
            Self::Function => "function",
            Self::BuiltinFunction => "builtin_function_or_method",
            Self::Method => "method",
            Self::ClassMethod => "classmethod",
            Self::StaticMethod => "staticmethod",
            Self::Property => "property",
            Self::Super => "super",
            Self::Iterator => "iterator",
            Self::Future => "Future",
            Self::Object => "object",
        }
    }

    /// Checks whether a value of this kind is an instance of `other`.
    ///
    /// Encodes the builtin subkind relationships: bool is a subkind of int,
    /// exception kinds follow the taxonomy chain, and every kind is an
    /// instance of `object`.
    #[must_use]
    pub fn is_instance_of(self, other: Self) -> bool {
        if other == Self::Object {
            return true;
        }
        if self == other {
            return true;
        }
        match (self, other) {
            (Self::Bool, Self::Int) => true,
            (Self::Exception(sub), Self::Exception(sup)) => sub.is_subclass_of(sup),
            _ => false,
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_is_subkind_of_int() {
        assert!(Type::Bool.is_instance_of(Type::Int));
        assert!(!Type::Int.is_instance_of(Type::Bool));
        assert_ne!(Type::Bool, Type::Int);
    }

    #[test]
    fn test_everything_is_object() {
        assert!(Type::Dict.is_instance_of(Type::Object));
        assert!(Type::NoneType.is_instance_of(Type::Object));
    }

    #[test]
    fn test_exception_kind_chain() {
        let key = Type::Exception(ExcType::KeyError);
        assert!(key.is_instance_of(Type::Exception(ExcType::LookupError)));
        assert!(!key.is_instance_of(Type::Exception(ExcType::IndexError)));
    }

    #[test]
    fn test_parse_from_name() {
        assert_eq!("frozenset".parse::<Type>().unwrap(), Type::FrozenSet);
        assert_eq!("int".parse::<Type>().unwrap(), Type::Int);
    }
}
