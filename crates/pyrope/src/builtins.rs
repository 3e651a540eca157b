//! Builtin callables: functions, kind constructors, and exception kinds.
//!
//! A builtin is an immediate [`Value`] variant, so `len`, `int`, and
//! `ValueError` are ordinary values that can be stored, passed, and called.
//! The pure protocol functions live here; kind construction (calling `int`,
//! `list`, etc.) and printing are runtime entry points because they drive
//! iteration and allocation through the runtime.

use num_traits::Signed;

use crate::{
    exception::{ExcType, RunResult},
    heap::{Heap, HeapData},
    resource::ResourceTracker,
    types::{LongInt, Type, ValueIter},
    value::Value,
};

/// The builtin callables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Builtins {
    Len,
    Repr,
    Hash,
    Abs,
    IsInstance,
    IsSubclass,
    Iter,
    Next,
    /// A builtin kind used as a constructor and isinstance target.
    Kind(Type),
    /// An exception kind used as a constructor and except-clause target.
    Exc(ExcType),
}

impl Builtins {
    /// The name the callable goes by, e.g. `"len"` or `"ValueError"`.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Len => "len",
            Self::Repr => "repr",
            Self::Hash => "hash",
            Self::Abs => "abs",
            Self::IsInstance => "isinstance",
            Self::IsSubclass => "issubclass",
            Self::Iter => "iter",
            Self::Next => "next",
            Self::Kind(t) => t.name(),
            Self::Exc(e) => e.name(),
        }
    }

    /// The kind of the builtin itself (functions vs class objects).
    #[must_use]
    pub fn value_type(self) -> Type {
        match self {
            Self::Kind(_) | Self::Exc(_) => Type::Type,
            _ => Type::BuiltinFunction,
        }
    }

    #[must_use]
    pub fn repr(self) -> String {
        match self {
            Self::Kind(_) | Self::Exc(_) => format!("<class '{}'>", self.name()),
            _ => format!("<built-in function {}>", self.name()),
        }
    }
}

/// `len(value)`: the element count, failing for kinds without a length.
pub(crate) fn builtin_len(value: &Value, heap: &Heap<impl ResourceTracker>) -> RunResult<Value> {
    match value.py_len(heap) {
        Some(len) => Ok(Value::Int(len as i64)),
        None => Err(ExcType::type_error(format!(
            "object of type '{}' has no len()",
            value.py_type(heap).name()
        ))),
    }
}

/// `hash(value)`, failing for unhashable kinds.
pub(crate) fn builtin_hash(value: &Value, heap: &Heap<impl ResourceTracker>) -> RunResult<Value> {
    match value.py_hash(heap) {
        Some(h) => Ok(Value::Int(i64::from_ne_bytes(h.to_ne_bytes()))),
        None => Err(ExcType::type_error(format!(
            "unhashable type: '{}'",
            value.py_type(heap).name()
        ))),
    }
}

/// `abs(value)` over the numeric tower.
pub(crate) fn builtin_abs(value: &Value, heap: &mut Heap<impl ResourceTracker>) -> RunResult<Value> {
    match value {
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Int(i) => match i.checked_abs() {
            Some(a) => Ok(Value::Int(a)),
            None => Ok(LongInt::new(-num_bigint::BigInt::from(*i)).into_value(heap)?),
        },
        Value::Float(f) => Ok(Value::Float(f.abs())),
        Value::Ref(id) => {
            let result = match heap.get(*id) {
                HeapData::LongInt(l) => Some(LongInt::new(l.0.abs())),
                HeapData::Complex(c) => return Ok(Value::Float(c.magnitude())),
                _ => None,
            };
            match result {
                Some(l) => Ok(l.into_value(heap)?),
                None => Err(bad_operand("abs()", value, heap)),
            }
        }
        _ => Err(bad_operand("abs()", value, heap)),
    }
}

/// `iter(value)`: a fresh iterator over a native container.
pub(crate) fn builtin_iter(value: &Value, heap: &mut Heap<impl ResourceTracker>) -> RunResult<Value> {
    let Value::Ref(id) = value else {
        return Err(ExcType::type_error(format!(
            "'{}' object is not iterable",
            value.py_type(heap).name()
        )));
    };
    // iter(iterator) is the iterator itself.
    if matches!(heap.get(*id), HeapData::Iter(_)) {
        return Ok(*value);
    }
    let iter = ValueIter::over(*id, heap)?;
    Ok(Value::Ref(heap.allocate(HeapData::Iter(iter))?))
}

/// `next(iterator)`: the next element, converting in-band exhaustion to
/// `StopIteration` at this boundary only.
pub(crate) fn builtin_next(value: &Value, heap: &mut Heap<impl ResourceTracker>) -> RunResult<Value> {
    advance_iterator(value, heap)?.ok_or_else(ExcType::stop_iteration)
}

/// Advances an iterator value, yielding `Ok(None)` on exhaustion.
///
/// This is the native stepping primitive: loops consume it directly and
/// never see `StopIteration`.
pub(crate) fn advance_iterator(
    value: &Value,
    heap: &mut Heap<impl ResourceTracker>,
) -> RunResult<Option<Value>> {
    let Value::Ref(id) = value else {
        return Err(not_an_iterator(value, heap));
    };
    if !matches!(heap.get(*id), HeapData::Iter(_)) {
        return Err(not_an_iterator(value, heap));
    }
    // Two-phase: take the cursor step with a mutable borrow of just the
    // iterator, then let it allocate through the heap.
    let mut iter = match std::mem::replace(heap.get_mut(*id), HeapData::Iter(ValueIter::detached())) {
        HeapData::Iter(iter) => iter,
        _ => unreachable!(),
    };
    let result = iter.next_value(heap);
    *heap.get_mut(*id) = HeapData::Iter(iter);
    result
}

fn not_an_iterator(value: &Value, heap: &Heap<impl ResourceTracker>) -> crate::exception::RunError {
    ExcType::type_error(format!("'{}' object is not an iterator", value.py_type(heap).name()))
}

fn bad_operand(func: &str, value: &Value, heap: &Heap<impl ResourceTracker>) -> crate::exception::RunError {
    ExcType::type_error(format!("bad operand type for {func}: '{}'", value.py_type(heap).name()))
}

/// `isinstance(value, classinfo)`.
///
/// `classinfo` may be a builtin kind, an exception kind, a user class, or a
/// tuple of any of these. Builtin subkind relationships hold (`True` is an
/// instance of `int`); user-class checks walk the instance's MRO.
pub(crate) fn isinstance(
    value: &Value,
    classinfo: &Value,
    heap: &Heap<impl ResourceTracker>,
) -> RunResult<bool> {
    match classinfo {
        Value::Builtin(Builtins::Kind(t)) => Ok(value.py_type(heap).is_instance_of(*t)),
        Value::Builtin(Builtins::Exc(et)) => match value.py_type(heap) {
            Type::Exception(kind) => Ok(kind.is_subclass_of(*et)),
            _ => Ok(false),
        },
        Value::Ref(info_id) => match heap.get(*info_id) {
            HeapData::Class(_) => {
                let Value::Ref(value_id) = value else {
                    return Ok(false);
                };
                let HeapData::Instance(instance) = heap.get(*value_id) else {
                    return Ok(false);
                };
                let HeapData::Class(cls) = heap.get(instance.class_id()) else {
                    return Ok(false);
                };
                Ok(cls.has_ancestor(instance.class_id(), *info_id))
            }
            HeapData::Tuple(options) => {
                for option in options.as_slice() {
                    if isinstance(value, option, heap)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            _ => Err(isinstance_arg_error("isinstance")),
        },
        _ => Err(isinstance_arg_error("isinstance")),
    }
}

/// `issubclass(cls, classinfo)`.
pub(crate) fn issubclass(cls: &Value, classinfo: &Value, heap: &Heap<impl ResourceTracker>) -> RunResult<bool> {
    // Tuple classinfo: any match wins.
    if let Value::Ref(id) = classinfo
        && let HeapData::Tuple(options) = heap.get(*id)
    {
        for option in options.as_slice() {
            if issubclass(cls, option, heap)? {
                return Ok(true);
            }
        }
        return Ok(false);
    }

    match (cls, classinfo) {
        (Value::Builtin(Builtins::Kind(sub)), Value::Builtin(Builtins::Kind(sup))) => Ok(sub.is_instance_of(*sup)),
        (Value::Builtin(Builtins::Exc(sub)), Value::Builtin(Builtins::Exc(sup))) => Ok(sub.is_subclass_of(*sup)),
        (Value::Builtin(Builtins::Exc(_)), Value::Builtin(Builtins::Kind(sup))) => Ok(*sup == Type::Object),
        (Value::Builtin(Builtins::Kind(_) | Builtins::Exc(_)), Value::Ref(sup_id)) => {
            match heap.get(*sup_id) {
                HeapData::Class(_) => Ok(false),
                _ => Err(isinstance_arg_error("issubclass")),
            }
        }
        (Value::Ref(sub_id), _) => {
            let HeapData::Class(sub) = heap.get(*sub_id) else {
                return Err(ExcType::type_error("issubclass() arg 1 must be a class"));
            };
            match classinfo {
                // Every class descends from object.
                Value::Builtin(Builtins::Kind(sup)) => Ok(*sup == Type::Object),
                Value::Builtin(Builtins::Exc(_)) => Ok(false),
                Value::Ref(sup_id) => match heap.get(*sup_id) {
                    HeapData::Class(_) => Ok(sub.has_ancestor(*sub_id, *sup_id)),
                    _ => Err(isinstance_arg_error("issubclass")),
                },
                _ => Err(isinstance_arg_error("issubclass")),
            }
        }
        _ => Err(ExcType::type_error("issubclass() arg 1 must be a class")),
    }
}

fn isinstance_arg_error(func: &str) -> crate::exception::RunError {
    ExcType::type_error(format!("{func}() arg 2 must be a type or tuple of types"))
}
