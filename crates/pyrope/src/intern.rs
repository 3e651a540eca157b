//! String interning for attribute and method names.
//!
//! Class namespaces and instance attribute tables are keyed by `StringId`
//! so attribute resolution compares small integers instead of strings.
//! The table is pre-seeded with [`StaticStrings`]: the special method names
//! the protocol-override dispatch probes on every operation, plus common
//! attribute names. Static ids are stable and can be used in const context.

use ahash::AHashMap;

/// Handle to an interned string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct StringId(u32);

impl StringId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

macro_rules! static_strings {
    ($($variant:ident => $text:literal,)*) => {
        /// Pre-interned strings with fixed ids.
        ///
        /// The discriminant is the `StringId` index, so conversion is free.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[repr(u32)]
        pub enum StaticStrings {
            $($variant,)*
        }

        impl StaticStrings {
            /// All static strings, in id order. Used to seed the interner.
            pub(crate) const ALL: &'static [&'static str] = &[$($text,)*];

            /// Returns the string content.
            #[must_use]
            pub fn as_str(self) -> &'static str {
                Self::ALL[self as usize]
            }
        }

        impl From<StaticStrings> for StringId {
            fn from(s: StaticStrings) -> Self {
                Self(s as u32)
            }
        }
    };
}

static_strings! {
    DunderInit => "__init__",
    DunderCall => "__call__",
    DunderRepr => "__repr__",
    DunderStr => "__str__",
    DunderBool => "__bool__",
    DunderLen => "__len__",
    DunderHash => "__hash__",
    DunderEq => "__eq__",
    DunderNe => "__ne__",
    DunderLt => "__lt__",
    DunderLe => "__le__",
    DunderGt => "__gt__",
    DunderGe => "__ge__",
    DunderAdd => "__add__",
    DunderRadd => "__radd__",
    DunderSub => "__sub__",
    DunderRsub => "__rsub__",
    DunderMul => "__mul__",
    DunderRmul => "__rmul__",
    DunderTruediv => "__truediv__",
    DunderRtruediv => "__rtruediv__",
    DunderFloordiv => "__floordiv__",
    DunderRfloordiv => "__rfloordiv__",
    DunderMod => "__mod__",
    DunderRmod => "__rmod__",
    DunderPow => "__pow__",
    DunderRpow => "__rpow__",
    DunderNeg => "__neg__",
    DunderPos => "__pos__",
    DunderInvert => "__invert__",
    DunderAnd => "__and__",
    DunderRand => "__rand__",
    DunderOr => "__or__",
    DunderRor => "__ror__",
    DunderXor => "__xor__",
    DunderRxor => "__rxor__",
    DunderLshift => "__lshift__",
    DunderRshift => "__rshift__",
    DunderGetitem => "__getitem__",
    DunderSetitem => "__setitem__",
    DunderDelitem => "__delitem__",
    DunderContains => "__contains__",
    DunderIter => "__iter__",
    DunderNext => "__next__",
    DunderName => "__name__",
    DunderSlots => "__slots__",
}

/// Interning table mapping strings to stable `StringId`s.
#[derive(Debug)]
pub struct Interns {
    strings: Vec<Box<str>>,
    lookup: AHashMap<Box<str>, StringId>,
}

impl Interns {
    /// Creates a table seeded with the static strings.
    #[must_use]
    pub fn new() -> Self {
        let mut interns = Self {
            strings: Vec::with_capacity(StaticStrings::ALL.len()),
            lookup: AHashMap::with_capacity(StaticStrings::ALL.len()),
        };
        for &s in StaticStrings::ALL {
            interns.intern(s);
        }
        interns
    }

    /// Interns a string, returning its id (existing id if already present).
    pub fn intern(&mut self, s: &str) -> StringId {
        if let Some(&id) = self.lookup.get(s) {
            return id;
        }
        let id = StringId(u32::try_from(self.strings.len()).unwrap_or(u32::MAX));
        self.strings.push(s.into());
        self.lookup.insert(s.into(), id);
        id
    }

    /// Looks up a string's id without interning it.
    #[must_use]
    pub fn try_get(&self, s: &str) -> Option<StringId> {
        self.lookup.get(s).copied()
    }

    /// Returns the string for an id.
    #[must_use]
    pub fn get_str(&self, id: StringId) -> &str {
        &self.strings[id.index()]
    }

    /// Number of interned strings (static seed included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

impl Default for Interns {
    fn default() -> Self {
        Self::new()
    }
}
