/// Type definitions for runtime values.
///
/// This module contains structured types that wrap heap-allocated data
/// and provide the shared value protocol for operations like length,
/// truthiness, hashing, and display.
pub mod bytes;
pub mod class;
pub mod complex;
pub mod dict;
pub mod iter;
pub mod list;
pub mod long_int;
pub mod py_trait;
pub mod set;
pub mod slice;
pub mod str;
pub mod tuple;
pub mod r#type;

pub(crate) use bytes::Bytes;
pub(crate) use class::{
    BoundMethod, ClassMethod, ClassObject, Instance, StaticMethod, SuperProxy, UserProperty, compute_c3_mro,
    resolve_class_attr, resolve_super_attr,
};
pub(crate) use complex::Complex;
pub(crate) use dict::Dict;
pub(crate) use iter::{IterTarget, ValueIter};
pub(crate) use list::{List, normalize_sequence_index};
pub(crate) use long_int::LongInt;
pub(crate) use py_trait::PyTrait;
pub(crate) use r#type::Type;
pub(crate) use set::{FrozenSet, Set, SetStorage};
pub(crate) use slice::Slice;
pub(crate) use str::Str;
pub(crate) use tuple::Tuple;
