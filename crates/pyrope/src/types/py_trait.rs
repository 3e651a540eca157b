use crate::{
    exception::RunResult,
    heap::{Heap, HeapId},
    resource::ResourceTracker,
    types::Type,
};

/// Common capability interface implemented by every runtime value kind.
///
/// These are the read-only protocol operations that never dispatch through
/// the class model: kind inspection, truthiness, length, hashing, repr, and
/// GC child enumeration. Instance overrides of truthiness/repr/etc. are
/// applied a layer up, in the runtime entry points; by the time a call
/// reaches `PyTrait` the receiver's native semantics apply.
///
/// Operations a kind does not support have fail-loud defaults at the runtime
/// layer; here the convention is `Option` (`py_len`/`py_hash` return `None`
/// for kinds without a length / unhashable kinds).
pub(crate) trait PyTrait {
    /// Returns the kind tag of this value.
    fn py_type(&self, heap: &Heap<impl ResourceTracker>) -> Type;

    /// Returns the truthiness of this value.
    ///
    /// Numeric zero, empty containers, and `None` are falsy; everything
    /// else is truthy.
    fn py_bool(&self, heap: &Heap<impl ResourceTracker>) -> bool;

    /// Returns the number of elements, or `None` if the kind has no length.
    fn py_len(&self, heap: &Heap<impl ResourceTracker>) -> Option<usize>;

    /// Returns the value's hash, or `None` if the kind is unhashable.
    ///
    /// Invariant: values that compare equal hash equal, across kinds
    /// (bool/int/float at the same mathematical value share a hash).
    fn py_hash(&self, heap: &Heap<impl ResourceTracker>) -> Option<u64>;

    /// Writes the debug representation.
    ///
    /// `depth` guards self-referential containers; implementations
    /// recursing into children must pass `depth + 1` and fail with
    /// `RecursionError` past the cap.
    fn py_repr(&self, heap: &Heap<impl ResourceTracker>, depth: u16) -> RunResult<String>;

    /// Approximate heap footprint in bytes, for resource tracking.
    fn py_estimate_size(&self) -> usize;

    /// Appends the heap ids this value references, for cycle collection.
    fn collect_child_ids(&self, ids: &mut Vec<HeapId>);
}
