//! Arena storage for heap-allocated values.
//!
//! Values that don't fit in an immediate [`Value`](crate::value::Value) live
//! here, addressed by [`HeapId`]. Allocation goes through the embedder's
//! [`ResourceTracker`], so memory ceilings are enforced at the single choke
//! point every container and object passes through.
//!
//! Reclamation is a mark-sweep pass over the arena: [`Heap::collect_cycles`]
//! marks everything reachable from the roots the caller supplies and frees
//! the rest, which handles reference cycles (`a.partner = b; b.partner = a`)
//! without any per-value bookkeeping.

use crate::{
    exception::ExceptionObject,
    resource::{ResourceError, ResourceTracker},
    sched::Future,
    types::{
        BoundMethod, Bytes, ClassMethod, ClassObject, Complex, Dict, FrozenSet, Instance, List, LongInt, PyTrait, Set,
        Slice, StaticMethod, Str, SuperProxy, Tuple, Type, UserProperty, ValueIter,
    },
    value::Value,
};

/// Unique identifier for values stored inside the heap arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct HeapId(usize);

impl HeapId {
    /// Sentinel id that never names a live slot.
    pub(crate) const INVALID: Self = Self(usize::MAX);

    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// The data stored in a heap slot.
#[derive(Debug)]
pub enum HeapData {
    Str(Str),
    Bytes(Bytes),
    LongInt(LongInt),
    Complex(Complex),
    List(List),
    Tuple(Tuple),
    Dict(Dict),
    Set(Set),
    FrozenSet(FrozenSet),
    Slice(Slice),
    Class(ClassObject),
    Instance(Instance),
    BoundMethod(BoundMethod),
    ClassMethod(ClassMethod),
    StaticMethod(StaticMethod),
    Property(UserProperty),
    Super(SuperProxy),
    Iter(ValueIter),
    Exception(ExceptionObject),
    Future(Future),
}

macro_rules! dispatch {
    ($self:ident, $inner:ident => $body:expr) => {
        match $self {
            HeapData::Str($inner) => $body,
            HeapData::Bytes($inner) => $body,
            HeapData::LongInt($inner) => $body,
            HeapData::Complex($inner) => $body,
            HeapData::List($inner) => $body,
            HeapData::Tuple($inner) => $body,
            HeapData::Dict($inner) => $body,
            HeapData::Set($inner) => $body,
            HeapData::FrozenSet($inner) => $body,
            HeapData::Slice($inner) => $body,
            HeapData::Class($inner) => $body,
            HeapData::Instance($inner) => $body,
            HeapData::BoundMethod($inner) => $body,
            HeapData::ClassMethod($inner) => $body,
            HeapData::StaticMethod($inner) => $body,
            HeapData::Property($inner) => $body,
            HeapData::Super($inner) => $body,
            HeapData::Iter($inner) => $body,
            HeapData::Exception($inner) => $body,
            HeapData::Future($inner) => $body,
        }
    };
}

impl PyTrait for HeapData {
    fn py_type(&self, heap: &Heap<impl ResourceTracker>) -> Type {
        dispatch!(self, inner => inner.py_type(heap))
    }

    fn py_bool(&self, heap: &Heap<impl ResourceTracker>) -> bool {
        dispatch!(self, inner => inner.py_bool(heap))
    }

    fn py_len(&self, heap: &Heap<impl ResourceTracker>) -> Option<usize> {
        dispatch!(self, inner => inner.py_len(heap))
    }

    fn py_hash(&self, heap: &Heap<impl ResourceTracker>) -> Option<u64> {
        dispatch!(self, inner => inner.py_hash(heap))
    }

    fn py_repr(&self, heap: &Heap<impl ResourceTracker>, depth: u16) -> crate::exception::RunResult<String> {
        dispatch!(self, inner => inner.py_repr(heap, depth))
    }

    fn py_estimate_size(&self) -> usize {
        dispatch!(self, inner => inner.py_estimate_size())
    }

    fn collect_child_ids(&self, ids: &mut Vec<HeapId>) {
        dispatch!(self, inner => inner.collect_child_ids(ids))
    }
}

/// The arena. Generic over the embedder's resource tracker.
#[derive(Debug)]
pub struct Heap<T: ResourceTracker> {
    /// Slot storage; `None` marks a freed slot awaiting reuse.
    entries: Vec<Option<HeapData>>,
    /// Freed slot ids available for reuse.
    free_list: Vec<HeapId>,
    tracker: T,
    /// Bumped on every class-namespace mutation; memoized attribute
    /// resolutions are valid only while their recorded epoch matches.
    class_epoch: u64,
}

impl<T: ResourceTracker> Heap<T> {
    pub fn new(tracker: T) -> Self {
        Self {
            entries: Vec::new(),
            free_list: Vec::new(),
            tracker,
            class_epoch: 0,
        }
    }

    /// Allocates heap data, returning its id.
    ///
    /// Fails when the resource tracker rejects the allocation.
    pub fn allocate(&mut self, data: HeapData) -> Result<HeapId, ResourceError> {
        self.tracker.on_allocate(|| data.py_estimate_size())?;
        if let Some(id) = self.free_list.pop() {
            self.entries[id.index()] = Some(data);
            Ok(id)
        } else {
            let id = HeapId(self.entries.len());
            self.entries.push(Some(data));
            Ok(id)
        }
    }

    /// Allocates a string value.
    pub fn allocate_str(&mut self, s: String) -> Result<HeapId, ResourceError> {
        self.allocate(HeapData::Str(Str::from(s)))
    }

    /// Allocates a tuple value.
    pub fn allocate_tuple(&mut self, values: Vec<Value>) -> Result<HeapId, ResourceError> {
        self.allocate(HeapData::Tuple(Tuple::new(values)))
    }

    /// Allocates a list value.
    pub fn allocate_list(&mut self, values: Vec<Value>) -> Result<HeapId, ResourceError> {
        self.allocate(HeapData::List(List::new(values)))
    }

    /// Returns a reference to the heap data stored at the given id.
    ///
    /// # Panics
    /// Panics if the id is invalid or the value has already been freed.
    #[must_use]
    pub fn get(&self, id: HeapId) -> &HeapData {
        self.entries
            .get(id.index())
            .expect("Heap::get: slot missing")
            .as_ref()
            .expect("Heap::get: object already freed")
    }

    /// Returns a mutable reference to the heap data stored at the given id.
    ///
    /// # Panics
    /// Panics if the id is invalid or the value has already been freed.
    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        self.entries
            .get_mut(id.index())
            .expect("Heap::get_mut: slot missing")
            .as_mut()
            .expect("Heap::get_mut: object already freed")
    }

    /// Returns the heap data if the slot is live, `None` otherwise.
    #[must_use]
    pub fn get_if_live(&self, id: HeapId) -> Option<&HeapData> {
        self.entries.get(id.index())?.as_ref()
    }

    /// Current class-mutation epoch.
    #[must_use]
    pub fn class_epoch(&self) -> u64 {
        self.class_epoch
    }

    /// Invalidates all memoized class-attribute resolutions.
    pub fn bump_class_epoch(&mut self) {
        self.class_epoch = self.class_epoch.wrapping_add(1);
    }

    /// Number of live heap objects.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.entries.len() - self.free_list.len()
    }

    /// Mark-sweep collection: frees every heap object not reachable from
    /// `roots` and returns the number of objects freed.
    ///
    /// The caller must supply every root it still holds ids into: globals,
    /// the value being operated on, and any scheduler-held task state.
    pub fn collect_cycles(&mut self, roots: impl IntoIterator<Item = HeapId>) -> usize {
        let mut marked = vec![false; self.entries.len()];
        let mut worklist: Vec<HeapId> = roots.into_iter().collect();
        let mut children = Vec::new();

        while let Some(id) = worklist.pop() {
            let index = id.index();
            if index >= marked.len() || marked[index] {
                continue;
            }
            marked[index] = true;
            if let Some(data) = &self.entries[index] {
                children.clear();
                data.collect_child_ids(&mut children);
                worklist.extend_from_slice(&children);
            }
        }

        let mut freed = 0;
        for (index, entry) in self.entries.iter_mut().enumerate() {
            if !marked[index]
                && let Some(data) = entry.take()
            {
                self.tracker.on_free(data.py_estimate_size());
                self.free_list.push(HeapId(index));
                freed += 1;
            }
        }
        freed
    }
}
