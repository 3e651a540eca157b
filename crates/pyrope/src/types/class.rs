//! Class objects, instances, and descriptors.
//!
//! `ClassObject` represents a class created by evaluating a class body.
//! `Instance` represents values created by calling the class. Multiple
//! inheritance is linearized once at class-creation time with the classic
//! C3 merge; attribute resolution walks the cached linearization.
//!
//! # Attribute Access
//!
//! - Instance attributes are checked first, then class attributes via MRO
//! - Class attributes are shared across all instances
//! - Setting an attribute on an instance creates an instance-level attribute
//!   (or writes the named slot when the class declares a fixed slot layout)
//!
//! Descriptor binding (bound/class/static methods, properties, super proxy)
//! is applied by the runtime entry points; this module stores the raw data
//! and performs raw resolution.

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    exception::{ExcType, RunResult},
    heap::{Heap, HeapData, HeapId},
    intern::StringId,
    resource::{MAX_INHERITANCE_DEPTH, ResourceTracker},
    types::{PyTrait, Type},
    value::Value,
};

/// A class object: name, direct bases, namespace, and cached linearization.
#[derive(Debug)]
pub struct ClassObject {
    /// The class name (e.g., "Shape", "Circle").
    name: Box<str>,
    /// Class namespace containing class attributes and method definitions.
    namespace: IndexMap<StringId, Value>,
    /// Direct base classes, in declaration order. Empty for root classes.
    bases: Vec<HeapId>,
    /// Method Resolution Order computed by C3 linearization.
    /// Includes this class itself as the first entry.
    mro: Vec<HeapId>,
    /// Fixed slot layout restricting instances to a closed set of named
    /// fields, including inherited slots. `None` means open attribute table.
    slot_layout: Option<Vec<StringId>>,
    /// Memoized attribute resolution: name -> defining class in the MRO.
    /// Entries are valid only while their epoch matches the heap's class
    /// epoch, which bumps on any class-namespace mutation.
    resolution_cache: AHashMap<StringId, CachedResolution>,
}

#[derive(Debug, Clone, Copy)]
struct CachedResolution {
    epoch: u64,
    defining: Option<HeapId>,
}

impl ClassObject {
    /// Creates a class object. The MRO is set after allocation (it contains
    /// the class's own heap id) via [`ClassObject::set_mro`].
    #[must_use]
    pub fn new(name: impl Into<Box<str>>, namespace: IndexMap<StringId, Value>, bases: Vec<HeapId>) -> Self {
        Self {
            name: name.into(),
            namespace,
            bases,
            mro: Vec::new(),
            slot_layout: None,
            resolution_cache: AHashMap::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn bases(&self) -> &[HeapId] {
        &self.bases
    }

    /// Returns the MRO; the first element is always this class itself.
    #[must_use]
    pub fn mro(&self) -> &[HeapId] {
        &self.mro
    }

    /// Sets the MRO after initial allocation, once the class's heap id is known.
    pub fn set_mro(&mut self, mro: Vec<HeapId>) {
        self.mro = mro;
    }

    /// Declares the fixed slot layout (own plus inherited slot names).
    pub fn set_slot_layout(&mut self, layout: Vec<StringId>) {
        self.slot_layout = Some(layout);
    }

    #[must_use]
    pub fn slot_layout(&self) -> Option<&[StringId]> {
        self.slot_layout.as_deref()
    }

    /// Returns the slot index for a name, if the class declares slots and
    /// the name is one of them.
    #[must_use]
    pub fn slot_index(&self, name: StringId) -> Option<usize> {
        self.slot_layout.as_ref()?.iter().position(|&s| s == name)
    }

    /// Looks up a name in this class's own namespace only (no MRO walk).
    #[must_use]
    pub fn get_own(&self, name: StringId) -> Option<Value> {
        self.namespace.get(&name).copied()
    }

    /// Sets a class attribute. The caller must bump the heap's class epoch
    /// to invalidate memoized resolutions.
    pub fn set_own(&mut self, name: StringId, value: Value) {
        self.namespace.insert(name, value);
    }

    /// Removes a class attribute; true if it existed.
    pub fn delete_own(&mut self, name: StringId) -> bool {
        self.namespace.shift_remove(&name).is_some()
    }

    /// Namespace entries in definition order.
    #[must_use]
    pub fn namespace_entries(&self) -> Vec<(StringId, Value)> {
        self.namespace.iter().map(|(&k, &v)| (k, v)).collect()
    }

    fn cached_resolution(&self, name: StringId, epoch: u64) -> Option<Option<HeapId>> {
        let cached = self.resolution_cache.get(&name)?;
        (cached.epoch == epoch).then_some(cached.defining)
    }

    fn cache_resolution(&mut self, name: StringId, epoch: u64, defining: Option<HeapId>) {
        self.resolution_cache.insert(name, CachedResolution { epoch, defining });
    }

    /// Checks whether `ancestor_id` appears in this class's MRO.
    #[must_use]
    pub fn has_ancestor(&self, self_id: HeapId, ancestor_id: HeapId) -> bool {
        self_id == ancestor_id || self.mro.contains(&ancestor_id)
    }
}

/// Computes the C3 linearization for a new class.
///
/// Merges each base's own linearization plus the literal list of bases,
/// repeatedly selecting the first candidate head that does not occur in the
/// tail of any remaining list. If no valid head exists the hierarchy is
/// inconsistent and class creation fails.
pub fn compute_c3_mro(self_id: HeapId, bases: &[HeapId], heap: &Heap<impl ResourceTracker>) -> RunResult<Vec<HeapId>> {
    if bases.is_empty() {
        return Ok(vec![self_id]);
    }

    // A class cannot inherit from itself.
    if bases.contains(&self_id) {
        return Err(ExcType::type_error("a class cannot inherit from itself"));
    }

    let mut linearizations: Vec<Vec<HeapId>> = Vec::with_capacity(bases.len() + 1);
    for &base_id in bases {
        match heap.get(base_id) {
            HeapData::Class(cls) => linearizations.push(cls.mro().to_vec()),
            _ => return Err(ExcType::type_error("bases must be classes")),
        }
    }
    for lin in &linearizations {
        if lin.len() > MAX_INHERITANCE_DEPTH {
            return Err(ExcType::type_error(format!(
                "inheritance chain too deep (maximum depth {MAX_INHERITANCE_DEPTH})"
            )));
        }
    }

    // The list of bases itself is the last sequence to merge; it enforces
    // local precedence order.
    linearizations.push(bases.to_vec());

    let mut result = vec![self_id];
    loop {
        linearizations.retain(|l| !l.is_empty());
        if linearizations.is_empty() {
            break;
        }

        // A good head is a class that does not appear in the tail of any list.
        let mut found = None;
        for lin in &linearizations {
            let candidate = lin[0];
            let in_tail = linearizations.iter().any(|other| other[1..].contains(&candidate));
            if !in_tail {
                found = Some(candidate);
                break;
            }
        }

        if let Some(next) = found {
            result.push(next);
            for lin in &mut linearizations {
                if lin.first() == Some(&next) {
                    lin.remove(0);
                }
            }
        } else {
            let base_names: Vec<&str> = bases
                .iter()
                .map(|&id| match heap.get(id) {
                    HeapData::Class(cls) => cls.name(),
                    _ => "?",
                })
                .collect();
            return Err(ExcType::type_error(format!(
                "cannot create a consistent method resolution order (MRO) for bases {}",
                base_names.join(", ")
            )));
        }
    }
    Ok(result)
}

/// Resolves an attribute on a class by walking its MRO.
///
/// Returns the raw namespace entry of the first defining class, together
/// with that class's id, or `None` if the name is absent everywhere.
/// Resolutions are memoized per (class, name) and invalidated by the heap's
/// class epoch when any class namespace mutates.
pub(crate) fn resolve_class_attr(
    heap: &mut Heap<impl ResourceTracker>,
    class_id: HeapId,
    name: StringId,
) -> RunResult<Option<(HeapId, Value)>> {
    let epoch = heap.class_epoch();
    let (mro, cached) = match heap.get(class_id) {
        HeapData::Class(cls) => (cls.mro().to_vec(), cls.cached_resolution(name, epoch)),
        other => {
            return Err(ExcType::type_error(format!(
                "attribute resolution on non-class '{}'",
                other.py_type(heap).name()
            )));
        }
    };

    if let Some(defining) = cached {
        return Ok(defining.and_then(|def_id| match heap.get(def_id) {
            HeapData::Class(cls) => cls.get_own(name).map(|v| (def_id, v)),
            _ => None,
        }));
    }

    let mut resolved = None;
    for &candidate_id in &mro {
        if let HeapData::Class(cls) = heap.get(candidate_id)
            && let Some(value) = cls.get_own(name)
        {
            resolved = Some((candidate_id, value));
            break;
        }
    }

    if let HeapData::Class(cls) = heap.get_mut(class_id) {
        cls.cache_resolution(name, epoch, resolved.map(|(id, _)| id));
    }
    Ok(resolved)
}

/// Resolves an attribute for a super proxy: a linear walk starting at the
/// first direct base of the named class (not a full MRO continuation).
pub(crate) fn resolve_super_attr(
    heap: &Heap<impl ResourceTracker>,
    class_id: HeapId,
    name: StringId,
) -> Option<(HeapId, Value)> {
    let HeapData::Class(cls) = heap.get(class_id) else {
        return None;
    };
    let mut pending: Vec<HeapId> = cls.bases().to_vec();
    let mut visited: Vec<HeapId> = Vec::new();
    while !pending.is_empty() {
        let candidate_id = pending.remove(0);
        if visited.contains(&candidate_id) {
            continue;
        }
        visited.push(candidate_id);
        if let HeapData::Class(base) = heap.get(candidate_id) {
            if let Some(value) = base.get_own(name) {
                return Some((candidate_id, value));
            }
            // Continue one step above: the base's own bases, in order.
            for (i, &b) in base.bases().iter().enumerate() {
                pending.insert(i, b);
            }
        }
    }
    None
}

/// An instance of a user-defined class.
#[derive(Debug)]
pub struct Instance {
    /// Back-reference to the class this instance was created from.
    class_id: HeapId,
    /// Per-instance attribute table, in assignment order.
    /// Unused (left empty) when the class declares a slot layout.
    attrs: IndexMap<StringId, Value>,
    /// Named slot storage when the class declares a fixed layout;
    /// `None` entries are unset slots.
    slots: Option<Box<[Option<Value>]>>,
}

impl Instance {
    /// Creates an instance; `slot_count` comes from the class's slot layout.
    #[must_use]
    pub fn new(class_id: HeapId, slot_count: Option<usize>) -> Self {
        Self {
            class_id,
            attrs: IndexMap::new(),
            slots: slot_count.map(|n| vec![None; n].into_boxed_slice()),
        }
    }

    #[must_use]
    pub fn class_id(&self) -> HeapId {
        self.class_id
    }

    #[must_use]
    pub fn has_slots(&self) -> bool {
        self.slots.is_some()
    }

    /// Reads an instance attribute from the open attribute table.
    #[must_use]
    pub fn get_attr(&self, name: StringId) -> Option<Value> {
        self.attrs.get(&name).copied()
    }

    pub fn set_attr(&mut self, name: StringId, value: Value) {
        self.attrs.insert(name, value);
    }

    /// Removes an instance attribute; true if it existed.
    pub fn delete_attr(&mut self, name: StringId) -> bool {
        self.attrs.shift_remove(&name).is_some()
    }

    /// Reads a slot by layout index; `None` when the slot is unset.
    #[must_use]
    pub fn get_slot(&self, index: usize) -> Option<Value> {
        self.slots.as_ref().and_then(|s| s.get(index).copied().flatten())
    }

    pub fn set_slot(&mut self, index: usize, value: Value) {
        if let Some(slots) = &mut self.slots {
            slots[index] = Some(value);
        }
    }

    /// Clears a slot; true if it was set.
    pub fn delete_slot(&mut self, index: usize) -> bool {
        match &mut self.slots {
            Some(slots) if slots.get(index).is_some_and(Option::is_some) => {
                slots[index] = None;
                true
            }
            _ => false,
        }
    }
}

/// A method bound to its receiver: calling it prepends the receiver.
#[derive(Debug, Clone, Copy)]
pub struct BoundMethod {
    pub receiver: Value,
    pub func: Value,
}

/// Wraps a callable so reading it off a class binds the class, not the instance.
#[derive(Debug, Clone, Copy)]
pub struct ClassMethod {
    pub func: Value,
}

/// Wraps a callable so reading it off a class or instance binds nothing.
#[derive(Debug, Clone, Copy)]
pub struct StaticMethod {
    pub func: Value,
}

/// Property descriptor: up to three callables invoked on attribute
/// get/set/delete with the instance as first argument.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserProperty {
    pub getter: Option<Value>,
    pub setter: Option<Value>,
    pub deleter: Option<Value>,
}

/// Super proxy: attribute resolution for `instance`, starting one step
/// above `class_id` in the hierarchy.
#[derive(Debug, Clone, Copy)]
pub struct SuperProxy {
    pub class_id: HeapId,
    pub instance: Value,
}

impl PyTrait for ClassObject {
    fn py_type(&self, _heap: &Heap<impl ResourceTracker>) -> Type {
        Type::Type
    }

    fn py_bool(&self, _heap: &Heap<impl ResourceTracker>) -> bool {
        true
    }

    fn py_len(&self, _heap: &Heap<impl ResourceTracker>) -> Option<usize> {
        None
    }

    fn py_hash(&self, _heap: &Heap<impl ResourceTracker>) -> Option<u64> {
        None
    }

    fn py_repr(&self, _heap: &Heap<impl ResourceTracker>, _depth: u16) -> RunResult<String> {
        Ok(format!("<class '{}'>", self.name))
    }

    fn py_estimate_size(&self) -> usize {
        size_of::<Self>() + self.namespace.len() * (size_of::<StringId>() + size_of::<Value>())
    }

    fn collect_child_ids(&self, ids: &mut Vec<HeapId>) {
        ids.extend_from_slice(&self.bases);
        ids.extend_from_slice(&self.mro);
        for value in self.namespace.values() {
            if let Value::Ref(id) = value {
                ids.push(*id);
            }
        }
    }
}

impl PyTrait for Instance {
    fn py_type(&self, _heap: &Heap<impl ResourceTracker>) -> Type {
        Type::Object
    }

    fn py_bool(&self, _heap: &Heap<impl ResourceTracker>) -> bool {
        true
    }

    fn py_len(&self, _heap: &Heap<impl ResourceTracker>) -> Option<usize> {
        None
    }

    fn py_hash(&self, _heap: &Heap<impl ResourceTracker>) -> Option<u64> {
        None
    }

    fn py_repr(&self, heap: &Heap<impl ResourceTracker>, _depth: u16) -> RunResult<String> {
        let class_name = match heap.get(self.class_id) {
            HeapData::Class(cls) => cls.name(),
            _ => "?",
        };
        Ok(format!("<{class_name} object>"))
    }

    fn py_estimate_size(&self) -> usize {
        size_of::<Self>() + self.attrs.len() * (size_of::<StringId>() + size_of::<Value>())
    }

    fn collect_child_ids(&self, ids: &mut Vec<HeapId>) {
        ids.push(self.class_id);
        for value in self.attrs.values() {
            if let Value::Ref(id) = value {
                ids.push(*id);
            }
        }
        if let Some(slots) = &self.slots {
            for value in slots.iter().flatten() {
                if let Value::Ref(id) = value {
                    ids.push(*id);
                }
            }
        }
    }
}

macro_rules! descriptor_py_trait {
    ($type:ty, $kind:expr, $repr:literal, [$($field:ident),*]) => {
        impl PyTrait for $type {
            fn py_type(&self, _heap: &Heap<impl ResourceTracker>) -> Type {
                $kind
            }

            fn py_bool(&self, _heap: &Heap<impl ResourceTracker>) -> bool {
                true
            }

            fn py_len(&self, _heap: &Heap<impl ResourceTracker>) -> Option<usize> {
                None
            }

            fn py_hash(&self, _heap: &Heap<impl ResourceTracker>) -> Option<u64> {
                None
            }

            fn py_repr(&self, _heap: &Heap<impl ResourceTracker>, _depth: u16) -> RunResult<String> {
                Ok($repr.to_string())
            }

            fn py_estimate_size(&self) -> usize {
                size_of::<Self>()
            }

            fn collect_child_ids(&self, ids: &mut Vec<HeapId>) {
                $(
                    if let Value::Ref(id) = self.$field {
                        ids.push(id);
                    }
                )*
            }
        }
    };
}

descriptor_py_trait!(BoundMethod, Type::Method, "<bound method>", [receiver, func]);
descriptor_py_trait!(ClassMethod, Type::ClassMethod, "<classmethod object>", [func]);
descriptor_py_trait!(StaticMethod, Type::StaticMethod, "<staticmethod object>", [func]);

impl PyTrait for UserProperty {
    fn py_type(&self, _heap: &Heap<impl ResourceTracker>) -> Type {
        Type::Property
    }

    fn py_bool(&self, _heap: &Heap<impl ResourceTracker>) -> bool {
        true
    }

    fn py_len(&self, _heap: &Heap<impl ResourceTracker>) -> Option<usize> {
        None
    }

    fn py_hash(&self, _heap: &Heap<impl ResourceTracker>) -> Option<u64> {
        None
    }

    fn py_repr(&self, _heap: &Heap<impl ResourceTracker>, _depth: u16) -> RunResult<String> {
        Ok("<property object>".to_string())
    }

    fn py_estimate_size(&self) -> usize {
        size_of::<Self>()
    }

    fn collect_child_ids(&self, ids: &mut Vec<HeapId>) {
        for accessor in [self.getter, self.setter, self.deleter].into_iter().flatten() {
            if let Value::Ref(id) = accessor {
                ids.push(id);
            }
        }
    }
}

impl PyTrait for SuperProxy {
    fn py_type(&self, _heap: &Heap<impl ResourceTracker>) -> Type {
        Type::Super
    }

    fn py_bool(&self, _heap: &Heap<impl ResourceTracker>) -> bool {
        true
    }

    fn py_len(&self, _heap: &Heap<impl ResourceTracker>) -> Option<usize> {
        None
    }

    fn py_hash(&self, _heap: &Heap<impl ResourceTracker>) -> Option<u64> {
        None
    }

    fn py_repr(&self, heap: &Heap<impl ResourceTracker>, _depth: u16) -> RunResult<String> {
        let class_name = match heap.get(self.class_id) {
            HeapData::Class(cls) => cls.name(),
            _ => "?",
        };
        Ok(format!("<super: {class_name}>"))
    }

    fn py_estimate_size(&self) -> usize {
        size_of::<Self>()
    }

    fn collect_child_ids(&self, ids: &mut Vec<HeapId>) {
        ids.push(self.class_id);
        if let Value::Ref(id) = self.instance {
            ids.push(id);
        }
    }
}
