use hashbrown::{HashTable, hash_table::Entry};

use crate::{
    exception::{ExcType, RunError, RunResult},
    heap::{Heap, HeapId},
    resource::{MAX_DATA_RECURSION_DEPTH, ResourceTracker},
    types::{PyTrait, Type},
    value::Value,
};

/// Shared storage for set and frozenset.
///
/// Same layout as dict storage: a `HashTable<usize>` over a dense
/// insertion-ordered vec, with element identity defined by value equality.
/// Adding an element equal to a stored one is a no-op that keeps the stored
/// element object.
#[derive(Debug, Default)]
pub struct SetStorage {
    indices: HashTable<usize>,
    entries: Vec<SetEntry>,
}

#[derive(Debug)]
struct SetEntry {
    value: Value,
    hash: u64,
}

impl SetStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds storage from elements, dropping equal duplicates (first wins).
    pub fn from_values(values: impl IntoIterator<Item = Value>, heap: &Heap<impl ResourceTracker>) -> RunResult<Self> {
        let mut storage = Self::new();
        for value in values {
            storage.insert(value, heap)?;
        }
        Ok(storage)
    }

    fn find_index_hash(&self, value: &Value, heap: &Heap<impl ResourceTracker>) -> RunResult<(Option<usize>, u64)> {
        let hash = value.py_hash(heap).ok_or_else(|| unhashable_error(value, heap))?;
        let index = self
            .indices
            .find(hash, |&i| {
                let entry = &self.entries[i];
                entry.hash == hash && entry.value.py_eq(value, heap)
            })
            .copied();
        Ok((index, hash))
    }

    /// Inserts an element; returns false if an equal element was already
    /// present (the stored element is kept).
    pub fn insert(&mut self, value: Value, heap: &Heap<impl ResourceTracker>) -> RunResult<bool> {
        let (opt_index, hash) = self.find_index_hash(&value, heap)?;
        if opt_index.is_some() {
            return Ok(false);
        }
        let index = self.entries.len();
        self.entries.push(SetEntry { value, hash });
        self.indices.insert_unique(hash, index, |&i| self.entries[i].hash);
        Ok(true)
    }

    /// Removes an element equal to `value`; returns it if present.
    pub fn remove(&mut self, value: &Value, heap: &Heap<impl ResourceTracker>) -> RunResult<Option<Value>> {
        let hash = value.py_hash(heap).ok_or_else(|| unhashable_error(value, heap))?;
        let entry = self.indices.entry(
            hash,
            |&i| {
                let entry = &self.entries[i];
                entry.hash == hash && entry.value.py_eq(value, heap)
            },
            |&i| self.entries[i].hash,
        );
        if let Entry::Occupied(occ_entry) = entry {
            let removed_index = *occ_entry.get();
            let entry = self.entries.remove(removed_index);
            occ_entry.remove();
            for index in &mut self.indices {
                if *index > removed_index {
                    *index -= 1;
                }
            }
            Ok(Some(entry.value))
        } else {
            Ok(None)
        }
    }

    pub fn contains(&self, value: &Value, heap: &Heap<impl ResourceTracker>) -> RunResult<bool> {
        Ok(self.find_index_hash(value, heap)?.0.is_some())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Element at an iteration index, in insertion order.
    #[must_use]
    pub fn value_at(&self, index: usize) -> Option<Value> {
        self.entries.get(index).map(|e| e.value)
    }

    /// All elements in insertion order.
    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        self.entries.iter().map(|e| e.value).collect()
    }

    #[must_use]
    pub fn copy(&self) -> Self {
        let entries: Vec<SetEntry> = self
            .entries
            .iter()
            .map(|e| SetEntry {
                value: e.value,
                hash: e.hash,
            })
            .collect();
        let mut indices = HashTable::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            indices.insert_unique(entry.hash, i, |&j| entries[j].hash);
        }
        Self { indices, entries }
    }

    /// Union with already-materialized elements from any iterable.
    pub fn union_with(&self, other: &[Value], heap: &Heap<impl ResourceTracker>) -> RunResult<Self> {
        let mut out = self.copy();
        for value in other {
            out.insert(*value, heap)?;
        }
        Ok(out)
    }

    /// Elements present in both this storage and `other`.
    pub fn intersection_with(&self, other: &[Value], heap: &Heap<impl ResourceTracker>) -> RunResult<Self> {
        let other_storage = Self::from_values(other.iter().copied(), heap)?;
        let mut out = Self::new();
        for entry in &self.entries {
            if other_storage.contains(&entry.value, heap)? {
                out.insert(entry.value, heap)?;
            }
        }
        Ok(out)
    }

    /// Elements of this storage not present in `other`.
    pub fn difference_with(&self, other: &[Value], heap: &Heap<impl ResourceTracker>) -> RunResult<Self> {
        let other_storage = Self::from_values(other.iter().copied(), heap)?;
        let mut out = Self::new();
        for entry in &self.entries {
            if !other_storage.contains(&entry.value, heap)? {
                out.insert(entry.value, heap)?;
            }
        }
        Ok(out)
    }

    /// Elements in exactly one of the two sides.
    pub fn symmetric_difference_with(&self, other: &[Value], heap: &Heap<impl ResourceTracker>) -> RunResult<Self> {
        let other_storage = Self::from_values(other.iter().copied(), heap)?;
        let mut out = Self::new();
        for entry in &self.entries {
            if !other_storage.contains(&entry.value, heap)? {
                out.insert(entry.value, heap)?;
            }
        }
        for entry in &other_storage.entries {
            if !self.contains(&entry.value, heap)? {
                out.insert(entry.value, heap)?;
            }
        }
        Ok(out)
    }

    /// Set equality: same size and mutual containment.
    pub fn eq_storage(&self, other: &Self, heap: &Heap<impl ResourceTracker>) -> RunResult<bool> {
        if self.entries.len() != other.entries.len() {
            return Ok(false);
        }
        for entry in &self.entries {
            if !other.contains(&entry.value, heap)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn is_subset(&self, other: &Self, heap: &Heap<impl ResourceTracker>) -> RunResult<bool> {
        for entry in &self.entries {
            if !other.contains(&entry.value, heap)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn is_superset(&self, other: &Self, heap: &Heap<impl ResourceTracker>) -> RunResult<bool> {
        other.is_subset(self, heap)
    }

    pub fn is_disjoint(&self, other: &Self, heap: &Heap<impl ResourceTracker>) -> RunResult<bool> {
        for entry in &self.entries {
            if other.contains(&entry.value, heap)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Order-independent hash: XOR of element hashes.
    ///
    /// Valid only under the "equal values hash equal" contract; elements are
    /// already hashable or they could not have been inserted.
    #[must_use]
    fn content_hash(&self) -> u64 {
        self.entries.iter().fold(0u64, |acc, e| acc ^ e.hash)
    }

    fn repr_into(&self, prefix: &str, heap: &Heap<impl ResourceTracker>, depth: u16) -> RunResult<String> {
        if depth >= MAX_DATA_RECURSION_DEPTH {
            return Err(ExcType::recursion_error());
        }
        if self.entries.is_empty() {
            return Ok(if prefix.is_empty() {
                "set()".to_string()
            } else {
                format!("{prefix}()")
            });
        }
        let mut out = String::from(prefix);
        out.push('{');
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&entry.value.py_repr(heap, depth + 1)?);
        }
        out.push('}');
        if !prefix.is_empty() {
            out.push(')');
        }
        Ok(out)
    }

    fn child_ids_into(&self, ids: &mut Vec<HeapId>) {
        for entry in &self.entries {
            if let Value::Ref(id) = entry.value {
                ids.push(id);
            }
        }
    }
}

fn unhashable_error(value: &Value, heap: &Heap<impl ResourceTracker>) -> RunError {
    ExcType::type_error(format!("unhashable type: '{}'", value.py_type(heap).name()))
}

/// Mutable set of unique hashable elements.
#[derive(Debug, Default)]
pub struct Set(pub SetStorage);

impl Set {
    #[must_use]
    pub fn new(storage: SetStorage) -> Self {
        Self(storage)
    }

    /// Removes an element, failing with `KeyError` if absent (the `remove`
    /// method; `discard` maps to `SetStorage::remove` directly).
    pub fn remove_strict(&mut self, value: &Value, heap: &Heap<impl ResourceTracker>) -> RunResult<()> {
        match self.0.remove(value, heap)? {
            Some(_) => Ok(()),
            None => Err(ExcType::key_error(value.py_repr(heap, 0)?)),
        }
    }
}

impl PyTrait for Set {
    fn py_type(&self, _heap: &Heap<impl ResourceTracker>) -> Type {
        Type::Set
    }

    fn py_bool(&self, _heap: &Heap<impl ResourceTracker>) -> bool {
        !self.0.is_empty()
    }

    fn py_len(&self, _heap: &Heap<impl ResourceTracker>) -> Option<usize> {
        Some(self.0.len())
    }

    fn py_hash(&self, _heap: &Heap<impl ResourceTracker>) -> Option<u64> {
        None
    }

    fn py_repr(&self, heap: &Heap<impl ResourceTracker>, depth: u16) -> RunResult<String> {
        self.0.repr_into("", heap, depth)
    }

    fn py_estimate_size(&self) -> usize {
        size_of::<Self>() + self.0.entries.capacity() * size_of::<SetEntry>()
    }

    fn collect_child_ids(&self, ids: &mut Vec<HeapId>) {
        self.0.child_ids_into(ids);
    }
}

/// Immutable, hashable set.
///
/// The hash is the XOR of element hashes, making it order-independent;
/// it is computed once at construction since the contents never change.
#[derive(Debug)]
pub struct FrozenSet {
    storage: SetStorage,
    hash: u64,
}

impl FrozenSet {
    #[must_use]
    pub fn new(storage: SetStorage) -> Self {
        let hash = storage.content_hash();
        Self { storage, hash }
    }

    #[must_use]
    pub fn storage(&self) -> &SetStorage {
        &self.storage
    }
}

impl PyTrait for FrozenSet {
    fn py_type(&self, _heap: &Heap<impl ResourceTracker>) -> Type {
        Type::FrozenSet
    }

    fn py_bool(&self, _heap: &Heap<impl ResourceTracker>) -> bool {
        !self.storage.is_empty()
    }

    fn py_len(&self, _heap: &Heap<impl ResourceTracker>) -> Option<usize> {
        Some(self.storage.len())
    }

    fn py_hash(&self, _heap: &Heap<impl ResourceTracker>) -> Option<u64> {
        Some(self.hash)
    }

    fn py_repr(&self, heap: &Heap<impl ResourceTracker>, depth: u16) -> RunResult<String> {
        self.storage.repr_into("frozenset(", heap, depth)
    }

    fn py_estimate_size(&self) -> usize {
        size_of::<Self>() + self.storage.entries.capacity() * size_of::<SetEntry>()
    }

    fn collect_child_ids(&self, ids: &mut Vec<HeapId>) {
        self.storage.child_ids_into(ids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::NoLimitTracker;

    fn storage(values: &[i64], heap: &Heap<NoLimitTracker>) -> SetStorage {
        SetStorage::from_values(values.iter().map(|&i| Value::Int(i)), heap).unwrap()
    }

    #[test]
    fn test_duplicates_collapse() {
        let heap = Heap::new(NoLimitTracker);
        let s = storage(&[1, 2, 1, 3, 2], &heap);
        assert_eq!(s.len(), 3);
        assert_eq!(s.values(), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn test_cross_kind_equality_collapses() {
        let heap = Heap::new(NoLimitTracker);
        let mut s = SetStorage::new();
        s.insert(Value::Int(1), &heap).unwrap();
        // True == 1: not a new element, and the stored element stays Int(1)
        assert!(!s.insert(Value::Bool(true), &heap).unwrap());
        assert_eq!(s.values(), vec![Value::Int(1)]);
    }

    #[test]
    fn test_algebra() {
        let heap = Heap::new(NoLimitTracker);
        let a = storage(&[1, 2, 3], &heap);
        let b = [Value::Int(2), Value::Int(3), Value::Int(4)];

        let union = a.union_with(&b, &heap).unwrap();
        assert_eq!(union.len(), 4);
        let inter = a.intersection_with(&b, &heap).unwrap();
        assert_eq!(inter.values(), vec![Value::Int(2), Value::Int(3)]);
        let diff = a.difference_with(&b, &heap).unwrap();
        assert_eq!(diff.values(), vec![Value::Int(1)]);
        let sym = a.symmetric_difference_with(&b, &heap).unwrap();
        assert_eq!(sym.values(), vec![Value::Int(1), Value::Int(4)]);
    }

    #[test]
    fn test_subset_superset_disjoint() {
        let heap = Heap::new(NoLimitTracker);
        let small = storage(&[1, 2], &heap);
        let big = storage(&[1, 2, 3], &heap);
        let other = storage(&[4, 5], &heap);

        assert_eq!(small.is_subset(&big, &heap), Ok(true));
        assert_eq!(big.is_subset(&small, &heap), Ok(false));
        assert_eq!(big.is_superset(&small, &heap), Ok(true));
        assert_eq!(small.is_superset(&big, &heap), Ok(false));
        // A set is a subset and superset of itself.
        assert_eq!(small.is_subset(&small, &heap), Ok(true));
        assert_eq!(small.is_superset(&small, &heap), Ok(true));

        assert_eq!(small.is_disjoint(&other, &heap), Ok(true));
        assert_eq!(small.is_disjoint(&big, &heap), Ok(false));
        // The empty set is a subset of, and disjoint with, everything.
        let empty = SetStorage::new();
        assert_eq!(empty.is_subset(&small, &heap), Ok(true));
        assert_eq!(empty.is_disjoint(&small, &heap), Ok(true));
    }

    #[test]
    fn test_frozenset_hash_order_independent() {
        let heap = Heap::new(NoLimitTracker);
        let fs1 = FrozenSet::new(storage(&[1, 2, 3], &heap));
        let fs2 = FrozenSet::new(storage(&[3, 1, 2], &heap));
        assert_eq!(fs1.py_hash(&heap), fs2.py_hash(&heap));
    }

    #[test]
    fn test_remove_strict_missing_raises() {
        let heap = Heap::new(NoLimitTracker);
        let mut set = Set::new(storage(&[1], &heap));
        assert!(set.remove_strict(&Value::Int(1), &heap).is_ok());
        let err = set.remove_strict(&Value::Int(9), &heap).unwrap_err();
        assert_eq!(err.exc_type(), ExcType::KeyError);
    }
}
