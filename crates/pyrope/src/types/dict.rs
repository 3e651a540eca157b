use hashbrown::{HashTable, hash_table::Entry};

use crate::{
    exception::{ExcType, RunError, RunResult},
    heap::{Heap, HeapId},
    resource::{MAX_DATA_RECURSION_DEPTH, ResourceTracker},
    types::{PyTrait, Type},
    value::Value,
};

/// Mapping type preserving insertion order, keyed by value equality.
///
/// Two distinct key objects that compare equal are the same entry: lookup,
/// update, and removal probe by hash and compare within the bucket using the
/// value protocol's equality. Updating an existing key's value keeps the
/// stored key object; only the value is replaced.
///
/// # Storage Strategy
/// A `HashTable<usize>` maps key hashes to indices in a dense `Vec<DictEntry>`
/// that preserves insertion order. Lookups are O(1) expected while enumeration
/// order stays the insertion order of first-seen keys.
#[derive(Debug, Default)]
pub struct Dict {
    /// indices mapping from the entry hash to its index.
    indices: HashTable<usize>,
    /// entries is a dense vec maintaining entry order.
    entries: Vec<DictEntry>,
}

#[derive(Debug)]
struct DictEntry {
    key: Value,
    value: Value,
    /// the hash is needed here for correct use of insert_unique
    hash: u64,
}

impl Dict {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            indices: HashTable::with_capacity(capacity),
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Creates a dict from (key, value) pairs, applying last-wins update
    /// semantics for duplicate keys.
    pub fn from_pairs(
        pairs: impl IntoIterator<Item = (Value, Value)>,
        heap: &Heap<impl ResourceTracker>,
    ) -> RunResult<Self> {
        let mut dict = Self::new();
        for (key, value) in pairs {
            dict.set(key, value, heap)?;
        }
        Ok(dict)
    }

    /// Finds the entry index for a key, plus the key's hash.
    ///
    /// Fails if the key is unhashable.
    fn find_index_hash(&self, key: &Value, heap: &Heap<impl ResourceTracker>) -> RunResult<(Option<usize>, u64)> {
        let hash = key
            .py_hash(heap)
            .ok_or_else(|| unhashable_error(key, heap))?;
        let index = self
            .indices
            .find(hash, |&i| {
                let entry = &self.entries[i];
                entry.hash == hash && entry.key.py_eq(key, heap)
            })
            .copied();
        Ok((index, hash))
    }

    /// Sets a key-value pair.
    ///
    /// If a key equal to `key` already exists, the stored key object is kept
    /// and only the value is replaced; otherwise the pair is appended,
    /// preserving insertion order for enumeration.
    pub fn set(&mut self, key: Value, value: Value, heap: &Heap<impl ResourceTracker>) -> RunResult<()> {
        let (opt_index, hash) = self.find_index_hash(&key, heap)?;
        if let Some(index) = opt_index {
            self.entries[index].value = value;
        } else {
            let index = self.entries.len();
            self.entries.push(DictEntry { key, value, hash });
            self.indices
                .insert_unique(hash, index, |&i| self.entries[i].hash);
        }
        Ok(())
    }

    /// Gets a value by key; `Ok(None)` when the key is absent.
    pub fn get(&self, key: &Value, heap: &Heap<impl ResourceTracker>) -> RunResult<Option<Value>> {
        let (opt_index, _) = self.find_index_hash(key, heap)?;
        Ok(opt_index.map(|i| self.entries[i].value))
    }

    /// Removes and returns a key-value pair; `Ok(None)` when absent.
    ///
    /// Entries after the removed slot shift left by one, so stored indices
    /// in the hash table are updated to stay aligned with `entries`.
    pub fn pop(&mut self, key: &Value, heap: &Heap<impl ResourceTracker>) -> RunResult<Option<(Value, Value)>> {
        let hash = key
            .py_hash(heap)
            .ok_or_else(|| unhashable_error(key, heap))?;
        let entry = self.indices.entry(
            hash,
            |&i| {
                let entry = &self.entries[i];
                entry.hash == hash && entry.key.py_eq(key, heap)
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
            Ok(Some((entry.key, entry.value)))
        } else {
            Ok(None)
        }
    }

    /// Membership check by key equality.
    pub fn contains(&self, key: &Value, heap: &Heap<impl ResourceTracker>) -> RunResult<bool> {
        Ok(self.find_index_hash(key, heap)?.0.is_some())
    }

    /// Returns the stored value, inserting `default` first if the key is absent.
    pub fn setdefault(&mut self, key: Value, default: Value, heap: &Heap<impl ResourceTracker>) -> RunResult<Value> {
        let (opt_index, hash) = self.find_index_hash(&key, heap)?;
        if let Some(index) = opt_index {
            return Ok(self.entries[index].value);
        }
        let index = self.entries.len();
        self.entries.push(DictEntry {
            key,
            value: default,
            hash,
        });
        self.indices
            .insert_unique(hash, index, |&i| self.entries[i].hash);
        Ok(default)
    }

    /// Merges another dict's pairs into this one (update semantics).
    pub fn update_from(&mut self, other: &Self, heap: &Heap<impl ResourceTracker>) -> RunResult<()> {
        for entry in &other.entries {
            self.set(entry.key, entry.value, heap)?;
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.indices.clear();
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the key at the given iteration index, in insertion order.
    #[must_use]
    pub fn key_at(&self, index: usize) -> Option<Value> {
        self.entries.get(index).map(|e| e.key)
    }

    /// Returns the (key, value) pair at the given iteration index.
    #[must_use]
    pub fn entry_at(&self, index: usize) -> Option<(Value, Value)> {
        self.entries.get(index).map(|e| (e.key, e.value))
    }

    /// All keys in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<Value> {
        self.entries.iter().map(|e| e.key).collect()
    }

    /// All values in insertion order.
    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        self.entries.iter().map(|e| e.value).collect()
    }

    /// All (key, value) pairs in insertion order.
    #[must_use]
    pub fn items(&self) -> Vec<(Value, Value)> {
        self.entries.iter().map(|e| (e.key, e.value)).collect()
    }

    /// Shallow copy.
    #[must_use]
    pub fn copy(&self) -> Self {
        let mut indices = HashTable::with_capacity(self.entries.len());
        let entries: Vec<DictEntry> = self
            .entries
            .iter()
            .map(|e| DictEntry {
                key: e.key,
                value: e.value,
                hash: e.hash,
            })
            .collect();
        for (i, entry) in entries.iter().enumerate() {
            indices.insert_unique(entry.hash, i, |&j| entries[j].hash);
        }
        Self { indices, entries }
    }

    /// Dict equality: same size and every key maps to an equal value.
    pub fn eq_dict(&self, other: &Self, heap: &Heap<impl ResourceTracker>) -> RunResult<bool> {
        if self.entries.len() != other.entries.len() {
            return Ok(false);
        }
        for entry in &self.entries {
            match other.get(&entry.key, heap)? {
                Some(other_value) if entry.value.py_eq(&other_value, heap) => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }
}

/// Builds the unhashable-key failure for a probe value.
fn unhashable_error(key: &Value, heap: &Heap<impl ResourceTracker>) -> RunError {
    ExcType::type_error(format!("unhashable type: '{}'", key.py_type(heap).name()))
}

impl PyTrait for Dict {
    fn py_type(&self, _heap: &Heap<impl ResourceTracker>) -> Type {
        Type::Dict
    }

    fn py_bool(&self, _heap: &Heap<impl ResourceTracker>) -> bool {
        !self.entries.is_empty()
    }

    fn py_len(&self, _heap: &Heap<impl ResourceTracker>) -> Option<usize> {
        Some(self.entries.len())
    }

    fn py_hash(&self, _heap: &Heap<impl ResourceTracker>) -> Option<u64> {
        None
    }

    fn py_repr(&self, heap: &Heap<impl ResourceTracker>, depth: u16) -> RunResult<String> {
        if depth >= MAX_DATA_RECURSION_DEPTH {
            return Err(ExcType::recursion_error());
        }
        let mut out = String::from('{');
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&entry.key.py_repr(heap, depth + 1)?);
            out.push_str(": ");
            out.push_str(&entry.value.py_repr(heap, depth + 1)?);
        }
        out.push('}');
        Ok(out)
    }

    fn py_estimate_size(&self) -> usize {
        size_of::<Self>() + self.entries.capacity() * size_of::<DictEntry>()
    }

    fn collect_child_ids(&self, ids: &mut Vec<HeapId>) {
        for entry in &self.entries {
            if let Value::Ref(id) = entry.key {
                ids.push(id);
            }
            if let Value::Ref(id) = entry.value {
                ids.push(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{heap::HeapData, resource::NoLimitTracker, types::Str};

    fn str_value(heap: &mut Heap<NoLimitTracker>, s: &str) -> Value {
        Value::Ref(heap.allocate(HeapData::Str(Str::from(s))).unwrap())
    }

    #[test]
    fn test_update_keeps_stored_key() {
        let mut heap = Heap::new(NoLimitTracker);
        let k1 = str_value(&mut heap, "key");
        let k2 = str_value(&mut heap, "key");
        assert_ne!(k1, k2, "distinct heap objects");

        let mut dict = Dict::new();
        dict.set(k1, Value::Int(1), &heap).unwrap();
        dict.set(k2, Value::Int(2), &heap).unwrap();

        assert_eq!(dict.len(), 1);
        // Enumeration yields the first-seen key object with the new value.
        assert_eq!(dict.entry_at(0), Some((k1, Value::Int(2))));
    }

    #[test]
    fn test_insertion_order_preserved() {
        let heap = Heap::new(NoLimitTracker);
        let mut dict = Dict::new();
        dict.set(Value::Int(3), Value::None, &heap).unwrap();
        dict.set(Value::Int(1), Value::None, &heap).unwrap();
        dict.set(Value::Int(2), Value::None, &heap).unwrap();
        assert_eq!(dict.keys(), vec![Value::Int(3), Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_pop_shifts_indices() {
        let heap = Heap::new(NoLimitTracker);
        let mut dict = Dict::new();
        for i in 0..5 {
            dict.set(Value::Int(i), Value::Int(i * 10), &heap).unwrap();
        }
        let removed = dict.pop(&Value::Int(1), &heap).unwrap();
        assert_eq!(removed, Some((Value::Int(1), Value::Int(10))));
        // Remaining keys still resolve after the dense vec shifted.
        for i in [0, 2, 3, 4] {
            assert_eq!(dict.get(&Value::Int(i), &heap).unwrap(), Some(Value::Int(i * 10)));
        }
        assert_eq!(dict.get(&Value::Int(1), &heap).unwrap(), None);
    }

    #[test]
    fn test_cross_kind_numeric_keys_collide() {
        let heap = Heap::new(NoLimitTracker);
        let mut dict = Dict::new();
        dict.set(Value::Int(1), Value::Int(100), &heap).unwrap();
        // True == 1, so this updates rather than inserts.
        dict.set(Value::Bool(true), Value::Int(200), &heap).unwrap();
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.get(&Value::Float(1.0), &heap).unwrap(), Some(Value::Int(200)));
        assert_eq!(dict.key_at(0), Some(Value::Int(1)));
    }

    #[test]
    fn test_unhashable_key_rejected() {
        let mut heap = Heap::new(NoLimitTracker);
        let list_id = heap.allocate(HeapData::List(crate::types::List::default())).unwrap();
        let mut dict = Dict::new();
        let err = dict.set(Value::Ref(list_id), Value::None, &heap).unwrap_err();
        assert_eq!(err.exc_type(), ExcType::TypeError);
    }
}
