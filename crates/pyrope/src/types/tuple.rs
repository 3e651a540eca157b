use crate::{
    exception::RunResult,
    heap::{Heap, HeapId},
    py_hash::hash_tuple_lanes,
    resource::ResourceTracker,
    types::{
        PyTrait, Slice, Type,
        list::{normalize_sequence_index, sequence_repr},
    },
    value::Value,
};

/// Immutable sequence of values.
#[derive(Debug, Clone, Default)]
pub struct Tuple(Vec<Value>);

impl Tuple {
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get_index(&self, index: i64) -> RunResult<Value> {
        let idx = normalize_sequence_index(index, self.0.len(), "tuple")?;
        Ok(self.0[idx])
    }

    #[must_use]
    pub fn value_at(&self, index: usize) -> Option<Value> {
        self.0.get(index).copied()
    }

    #[must_use]
    pub fn contains(&self, needle: &Value, heap: &Heap<impl ResourceTracker>) -> bool {
        self.0.iter().any(|v| v.py_eq(needle, heap))
    }

    #[must_use]
    pub fn get_slice(&self, slice: &Slice) -> Vec<Value> {
        slice.apply_indices(self.0.len()).map(|i| self.0[i]).collect()
    }

    #[must_use]
    pub fn concat(&self, other: &Self) -> Self {
        let mut out = Vec::with_capacity(self.0.len() + other.0.len());
        out.extend_from_slice(&self.0);
        out.extend_from_slice(&other.0);
        Self(out)
    }

    /// Repetition (`*` operator); non-positive counts yield an empty tuple.
    #[must_use]
    pub fn repeat(&self, count: i64) -> Self {
        if count <= 0 {
            return Self::default();
        }
        let mut out = Vec::with_capacity(self.0.len() * count as usize);
        for _ in 0..count {
            out.extend_from_slice(&self.0);
        }
        Self(out)
    }
}

impl PyTrait for Tuple {
    fn py_type(&self, _heap: &Heap<impl ResourceTracker>) -> Type {
        Type::Tuple
    }

    fn py_bool(&self, _heap: &Heap<impl ResourceTracker>) -> bool {
        !self.0.is_empty()
    }

    fn py_len(&self, _heap: &Heap<impl ResourceTracker>) -> Option<usize> {
        Some(self.0.len())
    }

    fn py_hash(&self, heap: &Heap<impl ResourceTracker>) -> Option<u64> {
        let mut lanes = Vec::with_capacity(self.0.len());
        for v in &self.0 {
            lanes.push(v.py_hash(heap)?);
        }
        Some(hash_tuple_lanes(lanes.into_iter()))
    }

    fn py_repr(&self, heap: &Heap<impl ResourceTracker>, depth: u16) -> RunResult<String> {
        sequence_repr(&self.0, '(', ')', heap, depth)
    }

    fn py_estimate_size(&self) -> usize {
        size_of::<Self>() + self.0.capacity() * size_of::<Value>()
    }

    fn collect_child_ids(&self, ids: &mut Vec<HeapId>) {
        for v in &self.0 {
            if let Value::Ref(id) = v {
                ids.push(*id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::NoLimitTracker;

    #[test]
    fn test_one_element_repr_has_trailing_comma() {
        let heap = Heap::new(NoLimitTracker);
        let t = Tuple::new(vec![Value::Int(7)]);
        assert_eq!(t.py_repr(&heap, 0).unwrap(), "(7,)");
    }

    #[test]
    fn test_hash_is_order_sensitive() {
        let heap = Heap::new(NoLimitTracker);
        let ab = Tuple::new(vec![Value::Int(1), Value::Int(2)]).py_hash(&heap);
        let ba = Tuple::new(vec![Value::Int(2), Value::Int(1)]).py_hash(&heap);
        assert!(ab.is_some());
        assert_ne!(ab, ba);
    }
}
