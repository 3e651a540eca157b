use crate::{
    exception::{ExcType, RunResult},
    heap::{Heap, HeapId},
    resource::{MAX_DATA_RECURSION_DEPTH, ResourceTracker},
    types::{PyTrait, Slice, Type},
    value::Value,
};

/// Mutable sequence of values.
#[derive(Debug, Clone, Default)]
pub struct List(Vec<Value>);

impl List {
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

    pub fn push(&mut self, value: Value) {
        self.0.push(value);
    }

    pub fn extend(&mut self, values: impl IntoIterator<Item = Value>) {
        self.0.extend(values);
    }

    /// Normalizes a possibly-negative index against the current length.
    fn normalize_index(&self, index: i64, type_name: &str) -> RunResult<usize> {
        normalize_sequence_index(index, self.0.len(), type_name)
    }

    /// Returns the element at `index` (negative indexes from the end).
    pub fn get_index(&self, index: i64) -> RunResult<Value> {
        let idx = self.normalize_index(index, "list")?;
        Ok(self.0[idx])
    }

    /// Replaces the element at `index`.
    pub fn set_index(&mut self, index: i64, value: Value) -> RunResult<()> {
        let idx = self.normalize_index(index, "list")?;
        self.0[idx] = value;
        Ok(())
    }

    /// Removes the element at `index`.
    pub fn delete_index(&mut self, index: i64) -> RunResult<Value> {
        let idx = self.normalize_index(index, "list")?;
        Ok(self.0.remove(idx))
    }

    /// Returns the element at a raw iteration position, if still in range.
    #[must_use]
    pub fn value_at(&self, index: usize) -> Option<Value> {
        self.0.get(index).copied()
    }

    /// Membership by value equality.
    #[must_use]
    pub fn contains(&self, needle: &Value, heap: &Heap<impl ResourceTracker>) -> bool {
        self.0.iter().any(|v| v.py_eq(needle, heap))
    }

    /// Extracts the elements selected by a slice, in slice order.
    #[must_use]
    pub fn get_slice(&self, slice: &Slice) -> Vec<Value> {
        slice.apply_indices(self.0.len()).map(|i| self.0[i]).collect()
    }

    /// Concatenation (`+` operator).
    #[must_use]
    pub fn concat(&self, other: &Self) -> Self {
        let mut out = Vec::with_capacity(self.0.len() + other.0.len());
        out.extend_from_slice(&self.0);
        out.extend_from_slice(&other.0);
        Self(out)
    }

    /// Repetition (`*` operator); non-positive counts yield an empty list.
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

    /// Element-wise equality against another sequence's storage.
    #[must_use]
    pub fn eq_values(a: &[Value], b: &[Value], heap: &Heap<impl ResourceTracker>) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.py_eq(y, heap))
    }
}

/// Shared index normalization for sequence kinds.
pub(crate) fn normalize_sequence_index(index: i64, len: usize, type_name: &str) -> RunResult<usize> {
    let len = len as i64;
    let adjusted = if index < 0 { index + len } else { index };
    if adjusted < 0 || adjusted >= len {
        return Err(ExcType::index_error(type_name));
    }
    Ok(adjusted as usize)
}

/// Writes the repr of a sequence of values with the given delimiters.
pub(crate) fn sequence_repr(
    values: &[Value],
    open: char,
    close: char,
    heap: &Heap<impl ResourceTracker>,
    depth: u16,
) -> RunResult<String> {
    if depth >= MAX_DATA_RECURSION_DEPTH {
        return Err(ExcType::recursion_error());
    }
    let mut out = String::from(open);
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&v.py_repr(heap, depth + 1)?);
    }
    // A one-element tuple needs the trailing comma to round-trip.
    if close == ')' && values.len() == 1 {
        out.push(',');
    }
    out.push(close);
    Ok(out)
}

impl PyTrait for List {
    fn py_type(&self, _heap: &Heap<impl ResourceTracker>) -> Type {
        Type::List
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
        sequence_repr(&self.0, '[', ']', heap, depth)
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
    fn test_negative_indexing() {
        let list = List::new(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert!(matches!(list.get_index(-1), Ok(Value::Int(3))));
        assert!(matches!(list.get_index(-3), Ok(Value::Int(1))));
        assert!(list.get_index(3).is_err());
        assert!(list.get_index(-4).is_err());
    }

    #[test]
    fn test_contains_by_value_equality() {
        let heap = Heap::new(NoLimitTracker);
        let list = List::new(vec![Value::Int(1), Value::Float(2.0)]);
        // 2 == 2.0, so membership holds across kinds
        assert!(list.contains(&Value::Int(2), &heap));
        assert!(!list.contains(&Value::Int(3), &heap));
    }

    #[test]
    fn test_repr() {
        let heap = Heap::new(NoLimitTracker);
        let list = List::new(vec![Value::Int(1), Value::None, Value::Bool(true)]);
        assert_eq!(list.py_repr(&heap, 0).unwrap(), "[1, None, True]");
    }
}
