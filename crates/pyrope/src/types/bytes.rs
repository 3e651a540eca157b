use std::fmt::Write;

use crate::{
    exception::RunResult,
    heap::{Heap, HeapId},
    py_hash::hash_bytes,
    resource::ResourceTracker,
    types::{PyTrait, Type},
};

/// Heap-allocated immutable byte string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bytes(Vec<u8>);

impl Bytes {
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
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

    /// Returns the byte at `index` as an integer, matching indexing semantics
    /// for byte strings (an element is an int, not a length-1 bytes).
    #[must_use]
    pub fn byte_at(&self, index: usize) -> Option<i64> {
        self.0.get(index).map(|&b| i64::from(b))
    }

    #[must_use]
    pub fn concat(&self, other: &[u8]) -> Self {
        let mut out = Vec::with_capacity(self.0.len() + other.len());
        out.extend_from_slice(&self.0);
        out.extend_from_slice(other);
        Self(out)
    }
}

impl From<&[u8]> for Bytes {
    fn from(data: &[u8]) -> Self {
        Self(data.to_vec())
    }
}

impl PyTrait for Bytes {
    fn py_type(&self, _heap: &Heap<impl ResourceTracker>) -> Type {
        Type::Bytes
    }

    fn py_bool(&self, _heap: &Heap<impl ResourceTracker>) -> bool {
        !self.0.is_empty()
    }

    fn py_len(&self, _heap: &Heap<impl ResourceTracker>) -> Option<usize> {
        Some(self.0.len())
    }

    fn py_hash(&self, _heap: &Heap<impl ResourceTracker>) -> Option<u64> {
        Some(hash_bytes(&self.0))
    }

    fn py_repr(&self, _heap: &Heap<impl ResourceTracker>, _depth: u16) -> RunResult<String> {
        let mut out = String::with_capacity(self.0.len() + 3);
        out.push_str("b'");
        for &b in &self.0 {
            match b {
                b'\\' => out.push_str("\\\\"),
                b'\'' => out.push_str("\\'"),
                b'\n' => out.push_str("\\n"),
                b'\r' => out.push_str("\\r"),
                b'\t' => out.push_str("\\t"),
                0x20..=0x7e => out.push(b as char),
                _ => {
                    let _ = write!(out, "\\x{b:02x}");
                }
            }
        }
        out.push('\'');
        Ok(out)
    }

    fn py_estimate_size(&self) -> usize {
        size_of::<Self>() + self.0.capacity()
    }

    fn collect_child_ids(&self, _ids: &mut Vec<HeapId>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{heap::Heap, resource::NoLimitTracker};

    #[test]
    fn test_bytes_repr() {
        let heap = Heap::new(NoLimitTracker);
        let b = Bytes::new(vec![b'h', b'i', 0, 0xff]);
        assert_eq!(b.py_repr(&heap, 0).unwrap(), "b'hi\\x00\\xff'");
    }

    #[test]
    fn test_byte_at_is_int() {
        let b = Bytes::new(vec![1, 200]);
        assert_eq!(b.byte_at(1), Some(200));
        assert_eq!(b.byte_at(2), None);
    }
}
