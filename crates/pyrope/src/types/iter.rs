//! Iterator values over the built-in containers.
//!
//! Exhaustion is signalled in-band: advancing a live iterator yields
//! `Ok(Some(value))` and an exhausted one yields `Ok(None)`. The exception
//! channel is reserved for real failures, such as a dictionary growing or
//! shrinking while iterated.

use crate::{
    exception::{ExcType, RunResult},
    heap::{Heap, HeapData, HeapId},
    resource::ResourceTracker,
    types::{PyTrait, Type},
    value::Value,
};

/// What an iterator walks and how it projects each element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterTarget {
    /// List, tuple, or frozen set elements by position.
    Sequence,
    /// Dictionary keys (the default dict iteration).
    DictKeys,
    /// Dictionary values.
    DictValues,
    /// Dictionary `(key, value)` pairs, each allocated as a fresh tuple.
    DictItems,
    /// String characters, each yielded as a one-character string.
    StrChars,
    /// Bytes elements, each yielded as a small integer.
    BytesElems,
}

/// A position-based iterator over a heap-allocated container.
///
/// Holds the source id and a cursor rather than a borrow, so the iterator
/// itself lives on the heap like any other value. Dict iterators snapshot
/// the entry count at creation and fail on any size change.
#[derive(Debug)]
pub struct ValueIter {
    source: HeapId,
    target: IterTarget,
    cursor: usize,
    /// Entry count at creation, checked on every step for dict iterators.
    expected_len: usize,
}

impl ValueIter {
    /// Creates an iterator over the given heap object.
    ///
    /// Fails with `TypeError` when the object is not iterable.
    pub fn over(source: HeapId, heap: &Heap<impl ResourceTracker>) -> RunResult<Self> {
        let (target, expected_len) = match heap.get(source) {
            HeapData::List(list) => (IterTarget::Sequence, list.len()),
            HeapData::Tuple(tuple) => (IterTarget::Sequence, tuple.len()),
            HeapData::Set(set) => (IterTarget::Sequence, set.0.len()),
            HeapData::FrozenSet(fs) => (IterTarget::Sequence, fs.storage().len()),
            HeapData::Dict(dict) => (IterTarget::DictKeys, dict.len()),
            HeapData::Str(s) => (IterTarget::StrChars, s.len_chars()),
            HeapData::Bytes(b) => (IterTarget::BytesElems, b.len()),
            other => {
                return Err(ExcType::type_error(format!(
                    "'{}' object is not iterable",
                    other.py_type(heap).name()
                )));
            }
        };
        Ok(Self {
            source,
            target,
            cursor: 0,
            expected_len,
        })
    }

    /// A placeholder iterator that yields nothing; used to swap an iterator
    /// out of its heap slot while it advances.
    #[must_use]
    pub(crate) fn detached() -> Self {
        Self {
            source: HeapId::INVALID,
            target: IterTarget::Sequence,
            cursor: usize::MAX,
            expected_len: 0,
        }
    }

    /// Creates a dict-view iterator (keys, values, or items).
    pub fn over_dict(source: HeapId, target: IterTarget, heap: &Heap<impl ResourceTracker>) -> RunResult<Self> {
        let HeapData::Dict(dict) = heap.get(source) else {
            return Err(ExcType::type_error("dict view over a non-dict object"));
        };
        Ok(Self {
            source,
            target,
            cursor: 0,
            expected_len: dict.len(),
        })
    }

    /// Advances the iterator: `Ok(Some(value))` while live, `Ok(None)` once
    /// exhausted. Every call after exhaustion keeps returning `Ok(None)`.
    ///
    /// Item iteration allocates a pair tuple, which is why the heap is
    /// mutable here.
    pub fn next_value(&mut self, heap: &mut Heap<impl ResourceTracker>) -> RunResult<Option<Value>> {
        let index = self.cursor;
        let value = match self.target {
            IterTarget::Sequence => match heap.get(self.source) {
                HeapData::List(list) => list.value_at(index),
                HeapData::Tuple(tuple) => tuple.value_at(index),
                HeapData::Set(set) => set.0.value_at(index),
                HeapData::FrozenSet(fs) => fs.storage().value_at(index),
                _ => return Err(ExcType::type_error("iterator source changed kind")),
            },
            IterTarget::DictKeys | IterTarget::DictValues => {
                let HeapData::Dict(dict) = heap.get(self.source) else {
                    return Err(ExcType::type_error("iterator source changed kind"));
                };
                if dict.len() != self.expected_len {
                    return Err(ExcType::runtime_error("dictionary changed size during iteration"));
                }
                if self.target == IterTarget::DictKeys {
                    dict.key_at(index)
                } else {
                    dict.entry_at(index).map(|(_, v)| v)
                }
            }
            IterTarget::DictItems => {
                let pair = {
                    let HeapData::Dict(dict) = heap.get(self.source) else {
                        return Err(ExcType::type_error("iterator source changed kind"));
                    };
                    if dict.len() != self.expected_len {
                        return Err(ExcType::runtime_error("dictionary changed size during iteration"));
                    }
                    dict.entry_at(index)
                };
                match pair {
                    Some((key, value)) => {
                        let tuple_id = heap.allocate_tuple(vec![key, value])?;
                        Some(Value::Ref(tuple_id))
                    }
                    None => None,
                }
            }
            IterTarget::StrChars => {
                let ch = match heap.get(self.source) {
                    HeapData::Str(s) => s.char_at(index),
                    _ => return Err(ExcType::type_error("iterator source changed kind")),
                };
                match ch {
                    Some(c) => {
                        let str_id = heap.allocate_str(c.to_string())?;
                        Some(Value::Ref(str_id))
                    }
                    None => None,
                }
            }
            IterTarget::BytesElems => match heap.get(self.source) {
                HeapData::Bytes(b) => b.byte_at(index).map(Value::Int),
                _ => return Err(ExcType::type_error("iterator source changed kind")),
            },
        };
        if value.is_some() {
            self.cursor += 1;
        }
        Ok(value)
    }
}

impl PyTrait for ValueIter {
    fn py_type(&self, _heap: &Heap<impl ResourceTracker>) -> Type {
        Type::Iterator
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
        Ok("<iterator>".to_string())
    }

    fn py_estimate_size(&self) -> usize {
        size_of::<Self>()
    }

    fn collect_child_ids(&self, ids: &mut Vec<HeapId>) {
        ids.push(self.source);
    }
}
