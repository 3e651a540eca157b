use std::fmt::Write;

use crate::{
    exception::RunResult,
    heap::{Heap, HeapId},
    py_hash::hash_str,
    resource::ResourceTracker,
    types::{PyTrait, Type},
};

/// Heap-allocated string value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Str(String);

impl Str {
    #[must_use]
    pub fn new(s: String) -> Self {
        Self(s)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn len_chars(&self) -> usize {
        self.0.chars().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the character at a (sign-normalized) index, if in range.
    #[must_use]
    pub fn char_at(&self, index: usize) -> Option<char> {
        self.0.chars().nth(index)
    }

    /// Checks substring containment, the `in` operator for strings.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.0.contains(needle)
    }

    /// Concatenates two strings.
    #[must_use]
    pub fn concat(&self, other: &str) -> Self {
        let mut out = String::with_capacity(self.0.len() + other.len());
        out.push_str(&self.0);
        out.push_str(other);
        Self(out)
    }

    /// Repeats the string `count` times (`*` operator); non-positive counts
    /// produce the empty string.
    #[must_use]
    pub fn repeat(&self, count: i64) -> Self {
        if count <= 0 {
            return Self::default();
        }
        Self(self.0.repeat(count as usize))
    }
}

impl From<&str> for Str {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Str {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl PyTrait for Str {
    fn py_type(&self, _heap: &Heap<impl ResourceTracker>) -> Type {
        Type::Str
    }

    fn py_bool(&self, _heap: &Heap<impl ResourceTracker>) -> bool {
        !self.0.is_empty()
    }

    fn py_len(&self, _heap: &Heap<impl ResourceTracker>) -> Option<usize> {
        Some(self.len_chars())
    }

    fn py_hash(&self, _heap: &Heap<impl ResourceTracker>) -> Option<u64> {
        Some(hash_str(&self.0))
    }

    fn py_repr(&self, _heap: &Heap<impl ResourceTracker>, _depth: u16) -> RunResult<String> {
        let mut out = String::with_capacity(self.0.len() + 2);
        string_repr_fmt(&self.0, &mut out);
        Ok(out)
    }

    fn py_estimate_size(&self) -> usize {
        size_of::<Self>() + self.0.capacity()
    }

    fn collect_child_ids(&self, _ids: &mut Vec<HeapId>) {}
}

/// Writes the quoted, escaped repr of a string.
///
/// Prefers single quotes, switching to double quotes when the content
/// contains a single quote but no double quote.
pub(crate) fn string_repr_fmt(s: &str, out: &mut String) {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
}
