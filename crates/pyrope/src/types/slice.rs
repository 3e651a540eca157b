use crate::{
    exception::{ExcType, RunResult},
    heap::{Heap, HeapId},
    resource::ResourceTracker,
    types::{PyTrait, Type},
};

/// Slice value: optional start/stop/step as given at the call site.
///
/// Normalization against a concrete sequence length happens at use time via
/// [`Slice::apply_indices`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Slice {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

impl Slice {
    #[must_use]
    pub fn new(start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Self {
        Self { start, stop, step }
    }

    /// Validates the step, rejecting zero.
    pub fn checked_step(&self) -> RunResult<i64> {
        match self.step {
            Some(0) => Err(ExcType::value_error("slice step cannot be zero")),
            Some(step) => Ok(step),
            None => Ok(1),
        }
    }

    /// Returns an iterator over the selected indices of a sequence of the
    /// given length, with Python's clamping rules for out-of-range bounds.
    pub fn apply_indices(&self, len: usize) -> impl Iterator<Item = usize> + use<> {
        let step = self.step.unwrap_or(1);
        let len = len as i64;

        let clamp = |idx: i64, upper: i64| -> i64 {
            let adjusted = if idx < 0 { idx + len } else { idx };
            adjusted.clamp(if step < 0 { -1 } else { 0 }, upper)
        };
        let upper = if step < 0 { len - 1 } else { len };
        let default_start = if step < 0 { len - 1 } else { 0 };
        let default_stop = if step < 0 { -1 } else { len };
        let start = self.start.map_or(default_start, |s| clamp(s, upper));
        let stop = self.stop.map_or(default_stop, |s| clamp(s, upper));

        let mut indices = Vec::new();
        if step > 0 {
            let mut i = start;
            while i < stop {
                indices.push(i as usize);
                i += step;
            }
        } else if step < 0 {
            let mut i = start;
            while i > stop {
                indices.push(i as usize);
                i += step;
            }
        }
        indices.into_iter()
    }
}

impl PyTrait for Slice {
    fn py_type(&self, _heap: &Heap<impl ResourceTracker>) -> Type {
        Type::Slice
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
        let fmt = |v: Option<i64>| v.map_or_else(|| "None".to_string(), |i| i.to_string());
        Ok(format!(
            "slice({}, {}, {})",
            fmt(self.start),
            fmt(self.stop),
            fmt(self.step)
        ))
    }

    fn py_estimate_size(&self) -> usize {
        size_of::<Self>()
    }

    fn collect_child_ids(&self, _ids: &mut Vec<HeapId>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(slice: Slice, len: usize) -> Vec<usize> {
        slice.apply_indices(len).collect()
    }

    #[test]
    fn test_basic_slicing() {
        assert_eq!(collect(Slice::new(Some(1), Some(4), None), 6), vec![1, 2, 3]);
        assert_eq!(collect(Slice::new(None, None, None), 3), vec![0, 1, 2]);
    }

    #[test]
    fn test_negative_bounds_clamp() {
        assert_eq!(collect(Slice::new(Some(-2), None, None), 5), vec![3, 4]);
        assert_eq!(collect(Slice::new(Some(-10), Some(100), None), 3), vec![0, 1, 2]);
    }

    #[test]
    fn test_negative_step() {
        assert_eq!(collect(Slice::new(None, None, Some(-1)), 4), vec![3, 2, 1, 0]);
        assert_eq!(collect(Slice::new(Some(3), Some(0), Some(-2)), 5), vec![3, 1]);
    }

    #[test]
    fn test_zero_step_rejected() {
        assert!(Slice::new(None, None, Some(0)).checked_step().is_err());
    }
}
