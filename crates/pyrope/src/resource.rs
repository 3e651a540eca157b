use std::fmt;

use crate::exception::{ExcType, RunError, SimpleException};

/// Maximum nesting depth for data-structure traversal (repr, equality, hashing).
///
/// Self-referential containers are legal values; traversals guard with this
/// depth and raise `RecursionError` instead of overflowing the stack.
pub const MAX_DATA_RECURSION_DEPTH: u16 = 100;

/// Maximum depth of a class inheritance chain.
pub const MAX_INHERITANCE_DEPTH: usize = 1000;

/// Error returned when a resource limit is exceeded during execution.
///
/// Allows embedders to enforce strict limits on allocation count and
/// memory usage independent of language-level exceptions.
#[derive(Debug, Clone)]
pub enum ResourceError {
    /// Maximum number of allocations exceeded.
    Allocation { limit: usize, count: usize },
    /// Maximum memory usage exceeded.
    Memory { limit: usize, used: usize },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocation { limit, count } => {
                write!(f, "allocation limit exceeded: {count} > {limit}")
            }
            Self::Memory { limit, used } => {
                write!(f, "memory limit exceeded: {used} bytes > {limit} bytes")
            }
        }
    }
}

impl std::error::Error for ResourceError {}

impl From<ResourceError> for RunError {
    fn from(err: ResourceError) -> Self {
        SimpleException::new(ExcType::MemoryError, Some(err.to_string())).into()
    }
}

/// Trait for tracking heap resource usage.
///
/// Implementations can enforce limits on allocation count and memory.
/// The heap consults the tracker before every allocation; a tracker error
/// aborts the allocation and surfaces as a `MemoryError`-kind failure.
pub trait ResourceTracker: fmt::Debug {
    /// Called before each heap allocation.
    ///
    /// Returns `Ok(())` if the allocation should proceed, or `Err(ResourceError)`
    /// if a limit would be exceeded.
    fn on_allocate(&mut self, get_size: impl FnOnce() -> usize) -> Result<(), ResourceError>;

    /// Called when a heap slot is freed, with the estimated size of the freed data.
    fn on_free(&mut self, size: usize);

    /// Current allocation count, if the tracker counts allocations.
    fn allocations(&self) -> Option<usize> {
        None
    }

    /// Current tracked memory usage in bytes, if the tracker tracks memory.
    fn memory_bytes(&self) -> Option<usize> {
        None
    }
}

/// Tracker that imposes no limits. The default for embedders that trust
/// the compiled program.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLimitTracker;

impl ResourceTracker for NoLimitTracker {
    #[inline]
    fn on_allocate(&mut self, _get_size: impl FnOnce() -> usize) -> Result<(), ResourceError> {
        Ok(())
    }

    #[inline]
    fn on_free(&mut self, _size: usize) {}
}

/// Tracker that enforces allocation-count and memory limits.
#[derive(Debug, Clone)]
pub struct LimitedTracker {
    max_allocations: usize,
    max_memory: usize,
    allocations: usize,
    memory_used: usize,
}

impl LimitedTracker {
    /// Creates a tracker capping total allocations and live memory bytes.
    #[must_use]
    pub fn new(max_allocations: usize, max_memory: usize) -> Self {
        Self {
            max_allocations,
            max_memory,
            allocations: 0,
            memory_used: 0,
        }
    }
}

impl ResourceTracker for LimitedTracker {
    fn on_allocate(&mut self, get_size: impl FnOnce() -> usize) -> Result<(), ResourceError> {
        self.allocations += 1;
        if self.allocations > self.max_allocations {
            return Err(ResourceError::Allocation {
                limit: self.max_allocations,
                count: self.allocations,
            });
        }
        self.memory_used += get_size();
        if self.memory_used > self.max_memory {
            return Err(ResourceError::Memory {
                limit: self.max_memory,
                used: self.memory_used,
            });
        }
        Ok(())
    }

    fn on_free(&mut self, size: usize) {
        self.memory_used = self.memory_used.saturating_sub(size);
    }

    fn allocations(&self) -> Option<usize> {
        Some(self.allocations)
    }

    fn memory_bytes(&self) -> Option<usize> {
        Some(self.memory_used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limited_tracker_allocation_limit() {
        let mut tracker = LimitedTracker::new(2, 1_000_000);
        assert!(tracker.on_allocate(|| 8).is_ok());
        assert!(tracker.on_allocate(|| 8).is_ok());
        assert!(matches!(
            tracker.on_allocate(|| 8),
            Err(ResourceError::Allocation { limit: 2, count: 3 })
        ));
    }

    #[test]
    fn test_limited_tracker_memory_limit() {
        let mut tracker = LimitedTracker::new(100, 64);
        assert!(tracker.on_allocate(|| 32).is_ok());
        assert!(matches!(tracker.on_allocate(|| 64), Err(ResourceError::Memory { .. })));
        tracker.on_free(32);
        assert_eq!(tracker.memory_bytes(), Some(64));
    }
}
