//! Cooperative task scheduling and future values.
//!
//! Tasks run to completion on a single thread: a task is a callable plus its
//! arguments, queued with a virtual-time wake tick. The scheduler only
//! manages the queue and the clock; actually invoking the callable (and
//! resolving its future) is the runtime's job, which keeps the borrow of the
//! runtime out of the queue.
//!
//! Time is virtual. `sleep` and timed waits advance a tick counter rather
//! than the wall clock, so scheduling behavior is deterministic and
//! testable. Tasks due at the same tick run in spawn order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::{
    exception::{ExcType, RunResult, SimpleException},
    heap::{Heap, HeapId},
    resource::ResourceTracker,
    types::{PyTrait, Type},
    value::Value,
};

/// Resolution state of a future. Transitions are single-assignment:
/// `Pending` moves to exactly one of the other two states, once.
#[derive(Debug)]
pub enum FutureState {
    Pending,
    Completed(Value),
    Failed(SimpleException),
}

/// A one-shot container for a value produced by a scheduled task.
#[derive(Debug)]
pub struct Future {
    state: FutureState,
    cancelled: bool,
}

impl Future {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: FutureState::Pending,
            cancelled: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> &FutureState {
        &self.state
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        !matches!(self.state, FutureState::Pending)
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Marks the future cancelled. Has no effect once resolved.
    pub fn cancel(&mut self) {
        if !self.is_resolved() {
            self.cancelled = true;
        }
    }

    /// Resolves the future with a value. Resolving twice is an error.
    pub fn complete(&mut self, value: Value) -> RunResult<()> {
        if self.is_resolved() {
            return Err(ExcType::runtime_error("future already resolved"));
        }
        self.state = FutureState::Completed(value);
        Ok(())
    }

    /// Resolves the future with a failure. Resolving twice is an error.
    pub fn fail(&mut self, exc: SimpleException) -> RunResult<()> {
        if self.is_resolved() {
            return Err(ExcType::runtime_error("future already resolved"));
        }
        self.state = FutureState::Failed(exc);
        Ok(())
    }
}

impl Default for Future {
    fn default() -> Self {
        Self::new()
    }
}

impl PyTrait for Future {
    fn py_type(&self, _heap: &Heap<impl ResourceTracker>) -> Type {
        Type::Future
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
        let state = match (&self.state, self.cancelled) {
            (_, true) => "cancelled",
            (FutureState::Pending, _) => "pending",
            (FutureState::Completed(_), _) => "completed",
            (FutureState::Failed(_), _) => "failed",
        };
        Ok(format!("<Future {state}>"))
    }

    fn py_estimate_size(&self) -> usize {
        size_of::<Self>()
    }

    fn collect_child_ids(&self, ids: &mut Vec<HeapId>) {
        if let FutureState::Completed(Value::Ref(id)) = self.state {
            ids.push(id);
        }
    }
}

/// A queued unit of work: call `func(args)` at `wake_at`, resolve `future`.
#[derive(Debug)]
pub struct Task {
    wake_at: u64,
    /// Spawn sequence number; breaks ties between tasks due at the same tick.
    seq: u64,
    pub future: HeapId,
    pub func: Value,
    pub args: Vec<Value>,
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.wake_at == other.wake_at && self.seq == other.seq
    }
}

impl Eq for Task {}

impl Ord for Task {
    // BinaryHeap is a max-heap; reverse so the earliest (wake_at, seq) pops first.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.wake_at, other.seq).cmp(&(self.wake_at, self.seq))
    }
}

impl PartialOrd for Task {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Task queue and virtual clock.
#[derive(Debug, Default)]
pub struct Scheduler {
    queue: BinaryHeap<Task>,
    now: u64,
    next_seq: u64,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time in ticks.
    #[must_use]
    pub fn now(&self) -> u64 {
        self.now
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queues a call due `delay` ticks from now, resolving `future`.
    pub fn push(&mut self, future: HeapId, func: Value, args: Vec<Value>, delay: u64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Task {
            wake_at: self.now.saturating_add(delay),
            seq,
            future,
            func,
            args,
        });
    }

    /// Pops the next due task, advancing the clock to its wake tick.
    ///
    /// With a deadline, tasks due after it stay queued and the clock does
    /// not advance past them.
    pub fn pop_due(&mut self, deadline: Option<u64>) -> Option<Task> {
        let wake_at = self.queue.peek()?.wake_at;
        if deadline.is_some_and(|d| wake_at > d) {
            return None;
        }
        self.now = self.now.max(wake_at);
        self.queue.pop()
    }

    /// Advances the clock without running anything (used after a timed wait
    /// expires with tasks still queued beyond the deadline).
    pub fn advance_to(&mut self, tick: u64) {
        self.now = self.now.max(tick);
    }

    /// Heap ids reachable from queued tasks, for cycle collection.
    pub fn collect_root_ids(&self, ids: &mut Vec<HeapId>) {
        for task in &self.queue {
            ids.push(task.future);
            if let Value::Ref(id) = task.func {
                ids.push(id);
            }
            for arg in &task.args {
                if let Value::Ref(id) = arg {
                    ids.push(*id);
                }
            }
        }
    }
}
