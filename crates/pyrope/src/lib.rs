#![doc = include_str!("../../../README.md")]
#![expect(clippy::cast_possible_truncation, reason = "numeric narrowing is checked")]
#![expect(clippy::cast_sign_loss, reason = "sign-changing casts are intentional")]
#![expect(clippy::cast_possible_wrap, reason = "wrap behavior mirrors the source language")]
#![expect(clippy::float_cmp, reason = "numeric parity requires exact float comparison")]

mod args;
mod builtins;
mod exception;
mod heap;
mod intern;
mod py_hash;
mod resource;
mod runtime;
mod sched;
pub mod types;
mod value;

pub use crate::{
    args::ArgValues,
    builtins::Builtins,
    exception::{ExcType, ExceptionObject, RunError, RunResult, SimpleException},
    heap::{Heap, HeapData, HeapId},
    intern::{Interns, StaticStrings, StringId},
    resource::{
        LimitedTracker, MAX_DATA_RECURSION_DEPTH, MAX_INHERITANCE_DEPTH, NoLimitTracker, ResourceError,
        ResourceTracker,
    },
    runtime::{BinaryOp, CmpOp, HostFn, Runtime},
    sched::{Future, FutureState},
    types::{iter::IterTarget, r#type::Type},
    value::{FnId, Value},
};
