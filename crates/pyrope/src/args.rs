//! Call-argument packaging.
//!
//! Uses specific variants for the common cases (0-2 arguments) so most
//! calls never allocate; longer argument lists spill into a small vector.

use smallvec::SmallVec;

use crate::{
    exception::{ExcType, RunResult},
    heap::HeapId,
    value::Value,
};

/// Positional arguments for a call.
#[derive(Debug, Clone)]
pub enum ArgValues {
    Empty,
    One(Value),
    Two(Value, Value),
    Many(SmallVec<[Value; 4]>),
}

impl ArgValues {
    /// Number of arguments.
    #[must_use]
    pub fn count(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::One(_) => 1,
            Self::Two(..) => 2,
            Self::Many(args) => args.len(),
        }
    }

    /// Checks that zero arguments were passed.
    pub fn check_zero_args(self, name: &str) -> RunResult<()> {
        match self {
            Self::Empty => Ok(()),
            other => Err(ExcType::arg_count_error(name, 0, other.count())),
        }
    }

    /// Checks that exactly one argument was passed, returning it.
    pub fn get_one_arg(self, name: &str) -> RunResult<Value> {
        match self {
            Self::One(a) => Ok(a),
            Self::Many(args) if args.len() == 1 => Ok(args[0]),
            other => Err(ExcType::arg_count_error(name, 1, other.count())),
        }
    }

    /// Checks that exactly two arguments were passed, returning them.
    pub fn get_two_args(self, name: &str) -> RunResult<(Value, Value)> {
        match self {
            Self::Two(a, b) => Ok((a, b)),
            Self::Many(args) if args.len() == 2 => Ok((args[0], args[1])),
            other => Err(ExcType::arg_count_error(name, 2, other.count())),
        }
    }

    /// Checks that zero or one arguments were passed.
    pub fn get_zero_one_arg(self, name: &str) -> RunResult<Option<Value>> {
        match self {
            Self::Empty => Ok(None),
            Self::One(a) => Ok(Some(a)),
            Self::Many(args) if args.is_empty() => Ok(None),
            Self::Many(args) if args.len() == 1 => Ok(Some(args[0])),
            other => Err(ExcType::arg_count_error(name, 1, other.count())),
        }
    }

    /// Checks that one or two arguments were passed.
    pub fn get_one_two_args(self, name: &str) -> RunResult<(Value, Option<Value>)> {
        match self {
            Self::One(a) => Ok((a, None)),
            Self::Two(a, b) => Ok((a, Some(b))),
            Self::Many(args) if args.len() == 1 => Ok((args[0], None)),
            Self::Many(args) if args.len() == 2 => Ok((args[0], Some(args[1]))),
            other => Err(ExcType::arg_count_error(name, 2, other.count())),
        }
    }

    /// The arguments as an owned vector, e.g. for forwarding to a task.
    #[must_use]
    pub fn into_vec(self) -> Vec<Value> {
        match self {
            Self::Empty => Vec::new(),
            Self::One(a) => vec![a],
            Self::Two(a, b) => vec![a, b],
            Self::Many(args) => args.into_vec(),
        }
    }

    /// Prepends a receiver, as bound-method calls do.
    #[must_use]
    pub fn prepend(self, first: Value) -> Self {
        match self {
            Self::Empty => Self::One(first),
            Self::One(a) => Self::Two(first, a),
            Self::Two(a, b) => Self::Many(SmallVec::from_slice(&[first, a, b])),
            Self::Many(mut args) => {
                args.insert(0, first);
                Self::Many(args)
            }
        }
    }

    /// Appends the heap ids the arguments reference, for cycle collection.
    pub fn collect_child_ids(&self, ids: &mut Vec<HeapId>) {
        match self {
            Self::Empty => {}
            Self::One(a) => a.collect_child_ids(ids),
            Self::Two(a, b) => {
                a.collect_child_ids(ids);
                b.collect_child_ids(ids);
            }
            Self::Many(args) => {
                for arg in args {
                    arg.collect_child_ids(ids);
                }
            }
        }
    }
}

impl From<Vec<Value>> for ArgValues {
    fn from(mut args: Vec<Value>) -> Self {
        match args.len() {
            0 => Self::Empty,
            1 => Self::One(args[0]),
            2 => Self::Two(args[0], args[1]),
            _ => Self::Many(SmallVec::from_vec(std::mem::take(&mut args))),
        }
    }
}
