//! Exception taxonomy and runtime error propagation.
//!
//! Failures are values: a [`SimpleException`] carries a taxonomy kind, an
//! optional message, and (once materialized on the heap) constructor
//! arguments. They propagate through `RunResult` until a handler whose
//! declared kind is an ancestor of the failure's kind matches them, or they
//! reach the embedder's uncaught-exception boundary.
//!
//! `StopIteration` is part of the taxonomy but is a control-flow sentinel,
//! not a genuine error: iteration-consuming code converts it to ordinary
//! termination at the iterator boundary (see `types::iter`).

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    heap::{Heap, HeapData},
    resource::ResourceTracker,
    types::{PyTrait, Str, Type},
    value::Value,
};

/// Result type alias for operations that can produce a runtime error.
pub type RunResult<T> = Result<T, RunError>;

/// Exception kinds supported by the runtime.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and `Into<&'static str>`
/// implementations. The string representation matches the variant name exactly
/// (e.g., `ValueError` -> "ValueError").
///
/// The taxonomy is a fixed single-rooted hierarchy: every kind has exactly one
/// ancestor chain back to [`ExcType::BaseException`], exposed via [`ExcType::parent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr, Serialize, Deserialize)]
pub enum ExcType {
    /// Root of the hierarchy; matches every exception.
    BaseException,
    /// Base class for all non-exiting exceptions.
    Exception,

    // --- ArithmeticError hierarchy ---
    /// Intermediate class for arithmetic errors.
    ArithmeticError,
    /// Subclass of ArithmeticError.
    FloatingPointError,
    /// Subclass of ArithmeticError.
    OverflowError,
    /// Subclass of ArithmeticError.
    ZeroDivisionError,

    // --- LookupError hierarchy ---
    /// Intermediate class for lookup errors.
    LookupError,
    /// Subclass of LookupError.
    IndexError,
    /// Subclass of LookupError.
    KeyError,

    // --- RuntimeError hierarchy ---
    /// Intermediate class for runtime errors.
    RuntimeError,
    /// Subclass of RuntimeError.
    NotImplementedError,
    /// Subclass of RuntimeError.
    RecursionError,

    // --- NameError hierarchy ---
    NameError,
    /// Subclass of NameError - for accessing a local before assignment.
    UnboundLocalError,

    // --- ImportError hierarchy ---
    /// Import-related errors (module not found, name not in module).
    ImportError,
    /// Subclass of ImportError.
    ModuleNotFoundError,

    // --- OSError hierarchy ---
    /// OS-related errors (file not found, permission denied, etc.)
    OSError,
    /// Subclass of OSError.
    FileNotFoundError,
    /// Subclass of OSError.
    FileExistsError,
    /// Subclass of OSError.
    PermissionError,

    // --- Standalone exception types ---
    AttributeError,
    TypeError,
    ValueError,
    SyntaxError,
    MemoryError,
    /// Raised when a future's timed `get` elapses before resolution.
    TimeoutError,
    /// Observed by consumers of a cooperatively cancelled future.
    CancelledError,
    /// Iterator-exhaustion sentinel; never a surfaced failure.
    StopIteration,
    /// Base class for warning categories.
    Warning,
}

impl ExcType {
    /// Returns the immediate ancestor kind, or `None` for the root.
    ///
    /// Every kind has exactly one chain of `parent()` links terminating at
    /// `BaseException`; isinstance-style matching walks this chain.
    #[must_use]
    pub fn parent(self) -> Option<Self> {
        match self {
            Self::BaseException => None,
            Self::Exception => Some(Self::BaseException),
            Self::ArithmeticError
            | Self::LookupError
            | Self::RuntimeError
            | Self::NameError
            | Self::ImportError
            | Self::OSError
            | Self::AttributeError
            | Self::TypeError
            | Self::ValueError
            | Self::SyntaxError
            | Self::MemoryError
            | Self::TimeoutError
            | Self::CancelledError
            | Self::StopIteration
            | Self::Warning => Some(Self::Exception),
            Self::FloatingPointError | Self::OverflowError | Self::ZeroDivisionError => Some(Self::ArithmeticError),
            Self::IndexError | Self::KeyError => Some(Self::LookupError),
            Self::NotImplementedError | Self::RecursionError => Some(Self::RuntimeError),
            Self::UnboundLocalError => Some(Self::NameError),
            Self::ModuleNotFoundError => Some(Self::ImportError),
            Self::FileNotFoundError | Self::FileExistsError | Self::PermissionError => Some(Self::OSError),
        }
    }

    /// Checks if this exception kind is the given kind or a descendant of it.
    ///
    /// Walks the `parent()` chain from `self` up to the root, so
    /// `KeyError.is_subclass_of(LookupError)` and every kind matched against
    /// `BaseException` are true. This is the relation used by `except`-style
    /// handler matching.
    #[must_use]
    pub fn is_subclass_of(self, handler_type: Self) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == handler_type {
                return true;
            }
            current = kind.parent();
        }
        false
    }

    /// Returns the exception kind's name, e.g. `"ZeroDivisionError"`.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Creates a TypeError with the given message.
    pub fn type_error(message: impl Into<String>) -> RunError {
        SimpleException::new(Self::TypeError, Some(message.into())).into()
    }

    /// Creates a TypeError for a protocol operation the value's kind does not support.
    pub fn unsupported(op: &str, type_name: &str) -> RunError {
        Self::type_error(format!("unsupported operand type for {op}: '{type_name}'"))
    }

    /// Creates a TypeError for a binary operation unsupported between two kinds.
    pub fn unsupported_binary(op: &str, left: &str, right: &str) -> RunError {
        Self::type_error(format!(
            "unsupported operand type(s) for {op}: '{left}' and '{right}'"
        ))
    }

    /// Creates a TypeError for a call arity mismatch.
    pub fn arg_count_error(name: &str, expected: usize, got: usize) -> RunError {
        Self::type_error(format!(
            "{name}() takes {expected} positional argument{} but {got} {} given",
            if expected == 1 { "" } else { "s" },
            if got == 1 { "was" } else { "were" },
        ))
    }

    /// Creates a ValueError with the given message.
    pub fn value_error(message: impl Into<String>) -> RunError {
        SimpleException::new(Self::ValueError, Some(message.into())).into()
    }

    /// Creates an AttributeError for a missing attribute on a value.
    pub fn attribute_error(type_name: &str, attr: &str) -> RunError {
        SimpleException::new(
            Self::AttributeError,
            Some(format!("'{type_name}' object has no attribute '{attr}'")),
        )
        .into()
    }

    /// Creates an AttributeError with a preformatted message.
    pub fn attribute_error_msg(message: impl Into<String>) -> RunError {
        SimpleException::new(Self::AttributeError, Some(message.into())).into()
    }

    /// Creates an IndexError for an out-of-range sequence index.
    pub fn index_error(type_name: &str) -> RunError {
        SimpleException::new(Self::IndexError, Some(format!("{type_name} index out of range"))).into()
    }

    /// Creates a KeyError whose message is the repr of the missing key.
    pub fn key_error(key_repr: String) -> RunError {
        SimpleException::new(Self::KeyError, Some(key_repr)).into()
    }

    /// Creates a ZeroDivisionError with the given message.
    pub fn zero_division(message: impl Into<String>) -> RunError {
        SimpleException::new(Self::ZeroDivisionError, Some(message.into())).into()
    }

    /// Creates a RuntimeError with the given message.
    pub fn runtime_error(message: impl Into<String>) -> RunError {
        SimpleException::new(Self::RuntimeError, Some(message.into())).into()
    }

    /// Creates a RecursionError for data-structure traversal depth.
    pub fn recursion_error() -> RunError {
        SimpleException::new(Self::RecursionError, Some("maximum recursion depth exceeded".to_string())).into()
    }

    /// Creates the iterator-exhaustion sentinel.
    pub fn stop_iteration() -> RunError {
        SimpleException::new(Self::StopIteration, None).into()
    }

    /// Creates a TimeoutError for a timed future `get`.
    pub fn timeout_error() -> RunError {
        SimpleException::new(Self::TimeoutError, Some("future did not resolve within the timeout".to_string())).into()
    }

    /// Creates a CancelledError for a cancelled future.
    pub fn cancelled_error() -> RunError {
        SimpleException::new(Self::CancelledError, None).into()
    }
}

/// A raised exception in its lightweight propagation form.
///
/// Carries the taxonomy kind and an optional message. Exceptions only get a
/// heap representation (with a constructor-argument tuple) when compiled code
/// stores or inspects them as values; while unwinding they stay as this.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleException {
    exc_type: ExcType,
    message: Option<String>,
}

impl SimpleException {
    /// Creates a new exception of the given kind.
    #[must_use]
    pub fn new(exc_type: ExcType, message: Option<String>) -> Self {
        Self { exc_type, message }
    }

    /// Returns the taxonomy kind.
    #[must_use]
    pub fn exc_type(&self) -> ExcType {
        self.exc_type
    }

    /// Returns the message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Consumes the exception and returns its message.
    #[must_use]
    pub fn into_message(self) -> Option<String> {
        self.message
    }

    /// Materializes this exception as a heap value so compiled code can
    /// store, inspect, or re-raise it.
    pub fn into_value(self, heap: &mut Heap<impl ResourceTracker>) -> RunResult<Value> {
        let args = match self.message {
            Some(msg) => {
                let msg_id = heap.allocate(HeapData::Str(Str::from(msg)))?;
                vec![Value::Ref(msg_id)]
            }
            None => Vec::new(),
        };
        let id = heap.allocate(HeapData::Exception(ExceptionObject::new(self.exc_type, args)))?;
        Ok(Value::Ref(id))
    }
}

impl Display for SimpleException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "{}: {msg}", self.exc_type),
            None => write!(f, "{}", self.exc_type),
        }
    }
}

/// A heap-allocated exception object: kind plus constructor arguments.
///
/// Created by calling an exception kind (`ValueError("bad")`) or by
/// materializing a propagating [`SimpleException`].
#[derive(Debug)]
pub struct ExceptionObject {
    exc_type: ExcType,
    /// Positional constructor arguments, e.g. the message string.
    args: Vec<Value>,
}

impl ExceptionObject {
    /// Creates an exception object from a kind and its constructor arguments.
    #[must_use]
    pub fn new(exc_type: ExcType, args: Vec<Value>) -> Self {
        Self { exc_type, args }
    }

    /// Returns the taxonomy kind of this exception object.
    #[must_use]
    pub fn exc_type(&self) -> ExcType {
        self.exc_type
    }

    /// Returns the constructor arguments.
    #[must_use]
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Converts back to the lightweight propagation form for re-raising.
    pub fn to_simple(&self, heap: &Heap<impl ResourceTracker>) -> RunResult<SimpleException> {
        let message = match self.args.as_slice() {
            [] => None,
            [single] => Some(single.py_str(heap, 0)?),
            many => {
                let mut parts = Vec::with_capacity(many.len());
                for arg in many {
                    parts.push(arg.py_repr(heap, 0)?);
                }
                Some(format!("({})", parts.join(", ")))
            }
        };
        Ok(SimpleException::new(self.exc_type, message))
    }

}

impl PyTrait for ExceptionObject {
    fn py_type(&self, _heap: &Heap<impl ResourceTracker>) -> Type {
        Type::Exception(self.exc_type)
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

    fn py_repr(&self, heap: &Heap<impl ResourceTracker>, depth: u16) -> RunResult<String> {
        let mut parts = Vec::with_capacity(self.args.len());
        for arg in &self.args {
            parts.push(arg.py_repr(heap, depth.saturating_add(1))?);
        }
        Ok(format!("{}({})", self.exc_type, parts.join(", ")))
    }

    fn py_estimate_size(&self) -> usize {
        size_of::<Self>() + self.args.len() * size_of::<Value>()
    }

    fn collect_child_ids(&self, ids: &mut Vec<crate::heap::HeapId>) {
        for arg in &self.args {
            if let Value::Ref(id) = arg {
                ids.push(*id);
            }
        }
    }
}

/// Error type carried by [`RunResult`].
///
/// Language-level exceptions and embedder resource violations both travel
/// this channel; resource violations convert to `MemoryError`-kind failures
/// at the boundary (see `resource.rs`).
#[derive(Debug, Clone, PartialEq)]
pub enum RunError {
    /// A language-level exception unwinding toward a handler.
    Exc(Box<SimpleException>),
}

impl RunError {
    /// Returns the taxonomy kind of the carried exception.
    #[must_use]
    pub fn exc_type(&self) -> ExcType {
        match self {
            Self::Exc(exc) => exc.exc_type(),
        }
    }

    /// Returns true if this error is the iterator-exhaustion sentinel.
    #[must_use]
    pub fn is_stop_iteration(&self) -> bool {
        self.exc_type().is_subclass_of(ExcType::StopIteration)
    }

    /// Returns the carried exception.
    #[must_use]
    pub fn into_simple(self) -> SimpleException {
        match self {
            Self::Exc(exc) => *exc,
        }
    }
}

impl Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exc(exc) => exc.fmt(f),
        }
    }
}

impl From<SimpleException> for RunError {
    fn from(exc: SimpleException) -> Self {
        Self::Exc(Box::new(exc))
    }
}
