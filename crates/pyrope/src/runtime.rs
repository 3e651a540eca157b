//! Runtime entry points: the surface compiled code calls.
//!
//! Every operation the language exposes funnels through a [`Runtime`]
//! method: arithmetic, comparison, attribute access, subscripting,
//! iteration, calling, class creation, and task scheduling. This is the
//! only layer that consults the class model for protocol overrides; the
//! native kinds below it never dispatch through user code.
//!
//! Dispatch order for binary operators mirrors the source language: the
//! left operand's override, then the right operand's reflected override,
//! then the native semantics, then a `TypeError`.

use std::rc::Rc;

use indexmap::IndexMap;
use num_bigint::BigInt;

use crate::{
    args::ArgValues,
    builtins::{self, Builtins},
    exception::{ExcType, ExceptionObject, RunError, RunResult, SimpleException},
    heap::{Heap, HeapData, HeapId},
    intern::{Interns, StaticStrings, StringId},
    resource::ResourceTracker,
    sched::{Future, FutureState, Scheduler},
    types::{
        BoundMethod, ClassMethod, ClassObject, Complex, Dict, Instance, IterTarget, LongInt, Set, SetStorage,
        Slice, StaticMethod, Str, SuperProxy, Type, UserProperty, ValueIter, compute_c3_mro, normalize_sequence_index,
        resolve_class_attr, resolve_super_attr,
    },
    value::{FnId, Value, alloc_frozen, alloc_str},
};

/// Call stack ceiling for host-function re-entry.
const MAX_CALL_DEPTH: u16 = 200;

/// A function registered with the runtime: compiled code or embedder code.
pub type HostFn<T> = dyn Fn(&mut Runtime<T>, ArgValues) -> RunResult<Value>;

struct FunctionEntry<T: ResourceTracker> {
    name: Box<str>,
    func: Rc<HostFn<T>>,
}

impl<T: ResourceTracker> std::fmt::Debug for FunctionEntry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<function {}>", self.name)
    }
}

/// Binary operators routed through [`Runtime::binary_op`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    TrueDiv,
    FloorDiv,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    LShift,
    RShift,
}

impl BinaryOp {
    fn dunder(self) -> StaticStrings {
        match self {
            Self::Add => StaticStrings::DunderAdd,
            Self::Sub => StaticStrings::DunderSub,
            Self::Mul => StaticStrings::DunderMul,
            Self::TrueDiv => StaticStrings::DunderTruediv,
            Self::FloorDiv => StaticStrings::DunderFloordiv,
            Self::Mod => StaticStrings::DunderMod,
            Self::Pow => StaticStrings::DunderPow,
            Self::BitAnd => StaticStrings::DunderAnd,
            Self::BitOr => StaticStrings::DunderOr,
            Self::BitXor => StaticStrings::DunderXor,
            Self::LShift => StaticStrings::DunderLshift,
            Self::RShift => StaticStrings::DunderRshift,
        }
    }

    /// The override probed on the right operand, or `None` for operators
    /// without a reflected form.
    fn reflected(self) -> Option<StaticStrings> {
        match self {
            Self::Add => Some(StaticStrings::DunderRadd),
            Self::Sub => Some(StaticStrings::DunderRsub),
            Self::Mul => Some(StaticStrings::DunderRmul),
            Self::TrueDiv => Some(StaticStrings::DunderRtruediv),
            Self::FloorDiv => Some(StaticStrings::DunderRfloordiv),
            Self::Mod => Some(StaticStrings::DunderRmod),
            Self::Pow => Some(StaticStrings::DunderRpow),
            Self::BitAnd => Some(StaticStrings::DunderRand),
            Self::BitOr => Some(StaticStrings::DunderRor),
            Self::BitXor => Some(StaticStrings::DunderRxor),
            Self::LShift | Self::RShift => None,
        }
    }
}

/// Comparison operators routed through [`Runtime::compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    fn dunder(self) -> StaticStrings {
        match self {
            Self::Eq => StaticStrings::DunderEq,
            Self::Ne => StaticStrings::DunderNe,
            Self::Lt => StaticStrings::DunderLt,
            Self::Le => StaticStrings::DunderLe,
            Self::Gt => StaticStrings::DunderGt,
            Self::Ge => StaticStrings::DunderGe,
        }
    }

    /// The operator the right operand answers: `a < b` asks `b.__gt__(a)`.
    fn swapped(self) -> Self {
        match self {
            Self::Eq => Self::Eq,
            Self::Ne => Self::Ne,
            Self::Lt => Self::Gt,
            Self::Le => Self::Ge,
            Self::Gt => Self::Lt,
            Self::Ge => Self::Le,
        }
    }
}

/// What an attribute operation is aimed at, probed before borrowing.
enum AttrTarget {
    Instance(HeapId),
    Class,
    Super(SuperProxy),
    Exception,
    Other,
}

/// Subscript-assignable native kinds.
enum MutableKind {
    List,
    Dict,
    Other,
}

/// Intermediate result of a native subscript, before allocation.
enum Subscript {
    Value(Value),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Str(String),
}

/// The runtime: heap, interned names, registered functions, and scheduler.
#[derive(Debug)]
pub struct Runtime<T: ResourceTracker> {
    pub heap: Heap<T>,
    pub interns: Interns,
    functions: Vec<FunctionEntry<T>>,
    sched: Scheduler,
    /// Embedder-registered GC roots (globals of the compiled program).
    roots: Vec<Value>,
    call_depth: u16,
}

impl<T: ResourceTracker> Runtime<T> {
    #[must_use]
    pub fn new(tracker: T) -> Self {
        Self {
            heap: Heap::new(tracker),
            interns: Interns::new(),
            functions: Vec::new(),
            sched: Scheduler::new(),
            roots: Vec::new(),
            call_depth: 0,
        }
    }

    /// Registers a callable, returning the value that invokes it.
    pub fn register_function(
        &mut self,
        name: impl Into<Box<str>>,
        func: impl Fn(&mut Self, ArgValues) -> RunResult<Value> + 'static,
    ) -> Value {
        let id = FnId(u32::try_from(self.functions.len()).unwrap_or(u32::MAX));
        self.functions.push(FunctionEntry {
            name: name.into(),
            func: Rc::new(func),
        });
        Value::Function(id)
    }

    /// Registers a value as a GC root for the lifetime of the runtime.
    pub fn add_root(&mut self, value: Value) {
        self.roots.push(value);
    }

    /// Interns an attribute or slot name, returning its id.
    pub fn intern_name(&mut self, name: &str) -> StringId {
        self.interns.intern(name)
    }

    /// Allocates a string value.
    pub fn new_str(&mut self, s: impl Into<String>) -> RunResult<Value> {
        alloc_str(&mut self.heap, Str::from(s.into()))
    }

    /// Allocates a list value.
    pub fn new_list(&mut self, values: Vec<Value>) -> RunResult<Value> {
        Ok(Value::Ref(self.heap.allocate_list(values)?))
    }

    /// Allocates a tuple value.
    pub fn new_tuple(&mut self, values: Vec<Value>) -> RunResult<Value> {
        Ok(Value::Ref(self.heap.allocate_tuple(values)?))
    }

    /// Allocates an empty dict.
    pub fn new_dict(&mut self) -> RunResult<Value> {
        Ok(Value::Ref(self.heap.allocate(HeapData::Dict(Dict::new()))?))
    }

    /// Builds a set from values, deduplicating by equality.
    pub fn new_set(&mut self, values: Vec<Value>) -> RunResult<Value> {
        let storage = SetStorage::from_values(values, &self.heap)?;
        Ok(Value::Ref(self.heap.allocate(HeapData::Set(Set::new(storage)))?))
    }

    /// Allocates a slice value for subscripting.
    pub fn new_slice(&mut self, start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> RunResult<Value> {
        Ok(Value::Ref(self.heap.allocate(HeapData::Slice(Slice::new(start, stop, step)))?))
    }

    /// Mark-sweep collection over everything reachable from registered
    /// roots, scheduler state, and `extra_roots`. Returns objects freed.
    pub fn gc(&mut self, extra_roots: &[Value]) -> usize {
        let mut ids = Vec::new();
        for value in self.roots.iter().chain(extra_roots) {
            value.collect_child_ids(&mut ids);
        }
        self.sched.collect_root_ids(&mut ids);
        self.heap.collect_cycles(ids)
    }

    // --- calling ---

    /// Calls any callable value with the given arguments.
    pub fn call_value(&mut self, func: Value, args: ArgValues) -> RunResult<Value> {
        if self.call_depth >= MAX_CALL_DEPTH {
            return Err(ExcType::recursion_error());
        }
        self.call_depth += 1;
        let result = self.call_value_inner(func, args);
        self.call_depth -= 1;
        result
    }

    fn call_value_inner(&mut self, func: Value, args: ArgValues) -> RunResult<Value> {
        match func {
            Value::Function(FnId(id)) => {
                let entry = self
                    .functions
                    .get(id as usize)
                    .ok_or_else(|| ExcType::runtime_error("dangling function reference"))?;
                let f = Rc::clone(&entry.func);
                f(self, args)
            }
            Value::Builtin(b) => self.call_builtin(b, args),
            Value::Ref(id) => {
                enum Callee {
                    Class,
                    Bound(BoundMethod),
                    Instance,
                    Other,
                }
                let callee = match self.heap.get(id) {
                    HeapData::Class(_) => Callee::Class,
                    HeapData::BoundMethod(bm) => Callee::Bound(*bm),
                    HeapData::Instance(_) => Callee::Instance,
                    _ => Callee::Other,
                };
                match callee {
                    Callee::Class => self.instantiate(id, args),
                    Callee::Bound(bm) => self.call_value(bm.func, args.prepend(bm.receiver)),
                    Callee::Instance => match self.find_dunder(func, StaticStrings::DunderCall)? {
                        Some(call) => self.call_value(call, args.prepend(func)),
                        None => Err(self.not_callable(&func)),
                    },
                    Callee::Other => Err(self.not_callable(&func)),
                }
            }
            _ => Err(self.not_callable(&func)),
        }
    }

    fn not_callable(&self, func: &Value) -> RunError {
        ExcType::type_error(format!("'{}' object is not callable", func.py_type(&self.heap).name()))
    }

    fn call_builtin(&mut self, builtin: Builtins, args: ArgValues) -> RunResult<Value> {
        match builtin {
            Builtins::Len => {
                let value = args.get_one_arg("len")?;
                let n = self.len_of(&value)?;
                Ok(Value::Int(n as i64))
            }
            Builtins::Repr => {
                let value = args.get_one_arg("repr")?;
                let repr = self.repr_value(&value)?;
                self.new_str(repr)
            }
            Builtins::Hash => {
                let value = args.get_one_arg("hash")?;
                self.hash_of(&value).map(Value::Int)
            }
            Builtins::Abs => {
                let value = args.get_one_arg("abs")?;
                builtins::builtin_abs(&value, &mut self.heap)
            }
            Builtins::IsInstance => {
                let (value, classinfo) = args.get_two_args("isinstance")?;
                builtins::isinstance(&value, &classinfo, &self.heap).map(Value::Bool)
            }
            Builtins::IsSubclass => {
                let (cls, classinfo) = args.get_two_args("issubclass")?;
                builtins::issubclass(&cls, &classinfo, &self.heap).map(Value::Bool)
            }
            Builtins::Iter => {
                let value = args.get_one_arg("iter")?;
                self.iter_value(&value)
            }
            Builtins::Next => {
                let value = args.get_one_arg("next")?;
                if self.is_instance_value(&value) {
                    self.iter_next(&value)?.ok_or_else(ExcType::stop_iteration)
                } else {
                    builtins::builtin_next(&value, &mut self.heap)
                }
            }
            Builtins::Kind(t) => self.construct_kind(t, args),
            Builtins::Exc(exc_type) => {
                let exc = ExceptionObject::new(exc_type, args.into_vec());
                Ok(Value::Ref(self.heap.allocate(HeapData::Exception(exc))?))
            }
        }
    }

    fn construct_kind(&mut self, kind: Type, args: ArgValues) -> RunResult<Value> {
        match kind {
            Type::Bool => {
                let arg = args.get_zero_one_arg("bool")?;
                Ok(Value::Bool(match arg {
                    Some(v) => self.truthy(&v)?,
                    None => false,
                }))
            }
            Type::Int => self.construct_int(args),
            Type::Float => self.construct_float(args),
            Type::Complex => {
                let (real, imag) = if args.count() == 0 {
                    (0.0, 0.0)
                } else {
                    let (r, i) = args.get_one_two_args("complex")?;
                    let real = self.to_float("complex", &r)?;
                    let imag = match i {
                        Some(i) => self.to_float("complex", &i)?,
                        None => 0.0,
                    };
                    (real, imag)
                };
                Ok(Value::Ref(self.heap.allocate(HeapData::Complex(Complex::new(real, imag)))?))
            }
            Type::Str => {
                let s = match args.get_zero_one_arg("str")? {
                    Some(v) => self.str_value(&v)?,
                    None => String::new(),
                };
                self.new_str(s)
            }
            Type::List => {
                let values = self.constructor_elements(args, "list")?;
                self.new_list(values)
            }
            Type::Tuple => {
                let values = self.constructor_elements(args, "tuple")?;
                self.new_tuple(values)
            }
            Type::Set => {
                let values = self.constructor_elements(args, "set")?;
                self.new_set(values)
            }
            Type::FrozenSet => {
                let values = self.constructor_elements(args, "frozenset")?;
                let storage = SetStorage::from_values(values, &self.heap)?;
                alloc_frozen(&mut self.heap, storage)
            }
            Type::Dict => {
                let dict = match args.get_zero_one_arg("dict")? {
                    None => Dict::new(),
                    Some(value) => {
                        let copied = match value {
                            Value::Ref(id) => match self.heap.get(id) {
                                HeapData::Dict(d) => Some(d.copy()),
                                _ => None,
                            },
                            _ => None,
                        };
                        copied.ok_or_else(|| {
                            ExcType::type_error(format!(
                                "dict() argument must be a mapping, not '{}'",
                                value.py_type(&self.heap).name()
                            ))
                        })?
                    }
                };
                Ok(Value::Ref(self.heap.allocate(HeapData::Dict(dict))?))
            }
            _ => Err(ExcType::type_error(format!("cannot create '{}' instances", kind.name()))),
        }
    }

    /// The materialized elements for a container constructor's optional
    /// iterable argument.
    fn constructor_elements(&mut self, args: ArgValues, name: &str) -> RunResult<Vec<Value>> {
        match args.get_zero_one_arg(name)? {
            Some(v) => self.materialize_iterable(&v),
            None => Ok(Vec::new()),
        }
    }

    fn construct_int(&mut self, args: ArgValues) -> RunResult<Value> {
        let Some(arg) = args.get_zero_one_arg("int")? else {
            return Ok(Value::Int(0));
        };
        match arg {
            Value::Bool(b) => Ok(Value::Int(i64::from(b))),
            Value::Int(_) => Ok(arg),
            Value::Float(f) => {
                if !f.is_finite() {
                    return Err(ExcType::value_error("cannot convert float infinity or NaN to integer"));
                }
                let truncated = f.trunc();
                if (i64::MIN as f64..=i64::MAX as f64).contains(&truncated) {
                    Ok(Value::Int(truncated as i64))
                } else {
                    Ok(LongInt::new(BigInt::from(truncated as i128)).into_value(&mut self.heap)?)
                }
            }
            Value::Ref(id) => {
                let parsed = match self.heap.get(id) {
                    HeapData::LongInt(_) => return Ok(arg),
                    HeapData::Str(s) => s
                        .as_str()
                        .trim()
                        .parse::<BigInt>()
                        .map_err(|_| ExcType::value_error(format!("invalid literal for int(): '{}'", s.as_str()))),
                    _ => Err(self.conversion_error("int", &arg)),
                }?;
                Ok(LongInt::new(parsed).into_value(&mut self.heap)?)
            }
            _ => Err(self.conversion_error("int", &arg)),
        }
    }

    fn construct_float(&mut self, args: ArgValues) -> RunResult<Value> {
        let Some(arg) = args.get_zero_one_arg("float")? else {
            return Ok(Value::Float(0.0));
        };
        if let Value::Ref(id) = arg
            && let HeapData::Str(s) = self.heap.get(id)
        {
            let text = s.as_str().trim();
            let parsed = match text {
                "inf" | "+inf" | "Infinity" | "+Infinity" => Ok(f64::INFINITY),
                "-inf" | "-Infinity" => Ok(f64::NEG_INFINITY),
                "nan" | "+nan" | "-nan" => Ok(f64::NAN),
                other => other
                    .parse::<f64>()
                    .map_err(|_| ExcType::value_error(format!("could not convert string to float: '{other}'"))),
            }?;
            return Ok(Value::Float(parsed));
        }
        Ok(Value::Float(self.to_float("float", &arg)?))
    }

    fn to_float(&self, func: &str, value: &Value) -> RunResult<f64> {
        match value {
            Value::Bool(b) => Ok(f64::from(*b)),
            Value::Int(i) => Ok(*i as f64),
            Value::Float(f) => Ok(*f),
            Value::Ref(id) => match self.heap.get(*id) {
                HeapData::LongInt(l) => Ok(l.to_f64()),
                _ => Err(self.conversion_error(func, value)),
            },
            _ => Err(self.conversion_error(func, value)),
        }
    }

    fn conversion_error(&self, func: &str, value: &Value) -> RunError {
        ExcType::type_error(format!(
            "{func}() argument must be a number, not '{}'",
            value.py_type(&self.heap).name()
        ))
    }

    // --- operators ---

    /// Binary operator with protocol-override dispatch.
    pub fn binary_op(&mut self, op: BinaryOp, lhs: Value, rhs: Value) -> RunResult<Value> {
        if let Some(result) = self.try_dunder(lhs, op.dunder(), rhs)? {
            return Ok(result);
        }
        if let Some(reflected) = op.reflected()
            && let Some(result) = self.try_dunder(rhs, reflected, lhs)?
        {
            return Ok(result);
        }
        match op {
            BinaryOp::Add => lhs.py_add(&rhs, &mut self.heap),
            BinaryOp::Sub => lhs.py_sub(&rhs, &mut self.heap),
            BinaryOp::Mul => lhs.py_mul(&rhs, &mut self.heap),
            BinaryOp::TrueDiv => lhs.py_truediv(&rhs, &mut self.heap),
            BinaryOp::FloorDiv => lhs.py_floordiv(&rhs, &mut self.heap),
            BinaryOp::Mod => lhs.py_mod(&rhs, &mut self.heap),
            BinaryOp::Pow => lhs.py_pow(&rhs, &mut self.heap),
            BinaryOp::BitAnd => lhs.py_bitand(&rhs, &mut self.heap),
            BinaryOp::BitOr => lhs.py_bitor(&rhs, &mut self.heap),
            BinaryOp::BitXor => lhs.py_bitxor(&rhs, &mut self.heap),
            BinaryOp::LShift => lhs.py_lshift(&rhs, &mut self.heap),
            BinaryOp::RShift => lhs.py_rshift(&rhs, &mut self.heap),
        }
    }

    /// Comparison with protocol-override dispatch.
    pub fn compare(&mut self, op: CmpOp, lhs: Value, rhs: Value) -> RunResult<Value> {
        if let Some(result) = self.try_dunder(lhs, op.dunder(), rhs)? {
            return Ok(result);
        }
        if let Some(result) = self.try_dunder(rhs, op.swapped().dunder(), lhs)? {
            return Ok(result);
        }
        let outcome = match op {
            CmpOp::Eq => lhs.py_eq(&rhs, &self.heap),
            CmpOp::Ne => !lhs.py_eq(&rhs, &self.heap),
            _ => {
                let Some(ordering) = lhs.py_cmp(&rhs, &self.heap) else {
                    return Err(ExcType::type_error(format!(
                        "'{}' not supported between instances of '{}' and '{}'",
                        op.symbol(),
                        lhs.py_type(&self.heap).name(),
                        rhs.py_type(&self.heap).name()
                    )));
                };
                match op {
                    CmpOp::Lt => ordering.is_lt(),
                    CmpOp::Le => ordering.is_le(),
                    CmpOp::Gt => ordering.is_gt(),
                    CmpOp::Ge => ordering.is_ge(),
                    CmpOp::Eq | CmpOp::Ne => unreachable!(),
                }
            }
        };
        Ok(Value::Bool(outcome))
    }

    /// Unary minus with `__neg__` dispatch.
    pub fn negate(&mut self, value: Value) -> RunResult<Value> {
        if let Some(result) = self.call_nullary_dunder(value, StaticStrings::DunderNeg)? {
            return Ok(result);
        }
        value.py_neg(&mut self.heap)
    }

    /// Unary plus with `__pos__` dispatch.
    pub fn positive(&mut self, value: Value) -> RunResult<Value> {
        if let Some(result) = self.call_nullary_dunder(value, StaticStrings::DunderPos)? {
            return Ok(result);
        }
        value.py_pos(&mut self.heap)
    }

    /// Bitwise complement with `__invert__` dispatch.
    pub fn invert(&mut self, value: Value) -> RunResult<Value> {
        if let Some(result) = self.call_nullary_dunder(value, StaticStrings::DunderInvert)? {
            return Ok(result);
        }
        value.py_invert(&mut self.heap)
    }

    /// Truthiness with `__bool__` then `__len__` dispatch.
    pub fn truthy(&mut self, value: &Value) -> RunResult<bool> {
        if let Some(result) = self.call_nullary_dunder(*value, StaticStrings::DunderBool)? {
            return match result {
                Value::Bool(b) => Ok(b),
                other => Err(ExcType::type_error(format!(
                    "__bool__ should return bool, returned {}",
                    other.py_type(&self.heap).name()
                ))),
            };
        }
        if let Some(result) = self.call_nullary_dunder(*value, StaticStrings::DunderLen)? {
            return Ok(self.expect_index("__len__", result)? != 0);
        }
        Ok(value.py_bool(&self.heap))
    }

    /// Element count with `__len__` dispatch.
    pub fn len_of(&mut self, value: &Value) -> RunResult<usize> {
        if let Some(result) = self.call_nullary_dunder(*value, StaticStrings::DunderLen)? {
            let n = self.expect_index("__len__", result)?;
            return usize::try_from(n).map_err(|_| ExcType::value_error("__len__() should return >= 0"));
        }
        match builtins::builtin_len(value, &self.heap)? {
            Value::Int(n) => Ok(n as usize),
            _ => unreachable!(),
        }
    }

    /// Hash with `__hash__` dispatch; instances default to identity.
    pub fn hash_of(&mut self, value: &Value) -> RunResult<i64> {
        if let Some(result) = self.call_nullary_dunder(*value, StaticStrings::DunderHash)? {
            return self.expect_index("__hash__", result);
        }
        match builtins::builtin_hash(value, &self.heap)? {
            Value::Int(h) => Ok(h),
            _ => unreachable!(),
        }
    }

    /// Debug representation with `__repr__` dispatch.
    pub fn repr_value(&mut self, value: &Value) -> RunResult<String> {
        if let Some(result) = self.call_nullary_dunder(*value, StaticStrings::DunderRepr)? {
            return self.expect_str("__repr__", result);
        }
        value.py_repr(&self.heap, 0)
    }

    /// Display form with `__str__` then `__repr__` dispatch.
    pub fn str_value(&mut self, value: &Value) -> RunResult<String> {
        if let Some(result) = self.call_nullary_dunder(*value, StaticStrings::DunderStr)? {
            return self.expect_str("__str__", result);
        }
        if let Some(result) = self.call_nullary_dunder(*value, StaticStrings::DunderRepr)? {
            return self.expect_str("__repr__", result);
        }
        value.py_str(&self.heap, 0)
    }

    /// Membership with `__contains__` dispatch.
    pub fn contains(&mut self, container: Value, item: Value) -> RunResult<bool> {
        if let Some(result) = self.try_dunder(container, StaticStrings::DunderContains, item)? {
            return self.truthy(&result);
        }
        container.py_contains(&item, &self.heap)
    }

    fn expect_str(&self, dunder: &str, value: Value) -> RunResult<String> {
        if let Value::Ref(id) = value
            && let HeapData::Str(s) = self.heap.get(id)
        {
            return Ok(s.as_str().to_string());
        }
        Err(ExcType::type_error(format!(
            "{dunder} returned non-string (type {})",
            value.py_type(&self.heap).name()
        )))
    }

    fn expect_index(&self, dunder: &str, value: Value) -> RunResult<i64> {
        match value {
            Value::Bool(b) => Ok(i64::from(b)),
            Value::Int(i) => Ok(i),
            _ => Err(ExcType::type_error(format!(
                "{dunder} should return int, returned {}",
                value.py_type(&self.heap).name()
            ))),
        }
    }

    // --- subscripting ---

    /// `container[index]` with `__getitem__` dispatch.
    pub fn get_item(&mut self, container: Value, index: Value) -> RunResult<Value> {
        if let Some(result) = self.try_dunder(container, StaticStrings::DunderGetitem, index)? {
            return Ok(result);
        }
        let Value::Ref(id) = container else {
            return Err(self.not_subscriptable(&container));
        };
        let item = match self.heap.get(id) {
            HeapData::List(list) => match index {
                Value::Int(i) => Subscript::Value(list.get_index(i)?),
                Value::Ref(slice_id) => match self.heap.get(slice_id) {
                    HeapData::Slice(slice) => {
                        slice.checked_step()?;
                        Subscript::List(list.get_slice(slice))
                    }
                    _ => return Err(self.bad_index(&container, &index)),
                },
                _ => return Err(self.bad_index(&container, &index)),
            },
            HeapData::Tuple(tuple) => match index {
                Value::Int(i) => Subscript::Value(tuple.get_index(i)?),
                Value::Ref(slice_id) => match self.heap.get(slice_id) {
                    HeapData::Slice(slice) => {
                        slice.checked_step()?;
                        Subscript::Tuple(tuple.get_slice(slice))
                    }
                    _ => return Err(self.bad_index(&container, &index)),
                },
                _ => return Err(self.bad_index(&container, &index)),
            },
            HeapData::Str(s) => match index {
                Value::Int(i) => {
                    let idx = normalize_sequence_index(i, s.len_chars(), "string")?;
                    let ch = s.char_at(idx).ok_or_else(|| ExcType::index_error("string"))?;
                    Subscript::Str(ch.to_string())
                }
                Value::Ref(slice_id) => match self.heap.get(slice_id) {
                    HeapData::Slice(slice) => {
                        slice.checked_step()?;
                        let chars: Vec<char> = s.as_str().chars().collect();
                        Subscript::Str(slice.apply_indices(chars.len()).map(|i| chars[i]).collect())
                    }
                    _ => return Err(self.bad_index(&container, &index)),
                },
                _ => return Err(self.bad_index(&container, &index)),
            },
            HeapData::Bytes(b) => match index {
                Value::Int(i) => {
                    let idx = normalize_sequence_index(i, b.len(), "bytes")?;
                    Subscript::Value(Value::Int(b.byte_at(idx).ok_or_else(|| ExcType::index_error("bytes"))?))
                }
                _ => return Err(self.bad_index(&container, &index)),
            },
            HeapData::Dict(dict) => match dict.get(&index, &self.heap)? {
                Some(value) => Subscript::Value(value),
                None => return Err(self.missing_key(&index)),
            },
            _ => return Err(self.not_subscriptable(&container)),
        };
        match item {
            Subscript::Value(v) => Ok(v),
            Subscript::List(values) => self.new_list(values),
            Subscript::Tuple(values) => self.new_tuple(values),
            Subscript::Str(s) => self.new_str(s),
        }
    }

    /// `container[index] = value` with `__setitem__` dispatch.
    pub fn set_item(&mut self, container: Value, index: Value, value: Value) -> RunResult<()> {
        if self.is_instance_value(&container) {
            if let Some(method) = self.find_dunder(container, StaticStrings::DunderSetitem)? {
                self.call_value(method, ArgValues::Two(index, value).prepend(container))?;
                return Ok(());
            }
            return Err(self.no_item_assignment(&container));
        }
        let Value::Ref(id) = container else {
            return Err(self.no_item_assignment(&container));
        };
        match self.mutable_kind(id) {
            MutableKind::List => {
                let Value::Int(i) = index else {
                    return Err(self.bad_index(&container, &index));
                };
                let HeapData::List(list) = self.heap.get_mut(id) else {
                    unreachable!()
                };
                list.set_index(i, value)
            }
            MutableKind::Dict => {
                // The dict steps out of its slot so key hashing can read the heap.
                let mut dict = self.take_dict(id);
                let result = dict.set(index, value, &self.heap);
                *self.heap.get_mut(id) = HeapData::Dict(dict);
                result
            }
            MutableKind::Other => Err(self.no_item_assignment(&container)),
        }
    }

    /// `del container[index]` with `__delitem__` dispatch.
    pub fn del_item(&mut self, container: Value, index: Value) -> RunResult<()> {
        if self.is_instance_value(&container) {
            if let Some(method) = self.find_dunder(container, StaticStrings::DunderDelitem)? {
                self.call_value(method, ArgValues::One(index).prepend(container))?;
                return Ok(());
            }
            return Err(self.no_item_assignment(&container));
        }
        let Value::Ref(id) = container else {
            return Err(self.no_item_assignment(&container));
        };
        match self.mutable_kind(id) {
            MutableKind::List => {
                let Value::Int(i) = index else {
                    return Err(self.bad_index(&container, &index));
                };
                let HeapData::List(list) = self.heap.get_mut(id) else {
                    unreachable!()
                };
                list.delete_index(i).map(|_| ())
            }
            MutableKind::Dict => {
                let mut dict = self.take_dict(id);
                let result = dict.pop(&index, &self.heap);
                *self.heap.get_mut(id) = HeapData::Dict(dict);
                match result? {
                    Some(_) => Ok(()),
                    None => Err(self.missing_key(&index)),
                }
            }
            MutableKind::Other => Err(self.no_item_assignment(&container)),
        }
    }

    fn mutable_kind(&self, id: HeapId) -> MutableKind {
        match self.heap.get(id) {
            HeapData::List(_) => MutableKind::List,
            HeapData::Dict(_) => MutableKind::Dict,
            _ => MutableKind::Other,
        }
    }

    fn take_dict(&mut self, id: HeapId) -> Dict {
        match std::mem::replace(self.heap.get_mut(id), HeapData::Dict(Dict::new())) {
            HeapData::Dict(dict) => dict,
            _ => unreachable!("take_dict on a non-dict slot"),
        }
    }

    fn not_subscriptable(&self, container: &Value) -> RunError {
        ExcType::type_error(format!(
            "'{}' object is not subscriptable",
            container.py_type(&self.heap).name()
        ))
    }

    fn no_item_assignment(&self, container: &Value) -> RunError {
        ExcType::type_error(format!(
            "'{}' object does not support item assignment",
            container.py_type(&self.heap).name()
        ))
    }

    fn bad_index(&self, container: &Value, index: &Value) -> RunError {
        ExcType::type_error(format!(
            "{} indices must be integers, not {}",
            container.py_type(&self.heap).name(),
            index.py_type(&self.heap).name()
        ))
    }

    fn missing_key(&self, key: &Value) -> RunError {
        let repr = key.py_repr(&self.heap, 0).unwrap_or_else(|_| "<key>".to_string());
        ExcType::key_error(repr)
    }

    // --- iteration ---

    /// `iter(value)` with `__iter__` dispatch.
    pub fn iter_value(&mut self, value: &Value) -> RunResult<Value> {
        if let Some(result) = self.call_nullary_dunder(*value, StaticStrings::DunderIter)? {
            return Ok(result);
        }
        builtins::builtin_iter(value, &mut self.heap)
    }

    /// Advances an iterator: `Ok(Some(item))` while live, `Ok(None)` once
    /// exhausted. User iterators signal exhaustion by raising
    /// `StopIteration`, converted to `None` here so loops never unwind.
    pub fn iter_next(&mut self, iterator: &Value) -> RunResult<Option<Value>> {
        if self.is_instance_value(iterator) {
            let Some(method) = self.find_dunder(*iterator, StaticStrings::DunderNext)? else {
                return Err(ExcType::type_error(format!(
                    "'{}' object is not an iterator",
                    iterator.py_type(&self.heap).name()
                )));
            };
            return match self.call_value(method, ArgValues::One(*iterator)) {
                Ok(value) => Ok(Some(value)),
                Err(err) if err.is_stop_iteration() => Ok(None),
                Err(err) => Err(err),
            };
        }
        builtins::advance_iterator(iterator, &mut self.heap)
    }

    /// Iterates a value to completion, collecting the elements.
    pub fn materialize_iterable(&mut self, value: &Value) -> RunResult<Vec<Value>> {
        let iterator = self.iter_value(value)?;
        let mut out = Vec::new();
        while let Some(item) = self.iter_next(&iterator)? {
            out.push(item);
        }
        Ok(out)
    }

    /// A dict-view iterator over keys, values, or items.
    pub fn dict_view_iter(&mut self, dict: Value, target: IterTarget) -> RunResult<Value> {
        let Value::Ref(id) = dict else {
            return Err(ExcType::type_error("dict view over a non-dict object"));
        };
        let iter = ValueIter::over_dict(id, target, &self.heap)?;
        Ok(Value::Ref(self.heap.allocate(HeapData::Iter(iter))?))
    }

    // --- attributes and classes ---

    /// Builds a class object from a name, base classes, and an evaluated
    /// class body (namespace entries in definition order).
    pub fn build_class(&mut self, name: &str, bases: &[Value], namespace: Vec<(StringId, Value)>) -> RunResult<Value> {
        let mut base_ids = Vec::with_capacity(bases.len());
        for base in bases {
            match base {
                Value::Ref(id) if matches!(self.heap.get(*id), HeapData::Class(_)) => base_ids.push(*id),
                _ => {
                    return Err(ExcType::type_error(format!(
                        "class '{name}' base is not a class: '{}'",
                        base.py_type(&self.heap).name()
                    )));
                }
            }
        }

        let slot_layout = self.extract_slot_layout(&namespace, &base_ids)?;
        let table: IndexMap<StringId, Value> = namespace.into_iter().collect();
        let class_id = self.heap.allocate(HeapData::Class(ClassObject::new(name, table, base_ids.clone())))?;
        let mro = compute_c3_mro(class_id, &base_ids, &self.heap)?;
        let HeapData::Class(cls) = self.heap.get_mut(class_id) else {
            unreachable!()
        };
        cls.set_mro(mro);
        if let Some(layout) = slot_layout {
            cls.set_slot_layout(layout);
        }
        self.heap.bump_class_epoch();
        Ok(Value::Ref(class_id))
    }

    /// Resolves the declared slot layout: inherited slot names first, then
    /// the class's own `__slots__` entries in declaration order. A class
    /// without its own `__slots__` keeps an open attribute table.
    fn extract_slot_layout(
        &mut self,
        namespace: &[(StringId, Value)],
        base_ids: &[HeapId],
    ) -> RunResult<Option<Vec<StringId>>> {
        let slots_key: StringId = StaticStrings::DunderSlots.into();
        let Some(own) = namespace.iter().find(|(name, _)| *name == slots_key).map(|(_, v)| *v) else {
            return Ok(None);
        };

        let mut layout: Vec<StringId> = Vec::new();
        for &base_id in base_ids {
            if let HeapData::Class(base) = self.heap.get(base_id)
                && let Some(inherited) = base.slot_layout()
            {
                for &slot in inherited {
                    if !layout.contains(&slot) {
                        layout.push(slot);
                    }
                }
            }
        }

        let Value::Ref(id) = own else {
            return Err(ExcType::type_error("__slots__ must be a tuple of strings"));
        };
        let elements: Vec<Value> = match self.heap.get(id) {
            HeapData::Tuple(t) => t.as_slice().to_vec(),
            HeapData::List(l) => l.as_slice().to_vec(),
            _ => return Err(ExcType::type_error("__slots__ must be a tuple of strings")),
        };
        let mut names = Vec::with_capacity(elements.len());
        for element in elements {
            let Value::Ref(name_id) = element else {
                return Err(ExcType::type_error("__slots__ entries must be strings"));
            };
            let HeapData::Str(s) = self.heap.get(name_id) else {
                return Err(ExcType::type_error("__slots__ entries must be strings"));
            };
            names.push(s.as_str().to_string());
        }
        for name in names {
            let slot = self.interns.intern(&name);
            if !layout.contains(&slot) {
                layout.push(slot);
            }
        }
        Ok(Some(layout))
    }

    /// Creates an instance of a class, running `__init__` if defined.
    fn instantiate(&mut self, class_id: HeapId, args: ArgValues) -> RunResult<Value> {
        let (slot_count, name) = {
            let HeapData::Class(cls) = self.heap.get(class_id) else {
                unreachable!()
            };
            (cls.slot_layout().map(<[StringId]>::len), cls.name().to_string())
        };
        let instance_id = self.heap.allocate(HeapData::Instance(Instance::new(class_id, slot_count)))?;
        let instance = Value::Ref(instance_id);

        match resolve_class_attr(&mut self.heap, class_id, StaticStrings::DunderInit.into())? {
            Some((_, init)) => {
                self.call_value(init, args.prepend(instance))?;
            }
            None => {
                if args.count() > 0 {
                    return Err(ExcType::arg_count_error(&name, 0, args.count()));
                }
            }
        }
        Ok(instance)
    }

    /// Reads an attribute with full descriptor binding.
    pub fn get_attr(&mut self, obj: Value, name: StringId) -> RunResult<Value> {
        let Value::Ref(id) = obj else {
            return Err(self.missing_attribute(&obj, name));
        };
        match self.attr_target(id) {
            AttrTarget::Instance(class_id) => {
                let resolved = resolve_class_attr(&mut self.heap, class_id, name)?;
                // Properties are data descriptors: they win over instance state.
                if let Some((_, attr)) = resolved
                    && let Some(prop) = self.as_property(attr)
                {
                    let Some(getter) = prop.getter else {
                        return Err(self.missing_attribute(&obj, name));
                    };
                    return self.call_value(getter, ArgValues::One(obj));
                }
                if let Some(value) = self.instance_attr(id, name) {
                    return Ok(value);
                }
                match resolved {
                    Some((_, attr)) => self.bind_for_instance(attr, obj, class_id),
                    None => Err(self.missing_attribute(&obj, name)),
                }
            }
            AttrTarget::Class => {
                if name == StaticStrings::DunderName.into() {
                    let HeapData::Class(cls) = self.heap.get(id) else {
                        unreachable!()
                    };
                    let class_name = cls.name().to_string();
                    return self.new_str(class_name);
                }
                match resolve_class_attr(&mut self.heap, id, name)? {
                    Some((_, attr)) => self.bind_for_class(attr, obj),
                    None => Err(ExcType::attribute_error("type", self.interns.get_str(name))),
                }
            }
            AttrTarget::Super(proxy) => match resolve_super_attr(&self.heap, proxy.class_id, name) {
                Some((_, attr)) => {
                    let receiver_class = match proxy.instance {
                        Value::Ref(inst_id) => match self.heap.get(inst_id) {
                            HeapData::Instance(instance) => instance.class_id(),
                            _ => proxy.class_id,
                        },
                        _ => proxy.class_id,
                    };
                    self.bind_for_instance(attr, proxy.instance, receiver_class)
                }
                None => Err(ExcType::attribute_error("super", self.interns.get_str(name))),
            },
            AttrTarget::Exception => {
                if self.interns.get_str(name) == "args" {
                    let HeapData::Exception(exc) = self.heap.get(id) else {
                        unreachable!()
                    };
                    let args = exc.args().to_vec();
                    return self.new_tuple(args);
                }
                Err(self.missing_attribute(&obj, name))
            }
            AttrTarget::Other => Err(self.missing_attribute(&obj, name)),
        }
    }

    /// True when the attribute resolves; only AttributeError is swallowed.
    pub fn has_attr(&mut self, obj: Value, name: StringId) -> RunResult<bool> {
        match self.get_attr(obj, name) {
            Ok(_) => Ok(true),
            Err(err) if err.exc_type() == ExcType::AttributeError => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Writes an attribute, honoring slots and property setters.
    pub fn set_attr(&mut self, obj: Value, name: StringId, value: Value) -> RunResult<()> {
        let Value::Ref(id) = obj else {
            return Err(self.missing_attribute(&obj, name));
        };
        match self.attr_target(id) {
            AttrTarget::Instance(class_id) => {
                let resolved = resolve_class_attr(&mut self.heap, class_id, name)?;
                if let Some((_, attr)) = resolved
                    && let Some(prop) = self.as_property(attr)
                {
                    let Some(setter) = prop.setter else {
                        return Err(ExcType::attribute_error_msg(format!(
                            "property '{}' has no setter",
                            self.interns.get_str(name)
                        )));
                    };
                    self.call_value(setter, ArgValues::Two(obj, value))?;
                    return Ok(());
                }
                let slot_index = self.required_slot_index(&obj, class_id, name)?;
                let HeapData::Instance(instance) = self.heap.get_mut(id) else {
                    unreachable!()
                };
                match slot_index {
                    Some(index) => instance.set_slot(index, value),
                    None => instance.set_attr(name, value),
                }
                Ok(())
            }
            AttrTarget::Class => {
                let HeapData::Class(cls) = self.heap.get_mut(id) else {
                    unreachable!()
                };
                cls.set_own(name, value);
                self.heap.bump_class_epoch();
                Ok(())
            }
            _ => Err(self.missing_attribute(&obj, name)),
        }
    }

    /// Deletes an attribute, honoring slots and property deleters.
    pub fn del_attr(&mut self, obj: Value, name: StringId) -> RunResult<()> {
        let Value::Ref(id) = obj else {
            return Err(self.missing_attribute(&obj, name));
        };
        match self.attr_target(id) {
            AttrTarget::Instance(class_id) => {
                let resolved = resolve_class_attr(&mut self.heap, class_id, name)?;
                if let Some((_, attr)) = resolved
                    && let Some(prop) = self.as_property(attr)
                {
                    let Some(deleter) = prop.deleter else {
                        return Err(ExcType::attribute_error_msg(format!(
                            "property '{}' has no deleter",
                            self.interns.get_str(name)
                        )));
                    };
                    self.call_value(deleter, ArgValues::One(obj))?;
                    return Ok(());
                }
                let slot_index = self.required_slot_index(&obj, class_id, name)?;
                let HeapData::Instance(instance) = self.heap.get_mut(id) else {
                    unreachable!()
                };
                let removed = match slot_index {
                    Some(index) => instance.delete_slot(index),
                    None => instance.delete_attr(name),
                };
                if removed {
                    Ok(())
                } else {
                    Err(self.missing_attribute(&obj, name))
                }
            }
            AttrTarget::Class => {
                let HeapData::Class(cls) = self.heap.get_mut(id) else {
                    unreachable!()
                };
                let removed = cls.delete_own(name);
                self.heap.bump_class_epoch();
                if removed {
                    Ok(())
                } else {
                    Err(ExcType::attribute_error("type", self.interns.get_str(name)))
                }
            }
            _ => Err(self.missing_attribute(&obj, name)),
        }
    }

    /// Creates a `super` proxy for `instance` starting above `class_value`.
    pub fn super_proxy(&mut self, class_value: Value, instance: Value) -> RunResult<Value> {
        let Value::Ref(class_id) = class_value else {
            return Err(ExcType::type_error("super() argument 1 must be a class"));
        };
        if !matches!(self.heap.get(class_id), HeapData::Class(_)) {
            return Err(ExcType::type_error("super() argument 1 must be a class"));
        }
        Ok(Value::Ref(
            self.heap.allocate(HeapData::Super(SuperProxy { class_id, instance }))?,
        ))
    }

    /// Wraps a callable as a classmethod descriptor.
    pub fn new_classmethod(&mut self, func: Value) -> RunResult<Value> {
        Ok(Value::Ref(self.heap.allocate(HeapData::ClassMethod(ClassMethod { func }))?))
    }

    /// Wraps a callable as a staticmethod descriptor.
    pub fn new_staticmethod(&mut self, func: Value) -> RunResult<Value> {
        Ok(Value::Ref(self.heap.allocate(HeapData::StaticMethod(StaticMethod { func }))?))
    }

    /// Builds a property descriptor from accessor callables.
    pub fn new_property(
        &mut self,
        getter: Option<Value>,
        setter: Option<Value>,
        deleter: Option<Value>,
    ) -> RunResult<Value> {
        Ok(Value::Ref(
            self.heap
                .allocate(HeapData::Property(UserProperty { getter, setter, deleter }))?,
        ))
    }

    fn attr_target(&self, id: HeapId) -> AttrTarget {
        match self.heap.get(id) {
            HeapData::Instance(instance) => AttrTarget::Instance(instance.class_id()),
            HeapData::Class(_) => AttrTarget::Class,
            HeapData::Super(proxy) => AttrTarget::Super(*proxy),
            HeapData::Exception(_) => AttrTarget::Exception,
            _ => AttrTarget::Other,
        }
    }

    fn as_property(&self, attr: Value) -> Option<UserProperty> {
        if let Value::Ref(id) = attr
            && let HeapData::Property(prop) = self.heap.get(id)
        {
            Some(*prop)
        } else {
            None
        }
    }

    /// The slot index a write must use: `Some` for slotted classes (failing
    /// when the name is not a declared slot), `None` for open tables.
    fn required_slot_index(&self, obj: &Value, class_id: HeapId, name: StringId) -> RunResult<Option<usize>> {
        let HeapData::Class(cls) = self.heap.get(class_id) else {
            unreachable!()
        };
        if cls.slot_layout().is_none() {
            return Ok(None);
        }
        match cls.slot_index(name) {
            Some(index) => Ok(Some(index)),
            None => Err(self.missing_attribute(obj, name)),
        }
    }

    fn instance_attr(&self, id: HeapId, name: StringId) -> Option<Value> {
        let HeapData::Instance(instance) = self.heap.get(id) else {
            return None;
        };
        if instance.has_slots() {
            let HeapData::Class(cls) = self.heap.get(instance.class_id()) else {
                return None;
            };
            let index = cls.slot_index(name)?;
            instance.get_slot(index)
        } else {
            instance.get_attr(name)
        }
    }

    /// Applies descriptor binding for an attribute read off an instance.
    fn bind_for_instance(&mut self, attr: Value, receiver: Value, class_id: HeapId) -> RunResult<Value> {
        let bound = match attr {
            Value::Function(_) | Value::Builtin(_) => BoundMethod { receiver, func: attr },
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::ClassMethod(cm) => BoundMethod {
                    receiver: Value::Ref(class_id),
                    func: cm.func,
                },
                HeapData::StaticMethod(sm) => return Ok(sm.func),
                _ => return Ok(attr),
            },
            _ => return Ok(attr),
        };
        Ok(Value::Ref(self.heap.allocate(HeapData::BoundMethod(bound))?))
    }

    /// Applies descriptor binding for an attribute read off a class.
    fn bind_for_class(&mut self, attr: Value, class_value: Value) -> RunResult<Value> {
        let bound = match attr {
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::ClassMethod(cm) => BoundMethod {
                    receiver: class_value,
                    func: cm.func,
                },
                HeapData::StaticMethod(sm) => return Ok(sm.func),
                _ => return Ok(attr),
            },
            _ => return Ok(attr),
        };
        Ok(Value::Ref(self.heap.allocate(HeapData::BoundMethod(bound))?))
    }

    fn missing_attribute(&self, obj: &Value, name: StringId) -> RunError {
        ExcType::attribute_error(obj.py_type(&self.heap).name(), self.interns.get_str(name))
    }

    fn is_instance_value(&self, value: &Value) -> bool {
        matches!(value, Value::Ref(id) if matches!(self.heap.get(*id), HeapData::Instance(_)))
    }

    /// Looks up a protocol override on the receiver's class (never on the
    /// instance attribute table, matching type-level special method lookup).
    fn find_dunder(&mut self, receiver: Value, name: StaticStrings) -> RunResult<Option<Value>> {
        let Value::Ref(id) = receiver else {
            return Ok(None);
        };
        let HeapData::Instance(instance) = self.heap.get(id) else {
            return Ok(None);
        };
        let class_id = instance.class_id();
        Ok(resolve_class_attr(&mut self.heap, class_id, name.into())?.map(|(_, attr)| attr))
    }

    fn try_dunder(&mut self, receiver: Value, name: StaticStrings, arg: Value) -> RunResult<Option<Value>> {
        match self.find_dunder(receiver, name)? {
            Some(method) => self.call_value(method, ArgValues::Two(receiver, arg)).map(Some),
            None => Ok(None),
        }
    }

    fn call_nullary_dunder(&mut self, receiver: Value, name: StaticStrings) -> RunResult<Option<Value>> {
        match self.find_dunder(receiver, name)? {
            Some(method) => self.call_value(method, ArgValues::One(receiver)).map(Some),
            None => Ok(None),
        }
    }

    // --- scheduling ---

    /// Queues `func(args)` to run `delay` ticks from now, returning the
    /// future that will carry its result.
    pub fn spawn(&mut self, func: Value, args: Vec<Value>, delay: u64) -> RunResult<Value> {
        let future_id = self.heap.allocate(HeapData::Future(Future::new()))?;
        self.sched.push(future_id, func, args, delay);
        Ok(Value::Ref(future_id))
    }

    /// Runs the next due task, if any. Returns whether a task was consumed.
    pub fn drive_once(&mut self, deadline: Option<u64>) -> RunResult<bool> {
        let Some(task) = self.sched.pop_due(deadline) else {
            return Ok(false);
        };
        let cancelled = match self.heap.get(task.future) {
            HeapData::Future(fut) => fut.is_cancelled(),
            _ => true,
        };
        if cancelled {
            return Ok(true);
        }
        let outcome = self.call_value(task.func, ArgValues::from(task.args));
        let HeapData::Future(fut) = self.heap.get_mut(task.future) else {
            return Ok(true);
        };
        match outcome {
            Ok(value) => fut.complete(value)?,
            Err(err) => fut.fail(err.into_simple())?,
        }
        Ok(true)
    }

    /// Runs queued tasks until the queue is empty.
    pub fn run_until_idle(&mut self) -> RunResult<()> {
        while self.drive_once(None)? {}
        Ok(())
    }

    /// Blocks on a future, driving queued tasks until it resolves.
    ///
    /// Fails with `CancelledError` for a cancelled future and
    /// `RuntimeError` when the queue idles with the future still pending.
    pub fn await_future(&mut self, future: Value) -> RunResult<Value> {
        loop {
            if let Some(result) = self.future_result(&future)? {
                return result;
            }
            if !self.drive_once(None)? {
                return Err(ExcType::runtime_error("future awaited but no task can resolve it"));
            }
        }
    }

    /// Awaits futures, calls bare callables synchronously, and passes any
    /// other value through unchanged.
    pub fn await_value(&mut self, value: Value) -> RunResult<Value> {
        if self.is_awaitable(&value) {
            return self.await_future(value);
        }
        if self.is_callable(&value) {
            return self.call_value(value, ArgValues::Empty);
        }
        Ok(value)
    }

    /// Waits for a future with a tick deadline; `TimeoutError` on expiry.
    pub fn await_with_timeout(&mut self, future: Value, timeout: u64) -> RunResult<Value> {
        let deadline = self.sched.now().saturating_add(timeout);
        loop {
            if let Some(result) = self.future_result(&future)? {
                return result;
            }
            if !self.drive_once(Some(deadline))? {
                self.sched.advance_to(deadline);
                return Err(ExcType::timeout_error());
            }
        }
    }

    /// Advances virtual time, running every task due in the window.
    pub fn sleep(&mut self, ticks: u64) -> RunResult<()> {
        let deadline = self.sched.now().saturating_add(ticks);
        while self.drive_once(Some(deadline))? {}
        self.sched.advance_to(deadline);
        Ok(())
    }

    /// Awaits all the given futures or callables, returning their results
    /// as a list in argument order regardless of completion order.
    pub fn gather(&mut self, items: &[Value]) -> RunResult<Value> {
        let futures = self.spawn_pending(items)?;
        let mut results = Vec::with_capacity(futures.len());
        for future in futures {
            results.push(self.await_future(future)?);
        }
        self.new_list(results)
    }

    /// Awaits until any of the given futures or callables resolves,
    /// returning its result. When several resolve in the same drive step,
    /// earliest argument position wins.
    pub fn first(&mut self, items: &[Value]) -> RunResult<Value> {
        if items.is_empty() {
            return Err(ExcType::value_error("first() requires at least one future"));
        }
        let futures = self.spawn_pending(items)?;
        loop {
            for future in &futures {
                if let Some(result) = self.future_result(future)? {
                    return result;
                }
            }
            if !self.drive_once(None)? {
                return Err(ExcType::runtime_error("future awaited but no task can resolve it"));
            }
        }
    }

    /// Cancels a pending future. Its task will not run; awaiting it fails
    /// with `CancelledError`.
    pub fn cancel(&mut self, future: Value) -> RunResult<()> {
        let Value::Ref(id) = future else {
            return Err(self.not_a_future(&future));
        };
        if !matches!(self.heap.get(id), HeapData::Future(_)) {
            return Err(self.not_a_future(&future));
        }
        let HeapData::Future(fut) = self.heap.get_mut(id) else {
            unreachable!()
        };
        fut.cancel();
        Ok(())
    }

    /// Non-blocking poll: `Some(result)` once resolved or cancelled.
    fn future_result(&self, future: &Value) -> RunResult<Option<RunResult<Value>>> {
        let Value::Ref(id) = future else {
            return Err(self.not_a_future(future));
        };
        let HeapData::Future(fut) = self.heap.get(*id) else {
            return Err(self.not_a_future(future));
        };
        match fut.state() {
            FutureState::Completed(value) => Ok(Some(Ok(*value))),
            FutureState::Failed(exc) => Ok(Some(Err(exc.clone().into()))),
            FutureState::Pending if fut.is_cancelled() => Ok(Some(Err(ExcType::cancelled_error()))),
            FutureState::Pending => Ok(None),
        }
    }

    /// Replaces bare callables with freshly spawned zero-delay tasks so the
    /// whole batch can be awaited uniformly.
    fn spawn_pending(&mut self, items: &[Value]) -> RunResult<Vec<Value>> {
        let mut futures = Vec::with_capacity(items.len());
        for item in items {
            if !self.is_awaitable(item) && self.is_callable(item) {
                futures.push(self.spawn(*item, Vec::new(), 0)?);
            } else {
                futures.push(*item);
            }
        }
        Ok(futures)
    }

    fn is_awaitable(&self, value: &Value) -> bool {
        matches!(value, Value::Ref(id) if matches!(self.heap.get(*id), HeapData::Future(_)))
    }

    fn is_callable(&self, value: &Value) -> bool {
        match value {
            Value::Function(_) | Value::Builtin(_) => true,
            Value::Ref(id) => matches!(
                self.heap.get(*id),
                HeapData::Class(_) | HeapData::BoundMethod(_)
            ),
            _ => false,
        }
    }

    fn not_a_future(&self, value: &Value) -> RunError {
        ExcType::type_error(format!("expected a Future, got '{}'", value.py_type(&self.heap).name()))
    }

    /// Current virtual time in ticks.
    #[must_use]
    pub fn now(&self) -> u64 {
        self.sched.now()
    }

    /// Converts an exception value (a heap exception object or a bare
    /// exception kind) into the propagation form for raising.
    pub fn raise_value(&self, value: Value) -> RunError {
        match value {
            Value::Builtin(Builtins::Exc(exc_type)) => SimpleException::new(exc_type, None).into(),
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Exception(exc) => match exc.to_simple(&self.heap) {
                    Ok(simple) => simple.into(),
                    Err(err) => err,
                },
                _ => ExcType::type_error("exceptions must derive from BaseException"),
            },
            _ => ExcType::type_error("exceptions must derive from BaseException"),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::resource::NoLimitTracker;

    fn runtime() -> Runtime<NoLimitTracker> {
        Runtime::new(NoLimitTracker)
    }

    #[test]
    fn test_binary_op_native_ints() {
        let mut rt = runtime();
        let sum = rt.binary_op(BinaryOp::Add, Value::Int(2), Value::Int(3)).unwrap();
        assert_eq!(sum, Value::Int(5));
    }

    #[test]
    fn test_compare_mixed_numerics() {
        let mut rt = runtime();
        let lt = rt.compare(CmpOp::Lt, Value::Int(1), Value::Float(1.5)).unwrap();
        assert_eq!(lt, Value::Bool(true));
        let eq = rt.compare(CmpOp::Eq, Value::Bool(true), Value::Int(1)).unwrap();
        assert_eq!(eq, Value::Bool(true));
    }

    #[test]
    fn test_registered_function_roundtrip() {
        let mut rt = runtime();
        let double = rt.register_function("double", |_rt, args| {
            let v = args.get_one_arg("double")?;
            match v {
                Value::Int(i) => Ok(Value::Int(i * 2)),
                _ => Err(ExcType::type_error("double() expects an int")),
            }
        });
        let out = rt.call_value(double, ArgValues::One(Value::Int(21))).unwrap();
        assert_eq!(out, Value::Int(42));
    }

    #[test]
    fn test_call_depth_guard() {
        let mut rt = runtime();
        let f = rt.register_function("loop_forever", |rt, _args| {
            let this = rt.call_value(Value::Function(FnId(0)), ArgValues::Empty)?;
            Ok(this)
        });
        let err = rt.call_value(f, ArgValues::Empty).unwrap_err();
        assert_eq!(err.exc_type(), ExcType::RecursionError);
    }

    #[test]
    fn test_get_item_list_and_dict() {
        let mut rt = runtime();
        let list = rt.new_list(vec![Value::Int(10), Value::Int(20)]).unwrap();
        assert_eq!(rt.get_item(list, Value::Int(-1)).unwrap(), Value::Int(20));

        let dict = rt.new_dict().unwrap();
        rt.set_item(dict, Value::Int(1), Value::Int(100)).unwrap();
        assert_eq!(rt.get_item(dict, Value::Bool(true)).unwrap(), Value::Int(100));
        let err = rt.get_item(dict, Value::Int(2)).unwrap_err();
        assert_eq!(err.exc_type(), ExcType::KeyError);
    }

    #[test]
    fn test_iterate_string_chars() {
        let mut rt = runtime();
        let s = rt.new_str("ab").unwrap();
        let items = rt.materialize_iterable(&s).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(rt.repr_value(&items[0]).unwrap(), "'a'");
    }

    #[test]
    fn test_int_constructor_parses_strings() {
        let mut rt = runtime();
        let s = rt.new_str(" 42 ").unwrap();
        let n = rt
            .call_builtin(Builtins::Kind(Type::Int), ArgValues::One(s))
            .unwrap();
        assert_eq!(n, Value::Int(42));

        let bad = rt.new_str("forty").unwrap();
        let err = rt.call_builtin(Builtins::Kind(Type::Int), ArgValues::One(bad)).unwrap_err();
        assert_eq!(err.exc_type(), ExcType::ValueError);
    }

    #[test]
    fn test_float_constructor_special_forms() {
        let mut rt = runtime();
        let s = rt.new_str("inf").unwrap();
        let f = rt.call_builtin(Builtins::Kind(Type::Float), ArgValues::One(s)).unwrap();
        assert_eq!(f, Value::Float(f64::INFINITY));
    }

    #[test]
    fn test_spawn_and_await() {
        let mut rt = runtime();
        let f = rt.register_function("answer", |_rt, args| {
            args.check_zero_args("answer")?;
            Ok(Value::Int(42))
        });
        let fut = rt.spawn(f, Vec::new(), 5).unwrap();
        assert_eq!(rt.await_future(fut).unwrap(), Value::Int(42));
        assert_eq!(rt.now(), 5);
    }

    #[test]
    fn test_cancelled_future_raises() {
        let mut rt = runtime();
        let f = rt.register_function("never", |_rt, _args| Ok(Value::None));
        let fut = rt.spawn(f, Vec::new(), 1).unwrap();
        rt.cancel(fut).unwrap();
        let err = rt.await_future(fut).unwrap_err();
        assert_eq!(err.exc_type(), ExcType::CancelledError);
    }

    #[test]
    fn test_await_timeout_advances_clock() {
        let mut rt = runtime();
        let f = rt.register_function("slow", |_rt, _args| Ok(Value::None));
        let fut = rt.spawn(f, Vec::new(), 100).unwrap();
        let err = rt.await_with_timeout(fut, 10).unwrap_err();
        assert_eq!(err.exc_type(), ExcType::TimeoutError);
        assert_eq!(rt.now(), 10);
    }

    #[test]
    fn test_gc_frees_unrooted_allocations() {
        let mut rt = runtime();
        let kept = rt.new_list(vec![Value::Int(1)]).unwrap();
        rt.add_root(kept);
        rt.new_list(vec![Value::Int(2)]).unwrap();
        let freed = rt.gc(&[]);
        assert_eq!(freed, 1);
    }
}
