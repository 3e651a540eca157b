//! The core value representation and its native operations.
//!
//! [`Value`] is a small `Copy` enum: immediates (`None`, `bool`, `i64`,
//! `f64`), builtin handles, compiled-function handles, and heap references.
//! Everything larger lives in the arena behind `Value::Ref`.
//!
//! The operations here are the *native* semantics: numeric-tower arithmetic
//! with transparent big-integer promotion, cross-kind numeric equality and
//! hashing, container concatenation, and display. Protocol-override dispatch
//! for class instances happens one layer up, in the runtime entry points;
//! by the time execution reaches this module the operands are native kinds.

use std::cmp::Ordering;

use num_bigint::BigInt;
use num_traits::{Pow, Signed, ToPrimitive, Zero};

use crate::{
    builtins::Builtins,
    exception::{ExcType, RunResult},
    heap::{Heap, HeapData, HeapId},
    py_hash::{hash_float, hash_int, hash_str},
    resource::ResourceTracker,
    types::{Complex, FrozenSet, LongInt, PyTrait, SetStorage, Str, Type},
};

/// Index of a compiled function registered with the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct FnId(pub u32);

/// A runtime value. Copy: cloning never touches the heap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// A builtin function, builtin kind, or exception kind.
    Builtin(Builtins),
    /// A function registered with the runtime (compiled code or host code).
    Function(FnId),
    /// Reference to a heap-allocated value.
    Ref(HeapId),
}

/// A numeric operand lifted out of its encoding, ready for promotion.
enum Num {
    Int(i64),
    Big(BigInt),
    Float(f64),
    Complex(Complex),
}

impl Value {
    /// Returns the kind tag of this value.
    #[must_use]
    pub fn py_type(&self, heap: &Heap<impl ResourceTracker>) -> Type {
        match self {
            Self::None => Type::NoneType,
            Self::Bool(_) => Type::Bool,
            Self::Int(_) => Type::Int,
            Self::Float(_) => Type::Float,
            Self::Builtin(b) => b.value_type(),
            Self::Function(_) => Type::Function,
            Self::Ref(id) => heap.get(*id).py_type(heap),
        }
    }

    /// Truthiness: zero, empty, and `None` are falsy.
    #[must_use]
    pub fn py_bool(&self, heap: &Heap<impl ResourceTracker>) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Builtin(_) | Self::Function(_) => true,
            Self::Ref(id) => heap.get(*id).py_bool(heap),
        }
    }

    /// Number of elements, or `None` for kinds without a length.
    #[must_use]
    pub fn py_len(&self, heap: &Heap<impl ResourceTracker>) -> Option<usize> {
        match self {
            Self::Ref(id) => heap.get(*id).py_len(heap),
            _ => None,
        }
    }

    /// The value's hash, or `None` for unhashable kinds.
    ///
    /// Equal values hash equal across kinds: `True`, `1`, `1.0`, and
    /// `1 + 0j` all share a hash. Class instances and other identity-keyed
    /// kinds hash by heap id.
    #[must_use]
    pub fn py_hash(&self, heap: &Heap<impl ResourceTracker>) -> Option<u64> {
        match self {
            Self::None => Some(hash_int(0x2B3C_9D1F)),
            Self::Bool(b) => Some(hash_int(i64::from(*b))),
            Self::Int(i) => Some(hash_int(*i)),
            Self::Float(f) => Some(hash_float(*f)),
            Self::Builtin(b) => Some(hash_str(b.name())),
            Self::Function(FnId(id)) => Some(hash_int(i64::from(*id))),
            Self::Ref(id) => match heap.get(*id) {
                HeapData::List(_)
                | HeapData::Dict(_)
                | HeapData::Set(_)
                | HeapData::Slice(_)
                | HeapData::Iter(_) => None,
                HeapData::Instance(_)
                | HeapData::Class(_)
                | HeapData::BoundMethod(_)
                | HeapData::ClassMethod(_)
                | HeapData::StaticMethod(_)
                | HeapData::Property(_)
                | HeapData::Super(_)
                | HeapData::Exception(_)
                | HeapData::Future(_) => Some(hash_int(id.index() as i64)),
                data => data.py_hash(heap),
            },
        }
    }

    /// Debug representation. `depth` guards self-referential containers.
    pub fn py_repr(&self, heap: &Heap<impl ResourceTracker>, depth: u16) -> RunResult<String> {
        match self {
            Self::None => Ok("None".to_string()),
            Self::Bool(true) => Ok("True".to_string()),
            Self::Bool(false) => Ok("False".to_string()),
            Self::Int(i) => Ok(i.to_string()),
            Self::Float(f) => Ok(float_repr(*f)),
            Self::Builtin(b) => Ok(b.repr()),
            Self::Function(_) => Ok("<function>".to_string()),
            Self::Ref(id) => heap.get(*id).py_repr(heap, depth),
        }
    }

    /// Display form: like `py_repr`, except strings print unquoted.
    pub fn py_str(&self, heap: &Heap<impl ResourceTracker>, depth: u16) -> RunResult<String> {
        if let Self::Ref(id) = self
            && let HeapData::Str(s) = heap.get(*id)
        {
            return Ok(s.as_str().to_string());
        }
        self.py_repr(heap, depth)
    }

    /// Native equality: numeric values compare across kinds by mathematical
    /// value, containers compare structurally, everything else by identity.
    ///
    /// This is what the equality-keyed containers use for bucket probing.
    /// User `__eq__` overrides apply only at the runtime entry points, so a
    /// class instance used as a dict key keeps identity semantics.
    #[must_use]
    pub fn py_eq(&self, other: &Self, heap: &Heap<impl ResourceTracker>) -> bool {
        if let (Some(a), Some(b)) = (self.as_num(heap), other.as_num(heap)) {
            return num_eq(&a, &b);
        }
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Builtin(a), Self::Builtin(b)) => a == b,
            (Self::Function(a), Self::Function(b)) => a == b,
            (Self::Ref(a), Self::Ref(b)) => {
                if a == b {
                    return true;
                }
                match (heap.get(*a), heap.get(*b)) {
                    (HeapData::Str(x), HeapData::Str(y)) => x.as_str() == y.as_str(),
                    (HeapData::Bytes(x), HeapData::Bytes(y)) => x.as_slice() == y.as_slice(),
                    (HeapData::List(x), HeapData::List(y)) => {
                        crate::types::List::eq_values(x.as_slice(), y.as_slice(), heap)
                    }
                    (HeapData::Tuple(x), HeapData::Tuple(y)) => {
                        crate::types::List::eq_values(x.as_slice(), y.as_slice(), heap)
                    }
                    (HeapData::Dict(x), HeapData::Dict(y)) => x.eq_dict(y, heap).unwrap_or(false),
                    (HeapData::Set(x), HeapData::Set(y)) => x.0.eq_storage(&y.0, heap).unwrap_or(false),
                    (HeapData::FrozenSet(x), HeapData::FrozenSet(y)) => {
                        x.storage().eq_storage(y.storage(), heap).unwrap_or(false)
                    }
                    (HeapData::Set(x), HeapData::FrozenSet(y)) => x.0.eq_storage(y.storage(), heap).unwrap_or(false),
                    (HeapData::FrozenSet(x), HeapData::Set(y)) => x.storage().eq_storage(&y.0, heap).unwrap_or(false),
                    _ => false,
                }
            }
            _ => false,
        }
    }

    /// Native ordering: `None` when the pair has no defined order
    /// (mixed kinds, complex numbers, NaN).
    #[must_use]
    pub fn py_cmp(&self, other: &Self, heap: &Heap<impl ResourceTracker>) -> Option<Ordering> {
        if let (Some(a), Some(b)) = (self.as_num(heap), other.as_num(heap)) {
            return num_cmp(&a, &b);
        }
        if let (Self::Ref(a), Self::Ref(b)) = (self, other) {
            return match (heap.get(*a), heap.get(*b)) {
                (HeapData::Str(x), HeapData::Str(y)) => Some(x.as_str().cmp(y.as_str())),
                (HeapData::Bytes(x), HeapData::Bytes(y)) => Some(x.as_slice().cmp(y.as_slice())),
                (HeapData::List(x), HeapData::List(y)) => cmp_sequences(x.as_slice(), y.as_slice(), heap),
                (HeapData::Tuple(x), HeapData::Tuple(y)) => cmp_sequences(x.as_slice(), y.as_slice(), heap),
                _ => None,
            };
        }
        None
    }

    /// Membership test (`item in self`).
    pub fn py_contains(&self, item: &Self, heap: &Heap<impl ResourceTracker>) -> RunResult<bool> {
        if let Self::Ref(id) = self {
            match heap.get(*id) {
                HeapData::List(list) => return Ok(list.contains(item, heap)),
                HeapData::Tuple(tuple) => return Ok(tuple.contains(item, heap)),
                HeapData::Set(set) => return set.0.contains(item, heap),
                HeapData::FrozenSet(fs) => return fs.storage().contains(item, heap),
                HeapData::Dict(dict) => return dict.contains(item, heap),
                HeapData::Str(s) => {
                    if let Self::Ref(item_id) = item
                        && let HeapData::Str(needle) = heap.get(*item_id)
                    {
                        return Ok(s.contains(needle.as_str()));
                    }
                    return Err(ExcType::type_error(format!(
                        "'in <string>' requires string as left operand, not {}",
                        item.py_type(heap).name()
                    )));
                }
                _ => {}
            }
        }
        Err(ExcType::type_error(format!(
            "argument of type '{}' is not iterable",
            self.py_type(heap).name()
        )))
    }

    /// Addition: numeric sum or sequence concatenation.
    pub fn py_add(&self, other: &Self, heap: &mut Heap<impl ResourceTracker>) -> RunResult<Value> {
        if let (Some(a), Some(b)) = (self.as_num(heap), other.as_num(heap)) {
            return materialize(num_add(a, b), heap);
        }
        if let (Self::Ref(a), Self::Ref(b)) = (self, other) {
            let concatenated = match (heap.get(*a), heap.get(*b)) {
                (HeapData::Str(x), HeapData::Str(y)) => Some(HeapData::Str(x.concat(y.as_str()))),
                (HeapData::Bytes(x), HeapData::Bytes(y)) => Some(HeapData::Bytes(x.concat(y.as_slice()))),
                (HeapData::List(x), HeapData::List(y)) => Some(HeapData::List(x.concat(y))),
                (HeapData::Tuple(x), HeapData::Tuple(y)) => Some(HeapData::Tuple(x.concat(y))),
                _ => None,
            };
            if let Some(data) = concatenated {
                return Ok(Self::Ref(heap.allocate(data)?));
            }
        }
        Err(self.binary_error("+", other, heap))
    }

    /// Subtraction: numeric difference or set difference.
    pub fn py_sub(&self, other: &Self, heap: &mut Heap<impl ResourceTracker>) -> RunResult<Value> {
        if let (Some(a), Some(b)) = (self.as_num(heap), other.as_num(heap)) {
            return materialize(num_sub(a, b), heap);
        }
        if let Some(result) = self.set_op(other, heap, SetAlgebra::Difference)? {
            return Ok(result);
        }
        Err(self.binary_error("-", other, heap))
    }

    /// Multiplication: numeric product or sequence repetition.
    pub fn py_mul(&self, other: &Self, heap: &mut Heap<impl ResourceTracker>) -> RunResult<Value> {
        if let (Some(a), Some(b)) = (self.as_num(heap), other.as_num(heap)) {
            return materialize(num_mul(a, b), heap);
        }
        let (seq, count) = match (self, other) {
            (Self::Ref(id), Self::Int(_) | Self::Bool(_)) => (*id, other.as_count()),
            (Self::Int(_) | Self::Bool(_), Self::Ref(id)) => (*id, self.as_count()),
            _ => return Err(self.binary_error("*", other, heap)),
        };
        let Some(count) = count else {
            return Err(self.binary_error("*", other, heap));
        };
        let repeated = match heap.get(seq) {
            HeapData::Str(s) => Some(HeapData::Str(s.repeat(count))),
            HeapData::List(l) => Some(HeapData::List(l.repeat(count))),
            HeapData::Tuple(t) => Some(HeapData::Tuple(t.repeat(count))),
            _ => None,
        };
        match repeated {
            Some(data) => Ok(Self::Ref(heap.allocate(data)?)),
            None => Err(self.binary_error("*", other, heap)),
        }
    }

    /// True division: always produces a float (or complex) result.
    pub fn py_truediv(&self, other: &Self, heap: &mut Heap<impl ResourceTracker>) -> RunResult<Value> {
        if let (Some(a), Some(b)) = (self.as_num(heap), other.as_num(heap)) {
            return materialize(num_truediv(a, b), heap);
        }
        Err(self.binary_error("/", other, heap))
    }

    /// Floor division, rounding toward negative infinity.
    pub fn py_floordiv(&self, other: &Self, heap: &mut Heap<impl ResourceTracker>) -> RunResult<Value> {
        if let (Some(a), Some(b)) = (self.as_num(heap), other.as_num(heap)) {
            return materialize(num_floordiv(a, b), heap);
        }
        Err(self.binary_error("//", other, heap))
    }

    /// Modulo with the divisor's sign, matching floor division.
    pub fn py_mod(&self, other: &Self, heap: &mut Heap<impl ResourceTracker>) -> RunResult<Value> {
        if let (Some(a), Some(b)) = (self.as_num(heap), other.as_num(heap)) {
            return materialize(num_mod(a, b), heap);
        }
        Err(self.binary_error("%", other, heap))
    }

    /// Exponentiation. Integer results stay integral; a negative integer
    /// exponent or a negative base with a fractional exponent promotes
    /// (to float and complex respectively).
    pub fn py_pow(&self, other: &Self, heap: &mut Heap<impl ResourceTracker>) -> RunResult<Value> {
        if let (Some(a), Some(b)) = (self.as_num(heap), other.as_num(heap)) {
            return materialize(num_pow(a, b), heap);
        }
        Err(self.binary_error("**", other, heap))
    }

    /// Unary minus.
    pub fn py_neg(&self, heap: &mut Heap<impl ResourceTracker>) -> RunResult<Value> {
        match self.as_num(heap) {
            Some(Num::Int(i)) => match i.checked_neg() {
                Some(n) => Ok(Self::Int(n)),
                None => materialize(Ok(Num::Big(-BigInt::from(i))), heap),
            },
            Some(Num::Big(b)) => materialize(Ok(Num::Big(-b)), heap),
            Some(Num::Float(f)) => Ok(Self::Float(-f)),
            Some(Num::Complex(c)) => materialize(Ok(Num::Complex(c.neg())), heap),
            None => Err(ExcType::unsupported("unary -", self.py_type(heap).name())),
        }
    }

    /// Unary plus: identity on numbers, normalizing bool to int.
    pub fn py_pos(&self, heap: &mut Heap<impl ResourceTracker>) -> RunResult<Value> {
        match self.as_num(heap) {
            Some(Num::Int(i)) => Ok(Self::Int(i)),
            Some(num) => materialize(Ok(num), heap),
            None => Err(ExcType::unsupported("unary +", self.py_type(heap).name())),
        }
    }

    /// Bitwise complement of an integer: `~x == -(x + 1)`.
    pub fn py_invert(&self, heap: &mut Heap<impl ResourceTracker>) -> RunResult<Value> {
        match self.as_num(heap) {
            Some(Num::Int(i)) => Ok(Self::Int(!i)),
            Some(Num::Big(b)) => materialize(Ok(Num::Big(-(b + 1u8))), heap),
            _ => Err(ExcType::unsupported("unary ~", self.py_type(heap).name())),
        }
    }

    /// Bitwise and: bool op, integer op, or set intersection.
    pub fn py_bitand(&self, other: &Self, heap: &mut Heap<impl ResourceTracker>) -> RunResult<Value> {
        if let (Self::Bool(a), Self::Bool(b)) = (self, other) {
            return Ok(Self::Bool(a & b));
        }
        if let Some(result) = self.int_bitop(other, heap, |a, b| a & b, |a, b| a & b) {
            return materialize(result, heap);
        }
        if let Some(result) = self.set_op(other, heap, SetAlgebra::Intersection)? {
            return Ok(result);
        }
        Err(self.binary_error("&", other, heap))
    }

    /// Bitwise or: bool op, integer op, or set union.
    pub fn py_bitor(&self, other: &Self, heap: &mut Heap<impl ResourceTracker>) -> RunResult<Value> {
        if let (Self::Bool(a), Self::Bool(b)) = (self, other) {
            return Ok(Self::Bool(a | b));
        }
        if let Some(result) = self.int_bitop(other, heap, |a, b| a | b, |a, b| a | b) {
            return materialize(result, heap);
        }
        if let Some(result) = self.set_op(other, heap, SetAlgebra::Union)? {
            return Ok(result);
        }
        Err(self.binary_error("|", other, heap))
    }

    /// Bitwise xor: bool op, integer op, or set symmetric difference.
    pub fn py_bitxor(&self, other: &Self, heap: &mut Heap<impl ResourceTracker>) -> RunResult<Value> {
        if let (Self::Bool(a), Self::Bool(b)) = (self, other) {
            return Ok(Self::Bool(a ^ b));
        }
        if let Some(result) = self.int_bitop(other, heap, |a, b| a ^ b, |a, b| a ^ b) {
            return materialize(result, heap);
        }
        if let Some(result) = self.set_op(other, heap, SetAlgebra::SymmetricDifference)? {
            return Ok(result);
        }
        Err(self.binary_error("^", other, heap))
    }

    /// Left shift; promotes to big integers rather than overflowing.
    pub fn py_lshift(&self, other: &Self, heap: &mut Heap<impl ResourceTracker>) -> RunResult<Value> {
        let (Some(a), Some(shift)) = (self.as_num(heap), other.as_num(heap)) else {
            return Err(self.binary_error("<<", other, heap));
        };
        let (base, shift) = match (a, shift) {
            (Num::Int(i), Num::Int(s)) => (BigInt::from(i), s),
            (Num::Big(b), Num::Int(s)) => (b, s),
            _ => return Err(self.binary_error("<<", other, heap)),
        };
        if shift < 0 {
            return Err(ExcType::value_error("negative shift count"));
        }
        let shift = usize::try_from(shift).map_err(|_| ExcType::value_error("shift count too large"))?;
        materialize(Ok(Num::Big(base << shift)), heap)
    }

    /// Right shift (arithmetic).
    pub fn py_rshift(&self, other: &Self, heap: &mut Heap<impl ResourceTracker>) -> RunResult<Value> {
        let (Some(a), Some(shift)) = (self.as_num(heap), other.as_num(heap)) else {
            return Err(self.binary_error(">>", other, heap));
        };
        let (base, shift) = match (a, shift) {
            (Num::Int(i), Num::Int(s)) => (BigInt::from(i), s),
            (Num::Big(b), Num::Int(s)) => (b, s),
            _ => return Err(self.binary_error(">>", other, heap)),
        };
        if shift < 0 {
            return Err(ExcType::value_error("negative shift count"));
        }
        let shift = usize::try_from(shift).unwrap_or(usize::MAX);
        materialize(Ok(Num::Big(base >> shift)), heap)
    }

    /// Appends the heap ids this value references, for cycle collection.
    pub fn collect_child_ids(&self, ids: &mut Vec<HeapId>) {
        if let Self::Ref(id) = self {
            ids.push(*id);
        }
    }

    fn as_num(&self, heap: &Heap<impl ResourceTracker>) -> Option<Num> {
        match self {
            Self::Bool(b) => Some(Num::Int(i64::from(*b))),
            Self::Int(i) => Some(Num::Int(*i)),
            Self::Float(f) => Some(Num::Float(*f)),
            Self::Ref(id) => match heap.get(*id) {
                HeapData::LongInt(l) => Some(Num::Big(l.0.clone())),
                HeapData::Complex(c) => Some(Num::Complex(*c)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Repetition count for sequence `*`; bools count as 0/1.
    fn as_count(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Integer-only bitwise op over both encodings; `None` when either
    /// operand is not integral.
    fn int_bitop(
        &self,
        other: &Self,
        heap: &Heap<impl ResourceTracker>,
        small: fn(i64, i64) -> i64,
        big: fn(BigInt, BigInt) -> BigInt,
    ) -> Option<RunResult<Num>> {
        let (a, b) = (self.as_num(heap)?, other.as_num(heap)?);
        match (a, b) {
            (Num::Int(x), Num::Int(y)) => Some(Ok(Num::Int(small(x, y)))),
            (Num::Int(x), Num::Big(y)) => Some(Ok(Num::Big(big(BigInt::from(x), y)))),
            (Num::Big(x), Num::Int(y)) => Some(Ok(Num::Big(big(x, BigInt::from(y))))),
            (Num::Big(x), Num::Big(y)) => Some(Ok(Num::Big(big(x, y)))),
            _ => None,
        }
    }

    /// Applies a set algebra op when both operands are sets; the result kind
    /// follows the left operand (set stays set, frozenset stays frozen).
    fn set_op(
        &self,
        other: &Self,
        heap: &mut Heap<impl ResourceTracker>,
        op: SetAlgebra,
    ) -> RunResult<Option<Value>> {
        let (Self::Ref(a), Self::Ref(b)) = (self, other) else {
            return Ok(None);
        };
        let built = {
            let left = match heap.get(*a) {
                HeapData::Set(s) => Some((&s.0, false)),
                HeapData::FrozenSet(f) => Some((f.storage(), true)),
                _ => None,
            };
            let right = match heap.get(*b) {
                HeapData::Set(s) => Some(&s.0),
                HeapData::FrozenSet(f) => Some(f.storage()),
                _ => None,
            };
            match (left, right) {
                (Some((left_storage, frozen)), Some(right_storage)) => {
                    let rhs = right_storage.values();
                    let storage = match op {
                        SetAlgebra::Union => left_storage.union_with(&rhs, heap)?,
                        SetAlgebra::Intersection => left_storage.intersection_with(&rhs, heap)?,
                        SetAlgebra::Difference => left_storage.difference_with(&rhs, heap)?,
                        SetAlgebra::SymmetricDifference => left_storage.symmetric_difference_with(&rhs, heap)?,
                    };
                    Some((storage, frozen))
                }
                _ => None,
            }
        };
        match built {
            Some((storage, true)) => alloc_frozen(heap, storage).map(Some),
            Some((storage, false)) => Ok(Some(Self::Ref(
                heap.allocate(HeapData::Set(crate::types::Set::new(storage)))?,
            ))),
            None => Ok(None),
        }
    }

    fn binary_error(&self, op: &str, other: &Self, heap: &Heap<impl ResourceTracker>) -> crate::exception::RunError {
        ExcType::unsupported_binary(op, self.py_type(heap).name(), other.py_type(heap).name())
    }
}

/// Set algebra operators shared by `- | & ^`.
#[derive(Debug, Clone, Copy)]
enum SetAlgebra {
    Union,
    Intersection,
    Difference,
    SymmetricDifference,
}

/// Formats a float the way source-level display expects: `42.0` keeps its
/// decimal point, specials print as `inf`/`-inf`/`nan`, and scientific
/// notation carries an explicit exponent sign.
#[must_use]
pub(crate) fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let mut buffer = ryu::Buffer::new();
    let formatted = buffer.format(f);
    match formatted.find('e') {
        Some(pos) if !formatted[pos + 1..].starts_with('-') => {
            format!("{}e+{}", &formatted[..pos], &formatted[pos + 1..])
        }
        _ => formatted.to_string(),
    }
}

fn num_eq(a: &Num, b: &Num) -> bool {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => x == y,
        (Num::Int(x), Num::Float(y)) | (Num::Float(y), Num::Int(x)) => {
            LongInt::from(*x).eq_f64(*y)
        }
        (Num::Int(x), Num::Big(y)) | (Num::Big(y), Num::Int(x)) => y == &BigInt::from(*x),
        (Num::Float(x), Num::Float(y)) => x == y,
        (Num::Float(x), Num::Big(y)) | (Num::Big(y), Num::Float(x)) => LongInt::new(y.clone()).eq_f64(*x),
        (Num::Big(x), Num::Big(y)) => x == y,
        (Num::Complex(z), other) | (other, Num::Complex(z)) => match other {
            Num::Int(i) => z.eq_scalar(*i as f64) && i64_exact_as_f64(*i),
            Num::Float(f) => z.eq_scalar(*f),
            Num::Big(bi) => z.imag == 0.0 && LongInt::new(bi.clone()).eq_f64(z.real),
            Num::Complex(w) => z == w,
        },
    }
}

/// True when the i64 round-trips through f64 without loss, so scalar
/// comparison against a complex real part is exact.
fn i64_exact_as_f64(i: i64) -> bool {
    (i as f64) as i64 == i
}

fn num_cmp(a: &Num, b: &Num) -> Option<Ordering> {
    match (a, b) {
        (Num::Complex(_), _) | (_, Num::Complex(_)) => None,
        (Num::Int(x), Num::Int(y)) => Some(x.cmp(y)),
        (Num::Int(x), Num::Float(y)) => LongInt::from(*x).cmp_f64(*y),
        (Num::Float(x), Num::Int(y)) => LongInt::from(*y).cmp_f64(*x).map(Ordering::reverse),
        (Num::Int(x), Num::Big(y)) => Some(BigInt::from(*x).cmp(y)),
        (Num::Big(x), Num::Int(y)) => Some(x.cmp(&BigInt::from(*y))),
        (Num::Float(x), Num::Float(y)) => x.partial_cmp(y),
        (Num::Float(x), Num::Big(y)) => LongInt::new(y.clone()).cmp_f64(*x).map(Ordering::reverse),
        (Num::Big(x), Num::Float(y)) => LongInt::new(x.clone()).cmp_f64(*y),
        (Num::Big(x), Num::Big(y)) => Some(x.cmp(y)),
    }
}

fn cmp_sequences(a: &[Value], b: &[Value], heap: &Heap<impl ResourceTracker>) -> Option<Ordering> {
    for (x, y) in a.iter().zip(b) {
        if x.py_eq(y, heap) {
            continue;
        }
        return x.py_cmp(y, heap);
    }
    Some(a.len().cmp(&b.len()))
}

fn to_f64(n: &Num) -> f64 {
    match n {
        Num::Int(i) => *i as f64,
        Num::Big(b) => LongInt::new(b.clone()).to_f64(),
        Num::Float(f) => *f,
        Num::Complex(_) => f64::NAN,
    }
}

fn to_complex(n: &Num) -> Complex {
    match n {
        Num::Complex(c) => *c,
        other => Complex::new(to_f64(other), 0.0),
    }
}

fn has_complex(a: &Num, b: &Num) -> bool {
    matches!(a, Num::Complex(_)) || matches!(b, Num::Complex(_))
}

fn has_float(a: &Num, b: &Num) -> bool {
    matches!(a, Num::Float(_)) || matches!(b, Num::Float(_))
}

fn to_big(n: Num) -> BigInt {
    match n {
        Num::Int(i) => BigInt::from(i),
        Num::Big(b) => b,
        // callers promote float/complex before reaching here
        Num::Float(_) | Num::Complex(_) => BigInt::from(0),
    }
}

fn num_add(a: Num, b: Num) -> RunResult<Num> {
    if has_complex(&a, &b) {
        return Ok(Num::Complex(to_complex(&a).add(to_complex(&b))));
    }
    if has_float(&a, &b) {
        return Ok(Num::Float(to_f64(&a) + to_f64(&b)));
    }
    if let (Num::Int(x), Num::Int(y)) = (&a, &b)
        && let Some(sum) = x.checked_add(*y)
    {
        return Ok(Num::Int(sum));
    }
    Ok(Num::Big(to_big(a) + to_big(b)))
}

fn num_sub(a: Num, b: Num) -> RunResult<Num> {
    if has_complex(&a, &b) {
        return Ok(Num::Complex(to_complex(&a).sub(to_complex(&b))));
    }
    if has_float(&a, &b) {
        return Ok(Num::Float(to_f64(&a) - to_f64(&b)));
    }
    if let (Num::Int(x), Num::Int(y)) = (&a, &b)
        && let Some(diff) = x.checked_sub(*y)
    {
        return Ok(Num::Int(diff));
    }
    Ok(Num::Big(to_big(a) - to_big(b)))
}

fn num_mul(a: Num, b: Num) -> RunResult<Num> {
    if has_complex(&a, &b) {
        return Ok(Num::Complex(to_complex(&a).mul(to_complex(&b))));
    }
    if has_float(&a, &b) {
        return Ok(Num::Float(to_f64(&a) * to_f64(&b)));
    }
    if let (Num::Int(x), Num::Int(y)) = (&a, &b)
        && let Some(product) = x.checked_mul(*y)
    {
        return Ok(Num::Int(product));
    }
    Ok(Num::Big(to_big(a) * to_big(b)))
}

fn num_truediv(a: Num, b: Num) -> RunResult<Num> {
    if has_complex(&a, &b) {
        return Ok(Num::Complex(to_complex(&a).div(to_complex(&b))?));
    }
    let divisor = to_f64(&b);
    if divisor == 0.0 {
        return Err(ExcType::zero_division("division by zero"));
    }
    Ok(Num::Float(to_f64(&a) / divisor))
}

fn num_floordiv(a: Num, b: Num) -> RunResult<Num> {
    if has_complex(&a, &b) {
        return Err(ExcType::type_error("can't take floor of complex number"));
    }
    if has_float(&a, &b) {
        let divisor = to_f64(&b);
        if divisor == 0.0 {
            return Err(ExcType::zero_division("float floor division by zero"));
        }
        return Ok(Num::Float((to_f64(&a) / divisor).floor()));
    }
    if let (Num::Int(x), Num::Int(y)) = (&a, &b) {
        let (x, y) = (*x, *y);
        if y == 0 {
            return Err(ExcType::zero_division("integer division or modulo by zero"));
        }
        // i64::MIN // -1 is the one overflowing case; fall through to BigInt.
        if !(x == i64::MIN && y == -1) {
            return Ok(Num::Int(num_integer::Integer::div_floor(&x, &y)));
        }
    }
    let (x, y) = (to_big(a), to_big(b));
    if y.is_zero() {
        return Err(ExcType::zero_division("integer division or modulo by zero"));
    }
    Ok(Num::Big(num_integer::Integer::div_floor(&x, &y)))
}

fn num_mod(a: Num, b: Num) -> RunResult<Num> {
    if has_complex(&a, &b) {
        return Err(ExcType::type_error("can't mod complex numbers"));
    }
    if has_float(&a, &b) {
        let divisor = to_f64(&b);
        if divisor == 0.0 {
            return Err(ExcType::zero_division("float modulo"));
        }
        let rem = to_f64(&a) % divisor;
        // Python's % takes the divisor's sign.
        let adjusted = if rem != 0.0 && (rem < 0.0) != (divisor < 0.0) {
            rem + divisor
        } else {
            rem
        };
        return Ok(Num::Float(adjusted));
    }
    if let (Num::Int(x), Num::Int(y)) = (&a, &b) {
        let (x, y) = (*x, *y);
        if y == 0 {
            return Err(ExcType::zero_division("integer division or modulo by zero"));
        }
        // mod_floor overflows on (i64::MIN, -1); the answer is 0.
        if y == -1 {
            return Ok(Num::Int(0));
        }
        return Ok(Num::Int(num_integer::Integer::mod_floor(&x, &y)));
    }
    let (x, y) = (to_big(a), to_big(b));
    if y.is_zero() {
        return Err(ExcType::zero_division("integer division or modulo by zero"));
    }
    Ok(Num::Big(num_integer::Integer::mod_floor(&x, &y)))
}

fn num_pow(a: Num, b: Num) -> RunResult<Num> {
    if has_complex(&a, &b) {
        return Ok(Num::Complex(to_complex(&a).pow_complex(to_complex(&b))?));
    }
    match (&a, &b) {
        // Integer base and exponent: exact, promoting past i64 as needed.
        (Num::Int(_) | Num::Big(_), Num::Int(exp)) if *exp >= 0 => {
            let exp = u64::try_from(*exp).unwrap_or(u64::MAX);
            Ok(Num::Big(Pow::pow(to_big(a), exp)))
        }
        (Num::Int(_) | Num::Big(_), Num::Big(exp)) if !exp.is_negative() => {
            let exp = exp
                .to_u64()
                .ok_or_else(|| ExcType::type_error("exponent too large"))?;
            Ok(Num::Big(Pow::pow(to_big(a), exp)))
        }
        _ => {
            let (base, exp) = (to_f64(&a), to_f64(&b));
            if base == 0.0 && exp < 0.0 {
                return Err(ExcType::zero_division("0.0 cannot be raised to a negative power"));
            }
            if base < 0.0 && exp.fract() != 0.0 {
                // Negative base with a fractional exponent has no real result.
                return Ok(Num::Complex(Complex::new(base, 0.0).pow_float(exp)?));
            }
            Ok(Num::Float(base.powf(exp)))
        }
    }
}

/// Converts an arithmetic result back to a `Value`, demoting big integers
/// that fit in i64 and allocating the rest.
fn materialize(result: RunResult<Num>, heap: &mut Heap<impl ResourceTracker>) -> RunResult<Value> {
    match result? {
        Num::Int(i) => Ok(Value::Int(i)),
        Num::Big(b) => Ok(LongInt::new(b).into_value(heap)?),
        Num::Float(f) => Ok(Value::Float(f)),
        Num::Complex(c) => Ok(Value::Ref(heap.allocate(HeapData::Complex(c))?)),
    }
}

/// Shared helper for allocating a string result.
pub(crate) fn alloc_str(heap: &mut Heap<impl ResourceTracker>, s: impl Into<Str>) -> RunResult<Value> {
    Ok(Value::Ref(heap.allocate(HeapData::Str(s.into()))?))
}

/// Builds a frozen set value from storage, computing its content hash.
pub(crate) fn alloc_frozen(heap: &mut Heap<impl ResourceTracker>, storage: SetStorage) -> RunResult<Value> {
    Ok(Value::Ref(heap.allocate(HeapData::FrozenSet(FrozenSet::new(storage)))?))
}
