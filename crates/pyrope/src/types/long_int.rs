//! LongInt wrapper for arbitrary precision integer support.
//!
//! The runtime has one integer kind with two encodings: `Value::Int(i64)`
//! for values in native range, and heap-allocated `LongInt` otherwise.
//! Arithmetic that overflows i64 transparently re-executes here, and
//! `into_value` demotes results back to i64 whenever they fit, so the two
//! encodings are interchangeable and never observable.

use std::cmp::Ordering;
use std::fmt::{self, Display};

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{FromPrimitive, Signed, ToPrimitive, Zero};

use crate::{
    exception::RunResult,
    heap::{Heap, HeapData, HeapId},
    py_hash::{HASH_MODULUS, hash_int},
    resource::{ResourceError, ResourceTracker},
    types::{PyTrait, Type},
    value::Value,
};

/// Wrapper around `num_bigint::BigInt` for integers outside i64 range.
///
/// The inner `BigInt` is accessible via `.0` for arithmetic that needs
/// direct access to the underlying type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct LongInt(pub BigInt);

impl LongInt {
    /// Creates a new `LongInt` from a `BigInt`.
    #[must_use]
    pub fn new(bi: BigInt) -> Self {
        Self(bi)
    }

    /// Converts to a `Value`, demoting to i64 if it fits.
    pub fn into_value(self, heap: &mut Heap<impl ResourceTracker>) -> Result<Value, ResourceError> {
        if let Some(i) = self.0.to_i64() {
            Ok(Value::Int(i))
        } else {
            let heap_id = heap.allocate(HeapData::LongInt(self))?;
            Ok(Value::Ref(heap_id))
        }
    }

    /// Computes the hash using the shared Mersenne-prime modular algorithm.
    ///
    /// For values that fit in i64 this delegates to [`hash_int`], keeping the
    /// cross-encoding invariant (`hash` is the same whichever encoding holds
    /// the value). Outside i64 range the same reduction modulo `2^61 - 1`
    /// applies directly to the `BigInt`.
    #[must_use]
    pub fn hash(&self) -> u64 {
        if let Some(i) = self.0.to_i64() {
            return hash_int(i);
        }
        let modulus_big = BigInt::from(HASH_MODULUS);
        let mut remainder = self.0.abs() % &modulus_big;
        if self.0.is_negative() {
            remainder = -remainder;
        }
        let result = remainder.to_i64().unwrap_or(0);
        let adjusted = if result == -1 { -2i64 } else { result };
        u64::from_ne_bytes(adjusted.to_ne_bytes())
    }

    /// Floor division, matching `//` semantics (result rounds toward
    /// negative infinity).
    #[must_use]
    pub fn floor_div(&self, other: &Self) -> Self {
        Self(self.0.div_floor(&other.0))
    }

    /// Floor modulo, matching `%` semantics (result has the divisor's sign).
    #[must_use]
    pub fn mod_floor(&self, other: &Self) -> Self {
        Self(self.0.mod_floor(&other.0))
    }

    /// Returns true if the value is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Lossy conversion to f64 (used by `/` and mixed int/float arithmetic).
    #[must_use]
    pub fn to_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or(if self.0.is_negative() {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        })
    }

    /// Compares with an i64 by mathematical value.
    #[must_use]
    pub fn cmp_i64(&self, other: i64) -> Ordering {
        self.0.cmp(&BigInt::from(other))
    }

    /// Compares with a float by mathematical value.
    ///
    /// Exact: finite floats are converted to `BigInt` plus a fractional
    /// remainder rather than rounding this value through f64 (which would
    /// make distinct huge integers compare equal).
    #[must_use]
    pub fn cmp_f64(&self, other: f64) -> Option<Ordering> {
        if other.is_nan() {
            return None;
        }
        if other == f64::INFINITY {
            return Some(Ordering::Less);
        }
        if other == f64::NEG_INFINITY {
            return Some(Ordering::Greater);
        }
        let trunc = BigInt::from_f64_lossless(other.trunc());
        let fract = other.fract();
        match self.0.cmp(&trunc) {
            Ordering::Equal => {
                // Equal integer parts: the fractional part breaks the tie.
                if fract == 0.0 {
                    Some(Ordering::Equal)
                } else if fract > 0.0 {
                    Some(Ordering::Less)
                } else {
                    Some(Ordering::Greater)
                }
            }
            other_ord => Some(other_ord),
        }
    }

    /// Equality with a float by mathematical value.
    #[must_use]
    pub fn eq_f64(&self, other: f64) -> bool {
        self.cmp_f64(other) == Some(Ordering::Equal)
    }
}

/// Extension for exact f64 -> BigInt conversion of integral values.
trait FromF64Lossless {
    fn from_f64_lossless(value: f64) -> BigInt;
}

impl FromF64Lossless for BigInt {
    fn from_f64_lossless(value: f64) -> BigInt {
        debug_assert!(value.fract() == 0.0 && value.is_finite());
        BigInt::from_f64(value).unwrap_or_else(Zero::zero)
    }
}

impl From<i64> for LongInt {
    fn from(i: i64) -> Self {
        Self(BigInt::from(i))
    }
}

impl From<BigInt> for LongInt {
    fn from(bi: BigInt) -> Self {
        Self(bi)
    }
}

impl Display for LongInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl PyTrait for LongInt {
    fn py_type(&self, _heap: &Heap<impl ResourceTracker>) -> Type {
        Type::Int
    }

    fn py_bool(&self, _heap: &Heap<impl ResourceTracker>) -> bool {
        !self.is_zero()
    }

    fn py_len(&self, _heap: &Heap<impl ResourceTracker>) -> Option<usize> {
        None
    }

    fn py_hash(&self, _heap: &Heap<impl ResourceTracker>) -> Option<u64> {
        Some(self.hash())
    }

    fn py_repr(&self, _heap: &Heap<impl ResourceTracker>, _depth: u16) -> RunResult<String> {
        Ok(self.0.to_string())
    }

    fn py_estimate_size(&self) -> usize {
        size_of::<Self>() + self.0.bits() as usize / 8
    }

    fn collect_child_ids(&self, _ids: &mut Vec<HeapId>) {}
}
