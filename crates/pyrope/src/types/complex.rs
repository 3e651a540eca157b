use crate::{
    exception::{ExcType, RunResult},
    heap::{Heap, HeapId},
    py_hash::hash_float,
    resource::ResourceTracker,
    types::{PyTrait, Type},
    value::float_repr,
};

/// Complex number value with paired real and imaginary parts.
///
/// Supports `+ - * /`; division validates a non-zero denominator magnitude.
/// Exponentiation uses repeated squaring for integer exponents and polar
/// form otherwise (see `pow_int` / `pow_float`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Complex {
    pub real: f64,
    pub imag: f64,
}

impl Complex {
    #[must_use]
    pub fn new(real: f64, imag: f64) -> Self {
        Self { real, imag }
    }

    #[must_use]
    pub fn add(self, other: Self) -> Self {
        Self::new(self.real + other.real, self.imag + other.imag)
    }

    #[must_use]
    pub fn sub(self, other: Self) -> Self {
        Self::new(self.real - other.real, self.imag - other.imag)
    }

    #[must_use]
    pub fn mul(self, other: Self) -> Self {
        Self::new(
            self.real * other.real - self.imag * other.imag,
            self.real * other.imag + self.imag * other.real,
        )
    }

    /// Complex division; fails with `ZeroDivisionError` when the divisor's
    /// squared magnitude is zero.
    pub fn div(self, other: Self) -> RunResult<Self> {
        let denom = other.real * other.real + other.imag * other.imag;
        if denom == 0.0 {
            return Err(ExcType::zero_division("complex division by zero"));
        }
        Ok(Self::new(
            (self.real * other.real + self.imag * other.imag) / denom,
            (self.imag * other.real - self.real * other.imag) / denom,
        ))
    }

    /// Integer exponent by repeated squaring; negative exponents invert the
    /// positive power.
    pub fn pow_int(self, exp: i64) -> RunResult<Self> {
        if exp < 0 {
            let positive = self.pow_int(-exp)?;
            return Self::new(1.0, 0.0).div(positive);
        }
        let mut result = Self::new(1.0, 0.0);
        let mut base = self;
        let mut e = exp as u64;
        while e > 0 {
            if e & 1 == 1 {
                result = result.mul(base);
            }
            base = base.mul(base);
            e >>= 1;
        }
        Ok(result)
    }

    /// Non-integer exponent via polar form: `z^p = r^p * e^(i * p * theta)`.
    pub fn pow_float(self, exp: f64) -> RunResult<Self> {
        if self.real == 0.0 && self.imag == 0.0 {
            if exp < 0.0 {
                return Err(ExcType::zero_division("0.0 cannot be raised to a negative power"));
            }
            return Ok(if exp == 0.0 { Self::new(1.0, 0.0) } else { Self::new(0.0, 0.0) });
        }
        let r = self.magnitude();
        let theta = self.imag.atan2(self.real);
        let new_r = r.powf(exp);
        let new_theta = theta * exp;
        Ok(Self::new(new_r * new_theta.cos(), new_r * new_theta.sin()))
    }

    /// Complex exponent via `z^w = exp(w * ln z)`.
    ///
    /// Real exponents with an integer value go through `pow_int` so results
    /// like `i**4` come out exact; other real exponents use `pow_float`.
    pub fn pow_complex(self, exp: Self) -> RunResult<Self> {
        if exp.imag == 0.0 {
            if exp.real.fract() == 0.0 && exp.real.abs() < 1e15 {
                return self.pow_int(exp.real as i64);
            }
            return self.pow_float(exp.real);
        }
        if self.real == 0.0 && self.imag == 0.0 {
            return Err(ExcType::zero_division("0.0 to a complex power"));
        }
        let ln = Self::new(self.magnitude().ln(), self.imag.atan2(self.real));
        let scaled = exp.mul(ln);
        let r = scaled.real.exp();
        Ok(Self::new(r * scaled.imag.cos(), r * scaled.imag.sin()))
    }

    #[must_use]
    pub fn magnitude(self) -> f64 {
        self.real.hypot(self.imag)
    }

    #[must_use]
    pub fn neg(self) -> Self {
        Self::new(-self.real, -self.imag)
    }

    /// Equality with a real scalar: imaginary part must be exactly zero.
    #[must_use]
    pub fn eq_scalar(self, scalar: f64) -> bool {
        self.imag == 0.0 && self.real == scalar
    }
}

impl PyTrait for Complex {
    fn py_type(&self, _heap: &Heap<impl ResourceTracker>) -> Type {
        Type::Complex
    }

    fn py_bool(&self, _heap: &Heap<impl ResourceTracker>) -> bool {
        self.real != 0.0 || self.imag != 0.0
    }

    fn py_len(&self, _heap: &Heap<impl ResourceTracker>) -> Option<usize> {
        None
    }

    fn py_hash(&self, _heap: &Heap<impl ResourceTracker>) -> Option<u64> {
        // Combine part hashes so complex(n, 0) hashes like the real n,
        // preserving "equal values hash equal" for complex == float == int.
        if self.imag == 0.0 {
            return Some(hash_float(self.real));
        }
        let real = i64::from_ne_bytes(hash_float(self.real).to_ne_bytes());
        let imag = i64::from_ne_bytes(hash_float(self.imag).to_ne_bytes());
        Some(u64::from_ne_bytes(
            real.wrapping_add(imag.wrapping_mul(1_000_003)).to_ne_bytes(),
        ))
    }

    fn py_repr(&self, _heap: &Heap<impl ResourceTracker>, _depth: u16) -> RunResult<String> {
        let imag_sign = if self.imag >= 0.0 && !self.imag.is_nan() { "+" } else { "" };
        if self.real == 0.0 && self.real.is_sign_positive() {
            Ok(format!("{}j", float_repr(self.imag)))
        } else {
            Ok(format!(
                "({}{imag_sign}{}j)",
                float_repr(self.real),
                float_repr(self.imag)
            ))
        }
    }

    fn py_estimate_size(&self) -> usize {
        size_of::<Self>()
    }

    fn collect_child_ids(&self, _ids: &mut Vec<HeapId>) {}
}
