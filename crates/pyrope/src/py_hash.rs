//! Deterministic hash helpers upholding the cross-kind hash invariant.
//!
//! The runtime guarantees that if `a == b` then `hash(a) == hash(b)`. Since
//! `0 == 0.0 == False` and `1 == 1.0 == True`, the hash functions for int,
//! float, and bool must produce identical values for equal inputs. Numeric
//! hashing therefore uses the Mersenne-prime modular algorithm (reduction
//! modulo `2^61 - 1`), which extends naturally to arbitrary-precision
//! integers and to floats via `frexp`-style decomposition.
//!
//! Strings and bytes hash with a fixed-seed `ahash` hasher so dict/set
//! behavior is deterministic within a process run.

use std::hash::{BuildHasher, Hasher};

use ahash::RandomState;

/// Mersenne prime used for numeric hashing: `2^61 - 1`.
///
/// All numeric kinds (bool, int, long int, float) hash modulo this prime so
/// that equal values across kinds produce identical hashes.
pub(crate) const HASH_MODULUS: i64 = (1 << 61) - 1;

/// Fixed seeds for string/bytes hashing. Deterministic by construction; the
/// runtime does not randomize hashes between runs.
const STR_SEED: (u64, u64, u64, u64) = (
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
);

/// Hashes raw bytes with the fixed-seed hasher.
///
/// Empty input hashes to `0`, matching the numeric-zero convention used by
/// the modular algorithm.
#[must_use]
pub(crate) fn hash_bytes(bytes: &[u8]) -> u64 {
    if bytes.is_empty() {
        return 0;
    }
    let state = RandomState::with_seeds(STR_SEED.0, STR_SEED.1, STR_SEED.2, STR_SEED.3);
    let mut hasher = state.build_hasher();
    hasher.write(bytes);
    hasher.finish()
}

/// Hashes UTF-8 string content.
#[must_use]
pub(crate) fn hash_str(value: &str) -> u64 {
    hash_bytes(value.as_bytes())
}

/// Hashes a signed 64-bit integer with the modular algorithm.
///
/// The algorithm is `n % HASH_MODULUS` (sign-preserving), with a result of
/// `-1` remapped to `-2` so `-1` stays available as an error sentinel for
/// embedders that need one. The returned `u64` is the bit-reinterpretation
/// of the signed result, the convention used by all hash paths.
#[must_use]
pub(crate) fn hash_int(value: i64) -> u64 {
    u64::from_ne_bytes(hash_int_signed(value).to_ne_bytes())
}

/// Signed version of [`hash_int`], used internally and by float hashing.
fn hash_int_signed(value: i64) -> i64 {
    if value == 0 {
        return 0;
    }
    let sign: i64 = if value < 0 { -1 } else { 1 };
    // i64::MIN's absolute value overflows i64; widen before taking it.
    let abs_val = i128::from(value).unsigned_abs() as u64;
    let remainder = (abs_val % HASH_MODULUS as u64) as i64;
    let result = sign * remainder;
    if result == -1 { -2 } else { result }
}

/// Hashes an `f64` consistently with the integer algorithm.
///
/// Integral floats (like `1.0`, `42.0` and values beyond i64 range) reduce
/// to the same residue an equal integer would, so `hash(n) == hash(float(n))`
/// holds. Non-integral floats decompose the mantissa bit by bit modulo
/// `HASH_MODULUS`.
///
/// Special values: `+inf` hashes to `314159`, `-inf` to `-314159`, NaN to `0`.
#[must_use]
pub(crate) fn hash_float(value: f64) -> u64 {
    u64::from_ne_bytes(hash_float_signed(value).to_ne_bytes())
}

fn hash_float_signed(value: f64) -> i64 {
    if value.is_infinite() {
        return if value > 0.0 { 314_159 } else { -314_159 };
    }
    if value.is_nan() {
        return 0;
    }
    if value == 0.0 {
        return 0;
    }

    let negative = value < 0.0;
    let mut m = value.abs();

    // Decompose as m * 2^e with 0.5 <= m < 1, then fold the mantissa into
    // the modular residue 28 bits at a time.
    let mut e = 0i32;
    while m >= 1.0 {
        m /= 2.0;
        e += 1;
    }
    while m < 0.5 {
        m *= 2.0;
        e -= 1;
    }

    let modulus = HASH_MODULUS as u64;
    let mut x: u64 = 0;
    while m != 0.0 {
        x = ((x << 28) & modulus) | (x >> 33);
        m *= 268_435_456.0; // 2^28
        e -= 28;
        let y = m as u64;
        m -= y as f64;
        x += y;
        if x >= modulus {
            x -= modulus;
        }
    }

    // Fold in the exponent as a rotation.
    let e = e.rem_euclid(61) as u32;
    x = ((x << e) & modulus) | (x >> (61 - e).min(63));

    let mut result = x as i64;
    if negative {
        result = -result;
    }
    if result == -1 { -2 } else { result }
}

/// Combines element hashes for tuple hashing (order-sensitive).
///
/// A simple xor would make `(a, b)` and `(b, a)` collide; this mixes each
/// lane with multiplication and position, in the spirit of CPython's
/// tuple-hash construction.
#[must_use]
pub(crate) fn hash_tuple_lanes(lanes: impl Iterator<Item = u64>) -> u64 {
    let mut acc: u64 = 0x345678;
    let mut mult: u64 = 0xf462_5731;
    let mut count: u64 = 0;
    for lane in lanes {
        acc = (acc ^ lane).wrapping_mul(mult);
        mult = mult.wrapping_add(0x1000_03 + 2 * count);
        count += 1;
    }
    acc.wrapping_add(count ^ 0x34d8_55ef)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_float_consistency() {
        for n in [0i64, 1, -1, 2, 42, -42, 1 << 40, -(1 << 40)] {
            assert_eq!(hash_int(n), hash_float(n as f64), "hash({n}) != hash({n}.0)");
        }
    }

    #[test]
    fn test_bool_as_int() {
        assert_eq!(hash_int(0), hash_float(0.0));
        assert_eq!(hash_int(1), hash_float(1.0));
    }

    #[test]
    fn test_negative_one_remapped() {
        assert_eq!(hash_int(-1), u64::from_ne_bytes((-2i64).to_ne_bytes()));
    }

    #[test]
    fn test_str_hash_deterministic() {
        assert_eq!(hash_str("spam"), hash_str("spam"));
        assert_ne!(hash_str("spam"), hash_str("eggs"));
        assert_eq!(hash_str(""), 0);
    }

    #[test]
    fn test_tuple_lanes_order_sensitive() {
        let ab = hash_tuple_lanes([1u64, 2].into_iter());
        let ba = hash_tuple_lanes([2u64, 1].into_iter());
        assert_ne!(ab, ba);
    }

    #[test]
    fn test_float_special_values() {
        assert_eq!(hash_float(f64::INFINITY), u64::from_ne_bytes(314_159i64.to_ne_bytes()));
        assert_eq!(hash_float(f64::NEG_INFINITY), u64::from_ne_bytes((-314_159i64).to_ne_bytes()));
        assert_eq!(hash_float(f64::NAN), 0);
    }
}
