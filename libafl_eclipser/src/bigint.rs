//! Arbitrary-precision signed integer (`BigInt`) and exact rational
//! (`Fraction`) arithmetic.
//!
//! A branch's `try_value`/`distance` or a model's slope needs this: a 64-bit
//! operand's exact distance can itself need 65 bits after a wrap-around
//! subtraction, and a slope computed from two such distances needs a
//! rational, not a float, to stay exact across the candidate-exactness check
//! a solved equation must pass.
//!
//! This is deliberately a minimal bignum: base-1e9 limbs, schoolbook
//! multiplication, and a naive long-division. Nothing here needs to be fast;
//! it needs to be exact and small.

use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt;
use core::ops::{Add, Div, Mul, Neg, Rem, Shl, Shr, Sub};

use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

const LIMB_BASE: u64 = 1_000_000_000;
const LIMB_DIGITS: usize = 9;

/// Arbitrary-precision signed integer.
///
/// Stored as sign-magnitude: `negative` plus little-endian base-1e9 limbs
/// in `mag`. `mag` never carries a trailing zero limb except to represent
/// zero itself as `mag == [0]`, and zero is always `negative == false`.
#[derive(Clone, Debug, Eq)]
pub struct BigInt {
    negative: bool,
    mag: Vec<u64>,
}

impl BigInt {
    /// The additive identity.
    #[must_use]
    pub fn zero() -> Self {
        BigInt { negative: false, mag: vec![0] }
    }

    /// `true` if this value is exactly zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.mag.len() == 1 && self.mag[0] == 0
    }

    /// `true` if this value is strictly negative.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.negative
    }

    fn normalize(mut self) -> Self {
        while self.mag.len() > 1 && *self.mag.last().unwrap() == 0 {
            self.mag.pop();
        }
        if self.is_zero() {
            self.negative = false;
        }
        self
    }

    fn from_mag(mag: Vec<u64>, negative: bool) -> Self {
        BigInt { negative, mag }.normalize()
    }

    /// Builds a `BigInt` with magnitude `2^bits`.
    #[must_use]
    pub fn power_of_two(bits: u32) -> Self {
        BigInt::from(1u64).shl(bits)
    }

    /// Compares magnitudes only, ignoring sign.
    fn cmp_mag(&self, other: &Self) -> Ordering {
        if self.mag.len() != other.mag.len() {
            return self.mag.len().cmp(&other.mag.len());
        }
        for i in (0..self.mag.len()).rev() {
            if self.mag[i] != other.mag[i] {
                return self.mag[i].cmp(&other.mag[i]);
            }
        }
        Ordering::Equal
    }

    fn add_mag(a: &[u64], b: &[u64]) -> Vec<u64> {
        let mut out = Vec::with_capacity(a.len().max(b.len()) + 1);
        let mut carry = 0u64;
        for i in 0..a.len().max(b.len()) {
            let x = *a.get(i).unwrap_or(&0);
            let y = *b.get(i).unwrap_or(&0);
            let sum = x + y + carry;
            out.push(sum % LIMB_BASE);
            carry = sum / LIMB_BASE;
        }
        if carry > 0 {
            out.push(carry);
        }
        out
    }

    /// Requires `a >= b` in magnitude.
    fn sub_mag(a: &[u64], b: &[u64]) -> Vec<u64> {
        let mut out = Vec::with_capacity(a.len());
        let mut borrow = 0i64;
        for i in 0..a.len() {
            let x = a[i] as i64;
            let y = *b.get(i).unwrap_or(&0) as i64;
            let mut d = x - y - borrow;
            if d < 0 {
                d += LIMB_BASE as i64;
                borrow = 1;
            } else {
                borrow = 0;
            }
            out.push(d as u64);
        }
        out
    }

    fn mul_mag(a: &[u64], b: &[u64]) -> Vec<u64> {
        let mut out = vec![0u64; a.len() + b.len()];
        for (i, &ai) in a.iter().enumerate() {
            let mut carry = 0u64;
            for (j, &bj) in b.iter().enumerate() {
                let cur = out[i + j] + ai * bj + carry;
                out[i + j] = cur % LIMB_BASE;
                carry = cur / LIMB_BASE;
            }
            let mut k = i + b.len();
            while carry > 0 {
                let cur = out[k] + carry;
                out[k] = cur % LIMB_BASE;
                carry = cur / LIMB_BASE;
                k += 1;
            }
        }
        out
    }

    /// Schoolbook long division of magnitudes. Returns `(quotient, remainder)`.
    fn divmod_mag(a: &[u64], b: &[u64]) -> (Vec<u64>, Vec<u64>) {
        let zero = vec![0u64];
        if b == zero.as_slice() {
            // unreachable in practice: callers check is_zero() first.
            return (vec![0], vec![0]);
        }
        let mut quotient = vec![0u64; a.len()];
        let mut remainder: Vec<u64> = vec![0];
        for i in (0..a.len()).rev() {
            // remainder = remainder * LIMB_BASE + a[i]
            remainder = Self::mul_mag(&remainder, &[LIMB_BASE]);
            remainder = Self::add_mag(&remainder, &[a[i]]);
            remainder = Self::trim(remainder);

            // binary-search the largest digit d in [0, LIMB_BASE) with d*b <= remainder
            let (mut lo, mut hi) = (0u64, LIMB_BASE - 1);
            while lo < hi {
                let mid = (lo + hi + 1) / 2;
                let trial = Self::trim(Self::mul_mag(b, &[mid]));
                if Self::cmp_mag_raw(&trial, &remainder) != Ordering::Greater {
                    lo = mid;
                } else {
                    hi = mid - 1;
                }
            }
            quotient[i] = lo;
            let sub = Self::trim(Self::mul_mag(b, &[lo]));
            remainder = Self::trim(Self::sub_mag(&Self::pad(&remainder, sub.len()), &sub));
        }
        (Self::trim(quotient), Self::trim(remainder))
    }

    fn trim(mut v: Vec<u64>) -> Vec<u64> {
        while v.len() > 1 && *v.last().unwrap() == 0 {
            v.pop();
        }
        v
    }

    fn pad(v: &[u64], len: usize) -> Vec<u64> {
        let mut out = v.to_vec();
        while out.len() < len {
            out.push(0);
        }
        out
    }

    fn cmp_mag_raw(a: &[u64], b: &[u64]) -> Ordering {
        let len = a.len().max(b.len());
        for i in (0..len).rev() {
            let x = *a.get(i).unwrap_or(&0);
            let y = *b.get(i).unwrap_or(&0);
            if x != y {
                return x.cmp(&y);
            }
        }
        Ordering::Equal
    }

    /// Parses a base-10 string, optionally signed with a leading `-`.
    pub fn from_str_radix10(s: &str) -> Result<Self, Error> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::parse_failure("empty BigInt literal"));
        }
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::parse_failure(alloc::format!("not a decimal integer: {s}")));
        }
        let mut mag = Vec::new();
        let bytes = digits.as_bytes();
        let mut end = bytes.len();
        while end > 0 {
            let start = end.saturating_sub(LIMB_DIGITS);
            let chunk = core::str::from_utf8(&bytes[start..end]).unwrap();
            mag.push(chunk.parse::<u64>().unwrap());
            end = start;
        }
        if mag.is_empty() {
            mag.push(0);
        }
        Ok(BigInt::from_mag(mag, negative))
    }

    /// Returns this value truncated to a `u64`, if it fits and is non-negative.
    #[must_use]
    pub fn to_u64(&self) -> Option<u64> {
        if self.negative {
            return None;
        }
        if self.mag.len() > 3 {
            return None;
        }
        let mut acc: u128 = 0;
        for &limb in self.mag.iter().rev() {
            acc = acc.checked_mul(LIMB_BASE as u128)?.checked_add(limb as u128)?;
        }
        u64::try_from(acc).ok()
    }

    /// Modular reduction into `[0, modulus)`, assuming `modulus > 0`.
    #[must_use]
    pub fn rem_euclid(&self, modulus: &BigInt) -> BigInt {
        let r = self.clone() % modulus.clone();
        if r.is_negative() {
            r + modulus.clone()
        } else {
            r
        }
    }
}

impl From<u64> for BigInt {
    fn from(mut v: u64) -> Self {
        if v == 0 {
            return BigInt::zero();
        }
        let mut mag = Vec::new();
        while v > 0 {
            mag.push(v % LIMB_BASE);
            v /= LIMB_BASE;
        }
        BigInt { negative: false, mag }
    }
}

impl From<i64> for BigInt {
    fn from(v: i64) -> Self {
        if v < 0 {
            -BigInt::from(v.unsigned_abs())
        } else {
            BigInt::from(v as u64)
        }
    }
}

impl PartialEq for BigInt {
    fn eq(&self, other: &Self) -> bool {
        self.negative == other.negative && self.mag == other.mag
    }
}

impl PartialOrd for BigInt {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BigInt {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.negative, other.negative) {
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
            (false, false) => self.cmp_mag(other),
            (true, true) => other.cmp_mag(self),
        }
    }
}

impl Neg for BigInt {
    type Output = BigInt;
    fn neg(self) -> BigInt {
        if self.is_zero() {
            self
        } else {
            BigInt { negative: !self.negative, mag: self.mag }
        }
    }
}

impl Add for BigInt {
    type Output = BigInt;
    fn add(self, rhs: BigInt) -> BigInt {
        if self.negative == rhs.negative {
            BigInt::from_mag(Self::add_mag(&self.mag, &rhs.mag), self.negative)
        } else if self.cmp_mag(&rhs) != Ordering::Less {
            BigInt::from_mag(Self::sub_mag(&self.mag, &rhs.mag), self.negative)
        } else {
            BigInt::from_mag(Self::sub_mag(&rhs.mag, &self.mag), rhs.negative)
        }
    }
}

impl Sub for BigInt {
    type Output = BigInt;
    fn sub(self, rhs: BigInt) -> BigInt {
        self + (-rhs)
    }
}

impl Mul for BigInt {
    type Output = BigInt;
    fn mul(self, rhs: BigInt) -> BigInt {
        BigInt::from_mag(Self::mul_mag(&self.mag, &rhs.mag), self.negative != rhs.negative)
    }
}

impl Div for BigInt {
    type Output = BigInt;
    fn div(self, rhs: BigInt) -> BigInt {
        let (q, _) = Self::divmod_mag(&self.mag, &rhs.mag);
        BigInt::from_mag(q, self.negative != rhs.negative)
    }
}

impl Rem for BigInt {
    type Output = BigInt;
    fn rem(self, rhs: BigInt) -> BigInt {
        let (_, r) = Self::divmod_mag(&self.mag, &rhs.mag);
        BigInt::from_mag(r, self.negative)
    }
}

impl Shl<u32> for BigInt {
    type Output = BigInt;
    fn shl(self, bits: u32) -> BigInt {
        let pow = BigInt::from(2u64);
        let mut acc = BigInt::from(1u64);
        for _ in 0..bits {
            acc = acc * pow.clone();
        }
        self * acc
    }
}

impl Shr<u32> for BigInt {
    type Output = BigInt;
    fn shr(self, bits: u32) -> BigInt {
        let pow = BigInt::from(2u64);
        let mut acc = BigInt::from(1u64);
        for _ in 0..bits {
            acc = acc * pow.clone();
        }
        self / acc
    }
}

impl fmt::Display for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-")?;
        }
        write!(f, "{}", self.mag.last().unwrap())?;
        for limb in self.mag[..self.mag.len() - 1].iter().rev() {
            write!(f, "{limb:0width$}", width = LIMB_DIGITS)?;
        }
        Ok(())
    }
}

impl ToString for BigInt {
    fn to_string(&self) -> String {
        alloc::format!("{self}")
    }
}

/// Serializes through the decimal-string `Display`, since `try_value`/
/// `distance` need to survive round-trips through JSON and arbitrary
/// precision would overflow a native JSON number.
impl Serialize for BigInt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for BigInt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        BigInt::from_str_radix10(&s).map_err(D::Error::custom)
    }
}

fn gcd(a: BigInt, b: BigInt) -> BigInt {
    let (mut a, mut b) = (
        if a.is_negative() { -a } else { a },
        if b.is_negative() { -b } else { b },
    );
    while !b.is_zero() {
        let r = a.clone() % b.clone();
        a = b;
        b = r;
    }
    a
}

/// Exact rational number `numerator / denominator`, always stored with a
/// strictly positive denominator and reduced to lowest terms.
///
/// Used everywhere a branch model's slope is stored: a plain `f64` slope
/// would make the solver's exact-integer-preimage acceptance test unsound
/// whenever the true ratio isn't representable in binary floating point.
#[derive(Clone, Debug, Eq)]
pub struct Fraction {
    num: BigInt,
    den: BigInt,
}

impl Fraction {
    /// Builds `num/den`, reducing and normalizing the sign to the numerator.
    ///
    /// # Panics
    /// Panics if `den` is zero (a caller precondition violation, not a data error).
    #[must_use]
    pub fn new(mut num: BigInt, mut den: BigInt) -> Self {
        assert!(!den.is_zero(), "Fraction denominator must be nonzero");
        if den.is_negative() {
            num = -num;
            den = -den;
        }
        let g = gcd(num.clone(), den.clone());
        if !g.is_zero() && g != BigInt::from(1u64) {
            num = num / g.clone();
            den = den / g;
        }
        Fraction { num, den }
    }

    /// Zero, represented as `0/1`.
    #[must_use]
    pub fn zero() -> Self {
        Fraction { num: BigInt::zero(), den: BigInt::from(1u64) }
    }

    /// Numerator of the reduced fraction.
    #[must_use]
    pub fn numerator(&self) -> &BigInt {
        &self.num
    }

    /// Denominator of the reduced fraction (always positive).
    #[must_use]
    pub fn denominator(&self) -> &BigInt {
        &self.den
    }

    /// `true` for the zero fraction; the branch-modeling code treats this as
    /// "slope inference found no linear relation."
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.num.is_zero()
    }
}

impl PartialEq for Fraction {
    fn eq(&self, other: &Self) -> bool {
        // cross-multiply since both sides are already reduced with positive dens
        self.num.clone() * other.den.clone() == other.num.clone() * self.den.clone()
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Serializes as a `{numerator, denominator}` object of decimal strings.
impl Serialize for Fraction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("Fraction", 2)?;
        s.serialize_field("numerator", &self.num)?;
        s.serialize_field("denominator", &self.den)?;
        s.end()
    }
}

impl<'de> Deserialize<'de> for Fraction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            numerator: BigInt,
            denominator: BigInt,
        }
        let raw = Raw::deserialize(deserializer)?;
        Ok(Fraction::new(raw.numerator, raw.denominator))
    }
}

/// Byte order for a solver candidate's chunk.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Endian {
    LE,
    BE,
}

/// Little-endian limb extraction truncated/padded to `size` bytes, then
/// reversed for `BE`. Silently truncates values wider than `size` bytes;
/// callers only ever pass values already known to fit, per the solver's
/// range check.
#[must_use]
pub fn bigint_to_bytes(endian: Endian, size: usize, mut value: BigInt) -> Vec<u8> {
    let mut temp = Vec::with_capacity(size);
    let base = BigInt::from(256u64);
    for _ in 0..size {
        let byte = (value.clone() % base.clone()).to_u64().unwrap_or(0) as u8;
        temp.push(byte);
        value = value / base.clone();
    }
    if endian == Endian::BE {
        temp.reverse();
    }
    temp
}

/// Reassembles a byte slice (in the given order) into an unsigned `BigInt`,
/// most-significant byte accumulated last.
#[must_use]
pub fn bytes_to_bigint(endian: Endian, bytes: &[u8]) -> BigInt {
    let mut v = BigInt::zero();
    let base = BigInt::from(256u64);
    let iter: Vec<u8> = match endian {
        Endian::LE => bytes.iter().rev().copied().collect(),
        Endian::BE => bytes.to_vec(),
    };
    for b in iter {
        v = v * base.clone() + BigInt::from(u64::from(b));
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_sub_roundtrip() {
        let a = BigInt::from(123_456_789_012_345_u64);
        let b = BigInt::from(987_654_321_u64);
        assert_eq!(a.clone() + b.clone() - b, a);
    }

    #[test]
    fn negative_subtraction() {
        let a = BigInt::from(5u64);
        let b = BigInt::from(9u64);
        let r = a - b;
        assert!(r.is_negative());
        assert_eq!(r, -BigInt::from(4u64));
    }

    #[test]
    fn multiplication_matches_u64() {
        let a = BigInt::from(999_999_999u64);
        let b = BigInt::from(2u64);
        assert_eq!(a * b, BigInt::from(1_999_999_998u64));
    }

    #[test]
    fn division_and_remainder() {
        let a = BigInt::from(100u64);
        let b = BigInt::from(7u64);
        assert_eq!(a.clone() / b.clone(), BigInt::from(14u64));
        assert_eq!(a % b, BigInt::from(2u64));
    }

    #[test]
    fn shift_is_power_of_two() {
        assert_eq!(BigInt::from(1u64).shl(8), BigInt::from(256u64));
        assert_eq!(BigInt::power_of_two(16), BigInt::from(65536u64));
    }

    #[test]
    fn decimal_round_trip() {
        let v = BigInt::from_str_radix10("-123456789012345678901234567890").unwrap();
        assert_eq!(v.to_string(), "-123456789012345678901234567890");
    }

    #[test]
    fn fraction_reduces() {
        let f = Fraction::new(BigInt::from(4u64), BigInt::from(8u64));
        assert_eq!(f.numerator(), &BigInt::from(1u64));
        assert_eq!(f.denominator(), &BigInt::from(2u64));
    }

    #[test]
    fn fraction_normalizes_sign_to_numerator() {
        let f = Fraction::new(BigInt::from(3u64), -BigInt::from(6u64));
        assert!(f.numerator().is_negative());
        assert!(!f.denominator().is_negative());
    }

    #[test]
    fn rem_euclid_is_nonnegative() {
        let v = -BigInt::from(3u64);
        let m = BigInt::from(256u64);
        assert_eq!(v.rem_euclid(&m), BigInt::from(253u64));
    }

    #[test]
    fn bigint_json_round_trip() {
        let v = BigInt::from_str_radix10("-98765432109876543210").unwrap();
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"-98765432109876543210\"");
        let back: BigInt = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);
    }

    #[test]
    fn fraction_json_round_trip() {
        let f = Fraction::new(BigInt::from(6u64), BigInt::from(4u64));
        let json = serde_json::to_string(&f).unwrap();
        let back: Fraction = serde_json::from_str(&json).unwrap();
        assert_eq!(f, back);
    }

    #[test]
    fn bytes_round_trip_for_all_endians_and_sizes() {
        for &endian in &[Endian::LE, Endian::BE] {
            for size in [1usize, 2, 4, 8] {
                let max = BigInt::from(1u64).shl((8 * size) as u32) - BigInt::from(1u64);
                let v = max.clone() - BigInt::from(1u64);
                let bytes = bigint_to_bytes(endian, size, v.clone());
                assert_eq!(bytes.len(), size);
                assert_eq!(bytes_to_bigint(endian, &bytes), v);
            }
        }
    }

    #[test]
    fn be_and_le_bytes_are_reverses() {
        let v = BigInt::from(0x1122_3344u64);
        let be = bigint_to_bytes(Endian::BE, 4, v.clone());
        let le = bigint_to_bytes(Endian::LE, 4, v);
        let mut le_rev = le.clone();
        le_rev.reverse();
        assert_eq!(be, le_rev);
    }
}
