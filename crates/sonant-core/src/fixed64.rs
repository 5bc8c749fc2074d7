//! 64-bit fixed-point phase accumulator.
//!
//! Wavetable and sample positions are tracked as a signed 32-bit integer part
//! plus an unsigned 32-bit fraction packed into one `i64`:
//!
//! ```text
//!  63                32 31                 0
//! +--------------------+--------------------+
//! |  integer (signed)  |  fraction / 2^32   |
//! +--------------------+--------------------+
//! ```
//!
//! Addition is plain two's-complement addition of the raw value, so phase
//! accumulation never drifts the way repeated `f32` additions do. Wrapping a
//! table phase is a truncation of the integer part.
//!
//! ```rust
//! use sonant_core::Fixed64;
//!
//! let mut phase = Fixed64::ZERO;
//! let delta = Fixed64::from_f64(0.75);
//! phase += delta;
//! phase += delta;
//! assert_eq!(phase.int(), 1);
//! assert!((phase.frac_f64() - 0.5).abs() < 1e-9);
//! ```

use core::ops::{Add, AddAssign, Neg, Sub, SubAssign};

const FRAC_BITS: u32 = 32;
const FRAC_SCALE: f64 = 4_294_967_296.0;
const FRAC_MASK: i64 = 0xFFFF_FFFF;

/// Signed 32.32 fixed-point value.
///
/// The fractional part is always interpreted as `frac / 2^32` and is never
/// negative; a value of `-0.25` is stored as integer `-1`, fraction `0.75`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fixed64(i64);

impl Fixed64 {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// One whole unit.
    pub const ONE: Self = Self(1 << FRAC_BITS);

    /// Builds a value from its raw `i64` representation.
    #[inline]
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Builds a value from integer and fraction parts.
    #[inline]
    pub const fn from_parts(int: i32, frac: u32) -> Self {
        Self(((int as i64) << FRAC_BITS) | frac as i64)
    }

    /// Builds a value from an integer.
    #[inline]
    pub const fn from_int(int: i32) -> Self {
        Self((int as i64) << FRAC_BITS)
    }

    /// Converts a double, rounding toward negative infinity at 2^-32 resolution.
    #[inline]
    pub fn from_f64(value: f64) -> Self {
        Self(libm::floor(value * FRAC_SCALE) as i64)
    }

    /// Raw `i64` representation.
    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Signed integer part (floor of the value).
    #[inline]
    pub const fn int(self) -> i32 {
        (self.0 >> FRAC_BITS) as i32
    }

    /// Unsigned fraction in units of 2^-32.
    #[inline]
    pub const fn frac(self) -> u32 {
        (self.0 & FRAC_MASK) as u32
    }

    /// Fraction as `f32` in `[0, 1)`.
    ///
    /// Only the top 24 fraction bits are used so the result is exactly
    /// representable and can never round up to `1.0`.
    #[inline]
    pub fn frac_f32(self) -> f32 {
        (self.frac() >> 8) as f32 * (1.0 / 16_777_216.0)
    }

    /// Fraction as `f64` in `[0, 1)`.
    #[inline]
    pub fn frac_f64(self) -> f64 {
        self.frac() as f64 / FRAC_SCALE
    }

    /// Full value as `f64`.
    #[inline]
    pub fn to_f64(self) -> f64 {
        self.int() as f64 + self.frac_f64()
    }

    /// Drops the integer part, keeping the fraction (table phase wrap).
    #[inline]
    #[must_use]
    pub const fn wrapped(self) -> Self {
        Self(self.0 & FRAC_MASK)
    }

    /// Adds a whole number of units.
    #[inline]
    #[must_use]
    pub const fn add_int(self, int: i32) -> Self {
        Self(self.0.wrapping_add((int as i64) << FRAC_BITS))
    }

    /// Subtracts a whole number of units.
    #[inline]
    #[must_use]
    pub const fn sub_int(self, int: i32) -> Self {
        Self(self.0.wrapping_sub((int as i64) << FRAC_BITS))
    }

    /// Euclidean remainder against a positive span.
    #[inline]
    #[must_use]
    pub fn rem_euclid(self, span: Self) -> Self {
        debug_assert!(span.0 > 0, "span must be positive");
        Self(self.0.rem_euclid(span.0))
    }
}

impl Add for Fixed64 {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self(self.0.wrapping_add(rhs.0))
    }
}

impl AddAssign for Fixed64 {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.wrapping_add(rhs.0);
    }
}

impl Sub for Fixed64 {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self(self.0.wrapping_sub(rhs.0))
    }
}

impl SubAssign for Fixed64 {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        self.0 = self.0.wrapping_sub(rhs.0);
    }
}

impl Neg for Fixed64 {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self(self.0.wrapping_neg())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_values_keep_positive_fraction() {
        let v = Fixed64::from_f64(-0.25);
        assert_eq!(v.int(), -1);
        assert!((v.frac_f64() - 0.75).abs() < 1e-9);
        assert!((v.to_f64() + 0.25).abs() < 1e-9);
    }

    #[test]
    fn frac_f32_never_reaches_one() {
        let v = Fixed64::from_parts(3, u32::MAX);
        assert!(v.frac_f32() < 1.0);
        assert_eq!(v.int(), 3);
    }

    #[test]
    fn wrapped_drops_integer_part() {
        let v = Fixed64::from_f64(5.125);
        assert_eq!(v.wrapped().int(), 0);
        assert_eq!(v.wrapped().frac(), v.frac());
    }

    #[test]
    fn int_arithmetic() {
        let v = Fixed64::from_f64(2.5);
        assert_eq!(v.sub_int(3).int(), -1);
        assert_eq!(v.add_int(4).int(), 6);
        assert_eq!((-v).to_f64(), -2.5);
        assert_eq!((v - Fixed64::ONE).to_f64(), 1.5);
    }

    #[test]
    fn rem_euclid_folds_into_span() {
        let span = Fixed64::from_int(4);
        let v = Fixed64::from_f64(9.5).rem_euclid(span);
        assert_eq!(v.to_f64(), 1.5);
        let v = Fixed64::from_f64(-0.5).rem_euclid(span);
        assert_eq!(v.to_f64(), 3.5);
    }
}
