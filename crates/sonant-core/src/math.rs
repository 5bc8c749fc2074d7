//! Mathematical utility functions for DSP.
//!
//! Provides level conversions, stereo panning, interpolation and the soft
//! limiter curve. All functions are allocation-free and suitable for `no_std`.
//!
//! # Level Conversions
//!
//! - [`db_to_linear`] / [`linear_to_db`] - Convert between dB and linear gain
//! - [`DECIBEL_FLOOR`] / [`LINEAR_FLOOR`] - Smallest magnitude treated as non-silent
//!
//! # Utilities
//!
//! - [`lerp`] - Linear interpolation
//! - [`pan_split`] - Loudness and stereo position to left/right gains
//! - [`soft_limit`] - Arctangent knee above full scale
//! - [`flush_denormal`] - Denormal protection for filter state

use libm::{atanf, expf, logf};

/// Decibel floor used when a quantity must stay strictly non-zero (for
/// example the endpoints of a geometric ramp).
pub const DECIBEL_FLOOR: f32 = -140.0;

/// [`DECIBEL_FLOOR`] as a linear magnitude (`10^(-140/20)`).
pub const LINEAR_FLOOR: f32 = 1e-7;

/// Convert decibels to linear gain.
///
/// # Example
/// ```rust
/// use sonant_core::db_to_linear;
///
/// assert!((db_to_linear(0.0) - 1.0).abs() < 0.001);
/// assert!((db_to_linear(-6.02) - 0.5).abs() < 0.01);
/// ```
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    // 10^(dB/20) = e^(dB * ln(10)/20)
    const FACTOR: f32 = core::f32::consts::LN_10 / 20.0;
    expf(db * FACTOR)
}

/// Convert linear gain to decibels.
///
/// Magnitudes below [`LINEAR_FLOOR`] report [`DECIBEL_FLOOR`].
///
/// # Example
/// ```rust
/// use sonant_core::linear_to_db;
///
/// assert!((linear_to_db(1.0) - 0.0).abs() < 0.001);
/// assert!((linear_to_db(0.5) - (-6.02)).abs() < 0.01);
/// ```
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    // 20 * log10(linear) = 20 * ln(linear) / ln(10)
    const FACTOR: f32 = 20.0 / core::f32::consts::LN_10;
    logf(linear.abs().max(LINEAR_FLOOR)) * FACTOR
}

/// Linear interpolation between `a` and `b`.
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Split a loudness into left/right gains.
///
/// `position` runs from -1 (hard left) to +1 (hard right); 0 gives each side
/// half the loudness.
///
/// ```rust
/// use sonant_core::pan_split;
///
/// assert_eq!(pan_split(1.0, 0.0), (0.5, 0.5));
/// assert_eq!(pan_split(1.0, 1.0), (0.0, 1.0));
/// ```
#[inline]
pub fn pan_split(loudness: f32, position: f32) -> (f32, f32) {
    let position = position.clamp(-1.0, 1.0);
    (
        loudness * (1.0 - position) * 0.5,
        loudness * (1.0 + position) * 0.5,
    )
}

/// Soft limiter with an arctangent knee above full scale.
///
/// Samples within ±1 pass untouched. Beyond that the curve leaves full scale
/// with unit slope and approaches `1 + excess` asymptotically. An `excess`
/// of zero or less hard-clips at ±1.
///
/// ```rust
/// use sonant_core::soft_limit;
///
/// assert_eq!(soft_limit(0.5, 0.25), 0.5);
/// assert!(soft_limit(10.0, 0.25) < 1.25);
/// assert_eq!(soft_limit(-3.0, 0.0), -1.0);
/// ```
#[inline]
pub fn soft_limit(x: f32, excess: f32) -> f32 {
    let magnitude = x.abs();
    if magnitude <= 1.0 {
        return x;
    }
    let limited = if excess <= 0.0 {
        1.0
    } else {
        let over = magnitude - 1.0;
        1.0 + excess * core::f32::consts::FRAC_2_PI
            * atanf(over * core::f32::consts::FRAC_PI_2 / excess)
    };
    if x < 0.0 { -limited } else { limited }
}

/// Flush denormal values to zero.
///
/// Denormalized floats can cause massive CPU slowdowns on x86.
/// This function returns 0.0 for values below 1e-20.
#[inline]
pub fn flush_denormal(x: f32) -> f32 {
    if x.abs() < 1e-20 { 0.0 } else { x }
}
