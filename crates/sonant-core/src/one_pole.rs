//! One-pole lowpass design for power detectors and control smoothing.
//!
//! A single-pole IIR lowpass with the difference equation:
//!
//! ```text
//! y[n] = (1 - coeff) * x[n] + coeff * y[n-1]
//! ```
//!
//! where `coeff = exp(-2π * freq / sample_rate)`. Expressed as
//! [`Iir1Coefficients`] this is `b0 = 1 - coeff`, `a1 = -coeff`, so blocks run
//! through [`crate::iir::iir1_all_pole`].
//!
//! # Usage
//!
//! ```rust
//! use sonant_core::iir::iir1_all_pole_in_place;
//! use sonant_core::one_pole_lowpass;
//!
//! let coefficients = one_pole_lowpass(4000.0, 48000.0);
//! let mut y1 = 0.0;
//! let mut block = [1.0f32; 4];
//! iir1_all_pole_in_place(coefficients, &mut y1, &mut block);
//! assert!(block[0] < 1.0); // attenuated on the first sample
//! ```
//!
//! # Reference
//!
//! Julius O. Smith III, "Introduction to Digital Filters with Audio Applications",
//! Section: One-Pole Filter.

use crate::iir::Iir1Coefficients;
use libm::expf;

/// Coefficients of a one-pole lowpass with a -3 dB point near `freq_hz`.
///
/// The cutoff is clamped to `[0, sample_rate / 2]`.
pub fn one_pole_lowpass(freq_hz: f32, sample_rate: f32) -> Iir1Coefficients {
    let freq = freq_hz.clamp(0.0, sample_rate * 0.5);
    let coeff = expf(-core::f32::consts::TAU * freq / sample_rate);
    Iir1Coefficients {
        b0: 1.0 - coeff,
        a1: -coeff,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iir::{iir1_all_pole, iir1_all_pole_in_place};
    use alloc::vec;

    #[test]
    fn passes_dc() {
        let mut y1 = 0.0;
        let mut data = vec![1.0; 48000];
        iir1_all_pole_in_place(one_pole_lowpass(1000.0, 48000.0), &mut y1, &mut data);
        let out = data[47999];
        assert!((out - 1.0).abs() < 1e-4, "DC should pass through, got {out}");
    }

    #[test]
    fn attenuates_high_freq() {
        let mut y1 = 0.0;
        let input: vec::Vec<f32> = (0..4800).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let mut output = vec![0.0; 4800];
        iir1_all_pole(one_pole_lowpass(100.0, 48000.0), &mut y1, &input, &mut output);
        let avg = output.iter().map(|s| s.abs()).sum::<f32>() / 4800.0;
        assert!(avg < 0.05, "Nyquist signal should be heavily attenuated, avg = {avg}");
    }

    #[test]
    fn coefficient_at_nyquist_is_nearly_transparent() {
        let c = one_pole_lowpass(96000.0, 48000.0);
        assert!(c.b0 > 0.95);
        assert!(c.a1 > -0.05 && c.a1 <= 0.0);
    }
}
