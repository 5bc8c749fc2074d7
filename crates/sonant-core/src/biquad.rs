//! Biquad (bi-quadratic) filter design.
//!
//! Coefficient calculation uses the RBJ Audio EQ Cookbook formulas and
//! returns normalized [`Iir2Coefficients`] ready for the kernels in
//! [`crate::iir`].

use crate::iir::Iir2Coefficients;
use core::f32::consts::PI;
use libm::{cosf, sinf};

/// Calculates low-pass filter coefficients using the RBJ cookbook formula.
///
/// # Arguments
///
/// * `frequency` - Cutoff frequency in Hz
/// * `q` - Q factor (0.707 for Butterworth response)
/// * `sample_rate` - Sample rate in Hz
pub fn lowpass_coefficients(frequency: f32, q: f32, sample_rate: f32) -> Iir2Coefficients {
    let omega = 2.0 * PI * frequency / sample_rate;
    let cos_omega = cosf(omega);
    let sin_omega = sinf(omega);
    let alpha = sin_omega / (2.0 * q);

    let b0 = (1.0 - cos_omega) / 2.0;
    let b1 = 1.0 - cos_omega;
    let b2 = (1.0 - cos_omega) / 2.0;
    let a0 = 1.0 + alpha;
    let a1 = -2.0 * cos_omega;
    let a2 = 1.0 - alpha;

    Iir2Coefficients::normalized(b0, b1, b2, a0, a1, a2)
}

/// Calculates band-pass filter coefficients using the RBJ cookbook formula.
///
/// This version has constant 0dB peak gain, so a cascade of sections keeps
/// unity gain at the center frequency.
///
/// # Arguments
///
/// * `frequency` - Center frequency in Hz
/// * `bandwidth` - Bandwidth in Hz (Q = frequency / bandwidth)
/// * `sample_rate` - Sample rate in Hz
pub fn bandpass_coefficients(frequency: f32, bandwidth: f32, sample_rate: f32) -> Iir2Coefficients {
    let nyquist = sample_rate * 0.5;
    let frequency = frequency.clamp(1.0, nyquist * 0.999);
    let q = frequency / bandwidth.max(1e-3);
    let omega = 2.0 * PI * frequency / sample_rate;
    let cos_omega = cosf(omega);
    let sin_omega = sinf(omega);
    let alpha = sin_omega / (2.0 * q);

    let b0 = alpha;
    let b1 = 0.0;
    let b2 = -alpha;
    let a0 = 1.0 + alpha;
    let a1 = -2.0 * cos_omega;
    let a2 = 1.0 - alpha;

    Iir2Coefficients::normalized(b0, b1, b2, a0, a1, a2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iir::{Iir2DirectIState, Iir2Unrolled, iir2_direct_i, iir2_direct_i_in_place};
    use alloc::vec;

    fn filter_in_place(coefficients: Iir2Coefficients, data: &mut [f32]) {
        let unrolled = Iir2Unrolled::new(coefficients);
        iir2_direct_i_in_place(&unrolled, &mut Iir2DirectIState::default(), data);
    }

    #[test]
    fn test_identity_passthrough() {
        let unrolled = Iir2Unrolled::new(Iir2Coefficients::IDENTITY);
        let input: [f32; 10] = core::array::from_fn(|i| i as f32 * 0.1);
        let mut output = [0.0; 10];
        iir2_direct_i(&unrolled, &mut Iir2DirectIState::default(), &input, &mut output);
        for (i, o) in input.iter().zip(&output) {
            assert!((o - i).abs() < 0.0001);
        }
    }

    #[test]
    fn test_lowpass_dc_pass() {
        let mut data = vec![1.0; 1000];
        filter_in_place(lowpass_coefficients(1000.0, 0.707, 44100.0), &mut data);
        // DC should pass through a low-pass filter with near-unity gain
        assert!((data[999] - 1.0).abs() < 0.05);
    }

    #[test]
    fn test_bandpass_blocks_dc() {
        let mut data = vec![1.0; 4000];
        filter_in_place(bandpass_coefficients(1000.0, 200.0, 44100.0), &mut data);
        assert!(data[3999].abs() < 0.01);
    }

    #[test]
    fn test_bandpass_unity_at_center() {
        let sr = 48000.0;
        let f = 2000.0;
        let mut data: vec::Vec<f32> = (0..9600)
            .map(|n| libm::sinf(2.0 * PI * f * n as f32 / sr))
            .collect();
        filter_in_place(bandpass_coefficients(f, 400.0, sr), &mut data);
        let peak = crate::vector::max_abs(&data[4800..]);
        assert!((peak - 1.0).abs() < 0.05, "peak {peak}");
    }

    #[test]
    fn test_bandpass_center_is_clamped_below_nyquist() {
        let c = bandpass_coefficients(30000.0, 100.0, 48000.0);
        assert!(c.b0.is_finite() && c.a1.is_finite() && c.a2.is_finite());
    }
}
