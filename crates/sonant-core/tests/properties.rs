//! Property-based tests for sonant-core numeric primitives.
//!
//! Tests recurrence endpoints, fixed-point phase wraparound and the
//! equivalence of the four-wide direct-I kernel with the scalar recurrence,
//! using proptest for randomized input generation.

use proptest::prelude::*;
use sonant_core::iir::{iir2_direct_i, iir2_direct_i_scalar};
use sonant_core::vector::{additive_recurrence, multiplicative_recurrence};
use sonant_core::{
    Fixed64, Iir2Coefficients, Iir2DirectIState, Iir2Unrolled, bandpass_coefficients,
    lowpass_coefficients,
};

/// Straight-line scalar recurrence in f64, independent of the crate kernels.
fn naive_direct_i(c: &Iir2Coefficients, input: &[f32]) -> Vec<f64> {
    let (b0, b1, b2, a1, a2) = (
        f64::from(c.b0),
        f64::from(c.b1),
        f64::from(c.b2),
        f64::from(c.a1),
        f64::from(c.a2),
    );
    let (mut x1, mut x2, mut y1, mut y2) = (0.0, 0.0, 0.0, 0.0);
    input
        .iter()
        .map(|&x| {
            let x = f64::from(x);
            let y = b0 * x + b1 * x1 + b2 * x2 - a1 * y1 - a2 * y2;
            x2 = x1;
            x1 = x;
            y2 = y1;
            y1 = y;
            y
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// The additive ramp ends exactly on the final value and never
    /// overshoots in either direction.
    #[test]
    fn additive_recurrence_endpoints_and_monotonic(
        initial in -10.0f32..10.0,
        final_value in -10.0f32..10.0,
        len in 1usize..300,
    ) {
        let mut ramp = vec![0.0f32; len];
        additive_recurrence(&mut ramp, initial, final_value);
        prop_assert_eq!(ramp[len - 1], final_value);
        let rising = final_value >= initial;
        let mut prev = initial;
        for &v in &ramp {
            if rising {
                prop_assert!(v >= prev, "{} after {} in rising ramp", v, prev);
            } else {
                prop_assert!(v <= prev, "{} after {} in falling ramp", v, prev);
            }
            prev = v;
        }
    }

    /// The geometric ramp ends exactly on the final value, keeps the sign
    /// of its endpoints, and is monotonic in log space.
    #[test]
    fn multiplicative_recurrence_endpoints_and_sign(
        initial in 1e-3f32..10.0,
        final_value in 1e-3f32..10.0,
        negative in any::<bool>(),
        len in 1usize..300,
    ) {
        let sign = if negative { -1.0 } else { 1.0 };
        let (initial, final_value) = (initial * sign, final_value * sign);
        let mut ramp = vec![0.0f32; len];
        multiplicative_recurrence(&mut ramp, initial, final_value);
        prop_assert_eq!(ramp[len - 1], final_value);
        let rising = final_value.abs() >= initial.abs();
        let tolerance = 1e-5;
        let mut prev = initial.abs().ln();
        for &v in &ramp {
            prop_assert_eq!(v < 0.0, negative);
            let l = v.abs().ln();
            if rising {
                prop_assert!(l >= prev - tolerance);
            } else {
                prop_assert!(l <= prev + tolerance);
            }
            prev = l;
        }
    }

    /// Ten thousand additions of a positive differential agree with f64
    /// modulo arithmetic on the fraction to within one fractional ULP.
    #[test]
    fn fixed64_wraparound_matches_float_modulo(
        start in 0.0f64..1.0,
        delta in 1e-4f64..3.0,
    ) {
        let d = Fixed64::from_f64(delta);
        let mut phase = Fixed64::from_f64(start);
        let exact_start = phase.raw() as f64 / 4_294_967_296.0;
        let exact_delta = d.raw() as f64 / 4_294_967_296.0;
        for n in 1..=10_000u32 {
            phase = (phase + d).wrapped();
            let expected = (exact_start + f64::from(n) * exact_delta).rem_euclid(1.0);
            let err = (phase.frac_f64() - expected).abs();
            let err = err.min(1.0 - err);
            prop_assert!(err <= 1.0 / 4_294_967_296.0 * 2.0 + 1e-12,
                "step {}: fraction {} expected {}", n, phase.frac_f64(), expected);
        }
    }

    /// Negative fixed-point values keep a non-negative fraction.
    #[test]
    fn fixed64_fraction_is_floor_based(value in -1000.0f64..1000.0) {
        let f = Fixed64::from_f64(value);
        prop_assert_eq!(f.int(), value.floor() as i32);
        prop_assert!((f.to_f64() - value).abs() < 1e-9);
        prop_assert!(f.frac_f32() < 1.0);
    }

    /// The four-wide closed-form direct-I kernel agrees with a naive f64
    /// scalar recurrence for every sample.
    #[test]
    fn direct_i_unrolled_matches_naive(
        freq in 100.0f32..15000.0,
        q in 0.3f32..4.0,
        bandpass in any::<bool>(),
        input in prop::collection::vec(-1.0f32..=1.0, 64..256),
    ) {
        let c = if bandpass {
            bandpass_coefficients(freq, freq / q, 48000.0)
        } else {
            lowpass_coefficients(freq, q, 48000.0)
        };
        let unrolled = Iir2Unrolled::new(c);
        let mut state = Iir2DirectIState::default();
        let mut fast = vec![0.0f32; input.len()];
        iir2_direct_i(&unrolled, &mut state, &input, &mut fast);

        let reference = naive_direct_i(&c, &input);
        let scale = reference.iter().fold(1e-3f64, |m, v| m.max(v.abs()));
        for (i, (&f, &r)) in fast.iter().zip(&reference).enumerate() {
            let err = (f64::from(f) - r).abs() / scale;
            prop_assert!(err < 1e-4, "sample {}: {} vs {} (rel {})", i, f, r, err);
        }
    }

    /// Splitting a block at any point leaves the output unchanged.
    #[test]
    fn direct_i_state_carries_across_calls(
        split in 0usize..64,
        input in prop::collection::vec(-1.0f32..=1.0, 64),
    ) {
        let c = lowpass_coefficients(2000.0, 0.707, 48000.0);
        let unrolled = Iir2Unrolled::new(c);

        let mut whole_state = Iir2DirectIState::default();
        let mut whole = vec![0.0f32; 64];
        iir2_direct_i(&unrolled, &mut whole_state, &input, &mut whole);

        let mut state = Iir2DirectIState::default();
        let mut parts = vec![0.0f32; 64];
        let (a, b) = parts.split_at_mut(split);
        iir2_direct_i(&unrolled, &mut state, &input[..split], a);
        iir2_direct_i(&unrolled, &mut state, &input[split..], b);

        let mut scalar_state = Iir2DirectIState::default();
        let mut scalar = vec![0.0f32; 64];
        iir2_direct_i_scalar(&c, &mut scalar_state, &input, &mut scalar);

        for i in 0..64 {
            prop_assert!((whole[i] - parts[i]).abs() < 1e-5);
            prop_assert!((whole[i] - scalar[i]).abs() < 1e-5);
        }
    }
}
