//! Block IIR kernels with explicit history state.
//!
//! All kernels carry their history across calls in a small state struct, and
//! come in an "overwrite" flavour and a multiply-accumulate flavour
//! (`output[i] += gain * y[i]`) used when several filters sum into one bus.
//!
//! | Kernel | Structure | History |
//! |--------|-----------|---------|
//! | [`iir2_direct_i`] | `y = b0 x + b1 x1 + b2 x2 - a1 y1 - a2 y2` | `x1 x2 y1 y2` |
//! | [`iir2_direct_ii`] | `w = x - a1 w1 - a2 w2; y = b0 w + b1 w1 + b2 w2` | `w1 w2` |
//! | [`iir1_all_pole`] | `y = b0 x - a1 y1` | `y1` |
//!
//! # Four-wide direct form I
//!
//! The direct-I kernel splits into a feed-forward FIR part, which has no
//! recurrence, and the all-pole feedback. For four outputs at once the
//! feedback is rewritten in closed form:
//!
//! ```text
//! y[k] = sum_{j<=k} h[k-j] v[j] + c[k] y[-1] + d[k] y[-2]      k = 0..3
//! ```
//!
//! where `v` is the FIR output, `h` is the all-pole impulse response and
//! `c`, `d` the responses to the two history taps. [`Iir2Unrolled`] holds these
//! precomputed constants. The result is algebraically identical to four
//! sequential applications of the scalar recurrence; only floating-point
//! rounding differs.

/// Second-order section coefficients, normalized so `a0 == 1`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Iir2Coefficients {
    /// Feed-forward tap 0.
    pub b0: f32,
    /// Feed-forward tap 1.
    pub b1: f32,
    /// Feed-forward tap 2.
    pub b2: f32,
    /// Feedback tap 1 (subtracted).
    pub a1: f32,
    /// Feedback tap 2 (subtracted).
    pub a2: f32,
}

impl Iir2Coefficients {
    /// Passes the input through unchanged.
    pub const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// Builds coefficients from an un-normalized `(b0, b1, b2, a0, a1, a2)` set.
    pub fn normalized(b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) -> Self {
        let a0_inv = 1.0 / a0;
        Self {
            b0: b0 * a0_inv,
            b1: b1 * a0_inv,
            b2: b2 * a0_inv,
            a1: a1 * a0_inv,
            a2: a2 * a0_inv,
        }
    }

    /// Same section with every feed-forward tap multiplied by `gain`.
    #[must_use]
    pub fn with_gain(self, gain: f32) -> Self {
        Self {
            b0: self.b0 * gain,
            b1: self.b1 * gain,
            b2: self.b2 * gain,
            ..self
        }
    }
}

impl Default for Iir2Coefficients {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// History for [`iir2_direct_i`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Iir2DirectIState {
    /// x[n-1]
    pub x1: f32,
    /// x[n-2]
    pub x2: f32,
    /// y[n-1]
    pub y1: f32,
    /// y[n-2]
    pub y2: f32,
}

impl Iir2DirectIState {
    /// Clears the history.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// History for [`iir2_direct_ii`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Iir2DirectIIState {
    /// w[n-1]
    pub w1: f32,
    /// w[n-2]
    pub w2: f32,
}

impl Iir2DirectIIState {
    /// Clears the history.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// First-order all-pole coefficients: `y = b0 x - a1 y1`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Iir1Coefficients {
    /// Input gain.
    pub b0: f32,
    /// Feedback tap (subtracted).
    pub a1: f32,
}

/// Closed-form constants for the four-wide direct-I feedback.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Iir2Unrolled {
    coefficients: Iir2Coefficients,
    /// All-pole impulse response h[1..=3] (h[0] = 1).
    h: [f32; 4],
    /// Weight of y[-1] in y[0..4].
    c: [f32; 4],
    /// Weight of y[-2] in y[0..4].
    d: [f32; 4],
}

impl Iir2Unrolled {
    /// Precomputes the closed form for `coefficients`.
    pub fn new(coefficients: Iir2Coefficients) -> Self {
        let p = -(coefficients.a1 as f64);
        let q = -(coefficients.a2 as f64);

        let mut h = [1.0f64; 5];
        h[1] = p;
        for k in 2..5 {
            h[k] = p * h[k - 1] + q * h[k - 2];
        }
        // c[k] = h[k+1], d[k] = q h[k]
        let c = [h[1], h[2], h[3], h[4]];
        let d = [q * h[0], q * h[1], q * h[2], q * h[3]];

        Self {
            coefficients,
            h: [h[0] as f32, h[1] as f32, h[2] as f32, h[3] as f32],
            c: c.map(|v| v as f32),
            d: d.map(|v| v as f32),
        }
    }

    /// The section these constants were built from.
    pub fn coefficients(&self) -> Iir2Coefficients {
        self.coefficients
    }
}

#[inline(always)]
fn direct_i_step(c: &Iir2Coefficients, s: &mut Iir2DirectIState, x: f32) -> f32 {
    let y = c.b0 * x + c.b1 * s.x1 + c.b2 * s.x2 - c.a1 * s.y1 - c.a2 * s.y2;
    s.x2 = s.x1;
    s.x1 = x;
    s.y2 = s.y1;
    s.y1 = y;
    y
}

#[inline(always)]
fn direct_i_block4(u: &Iir2Unrolled, s: &mut Iir2DirectIState, x: [f32; 4]) -> [f32; 4] {
    let c = &u.coefficients;
    let v = [
        c.b0 * x[0] + c.b1 * s.x1 + c.b2 * s.x2,
        c.b0 * x[1] + c.b1 * x[0] + c.b2 * s.x1,
        c.b0 * x[2] + c.b1 * x[1] + c.b2 * x[0],
        c.b0 * x[3] + c.b1 * x[2] + c.b2 * x[1],
    ];
    let h = &u.h;
    let y = [
        v[0] + u.c[0] * s.y1 + u.d[0] * s.y2,
        v[1] + h[1] * v[0] + u.c[1] * s.y1 + u.d[1] * s.y2,
        v[2] + h[1] * v[1] + h[2] * v[0] + u.c[2] * s.y1 + u.d[2] * s.y2,
        v[3] + h[1] * v[2] + h[2] * v[1] + h[3] * v[0] + u.c[3] * s.y1 + u.d[3] * s.y2,
    ];
    s.x2 = x[2];
    s.x1 = x[3];
    s.y2 = y[2];
    s.y1 = y[3];
    y
}

/// Direct form I, overwriting `output`.
pub fn iir2_direct_i(
    unrolled: &Iir2Unrolled,
    state: &mut Iir2DirectIState,
    input: &[f32],
    output: &mut [f32],
) {
    debug_assert_eq!(input.len(), output.len());
    let mut src = input.chunks_exact(4);
    let mut dst = output.chunks_exact_mut(4);
    for (x, y) in (&mut src).zip(&mut dst) {
        let r = direct_i_block4(unrolled, state, [x[0], x[1], x[2], x[3]]);
        y.copy_from_slice(&r);
    }
    let c = unrolled.coefficients;
    for (x, y) in src.remainder().iter().zip(dst.into_remainder()) {
        *y = direct_i_step(&c, state, *x);
    }
}

/// Direct form I, `output[i] += gain * y[i]`.
pub fn iir2_direct_i_macc(
    unrolled: &Iir2Unrolled,
    state: &mut Iir2DirectIState,
    input: &[f32],
    output: &mut [f32],
    gain: f32,
) {
    debug_assert_eq!(input.len(), output.len());
    let mut src = input.chunks_exact(4);
    let mut dst = output.chunks_exact_mut(4);
    for (x, y) in (&mut src).zip(&mut dst) {
        let r = direct_i_block4(unrolled, state, [x[0], x[1], x[2], x[3]]);
        y[0] += gain * r[0];
        y[1] += gain * r[1];
        y[2] += gain * r[2];
        y[3] += gain * r[3];
    }
    let c = unrolled.coefficients;
    for (x, y) in src.remainder().iter().zip(dst.into_remainder()) {
        *y += gain * direct_i_step(&c, state, *x);
    }
}

/// Direct form I applied in place.
pub fn iir2_direct_i_in_place(
    unrolled: &Iir2Unrolled,
    state: &mut Iir2DirectIState,
    data: &mut [f32],
) {
    let mut chunks = data.chunks_exact_mut(4);
    for x in &mut chunks {
        let r = direct_i_block4(unrolled, state, [x[0], x[1], x[2], x[3]]);
        x.copy_from_slice(&r);
    }
    let c = unrolled.coefficients;
    for x in chunks.into_remainder() {
        *x = direct_i_step(&c, state, *x);
    }
}

/// Sample-by-sample direct form I. Reference for the unrolled kernels.
pub fn iir2_direct_i_scalar(
    coefficients: &Iir2Coefficients,
    state: &mut Iir2DirectIState,
    input: &[f32],
    output: &mut [f32],
) {
    debug_assert_eq!(input.len(), output.len());
    for (x, y) in input.iter().zip(output.iter_mut()) {
        *y = direct_i_step(coefficients, state, *x);
    }
}

#[inline(always)]
fn direct_ii_step(c: &Iir2Coefficients, s: &mut Iir2DirectIIState, x: f32) -> f32 {
    let w = x - c.a1 * s.w1 - c.a2 * s.w2;
    let y = c.b0 * w + c.b1 * s.w1 + c.b2 * s.w2;
    s.w2 = s.w1;
    s.w1 = w;
    y
}

/// Direct form II, overwriting `output`.
pub fn iir2_direct_ii(
    coefficients: &Iir2Coefficients,
    state: &mut Iir2DirectIIState,
    input: &[f32],
    output: &mut [f32],
) {
    debug_assert_eq!(input.len(), output.len());
    for (x, y) in input.iter().zip(output.iter_mut()) {
        *y = direct_ii_step(coefficients, state, *x);
    }
}

/// Direct form II, `output[i] += gain * y[i]`.
pub fn iir2_direct_ii_macc(
    coefficients: &Iir2Coefficients,
    state: &mut Iir2DirectIIState,
    input: &[f32],
    output: &mut [f32],
    gain: f32,
) {
    debug_assert_eq!(input.len(), output.len());
    for (x, y) in input.iter().zip(output.iter_mut()) {
        *y += gain * direct_ii_step(coefficients, state, *x);
    }
}

/// Direct form II applied in place.
pub fn iir2_direct_ii_in_place(
    coefficients: &Iir2Coefficients,
    state: &mut Iir2DirectIIState,
    data: &mut [f32],
) {
    for x in data.iter_mut() {
        *x = direct_ii_step(coefficients, state, *x);
    }
}

/// First-order all-pole, overwriting `output`. `y1` is the history.
pub fn iir1_all_pole(
    coefficients: Iir1Coefficients,
    y1: &mut f32,
    input: &[f32],
    output: &mut [f32],
) {
    debug_assert_eq!(input.len(), output.len());
    let mut y = *y1;
    for (x, out) in input.iter().zip(output.iter_mut()) {
        y = coefficients.b0 * *x - coefficients.a1 * y;
        *out = y;
    }
    *y1 = crate::math::flush_denormal(y);
}

/// First-order all-pole, `output[i] += gain * y[i]`.
pub fn iir1_all_pole_macc(
    coefficients: Iir1Coefficients,
    y1: &mut f32,
    input: &[f32],
    output: &mut [f32],
    gain: f32,
) {
    debug_assert_eq!(input.len(), output.len());
    let mut y = *y1;
    for (x, out) in input.iter().zip(output.iter_mut()) {
        y = coefficients.b0 * *x - coefficients.a1 * y;
        *out += gain * y;
    }
    *y1 = crate::math::flush_denormal(y);
}

/// First-order all-pole applied in place.
pub fn iir1_all_pole_in_place(coefficients: Iir1Coefficients, y1: &mut f32, data: &mut [f32]) {
    let mut y = *y1;
    for x in data.iter_mut() {
        y = coefficients.b0 * *x - coefficients.a1 * y;
        *x = y;
    }
    *y1 = crate::math::flush_denormal(y);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biquad::lowpass_coefficients;
    use alloc::vec;
    use alloc::vec::Vec;

    fn test_signal(n: usize) -> Vec<f32> {
        (0..n).map(|i| libm::sinf(i as f32 * 0.37) * 0.8).collect()
    }

    #[test]
    fn identity_passes_through() {
        let u = Iir2Unrolled::new(Iir2Coefficients::IDENTITY);
        let mut s = Iir2DirectIState::default();
        let input = test_signal(10);
        let mut out = vec![0.0; 10];
        iir2_direct_i(&u, &mut s, &input, &mut out);
        assert_eq!(input, out);
    }

    #[test]
    fn unrolled_matches_scalar_across_calls() {
        let c = lowpass_coefficients(1200.0, 0.9, 48000.0);
        let u = Iir2Unrolled::new(c);
        let input = test_signal(103);
        let mut s_fast = Iir2DirectIState::default();
        let mut s_ref = Iir2DirectIState::default();
        let mut fast = vec![0.0; 103];
        let mut reference = vec![0.0; 103];
        // odd split exercises the scalar tail and history hand-off
        iir2_direct_i(&u, &mut s_fast, &input[..37], &mut fast[..37]);
        iir2_direct_i(&u, &mut s_fast, &input[37..], &mut fast[37..]);
        iir2_direct_i_scalar(&c, &mut s_ref, &input, &mut reference);
        for (a, b) in fast.iter().zip(&reference) {
            assert!((a - b).abs() < 1e-5, "{a} vs {b}");
        }
    }

    #[test]
    fn macc_adds_scaled_output() {
        let c = lowpass_coefficients(800.0, 0.707, 48000.0);
        let u = Iir2Unrolled::new(c);
        let input = test_signal(16);
        let mut plain = vec![0.0; 16];
        iir2_direct_i(&u, &mut Iir2DirectIState::default(), &input, &mut plain);
        let mut acc = vec![1.0; 16];
        iir2_direct_i_macc(&u, &mut Iir2DirectIState::default(), &input, &mut acc, 0.5);
        for (p, a) in plain.iter().zip(&acc) {
            assert!((1.0 + 0.5 * p - a).abs() < 1e-6);
        }
    }

    #[test]
    fn direct_ii_matches_direct_i() {
        let c = lowpass_coefficients(2000.0, 1.2, 44100.0);
        let input = test_signal(64);
        let mut a = vec![0.0; 64];
        let mut b = input.clone();
        iir2_direct_i_scalar(&c, &mut Iir2DirectIState::default(), &input, &mut a);
        iir2_direct_ii_in_place(&c, &mut Iir2DirectIIState::default(), &mut b);
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn all_pole_impulse_response() {
        let c = Iir1Coefficients { b0: 0.5, a1: -0.5 };
        let mut y1 = 0.0;
        let mut out = [0.0; 4];
        iir1_all_pole(c, &mut y1, &[1.0, 0.0, 0.0, 0.0], &mut out);
        assert_eq!(out, [0.5, 0.25, 0.125, 0.0625]);
        assert_eq!(y1, 0.0625);
    }

    #[test]
    fn all_pole_macc_and_in_place_agree() {
        let c = Iir1Coefficients { b0: 0.2, a1: -0.8 };
        let input = test_signal(20);
        let mut in_place = input.clone();
        iir1_all_pole_in_place(c, &mut 0.0, &mut in_place);
        let mut acc = vec![0.0; 20];
        iir1_all_pole_macc(c, &mut 0.0, &input, &mut acc, 1.0);
        assert_eq!(in_place, acc);
    }
}
