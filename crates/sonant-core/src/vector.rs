//! Elementwise kernels over `f32` blocks.
//!
//! Every kernel walks its slices in groups of four (`chunks_exact`) with a
//! scalar tail, a shape the compiler turns into SIMD on every target we care
//! about. Results are identical in ordering to a plain per-sample loop; only
//! the reductions ([`max_abs`], [`min_max`]) reassociate, and those are exact
//! for `max`/`min`.
//!
//! Where a kernel reads one slice and writes another, Rust's borrow rules
//! rule out aliasing; in-place variants (`*_in_place`) cover the
//! `source == target` case.
//!
//! # Recurrences
//!
//! [`additive_recurrence`] and [`multiplicative_recurrence`] expand a
//! block-rate parameter's previous and current values into a per-sample ramp.
//! The ramp starts one step after `initial` and lands exactly on `final_value`
//! at the last sample, so consecutive blocks join without a step.

use crate::math::LINEAR_FLOOR;
use libm::{exp, log, sqrtf};

/// Sets every element to zero.
#[inline]
pub fn zero(target: &mut [f32]) {
    target.fill(0.0);
}

/// Sets every element to `value`.
#[inline]
pub fn fill(target: &mut [f32], value: f32) {
    target.fill(value);
}

/// Copies `source` into `target`.
#[inline]
pub fn copy(source: &[f32], target: &mut [f32]) {
    debug_assert_eq!(source.len(), target.len());
    target.copy_from_slice(source);
}

/// `target[i] = source[i] * factor`.
pub fn scale(source: &[f32], target: &mut [f32], factor: f32) {
    debug_assert_eq!(source.len(), target.len());
    let mut src = source.chunks_exact(4);
    let mut dst = target.chunks_exact_mut(4);
    for (s, d) in (&mut src).zip(&mut dst) {
        d[0] = s[0] * factor;
        d[1] = s[1] * factor;
        d[2] = s[2] * factor;
        d[3] = s[3] * factor;
    }
    for (s, d) in src.remainder().iter().zip(dst.into_remainder()) {
        *d = *s * factor;
    }
}

/// `data[i] *= factor`.
pub fn scale_in_place(data: &mut [f32], factor: f32) {
    let mut chunks = data.chunks_exact_mut(4);
    for d in &mut chunks {
        d[0] *= factor;
        d[1] *= factor;
        d[2] *= factor;
        d[3] *= factor;
    }
    for d in chunks.into_remainder() {
        *d *= factor;
    }
}

/// `target[i] += source[i]`.
pub fn add_into(source: &[f32], target: &mut [f32]) {
    debug_assert_eq!(source.len(), target.len());
    let mut src = source.chunks_exact(4);
    let mut dst = target.chunks_exact_mut(4);
    for (s, d) in (&mut src).zip(&mut dst) {
        d[0] += s[0];
        d[1] += s[1];
        d[2] += s[2];
        d[3] += s[3];
    }
    for (s, d) in src.remainder().iter().zip(dst.into_remainder()) {
        *d += *s;
    }
}

/// `target[i] += source[i] * factor`.
pub fn scaled_add_into(source: &[f32], target: &mut [f32], factor: f32) {
    debug_assert_eq!(source.len(), target.len());
    let mut src = source.chunks_exact(4);
    let mut dst = target.chunks_exact_mut(4);
    for (s, d) in (&mut src).zip(&mut dst) {
        d[0] += s[0] * factor;
        d[1] += s[1] * factor;
        d[2] += s[2] * factor;
        d[3] += s[3] * factor;
    }
    for (s, d) in src.remainder().iter().zip(dst.into_remainder()) {
        *d += *s * factor;
    }
}

/// `target[i] += a[i] * b[i]`.
pub fn mul_add_into(a: &[f32], b: &[f32], target: &mut [f32]) {
    debug_assert_eq!(a.len(), target.len());
    debug_assert_eq!(b.len(), target.len());
    for ((t, x), y) in target.iter_mut().zip(a).zip(b) {
        *t += *x * *y;
    }
}

/// `target[i] = a[i] * b[i]`.
pub fn mul(a: &[f32], b: &[f32], target: &mut [f32]) {
    debug_assert_eq!(a.len(), target.len());
    debug_assert_eq!(b.len(), target.len());
    for ((t, x), y) in target.iter_mut().zip(a).zip(b) {
        *t = *x * *y;
    }
}

/// `data[i] = |data[i]|`.
pub fn abs_in_place(data: &mut [f32]) {
    for d in data.iter_mut() {
        *d = d.abs();
    }
}

/// `data[i] = data[i]^2`.
pub fn square_in_place(data: &mut [f32]) {
    for d in data.iter_mut() {
        *d *= *d;
    }
}

/// `data[i] = sqrt(data[i])`.
pub fn sqrt_in_place(data: &mut [f32]) {
    for d in data.iter_mut() {
        *d = sqrtf(*d);
    }
}

/// `target[i] = max(target[i], source[i])`.
pub fn max_elementwise(source: &[f32], target: &mut [f32]) {
    debug_assert_eq!(source.len(), target.len());
    for (t, s) in target.iter_mut().zip(source) {
        *t = t.max(*s);
    }
}

/// Largest absolute value, or `0.0` for an empty slice.
pub fn max_abs(data: &[f32]) -> f32 {
    let mut lanes = [0.0f32; 4];
    let mut chunks = data.chunks_exact(4);
    for c in &mut chunks {
        lanes[0] = lanes[0].max(c[0].abs());
        lanes[1] = lanes[1].max(c[1].abs());
        lanes[2] = lanes[2].max(c[2].abs());
        lanes[3] = lanes[3].max(c[3].abs());
    }
    let mut result = lanes[0].max(lanes[1]).max(lanes[2].max(lanes[3]));
    for v in chunks.remainder() {
        result = result.max(v.abs());
    }
    result
}

/// Smallest and largest value, or `None` for an empty slice.
pub fn min_max(data: &[f32]) -> Option<(f32, f32)> {
    let (&first, rest) = data.split_first()?;
    Some(
        rest.iter()
            .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
    )
}

/// Replaces NaN and infinite values with zero.
///
/// Returns how many values were replaced.
pub fn sanitize(data: &mut [f32]) -> usize {
    let mut replaced = 0;
    for d in data.iter_mut() {
        if !d.is_finite() {
            *d = 0.0;
            replaced += 1;
        }
    }
    replaced
}

/// Complex multiply of split real/imaginary arrays:
/// `(re, im) = (a_re + i a_im) * (b_re + i b_im)`.
pub fn complex_multiply(
    a_re: &[f32],
    a_im: &[f32],
    b_re: &[f32],
    b_im: &[f32],
    re: &mut [f32],
    im: &mut [f32],
) {
    let n = re.len();
    debug_assert!(a_re.len() == n && a_im.len() == n && b_re.len() == n && b_im.len() == n);
    debug_assert_eq!(im.len(), n);
    for i in 0..n {
        let (ar, ai, br, bi) = (a_re[i], a_im[i], b_re[i], b_im[i]);
        re[i] = ar * br - ai * bi;
        im[i] = ar * bi + ai * br;
    }
}

/// Linear ramp from just after `initial` to exactly `final_value`.
///
/// `target[i] = initial + (i + 1) * (final_value - initial) / n`, evaluated in
/// double precision so the ramp is monotonic, with the last element pinned to
/// `final_value`.
///
/// ```rust
/// use sonant_core::vector::additive_recurrence;
///
/// let mut ramp = [0.0f32; 4];
/// additive_recurrence(&mut ramp, 0.0, 1.0);
/// assert_eq!(ramp, [0.25, 0.5, 0.75, 1.0]);
/// ```
pub fn additive_recurrence(target: &mut [f32], initial: f32, final_value: f32) {
    let n = target.len();
    if n == 0 {
        return;
    }
    let start = initial as f64;
    let step = (final_value as f64 - start) / n as f64;
    for (i, t) in target.iter_mut().enumerate() {
        *t = (start + (i + 1) as f64 * step) as f32;
    }
    target[n - 1] = final_value;
}

/// True unless one value is strictly positive and the other strictly
/// negative.
#[inline]
pub fn same_sign_or_zero(a: f32, b: f32) -> bool {
    !(a < 0.0 && b > 0.0) && !(a > 0.0 && b < 0.0)
}

/// Geometric ramp from just after `initial` to exactly `final_value`.
///
/// The log-domain counterpart of [`additive_recurrence`], used while the
/// driving envelope segment is exponential. Both endpoints are pushed away
/// from zero to at least [`LINEAR_FLOOR`] in magnitude. The endpoints must
/// not have opposite signs; a zero endpoint takes the sign of the other, so
/// a fade to silence ends on the floor.
pub fn multiplicative_recurrence(target: &mut [f32], initial: f32, final_value: f32) {
    let n = target.len();
    if n == 0 {
        return;
    }
    debug_assert!(
        same_sign_or_zero(initial, final_value),
        "geometric ramp endpoints differ in sign: {initial} -> {final_value}"
    );
    let negative = initial < 0.0 || final_value < 0.0;
    let a = initial.abs().max(LINEAR_FLOOR) as f64;
    let b = final_value.abs().max(LINEAR_FLOOR);
    let log_a = log(a);
    let log_step = (log(b as f64) - log_a) / n as f64;
    for (i, t) in target.iter_mut().enumerate() {
        let magnitude = exp(log_a + (i + 1) as f64 * log_step) as f32;
        *t = if negative { -magnitude } else { magnitude };
    }
    target[n - 1] = if negative { -b } else { b };
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;

    #[test]
    fn scale_handles_tail() {
        let src: Vec<f32> = (0..7).map(|i| i as f32).collect();
        let mut dst = vec![0.0; 7];
        scale(&src, &mut dst, 2.0);
        assert_eq!(dst, [0.0, 2.0, 4.0, 6.0, 8.0, 10.0, 12.0]);
    }

    #[test]
    fn scaled_add_accumulates() {
        let src = [1.0, 2.0, 3.0, 4.0, 5.0];
        let mut dst = [1.0; 5];
        scaled_add_into(&src, &mut dst, 0.5);
        assert_eq!(dst, [1.5, 2.0, 2.5, 3.0, 3.5]);
    }

    #[test]
    fn add_and_mul_add() {
        let a = [1.0, 2.0, 3.0];
        let b = [2.0, 2.0, 2.0];
        let mut t = [1.0, 1.0, 1.0];
        add_into(&a, &mut t);
        assert_eq!(t, [2.0, 3.0, 4.0]);
        mul_add_into(&a, &b, &mut t);
        assert_eq!(t, [4.0, 7.0, 10.0]);
        mul(&a, &b, &mut t);
        assert_eq!(t, [2.0, 4.0, 6.0]);
    }

    #[test]
    fn abs_square_sqrt() {
        let mut d = [-2.0, 3.0, -4.0];
        abs_in_place(&mut d);
        assert_eq!(d, [2.0, 3.0, 4.0]);
        square_in_place(&mut d);
        assert_eq!(d, [4.0, 9.0, 16.0]);
        sqrt_in_place(&mut d);
        assert_eq!(d, [2.0, 3.0, 4.0]);
    }

    #[test]
    fn reductions() {
        let d = [0.5, -3.0, 2.0, 1.0, -0.25, 2.5];
        assert_eq!(max_abs(&d), 3.0);
        assert_eq!(min_max(&d), Some((-3.0, 2.5)));
        assert_eq!(min_max(&[]), None);
        assert_eq!(max_abs(&[]), 0.0);
    }

    #[test]
    fn max_elementwise_takes_larger() {
        let mut t = [1.0, 5.0, -1.0];
        max_elementwise(&[2.0, 4.0, 0.0], &mut t);
        assert_eq!(t, [2.0, 5.0, 0.0]);
    }

    #[test]
    fn sanitize_replaces_non_finite() {
        let mut d = [1.0, f32::NAN, f32::INFINITY, -2.0, f32::NEG_INFINITY];
        assert_eq!(sanitize(&mut d), 3);
        assert_eq!(d, [1.0, 0.0, 0.0, -2.0, 0.0]);
    }

    #[test]
    fn complex_multiply_matches_definition() {
        let mut re = [0.0; 2];
        let mut im = [0.0; 2];
        complex_multiply(&[1.0, 0.0], &[2.0, 1.0], &[3.0, 0.0], &[4.0, 1.0], &mut re, &mut im);
        // (1+2i)(3+4i) = -5+10i ; i*i = -1
        assert_eq!(re, [-5.0, -1.0]);
        assert_eq!(im, [10.0, 0.0]);
    }

    #[test]
    fn additive_recurrence_lands_on_final() {
        let mut ramp = [0.0f32; 7];
        additive_recurrence(&mut ramp, 0.3, -0.9);
        assert_eq!(ramp[6], -0.9);
        assert!(ramp.windows(2).all(|w| w[1] <= w[0]));
        assert!(ramp[0] < 0.3);
    }

    #[test]
    fn multiplicative_recurrence_is_geometric() {
        let mut ramp = [0.0f32; 4];
        multiplicative_recurrence(&mut ramp, 1.0, 16.0);
        let expected = [2.0, 4.0, 8.0, 16.0];
        for (got, want) in ramp.iter().zip(expected) {
            assert!((got - want).abs() < 1e-4, "{got} vs {want}");
        }
        assert_eq!(ramp[3], 16.0);
    }

    #[test]
    fn multiplicative_recurrence_floors_zero() {
        let mut ramp = [0.0f32; 8];
        multiplicative_recurrence(&mut ramp, 0.0, 1.0);
        assert!(ramp.iter().all(|v| *v > 0.0));
        assert_eq!(ramp[7], 1.0);
    }

    #[test]
    fn multiplicative_recurrence_negative() {
        let mut ramp = [0.0f32; 3];
        multiplicative_recurrence(&mut ramp, -1.0, -8.0);
        assert!((ramp[0] + 2.0).abs() < 1e-4);
        assert_eq!(ramp[2], -8.0);
    }
}
