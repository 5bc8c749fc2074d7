//! Dynamics compressor with a ratio-derived gain curve and soft limiter.
//!
//! A feed-forward compressor whose detector chases the estimated signal power
//! with separate attack and decay factors, then maps the chased power through
//! a hyperbolic gain curve that is exactly unity at the normal power.
//!
//! # Signal Flow
//!
//! ```text
//! Input → Input Gain → Power Estimate → Chase (attack/decay) → Gain Curve
//!                                                                  ↓
//!                          Output ← Soft Limiter ← Output Gain ← × Gain
//! ```
//!
//! # Power Estimation
//!
//! | Mode | Estimate |
//! |------|----------|
//! | [`CompressorMode::Rms`] | square, one-pole lowpass, max(L, R), sqrt |
//! | [`CompressorMode::AbsVal`] | abs, one-pole lowpass, max(L, R) |
//! | [`CompressorMode::Peak`] | abs, max(L, R) |
//! | [`CompressorMode::PeakLookahead`] | window maximum over a delay line, ramped geometrically |
//!
//! # Parameters
//!
//! | Parameter | Unit | Description |
//! |-----------|------|-------------|
//! | `input_gain` | linear | Applied before detection |
//! | `output_gain` | linear | Applied after the gain curve |
//! | `normal_power` | linear | Power at which the gain curve is exactly 1 |
//! | `threshold_power` | linear | Floor for the chased power |
//! | `ratio` | x:1 | Compression ratio, `f64::INFINITY` limits |
//! | `filter_cutoff` | Hz | Detector lowpass; also sizes the lookahead window |
//! | `decay_rate` | seconds | Time for the chased power to halve |
//! | `attack_rate` | seconds | Time for the chased power to double |
//! | `limiting_excess` | linear | Headroom of the arctangent knee above full scale |
//!
//! Controls are accent-scaled constants for track placement and
//! envelope/LFO chains for oscillator placement. Peak-lookahead detection
//! needs a delay line sized at creation and is only available on tracks.
//!
//! # Example
//!
//! ```rust
//! use sonant_core::{Accents, ScalarParam, SynthParams, Workspace};
//! use sonant_effects::compressor::{
//!     CompressorControls, CompressorMode, CompressorPlacement, CompressorTemplate,
//! };
//!
//! let controls = CompressorControls::DEFAULT.map(|&v| ScalarParam::constant(v));
//! let template =
//!     CompressorTemplate::new(CompressorMode::Peak, CompressorPlacement::Track(controls))
//!         .unwrap();
//! let params = SynthParams::default();
//! let (mut state, _) = template.new_state(&Accents::ZERO, 1.0, &params).unwrap();
//! state.track_update_state(&Accents::ZERO, &params).unwrap();
//!
//! let mut workspace = Workspace::new(64, 4);
//! let mut left = [0.1f32; 64];
//! let mut right = [0.1f32; 64];
//! state.apply(&mut left, &mut right, &mut workspace.arena(64), &params).unwrap();
//! ```

use alloc::collections::VecDeque;
use alloc::vec;
use alloc::vec::Vec;
use libm::{pow, powf};
use sonant_core::iir::iir1_all_pole_in_place;
use sonant_core::vector::{
    abs_in_place, copy, max_elementwise, scale_in_place, sqrt_in_place, square_in_place,
};
use sonant_core::{
    Accents, BuildError, Iir1Coefficients, LINEAR_FLOOR, ModulatedParam, ModulatedParamTemplate,
    ScalarParam, ScratchArena, SynthError, SynthParams, one_pole_lowpass, soft_limit,
};

/// Smallest attack time in samples; bounds the attack factor at `2^32`.
const MIN_ATTACK_SAMPLES: f64 = 1.0 / 32.0;

/// Lookahead delay bounds in samples.
const MIN_LOOKAHEAD: f64 = 2.0;
const MAX_LOOKAHEAD: f64 = 16_777_216.0;

/// Power estimation strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CompressorMode {
    /// Square, lowpass, take the louder channel, square root.
    #[default]
    Rms,
    /// Rectify, lowpass, take the louder channel.
    AbsVal,
    /// Rectify and take the louder channel.
    Peak,
    /// Maximum over a lookahead window with the signal delayed to match.
    PeakLookahead,
}

/// The nine compressor controls, generic over their value source.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompressorControls<P> {
    /// Linear gain before detection.
    pub input_gain: P,
    /// Linear gain after the curve.
    pub output_gain: P,
    /// Power with unity gain.
    pub normal_power: P,
    /// Floor for the chased power.
    pub threshold_power: P,
    /// Compression ratio; infinity limits.
    pub ratio: P,
    /// Detector lowpass cutoff in Hz.
    pub filter_cutoff: P,
    /// Seconds for the chased power to halve.
    pub decay_rate: P,
    /// Seconds for the chased power to double.
    pub attack_rate: P,
    /// Knee headroom above full scale.
    pub limiting_excess: P,
}

impl CompressorControls<f64> {
    /// Moderate 4:1 compression around a quarter of full scale.
    pub const DEFAULT: Self = Self {
        input_gain: 1.0,
        output_gain: 1.0,
        normal_power: 0.25,
        threshold_power: 0.001,
        ratio: 4.0,
        filter_cutoff: 20.0,
        decay_rate: 0.1,
        attack_rate: 0.005,
        limiting_excess: 0.1,
    };
}

impl<P> CompressorControls<P> {
    /// Applies `f` to every control, in declaration order.
    pub fn map<Q>(&self, mut f: impl FnMut(&P) -> Q) -> CompressorControls<Q> {
        CompressorControls {
            input_gain: f(&self.input_gain),
            output_gain: f(&self.output_gain),
            normal_power: f(&self.normal_power),
            threshold_power: f(&self.threshold_power),
            ratio: f(&self.ratio),
            filter_cutoff: f(&self.filter_cutoff),
            decay_rate: f(&self.decay_rate),
            attack_rate: f(&self.attack_rate),
            limiting_excess: f(&self.limiting_excess),
        }
    }

    /// Like [`map`](Self::map), stopping at the first error.
    pub fn try_map<Q, E>(
        &self,
        mut f: impl FnMut(&P) -> Result<Q, E>,
    ) -> Result<CompressorControls<Q>, E> {
        Ok(CompressorControls {
            input_gain: f(&self.input_gain)?,
            output_gain: f(&self.output_gain)?,
            normal_power: f(&self.normal_power)?,
            threshold_power: f(&self.threshold_power)?,
            ratio: f(&self.ratio)?,
            filter_cutoff: f(&self.filter_cutoff)?,
            decay_rate: f(&self.decay_rate)?,
            attack_rate: f(&self.attack_rate)?,
            limiting_excess: f(&self.limiting_excess)?,
        })
    }

    fn for_each_mut(&mut self, mut f: impl FnMut(&mut P)) {
        for p in [
            &mut self.input_gain,
            &mut self.output_gain,
            &mut self.normal_power,
            &mut self.threshold_power,
            &mut self.ratio,
            &mut self.filter_cutoff,
            &mut self.decay_rate,
            &mut self.attack_rate,
            &mut self.limiting_excess,
        ] {
            f(p);
        }
    }

    fn try_for_each_mut<E>(&mut self, mut f: impl FnMut(&mut P) -> Result<(), E>) -> Result<(), E> {
        for p in [
            &mut self.input_gain,
            &mut self.output_gain,
            &mut self.normal_power,
            &mut self.threshold_power,
            &mut self.ratio,
            &mut self.filter_cutoff,
            &mut self.decay_rate,
            &mut self.attack_rate,
            &mut self.limiting_excess,
        ] {
            f(p)?;
        }
        Ok(())
    }
}

/// Where the compressor sits, with the matching control sources.
#[derive(Clone, Debug)]
pub enum CompressorPlacement {
    /// On a track; controls re-evaluated from accents every tick.
    Track(CompressorControls<ScalarParam>),
    /// In an oscillator's effect chain; controls are envelope/LFO chains.
    Oscillator(CompressorControls<ModulatedParamTemplate>),
}

/// Hyperbolic gain curve `1 / (A·x + B)` over power relative to normal.
///
/// `A + B = 1` puts unity gain at `x = 1`, and `2A + B = 2^(1 - 1/r)` gives
/// `0.5^(1 - 1/r)` at `x = 2`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GainCurve {
    a: f64,
    b: f64,
}

impl GainCurve {
    /// Curve for `ratio`; ratios at or below 1 (and NaN) give unity gain.
    pub fn new(ratio: f64) -> Self {
        if ratio.is_nan() || ratio <= 1.0 {
            return Self { a: 0.0, b: 1.0 };
        }
        let knee = pow(2.0, 1.0 - 1.0 / ratio);
        Self {
            a: knee - 1.0,
            b: 2.0 - knee,
        }
    }

    /// Gain at `relative_power` = power / normal power.
    #[inline]
    pub fn gain(&self, relative_power: f64) -> f64 {
        1.0 / (self.a * relative_power + self.b)
    }
}

/// Immutable compressor definition.
#[derive(Clone, Debug)]
pub struct CompressorTemplate {
    mode: CompressorMode,
    placement: CompressorPlacement,
}

impl CompressorTemplate {
    /// Validates the mode against the placement.
    ///
    /// # Errors
    ///
    /// [`BuildError::LookaheadOnOscillator`] for peak-lookahead detection in
    /// an oscillator chain.
    pub fn new(mode: CompressorMode, placement: CompressorPlacement) -> Result<Self, BuildError> {
        if mode == CompressorMode::PeakLookahead
            && matches!(placement, CompressorPlacement::Oscillator(_))
        {
            #[cfg(feature = "tracing")]
            tracing::warn!("rejecting peak-lookahead compressor at oscillator scope");
            return Err(BuildError::LookaheadOnOscillator);
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(?mode, "compressor template built");
        Ok(Self { mode, placement })
    }

    /// Power estimation strategy.
    pub fn mode(&self) -> CompressorMode {
        self.mode
    }

    /// Control placement.
    pub fn placement(&self) -> &CompressorPlacement {
        &self.placement
    }

    /// Creates the per-note (or per-track) state and its pre-origin ticks.
    ///
    /// Track controls are evaluated once here so the lookahead window can be
    /// sized; the delay line is never resized afterwards.
    pub fn new_state(
        &self,
        accents: &Accents,
        hurry_up: f64,
        params: &SynthParams,
    ) -> Result<(CompressorState, i32), SynthError> {
        let (controls, initial, pre_origin) = match &self.placement {
            CompressorPlacement::Track(scalars) => {
                let initial = scalars.try_map(|p| p.evaluate(accents))?;
                (ControlState::Track(scalars.clone()), initial, 0)
            }
            CompressorPlacement::Oscillator(templates) => {
                let mut pre_origin = 0;
                let chains = templates.try_map(|t| {
                    let (param, p) = t.new_state(accents, hurry_up, params)?;
                    pre_origin = pre_origin.max(p);
                    Ok::<_, SynthError>(param)
                })?;
                let initial = chains.map(ModulatedParam::current);
                (ControlState::Oscillator(chains), initial, pre_origin)
            }
        };

        let detector = match self.mode {
            CompressorMode::Rms => Detector::Rms { y1: [0.0; 2] },
            CompressorMode::AbsVal => Detector::AbsVal { y1: [0.0; 2] },
            CompressorMode::Peak => Detector::Peak,
            CompressorMode::PeakLookahead => {
                debug_assert!(matches!(controls, ControlState::Track(_)));
                Detector::PeakLookahead(Lookahead::new(
                    lookahead_length(params.sample_rate, initial.filter_cutoff),
                ))
            }
        };

        let mut state = CompressorState {
            mode: self.mode,
            controls,
            detector,
            setup: Setup::default(),
            effective_power: 0.0,
        };
        state.configure(&initial, params);

        #[cfg(feature = "tracing")]
        tracing::debug!(mode = ?self.mode, pre_origin, "compressor state created");
        Ok((state, pre_origin))
    }
}

/// Lookahead delay in samples: `2·sample_rate/cutoff` clamped to `[2, 2^24]`.
pub fn lookahead_length(sample_rate: f64, cutoff: f64) -> usize {
    let samples = if cutoff > 0.0 {
        2.0 * sample_rate / cutoff
    } else {
        MAX_LOOKAHEAD
    };
    libm::round(samples.clamp(MIN_LOOKAHEAD, MAX_LOOKAHEAD)) as usize
}

#[derive(Debug)]
enum ControlState {
    Track(CompressorControls<ScalarParam>),
    Oscillator(CompressorControls<ModulatedParam>),
}

/// Block-rate values derived from the controls.
#[derive(Clone, Copy, Debug)]
struct Setup {
    input_gain: f32,
    output_gain: f32,
    normal_power: f32,
    threshold_power: f32,
    curve: GainCurve,
    lowpass: Iir1Coefficients,
    decay_factor: f32,
    attack_factor: f32,
    limiting_excess: f32,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            input_gain: 1.0,
            output_gain: 1.0,
            normal_power: 1.0,
            threshold_power: 0.0,
            curve: GainCurve::new(1.0),
            lowpass: Iir1Coefficients { b0: 1.0, a1: 0.0 },
            decay_factor: 0.0,
            attack_factor: 1.0,
            limiting_excess: 0.0,
        }
    }
}

#[derive(Clone, Debug)]
enum Detector {
    Rms { y1: [f32; 2] },
    AbsVal { y1: [f32; 2] },
    Peak,
    PeakLookahead(Lookahead),
}

/// Delay line plus a monotonic queue of the window's absolute values.
///
/// The queue holds `(sample, magnitude)` pairs with strictly decreasing
/// magnitudes, so its front is the window maximum. It never holds more than
/// `length` entries and is allocated once.
#[derive(Clone, Debug)]
struct Lookahead {
    delay: [Vec<f32>; 2],
    peaks: VecDeque<(u64, f32)>,
    sample: u64,
    position: usize,
    transition: u32,
    current: f32,
    target: f32,
    step: f32,
    remaining: u32,
}

impl Lookahead {
    fn new(length: usize) -> Self {
        Self {
            delay: [vec![0.0; length], vec![0.0; length]],
            peaks: VecDeque::with_capacity(length),
            sample: 0,
            position: 0,
            transition: (length / 2).max(1) as u32,
            current: LINEAR_FLOOR,
            target: LINEAR_FLOOR,
            step: 1.0,
            remaining: 0,
        }
    }

    fn length(&self) -> usize {
        self.delay[0].len()
    }

    /// Enters `magnitude` and drops entries that left the window.
    fn push(&mut self, magnitude: f32) {
        let length = self.length() as u64;
        while self.peaks.front().is_some_and(|&(n, _)| n + length <= self.sample) {
            self.peaks.pop_front();
        }
        while self.peaks.back().is_some_and(|&(_, m)| m <= magnitude) {
            self.peaks.pop_back();
        }
        self.peaks.push_back((self.sample, magnitude));
        self.sample += 1;
    }

    fn window_max(&self) -> f32 {
        self.peaks.front().map_or(0.0, |&(_, m)| m)
    }

    /// Delays both channels in place and writes the ramped window maximum.
    fn process(&mut self, left: &mut [f32], right: &mut [f32], power: &mut [f32]) {
        for ((l, r), p) in left.iter_mut().zip(right.iter_mut()).zip(power.iter_mut()) {
            let magnitude = l.abs().max(r.abs());
            self.push(magnitude);
            *l = core::mem::replace(&mut self.delay[0][self.position], *l);
            *r = core::mem::replace(&mut self.delay[1][self.position], *r);
            self.position += 1;
            if self.position == self.length() {
                self.position = 0;
            }

            let peak = self.window_max().max(LINEAR_FLOOR);
            if peak != self.target {
                self.target = peak;
                self.step = powf(peak / self.current, 1.0 / self.transition as f32);
                self.remaining = self.transition;
            }
            if self.remaining > 0 {
                self.remaining -= 1;
                self.current = if self.remaining == 0 {
                    self.target
                } else {
                    self.current * self.step
                };
            }
            *p = self.current;
        }
    }
}

/// Per-note or per-track compressor.
#[derive(Debug)]
pub struct CompressorState {
    mode: CompressorMode,
    controls: ControlState,
    detector: Detector,
    setup: Setup,
    effective_power: f32,
}

impl CompressorState {
    /// Power estimation strategy.
    pub fn mode(&self) -> CompressorMode {
        self.mode
    }

    /// Chased power after the last processed sample.
    pub fn effective_power(&self) -> f32 {
        self.effective_power
    }

    /// Lookahead delay in samples, zero without lookahead.
    pub fn latency(&self) -> usize {
        match &self.detector {
            Detector::PeakLookahead(lookahead) => lookahead.length(),
            _ => 0,
        }
    }

    /// Re-evaluates track controls from the current accents.
    ///
    /// Does nothing for oscillator placement. The first failing control
    /// aborts the update and the previous setup stays in effect.
    pub fn track_update_state(
        &mut self,
        accents: &Accents,
        params: &SynthParams,
    ) -> Result<(), SynthError> {
        let ControlState::Track(scalars) = &self.controls else {
            return Ok(());
        };
        let values = scalars.try_map(|p| p.evaluate(accents))?;
        self.configure(&values, params);
        Ok(())
    }

    /// Advances oscillator control chains one tick.
    ///
    /// Does nothing for track placement. The first failing chain aborts the
    /// update; chains after it keep their previous value and the previous
    /// setup stays in effect.
    pub fn osc_update_envelopes(
        &mut self,
        frequency: f64,
        params: &SynthParams,
    ) -> Result<(), SynthError> {
        let ControlState::Oscillator(chains) = &mut self.controls else {
            return Ok(());
        };
        chains.try_for_each_mut(|p| p.update(frequency, params).map(drop))?;
        let values = chains.map(ModulatedParam::current);
        self.configure(&values, params);
        Ok(())
    }

    fn configure(&mut self, values: &CompressorControls<f64>, params: &SynthParams) {
        let sample_rate = params.sample_rate;
        let decay_samples = values.decay_rate * sample_rate;
        let decay_factor = if decay_samples > 0.0 {
            pow(2.0, -1.0 / decay_samples)
        } else {
            0.0
        };
        let attack_samples = (values.attack_rate * sample_rate).max(MIN_ATTACK_SAMPLES);
        self.setup = Setup {
            input_gain: values.input_gain as f32,
            output_gain: values.output_gain as f32,
            normal_power: (values.normal_power as f32).max(LINEAR_FLOOR),
            threshold_power: values.threshold_power as f32,
            curve: GainCurve::new(values.ratio),
            lowpass: one_pole_lowpass(values.filter_cutoff as f32, sample_rate as f32),
            decay_factor: decay_factor as f32,
            attack_factor: pow(2.0, 1.0 / attack_samples) as f32,
            limiting_excess: values.limiting_excess as f32,
        };
    }

    /// Compresses one stereo block in place.
    ///
    /// Two detector regions are leased from `arena`.
    pub fn apply(
        &mut self,
        left: &mut [f32],
        right: &mut [f32],
        arena: &mut ScratchArena<'_>,
        _params: &SynthParams,
    ) -> Result<(), SynthError> {
        assert_eq!(left.len(), right.len(), "channel length mismatch");
        let frames = left.len();
        let setup = self.setup;
        scale_in_place(left, setup.input_gain);
        scale_in_place(right, setup.input_gain);

        let (mut lease, _) = arena.lease(2);
        let [power, other] = lease.split::<2>();
        let (power, other) = (&mut power[..frames], &mut other[..frames]);

        match &mut self.detector {
            Detector::Rms { y1 } => {
                copy(left, power);
                square_in_place(power);
                iir1_all_pole_in_place(setup.lowpass, &mut y1[0], power);
                copy(right, other);
                square_in_place(other);
                iir1_all_pole_in_place(setup.lowpass, &mut y1[1], other);
                max_elementwise(other, power);
                sqrt_in_place(power);
            }
            Detector::AbsVal { y1 } => {
                copy(left, power);
                abs_in_place(power);
                iir1_all_pole_in_place(setup.lowpass, &mut y1[0], power);
                copy(right, other);
                abs_in_place(other);
                iir1_all_pole_in_place(setup.lowpass, &mut y1[1], other);
                max_elementwise(other, power);
            }
            Detector::Peak => {
                copy(left, power);
                abs_in_place(power);
                copy(right, other);
                abs_in_place(other);
                max_elementwise(other, power);
            }
            Detector::PeakLookahead(lookahead) => lookahead.process(left, right, power),
        }

        let mut effective = self.effective_power;
        for ((l, r), &estimate) in left.iter_mut().zip(right.iter_mut()).zip(power.iter()) {
            effective = chase(effective, estimate, &setup);
            let gain = setup.curve.gain(f64::from(effective / setup.normal_power)) as f32
                * setup.output_gain;
            *l = soft_limit(*l * gain, setup.limiting_excess);
            *r = soft_limit(*r * gain, setup.limiting_excess);
        }
        self.effective_power = effective;
        Ok(())
    }

    /// Aligns oscillator control chains to `actual_pre_origin`.
    pub fn fix_up_pre_origin(&mut self, actual_pre_origin: i32) {
        if let ControlState::Oscillator(chains) = &mut self.controls {
            chains.for_each_mut(|p| p.fix_up_pre_origin(actual_pre_origin));
        }
    }

    /// Releases sustain point `n` on oscillator control chains.
    pub fn key_up_sustain(&mut self, n: usize) {
        if let ControlState::Oscillator(chains) = &mut self.controls {
            chains.for_each_mut(|p| p.key_up_sustain(n));
        }
    }

    /// Restarts oscillator control chains from their origin.
    pub fn retrigger_from_origin(&mut self, accents: &Accents, params: &SynthParams) {
        if let ControlState::Oscillator(chains) = &mut self.controls {
            chains.for_each_mut(|p| p.retrigger_from_origin(accents, params));
        }
    }
}

/// Moves `effective` toward `estimate` by one attack or decay step without
/// overshooting, then floors it at the threshold.
#[inline]
fn chase(effective: f32, estimate: f32, setup: &Setup) -> f32 {
    let from = effective.max(LINEAR_FLOOR);
    let next = if estimate > from {
        (from * setup.attack_factor).min(estimate)
    } else {
        (from * setup.decay_factor).max(estimate)
    };
    next.max(setup.threshold_power)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonant_core::{SegmentEnvelope, SegmentShape, Workspace};
    use alloc::sync::Arc;

    fn track(mode: CompressorMode, values: CompressorControls<f64>) -> CompressorState {
        let controls = values.map(|&v| ScalarParam::constant(v));
        let template = CompressorTemplate::new(mode, CompressorPlacement::Track(controls)).unwrap();
        template
            .new_state(&Accents::ZERO, 1.0, &SynthParams::default())
            .unwrap()
            .0
    }

    fn run(state: &mut CompressorState, left: &mut [f32], right: &mut [f32]) {
        let mut workspace = Workspace::new(left.len(), 4);
        let mut arena = workspace.arena(left.len());
        state
            .apply(left, right, &mut arena, &SynthParams::default())
            .unwrap();
    }

    #[test]
    fn unity_ratio_is_transparent() {
        let values = CompressorControls {
            ratio: 1.0,
            ..CompressorControls::DEFAULT
        };
        let mut state = track(CompressorMode::Rms, values);
        let mut left = [0.5f32; 64];
        let mut right = [-0.25f32; 64];
        run(&mut state, &mut left, &mut right);
        assert!(left.iter().all(|&x| x == 0.5));
        assert!(right.iter().all(|&x| x == -0.25));
    }

    #[test]
    fn gain_curve_passes_through_unity() {
        for ratio in [1.0, 2.0, 4.0, 10.0, f64::INFINITY] {
            let curve = GainCurve::new(ratio);
            assert!((curve.gain(1.0) - 1.0).abs() < 1e-12, "ratio {ratio}");
        }
    }

    #[test]
    fn limiting_holds_normal_power() {
        let values = CompressorControls {
            ratio: f64::INFINITY,
            normal_power: 0.25,
            attack_rate: 0.0,
            decay_rate: 0.0,
            limiting_excess: 1.0,
            ..CompressorControls::DEFAULT
        };
        let mut state = track(CompressorMode::Peak, values);
        let mut left = [0.8f32; 32];
        let mut right = [0.8f32; 32];
        run(&mut state, &mut left, &mut right);
        assert!((left[31] - 0.25).abs() < 1e-5, "{}", left[31]);
    }

    #[test]
    fn attack_approaches_without_overshoot() {
        let values = CompressorControls {
            attack_rate: 0.001,
            threshold_power: 0.0,
            ..CompressorControls::DEFAULT
        };
        let mut state = track(CompressorMode::Peak, values);
        let mut left = [0.5f32; 256];
        let mut right = [0.0f32; 256];
        run(&mut state, &mut left, &mut right);
        // 256 samples at 48 samples per doubling from the linear floor
        assert!(state.effective_power() > 3e-6);
        assert!(state.effective_power() < 1e-5);
    }

    #[test]
    fn threshold_floors_effective_power() {
        let values = CompressorControls {
            threshold_power: 0.3,
            ..CompressorControls::DEFAULT
        };
        let mut state = track(CompressorMode::Peak, values);
        let mut left = [0.0f32; 16];
        let mut right = [0.0f32; 16];
        run(&mut state, &mut left, &mut right);
        assert_eq!(state.effective_power(), 0.3);
    }

    #[test]
    fn lookahead_window_is_clamped() {
        assert_eq!(lookahead_length(48000.0, 20.0), 4800);
        assert_eq!(lookahead_length(48000.0, 1e9), 2);
        assert_eq!(lookahead_length(48000.0, 0.0), 1 << 24);
    }

    #[test]
    fn lookahead_delays_signal() {
        let values = CompressorControls {
            ratio: 1.0,
            filter_cutoff: 24000.0,
            ..CompressorControls::DEFAULT
        };
        let mut state = track(CompressorMode::PeakLookahead, values);
        assert_eq!(state.latency(), 4);
        let mut left = [1.0f32, 0.5, 0.25, 0.125, 0.0, 0.0];
        let mut right = [0.0f32; 6];
        run(&mut state, &mut left, &mut right);
        assert_eq!(left, [0.0, 0.0, 0.0, 0.0, 1.0, 0.5]);
    }

    #[test]
    fn lookahead_window_max_slides_without_growing() {
        let mut lookahead = Lookahead::new(3);
        let capacity = lookahead.peaks.capacity();
        let mut maxima = Vec::new();
        for m in [0.5, 1.0, 0.2, 0.1, 0.3, 0.0, 0.0, 0.0] {
            lookahead.push(m);
            maxima.push(lookahead.window_max());
            assert!(lookahead.peaks.len() <= 3);
        }
        assert_eq!(maxima, [0.5, 1.0, 1.0, 1.0, 0.3, 0.3, 0.3, 0.0]);
        assert_eq!(lookahead.peaks.capacity(), capacity);
    }

    #[test]
    fn lookahead_rejected_on_oscillator() {
        let controls = CompressorControls::DEFAULT.map(|&v| ModulatedParamTemplate::constant(v));
        let err = CompressorTemplate::new(
            CompressorMode::PeakLookahead,
            CompressorPlacement::Oscillator(controls),
        )
        .unwrap_err();
        assert_eq!(err, BuildError::LookaheadOnOscillator);
    }

    #[test]
    fn oscillator_controls_follow_envelopes() {
        let params = SynthParams::default().with_envelope_rate(100.0);
        let mut controls =
            CompressorControls::DEFAULT.map(|&v| ModulatedParamTemplate::constant(v));
        controls.output_gain = ModulatedParamTemplate::new(Arc::new(
            SegmentEnvelope::new(1.0).segment(0.5, 0.01, SegmentShape::Linear),
        ));
        controls.ratio = ModulatedParamTemplate::constant(1.0);
        let template =
            CompressorTemplate::new(CompressorMode::Rms, CompressorPlacement::Oscillator(controls))
                .unwrap();
        let (mut state, pre_origin) = template.new_state(&Accents::ZERO, 1.0, &params).unwrap();
        state.fix_up_pre_origin(pre_origin);
        state.osc_update_envelopes(440.0, &params).unwrap();

        let mut workspace = Workspace::new(8, 2);
        let mut left = [0.4f32; 8];
        let mut right = [0.4f32; 8];
        state
            .apply(&mut left, &mut right, &mut workspace.arena(8), &params)
            .unwrap();
        assert!(left.iter().all(|&x| (x - 0.2).abs() < 1e-6));
    }

}
