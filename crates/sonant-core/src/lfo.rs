//! Low Frequency Oscillator stage for modulated parameters.
//!
//! An [`Lfo`] is an [`LfoTemplate`]: it modulates the value flowing out of an
//! envelope once per envelope tick. Its depth is itself an envelope, so an LFO
//! can fade in, and its rate may track the oscillator's pitch.
//!
//! # Waveforms
//!
//! - **Sine**: Smooth, natural modulation
//! - **Triangle**: Linear ramps, harder corners than sine
//! - **Saw**: Rising ramp, abrupt reset
//! - **Square**: Binary on/off modulation
//! - **SampleAndHold**: Random stepped values, never ramped
//!
//! # Example
//!
//! ```rust
//! use sonant_core::{Accents, Lfo, LfoMode, LfoTemplate, LfoWaveform, SynthParams};
//!
//! let params = SynthParams::default().with_envelope_rate(100.0);
//! let vibrato = Lfo::new(LfoWaveform::Square, 25.0, 0.5).mode(LfoMode::Multiplicative);
//! let (mut state, _) = vibrato.new_state(&Accents::ZERO, 1.0, &params).unwrap();
//!
//! // 25 Hz at 100 ticks/s is a quarter cycle per tick
//! assert_eq!(state.update_cycle(440.0, 440.0, &params).unwrap(), 660.0);
//! ```

use crate::accent::{Accents, ScalarParam};
use crate::error::SynthError;
use crate::modulation::{ConstantEnvelope, EnvelopeState, EnvelopeTemplate, LfoState, LfoTemplate};
use crate::params::SynthParams;
use alloc::boxed::Box;
use alloc::sync::Arc;
use core::f64::consts::TAU;
use libm::{floor, sin};

/// LFO waveform type
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LfoWaveform {
    /// Sine
    #[default]
    Sine,
    /// Triangle, -1 at phase 0, +1 at phase 0.5
    Triangle,
    /// Rising saw
    Saw,
    /// +1 for the first half cycle, -1 for the second
    Square,
    /// Random value held for one cycle
    SampleAndHold,
}

impl LfoWaveform {
    /// Waveform value in `[-1, 1]` at `phase` in `[0, 1)`.
    ///
    /// Sample-and-hold has no shape of its own and reads as zero here.
    pub fn value_at(self, phase: f64) -> f64 {
        match self {
            Self::Sine => sin(phase * TAU),
            Self::Triangle => {
                if phase < 0.5 {
                    4.0 * phase - 1.0
                } else {
                    3.0 - 4.0 * phase
                }
            }
            Self::Saw => 2.0 * phase - 1.0,
            Self::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Self::SampleAndHold => 0.0,
        }
    }
}

/// How the LFO output combines with the incoming value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LfoMode {
    /// `value + depth * wave`
    #[default]
    Additive,
    /// `value * (1 + depth * wave)`
    Multiplicative,
}

/// LFO template.
#[derive(Clone, Debug)]
pub struct Lfo {
    waveform: LfoWaveform,
    frequency: ScalarParam,
    frequency_tracking: f64,
    depth: Arc<dyn EnvelopeTemplate>,
    mode: LfoMode,
    start_phase: f64,
    seed: u32,
}

impl Lfo {
    /// Creates an LFO with a fixed rate in Hz and a constant depth.
    pub fn new(waveform: LfoWaveform, frequency_hz: f64, depth: f64) -> Self {
        Self {
            waveform,
            frequency: ScalarParam::constant(frequency_hz),
            frequency_tracking: 0.0,
            depth: Arc::new(ConstantEnvelope::new(depth)),
            mode: LfoMode::Additive,
            start_phase: 0.0,
            seed: 0x9E37_79B9,
        }
    }

    /// Sets how the output combines with the incoming value.
    #[must_use]
    pub fn mode(mut self, mode: LfoMode) -> Self {
        self.mode = mode;
        self
    }

    /// Makes the rate accent-modulated.
    #[must_use]
    pub fn frequency(mut self, frequency: ScalarParam) -> Self {
        self.frequency = frequency;
        self
    }

    /// Adds `multiple * oscillator_frequency` to the rate.
    #[must_use]
    pub fn frequency_tracking(mut self, multiple: f64) -> Self {
        self.frequency_tracking = multiple;
        self
    }

    /// Drives the depth from an envelope.
    #[must_use]
    pub fn depth_envelope(mut self, depth: Arc<dyn EnvelopeTemplate>) -> Self {
        self.depth = depth;
        self
    }

    /// Sets the starting phase (0.0 - 1.0).
    ///
    /// 0.0 = 0°, 0.25 = 90°, 0.5 = 180°, 0.75 = 270°
    #[must_use]
    pub fn start_phase(mut self, phase: f64) -> Self {
        self.start_phase = phase - floor(phase);
        self
    }

    /// Seeds the sample-and-hold generator.
    #[must_use]
    pub fn seed(mut self, seed: u32) -> Self {
        self.seed = seed.max(1);
        self
    }
}

impl LfoTemplate for Lfo {
    fn new_state(
        &self,
        accents: &Accents,
        hurry_up: f64,
        params: &SynthParams,
    ) -> Result<(Box<dyn LfoState>, i32), SynthError> {
        let frequency = self.frequency.evaluate(accents)?;
        let (depth, pre_origin) = self.depth.new_state(accents, hurry_up, params)?;
        let mut state = LfoGenerator {
            waveform: self.waveform,
            mode: self.mode,
            frequency,
            frequency_tracking: self.frequency_tracking,
            depth,
            depth_value: 0.0,
            phase: self.start_phase,
            start_phase: self.start_phase,
            rng: self.seed,
            held: 0.0,
        };
        state.depth_value = state.depth.initial_value();
        state.held = state.next_random();
        Ok((Box::new(state), pre_origin))
    }
}

struct LfoGenerator {
    waveform: LfoWaveform,
    mode: LfoMode,
    frequency: f64,
    frequency_tracking: f64,
    depth: Box<dyn EnvelopeState>,
    depth_value: f64,
    phase: f64,
    start_phase: f64,
    rng: u32,
    held: f64,
}

impl LfoGenerator {
    /// xorshift32 mapped to `[-1, 1)`.
    fn next_random(&mut self) -> f64 {
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.rng = x;
        f64::from(x) / 2_147_483_648.0 - 1.0
    }

    fn wave(&self) -> f64 {
        match self.waveform {
            LfoWaveform::SampleAndHold => self.held,
            other => other.value_at(self.phase),
        }
    }

    fn apply(&self, value: f64) -> f64 {
        let modulation = self.depth_value * self.wave();
        match self.mode {
            LfoMode::Additive => value + modulation,
            LfoMode::Multiplicative => value * (1.0 + modulation),
        }
    }
}

impl LfoState for LfoGenerator {
    fn update_cycle(
        &mut self,
        value: f64,
        oscillator_frequency: f64,
        params: &SynthParams,
    ) -> Result<f64, SynthError> {
        self.depth_value = self.depth.update(params)?;
        let rate = self.frequency + self.frequency_tracking * oscillator_frequency;
        self.phase += rate / params.envelope_rate;
        if self.phase >= 1.0 || self.phase < 0.0 {
            self.phase -= floor(self.phase);
            self.held = self.next_random();
        }
        Ok(self.apply(value))
    }

    fn initial_value(&self, value: f64) -> f64 {
        self.apply(value)
    }

    fn key_up_sustain(&mut self, n: usize) {
        self.depth.key_up_sustain(n);
    }

    fn retrigger_from_origin(&mut self, accents: &Accents, params: &SynthParams) {
        self.depth.retrigger_from_origin(accents, params);
        self.phase = self.start_phase;
    }

    fn fix_envelope_origins(&mut self, actual_pre_origin: i32) {
        self.depth.fix_up_initial_delay(actual_pre_origin);
    }

    fn is_sample_and_hold(&self) -> bool {
        self.waveform == LfoWaveform::SampleAndHold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::SegmentEnvelope;
    use crate::modulation::SegmentShape;

    fn params() -> SynthParams {
        SynthParams::default().with_envelope_rate(100.0)
    }

    #[test]
    fn triangle_shape() {
        assert_eq!(LfoWaveform::Triangle.value_at(0.0), -1.0);
        assert_eq!(LfoWaveform::Triangle.value_at(0.25), 0.0);
        assert_eq!(LfoWaveform::Triangle.value_at(0.5), 1.0);
    }

    #[test]
    fn additive_saw_steps() {
        let lfo = Lfo::new(LfoWaveform::Saw, 25.0, 1.0);
        let (mut s, pre) = lfo.new_state(&Accents::ZERO, 1.0, &params()).unwrap();
        assert_eq!(pre, 0);
        assert_eq!(s.initial_value(0.0), -1.0);
        assert_eq!(s.update_cycle(0.0, 0.0, &params()).unwrap(), -0.5);
        assert_eq!(s.update_cycle(0.0, 0.0, &params()).unwrap(), 0.0);
    }

    #[test]
    fn tracking_follows_oscillator() {
        let lfo = Lfo::new(LfoWaveform::Saw, 0.0, 1.0).frequency_tracking(0.25 / 100.0);
        let (mut s, _) = lfo.new_state(&Accents::ZERO, 1.0, &params()).unwrap();
        // 0.0025 * 10000 Hz = 25 Hz
        let v = s.update_cycle(0.0, 10000.0, &params()).unwrap();
        assert!((v + 0.5).abs() < 1e-9);
    }

    #[test]
    fn sample_and_hold_steps_on_wrap() {
        let lfo = Lfo::new(LfoWaveform::SampleAndHold, 50.0, 1.0).seed(7);
        let (mut s, _) = lfo.new_state(&Accents::ZERO, 1.0, &params()).unwrap();
        assert!(s.is_sample_and_hold());
        let before = s.initial_value(0.0);
        let first = s.update_cycle(0.0, 0.0, &params()).unwrap();
        let second = s.update_cycle(0.0, 0.0, &params()).unwrap();
        assert_eq!(first, before);
        assert_ne!(first, second);
        assert!((-1.0..1.0).contains(&second));
    }

    #[test]
    fn depth_envelope_fades_in() {
        let fade = SegmentEnvelope::new(0.0).segment(1.0, 0.02, SegmentShape::Linear);
        let lfo = Lfo::new(LfoWaveform::Square, 1.0, 0.0).depth_envelope(Arc::new(fade));
        let (mut s, _) = lfo.new_state(&Accents::ZERO, 1.0, &params()).unwrap();
        assert_eq!(s.initial_value(1.0), 1.0);
        assert_eq!(s.update_cycle(1.0, 0.0, &params()).unwrap(), 1.5);
        assert_eq!(s.update_cycle(1.0, 0.0, &params()).unwrap(), 2.0);
    }
}
