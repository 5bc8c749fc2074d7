//! Pulse and ramp waveforms computed from phase.
//!
//! Both waveforms are defined on the phase fraction and an index in
//! `[0, 1]`. The index is turned into a 32-bit threshold on the fraction so
//! that comparisons are exact and an index of 1.0 needs no special case.
//!
//! - **Pulse**: +1 below the threshold, -1 at or above it.
//! - **Ramp**: rises from -1 to +1 below the threshold and falls back to -1
//!   above it, reaching +1 exactly at the threshold.
//!
//! Each block picks one of three kernels by what moved since the previous
//! tick, see [`AlgorithmicKernel`].

use sonant_core::{
    BuildError, Fixed64, ModulatedParam, ModulatedParamTemplate, NoteContext, ScratchArena,
    SynthError, SynthParams,
};

use crate::oscillator::{GainSource, Oscillator, OscillatorCommon, VoiceCore};

const FULL_CYCLE: u64 = 1 << 32;

/// Waveform of an algorithmic oscillator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AlgorithmicWaveform {
    /// Square wave with variable width.
    #[default]
    Pulse,
    /// Triangle with a movable peak.
    Ramp,
}

/// Phase-fraction threshold for `index`, in `[0, 2^32]`.
#[inline]
pub fn index_threshold(index: f64) -> u64 {
    let clamped = if index.is_nan() { 0.0 } else { index.clamp(0.0, 1.0) };
    libm::round(clamped * FULL_CYCLE as f64) as u64
}

/// Per-segment slopes of the ramp, per unit of phase fraction.
#[derive(Clone, Copy, Debug)]
struct RampShape {
    threshold: u64,
    rise: f64,
    fall: f64,
}

impl RampShape {
    fn new(index: f64) -> Self {
        let threshold = index_threshold(index);
        Self {
            threshold,
            rise: if threshold == 0 { 0.0 } else { 2.0 / threshold as f64 },
            fall: if threshold == FULL_CYCLE {
                0.0
            } else {
                2.0 / (FULL_CYCLE - threshold) as f64
            },
        }
    }

    #[inline]
    fn value(&self, phase: Fixed64) -> f32 {
        let p = u64::from(phase.frac());
        if p < self.threshold {
            (-1.0 + p as f64 * self.rise) as f32
        } else {
            (1.0 - (p - self.threshold) as f64 * self.fall) as f32
        }
    }
}

/// Ramp waveform at `phase` with its peak at `index`.
pub fn ramp_wave(phase: Fixed64, index: f64) -> f32 {
    RampShape::new(index).value(phase)
}

/// Pulse waveform at `phase` with width `index`.
#[inline]
pub fn pulse_wave(phase: Fixed64, index: f64) -> f32 {
    pulse_at(phase, index_threshold(index))
}

#[inline(always)]
fn pulse_at(phase: Fixed64, threshold: u64) -> f32 {
    if u64::from(phase.frac()) < threshold { 1.0 } else { -1.0 }
}

/// Kernel chosen per block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlgorithmicKernel {
    /// Loudness and index both flat.
    NoSmoothing,
    /// Loudness ramps, index flat.
    LoudnessVariant,
    /// Loudness and index both ramp.
    BothVariant,
}

impl AlgorithmicKernel {
    fn select(loudness_ramps: bool, index: &ModulatedParam, params: &SynthParams) -> Self {
        let index_ramps =
            params.interpolate_over_time && index.changed() && !index.is_sample_and_hold();
        if index_ramps {
            Self::BothVariant
        } else if loudness_ramps {
            Self::LoudnessVariant
        } else {
            Self::NoSmoothing
        }
    }
}

/// Algorithmic oscillator definition.
#[derive(Clone, Debug)]
pub struct AlgorithmicTemplate {
    common: OscillatorCommon,
    waveform: AlgorithmicWaveform,
    index: ModulatedParamTemplate,
}

impl AlgorithmicTemplate {
    /// Oscillator with a pulse width or ramp peak driven by `index`.
    pub fn new(
        common: OscillatorCommon,
        waveform: AlgorithmicWaveform,
        index: ModulatedParamTemplate,
    ) -> Result<Self, BuildError> {
        common.validate()?;
        Ok(Self {
            common,
            waveform,
            index,
        })
    }

    /// Shared settings.
    pub fn common(&self) -> &OscillatorCommon {
        &self.common
    }

    /// The waveform.
    pub fn waveform(&self) -> AlgorithmicWaveform {
        self.waveform
    }

    pub(crate) fn new_state(
        &self,
        note: &NoteContext,
        params: &SynthParams,
    ) -> Result<(AlgorithmicOscillator, i32), SynthError> {
        let (core, core_pre) = VoiceCore::new(&self.common, note, params)?;
        let (index, index_pre) = self.index.new_state(&note.accents, note.hurry_up, params)?;
        let mut state = AlgorithmicOscillator {
            core,
            index,
            waveform: self.waveform,
            phase: Fixed64::ZERO,
            differential: Fixed64::ZERO,
            last_kernel: AlgorithmicKernel::NoSmoothing,
        };
        state.refresh_differential(params);
        Ok((state, core_pre.max(index_pre)))
    }
}

/// Per-note algorithmic oscillator.
#[derive(Debug)]
pub struct AlgorithmicOscillator {
    core: VoiceCore,
    index: ModulatedParam,
    waveform: AlgorithmicWaveform,
    phase: Fixed64,
    differential: Fixed64,
    last_kernel: AlgorithmicKernel,
}

impl AlgorithmicOscillator {
    /// Kernel used by the latest block.
    pub fn last_kernel(&self) -> AlgorithmicKernel {
        self.last_kernel
    }

    /// Current phase.
    pub fn phase(&self) -> Fixed64 {
        self.phase
    }

    fn refresh_differential(&mut self, params: &SynthParams) {
        self.differential = Fixed64::from_f64(self.core.frequency() / params.sample_rate).wrapped();
    }
}

/// Index for sample `i`.
trait IndexSource {
    fn at(&self, i: usize) -> f64;
}

impl IndexSource for f64 {
    #[inline(always)]
    fn at(&self, _i: usize) -> f64 {
        *self
    }
}

impl IndexSource for &[f32] {
    #[inline(always)]
    fn at(&self, i: usize) -> f64 {
        f64::from(self[i])
    }
}

#[inline]
fn pulse_kernel<G: GainSource>(
    phase: &mut Fixed64,
    differential: Fixed64,
    threshold: u64,
    left: &mut [f32],
    right: &mut [f32],
    gain: &G,
) {
    for (i, (l, r)) in left.iter_mut().zip(right.iter_mut()).enumerate() {
        let v = pulse_at(*phase, threshold);
        let (gain_left, gain_right) = gain.at(i);
        *l += v * gain_left;
        *r += v * gain_right;
        *phase = (*phase + differential).wrapped();
    }
}

#[inline]
fn ramp_kernel<G: GainSource>(
    phase: &mut Fixed64,
    differential: Fixed64,
    shape: RampShape,
    left: &mut [f32],
    right: &mut [f32],
    gain: &G,
) {
    for (i, (l, r)) in left.iter_mut().zip(right.iter_mut()).enumerate() {
        let v = shape.value(*phase);
        let (gain_left, gain_right) = gain.at(i);
        *l += v * gain_left;
        *r += v * gain_right;
        *phase = (*phase + differential).wrapped();
    }
}

/// Index changes every sample: no precomputed shape.
#[inline]
fn varying_kernel<G: GainSource, I: IndexSource>(
    waveform: AlgorithmicWaveform,
    phase: &mut Fixed64,
    differential: Fixed64,
    index: &I,
    left: &mut [f32],
    right: &mut [f32],
    gain: &G,
) {
    for (i, (l, r)) in left.iter_mut().zip(right.iter_mut()).enumerate() {
        let v = match waveform {
            AlgorithmicWaveform::Pulse => pulse_wave(*phase, index.at(i)),
            AlgorithmicWaveform::Ramp => ramp_wave(*phase, index.at(i)),
        };
        let (gain_left, gain_right) = gain.at(i);
        *l += v * gain_left;
        *r += v * gain_right;
        *phase = (*phase + differential).wrapped();
    }
}

fn flat_kernel<G: GainSource>(
    waveform: AlgorithmicWaveform,
    phase: &mut Fixed64,
    differential: Fixed64,
    index: f64,
    left: &mut [f32],
    right: &mut [f32],
    gain: &G,
) {
    match waveform {
        AlgorithmicWaveform::Pulse => {
            pulse_kernel(phase, differential, index_threshold(index), left, right, gain);
        }
        AlgorithmicWaveform::Ramp => {
            ramp_kernel(phase, differential, RampShape::new(index), left, right, gain);
        }
    }
}

impl Oscillator for AlgorithmicOscillator {
    fn fix_up_pre_origin(&mut self, actual_pre_origin: i32) {
        self.core.fix_up_pre_origin(actual_pre_origin);
        self.index.fix_up_pre_origin(actual_pre_origin);
    }

    fn update_envelopes(&mut self, params: &SynthParams) -> Result<(), SynthError> {
        if !self.core.advance(params)? {
            return Ok(());
        }
        self.refresh_differential(params);
        self.index.update(self.core.frequency(), params)?;
        self.core.update_effects(params)
    }

    fn generate(
        &mut self,
        left: &mut [f32],
        right: &mut [f32],
        arena: &mut ScratchArena<'_>,
        params: &SynthParams,
    ) -> Result<(), SynthError> {
        if self.core.is_delayed() {
            return Ok(());
        }
        let Self {
            core,
            index,
            waveform,
            phase,
            differential,
            last_kernel,
        } = self;
        let (waveform, differential) = (*waveform, *differential);
        let kernel = AlgorithmicKernel::select(core.loudness_ramps(params), index, params);
        *last_kernel = kernel;
        core.render(left, right, arena, params, |core, left, right, arena| {
            let frames = left.len();
            match kernel {
                AlgorithmicKernel::NoSmoothing => {
                    let gain = core.flat_gain();
                    flat_kernel(waveform, phase, differential, index.current(), left, right, &gain);
                }
                AlgorithmicKernel::LoudnessVariant => {
                    let (mut lease, _) = arena.lease(2);
                    let [gain_left, gain_right] = lease.split::<2>();
                    let gain =
                        core.ramped_gain(&mut gain_left[..frames], &mut gain_right[..frames]);
                    flat_kernel(waveform, phase, differential, index.current(), left, right, &gain);
                }
                AlgorithmicKernel::BothVariant => {
                    let (mut lease, _) = arena.lease(3);
                    let [gain_left, gain_right, ramp] = lease.split::<3>();
                    let ramp = &mut ramp[..frames];
                    index.ramp_into(ramp, 1.0, true);
                    let gain =
                        core.ramped_gain(&mut gain_left[..frames], &mut gain_right[..frames]);
                    let ramp: &[f32] = ramp;
                    varying_kernel(waveform, phase, differential, &ramp, left, right, &gain);
                }
            }
            Ok(())
        })
    }

    fn is_finished(&self) -> bool {
        self.core.loudness().is_at_end()
    }

    fn key_up_sustain(&mut self, n: usize) {
        self.core.key_up_sustain(n);
        self.index.key_up_sustain(n);
    }

    fn restart(&mut self, note: &NoteContext, params: &SynthParams) {
        self.core.restart(note, params);
        self.index.retrigger_from_origin(&note.accents, params);
    }
}
