//! Oscillator lifecycle shared by every oscillator kind.
//!
//! An oscillator lives as an immutable [`OscillatorTemplate`] built once per
//! instrument and a mutable [`OscillatorState`] created per note. The state
//! goes through a fixed sequence:
//!
//! 1. `new_state` reports how many pre-origin ticks the note's envelopes need
//! 2. [`Oscillator::fix_up_pre_origin`] is called exactly once
//! 3. every envelope tick, [`Oscillator::update_envelopes`] then
//!    [`Oscillator::generate`] for the frames of that tick
//! 4. [`OscillatorState::finalize`] once [`Oscillator::is_finished`] reports
//!    true
//!
//! `generate` always adds into the caller's buffers. With an effect chain
//! attached the oscillator renders into zeroed scratch regions, runs the
//! chain there, and accumulates the result.
//!
//! Every tick updates pitch, then loudness, then the kind's own parameters,
//! then the effect chain. The first failure aborts the tick and is returned
//! unchanged; parameters not reached keep their previous block value.

use alloc::boxed::Box;
use alloc::format;
use sonant_core::vector::{add_into, zero};
use sonant_core::{
    BuildError, ModulatedParam, ModulatedParamTemplate, NoteContext, ScratchArena, SynthError,
    SynthParams, pan_split,
};
use sonant_effects::{EffectChain, EffectChainTemplate};

use crate::algorithmic::{AlgorithmicOscillator, AlgorithmicTemplate};
use crate::fm::{FmOscillator, FmSynthTemplate};
use crate::pluggable::{PluggableOscillator, PluggableOscillatorTemplate};
use crate::pool::FreeLists;
use crate::sample::{SampleOscillator, SampleTemplate};

/// Settings every oscillator kind shares.
#[derive(Clone, Debug)]
pub struct OscillatorCommon {
    /// Numerator of the note frequency ratio.
    pub frequency_multiplier: f64,
    /// Denominator of the note frequency ratio.
    pub frequency_divisor: f64,
    /// Hz added after the ratio.
    pub frequency_adder: f64,
    /// Added to the note's stereo position.
    pub stereo_bias: f64,
    /// Seconds before the oscillator starts sounding.
    pub time_displacement: f64,
    /// Fixed output gain.
    pub output_loudness: f64,
    /// Loudness envelope and LFOs.
    pub loudness: ModulatedParamTemplate,
    /// Pitch ratio envelope and LFOs, 1.0 for the note's own pitch.
    pub pitch: ModulatedParamTemplate,
    /// Effects run over this oscillator's output alone.
    pub effects: EffectChainTemplate,
}

impl Default for OscillatorCommon {
    fn default() -> Self {
        Self {
            frequency_multiplier: 1.0,
            frequency_divisor: 1.0,
            frequency_adder: 0.0,
            stereo_bias: 0.0,
            time_displacement: 0.0,
            output_loudness: 1.0,
            loudness: ModulatedParamTemplate::constant(1.0),
            pitch: ModulatedParamTemplate::constant(1.0),
            effects: EffectChainTemplate::new(),
        }
    }
}

impl OscillatorCommon {
    /// Sets the loudness chain.
    #[must_use]
    pub fn with_loudness(mut self, loudness: ModulatedParamTemplate) -> Self {
        self.loudness = loudness;
        self
    }

    /// Sets the pitch chain.
    #[must_use]
    pub fn with_pitch(mut self, pitch: ModulatedParamTemplate) -> Self {
        self.pitch = pitch;
        self
    }

    /// Sets the effect chain.
    #[must_use]
    pub fn with_effects(mut self, effects: EffectChainTemplate) -> Self {
        self.effects = effects;
        self
    }

    /// Sets the frequency ratio.
    #[must_use]
    pub fn with_ratio(mut self, multiplier: f64, divisor: f64) -> Self {
        self.frequency_multiplier = multiplier;
        self.frequency_divisor = divisor;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), BuildError> {
        let ratio = self.frequency_multiplier / self.frequency_divisor;
        if !ratio.is_finite() {
            return Err(BuildError::InvalidConfig(format!(
                "frequency ratio {}/{} is not finite",
                self.frequency_multiplier, self.frequency_divisor
            )));
        }
        if !self.time_displacement.is_finite() {
            return Err(BuildError::InvalidConfig("time displacement is not finite".into()));
        }
        Ok(())
    }
}

/// Per-sample left/right gain.
pub(crate) trait GainSource {
    fn at(&self, i: usize) -> (f32, f32);
}

/// Same gain for the whole block.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FlatGain {
    left: f32,
    right: f32,
}

impl GainSource for FlatGain {
    #[inline(always)]
    fn at(&self, _i: usize) -> (f32, f32) {
        (self.left, self.right)
    }
}

/// Gain ramped across the block.
pub(crate) struct RampedGain<'a> {
    left: &'a [f32],
    right: &'a [f32],
}

impl GainSource for RampedGain<'_> {
    #[inline(always)]
    fn at(&self, i: usize) -> (f32, f32) {
        (self.left[i], self.right[i])
    }
}

/// Pitch, loudness, panning, start delay and effects of one voice.
#[derive(Debug)]
pub(crate) struct VoiceCore {
    loudness: ModulatedParam,
    pitch: ModulatedParam,
    effects: Option<EffectChain>,
    output_loudness: f64,
    note_loudness: f64,
    stereo_bias: f64,
    stereo_position: f64,
    initial_frequency: f64,
    ratio: f64,
    adder: f64,
    frequency: f64,
    pitch_lfo_ticks: u32,
    bypassing_pitch_lfos: bool,
    delay_ticks: u32,
    started: bool,
}

impl VoiceCore {
    pub(crate) fn new(
        common: &OscillatorCommon,
        note: &NoteContext,
        params: &SynthParams,
    ) -> Result<(Self, i32), SynthError> {
        let (loudness, loudness_pre) =
            common.loudness.new_state(&note.accents, note.hurry_up, params)?;
        let (pitch, pitch_pre) = common.pitch.new_state(&note.accents, note.hurry_up, params)?;
        let mut pre_origin = loudness_pre.max(pitch_pre);
        let effects = if common.effects.is_empty() {
            None
        } else {
            let (chain, chain_pre) = common.effects.new_state(note, params)?;
            pre_origin = pre_origin.max(chain_pre);
            Some(chain)
        };

        let ratio = common.frequency_multiplier / common.frequency_divisor;
        let delay = common.time_displacement * params.envelope_rate / note.time_scale();
        let mut core = Self {
            loudness,
            pitch,
            effects,
            output_loudness: common.output_loudness,
            note_loudness: 0.0,
            stereo_bias: common.stereo_bias,
            stereo_position: note.stereo_position + common.stereo_bias,
            initial_frequency: note.initial_frequency,
            ratio,
            adder: common.frequency_adder,
            frequency: 0.0,
            pitch_lfo_ticks: note.pitch_lfo_startup_ticks,
            bypassing_pitch_lfos: false,
            delay_ticks: if delay > 0.0 { libm::round(delay) as u32 } else { 0 },
            started: false,
        };
        core.set_note_loudness(note.loudness, params);
        core.frequency = core.frequency_for(core.pitch.current());
        Ok((core, pre_origin))
    }

    fn set_note_loudness(&mut self, loudness: f64, params: &SynthParams) {
        self.note_loudness = loudness * self.output_loudness * params.overall_volume_scaling;
    }

    fn frequency_for(&self, pitch: f64) -> f64 {
        self.initial_frequency * pitch * self.ratio + self.adder
    }

    /// Advances pitch then loudness; false while the start is delayed.
    pub(crate) fn advance(&mut self, params: &SynthParams) -> Result<bool, SynthError> {
        if self.delay_ticks > 0 {
            self.delay_ticks -= 1;
            return Ok(false);
        }
        self.started = true;
        self.bypassing_pitch_lfos = self.pitch_lfo_ticks > 0;
        let pitch = if self.bypassing_pitch_lfos {
            self.pitch_lfo_ticks -= 1;
            self.pitch.update_envelope_only(params)?
        } else {
            self.pitch.update(self.frequency, params)?
        };
        self.frequency = self.frequency_for(pitch);
        self.loudness.update(self.frequency, params)?;
        Ok(true)
    }

    pub(crate) fn update_effects(&mut self, params: &SynthParams) -> Result<(), SynthError> {
        match &mut self.effects {
            Some(chain) => chain.osc_update_envelopes(self.frequency, params),
            None => Ok(()),
        }
    }

    /// Note frequency after pitch envelope, ratio and adder.
    pub(crate) fn frequency(&self) -> f64 {
        self.frequency
    }

    /// True during this tick when pitch LFOs were skipped.
    pub(crate) fn bypassing_pitch_lfos(&self) -> bool {
        self.bypassing_pitch_lfos
    }

    /// True until the first tick past the start delay.
    pub(crate) fn is_delayed(&self) -> bool {
        !self.started
    }

    pub(crate) fn loudness(&self) -> &ModulatedParam {
        &self.loudness
    }

    /// True when the loudness envelope ended on exactly zero.
    pub(crate) fn is_loudness_silent(&self) -> bool {
        self.loudness.is_at_end() && self.loudness.current() == 0.0
    }

    fn pan_scales(&self) -> (f32, f32) {
        pan_split(self.note_loudness as f32, self.stereo_position as f32)
    }

    /// True when this block's loudness must ramp.
    pub(crate) fn loudness_ramps(&self, params: &SynthParams) -> bool {
        params.interpolate_over_time
            && self.loudness.changed()
            && !self.loudness.is_sample_and_hold()
    }

    pub(crate) fn flat_gain(&self) -> FlatGain {
        let (left, right) = self.pan_scales();
        let current = self.loudness.current() as f32;
        FlatGain {
            left: current * left,
            right: current * right,
        }
    }

    pub(crate) fn ramped_gain<'a>(
        &self,
        left: &'a mut [f32],
        right: &'a mut [f32],
    ) -> RampedGain<'a> {
        let (scale_left, scale_right) = self.pan_scales();
        self.loudness.ramp_into(left, f64::from(scale_left), true);
        self.loudness.ramp_into(right, f64::from(scale_right), true);
        RampedGain { left, right }
    }

    pub(crate) fn fix_up_pre_origin(&mut self, actual_pre_origin: i32) {
        self.loudness.fix_up_pre_origin(actual_pre_origin);
        self.pitch.fix_up_pre_origin(actual_pre_origin);
        if let Some(chain) = &mut self.effects {
            chain.fix_up_pre_origin(actual_pre_origin);
        }
    }

    pub(crate) fn key_up_sustain(&mut self, n: usize) {
        self.loudness.key_up_sustain(n);
        self.pitch.key_up_sustain(n);
        if let Some(chain) = &mut self.effects {
            chain.key_up_sustain(n);
        }
    }

    pub(crate) fn restart(&mut self, note: &NoteContext, params: &SynthParams) {
        self.set_note_loudness(note.loudness, params);
        self.stereo_position = note.stereo_position + self.stereo_bias;
        self.loudness.retrigger_from_origin(&note.accents, params);
        self.pitch.retrigger_from_origin(&note.accents, params);
        if let Some(chain) = &mut self.effects {
            chain.retrigger_from_origin(&note.accents, params);
        }
    }

    /// Renders through the effect chain when there is one.
    ///
    /// Without effects `render` adds straight into `left`/`right`. With
    /// effects it renders into two zeroed scratch regions, the chain runs
    /// over them, and they are accumulated into `left`/`right`.
    pub(crate) fn render<F>(
        &mut self,
        left: &mut [f32],
        right: &mut [f32],
        arena: &mut ScratchArena<'_>,
        params: &SynthParams,
        render: F,
    ) -> Result<(), SynthError>
    where
        F: FnOnce(&Self, &mut [f32], &mut [f32], &mut ScratchArena<'_>) -> Result<(), SynthError>,
    {
        debug_assert_eq!(left.len(), right.len(), "channel lengths differ");
        let Some(mut chain) = self.effects.take() else {
            return render(&*self, left, right, arena);
        };
        let frames = left.len();
        let (mut lease, mut rest) = arena.lease(2);
        let [private_left, private_right] = lease.split::<2>();
        let (private_left, private_right) =
            (&mut private_left[..frames], &mut private_right[..frames]);
        zero(private_left);
        zero(private_right);
        let mut result = render(&*self, &mut *private_left, &mut *private_right, &mut rest);
        if result.is_ok() {
            result = chain.apply(private_left, private_right, &mut rest, params);
        }
        self.effects = Some(chain);
        result?;
        add_into(private_left, left);
        add_into(private_right, right);
        Ok(())
    }
}

/// Per-note oscillator lifecycle.
pub trait Oscillator {
    /// Aligns every envelope and LFO to the scheduler's pre-origin; called
    /// exactly once before the first update.
    fn fix_up_pre_origin(&mut self, actual_pre_origin: i32);

    /// Advances every block-rate parameter by one envelope tick.
    fn update_envelopes(&mut self, params: &SynthParams) -> Result<(), SynthError>;

    /// Adds one block of output into `left` and `right`.
    fn generate(
        &mut self,
        left: &mut [f32],
        right: &mut [f32],
        arena: &mut ScratchArena<'_>,
        params: &SynthParams,
    ) -> Result<(), SynthError>;

    /// True once the oscillator will never sound again.
    fn is_finished(&self) -> bool;

    /// Releases sustain point `n` (1 to 3).
    fn key_up_sustain(&mut self, n: usize);

    /// Retriggers every envelope and LFO from its origin for a new note.
    fn restart(&mut self, note: &NoteContext, params: &SynthParams);
}

/// Immutable oscillator definition.
#[derive(Clone, Debug)]
pub enum OscillatorTemplate {
    /// Recorded sample playback.
    Sample(SampleTemplate),
    /// Pulse and ramp waveforms computed from phase.
    Algorithmic(AlgorithmicTemplate),
    /// Statement-programmed FM network.
    FmSynth(FmSynthTemplate),
    /// Host-defined processor.
    Pluggable(PluggableOscillatorTemplate),
}

impl From<SampleTemplate> for OscillatorTemplate {
    fn from(template: SampleTemplate) -> Self {
        Self::Sample(template)
    }
}

impl From<AlgorithmicTemplate> for OscillatorTemplate {
    fn from(template: AlgorithmicTemplate) -> Self {
        Self::Algorithmic(template)
    }
}

impl From<FmSynthTemplate> for OscillatorTemplate {
    fn from(template: FmSynthTemplate) -> Self {
        Self::FmSynth(template)
    }
}

impl From<PluggableOscillatorTemplate> for OscillatorTemplate {
    fn from(template: PluggableOscillatorTemplate) -> Self {
        Self::Pluggable(template)
    }
}

impl OscillatorTemplate {
    /// Creates the per-note state, reusing pooled storage where it exists.
    ///
    /// Returns the state and the number of pre-origin ticks it needs.
    pub fn new_state(
        &self,
        note: &NoteContext,
        params: &SynthParams,
        pools: &mut FreeLists,
    ) -> Result<(OscillatorState, i32), SynthError> {
        let (state, pre_origin) = match self {
            Self::Sample(t) => {
                let (state, pre) = t.new_state(note, params)?;
                (OscillatorState::Sample(pools.sample.checkout(state)), pre)
            }
            Self::Algorithmic(t) => {
                let (state, pre) = t.new_state(note, params)?;
                (OscillatorState::Algorithmic(pools.algorithmic.checkout(state)), pre)
            }
            Self::FmSynth(t) => {
                let (state, pre) = t.new_state(note, params)?;
                (OscillatorState::FmSynth(pools.fm.checkout(state)), pre)
            }
            Self::Pluggable(t) => {
                let (state, pre) = t.new_state(note, params)?;
                (OscillatorState::Pluggable(Box::new(state)), pre)
            }
        };
        #[cfg(feature = "tracing")]
        tracing::debug!(kind = state.kind_name(), pre_origin, "oscillator state created");
        Ok((state, pre_origin))
    }
}

/// Per-note oscillator.
#[derive(Debug)]
pub enum OscillatorState {
    /// Recorded sample playback.
    Sample(Box<SampleOscillator>),
    /// Pulse and ramp waveforms.
    Algorithmic(Box<AlgorithmicOscillator>),
    /// FM statement network.
    FmSynth(Box<FmOscillator>),
    /// Host-defined processor.
    Pluggable(Box<PluggableOscillator>),
}

impl OscillatorState {
    fn as_dyn(&self) -> &dyn Oscillator {
        match self {
            Self::Sample(s) => s.as_ref(),
            Self::Algorithmic(s) => s.as_ref(),
            Self::FmSynth(s) => s.as_ref(),
            Self::Pluggable(s) => s.as_ref(),
        }
    }

    fn as_dyn_mut(&mut self) -> &mut dyn Oscillator {
        match self {
            Self::Sample(s) => s.as_mut(),
            Self::Algorithmic(s) => s.as_mut(),
            Self::FmSynth(s) => s.as_mut(),
            Self::Pluggable(s) => s.as_mut(),
        }
    }

    /// Short name of the oscillator kind.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Sample(_) => "sample",
            Self::Algorithmic(_) => "algorithmic",
            Self::FmSynth(_) => "fm",
            Self::Pluggable(_) => "pluggable",
        }
    }

    /// Ends the note, returning pooled storage.
    pub fn finalize(self, pools: &mut FreeLists) {
        #[cfg(feature = "tracing")]
        tracing::debug!(kind = self.kind_name(), "oscillator finalized");
        match self {
            Self::Sample(s) => pools.sample.give_back(s),
            Self::Algorithmic(s) => pools.algorithmic.give_back(s),
            Self::FmSynth(s) => pools.fm.give_back(s),
            Self::Pluggable(_) => {}
        }
    }
}

impl Oscillator for OscillatorState {
    fn fix_up_pre_origin(&mut self, actual_pre_origin: i32) {
        self.as_dyn_mut().fix_up_pre_origin(actual_pre_origin);
    }

    fn update_envelopes(&mut self, params: &SynthParams) -> Result<(), SynthError> {
        self.as_dyn_mut().update_envelopes(params)
    }

    fn generate(
        &mut self,
        left: &mut [f32],
        right: &mut [f32],
        arena: &mut ScratchArena<'_>,
        params: &SynthParams,
    ) -> Result<(), SynthError> {
        self.as_dyn_mut().generate(left, right, arena, params)
    }

    fn is_finished(&self) -> bool {
        self.as_dyn().is_finished()
    }

    fn key_up_sustain(&mut self, n: usize) {
        self.as_dyn_mut().key_up_sustain(n);
    }

    fn restart(&mut self, note: &NoteContext, params: &SynthParams) {
        self.as_dyn_mut().restart(note, params);
    }
}
