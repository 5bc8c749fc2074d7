//! Envelope and LFO contracts, and the envelope-plus-LFO parameter driver.
//!
//! Templates are immutable and shared by every voice (`Arc<dyn ...>`). Each
//! note asks a template for a fresh state cursor, which the voice owns
//! exclusively and advances once per envelope tick.
//!
//! A [`ModulatedParam`] is the unit every oscillator and effect works with:
//! one envelope whose output passes through an ordered chain of LFOs. It keeps
//! the previous and current tick values so generation kernels can ramp
//! between them across a block.
//!
//! # Lifecycle
//!
//! ```text
//! template.new_state(accents, hurry_up, params) -> (state, pre_origin)
//! state.fix_up_pre_origin(actual)      exactly once
//! loop { state.update(freq, params)?; ramp_into(block) }
//! ```

use crate::accent::Accents;
use crate::error::SynthError;
use crate::params::SynthParams;
use crate::vector::{additive_recurrence, fill, multiplicative_recurrence, same_sign_or_zero};
use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

/// Interpolation shape of an envelope segment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SegmentShape {
    /// Straight-line interpolation.
    #[default]
    Linear,
    /// Geometric (constant-ratio) interpolation.
    Exponential,
}

/// Per-note envelope cursor.
pub trait EnvelopeState: Send {
    /// Advances one tick and returns the new value.
    fn update(&mut self, params: &SynthParams) -> Result<f64, SynthError>;

    /// Value before the first tick.
    fn initial_value(&self) -> f64;

    /// Releases sustain point `n` (1-based, at most 3).
    fn key_up_sustain(&mut self, n: usize);

    /// Restarts from the origin point, keeping the current value as the start.
    fn retrigger_from_origin(&mut self, accents: &Accents, params: &SynthParams);

    /// Adds lead-in ticks so the origin lands `actual_pre_origin` ticks in.
    fn fix_up_initial_delay(&mut self, actual_pre_origin: i32);

    /// True once the last segment has completed.
    fn is_at_end(&self) -> bool;

    /// Shape of the segment being traversed.
    fn segment_shape(&self) -> SegmentShape;
}

/// Immutable envelope definition shared across voices.
pub trait EnvelopeTemplate: fmt::Debug + Send + Sync {
    /// Creates a cursor for a new note. Returns it with the number of ticks
    /// the envelope needs before its origin.
    fn new_state(
        &self,
        accents: &Accents,
        hurry_up: f64,
        params: &SynthParams,
    ) -> Result<(Box<dyn EnvelopeState>, i32), SynthError>;
}

/// Per-note LFO generator.
pub trait LfoState: Send {
    /// Advances one tick, modulating `value`.
    ///
    /// `oscillator_frequency` is the note's current frequency, for LFOs that
    /// track pitch.
    fn update_cycle(
        &mut self,
        value: f64,
        oscillator_frequency: f64,
        params: &SynthParams,
    ) -> Result<f64, SynthError>;

    /// `value` modulated by the generator's position before the first tick.
    fn initial_value(&self, value: f64) -> f64;

    /// Releases sustain point `n` of the generator's own envelopes.
    fn key_up_sustain(&mut self, n: usize);

    /// Restarts the generator's envelopes from their origin.
    fn retrigger_from_origin(&mut self, accents: &Accents, params: &SynthParams);

    /// Aligns the generator's envelopes to `actual_pre_origin`.
    fn fix_envelope_origins(&mut self, actual_pre_origin: i32);

    /// True for stepped output that must never be ramped.
    fn is_sample_and_hold(&self) -> bool;
}

/// Immutable LFO definition shared across voices.
pub trait LfoTemplate: fmt::Debug + Send + Sync {
    /// Creates a generator for a new note, with its pre-origin tick count.
    fn new_state(
        &self,
        accents: &Accents,
        hurry_up: f64,
        params: &SynthParams,
    ) -> Result<(Box<dyn LfoState>, i32), SynthError>;
}

/// Envelope template that always yields one accent-scaled value.
#[derive(Clone, Debug, Default)]
pub struct ConstantEnvelope {
    value: crate::accent::ScalarParam,
}

impl ConstantEnvelope {
    /// Creates a constant envelope.
    pub fn new(value: impl Into<crate::accent::ScalarParam>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

struct ConstantEnvelopeState {
    value: f64,
}

impl EnvelopeState for ConstantEnvelopeState {
    fn update(&mut self, _params: &SynthParams) -> Result<f64, SynthError> {
        Ok(self.value)
    }

    fn initial_value(&self) -> f64 {
        self.value
    }

    fn key_up_sustain(&mut self, _n: usize) {}

    fn retrigger_from_origin(&mut self, _accents: &Accents, _params: &SynthParams) {}

    fn fix_up_initial_delay(&mut self, _actual_pre_origin: i32) {}

    fn is_at_end(&self) -> bool {
        true
    }

    fn segment_shape(&self) -> SegmentShape {
        SegmentShape::Linear
    }
}

impl EnvelopeTemplate for ConstantEnvelope {
    fn new_state(
        &self,
        accents: &Accents,
        _hurry_up: f64,
        _params: &SynthParams,
    ) -> Result<(Box<dyn EnvelopeState>, i32), SynthError> {
        let value = self.value.evaluate(accents)?;
        Ok((Box::new(ConstantEnvelopeState { value }), 0))
    }
}

/// Envelope plus LFO chain definition.
#[derive(Clone, Debug)]
pub struct ModulatedParamTemplate {
    envelope: Arc<dyn EnvelopeTemplate>,
    lfos: Vec<Arc<dyn LfoTemplate>>,
}

impl ModulatedParamTemplate {
    /// An envelope with no LFOs.
    pub fn new(envelope: Arc<dyn EnvelopeTemplate>) -> Self {
        Self {
            envelope,
            lfos: Vec::new(),
        }
    }

    /// A constant value with no LFOs.
    pub fn constant(value: f64) -> Self {
        Self::new(Arc::new(ConstantEnvelope::new(value)))
    }

    /// Appends an LFO to the chain.
    #[must_use]
    pub fn with_lfo(mut self, lfo: Arc<dyn LfoTemplate>) -> Self {
        self.lfos.push(lfo);
        self
    }

    /// Creates the per-note state and reports its pre-origin tick count.
    pub fn new_state(
        &self,
        accents: &Accents,
        hurry_up: f64,
        params: &SynthParams,
    ) -> Result<(ModulatedParam, i32), SynthError> {
        let (envelope, mut pre_origin) = self.envelope.new_state(accents, hurry_up, params)?;
        let mut lfos = Vec::with_capacity(self.lfos.len());
        for template in &self.lfos {
            let (lfo, lfo_pre_origin) = template.new_state(accents, hurry_up, params)?;
            pre_origin = pre_origin.max(lfo_pre_origin);
            lfos.push(lfo);
        }
        let initial = lfos
            .iter()
            .fold(envelope.initial_value(), |value, lfo| lfo.initial_value(value));
        Ok((
            ModulatedParam {
                envelope,
                lfos,
                previous: initial,
                current: initial,
            },
            pre_origin,
        ))
    }
}

impl Default for ModulatedParamTemplate {
    fn default() -> Self {
        Self::constant(0.0)
    }
}

/// Per-note envelope plus LFO chain, with previous/current tick values.
pub struct ModulatedParam {
    envelope: Box<dyn EnvelopeState>,
    lfos: Vec<Box<dyn LfoState>>,
    previous: f64,
    current: f64,
}

impl ModulatedParam {
    /// A state that holds `value` forever.
    pub fn constant(value: f64) -> Self {
        Self {
            envelope: Box::new(ConstantEnvelopeState { value }),
            lfos: Vec::new(),
            previous: value,
            current: value,
        }
    }

    /// Advances the envelope and every LFO by one tick.
    ///
    /// On failure the first error is returned and both previous and current
    /// keep their values from the last successful tick.
    pub fn update(
        &mut self,
        oscillator_frequency: f64,
        params: &SynthParams,
    ) -> Result<f64, SynthError> {
        let mut value = self.envelope.update(params)?;
        for lfo in &mut self.lfos {
            value = lfo.update_cycle(value, oscillator_frequency, params)?;
        }
        self.previous = self.current;
        self.current = value;
        Ok(value)
    }

    /// Advances only the envelope, leaving the LFOs where they are.
    pub fn update_envelope_only(&mut self, params: &SynthParams) -> Result<f64, SynthError> {
        let value = self.envelope.update(params)?;
        self.previous = self.current;
        self.current = value;
        Ok(value)
    }

    /// Value after the previous tick.
    pub fn previous(&self) -> f64 {
        self.previous
    }

    /// Value after the latest tick.
    pub fn current(&self) -> f64 {
        self.current
    }

    /// True when the latest tick moved the value.
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }

    /// Shape of the envelope's current segment.
    pub fn segment_shape(&self) -> SegmentShape {
        self.envelope.segment_shape()
    }

    /// True when any LFO in the chain is sample-and-hold.
    pub fn is_sample_and_hold(&self) -> bool {
        self.lfos.iter().any(|lfo| lfo.is_sample_and_hold())
    }

    /// True once the envelope has completed.
    pub fn is_at_end(&self) -> bool {
        self.envelope.is_at_end()
    }

    /// Aligns the envelope and every LFO to `actual_pre_origin`.
    pub fn fix_up_pre_origin(&mut self, actual_pre_origin: i32) {
        self.envelope.fix_up_initial_delay(actual_pre_origin);
        for lfo in &mut self.lfos {
            lfo.fix_envelope_origins(actual_pre_origin);
        }
    }

    /// Releases sustain point `n` everywhere in the chain.
    pub fn key_up_sustain(&mut self, n: usize) {
        self.envelope.key_up_sustain(n);
        for lfo in &mut self.lfos {
            lfo.key_up_sustain(n);
        }
    }

    /// Restarts the chain from its origin.
    pub fn retrigger_from_origin(&mut self, accents: &Accents, params: &SynthParams) {
        self.envelope.retrigger_from_origin(accents, params);
        for lfo in &mut self.lfos {
            lfo.retrigger_from_origin(accents, params);
        }
    }

    /// Writes the per-sample values for one block into `target`.
    ///
    /// The block ramps from `previous * scale` to `current * scale`. It is
    /// constant when smoothing is off, when the value did not change, or when
    /// the chain is sample-and-hold. Exponential segments ramp geometrically
    /// as long as both endpoints share a sign.
    pub fn ramp_into(&self, target: &mut [f32], scale: f64, smoothing: bool) {
        let end = (self.current * scale) as f32;
        if !smoothing || !self.changed() || self.is_sample_and_hold() {
            fill(target, end);
            return;
        }
        let start = (self.previous * scale) as f32;
        ramp(target, start, end, self.segment_shape());
    }
}

impl Default for ModulatedParam {
    fn default() -> Self {
        Self::constant(0.0)
    }
}

impl fmt::Debug for ModulatedParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModulatedParam")
            .field("previous", &self.previous)
            .field("current", &self.current)
            .field("lfos", &self.lfos.len())
            .finish_non_exhaustive()
    }
}

/// Ramp from just after `start` to exactly `end`, additive or geometric by
/// `shape`.
pub fn ramp(target: &mut [f32], start: f32, end: f32, shape: SegmentShape) {
    if shape == SegmentShape::Exponential && same_sign_or_zero(start, end) {
        multiplicative_recurrence(target, start, end);
    } else {
        additive_recurrence(target, start, end);
    }
}
