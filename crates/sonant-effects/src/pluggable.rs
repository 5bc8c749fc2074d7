//! Host-defined processors used as effects.
//!
//! A thin lifecycle adapter over [`PluggableDriver`]: the driver does all
//! parameter marshaling, this type fits it into oscillator chains and tracks.

use sonant_core::{
    Accents, NoteContext, PluggableDriver, PluggableDriverTemplate, ScratchArena, SynthError,
    SynthParams,
};

/// Immutable pluggable effect definition.
#[derive(Clone, Debug)]
pub struct PluggableEffectTemplate {
    driver: PluggableDriverTemplate,
}

impl PluggableEffectTemplate {
    /// Wraps a validated driver template.
    pub fn new(driver: PluggableDriverTemplate) -> Self {
        Self { driver }
    }

    /// Processor name.
    pub fn name(&self) -> &str {
        self.driver.name()
    }

    /// Creates the processor for one note.
    ///
    /// Pitch-role parameters start from the note's initial frequency.
    pub fn new_state(
        &self,
        note: &NoteContext,
        params: &SynthParams,
    ) -> Result<(PluggableEffect, i32), SynthError> {
        let (driver, pre_origin) = self.driver.new_state(
            &note.accents,
            note.loudness,
            note.initial_frequency,
            note.hurry_up,
            params,
        )?;
        Ok((PluggableEffect { driver }, pre_origin))
    }
}

/// Per-note (or per-track) pluggable effect.
#[derive(Debug)]
pub struct PluggableEffect {
    driver: PluggableDriver,
}

impl PluggableEffect {
    /// Advances the dynamic parameters one tick.
    pub fn update(&mut self, frequency: f64, params: &SynthParams) -> Result<(), SynthError> {
        self.driver.update(frequency, false, params)
    }

    /// Runs the processor over one block in place.
    pub fn apply(
        &mut self,
        left: &mut [f32],
        right: &mut [f32],
        arena: &mut ScratchArena<'_>,
        params: &SynthParams,
    ) -> Result<(), SynthError> {
        self.driver.apply(left, right, arena, params)
    }

    /// Current dynamic parameter values.
    pub fn values(&self) -> &[f64] {
        self.driver.values()
    }

    /// Aligns the parameter chains to `actual_pre_origin`.
    pub fn fix_up_pre_origin(&mut self, actual_pre_origin: i32) {
        self.driver.fix_up_pre_origin(actual_pre_origin);
    }

    /// Releases sustain point `n`.
    pub fn key_up_sustain(&mut self, n: usize) {
        self.driver.key_up_sustain(n);
    }

    /// Restarts the parameter chains from their origin.
    pub fn retrigger_from_origin(&mut self, accents: &Accents, params: &SynthParams) {
        self.driver.retrigger_from_origin(accents, params);
    }
}
