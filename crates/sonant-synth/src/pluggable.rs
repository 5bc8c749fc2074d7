//! Host-defined processors as oscillators.
//!
//! The processor renders into zeroed scratch regions; the result is panned
//! and scaled by the loudness envelope, then added to the output. Note
//! loudness reaches the processor only through its loudness-role parameter.

use sonant_core::{
    BuildError, NoteContext, PluggableDriver, PluggableDriverTemplate, ScratchArena, SynthError,
    SynthParams,
};
use sonant_core::vector::zero;

use crate::oscillator::{GainSource, Oscillator, OscillatorCommon, VoiceCore};

/// Pluggable oscillator definition.
#[derive(Clone, Debug)]
pub struct PluggableOscillatorTemplate {
    common: OscillatorCommon,
    driver: PluggableDriverTemplate,
}

impl PluggableOscillatorTemplate {
    /// Wraps a validated driver template.
    pub fn new(
        common: OscillatorCommon,
        driver: PluggableDriverTemplate,
    ) -> Result<Self, BuildError> {
        common.validate()?;
        Ok(Self { common, driver })
    }

    /// Shared settings.
    pub fn common(&self) -> &OscillatorCommon {
        &self.common
    }

    /// Processor name.
    pub fn name(&self) -> &str {
        self.driver.name()
    }

    pub(crate) fn new_state(
        &self,
        note: &NoteContext,
        params: &SynthParams,
    ) -> Result<(PluggableOscillator, i32), SynthError> {
        let unit = note.with_loudness(1.0);
        let (core, core_pre) = VoiceCore::new(&self.common, &unit, params)?;
        let (driver, driver_pre) = self.driver.new_state(
            &note.accents,
            note.loudness,
            core.frequency(),
            note.hurry_up,
            params,
        )?;
        Ok((PluggableOscillator { core, driver }, core_pre.max(driver_pre)))
    }
}

/// Per-note pluggable oscillator.
#[derive(Debug)]
pub struct PluggableOscillator {
    core: VoiceCore,
    driver: PluggableDriver,
}

impl PluggableOscillator {
    /// Current dynamic parameter values.
    pub fn values(&self) -> &[f64] {
        self.driver.values()
    }
}

fn mix<G: GainSource>(
    source_left: &[f32],
    source_right: &[f32],
    left: &mut [f32],
    right: &mut [f32],
    gain: &G,
) {
    for (i, (l, r)) in left.iter_mut().zip(right.iter_mut()).enumerate() {
        let (gain_left, gain_right) = gain.at(i);
        *l += source_left[i] * gain_left;
        *r += source_right[i] * gain_right;
    }
}

impl Oscillator for PluggableOscillator {
    fn fix_up_pre_origin(&mut self, actual_pre_origin: i32) {
        self.core.fix_up_pre_origin(actual_pre_origin);
        self.driver.fix_up_pre_origin(actual_pre_origin);
    }

    fn update_envelopes(&mut self, params: &SynthParams) -> Result<(), SynthError> {
        if !self.core.advance(params)? {
            return Ok(());
        }
        self.driver
            .update(self.core.frequency(), self.core.bypassing_pitch_lfos(), params)?;
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
        let Self { core, driver } = self;
        core.render(left, right, arena, params, |core, left, right, arena| {
            let frames = left.len();
            let (mut lease, mut rest) = arena.lease(4);
            let [voice_left, voice_right, gain_left, gain_right] = lease.split::<4>();
            let (voice_left, voice_right) = (&mut voice_left[..frames], &mut voice_right[..frames]);
            zero(voice_left);
            zero(voice_right);
            driver.apply(voice_left, voice_right, &mut rest, params)?;
            if core.loudness_ramps(params) {
                let gain = core.ramped_gain(&mut gain_left[..frames], &mut gain_right[..frames]);
                mix(voice_left, voice_right, left, right, &gain);
            } else {
                mix(voice_left, voice_right, left, right, &core.flat_gain());
            }
            Ok(())
        })
    }

    fn is_finished(&self) -> bool {
        self.driver.is_processor_finished() || self.driver.is_loudness_silent()
    }

    fn key_up_sustain(&mut self, n: usize) {
        self.core.key_up_sustain(n);
        self.driver.key_up_sustain(n);
    }

    fn restart(&mut self, note: &NoteContext, params: &SynthParams) {
        self.core.restart(&note.with_loudness(1.0), params);
        self.driver.retrigger_from_origin(&note.accents, params);
    }
}
