//! Oscillator effect chains and track effects.
//!
//! Both are closed sums over the three effect kinds; only the pluggable
//! variant is open, through the processor trait it wraps.
//!
//! - [`EffectChain`] belongs to one note. Its controls are envelope/LFO chains
//!   advanced by [`EffectChain::osc_update_envelopes`] every tick, and its
//!   pre-origin is folded into the oscillator's.
//! - [`TrackEffect`] lives as long as a track. Its controls are accent-scaled
//!   constants re-evaluated by [`TrackEffect::track_update_state`].

use alloc::vec::Vec;
use sonant_core::{Accents, BuildError, NoteContext, ScratchArena, SynthError, SynthParams};

use crate::compressor::{CompressorPlacement, CompressorState, CompressorTemplate};
use crate::pluggable::{PluggableEffect, PluggableEffectTemplate};
use crate::vocoder::{VocoderPlacement, VocoderState, VocoderTemplate};

/// One effect in an oscillator chain.
#[derive(Clone, Debug)]
pub enum OscEffectTemplate {
    /// Dynamics compressor.
    Compressor(CompressorTemplate),
    /// Band-pass filter bank.
    Vocoder(VocoderTemplate),
    /// Host-defined processor.
    Pluggable(PluggableEffectTemplate),
}

impl From<CompressorTemplate> for OscEffectTemplate {
    fn from(template: CompressorTemplate) -> Self {
        Self::Compressor(template)
    }
}

impl From<VocoderTemplate> for OscEffectTemplate {
    fn from(template: VocoderTemplate) -> Self {
        Self::Vocoder(template)
    }
}

impl From<PluggableEffectTemplate> for OscEffectTemplate {
    fn from(template: PluggableEffectTemplate) -> Self {
        Self::Pluggable(template)
    }
}

impl OscEffectTemplate {
    /// Creates the per-note effect and its pre-origin ticks.
    pub fn new_state(
        &self,
        note: &NoteContext,
        params: &SynthParams,
    ) -> Result<(OscEffect, i32), SynthError> {
        Ok(match self {
            Self::Compressor(t) => {
                let (state, pre) = t.new_state(&note.accents, note.hurry_up, params)?;
                (OscEffect::Compressor(state), pre)
            }
            Self::Vocoder(t) => {
                let (state, pre) = t.new_state(&note.accents, note.hurry_up, params)?;
                (OscEffect::Vocoder(state), pre)
            }
            Self::Pluggable(t) => {
                let (state, pre) = t.new_state(note, params)?;
                (OscEffect::Pluggable(state), pre)
            }
        })
    }
}

/// Per-note effect state.
#[derive(Debug)]
pub enum OscEffect {
    /// Dynamics compressor.
    Compressor(CompressorState),
    /// Band-pass filter bank.
    Vocoder(VocoderState),
    /// Host-defined processor.
    Pluggable(PluggableEffect),
}

impl OscEffect {
    /// Advances control chains one tick.
    pub fn osc_update_envelopes(
        &mut self,
        frequency: f64,
        params: &SynthParams,
    ) -> Result<(), SynthError> {
        match self {
            Self::Compressor(s) => s.osc_update_envelopes(frequency, params),
            Self::Vocoder(s) => s.osc_update_envelopes(frequency, params),
            Self::Pluggable(s) => s.update(frequency, params),
        }
    }

    /// Processes one block in place.
    pub fn apply(
        &mut self,
        left: &mut [f32],
        right: &mut [f32],
        arena: &mut ScratchArena<'_>,
        params: &SynthParams,
    ) -> Result<(), SynthError> {
        match self {
            Self::Compressor(s) => s.apply(left, right, arena, params),
            Self::Vocoder(s) => s.apply(left, right, arena, params),
            Self::Pluggable(s) => s.apply(left, right, arena, params),
        }
    }

    /// Aligns control chains to `actual_pre_origin`.
    pub fn fix_up_pre_origin(&mut self, actual_pre_origin: i32) {
        match self {
            Self::Compressor(s) => s.fix_up_pre_origin(actual_pre_origin),
            Self::Vocoder(s) => s.fix_up_pre_origin(actual_pre_origin),
            Self::Pluggable(s) => s.fix_up_pre_origin(actual_pre_origin),
        }
    }

    /// Releases sustain point `n`.
    pub fn key_up_sustain(&mut self, n: usize) {
        match self {
            Self::Compressor(s) => s.key_up_sustain(n),
            Self::Vocoder(s) => s.key_up_sustain(n),
            Self::Pluggable(s) => s.key_up_sustain(n),
        }
    }

    /// Restarts control chains from their origin.
    pub fn retrigger_from_origin(&mut self, accents: &Accents, params: &SynthParams) {
        match self {
            Self::Compressor(s) => s.retrigger_from_origin(accents, params),
            Self::Vocoder(s) => s.retrigger_from_origin(accents, params),
            Self::Pluggable(s) => s.retrigger_from_origin(accents, params),
        }
    }
}

/// Ordered effects applied to one oscillator's output.
#[derive(Clone, Debug, Default)]
pub struct EffectChainTemplate {
    effects: Vec<OscEffectTemplate>,
}

impl EffectChainTemplate {
    /// Empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an effect.
    pub fn with(mut self, effect: impl Into<OscEffectTemplate>) -> Self {
        self.effects.push(effect.into());
        self
    }

    /// Number of effects.
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    /// True without effects.
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Creates every effect for one note; the pre-origin is the largest of
    /// the effects'.
    pub fn new_state(
        &self,
        note: &NoteContext,
        params: &SynthParams,
    ) -> Result<(EffectChain, i32), SynthError> {
        let mut effects = Vec::with_capacity(self.effects.len());
        let mut pre_origin = 0;
        for template in &self.effects {
            let (effect, pre) = template.new_state(note, params)?;
            pre_origin = pre_origin.max(pre);
            effects.push(effect);
        }
        Ok((EffectChain { effects }, pre_origin))
    }
}

/// Per-note effect chain.
#[derive(Debug)]
pub struct EffectChain {
    effects: Vec<OscEffect>,
}

impl EffectChain {
    /// The effects, in processing order.
    pub fn effects(&self) -> &[OscEffect] {
        &self.effects
    }

    /// Advances every effect one tick, stopping at the first failure.
    pub fn osc_update_envelopes(
        &mut self,
        frequency: f64,
        params: &SynthParams,
    ) -> Result<(), SynthError> {
        self.effects
            .iter_mut()
            .try_for_each(|e| e.osc_update_envelopes(frequency, params))
    }

    /// Runs every effect over the block in order.
    pub fn apply(
        &mut self,
        left: &mut [f32],
        right: &mut [f32],
        arena: &mut ScratchArena<'_>,
        params: &SynthParams,
    ) -> Result<(), SynthError> {
        for effect in &mut self.effects {
            effect.apply(left, right, arena, params)?;
        }
        Ok(())
    }

    /// Aligns every effect to `actual_pre_origin`.
    pub fn fix_up_pre_origin(&mut self, actual_pre_origin: i32) {
        for effect in &mut self.effects {
            effect.fix_up_pre_origin(actual_pre_origin);
        }
    }

    /// Releases sustain point `n` on every effect.
    pub fn key_up_sustain(&mut self, n: usize) {
        for effect in &mut self.effects {
            effect.key_up_sustain(n);
        }
    }

    /// Restarts every effect from its origin.
    pub fn retrigger_from_origin(&mut self, accents: &Accents, params: &SynthParams) {
        for effect in &mut self.effects {
            effect.retrigger_from_origin(accents, params);
        }
    }
}

#[derive(Clone, Debug)]
enum TrackKind {
    Compressor(CompressorTemplate),
    Vocoder(VocoderTemplate),
    Pluggable(PluggableEffectTemplate),
}

/// Track-level effect definition.
///
/// Compressors and vocoders must use track placement: nothing advances
/// envelope controls on a track.
#[derive(Clone, Debug)]
pub struct TrackEffectTemplate {
    kind: TrackKind,
}

impl TrackEffectTemplate {
    /// Track compressor; peak lookahead is allowed here.
    pub fn compressor(template: CompressorTemplate) -> Result<Self, BuildError> {
        if !matches!(template.placement(), CompressorPlacement::Track(_)) {
            return Err(BuildError::InvalidConfig(
                "track compressor needs accent-scaled controls".into(),
            ));
        }
        Ok(Self {
            kind: TrackKind::Compressor(template),
        })
    }

    /// Track vocoder.
    pub fn vocoder(template: VocoderTemplate) -> Result<Self, BuildError> {
        if !matches!(template.placement(), VocoderPlacement::Track(_)) {
            return Err(BuildError::InvalidConfig(
                "track vocoder needs accent-scaled controls".into(),
            ));
        }
        Ok(Self {
            kind: TrackKind::Vocoder(template),
        })
    }

    /// Track pluggable processor; pitch-role parameters see zero frequency.
    pub fn pluggable(template: PluggableEffectTemplate) -> Self {
        Self {
            kind: TrackKind::Pluggable(template),
        }
    }

    /// Creates the track's effect state.
    pub fn new_state(
        &self,
        accents: &Accents,
        params: &SynthParams,
    ) -> Result<TrackEffect, SynthError> {
        let effect = match &self.kind {
            TrackKind::Compressor(t) => {
                TrackEffect::Compressor(t.new_state(accents, 1.0, params)?.0)
            }
            TrackKind::Vocoder(t) => TrackEffect::Vocoder(t.new_state(accents, 1.0, params)?.0),
            TrackKind::Pluggable(t) => {
                let note = NoteContext::new(0.0).with_accents(*accents);
                let (mut state, pre_origin) = t.new_state(&note, params)?;
                state.fix_up_pre_origin(pre_origin);
                TrackEffect::Pluggable(state)
            }
        };
        #[cfg(feature = "tracing")]
        tracing::debug!(effect = effect.kind_name(), "track effect created");
        Ok(effect)
    }
}

/// Per-track effect state.
#[derive(Debug)]
pub enum TrackEffect {
    /// Dynamics compressor.
    Compressor(CompressorState),
    /// Band-pass filter bank.
    Vocoder(VocoderState),
    /// Host-defined processor.
    Pluggable(PluggableEffect),
}

impl TrackEffect {
    /// Re-evaluates controls once per tick.
    pub fn track_update_state(
        &mut self,
        accents: &Accents,
        params: &SynthParams,
    ) -> Result<(), SynthError> {
        match self {
            Self::Compressor(s) => s.track_update_state(accents, params),
            Self::Vocoder(s) => s.track_update_state(accents, params),
            Self::Pluggable(s) => s.update(0.0, params),
        }
    }

    /// Processes one block in place.
    pub fn apply(
        &mut self,
        left: &mut [f32],
        right: &mut [f32],
        arena: &mut ScratchArena<'_>,
        params: &SynthParams,
    ) -> Result<(), SynthError> {
        match self {
            Self::Compressor(s) => s.apply(left, right, arena, params),
            Self::Vocoder(s) => s.apply(left, right, arena, params),
            Self::Pluggable(s) => s.apply(left, right, arena, params),
        }
    }

    /// Short label for logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Compressor(_) => "compressor",
            Self::Vocoder(_) => "vocoder",
            Self::Pluggable(_) => "pluggable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::{CompressorControls, CompressorMode};
    use sonant_core::{ModulatedParamTemplate, ScalarParam, Workspace};

    fn osc_compressor(ratio: f64) -> CompressorTemplate {
        let controls = CompressorControls {
            ratio,
            ..CompressorControls::DEFAULT
        }
        .map(|&v| ModulatedParamTemplate::constant(v));
        CompressorTemplate::new(CompressorMode::Rms, CompressorPlacement::Oscillator(controls))
            .unwrap()
    }

    #[test]
    fn empty_chain_passes_through() {
        let params = SynthParams::default();
        let (mut chain, pre) = EffectChainTemplate::new()
            .new_state(&NoteContext::default(), &params)
            .unwrap();
        assert_eq!(pre, 0);
        let mut workspace = Workspace::new(8, 2);
        let mut left = [0.3f32; 8];
        let mut right = [0.1f32; 8];
        chain
            .apply(&mut left, &mut right, &mut workspace.arena(8), &params)
            .unwrap();
        assert_eq!(left, [0.3; 8]);
    }

    #[test]
    fn chain_runs_every_effect() {
        let params = SynthParams::default();
        let template = EffectChainTemplate::new()
            .with(osc_compressor(1.0))
            .with(osc_compressor(1.0));
        assert_eq!(template.len(), 2);
        let (mut chain, _) = template.new_state(&NoteContext::default(), &params).unwrap();
        chain.osc_update_envelopes(440.0, &params).unwrap();
        assert_eq!(chain.effects().len(), 2);
        let mut workspace = Workspace::new(8, 2);
        let mut left = [0.5f32; 8];
        let mut right = [0.5f32; 8];
        chain
            .apply(&mut left, &mut right, &mut workspace.arena(8), &params)
            .unwrap();
        assert_eq!(left, [0.5; 8]);
    }

    #[test]
    fn track_effects_need_track_controls() {
        assert!(TrackEffectTemplate::compressor(osc_compressor(2.0)).is_err());

        let controls = CompressorControls::DEFAULT.map(|&v| ScalarParam::constant(v));
        let lookahead = CompressorTemplate::new(
            CompressorMode::PeakLookahead,
            CompressorPlacement::Track(controls),
        )
        .unwrap();
        let track = TrackEffectTemplate::compressor(lookahead).unwrap();
        let mut effect = track.new_state(&Accents::ZERO, &SynthParams::default()).unwrap();
        assert_eq!(effect.kind_name(), "compressor");
        effect
            .track_update_state(&Accents::ZERO, &SynthParams::default())
            .unwrap();
    }
}
