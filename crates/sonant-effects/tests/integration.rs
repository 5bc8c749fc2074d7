//! Integration tests for sonant-effects.
//!
//! Tests effect lifecycles across crates: vocoder coefficient memoization,
//! placement validation, short-circuiting control updates, and pluggable
//! processors running inside an oscillator effect chain.

use std::sync::Arc;

use sonant_core::{
    Accents, BuildError, EnvelopeState, EnvelopeTemplate, ModulatedParamTemplate, NoteContext,
    ParamBinding, ParamDeclaration, ParamRole, PluggableDriverTemplate, PluggableProcessor,
    PluggableProcessorTemplate, ScalarParam, SegmentEnvelope, SegmentShape, SmoothedParams,
    StaticValue, SynthError, SynthParams, Workspace,
};
use sonant_effects::{
    CompressorControls, CompressorMode, CompressorPlacement, CompressorTemplate,
    EffectChainTemplate, PluggableEffectTemplate, TrackEffect, TrackEffectTemplate,
    VocoderControls, VocoderPlacement, VocoderTable, VocoderTemplate,
};

fn table() -> Arc<VocoderTable> {
    Arc::new(
        VocoderTable::new(
            2,
            &[
                vec![0.02, 0.005, 1.0, 0.0, 0.1, 0.02, 1.0, 0.0],
                vec![0.04, 0.005, 0.5, 0.0, 0.2, 0.02, 0.5, 0.0],
            ],
        )
        .unwrap(),
    )
}

// ============================================================================
// 1. Vocoder memoization
// ============================================================================

#[test]
fn vocoder_skips_rebuild_for_unchanged_controls() {
    let controls = VocoderControls {
        wave_table_index: ScalarParam::constant(0.25).with_accent(0, 0.5),
        output_scaling: ScalarParam::constant(1.0),
    };
    let template = VocoderTemplate::new(table(), 2, VocoderPlacement::Track(controls)).unwrap();
    let track = TrackEffectTemplate::vocoder(template).unwrap();
    let params = SynthParams::default();
    let mut effect = track.new_state(&Accents::ZERO, &params).unwrap();
    let TrackEffect::Vocoder(_) = &effect else {
        panic!("expected a vocoder");
    };

    let rebuilds = |effect: &TrackEffect| match effect {
        TrackEffect::Vocoder(v) => v.coefficient_rebuilds(),
        _ => unreachable!(),
    };
    assert_eq!(rebuilds(&effect), 1);

    let mut workspace = Workspace::new(64, 2);
    for _ in 0..2 {
        effect.track_update_state(&Accents::ZERO, &params).unwrap();
        let mut left = vec![0.5f32; 64];
        let mut right = vec![0.5f32; 64];
        effect
            .apply(&mut left, &mut right, &mut workspace.arena(64), &params)
            .unwrap();
    }
    assert_eq!(rebuilds(&effect), 1);

    // accent moves the index: exactly one more rebuild
    let accents = Accents::ZERO.with(0, 1.0);
    for _ in 0..2 {
        effect.track_update_state(&accents, &params).unwrap();
        let mut left = vec![0.5f32; 64];
        let mut right = vec![0.5f32; 64];
        effect
            .apply(&mut left, &mut right, &mut workspace.arena(64), &params)
            .unwrap();
    }
    assert_eq!(rebuilds(&effect), 2);
}

#[test]
fn vocoder_bands_are_summed() {
    let params = SynthParams::default();
    let single = |gain_a: f32, gain_b: f32| {
        let table = VocoderTable::new(2, &[vec![0.02, 0.005, gain_a, 0.0, 0.1, 0.02, gain_b, 0.0]])
            .unwrap();
        let controls = VocoderControls {
            wave_table_index: ScalarParam::constant(0.0),
            output_scaling: ScalarParam::constant(1.0),
        };
        let template =
            VocoderTemplate::new(Arc::new(table), 1, VocoderPlacement::Track(controls)).unwrap();
        let (mut state, _) = template.new_state(&Accents::ZERO, 1.0, &params).unwrap();
        let mut workspace = Workspace::new(32, 2);
        let mut left: Vec<f32> = (0..32).map(|i| (i as f32 * 0.37).sin()).collect();
        let mut right = left.clone();
        state
            .apply(&mut left, &mut right, &mut workspace.arena(32), &params)
            .unwrap();
        left
    };
    let a = single(1.0, 0.0);
    let b = single(0.0, 1.0);
    let both = single(1.0, 1.0);
    for i in 0..32 {
        assert!((a[i] + b[i] - both[i]).abs() < 1e-5);
    }
}

#[test]
fn oscillator_vocoder_rebuilds_while_index_moves() {
    let params = SynthParams::default().with_envelope_rate(100.0);
    let sweep = SegmentEnvelope::new(0.0).segment(1.0, 0.02, SegmentShape::Linear);
    let controls = VocoderControls {
        wave_table_index: ModulatedParamTemplate::new(Arc::new(sweep)),
        output_scaling: ModulatedParamTemplate::constant(1.0),
    };
    let template =
        VocoderTemplate::new(table(), 1, VocoderPlacement::Oscillator(controls)).unwrap();
    let (mut state, pre_origin) = template.new_state(&Accents::ZERO, 1.0, &params).unwrap();
    state.fix_up_pre_origin(pre_origin);

    let mut workspace = Workspace::new(16, 2);
    let mut counts = Vec::new();
    for _ in 0..4 {
        state.osc_update_envelopes(220.0, &params).unwrap();
        let mut left = [0.1f32; 16];
        let mut right = [0.1f32; 16];
        state
            .apply(&mut left, &mut right, &mut workspace.arena(16), &params)
            .unwrap();
        counts.push(state.coefficient_rebuilds());
    }
    // two ticks of movement, then the envelope holds at its end
    assert_eq!(counts, vec![2, 3, 3, 3]);
}

// ============================================================================
// 2. Placement validation
// ============================================================================

#[test]
fn lookahead_compressor_is_track_only() {
    let osc = CompressorControls::DEFAULT.map(|&v| ModulatedParamTemplate::constant(v));
    assert_eq!(
        CompressorTemplate::new(CompressorMode::PeakLookahead, CompressorPlacement::Oscillator(osc))
            .unwrap_err(),
        BuildError::LookaheadOnOscillator
    );

    let track = CompressorControls::DEFAULT.map(|&v| ScalarParam::constant(v));
    let template =
        CompressorTemplate::new(CompressorMode::PeakLookahead, CompressorPlacement::Track(track))
            .unwrap();
    let (state, _) = template
        .new_state(&Accents::ZERO, 1.0, &SynthParams::default())
        .unwrap();
    assert_eq!(state.latency(), 4800);
}

// ============================================================================
// 3. Short-circuit on failing controls
// ============================================================================

#[derive(Debug)]
struct Failing;

struct FailingState;

impl EnvelopeState for FailingState {
    fn update(&mut self, _params: &SynthParams) -> Result<f64, SynthError> {
        Err(SynthError::DivideByZero)
    }
    fn initial_value(&self) -> f64 {
        1.0
    }
    fn key_up_sustain(&mut self, _n: usize) {}
    fn retrigger_from_origin(&mut self, _accents: &Accents, _params: &SynthParams) {}
    fn fix_up_initial_delay(&mut self, _actual_pre_origin: i32) {}
    fn is_at_end(&self) -> bool {
        false
    }
    fn segment_shape(&self) -> SegmentShape {
        SegmentShape::Linear
    }
}

impl EnvelopeTemplate for Failing {
    fn new_state(
        &self,
        _accents: &Accents,
        _hurry_up: f64,
        _params: &SynthParams,
    ) -> Result<(Box<dyn EnvelopeState>, i32), SynthError> {
        Ok((Box::new(FailingState), 0))
    }
}

#[test]
fn failing_control_leaves_block_values_stale() {
    let params = SynthParams::default().with_envelope_rate(100.0);
    let mut controls = CompressorControls {
        ratio: 1.0,
        ..CompressorControls::DEFAULT
    }
    .map(|&v| ModulatedParamTemplate::constant(v));
    controls.output_gain = ModulatedParamTemplate::new(Arc::new(
        SegmentEnvelope::new(1.0).segment(0.5, 0.01, SegmentShape::Linear),
    ));
    controls.ratio = ModulatedParamTemplate::new(Arc::new(Failing));
    let template =
        CompressorTemplate::new(CompressorMode::Peak, CompressorPlacement::Oscillator(controls))
            .unwrap();
    let (mut state, _) = template.new_state(&Accents::ZERO, 1.0, &params).unwrap();

    assert_eq!(
        state.osc_update_envelopes(440.0, &params),
        Err(SynthError::DivideByZero)
    );

    // output gain advanced to 0.5 but the setup was not refreshed
    let mut workspace = Workspace::new(8, 2);
    let mut left = [0.4f32; 8];
    let mut right = [0.4f32; 8];
    state
        .apply(&mut left, &mut right, &mut workspace.arena(8), &params)
        .unwrap();
    assert!(left.iter().all(|&x| x == 0.4));
}

// ============================================================================
// 4. Pluggable effects
// ============================================================================

#[derive(Debug)]
struct Gain {
    decls: Vec<ParamDeclaration>,
}

struct GainState;

impl PluggableProcessor for GainState {
    fn update(&mut self, _dynamics: &[f64], _params: &SynthParams) -> Result<(), SynthError> {
        Ok(())
    }

    fn apply(
        &mut self,
        left: &mut [f32],
        right: &mut [f32],
        smoothed: &SmoothedParams<'_>,
        _params: &SynthParams,
    ) -> Result<(), SynthError> {
        let gain = smoothed.value(0) as f32;
        left.iter_mut().chain(right.iter_mut()).for_each(|x| *x *= gain);
        Ok(())
    }
}

impl PluggableProcessorTemplate for Gain {
    fn name(&self) -> &str {
        "gain"
    }

    fn parameters(&self) -> &[ParamDeclaration] {
        &self.decls
    }

    fn new_processor(
        &self,
        _statics: &[StaticValue],
        _params: &SynthParams,
    ) -> Result<Box<dyn PluggableProcessor>, SynthError> {
        Ok(Box::new(GainState))
    }
}

#[test]
fn pluggable_effect_in_chain_follows_note_loudness() {
    let gain = Arc::new(Gain {
        decls: vec![ParamDeclaration::dynamic("gain", false, ParamRole::Loudness)],
    });
    let driver = PluggableDriverTemplate::new(
        gain,
        vec![ParamBinding::Modulated(ModulatedParamTemplate::constant(0.5))],
    )
    .unwrap();
    let chain = EffectChainTemplate::new().with(PluggableEffectTemplate::new(driver));
    let params = SynthParams::default();
    let note = NoteContext::new(330.0).with_loudness(0.5);
    let (mut state, pre_origin) = chain.new_state(&note, &params).unwrap();
    state.fix_up_pre_origin(pre_origin);
    state.osc_update_envelopes(330.0, &params).unwrap();

    let mut workspace = Workspace::new(4, 1);
    let mut left = [1.0f32; 4];
    let mut right = [2.0f32; 4];
    state
        .apply(&mut left, &mut right, &mut workspace.arena(4), &params)
        .unwrap();
    assert_eq!(left, [0.25; 4]);
    assert_eq!(right, [0.5; 4]);
}
