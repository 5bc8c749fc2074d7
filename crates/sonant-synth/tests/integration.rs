//! Integration tests for sonant-synth.
//!
//! Tests cover full oscillator lifecycles through `OscillatorTemplate`:
//! sample playback and loops, FM networks, pluggable processors, effect
//! chain routing, short-circuiting updates, start delay and pooling.

use std::sync::Arc;

use sonant_core::{
    Accents, EnvelopeState, EnvelopeTemplate, ModulatedParamTemplate, NoteContext, ParamBinding,
    ParamDeclaration, ParamRole, PluggableDriverTemplate, PluggableProcessor,
    PluggableProcessorTemplate, SegmentEnvelope, SegmentShape, SmoothedParams, StaticValue,
    SynthError, SynthParams, Workspace,
};
use sonant_effects::{EffectChainTemplate, PluggableEffectTemplate};
use sonant_synth::{
    AlgorithmicTemplate, AlgorithmicWaveform, FmStatement, FmSynthTemplate, FreeLists, LEFT,
    LoopRegion, MultiSample, MultiWaveTable, ONE, Oscillator, OscillatorCommon, OscillatorState,
    OscillatorTemplate, PluggableOscillatorTemplate, RIGHT, SampleData, SampleTemplate, WaveTable,
};

const SR: f64 = 48000.0;

struct Voice {
    state: OscillatorState,
    workspace: Workspace,
    params: SynthParams,
}

impl Voice {
    fn start(template: &OscillatorTemplate, note: NoteContext, params: SynthParams) -> Self {
        let mut pools = FreeLists::default();
        let (mut state, pre_origin) = template.new_state(&note, &params, &mut pools).unwrap();
        state.fix_up_pre_origin(pre_origin);
        Self {
            state,
            workspace: Workspace::new(256, 16),
            params,
        }
    }

    /// One tick: update then render `frames` frames on top of silence.
    fn tick(&mut self, frames: usize) -> (Vec<f32>, Vec<f32>) {
        self.state.update_envelopes(&self.params).unwrap();
        self.render(frames)
    }

    fn render(&mut self, frames: usize) -> (Vec<f32>, Vec<f32>) {
        let mut left = vec![0.0f32; frames];
        let mut right = vec![0.0f32; frames];
        self.state
            .generate(&mut left, &mut right, &mut self.workspace.arena(frames), &self.params)
            .unwrap();
        (left, right)
    }
}

fn params() -> SynthParams {
    SynthParams::default().with_envelope_rate(100.0)
}

// ============================================================================
// 1. Sample playback
// ============================================================================

#[test]
fn sample_plays_four_frames_then_finishes() {
    let sample = SampleData::mono(vec![0.0, 1.0, 0.0, -1.0], SR, 440.0).unwrap();
    let template: OscillatorTemplate =
        SampleTemplate::new(OscillatorCommon::default(), MultiSample::single(Arc::new(sample)))
            .unwrap()
            .into();
    let mut voice = Voice::start(&template, NoteContext::new(440.0), params());

    let (left, right) = voice.tick(4);
    let expected = [0.0, 0.5, 0.0, -0.5];
    for i in 0..4 {
        assert!((left[i] - expected[i]).abs() < 1e-6, "{left:?}");
        assert!((right[i] - expected[i]).abs() < 1e-6, "{right:?}");
    }
    assert!(voice.state.is_finished());

    let (left, _) = voice.render(4);
    assert!(left.iter().all(|&x| x == 0.0));
}

#[test]
fn sample_loop_sustains_until_key_up() {
    let data: Vec<f32> = (0..8).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
    let sample = SampleData::mono(data, SR, 440.0)
        .unwrap()
        .with_loop(1, LoopRegion::new(2, 6))
        .unwrap();
    let template: OscillatorTemplate =
        SampleTemplate::new(OscillatorCommon::default(), MultiSample::single(Arc::new(sample)))
            .unwrap()
            .into();
    let mut voice = Voice::start(&template, NoteContext::new(440.0), params());

    for _ in 0..4 {
        let (left, _) = voice.tick(64);
        assert!(left.iter().all(|&x| x.abs() == 0.25));
        assert!(!voice.state.is_finished());
    }

    voice.state.key_up_sustain(1);
    voice.tick(64);
    assert!(voice.state.is_finished());
}

#[test]
fn multisample_picks_by_frequency() {
    let low = Arc::new(SampleData::mono(vec![0.2; 64], SR, 100.0).unwrap());
    let high = Arc::new(SampleData::mono(vec![0.8; 64], SR, 1000.0).unwrap());
    let samples = MultiSample::new(vec![(300.0, low), (f64::INFINITY, high)]).unwrap();
    let template: OscillatorTemplate =
        SampleTemplate::new(OscillatorCommon::default(), samples).unwrap().into();

    let note = NoteContext::new(1000.0).with_frequency_for_multisampling(1000.0);
    let mut voice = Voice::start(&template, note, params());
    let (left, _) = voice.tick(16);
    assert!((left[0] - 0.4).abs() < 1e-6);
}

#[test]
fn empty_multisample_is_finished() {
    let template: OscillatorTemplate =
        SampleTemplate::new(OscillatorCommon::default(), MultiSample::empty())
            .unwrap()
            .into();
    let voice = Voice::start(&template, NoteContext::new(440.0), params());
    assert!(voice.state.is_finished());
}

// ============================================================================
// 2. FM network
// ============================================================================

fn sine_table(len: usize) -> MultiWaveTable {
    let cycle = (0..len)
        .map(|i| (i as f32 * std::f32::consts::TAU / len as f32).sin())
        .collect();
    MultiWaveTable::single(Arc::new(WaveTable::single(cycle).unwrap()))
}

#[test]
fn fm_network_renders_scaled_carrier() {
    let statements = [
        FmStatement::Envelope {
            target: 4,
            envelope: ModulatedParamTemplate::constant(0.5),
        },
        FmStatement::Wave {
            target: 3,
            phase_modulation: None,
            wave_index: None,
            frequency_factor: 1.0,
            tables: sine_table(64),
        },
        FmStatement::MulAdd {
            target: LEFT,
            accumulate: LEFT,
            source: 3,
            factor: 1.0,
            factor2: 4,
            addend: 0.0,
        },
        FmStatement::MulAdd {
            target: RIGHT,
            accumulate: RIGHT,
            source: 3,
            factor: -1.0,
            factor2: ONE,
            addend: 0.0,
        },
    ];
    let fm = FmSynthTemplate::new(OscillatorCommon::default(), 5, &statements).unwrap();
    assert_eq!(fm.boundary(), 1);
    let template: OscillatorTemplate = fm.into();

    // 750 Hz steps exactly one table sample per frame
    let mut voice = Voice::start(&template, NoteContext::new(750.0), params());
    let (left, right) = voice.tick(64);
    for i in 0..64 {
        let carrier = (i as f32 * std::f32::consts::TAU / 64.0).sin();
        assert!((left[i] - carrier * 0.25).abs() < 1e-6);
        assert!((right[i] + carrier * 0.5).abs() < 1e-6);
    }
}

#[test]
fn fm_partition_rejected_at_construction() {
    let statements = vec![
        FmStatement::Wave {
            target: 3,
            phase_modulation: None,
            wave_index: None,
            frequency_factor: 1.0,
            tables: sine_table(16),
        },
        FmStatement::MulAdd {
            target: LEFT,
            accumulate: LEFT,
            source: 3,
            factor: 1.0,
            factor2: ONE,
            addend: 0.0,
        },
    ];
    assert!(
        FmSynthTemplate::from_partitioned(OscillatorCommon::default(), 4, statements, 1).is_err()
    );
}

// ============================================================================
// 3. Short-circuit on failing updates
// ============================================================================

#[derive(Debug)]
struct Failing;

struct FailingState;

impl EnvelopeState for FailingState {
    fn update(&mut self, _params: &SynthParams) -> Result<f64, SynthError> {
        Err(SynthError::DivideByZero)
    }
    fn initial_value(&self) -> f64 {
        0.5
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
fn failing_index_keeps_loudness_update() {
    let fade = SegmentEnvelope::new(1.0).segment(0.5, 0.01, SegmentShape::Linear);
    let common =
        OscillatorCommon::default().with_loudness(ModulatedParamTemplate::new(Arc::new(fade)));
    let template: OscillatorTemplate = AlgorithmicTemplate::new(
        common,
        AlgorithmicWaveform::Ramp,
        ModulatedParamTemplate::new(Arc::new(Failing)),
    )
    .unwrap()
    .into();
    let params = params().with_interpolate_over_time(false);
    let mut voice = Voice::start(&template, NoteContext::new(440.0), params);

    assert_eq!(
        voice.state.update_envelopes(&voice.params),
        Err(SynthError::DivideByZero)
    );
    // loudness already moved to 0.5; the ramp starts at -1
    let (left, _) = voice.render(1);
    assert_eq!(left[0], -0.25);
}

// ============================================================================
// 4. Effects and pluggable processors
// ============================================================================

#[derive(Debug)]
struct Gain {
    decls: Vec<ParamDeclaration>,
}

struct GainState {
    gain: f32,
}

impl PluggableProcessor for GainState {
    fn update(&mut self, dynamics: &[f64], _params: &SynthParams) -> Result<(), SynthError> {
        self.gain = dynamics[0] as f32;
        Ok(())
    }

    fn apply(
        &mut self,
        left: &mut [f32],
        right: &mut [f32],
        _smoothed: &SmoothedParams<'_>,
        _params: &SynthParams,
    ) -> Result<(), SynthError> {
        left.iter_mut().chain(right.iter_mut()).for_each(|x| *x *= self.gain);
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
        Ok(Box::new(GainState { gain: 1.0 }))
    }
}

fn gain_driver(role: ParamRole, value: f64) -> PluggableDriverTemplate {
    PluggableDriverTemplate::new(
        Arc::new(Gain {
            decls: vec![ParamDeclaration::dynamic("gain", false, role)],
        }),
        vec![ParamBinding::Modulated(ModulatedParamTemplate::constant(value))],
    )
    .unwrap()
}

fn pulse(common: OscillatorCommon) -> OscillatorTemplate {
    AlgorithmicTemplate::new(
        common,
        AlgorithmicWaveform::Pulse,
        ModulatedParamTemplate::constant(0.25),
    )
    .unwrap()
    .into()
}

#[test]
fn effect_chain_processes_private_buffer() {
    let dry = pulse(OscillatorCommon::default());
    let chain = EffectChainTemplate::new()
        .with(PluggableEffectTemplate::new(gain_driver(ParamRole::None, 3.0)));
    let wet = pulse(OscillatorCommon::default().with_effects(chain));

    let mut dry_voice = Voice::start(&dry, NoteContext::new(440.0), params());
    let mut wet_voice = Voice::start(&wet, NoteContext::new(440.0), params());
    let (dry_left, _) = dry_voice.tick(128);

    wet_voice.state.update_envelopes(&params()).unwrap();
    let mut left = vec![1.0f32; 128];
    let mut right = vec![1.0f32; 128];
    wet_voice
        .state
        .generate(&mut left, &mut right, &mut wet_voice.workspace.arena(128), &params())
        .unwrap();
    // existing content is kept, only the oscillator's own output is scaled
    for i in 0..128 {
        assert!((left[i] - (1.0 + 3.0 * dry_left[i])).abs() < 1e-6);
    }
}

#[derive(Debug)]
struct Dc {
    decls: Vec<ParamDeclaration>,
}

struct DcState {
    ticks: u32,
}

impl PluggableProcessor for DcState {
    fn update(&mut self, _dynamics: &[f64], _params: &SynthParams) -> Result<(), SynthError> {
        self.ticks += 1;
        Ok(())
    }

    fn apply(
        &mut self,
        left: &mut [f32],
        right: &mut [f32],
        smoothed: &SmoothedParams<'_>,
        _params: &SynthParams,
    ) -> Result<(), SynthError> {
        let level = smoothed.value(0) as f32;
        left.fill(level);
        right.fill(level);
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.ticks > 3
    }
}

impl PluggableProcessorTemplate for Dc {
    fn name(&self) -> &str {
        "dc"
    }
    fn parameters(&self) -> &[ParamDeclaration] {
        &self.decls
    }
    fn new_processor(
        &self,
        _statics: &[StaticValue],
        _params: &SynthParams,
    ) -> Result<Box<dyn PluggableProcessor>, SynthError> {
        Ok(Box::new(DcState { ticks: 0 }))
    }
}

#[test]
fn pluggable_oscillator_receives_note_loudness_once() {
    let driver = PluggableDriverTemplate::new(
        Arc::new(Dc {
            decls: vec![ParamDeclaration::dynamic("level", false, ParamRole::Loudness)],
        }),
        vec![ParamBinding::Modulated(ModulatedParamTemplate::constant(1.0))],
    )
    .unwrap();
    let template: OscillatorTemplate =
        PluggableOscillatorTemplate::new(OscillatorCommon::default(), driver)
            .unwrap()
            .into();
    let note = NoteContext::new(220.0).with_loudness(0.5);
    let mut voice = Voice::start(&template, note, params());

    let (left, right) = voice.tick(8);
    assert_eq!(left, vec![0.25; 8]);
    assert_eq!(right, vec![0.25; 8]);

    // creation counts as the first update
    for _ in 0..2 {
        voice.tick(8);
    }
    assert!(voice.state.is_finished());
}

// ============================================================================
// 5. Start delay and pooling
// ============================================================================

#[test]
fn time_displacement_delays_output() {
    let common = OscillatorCommon {
        time_displacement: 0.02,
        ..OscillatorCommon::default()
    };
    let mut voice = Voice::start(&pulse(common), NoteContext::new(440.0), params());
    for _ in 0..2 {
        let (left, _) = voice.tick(32);
        assert!(left.iter().all(|&x| x == 0.0));
    }
    let (left, _) = voice.tick(32);
    assert!(left.iter().any(|&x| x != 0.0));
}

#[test]
fn finalized_states_are_reused() {
    let template = pulse(OscillatorCommon::default());
    let mut pools = FreeLists::new(4);
    let params = params();
    let note = NoteContext::new(440.0);

    let (first, _) = template.new_state(&note, &params, &mut pools).unwrap();
    first.finalize(&mut pools);
    assert_eq!(pools.algorithmic.len(), 1);

    let (second, _) = template.new_state(&note, &params, &mut pools).unwrap();
    assert_eq!(pools.algorithmic.reused(), 1);
    assert_eq!(second.kind_name(), "algorithmic");
    assert!(pools.algorithmic.is_empty());
}
