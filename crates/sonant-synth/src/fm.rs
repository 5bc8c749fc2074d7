//! Statement-programmed FM synthesis.
//!
//! An instrument is a list of [`FmStatement`]s over a flat variable array.
//! Three slots are fixed: [`ONE`] holds 1.0, [`LEFT`] and [`RIGHT`] collect
//! the output of each sample. The remaining slots are free for the program.
//!
//! # Partition
//!
//! At build time the statements are split into a block-rate prefix, run
//! once per generated block, and a per-sample suffix. A statement can move
//! into the prefix only if its value cannot change within a block:
//!
//! - it is not a [`FmStatement::Wave`]
//! - it neither reads nor writes [`LEFT`] or [`RIGHT`]
//! - it reads nothing the suffix writes
//! - its target is not read earlier or written anywhere by the suffix
//!
//! The relative order of statements inside each partition is preserved.
//!
//! # Per sample
//!
//! [`LEFT`] and [`RIGHT`] are reset to zero, the suffix runs in order, and
//! the two slots are accumulated into the output with the voice's gains.

use alloc::format;
use alloc::sync::Arc;
use alloc::vec::Vec;
use sonant_core::{
    BuildError, Fixed64, ModulatedParam, ModulatedParamTemplate, NoteContext, ScratchArena,
    SynthError, SynthParams,
};

use crate::oscillator::{GainSource, Oscillator, OscillatorCommon, VoiceCore};
use crate::table::{MultiWaveTable, WaveTable};

/// Slot holding the constant 1.0.
pub const ONE: usize = 0;
/// Slot collecting left output per sample.
pub const LEFT: usize = 1;
/// Slot collecting right output per sample.
pub const RIGHT: usize = 2;
/// Number of fixed slots.
pub const FIXED_VARIABLES: usize = 3;

/// One FM program statement.
#[derive(Clone, Debug)]
pub enum FmStatement {
    /// `target = table(phase + phase_modulation)`.
    Wave {
        /// Slot written.
        target: usize,
        /// Slot added to the phase, in cycles.
        phase_modulation: Option<usize>,
        /// Slot holding the wave index in `[0, 1]` across the table's frames.
        wave_index: Option<usize>,
        /// Phase frequency as a multiple of the note frequency.
        frequency_factor: f64,
        /// Tables, picked by the operator's frequency.
        tables: MultiWaveTable,
    },
    /// `target = accumulate + source * factor * factor2 + addend`.
    MulAdd {
        /// Slot written.
        target: usize,
        /// Slot the product is added to.
        accumulate: usize,
        /// Slot multiplied.
        source: usize,
        /// Constant factor.
        factor: f32,
        /// Slot holding a second factor.
        factor2: usize,
        /// Constant added.
        addend: f32,
    },
    /// `target = envelope`, updated every tick.
    Envelope {
        /// Slot written.
        target: usize,
        /// The envelope and LFO chain.
        envelope: ModulatedParamTemplate,
    },
}

impl FmStatement {
    fn target(&self) -> usize {
        match self {
            Self::Wave { target, .. }
            | Self::MulAdd { target, .. }
            | Self::Envelope { target, .. } => *target,
        }
    }

    /// Slots read, unused entries `None`.
    fn reads(&self) -> [Option<usize>; 3] {
        match self {
            Self::Wave {
                phase_modulation,
                wave_index,
                ..
            } => [*phase_modulation, *wave_index, None],
            Self::MulAdd {
                accumulate,
                source,
                factor2,
                ..
            } => [Some(*accumulate), Some(*source), Some(*factor2)],
            Self::Envelope { .. } => [None; 3],
        }
    }

    fn is_wave(&self) -> bool {
        matches!(self, Self::Wave { .. })
    }
}

fn is_output(slot: usize) -> bool {
    slot == LEFT || slot == RIGHT
}

/// Stable partition into block-rate prefix and per-sample suffix.
///
/// Returns the reordered statements and the boundary.
pub fn partition(statements: &[FmStatement]) -> (Vec<FmStatement>, usize) {
    let n = statements.len();
    let mut per_sample: Vec<bool> = statements
        .iter()
        .map(|s| {
            s.is_wave()
                || is_output(s.target())
                || s.reads().iter().flatten().any(|&v| is_output(v))
        })
        .collect();

    loop {
        let mut changed = false;
        for i in 0..n {
            if per_sample[i] {
                continue;
            }
            let statement = &statements[i];
            let target = statement.target();
            let moves = (0..n).filter(|&j| per_sample[j]).any(|j| {
                let other = &statements[j];
                let reads_suffix = statement.reads().iter().flatten().any(|&v| v == other.target());
                let clobbered = other.target() == target;
                let read_before = j < i && other.reads().iter().flatten().any(|&v| v == target);
                reads_suffix || clobbered || read_before
            });
            if moves {
                per_sample[i] = true;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let mut ordered: Vec<FmStatement> = statements
        .iter()
        .zip(&per_sample)
        .filter(|&(_, &p)| !p)
        .map(|(s, _)| s.clone())
        .collect();
    let boundary = ordered.len();
    ordered.extend(
        statements
            .iter()
            .zip(&per_sample)
            .filter(|&(_, &p)| p)
            .map(|(s, _)| s.clone()),
    );
    (ordered, boundary)
}

/// FM oscillator definition.
#[derive(Clone, Debug)]
pub struct FmSynthTemplate {
    common: OscillatorCommon,
    variables: usize,
    statements: Arc<[FmStatement]>,
    boundary: usize,
}

impl FmSynthTemplate {
    /// Partitions `statements` and validates slot references.
    pub fn new(
        common: OscillatorCommon,
        variables: usize,
        statements: &[FmStatement],
    ) -> Result<Self, BuildError> {
        check_slots(variables, statements)?;
        let (ordered, boundary) = partition(statements);
        Self::from_partitioned(common, variables, ordered, boundary)
    }

    /// Uses an existing partition; `boundary` statements run per block.
    ///
    /// Rejects any [`FmStatement::Wave`] before the boundary.
    pub fn from_partitioned(
        common: OscillatorCommon,
        variables: usize,
        statements: Vec<FmStatement>,
        boundary: usize,
    ) -> Result<Self, BuildError> {
        common.validate()?;
        check_slots(variables, &statements)?;
        if boundary > statements.len() {
            return Err(BuildError::InvalidConfig(format!(
                "boundary {boundary} past {} statements",
                statements.len()
            )));
        }
        if let Some(index) = statements[..boundary].iter().position(FmStatement::is_wave) {
            #[cfg(feature = "tracing")]
            tracing::warn!(index, boundary, "wave statement in block-rate prefix");
            return Err(BuildError::StatementPartition { index, boundary });
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(statements = statements.len(), boundary, "fm template built");
        Ok(Self {
            common,
            variables,
            statements: statements.into(),
            boundary,
        })
    }

    /// Shared settings.
    pub fn common(&self) -> &OscillatorCommon {
        &self.common
    }

    /// Statements in execution order.
    pub fn statements(&self) -> &[FmStatement] {
        &self.statements
    }

    /// Number of block-rate statements at the front.
    pub fn boundary(&self) -> usize {
        self.boundary
    }

    pub(crate) fn new_state(
        &self,
        note: &NoteContext,
        params: &SynthParams,
    ) -> Result<(FmOscillator, i32), SynthError> {
        let (core, mut pre_origin) = VoiceCore::new(&self.common, note, params)?;
        let mut steps = Vec::with_capacity(self.statements.len());
        for statement in self.statements.iter() {
            let step = match statement {
                FmStatement::Wave {
                    target,
                    phase_modulation,
                    wave_index,
                    frequency_factor,
                    tables,
                } => Step::Wave {
                    target: *target,
                    phase_modulation: *phase_modulation,
                    wave_index: *wave_index,
                    frequency_factor: *frequency_factor,
                    table: tables
                        .select(note.frequency_for_multisampling * frequency_factor)
                        .cloned(),
                    phase: Fixed64::ZERO,
                    differential: Fixed64::ZERO,
                },
                FmStatement::MulAdd {
                    target,
                    accumulate,
                    source,
                    factor,
                    factor2,
                    addend,
                } => Step::MulAdd {
                    target: *target,
                    accumulate: *accumulate,
                    source: *source,
                    factor: *factor,
                    factor2: *factor2,
                    addend: *addend,
                },
                FmStatement::Envelope { target, envelope } => {
                    let (param, pre) = envelope.new_state(&note.accents, note.hurry_up, params)?;
                    pre_origin = pre_origin.max(pre);
                    Step::Envelope {
                        target: *target,
                        param,
                    }
                }
            };
            steps.push(step);
        }
        let mut variables = alloc::vec![0.0; self.variables];
        variables[ONE] = 1.0;
        let mut state = FmOscillator {
            core,
            steps,
            boundary: self.boundary,
            variables,
        };
        state.refresh_differentials(params);
        Ok((state, pre_origin))
    }
}

fn check_slots(variables: usize, statements: &[FmStatement]) -> Result<(), BuildError> {
    if variables < FIXED_VARIABLES {
        return Err(BuildError::InvalidConfig(format!(
            "{variables} variables, at least {FIXED_VARIABLES} needed"
        )));
    }
    for (index, statement) in statements.iter().enumerate() {
        let target = statement.target();
        for variable in statement.reads().iter().flatten().copied().chain([target]) {
            if variable >= variables {
                return Err(BuildError::VariableOutOfRange {
                    index,
                    variable,
                    count: variables,
                });
            }
        }
        if target == ONE {
            return Err(BuildError::InvalidConfig(format!(
                "statement {index} writes the constant slot"
            )));
        }
    }
    Ok(())
}

#[derive(Debug)]
enum Step {
    Wave {
        target: usize,
        phase_modulation: Option<usize>,
        wave_index: Option<usize>,
        frequency_factor: f64,
        table: Option<Arc<WaveTable>>,
        phase: Fixed64,
        differential: Fixed64,
    },
    MulAdd {
        target: usize,
        accumulate: usize,
        source: usize,
        factor: f32,
        factor2: usize,
        addend: f32,
    },
    Envelope {
        target: usize,
        param: ModulatedParam,
    },
}

impl Step {
    /// Runs one statement.
    #[inline]
    fn execute(&mut self, variables: &mut [f32], params: &SynthParams) {
        match self {
            Self::Wave {
                target,
                phase_modulation,
                wave_index,
                table,
                phase,
                differential,
                ..
            } => {
                let value = match table {
                    Some(table) => {
                        let modulated = match phase_modulation {
                            Some(slot) => *phase + Fixed64::from_f64(f64::from(variables[*slot])),
                            None => *phase,
                        };
                        let index = wave_index.map_or(0.0, |slot| variables[slot]);
                        table.lookup_across(
                            index,
                            modulated,
                            params.interpolate_intra_wave,
                            params.interpolate_across_waves,
                        )
                    }
                    None => 0.0,
                };
                variables[*target] = value;
                *phase = (*phase + *differential).wrapped();
            }
            Self::MulAdd {
                target,
                accumulate,
                source,
                factor,
                factor2,
                addend,
            } => {
                variables[*target] = variables[*accumulate]
                    + variables[*source] * *factor * variables[*factor2]
                    + *addend;
            }
            Self::Envelope { target, param } => {
                variables[*target] = param.current() as f32;
            }
        }
    }
}

/// Per-note FM network.
#[derive(Debug)]
pub struct FmOscillator {
    core: VoiceCore,
    steps: Vec<Step>,
    boundary: usize,
    variables: Vec<f32>,
}

impl FmOscillator {
    /// Current variable values.
    pub fn variables(&self) -> &[f32] {
        &self.variables
    }

    fn refresh_differentials(&mut self, params: &SynthParams) {
        let frequency = self.core.frequency();
        for step in &mut self.steps {
            if let Step::Wave {
                frequency_factor,
                differential,
                ..
            } = step
            {
                *differential =
                    Fixed64::from_f64(frequency * *frequency_factor / params.sample_rate).wrapped();
            }
        }
    }
}

fn run_network<G: GainSource>(
    steps: &mut [Step],
    boundary: usize,
    variables: &mut [f32],
    left: &mut [f32],
    right: &mut [f32],
    gain: &G,
    params: &SynthParams,
) {
    let (prefix, suffix) = steps.split_at_mut(boundary);
    for step in prefix {
        if matches!(step, Step::Wave { .. }) {
            unreachable!("wave statement in the block-rate prefix");
        }
        step.execute(variables, params);
    }
    for (i, (l, r)) in left.iter_mut().zip(right.iter_mut()).enumerate() {
        variables[LEFT] = 0.0;
        variables[RIGHT] = 0.0;
        for step in suffix.iter_mut() {
            step.execute(variables, params);
        }
        let (gain_left, gain_right) = gain.at(i);
        *l += variables[LEFT] * gain_left;
        *r += variables[RIGHT] * gain_right;
    }
}

impl Oscillator for FmOscillator {
    fn fix_up_pre_origin(&mut self, actual_pre_origin: i32) {
        self.core.fix_up_pre_origin(actual_pre_origin);
        for step in &mut self.steps {
            if let Step::Envelope { param, .. } = step {
                param.fix_up_pre_origin(actual_pre_origin);
            }
        }
    }

    fn update_envelopes(&mut self, params: &SynthParams) -> Result<(), SynthError> {
        if !self.core.advance(params)? {
            return Ok(());
        }
        self.refresh_differentials(params);
        let frequency = self.core.frequency();
        for step in &mut self.steps {
            if let Step::Envelope { param, .. } = step {
                param.update(frequency, params)?;
            }
        }
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
            steps,
            boundary,
            variables,
        } = self;
        let boundary = *boundary;
        core.render(left, right, arena, params, |core, left, right, arena| {
            let frames = left.len();
            if core.loudness_ramps(params) {
                let (mut lease, _) = arena.lease(2);
                let [gain_left, gain_right] = lease.split::<2>();
                let gain = core.ramped_gain(&mut gain_left[..frames], &mut gain_right[..frames]);
                run_network(steps, boundary, variables, left, right, &gain, params);
            } else {
                run_network(steps, boundary, variables, left, right, &core.flat_gain(), params);
            }
            Ok(())
        })
    }

    fn is_finished(&self) -> bool {
        self.core.loudness().is_at_end()
    }

    fn key_up_sustain(&mut self, n: usize) {
        self.core.key_up_sustain(n);
        for step in &mut self.steps {
            if let Step::Envelope { param, .. } = step {
                param.key_up_sustain(n);
            }
        }
    }

    fn restart(&mut self, note: &NoteContext, params: &SynthParams) {
        self.core.restart(note, params);
        for step in &mut self.steps {
            if let Step::Envelope { param, .. } = step {
                param.retrigger_from_origin(&note.accents, params);
            }
        }
    }
}
