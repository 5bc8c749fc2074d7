//! Marshaling layer for host-defined processors.
//!
//! A pluggable processor declares its parameters once; an instrument binds a
//! value source to each of them. The driver then owns the whole parameter
//! lifecycle so the processor only ever sees plain numbers:
//!
//! - **Static** parameters (int, double, string) are evaluated once per note
//!   from accents and an optional formula and handed to
//!   [`PluggableProcessorTemplate::new_processor`].
//! - **Dynamic** parameters are envelope plus LFO chains advanced every tick;
//!   the resulting array goes to [`PluggableProcessor::update`].
//! - **Smoothed** dynamic parameters additionally get a per-sample ramp
//!   written into leased scratch memory before every
//!   [`PluggableProcessor::apply`].
//!
//! One dynamic parameter may take the [`ParamRole::Pitch`] role, whose value
//! is the note's current frequency scaled by its chain, and one may take
//! [`ParamRole::Loudness`], scaled by the note loudness.

use crate::accent::{Accents, ScalarParam};
use crate::error::{BuildError, SynthError, SynthErrorSubCode};
use crate::modulation::{ModulatedParam, ModulatedParamTemplate, ramp};
use crate::params::SynthParams;
use crate::vector::fill;
use crate::workspace::{ScratchArena, WorkspaceLease};
use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

/// Special meaning of a dynamic parameter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParamRole {
    /// Plain value.
    #[default]
    None,
    /// Multiplied by the note loudness.
    Loudness,
    /// Multiplied by the note's current frequency.
    Pitch,
}

/// Kind of a declared parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamKind {
    /// Integer fixed for the note, inclusive range.
    StaticInt {
        /// Smallest allowed value.
        min: i64,
        /// Largest allowed value.
        max: i64,
    },
    /// Double fixed for the note, inclusive range.
    StaticDouble {
        /// Smallest allowed value.
        min: f64,
        /// Largest allowed value.
        max: f64,
    },
    /// String fixed for the instrument.
    StaticString,
    /// Double updated every envelope tick.
    Dynamic {
        /// Ramp the value per sample.
        smoothed: bool,
        /// Special meaning.
        role: ParamRole,
    },
}

/// A parameter as declared by a processor.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamDeclaration {
    /// Display name, used in error messages.
    pub name: &'static str,
    /// Kind and constraints.
    pub kind: ParamKind,
}

impl ParamDeclaration {
    /// Declares a static integer parameter.
    pub const fn int(name: &'static str, min: i64, max: i64) -> Self {
        Self {
            name,
            kind: ParamKind::StaticInt { min, max },
        }
    }

    /// Declares a static double parameter.
    pub const fn double(name: &'static str, min: f64, max: f64) -> Self {
        Self {
            name,
            kind: ParamKind::StaticDouble { min, max },
        }
    }

    /// Declares a static string parameter.
    pub const fn string(name: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::StaticString,
        }
    }

    /// Declares a dynamic parameter.
    pub const fn dynamic(name: &'static str, smoothed: bool, role: ParamRole) -> Self {
        Self {
            name,
            kind: ParamKind::Dynamic { smoothed, role },
        }
    }
}

/// Evaluated static parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum StaticValue {
    /// Integer value.
    Int(i64),
    /// Double value.
    Double(f64),
    /// String value.
    Str(String),
}

impl StaticValue {
    /// Integer value, if this is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Double value, if this is one.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// String value, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }
}

/// Value source bound to one declared parameter.
#[derive(Clone, Debug)]
pub enum ParamBinding {
    /// Accent-scaled constant for a static int or double.
    Scalar(ScalarParam),
    /// Literal for a static string.
    Str(String),
    /// Envelope plus LFO chain for a dynamic parameter.
    Modulated(ModulatedParamTemplate),
}

/// Per-sample ramps of the smoothed parameters for one block.
pub struct SmoothedParams<'a> {
    lease: &'a WorkspaceLease<'a>,
    slots: &'a [Option<usize>],
    values: &'a [f64],
}

impl SmoothedParams<'_> {
    /// Ramp for dynamic parameter `index`, or `None` if it is not smoothed.
    pub fn ramp(&self, index: usize) -> Option<&[f32]> {
        let slot = (*self.slots.get(index)?)?;
        Some(self.lease.region(slot))
    }

    /// Block value of dynamic parameter `index`.
    pub fn value(&self, index: usize) -> f64 {
        self.values[index]
    }

    /// Number of dynamic parameters.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the processor has no dynamic parameters.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A processor instance owned by one note or track.
///
/// Oscillator processors add their output into `left`/`right`; effect
/// processors transform `left`/`right` in place.
pub trait PluggableProcessor: Send {
    /// Receives the dynamic parameter values after each tick.
    fn update(&mut self, dynamics: &[f64], params: &SynthParams) -> Result<(), SynthError>;

    /// Processes one block.
    fn apply(
        &mut self,
        left: &mut [f32],
        right: &mut [f32],
        smoothed: &SmoothedParams<'_>,
        params: &SynthParams,
    ) -> Result<(), SynthError>;

    /// True once the processor will produce no more output.
    fn is_finished(&self) -> bool {
        false
    }
}

/// Factory for a processor kind.
pub trait PluggableProcessorTemplate: fmt::Debug + Send + Sync {
    /// Processor name, used in error messages.
    fn name(&self) -> &str;

    /// Declared parameters, statics and dynamics in any order.
    fn parameters(&self) -> &[ParamDeclaration];

    /// Creates an instance from the evaluated statics (declaration order).
    fn new_processor(
        &self,
        statics: &[StaticValue],
        params: &SynthParams,
    ) -> Result<Box<dyn PluggableProcessor>, SynthError>;
}

#[derive(Clone, Debug)]
enum StaticSource {
    Int { name: &'static str, min: i64, max: i64, value: ScalarParam },
    Double { name: &'static str, min: f64, max: f64, value: ScalarParam },
    Str(String),
}

#[derive(Clone, Debug)]
struct DynamicSource {
    template: ModulatedParamTemplate,
    smoothed: bool,
    role: ParamRole,
}

fn check_int(name: &str, value: f64, min: i64, max: i64) -> Result<i64, String> {
    let rounded = libm::round(value);
    if !rounded.is_finite() || rounded < min as f64 || rounded > max as f64 {
        return Err(format!("{name} = {value} is outside [{min}, {max}]"));
    }
    Ok(rounded as i64)
}

fn check_double(name: &str, value: f64, min: f64, max: f64) -> Result<f64, String> {
    if value.is_nan() || value < min || value > max {
        return Err(format!("{name} = {value} is outside [{min}, {max}]"));
    }
    Ok(value)
}

/// Validated processor plus bindings, shared by every note.
#[derive(Clone, Debug)]
pub struct PluggableDriverTemplate {
    processor: Arc<dyn PluggableProcessorTemplate>,
    statics: Vec<StaticSource>,
    dynamics: Vec<DynamicSource>,
    smoothed_count: usize,
}

impl PluggableDriverTemplate {
    /// Checks `bindings` against the processor's declarations.
    ///
    /// Bindings are given in declaration order. Constant static values are
    /// range-checked here; accent-dependent ones are checked per note.
    pub fn new(
        processor: Arc<dyn PluggableProcessorTemplate>,
        bindings: Vec<ParamBinding>,
    ) -> Result<Self, BuildError> {
        let name = processor.name();
        let declared = processor.parameters();
        if declared.len() != bindings.len() {
            return Err(BuildError::pluggable(
                name,
                format!("expected {} parameters, got {}", declared.len(), bindings.len()),
            ));
        }

        let mut statics = Vec::new();
        let mut dynamics = Vec::new();
        let mut loudness_roles = 0;
        let mut pitch_roles = 0;
        for (decl, binding) in declared.iter().zip(bindings) {
            match (&decl.kind, binding) {
                (&ParamKind::StaticInt { min, max }, ParamBinding::Scalar(value)) => {
                    if min > max {
                        return Err(BuildError::pluggable(
                            name,
                            format!("{}: empty range", decl.name),
                        ));
                    }
                    if value.is_constant() {
                        check_int(decl.name, value.base(), min, max)
                            .map_err(|message| BuildError::pluggable(name, message))?;
                    }
                    statics.push(StaticSource::Int { name: decl.name, min, max, value });
                }
                (&ParamKind::StaticDouble { min, max }, ParamBinding::Scalar(value)) => {
                    if min > max {
                        return Err(BuildError::pluggable(
                            name,
                            format!("{}: empty range", decl.name),
                        ));
                    }
                    if value.is_constant() {
                        check_double(decl.name, value.base(), min, max)
                            .map_err(|message| BuildError::pluggable(name, message))?;
                    }
                    statics.push(StaticSource::Double { name: decl.name, min, max, value });
                }
                (ParamKind::StaticString, ParamBinding::Str(value)) => {
                    statics.push(StaticSource::Str(value));
                }
                (&ParamKind::Dynamic { smoothed, role }, ParamBinding::Modulated(template)) => {
                    match role {
                        ParamRole::Loudness => loudness_roles += 1,
                        ParamRole::Pitch => pitch_roles += 1,
                        ParamRole::None => {}
                    }
                    dynamics.push(DynamicSource { template, smoothed, role });
                }
                (kind, binding) => {
                    return Err(BuildError::pluggable(
                        name,
                        format!("{}: {kind:?} cannot be bound to {binding:?}", decl.name),
                    ));
                }
            }
        }
        if loudness_roles > 1 || pitch_roles > 1 {
            return Err(BuildError::pluggable(
                name,
                "at most one loudness and one pitch parameter allowed",
            ));
        }

        let smoothed_count = dynamics.iter().filter(|d| d.smoothed).count();
        #[cfg(feature = "tracing")]
        tracing::debug!(
            processor = name,
            statics = statics.len(),
            dynamics = dynamics.len(),
            smoothed = smoothed_count,
            "pluggable driver built"
        );
        Ok(Self {
            processor,
            statics,
            dynamics,
            smoothed_count,
        })
    }

    /// Processor name.
    pub fn name(&self) -> &str {
        self.processor.name()
    }

    /// Number of scratch regions [`PluggableDriver::apply`] leases.
    pub fn smoothed_count(&self) -> usize {
        self.smoothed_count
    }

    /// Evaluates statics, creates the processor and the dynamic chains.
    ///
    /// Returns the driver with the largest pre-origin of its chains.
    pub fn new_state(
        &self,
        accents: &Accents,
        loudness: f64,
        frequency: f64,
        hurry_up: f64,
        params: &SynthParams,
    ) -> Result<(PluggableDriver, i32), SynthError> {
        let name = self.processor.name();
        let mut statics = Vec::with_capacity(self.statics.len());
        for source in &self.statics {
            let value = match source {
                StaticSource::Int { name: param, min, max, value } => {
                    let v = value.evaluate(accents)?;
                    StaticValue::Int(check_int(param, v, *min, *max).map_err(|message| {
                        SynthError::ex(
                            SynthErrorSubCode::ParamOutOfRange,
                            format!("{name}: {message}"),
                        )
                    })?)
                }
                StaticSource::Double { name: param, min, max, value } => {
                    let v = value.evaluate(accents)?;
                    StaticValue::Double(check_double(param, v, *min, *max).map_err(|message| {
                        SynthError::ex(
                            SynthErrorSubCode::ParamOutOfRange,
                            format!("{name}: {message}"),
                        )
                    })?)
                }
                StaticSource::Str(s) => StaticValue::Str(s.clone()),
            };
            statics.push(value);
        }

        let processor = self.processor.new_processor(&statics, params)?;

        let mut pre_origin = 0;
        let mut dynamics = Vec::with_capacity(self.dynamics.len());
        let mut slots = Vec::with_capacity(self.dynamics.len());
        let mut next_slot = 0;
        for source in &self.dynamics {
            let (param, pre) = source.template.new_state(accents, hurry_up, params)?;
            pre_origin = pre_origin.max(pre);
            dynamics.push(DynamicParam {
                param,
                role: source.role,
            });
            slots.push(source.smoothed.then(|| {
                next_slot += 1;
                next_slot - 1
            }));
        }

        let values: Vec<f64> = dynamics
            .iter()
            .map(|d| d.scaled(d.param.current(), loudness, frequency))
            .collect();
        let mut driver = PluggableDriver {
            processor,
            dynamics,
            slots,
            previous: values.clone(),
            values,
            loudness,
            smoothed_count: self.smoothed_count,
        };
        driver.processor.update(&driver.values, params)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(processor = name, pre_origin, "pluggable state created");
        Ok((driver, pre_origin))
    }
}

struct DynamicParam {
    param: ModulatedParam,
    role: ParamRole,
}

impl DynamicParam {
    fn scaled(&self, value: f64, loudness: f64, frequency: f64) -> f64 {
        match self.role {
            ParamRole::None => value,
            ParamRole::Loudness => value * loudness,
            ParamRole::Pitch => value * frequency,
        }
    }
}

/// Per-note processor with its dynamic parameter chains.
pub struct PluggableDriver {
    processor: Box<dyn PluggableProcessor>,
    dynamics: Vec<DynamicParam>,
    slots: Vec<Option<usize>>,
    previous: Vec<f64>,
    values: Vec<f64>,
    loudness: f64,
    smoothed_count: usize,
}

impl PluggableDriver {
    /// Advances every dynamic chain one tick and forwards the values.
    ///
    /// `frequency` is the note frequency after multiplier and adder. While
    /// `bypass_pitch_lfos` is set the pitch parameter advances only its
    /// envelope. The first failing chain aborts the update; later parameters
    /// keep their previous block value.
    pub fn update(
        &mut self,
        frequency: f64,
        bypass_pitch_lfos: bool,
        params: &SynthParams,
    ) -> Result<(), SynthError> {
        for (i, dynamic) in self.dynamics.iter_mut().enumerate() {
            let raw = if dynamic.role == ParamRole::Pitch && bypass_pitch_lfos {
                dynamic.param.update_envelope_only(params)?
            } else {
                dynamic.param.update(frequency, params)?
            };
            self.previous[i] = self.values[i];
            self.values[i] = dynamic.scaled(raw, self.loudness, frequency);
        }
        self.processor.update(&self.values, params)
    }

    /// Current dynamic parameter values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Writes the smoothed ramps and runs the processor over one block.
    ///
    /// Ramps are leased from `arena` fresh on every call.
    pub fn apply(
        &mut self,
        left: &mut [f32],
        right: &mut [f32],
        arena: &mut ScratchArena<'_>,
        params: &SynthParams,
    ) -> Result<(), SynthError> {
        let (mut lease, _) = arena.lease(self.smoothed_count);
        for (i, dynamic) in self.dynamics.iter().enumerate() {
            let Some(slot) = self.slots[i] else { continue };
            let region = lease.region_mut(slot);
            let (start, end) = (self.previous[i] as f32, self.values[i] as f32);
            if params.interpolate_over_time && start != end && !dynamic.param.is_sample_and_hold() {
                ramp(region, start, end, dynamic.param.segment_shape());
            } else {
                fill(region, end);
            }
        }
        let smoothed = SmoothedParams {
            lease: &lease,
            slots: &self.slots,
            values: &self.values,
        };
        self.processor.apply(left, right, &smoothed, params)
    }

    /// Forwards a processor's finished flag.
    pub fn is_processor_finished(&self) -> bool {
        self.processor.is_finished()
    }

    /// True when a loudness parameter exists, its envelope has ended, and
    /// its value is zero.
    pub fn is_loudness_silent(&self) -> bool {
        self.dynamics
            .iter()
            .zip(&self.values)
            .any(|(d, &v)| d.role == ParamRole::Loudness && d.param.is_at_end() && v == 0.0)
    }

    /// Aligns every chain to `actual_pre_origin`.
    pub fn fix_up_pre_origin(&mut self, actual_pre_origin: i32) {
        for dynamic in &mut self.dynamics {
            dynamic.param.fix_up_pre_origin(actual_pre_origin);
        }
    }

    /// Releases sustain point `n` on every chain.
    pub fn key_up_sustain(&mut self, n: usize) {
        for dynamic in &mut self.dynamics {
            dynamic.param.key_up_sustain(n);
        }
    }

    /// Restarts every chain from its origin.
    pub fn retrigger_from_origin(&mut self, accents: &Accents, params: &SynthParams) {
        for dynamic in &mut self.dynamics {
            dynamic.param.retrigger_from_origin(accents, params);
        }
    }
}

impl fmt::Debug for PluggableDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluggableDriver")
            .field("values", &self.values)
            .field("smoothed_count", &self.smoothed_count)
            .finish_non_exhaustive()
    }
}
