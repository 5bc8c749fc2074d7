//! Sonant Core - numeric substrate for per-voice synthesis
//!
//! This crate provides the building blocks every sonant oscillator and effect
//! is made of, designed for real-time generation with zero allocation in the
//! audio path.
//!
//! # Core Abstractions
//!
//! ## Phase and Kernels
//!
//! - [`Fixed64`] - 32.32 fixed-point phase and sample position
//! - [`vector`] - Elementwise block kernels and the additive/multiplicative
//!   recurrences that ramp block-rate parameters across a block
//! - [`iir`] - Direct-I (four-wide closed form), direct-II and first-order
//!   all-pole kernels with explicit history
//!
//! ## Filters
//!
//! - [`lowpass_coefficients`] / [`bandpass_coefficients`] - RBJ cookbook
//!   second-order designs for the [`iir`] kernels
//! - [`one_pole_lowpass`] - 6 dB/oct lowpass for power detectors
//!
//! ## Modulation
//!
//! - [`EnvelopeTemplate`] / [`EnvelopeState`] - Envelope contract
//! - [`LfoTemplate`] / [`LfoState`] - LFO contract
//! - [`SegmentEnvelope`], [`ConstantEnvelope`], [`Lfo`] - Reference implementations
//! - [`ModulatedParam`] - Envelope followed by an LFO chain, with previous and
//!   current tick values
//! - [`ScalarParam`] - Accent-modulated constant
//! - [`NoteContext`] - Per-note activation inputs
//!
//! ## Host Processors
//!
//! - [`PluggableDriverTemplate`] / [`PluggableDriver`] - Parameter marshaling
//!   for host-defined processors
//!
//! ## Scratch Memory
//!
//! - [`Workspace`] / [`ScratchArena`] / [`WorkspaceLease`] - Per-cycle scratch
//!   regions, re-leased every cycle
//!
//! ## Utilities
//!
//! - [`SynthParams`] - Engine configuration
//! - [`SynthError`] / [`BuildError`] - Runtime and construction failures
//! - Math functions: [`db_to_linear`], [`linear_to_db`], [`pan_split`], [`soft_limit`]
//!
//! # no_std Support
//!
//! This crate is `no_std` compatible (it needs `alloc`). Disable the default
//! `std` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! sonant-core = { version = "0.1", default-features = false }
//! ```
//!
//! # Design Principles
//!
//! - **Real-time safe**: No allocations in update or generate paths
//! - **No dependencies on std**: `libm` for math
//! - **Templates are immutable**: per-note state owns everything it mutates

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod accent;
pub mod biquad;
pub mod envelope;
pub mod error;
pub mod fixed64;
pub mod iir;
pub mod lfo;
pub mod math;
pub mod modulation;
pub mod note;
pub mod one_pole;
pub mod params;
pub mod pluggable;
pub mod vector;
pub mod workspace;

// Re-export main types at crate root
pub use accent::{Accents, NUM_ACCENTS, ParamFormula, ScalarParam};
pub use biquad::{bandpass_coefficients, lowpass_coefficients};
pub use envelope::{MAX_SUSTAIN_POINTS, Segment, SegmentEnvelope};
pub use error::{BuildError, SynthError, SynthErrorSubCode};
pub use fixed64::Fixed64;
pub use iir::{
    Iir1Coefficients, Iir2Coefficients, Iir2DirectIIState, Iir2DirectIState, Iir2Unrolled,
};
pub use lfo::{Lfo, LfoMode, LfoWaveform};
pub use math::{
    DECIBEL_FLOOR, LINEAR_FLOOR, db_to_linear, flush_denormal, lerp, linear_to_db, pan_split,
    soft_limit,
};
pub use modulation::{
    ConstantEnvelope, EnvelopeState, EnvelopeTemplate, LfoState, LfoTemplate, ModulatedParam,
    ModulatedParamTemplate, SegmentShape, ramp,
};
pub use note::NoteContext;
pub use one_pole::one_pole_lowpass;
pub use params::SynthParams;
pub use pluggable::{
    ParamBinding, ParamDeclaration, ParamKind, ParamRole, PluggableDriver, PluggableDriverTemplate,
    PluggableProcessor, PluggableProcessorTemplate, SmoothedParams, StaticValue,
};
pub use workspace::{REGION_ALIGN, ScratchArena, Workspace, WorkspaceLease};
