//! Sonant Synth - per-voice oscillators
//!
//! This crate provides the oscillators a voice is made of, built on
//! sonant-core and sonant-effects.
//!
//! # Oscillators
//!
//! - [`sample`] - Recorded sample playback with three sustain loops,
//!   forward or bidirectional
//! - [`algorithmic`] - Pulse and ramp waveforms computed from phase
//! - [`fm`] - Statement-programmed FM network with a block-rate prefix
//! - [`pluggable`] - Host-defined processors
//!
//! All four share the lifecycle in [`oscillator`]: a template built once,
//! per-note states from [`OscillatorTemplate::new_state`], one
//! `update_envelopes` per tick and one `generate` per block.
//!
//! # Tables
//!
//! - [`WaveTable`] / [`MultiWaveTable`] - Single-cycle frames keyed by pitch
//! - [`SampleData`] / [`MultiSample`] - Recordings keyed by pitch
//!
//! # Pooling
//!
//! [`FreeLists`] recycles the boxes of finalized Sample, Algorithmic and FM
//! states.
//!
//! ## Example
//!
//! ```rust
//! use sonant_core::{ModulatedParamTemplate, NoteContext, SynthParams, Workspace};
//! use sonant_synth::{
//!     AlgorithmicTemplate, AlgorithmicWaveform, FreeLists, Oscillator, OscillatorCommon,
//!     OscillatorTemplate,
//! };
//!
//! let template: OscillatorTemplate = AlgorithmicTemplate::new(
//!     OscillatorCommon::default(),
//!     AlgorithmicWaveform::Ramp,
//!     ModulatedParamTemplate::constant(0.5),
//! )
//! .unwrap()
//! .into();
//!
//! let params = SynthParams::default();
//! let mut pools = FreeLists::default();
//! let (mut state, pre_origin) = template
//!     .new_state(&NoteContext::new(440.0), &params, &mut pools)
//!     .unwrap();
//! state.fix_up_pre_origin(pre_origin);
//!
//! let mut workspace = Workspace::new(120, 8);
//! let mut left = vec![0.0f32; 120];
//! let mut right = vec![0.0f32; 120];
//! state.update_envelopes(&params).unwrap();
//! state.generate(&mut left, &mut right, &mut workspace.arena(120), &params).unwrap();
//! assert!(left.iter().any(|&x| x != 0.0));
//!
//! state.finalize(&mut pools);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod algorithmic;
pub mod fm;
pub mod oscillator;
pub mod pluggable;
pub mod pool;
pub mod sample;
pub mod table;

// Re-export main types at crate root
pub use algorithmic::{
    AlgorithmicKernel, AlgorithmicOscillator, AlgorithmicTemplate, AlgorithmicWaveform,
    index_threshold, pulse_wave, ramp_wave,
};
pub use fm::{FmOscillator, FmStatement, FmSynthTemplate, LEFT, ONE, RIGHT};
pub use oscillator::{Oscillator, OscillatorCommon, OscillatorState, OscillatorTemplate};
pub use pluggable::{PluggableOscillator, PluggableOscillatorTemplate};
pub use pool::{FreeLists, Freelist};
pub use sample::{LoopState, Playhead, SampleKernel, SampleOscillator, SampleTemplate};
pub use table::{
    FrequencyRanges, LoopRegion, MultiSample, MultiWaveTable, SampleData, WaveTable,
};
