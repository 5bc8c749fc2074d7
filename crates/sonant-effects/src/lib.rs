//! Sonant Effects - effect units for per-voice synthesis
//!
//! This crate provides the effects that post-process oscillator output,
//! built on sonant-core:
//!
//! - [`compressor`] - Dynamics compressor with RMS, rectified, peak and
//!   peak-lookahead detection, a ratio-derived gain curve and soft limiter
//! - [`vocoder`] - Wave-table driven bank of cascaded bandpass sections
//! - [`pluggable`] - Host-defined processors behind the sonant-core driver
//! - [`chain`] - Oscillator effect chains and track effects
//!
//! Every effect exists in two placements. In an oscillator's
//! [`EffectChain`] its controls are envelope/LFO chains advanced every tick;
//! on a track ([`TrackEffect`]) they are accent-scaled constants.
//!
//! ## Example
//!
//! ```rust
//! use sonant_core::{ModulatedParamTemplate, NoteContext, SynthParams, Workspace};
//! use sonant_effects::{
//!     CompressorControls, CompressorMode, CompressorPlacement, CompressorTemplate,
//!     EffectChainTemplate,
//! };
//!
//! let controls = CompressorControls::DEFAULT.map(|&v| ModulatedParamTemplate::constant(v));
//! let compressor =
//!     CompressorTemplate::new(CompressorMode::Rms, CompressorPlacement::Oscillator(controls))
//!         .unwrap();
//! let chain = EffectChainTemplate::new().with(compressor);
//!
//! let params = SynthParams::default();
//! let (mut state, pre_origin) = chain.new_state(&NoteContext::default(), &params).unwrap();
//! state.fix_up_pre_origin(pre_origin);
//! state.osc_update_envelopes(440.0, &params).unwrap();
//!
//! let mut workspace = Workspace::new(128, 4);
//! let mut left = vec![0.2f32; 128];
//! let mut right = vec![0.2f32; 128];
//! state.apply(&mut left, &mut right, &mut workspace.arena(128), &params).unwrap();
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod chain;
pub mod compressor;
pub mod pluggable;
pub mod vocoder;

// Re-export main types at crate root
pub use chain::{
    EffectChain, EffectChainTemplate, OscEffect, OscEffectTemplate, TrackEffect,
    TrackEffectTemplate,
};
pub use compressor::{
    CompressorControls, CompressorMode, CompressorPlacement, CompressorState, CompressorTemplate,
    GainCurve,
};
pub use pluggable::{PluggableEffect, PluggableEffectTemplate};
pub use vocoder::{VocoderControls, VocoderPlacement, VocoderState, VocoderTable, VocoderTemplate};
