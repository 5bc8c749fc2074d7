//! Error types shared by every sonant crate.
//!
//! Two families exist:
//!
//! - [`SynthError`] is returned from the per-tick and per-block paths
//!   (`update_envelopes`, `generate`, `apply`). `Ok(())` is the success code.
//!   Failures from nested envelope, LFO or formula evaluation are propagated
//!   unchanged.
//! - [`BuildError`] is returned while building templates from an instrument
//!   definition. It never appears on the audio path.
//!
//! Programming-invariant violations (an unknown statement kind executing in
//! the block-rate partition, an exhausted workspace) are not represented here;
//! they panic.

use alloc::string::String;
use core::fmt;
use thiserror::Error;

/// Detail code attached to [`SynthError::Ex`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SynthErrorSubCode {
    /// A pluggable parameter evaluated outside its declared range.
    ParamOutOfRange,
    /// A pluggable processor reported a failure of its own.
    ProcessorFailed,
    /// Free-form failure with a custom message.
    Custom,
}

impl fmt::Display for SynthErrorSubCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::ParamOutOfRange => "parameter out of range",
            Self::ProcessorFailed => "processor failed",
            Self::Custom => "error",
        };
        f.write_str(text)
    }
}

/// Runtime failure from envelope, LFO, formula or processor evaluation.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum SynthError {
    /// A parameter formula or evaluator failed.
    #[error("evaluation failed: {0}")]
    Evaluation(String),

    /// A parameter formula divided by zero.
    #[error("division by zero during parameter evaluation")]
    DivideByZero,

    /// Extended failure with a sub-code and message.
    #[error("{sub_code}: {message}")]
    Ex {
        /// What went wrong.
        sub_code: SynthErrorSubCode,
        /// Human-readable detail.
        message: String,
    },
}

impl SynthError {
    /// Creates an extended error.
    pub fn ex(sub_code: SynthErrorSubCode, message: impl Into<String>) -> Self {
        Self::Ex {
            sub_code,
            message: message.into(),
        }
    }
}

/// Template construction failure.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum BuildError {
    /// Engine configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A pluggable processor was configured with the wrong parameters.
    #[error("pluggable '{processor}': {message}")]
    Pluggable {
        /// Name of the processor.
        processor: String,
        /// What is wrong.
        message: String,
    },

    /// A statement that depends on per-sample phase sits in the block-rate prefix.
    #[error(
        "statement {index} reads per-sample state but precedes the block-rate boundary {boundary}"
    )]
    StatementPartition {
        /// Offending statement index.
        index: usize,
        /// Boundary index (`num_optimizable`).
        boundary: usize,
    },

    /// A statement references a variable slot outside the variable array.
    #[error("statement {index} references variable {variable} but only {count} exist")]
    VariableOutOfRange {
        /// Offending statement index.
        index: usize,
        /// Referenced slot.
        variable: usize,
        /// Number of variables.
        count: usize,
    },

    /// A lookahead compressor was placed on an oscillator.
    #[error("peak-lookahead compression is only available on tracks")]
    LookaheadOnOscillator,

    /// Wave table dimensions are inconsistent.
    #[error("invalid wave table: {0}")]
    InvalidWaveTable(String),

    /// Sample data or loop points are inconsistent.
    #[error("invalid sample: {0}")]
    InvalidSample(String),

    /// Vocoder band/order configuration does not match its wave table.
    #[error("invalid vocoder: {0}")]
    InvalidVocoder(String),
}

impl BuildError {
    /// Creates a pluggable configuration error.
    pub fn pluggable(processor: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Pluggable {
            processor: processor.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn ex_display_includes_sub_code() {
        let err = SynthError::ex(SynthErrorSubCode::ParamOutOfRange, "gain must be in [0, 4]");
        assert_eq!(err.to_string(), "parameter out of range: gain must be in [0, 4]");
    }

    #[test]
    fn pluggable_display() {
        let err = BuildError::pluggable("ringmod", "expected 3 parameters, got 2");
        assert_eq!(err.to_string(), "pluggable 'ringmod': expected 3 parameters, got 2");
    }

    #[test]
    fn partition_display() {
        let err = BuildError::StatementPartition {
            index: 1,
            boundary: 2,
        };
        assert!(err.to_string().contains("statement 1"));
    }
}
