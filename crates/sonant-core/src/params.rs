//! Engine-wide synthesis configuration.
//!
//! [`SynthParams`] is handed to every template constructor and to every
//! per-tick and per-block call. It never changes while a voice is alive.
//!
//! ```rust
//! use sonant_core::SynthParams;
//!
//! let params = SynthParams::default()
//!     .with_sample_rate(44100.0)
//!     .with_envelope_rate(441.0);
//! assert!(params.validate().is_ok());
//! assert_eq!(params.frames_per_tick(), 100.0);
//! ```

use crate::error::BuildError;
use alloc::format;

/// Engine configuration shared by all oscillators and effects.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SynthParams {
    /// Output sample rate in Hz.
    pub sample_rate: f64,
    /// Envelope ticks per second.
    pub envelope_rate: f64,
    /// Gain applied to every oscillator's loudness.
    pub overall_volume_scaling: f64,
    /// Ramp block-rate parameters across each generated block.
    pub interpolate_over_time: bool,
    /// Interpolate between adjacent samples of a wave table.
    pub interpolate_intra_wave: bool,
    /// Interpolate between adjacent waves of a multi-wave table.
    pub interpolate_across_waves: bool,
    /// Largest `frames` value ever passed to a generate call.
    pub max_block_frames: usize,
}

impl Default for SynthParams {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            envelope_rate: 400.0,
            overall_volume_scaling: 1.0,
            interpolate_over_time: true,
            interpolate_intra_wave: true,
            interpolate_across_waves: true,
            max_block_frames: 256,
        }
    }
}

impl SynthParams {
    /// Sets the sample rate.
    #[must_use]
    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Sets the envelope tick rate.
    #[must_use]
    pub fn with_envelope_rate(mut self, envelope_rate: f64) -> Self {
        self.envelope_rate = envelope_rate;
        self
    }

    /// Sets the global volume scaling.
    #[must_use]
    pub fn with_overall_volume_scaling(mut self, scaling: f64) -> Self {
        self.overall_volume_scaling = scaling;
        self
    }

    /// Enables or disables per-sample ramping of block-rate parameters.
    #[must_use]
    pub fn with_interpolate_over_time(mut self, enabled: bool) -> Self {
        self.interpolate_over_time = enabled;
        self
    }

    /// Enables or disables intra-wave interpolation.
    #[must_use]
    pub fn with_interpolate_intra_wave(mut self, enabled: bool) -> Self {
        self.interpolate_intra_wave = enabled;
        self
    }

    /// Enables or disables cross-wave interpolation.
    #[must_use]
    pub fn with_interpolate_across_waves(mut self, enabled: bool) -> Self {
        self.interpolate_across_waves = enabled;
        self
    }

    /// Sets the largest block size.
    #[must_use]
    pub fn with_max_block_frames(mut self, frames: usize) -> Self {
        self.max_block_frames = frames;
        self
    }

    /// Audio frames per envelope tick.
    pub fn frames_per_tick(&self) -> f64 {
        self.sample_rate / self.envelope_rate
    }

    /// Nyquist frequency in Hz.
    pub fn nyquist(&self) -> f64 {
        self.sample_rate * 0.5
    }

    /// Checks that every field is usable.
    pub fn validate(&self) -> Result<(), BuildError> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(BuildError::InvalidConfig(format!(
                "sample rate must be positive, got {}",
                self.sample_rate
            )));
        }
        if !(self.envelope_rate.is_finite() && self.envelope_rate > 0.0) {
            return Err(BuildError::InvalidConfig(format!(
                "envelope rate must be positive, got {}",
                self.envelope_rate
            )));
        }
        if self.envelope_rate > self.sample_rate {
            return Err(BuildError::InvalidConfig(format!(
                "envelope rate {} exceeds sample rate {}",
                self.envelope_rate, self.sample_rate
            )));
        }
        if !self.overall_volume_scaling.is_finite() {
            return Err(BuildError::InvalidConfig(
                "overall volume scaling must be finite".into(),
            ));
        }
        if self.max_block_frames == 0 {
            return Err(BuildError::InvalidConfig(
                "max block frames must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(SynthParams::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_sample_rate() {
        let err = SynthParams::default().with_sample_rate(0.0).validate();
        assert!(matches!(err, Err(BuildError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_envelope_rate_above_sample_rate() {
        let params = SynthParams::default()
            .with_sample_rate(1000.0)
            .with_envelope_rate(2000.0);
        assert!(params.validate().is_err());
    }

    #[test]
    fn rejects_empty_blocks() {
        assert!(SynthParams::default().with_max_block_frames(0).validate().is_err());
    }

    #[test]
    fn frames_per_tick() {
        let params = SynthParams::default()
            .with_sample_rate(48000.0)
            .with_envelope_rate(400.0);
        assert_eq!(params.frames_per_tick(), 120.0);
    }
}
