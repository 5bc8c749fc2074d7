//! Per-note activation inputs.

use crate::accent::Accents;

/// Everything a note hands to the states it creates.
///
/// ```rust
/// use sonant_core::{Accents, NoteContext};
///
/// let note = NoteContext::new(220.0)
///     .with_loudness(0.8)
///     .with_accents(Accents::ZERO.with(0, 1.0));
/// assert_eq!(note.frequency_for_multisampling, 220.0);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NoteContext {
    /// Accent values for parameter evaluation.
    pub accents: Accents,
    /// Note loudness.
    pub loudness: f64,
    /// Envelope time compression; 1 plays segments at their nominal length.
    /// Non-positive or non-finite values are read as 1, see
    /// [`NoteContext::time_scale`].
    pub hurry_up: f64,
    /// Pan position, -1 (left) to +1 (right).
    pub stereo_position: f64,
    /// Pitch in Hz before frequency multiplier and adder.
    pub initial_frequency: f64,
    /// Pitch used to pick a multisampled table or sample.
    pub frequency_for_multisampling: f64,
    /// Ticks during which pitch LFOs are bypassed.
    pub pitch_lfo_startup_ticks: u32,
}

impl NoteContext {
    /// A centered, full-loudness note at `frequency`.
    pub fn new(frequency: f64) -> Self {
        Self {
            accents: Accents::ZERO,
            loudness: 1.0,
            hurry_up: 1.0,
            stereo_position: 0.0,
            initial_frequency: frequency,
            frequency_for_multisampling: frequency,
            pitch_lfo_startup_ticks: 0,
        }
    }

    /// Sets the accents.
    pub fn with_accents(mut self, accents: Accents) -> Self {
        self.accents = accents;
        self
    }

    /// Sets the loudness.
    pub fn with_loudness(mut self, loudness: f64) -> Self {
        self.loudness = loudness;
        self
    }

    /// Sets the envelope time compression.
    pub fn with_hurry_up(mut self, hurry_up: f64) -> Self {
        self.hurry_up = hurry_up;
        self
    }

    /// The usable time compression: `hurry_up` when it is finite and
    /// positive, 1 otherwise.
    pub fn time_scale(&self) -> f64 {
        if self.hurry_up.is_finite() && self.hurry_up > 0.0 {
            self.hurry_up
        } else {
            1.0
        }
    }

    /// Sets the pan position.
    pub fn with_stereo_position(mut self, position: f64) -> Self {
        self.stereo_position = position;
        self
    }

    /// Sets the pitch used for table selection.
    pub fn with_frequency_for_multisampling(mut self, frequency: f64) -> Self {
        self.frequency_for_multisampling = frequency;
        self
    }

    /// Sets the pitch-LFO bypass length.
    pub fn with_pitch_lfo_startup_ticks(mut self, ticks: u32) -> Self {
        self.pitch_lfo_startup_ticks = ticks;
        self
    }
}

impl Default for NoteContext {
    fn default() -> Self {
        Self::new(440.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_scale_ignores_unusable_hurry_up() {
        assert_eq!(NoteContext::new(440.0).with_hurry_up(2.0).time_scale(), 2.0);
        assert_eq!(NoteContext::new(440.0).with_hurry_up(0.0).time_scale(), 1.0);
        assert_eq!(NoteContext::new(440.0).with_hurry_up(-3.0).time_scale(), 1.0);
        assert_eq!(NoteContext::new(440.0).with_hurry_up(f64::NAN).time_scale(), 1.0);
        assert_eq!(NoteContext::new(440.0).with_hurry_up(f64::INFINITY).time_scale(), 1.0);
    }
}
