//! Segment envelope: a breakpoint envelope with sustain points and an origin.
//!
//! The envelope starts at an initial level and walks a list of segments, each
//! moving to a target level over a duration with a linear or exponential
//! shape. Up to three segments may be marked as sustain points: once such a
//! segment completes the envelope holds its level until the matching
//! `key_up_sustain(n)` releases it.
//!
//! # Origin
//!
//! The origin is the segment index that coincides with audible time zero.
//! Segments before it form the pre-origin lead-in, reported in ticks from
//! `new_state`, so that several envelopes on one note can be aligned. The
//! caller passes the largest lead-in of all generators back through
//! `fix_up_initial_delay`, and envelopes with a shorter lead-in hold their
//! initial level for the difference.
//!
//! # Example
//!
//! ```rust
//! use sonant_core::{Accents, EnvelopeTemplate, SegmentEnvelope, SegmentShape, SynthParams};
//!
//! let params = SynthParams::default().with_envelope_rate(100.0);
//! let env = SegmentEnvelope::new(0.0)
//!     .segment(1.0, 0.02, SegmentShape::Linear)
//!     .sustain(1)
//!     .segment(0.0, 0.02, SegmentShape::Linear);
//! let (mut state, pre_origin) = env.new_state(&Accents::ZERO, 1.0, &params).unwrap();
//! assert_eq!(pre_origin, 0);
//! assert_eq!(state.update(&params).unwrap(), 0.5);
//! assert_eq!(state.update(&params).unwrap(), 1.0);
//! assert_eq!(state.update(&params).unwrap(), 1.0); // holding
//! state.key_up_sustain(1);
//! assert_eq!(state.update(&params).unwrap(), 0.5);
//! ```

use crate::accent::{Accents, ScalarParam};
use crate::error::SynthError;
use crate::math::LINEAR_FLOOR;
use crate::modulation::{EnvelopeState, EnvelopeTemplate, SegmentShape};
use crate::params::SynthParams;
use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use libm::{pow, round};

/// Number of sustain points an envelope can carry.
pub const MAX_SUSTAIN_POINTS: usize = 3;

/// One envelope segment.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Segment {
    /// Level reached at the end of the segment.
    pub target: f64,
    /// Duration in seconds.
    pub duration: f64,
    /// Interpolation shape.
    pub shape: SegmentShape,
}

/// Breakpoint envelope template.
#[derive(Clone, Debug)]
pub struct SegmentEnvelope {
    initial: f64,
    segments: Vec<Segment>,
    sustain_points: [Option<usize>; MAX_SUSTAIN_POINTS],
    origin: usize,
    amplitude: ScalarParam,
}

impl SegmentEnvelope {
    /// Creates an envelope starting at `initial` with no segments.
    pub fn new(initial: f64) -> Self {
        Self {
            initial,
            segments: Vec::new(),
            sustain_points: [None; MAX_SUSTAIN_POINTS],
            origin: 0,
            amplitude: ScalarParam::constant(1.0),
        }
    }

    /// Appends a segment.
    #[must_use]
    pub fn segment(mut self, target: f64, duration: f64, shape: SegmentShape) -> Self {
        self.segments.push(Segment {
            target,
            duration: duration.max(0.0),
            shape,
        });
        self
    }

    /// Marks the last appended segment as sustain point `n` (1-based).
    ///
    /// # Panics
    ///
    /// Panics if no segment exists yet or `n` is not in `1..=3`.
    #[must_use]
    pub fn sustain(mut self, n: usize) -> Self {
        assert!((1..=MAX_SUSTAIN_POINTS).contains(&n), "sustain point {n} out of range");
        assert!(!self.segments.is_empty(), "sustain point needs a segment");
        self.sustain_points[n - 1] = Some(self.segments.len() - 1);
        self
    }

    /// Sets the origin to the next segment appended.
    #[must_use]
    pub fn origin_here(mut self) -> Self {
        self.origin = self.segments.len();
        self
    }

    /// Scales every level by an accent-modulated amplitude.
    #[must_use]
    pub fn amplitude(mut self, amplitude: ScalarParam) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// Ticks spent in `segment` at the given tick rate.
    fn ticks(segment: &Segment, hurry_up: f64, params: &SynthParams) -> u32 {
        let hurry = if hurry_up > 0.0 { hurry_up } else { 1.0 };
        round(segment.duration * params.envelope_rate / hurry).max(0.0) as u32
    }
}

impl EnvelopeTemplate for SegmentEnvelope {
    fn new_state(
        &self,
        accents: &Accents,
        hurry_up: f64,
        params: &SynthParams,
    ) -> Result<(Box<dyn EnvelopeState>, i32), SynthError> {
        let amplitude = self.amplitude.evaluate(accents)?;
        let segments: Arc<[TimedSegment]> = self
            .segments
            .iter()
            .map(|s| TimedSegment {
                target: s.target,
                ticks: Self::ticks(s, hurry_up, params),
                shape: s.shape,
            })
            .collect();
        let origin = self.origin.min(segments.len());
        let pre_origin: u32 = segments[..origin].iter().map(|s| s.ticks).sum();
        let pre_origin = i32::try_from(pre_origin).unwrap_or(i32::MAX);

        let state = SegmentEnvelopeState {
            segments,
            sustain_points: self.sustain_points,
            released: [false; MAX_SUSTAIN_POINTS],
            origin,
            amplitude,
            index: 0,
            tick: 0,
            start: self.initial,
            level: self.initial,
            initial: self.initial,
            delay_ticks: 0,
            pre_origin,
            holding: false,
        };
        Ok((Box::new(state), pre_origin))
    }
}

#[derive(Clone, Copy, Debug)]
struct TimedSegment {
    target: f64,
    ticks: u32,
    shape: SegmentShape,
}

struct SegmentEnvelopeState {
    segments: Arc<[TimedSegment]>,
    sustain_points: [Option<usize>; MAX_SUSTAIN_POINTS],
    released: [bool; MAX_SUSTAIN_POINTS],
    origin: usize,
    amplitude: f64,
    index: usize,
    tick: u32,
    start: f64,
    level: f64,
    initial: f64,
    delay_ticks: i32,
    pre_origin: i32,
    holding: bool,
}

impl SegmentEnvelopeState {
    fn sustains_after(&self, index: usize) -> bool {
        self.sustain_points
            .iter()
            .zip(&self.released)
            .any(|(point, released)| *point == Some(index) && !released)
    }

    /// Moves past the segment at `index`, entering a hold if it sustains.
    fn complete_segment(&mut self) {
        let finished = self.index;
        self.level = self.segments[finished].target;
        self.start = self.level;
        self.tick = 0;
        self.index += 1;
        self.holding = self.sustains_after(finished);
    }
}

fn interpolate(shape: SegmentShape, start: f64, end: f64, t: f64) -> f64 {
    let opposite = (start < 0.0 && end > 0.0) || (start > 0.0 && end < 0.0);
    match shape {
        SegmentShape::Exponential if !opposite => {
            let floor = f64::from(LINEAR_FLOOR);
            let a = start.abs().max(floor);
            let b = end.abs().max(floor);
            let sign = if start < 0.0 || end < 0.0 { -1.0 } else { 1.0 };
            sign * a * pow(b / a, t)
        }
        _ => start + (end - start) * t,
    }
}

impl EnvelopeState for SegmentEnvelopeState {
    fn update(&mut self, _params: &SynthParams) -> Result<f64, SynthError> {
        if self.delay_ticks > 0 {
            self.delay_ticks -= 1;
            return Ok(self.level * self.amplitude);
        }
        if self.holding {
            return Ok(self.level * self.amplitude);
        }
        // zero-length segments jump straight to their target
        while self.index < self.segments.len() && self.segments[self.index].ticks == 0 {
            self.complete_segment();
            if self.holding {
                return Ok(self.level * self.amplitude);
            }
        }
        if self.index >= self.segments.len() {
            return Ok(self.level * self.amplitude);
        }

        let segment = self.segments[self.index];
        self.tick += 1;
        if self.tick >= segment.ticks {
            self.complete_segment();
        } else {
            let t = f64::from(self.tick) / f64::from(segment.ticks);
            self.level = interpolate(segment.shape, self.start, segment.target, t);
        }
        Ok(self.level * self.amplitude)
    }

    fn initial_value(&self) -> f64 {
        self.initial * self.amplitude
    }

    fn key_up_sustain(&mut self, n: usize) {
        if !(1..=MAX_SUSTAIN_POINTS).contains(&n) {
            return;
        }
        self.released[n - 1] = true;
        if self.holding && !self.index.checked_sub(1).is_some_and(|i| self.sustains_after(i)) {
            self.holding = false;
        }
    }

    fn retrigger_from_origin(&mut self, _accents: &Accents, _params: &SynthParams) {
        self.index = self.origin;
        self.tick = 0;
        self.start = self.level;
        self.released = [false; MAX_SUSTAIN_POINTS];
        self.holding = false;
        self.delay_ticks = 0;
    }

    fn fix_up_initial_delay(&mut self, actual_pre_origin: i32) {
        self.delay_ticks = actual_pre_origin.saturating_sub(self.pre_origin).max(0);
    }

    fn is_at_end(&self) -> bool {
        self.index >= self.segments.len()
    }

    fn segment_shape(&self) -> SegmentShape {
        if self.holding || self.delay_ticks > 0 {
            return SegmentShape::Linear;
        }
        self.segments
            .get(self.index)
            .map_or(SegmentShape::Linear, |s| s.shape)
    }
}
