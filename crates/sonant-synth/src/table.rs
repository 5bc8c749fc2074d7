//! Wave tables, recorded samples and their frequency-keyed multisample sets.
//!
//! A [`MultiWaveTable`] or [`MultiSample`] holds several versions of the same
//! sound, each valid up to a maximum pitch. Lookup picks the first entry whose
//! limit is at or above the requested frequency and falls back to the last
//! entry above every limit, so higher notes get band-limited material.

use alloc::format;
use alloc::sync::Arc;
use alloc::vec::Vec;
use sonant_core::{BuildError, Fixed64, lerp};

/// Frames of one single-cycle waveform each.
#[derive(Clone, Debug, PartialEq)]
pub struct WaveTable {
    data: Vec<f32>,
    frame_len: usize,
}

impl WaveTable {
    /// Builds a table from frames of equal, non-zero length.
    pub fn new(frames: &[Vec<f32>]) -> Result<Self, BuildError> {
        let Some(first) = frames.first() else {
            return Err(BuildError::InvalidWaveTable("no frames".into()));
        };
        let frame_len = first.len();
        if frame_len == 0 {
            return Err(BuildError::InvalidWaveTable("empty frame".into()));
        }
        let mut data = Vec::with_capacity(frame_len * frames.len());
        for (i, frame) in frames.iter().enumerate() {
            if frame.len() != frame_len {
                return Err(BuildError::InvalidWaveTable(format!(
                    "frame {i} has {} samples, expected {frame_len}",
                    frame.len()
                )));
            }
            data.extend_from_slice(frame);
        }
        Ok(Self { data, frame_len })
    }

    /// Single-frame table from one cycle.
    pub fn single(cycle: Vec<f32>) -> Result<Self, BuildError> {
        Self::new(&[cycle])
    }

    /// Number of frames.
    pub fn frames(&self) -> usize {
        self.data.len() / self.frame_len
    }

    /// Samples per frame.
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Frame `index` at the cycle position held in `phase`'s fraction.
    ///
    /// The fraction is scaled to the frame length in fixed point; the
    /// neighbour of the last sample wraps to the first.
    #[inline]
    pub fn lookup(&self, frame: usize, phase: Fixed64, interpolate: bool) -> f32 {
        let samples = &self.data[frame * self.frame_len..(frame + 1) * self.frame_len];
        let scaled = u64::from(phase.frac()) * self.frame_len as u64;
        let i = (scaled >> 32) as usize;
        if !interpolate {
            return samples[i];
        }
        let t = ((scaled & 0xFFFF_FFFF) >> 8) as f32 * (1.0 / 16_777_216.0);
        let next = if i + 1 == self.frame_len { 0 } else { i + 1 };
        lerp(samples[i], samples[next], t)
    }

    /// Looks up across frames at `index` in `[0, 1]`.
    ///
    /// With `across` set the two frames around the position are blended;
    /// otherwise the nearest frame is used. The last frame is read directly.
    pub fn lookup_across(&self, index: f32, phase: Fixed64, intra: bool, across: bool) -> f32 {
        let last = self.frames() - 1;
        let position = index.clamp(0.0, 1.0) * last as f32;
        if !across {
            return self.lookup(libm::roundf(position) as usize, phase, intra);
        }
        let base = position as usize;
        if base >= last {
            return self.lookup(last, phase, intra);
        }
        let t = position - base as f32;
        lerp(
            self.lookup(base, phase, intra),
            self.lookup(base + 1, phase, intra),
            t,
        )
    }
}

/// Frequency-keyed set of `T`.
#[derive(Clone, Debug)]
pub struct FrequencyRanges<T> {
    entries: Vec<(f64, Arc<T>)>,
}

impl<T> FrequencyRanges<T> {
    /// Entries as `(max_frequency, item)`, in ascending frequency order.
    pub fn new(entries: Vec<(f64, Arc<T>)>) -> Result<Self, BuildError> {
        if entries.windows(2).any(|w| !(w[0].0 < w[1].0)) {
            return Err(BuildError::InvalidConfig(
                "multisample ranges must ascend strictly".into(),
            ));
        }
        Ok(Self { entries })
    }

    /// One item for every frequency.
    pub fn single(item: Arc<T>) -> Self {
        Self {
            entries: alloc::vec![(f64::INFINITY, item)],
        }
    }

    /// Nothing; every lookup fails.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Number of ranges.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True without ranges.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Item for `frequency`, `None` if the set is empty.
    pub fn select(&self, frequency: f64) -> Option<&Arc<T>> {
        self.entries
            .iter()
            .find(|(max, _)| frequency <= *max)
            .or(self.entries.last())
            .map(|(_, item)| item)
    }
}

/// Wave tables keyed by pitch.
pub type MultiWaveTable = FrequencyRanges<WaveTable>;

/// Recorded samples keyed by pitch.
pub type MultiSample = FrequencyRanges<SampleData>;

/// Loop region over sample frames, `start` inclusive, `end` exclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LoopRegion {
    /// First frame of the loop.
    pub start: u32,
    /// Frame after the last frame of the loop.
    pub end: u32,
    /// Plays forward then backward.
    pub bidirectional: bool,
}

impl LoopRegion {
    /// Forward loop.
    pub fn new(start: u32, end: u32) -> Self {
        Self {
            start,
            end,
            bidirectional: false,
        }
    }

    /// Forward-backward loop.
    pub fn bidirectional(start: u32, end: u32) -> Self {
        Self {
            start,
            end,
            bidirectional: true,
        }
    }

    /// A loop plays only with a span of one frame, or two when bidirectional.
    pub fn exists(&self) -> bool {
        let span = self.end.saturating_sub(self.start);
        span >= if self.bidirectional { 2 } else { 1 }
    }

    /// Span in frames.
    pub fn span(&self) -> u32 {
        self.end - self.start
    }
}

/// Recorded audio with up to three loops.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleData {
    data: Vec<f32>,
    stereo: bool,
    frames: u32,
    sample_rate: f64,
    natural_frequency: f64,
    loops: [Option<LoopRegion>; 3],
}

impl SampleData {
    /// Mono sample recorded at `sample_rate` whose pitch is
    /// `natural_frequency`.
    pub fn mono(
        data: Vec<f32>,
        sample_rate: f64,
        natural_frequency: f64,
    ) -> Result<Self, BuildError> {
        Self::build(data, false, sample_rate, natural_frequency)
    }

    /// Interleaved stereo sample.
    pub fn stereo(
        data: Vec<f32>,
        sample_rate: f64,
        natural_frequency: f64,
    ) -> Result<Self, BuildError> {
        if data.len() % 2 != 0 {
            return Err(BuildError::InvalidSample("odd interleaved length".into()));
        }
        Self::build(data, true, sample_rate, natural_frequency)
    }

    fn build(
        data: Vec<f32>,
        stereo: bool,
        sample_rate: f64,
        natural_frequency: f64,
    ) -> Result<Self, BuildError> {
        if !(sample_rate > 0.0) || !(natural_frequency > 0.0) {
            return Err(BuildError::InvalidSample(
                "sample rate and natural frequency must be positive".into(),
            ));
        }
        let frames = data.len() / if stereo { 2 } else { 1 };
        let frames = u32::try_from(frames)
            .ok()
            .filter(|&f| i32::try_from(f).is_ok())
            .ok_or_else(|| BuildError::InvalidSample(format!("{frames} frames is too long")))?;
        Ok(Self {
            data,
            stereo,
            frames,
            sample_rate,
            natural_frequency,
            loops: [None; 3],
        })
    }

    /// Sets loop `n` (1 to 3).
    pub fn with_loop(mut self, n: usize, region: LoopRegion) -> Result<Self, BuildError> {
        if !(1..=3).contains(&n) {
            return Err(BuildError::InvalidSample(format!("loop {n} does not exist")));
        }
        if region.start > region.end || region.end > self.frames {
            return Err(BuildError::InvalidSample(format!(
                "loop {n} [{}, {}) outside {} frames",
                region.start, region.end, self.frames
            )));
        }
        self.loops[n - 1] = Some(region);
        Ok(self)
    }

    /// Number of frames.
    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// True for interleaved stereo.
    pub fn is_stereo(&self) -> bool {
        self.stereo
    }

    /// Recording rate.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Pitch of the recording.
    pub fn natural_frequency(&self) -> f64 {
        self.natural_frequency
    }

    /// Loop `n` (1 to 3) if it is set and long enough to play.
    pub fn playable_loop(&self, n: usize) -> Option<LoopRegion> {
        self.loops
            .get(n.checked_sub(1)?)
            .copied()
            .flatten()
            .filter(LoopRegion::exists)
    }

    /// True if any playable loop is bidirectional.
    pub fn has_bidirectional_loop(&self) -> bool {
        (1..=3).any(|n| self.playable_loop(n).is_some_and(|l| l.bidirectional))
    }

    /// Frame `frame` of a mono sample; frames outside the data read as 0.
    #[inline]
    pub fn mono_at(&self, frame: i64) -> f32 {
        usize::try_from(frame)
            .ok()
            .and_then(|i| self.data.get(i))
            .copied()
            .unwrap_or(0.0)
    }

    /// Frame `frame` of a stereo sample as `(left, right)`.
    #[inline]
    pub fn stereo_at(&self, frame: i64) -> (f32, f32) {
        match usize::try_from(frame) {
            Ok(i) if i < self.frames as usize => (self.data[2 * i], self.data[2 * i + 1]),
            _ => (0.0, 0.0),
        }
    }
}
