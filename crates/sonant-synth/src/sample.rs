//! Recorded sample playback with up to three sustain loops.
//!
//! The playhead is a [`Fixed64`] frame position advanced by a differential
//! derived from the note frequency, the sample's natural frequency and the
//! ratio of recording rate to output rate.
//!
//! # Loops
//!
//! Playback starts in the first defined loop. Releasing sustain point `n`
//! while in loop `n` moves on to the next defined loop, or out of looping.
//! A bidirectional loop that is playing backward defers the switch until it
//! turns forward again; [`Playhead::loop_state`] reports the requested
//! state while the playhead keeps using the effective one.
//!
//! | Crossing | Forward loop | Bidirectional loop | No loop |
//! |----------|--------------|--------------------|---------|
//! | end | `start + (pos - end) mod span` | `2·end - pos`, reverse | finished at the last frame |
//! | start (reversing) | | `2·start - pos`, forward | |

use alloc::sync::Arc;
use sonant_core::{
    BuildError, Fixed64, NoteContext, ScratchArena, SynthError, SynthParams, lerp,
};

use crate::oscillator::{GainSource, Oscillator, OscillatorCommon, VoiceCore};
use crate::table::{LoopRegion, MultiSample, SampleData};

/// Where the loop machine is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    /// Inside loop 1.
    Loop1,
    /// Inside loop 2.
    Loop2,
    /// Inside loop 3.
    Loop3,
    /// Playing through to the end.
    NoLoop,
    /// Past the last frame.
    Finished,
}

impl LoopState {
    fn number(self) -> Option<usize> {
        match self {
            Self::Loop1 => Some(1),
            Self::Loop2 => Some(2),
            Self::Loop3 => Some(3),
            Self::NoLoop | Self::Finished => None,
        }
    }

    /// First playable loop numbered `n` or later.
    fn first_from(sample: &SampleData, n: usize) -> Self {
        match (n..=3).find(|&k| sample.playable_loop(k).is_some()) {
            Some(1) => Self::Loop1,
            Some(2) => Self::Loop2,
            Some(3) => Self::Loop3,
            _ => Self::NoLoop,
        }
    }
}

/// Frame position and loop machine of one playing sample.
#[derive(Clone, Debug)]
pub struct Playhead {
    position: Fixed64,
    differential: Fixed64,
    state: LoopState,
    effective: LoopState,
    reversing: bool,
}

impl Playhead {
    /// At frame 0 in the sample's first playable loop.
    pub fn new(sample: &SampleData) -> Self {
        let state = LoopState::first_from(sample, 1);
        Self {
            position: Fixed64::ZERO,
            differential: Fixed64::ZERO,
            state,
            effective: state,
            reversing: false,
        }
    }

    /// Moves the playhead to `position`.
    pub fn seek(&mut self, position: Fixed64) {
        self.position = position;
    }

    /// Frames advanced per output sample.
    pub fn set_differential(&mut self, differential: Fixed64) {
        self.differential = differential;
    }

    /// Current frame position.
    pub fn position(&self) -> Fixed64 {
        self.position
    }

    /// Requested loop state.
    pub fn loop_state(&self) -> LoopState {
        self.state
    }

    /// Loop state playback is following.
    pub fn effective_loop_state(&self) -> LoopState {
        self.effective
    }

    /// True while a bidirectional loop plays backward.
    pub fn is_reversing(&self) -> bool {
        self.reversing
    }

    /// True once playback ran off the end.
    pub fn is_finished(&self) -> bool {
        self.state == LoopState::Finished
    }

    /// Releases sustain point `n`.
    pub fn key_up_sustain(&mut self, sample: &SampleData, n: usize) {
        if self.state.number() != Some(n) {
            return;
        }
        self.state = LoopState::first_from(sample, n + 1);
        if !self.reversing {
            self.effective = self.state;
        }
    }

    fn current_loop(&self, sample: &SampleData) -> Option<LoopRegion> {
        sample.playable_loop(self.effective.number()?)
    }

    /// Advances one output sample; false once finished.
    pub fn advance(&mut self, sample: &SampleData) -> bool {
        if sample.has_bidirectional_loop() {
            self.step::<true>(sample)
        } else {
            self.step::<false>(sample)
        }
    }

    #[inline]
    fn step<const BIDIRECTIONAL: bool>(&mut self, sample: &SampleData) -> bool {
        if BIDIRECTIONAL && self.reversing {
            self.position -= self.differential;
        } else {
            self.position += self.differential;
        }
        let Some(region) = self.current_loop(sample) else {
            if self.position >= Fixed64::from_int(sample.frames() as i32) {
                self.state = LoopState::Finished;
                self.effective = LoopState::Finished;
                return false;
            }
            return true;
        };

        let start = Fixed64::from_int(region.start as i32);
        let end = Fixed64::from_int(region.end as i32);
        if BIDIRECTIONAL && region.bidirectional {
            loop {
                if !self.reversing && self.position >= end {
                    self.position = end - (self.position - end);
                    self.reversing = true;
                } else if self.reversing && self.position < start {
                    self.position = start + (start - self.position);
                    self.reversing = false;
                    if self.effective != self.state {
                        self.effective = self.state;
                        return true;
                    }
                } else {
                    break;
                }
            }
        } else if self.position >= end {
            let span = Fixed64::from_int(region.span() as i32);
            self.position = start + (self.position - end).rem_euclid(span);
        }
        true
    }

    /// Frame after `frame` during playback, following a forward loop back
    /// to its start.
    #[inline]
    fn next_frame(&self, frame: i64, sample: &SampleData) -> i64 {
        match self.current_loop(sample) {
            Some(region) if !region.bidirectional && frame + 1 == i64::from(region.end) => {
                i64::from(region.start)
            }
            _ => frame + 1,
        }
    }
}

/// Generation kernel, fixed by the sample's layout and loops.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleKernel {
    /// Mono, forward loops only.
    MonoSimple,
    /// Stereo, forward loops only.
    StereoSimple,
    /// Mono with a bidirectional loop.
    MonoBidirectional,
    /// Stereo with a bidirectional loop.
    StereoBidirectional,
}

impl SampleKernel {
    fn for_sample(sample: &SampleData) -> Self {
        match (sample.is_stereo(), sample.has_bidirectional_loop()) {
            (false, false) => Self::MonoSimple,
            (true, false) => Self::StereoSimple,
            (false, true) => Self::MonoBidirectional,
            (true, true) => Self::StereoBidirectional,
        }
    }
}

/// Sample oscillator definition.
#[derive(Clone, Debug)]
pub struct SampleTemplate {
    common: OscillatorCommon,
    samples: MultiSample,
}

impl SampleTemplate {
    /// Plays `samples`, choosing one per note by frequency.
    pub fn new(common: OscillatorCommon, samples: MultiSample) -> Result<Self, BuildError> {
        common.validate()?;
        #[cfg(feature = "tracing")]
        tracing::debug!(ranges = samples.len(), "sample template built");
        Ok(Self { common, samples })
    }

    /// Shared settings.
    pub fn common(&self) -> &OscillatorCommon {
        &self.common
    }

    pub(crate) fn new_state(
        &self,
        note: &NoteContext,
        params: &SynthParams,
    ) -> Result<(SampleOscillator, i32), SynthError> {
        let (core, pre_origin) = VoiceCore::new(&self.common, note, params)?;
        let sample = self.samples.select(note.frequency_for_multisampling).cloned();
        let (playhead, kernel, (natural_frequency, rate_ratio)) = match &sample {
            Some(s) => (
                Playhead::new(s),
                SampleKernel::for_sample(s),
                (s.natural_frequency(), s.sample_rate() / params.sample_rate),
            ),
            None => (
                Playhead {
                    position: Fixed64::ZERO,
                    differential: Fixed64::ZERO,
                    state: LoopState::Finished,
                    effective: LoopState::Finished,
                    reversing: false,
                },
                SampleKernel::MonoSimple,
                (1.0, 0.0),
            ),
        };
        let mut state = SampleOscillator {
            core,
            sample,
            playhead,
            kernel,
            natural_frequency,
            rate_ratio,
        };
        state.refresh_differential();
        Ok((state, pre_origin))
    }
}

/// Per-note sample playback.
#[derive(Debug)]
pub struct SampleOscillator {
    core: VoiceCore,
    sample: Option<Arc<SampleData>>,
    playhead: Playhead,
    kernel: SampleKernel,
    natural_frequency: f64,
    rate_ratio: f64,
}

impl SampleOscillator {
    /// The playhead.
    pub fn playhead(&self) -> &Playhead {
        &self.playhead
    }

    /// Kernel chosen for the sample.
    pub fn kernel(&self) -> SampleKernel {
        self.kernel
    }

    fn refresh_differential(&mut self) {
        let frames_per_sample =
            (self.core.frequency() / self.natural_frequency * self.rate_ratio).max(0.0);
        self.playhead
            .set_differential(Fixed64::from_f64(frames_per_sample));
    }
}

fn play<G: GainSource>(
    kernel: SampleKernel,
    playhead: &mut Playhead,
    sample: &SampleData,
    left: &mut [f32],
    right: &mut [f32],
    gain: &G,
    params: &SynthParams,
) {
    let interpolate = params.interpolate_intra_wave;
    match kernel {
        SampleKernel::MonoSimple => {
            play_kernel::<false, false, G>(playhead, sample, left, right, gain, interpolate);
        }
        SampleKernel::StereoSimple => {
            play_kernel::<true, false, G>(playhead, sample, left, right, gain, interpolate);
        }
        SampleKernel::MonoBidirectional => {
            play_kernel::<false, true, G>(playhead, sample, left, right, gain, interpolate);
        }
        SampleKernel::StereoBidirectional => {
            play_kernel::<true, true, G>(playhead, sample, left, right, gain, interpolate);
        }
    }
}

#[inline]
fn play_kernel<const STEREO: bool, const BIDIRECTIONAL: bool, G: GainSource>(
    playhead: &mut Playhead,
    sample: &SampleData,
    left: &mut [f32],
    right: &mut [f32],
    gain: &G,
    interpolate: bool,
) {
    for (i, (l, r)) in left.iter_mut().zip(right.iter_mut()).enumerate() {
        if playhead.is_finished() {
            break;
        }
        let frame = i64::from(playhead.position.int());
        let (value_left, value_right) = if interpolate {
            let next = playhead.next_frame(frame, sample);
            let t = playhead.position.frac_f32();
            if STEREO {
                let (a_left, a_right) = sample.stereo_at(frame);
                let (b_left, b_right) = sample.stereo_at(next);
                (lerp(a_left, b_left, t), lerp(a_right, b_right, t))
            } else {
                let v = lerp(sample.mono_at(frame), sample.mono_at(next), t);
                (v, v)
            }
        } else if STEREO {
            sample.stereo_at(frame)
        } else {
            let v = sample.mono_at(frame);
            (v, v)
        };
        let (gain_left, gain_right) = gain.at(i);
        *l += value_left * gain_left;
        *r += value_right * gain_right;
        playhead.step::<BIDIRECTIONAL>(sample);
    }
}

impl Oscillator for SampleOscillator {
    fn fix_up_pre_origin(&mut self, actual_pre_origin: i32) {
        self.core.fix_up_pre_origin(actual_pre_origin);
    }

    fn update_envelopes(&mut self, params: &SynthParams) -> Result<(), SynthError> {
        if !self.core.advance(params)? {
            return Ok(());
        }
        self.refresh_differential();
        self.core.update_effects(params)
    }

    fn generate(
        &mut self,
        left: &mut [f32],
        right: &mut [f32],
        arena: &mut ScratchArena<'_>,
        params: &SynthParams,
    ) -> Result<(), SynthError> {
        if self.core.is_delayed() || self.is_finished() {
            return Ok(());
        }
        let Self {
            core,
            sample,
            playhead,
            kernel,
            ..
        } = self;
        let Some(sample) = sample.as_deref() else {
            return Ok(());
        };
        let kernel = *kernel;
        core.render(left, right, arena, params, |core, left, right, arena| {
            let frames = left.len();
            if core.loudness_ramps(params) {
                let (mut lease, _) = arena.lease(2);
                let [gain_left, gain_right] = lease.split::<2>();
                let gain = core.ramped_gain(&mut gain_left[..frames], &mut gain_right[..frames]);
                play(kernel, playhead, sample, left, right, &gain, params);
            } else {
                play(kernel, playhead, sample, left, right, &core.flat_gain(), params);
            }
            Ok(())
        })
    }

    fn is_finished(&self) -> bool {
        self.sample.is_none() || self.playhead.is_finished() || self.core.is_loudness_silent()
    }

    fn key_up_sustain(&mut self, n: usize) {
        self.core.key_up_sustain(n);
        if let Some(sample) = &self.sample {
            self.playhead.key_up_sustain(sample, n);
        }
    }

    fn restart(&mut self, note: &NoteContext, params: &SynthParams) {
        self.core.restart(note, params);
    }
}
