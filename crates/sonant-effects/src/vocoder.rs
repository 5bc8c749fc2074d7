//! Wave-table driven vocoder filter bank.
//!
//! Every band is a cascade of `orders` constant-peak bandpass sections. The
//! band layout comes from a [`VocoderTable`]: each frame holds four values per
//! band, `(center, bandwidth, gain, unused)`, with center and bandwidth given
//! as a fraction of Nyquist. The wave-table index control selects a position
//! between frames and the band parameters are interpolated between the two
//! adjacent frames (the last frame is read directly).
//!
//! # Signal Flow
//!
//! ```text
//!            ┌→ copy → BP → … → BP ×gain₀ ┐
//! Input ─────┼→ copy → BP → … → BP ×gain₁ ┼─ Σ → Output
//!            └→ copy → BP → … → BP ×gainₙ ┘
//! ```
//!
//! Coefficients are recomputed only when the index or output scaling differs
//! from the values of the last rebuild; creating a state always builds once.
//! [`VocoderState::coefficient_rebuilds`] counts rebuilds.

use alloc::format;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use sonant_core::iir::{iir2_direct_i_in_place, iir2_direct_i_macc};
use sonant_core::vector::{copy, zero};
use sonant_core::{
    Accents, BuildError, Iir2Coefficients, Iir2DirectIState, Iir2Unrolled, ModulatedParam,
    ModulatedParamTemplate, ScalarParam, ScratchArena, SynthError, SynthParams,
    bandpass_coefficients, lerp,
};

/// Values stored per band in every frame.
pub const VALUES_PER_BAND: usize = 4;

/// Band layouts, one frame per wave-table position.
#[derive(Clone, Debug, PartialEq)]
pub struct VocoderTable {
    values: Vec<f32>,
    bands: usize,
}

impl VocoderTable {
    /// Builds a table from frames of `4 * bands` values.
    ///
    /// # Errors
    ///
    /// [`BuildError::InvalidVocoder`] when there are no frames, no bands, or a
    /// frame has the wrong length.
    pub fn new(bands: usize, frames: &[Vec<f32>]) -> Result<Self, BuildError> {
        if bands == 0 {
            return Err(BuildError::InvalidVocoder("band count is zero".into()));
        }
        if frames.is_empty() {
            return Err(BuildError::InvalidVocoder("wave table has no frames".into()));
        }
        let frame_len = bands * VALUES_PER_BAND;
        let mut values = Vec::with_capacity(frame_len * frames.len());
        for (i, frame) in frames.iter().enumerate() {
            if frame.len() != frame_len {
                return Err(BuildError::InvalidVocoder(format!(
                    "frame {i} holds {} values, {bands} bands need {frame_len}",
                    frame.len()
                )));
            }
            values.extend_from_slice(frame);
        }
        Ok(Self { values, bands })
    }

    /// Number of bands.
    pub fn bands(&self) -> usize {
        self.bands
    }

    /// Number of frames.
    pub fn frames(&self) -> usize {
        self.values.len() / (self.bands * VALUES_PER_BAND)
    }

    fn frame(&self, index: usize) -> &[f32] {
        let len = self.bands * VALUES_PER_BAND;
        &self.values[index * len..(index + 1) * len]
    }
}

/// Wave-table position in `[0, 1]` and output scaling.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VocoderControls<P> {
    /// Position across the table's frames.
    pub wave_table_index: P,
    /// Multiplies every band gain.
    pub output_scaling: P,
}

impl<P> VocoderControls<P> {
    /// Applies `f` to both controls.
    pub fn map<Q>(&self, mut f: impl FnMut(&P) -> Q) -> VocoderControls<Q> {
        VocoderControls {
            wave_table_index: f(&self.wave_table_index),
            output_scaling: f(&self.output_scaling),
        }
    }

    /// Like [`map`](Self::map), stopping at the first error.
    pub fn try_map<Q, E>(
        &self,
        mut f: impl FnMut(&P) -> Result<Q, E>,
    ) -> Result<VocoderControls<Q>, E> {
        Ok(VocoderControls {
            wave_table_index: f(&self.wave_table_index)?,
            output_scaling: f(&self.output_scaling)?,
        })
    }
}

/// Where the vocoder sits, with the matching control sources.
#[derive(Clone, Debug)]
pub enum VocoderPlacement {
    /// On a track; controls re-evaluated from accents every tick.
    Track(VocoderControls<ScalarParam>),
    /// In an oscillator's effect chain.
    Oscillator(VocoderControls<ModulatedParamTemplate>),
}

/// Immutable vocoder definition.
#[derive(Clone, Debug)]
pub struct VocoderTemplate {
    table: Arc<VocoderTable>,
    orders: usize,
    placement: VocoderPlacement,
}

impl VocoderTemplate {
    /// Creates a vocoder with `orders` sections per band.
    ///
    /// # Errors
    ///
    /// [`BuildError::InvalidVocoder`] for a zero order count.
    pub fn new(
        table: Arc<VocoderTable>,
        orders: usize,
        placement: VocoderPlacement,
    ) -> Result<Self, BuildError> {
        if orders == 0 {
            return Err(BuildError::InvalidVocoder("filter order is zero".into()));
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(
            bands = table.bands(),
            frames = table.frames(),
            orders,
            "vocoder template built"
        );
        Ok(Self {
            table,
            orders,
            placement,
        })
    }

    /// Sections per band.
    pub fn orders(&self) -> usize {
        self.orders
    }

    /// Control placement.
    pub fn placement(&self) -> &VocoderPlacement {
        &self.placement
    }

    /// Band layouts.
    pub fn table(&self) -> &Arc<VocoderTable> {
        &self.table
    }

    /// Creates the filter matrix and builds its coefficients once.
    pub fn new_state(
        &self,
        accents: &Accents,
        hurry_up: f64,
        params: &SynthParams,
    ) -> Result<(VocoderState, i32), SynthError> {
        let (controls, initial, pre_origin) = match &self.placement {
            VocoderPlacement::Track(scalars) => {
                let initial = scalars.try_map(|p| p.evaluate(accents))?;
                (ControlState::Track(scalars.clone()), initial, 0)
            }
            VocoderPlacement::Oscillator(templates) => {
                let mut pre_origin = 0;
                let chains = templates.try_map(|t| {
                    let (param, p) = t.new_state(accents, hurry_up, params)?;
                    pre_origin = pre_origin.max(p);
                    Ok::<_, SynthError>(param)
                })?;
                let initial = chains.map(ModulatedParam::current);
                (ControlState::Oscillator(chains), initial, pre_origin)
            }
        };

        let bands = self.table.bands();
        let mut state = VocoderState {
            table: Arc::clone(&self.table),
            orders: self.orders,
            controls,
            index: initial.wave_table_index,
            scaling: initial.output_scaling,
            built: (f64::NAN, f64::NAN),
            sections: vec![Iir2Unrolled::new(Iir2Coefficients::IDENTITY); bands],
            history: vec![Iir2DirectIState::default(); 2 * bands * self.orders],
            gains: vec![0.0; 2 * bands],
            rebuilds: 0,
        };
        state.rebuild(params);
        Ok((state, pre_origin))
    }
}

#[derive(Debug)]
enum ControlState {
    Track(VocoderControls<ScalarParam>),
    Oscillator(VocoderControls<ModulatedParam>),
}

/// Per-note or per-track vocoder.
///
/// History is laid out channel-major, then band, then section.
#[derive(Debug)]
pub struct VocoderState {
    table: Arc<VocoderTable>,
    orders: usize,
    controls: ControlState,
    index: f64,
    scaling: f64,
    built: (f64, f64),
    sections: Vec<Iir2Unrolled>,
    history: Vec<Iir2DirectIState>,
    gains: Vec<f32>,
    rebuilds: u64,
}

impl VocoderState {
    /// How many times the coefficients were recomputed.
    pub fn coefficient_rebuilds(&self) -> u64 {
        self.rebuilds
    }

    /// Current band gain for `channel` (0 left, 1 right).
    pub fn band_gain(&self, channel: usize, band: usize) -> f32 {
        self.gains[channel * self.table.bands() + band]
    }

    /// Current section coefficients of `band`.
    pub fn band_coefficients(&self, band: usize) -> Iir2Coefficients {
        self.sections[band].coefficients()
    }

    /// Re-evaluates track controls. Does nothing for oscillator placement.
    pub fn track_update_state(
        &mut self,
        accents: &Accents,
        _params: &SynthParams,
    ) -> Result<(), SynthError> {
        let ControlState::Track(scalars) = &self.controls else {
            return Ok(());
        };
        let values = scalars.try_map(|p| p.evaluate(accents))?;
        self.index = values.wave_table_index;
        self.scaling = values.output_scaling;
        Ok(())
    }

    /// Advances oscillator control chains one tick. Does nothing for track
    /// placement.
    ///
    /// A failing index chain leaves the scaling chain un-advanced and both
    /// block values unchanged.
    pub fn osc_update_envelopes(
        &mut self,
        frequency: f64,
        params: &SynthParams,
    ) -> Result<(), SynthError> {
        let ControlState::Oscillator(chains) = &mut self.controls else {
            return Ok(());
        };
        chains.wave_table_index.update(frequency, params)?;
        chains.output_scaling.update(frequency, params)?;
        self.index = chains.wave_table_index.current();
        self.scaling = chains.output_scaling.current();
        Ok(())
    }

    fn rebuild(&mut self, params: &SynthParams) {
        let table = &self.table;
        let bands = table.bands();
        let last = table.frames() - 1;
        let position = self.index.clamp(0.0, 1.0) * last as f64;
        let (base, frac) = if params.interpolate_across_waves {
            let base = libm::floor(position) as usize;
            (base, (position - base as f64) as f32)
        } else {
            (libm::round(position) as usize, 0.0)
        };

        let sample_rate = params.sample_rate as f32;
        let nyquist = sample_rate * 0.5;
        let scaling = self.scaling as f32;
        let lower = table.frame(base.min(last));
        let upper = (base < last).then(|| table.frame(base + 1));
        for band in 0..bands {
            let at = |k: usize| {
                let v = lower[band * VALUES_PER_BAND + k];
                upper.map_or(v, |u| lerp(v, u[band * VALUES_PER_BAND + k], frac))
            };
            let coefficients =
                bandpass_coefficients(at(0).abs() * nyquist, at(1).abs() * nyquist, sample_rate);
            self.sections[band] = Iir2Unrolled::new(coefficients);
            let gain = at(2) * scaling;
            self.gains[band] = gain;
            self.gains[bands + band] = gain;
        }
        self.built = (self.index, self.scaling);
        self.rebuilds += 1;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            index = self.index,
            scaling = self.scaling,
            rebuilds = self.rebuilds,
            "vocoder coefficients rebuilt"
        );
    }

    /// Filters one stereo block in place.
    ///
    /// Two regions are leased from `arena`: the per-band working copy and
    /// the band sum.
    pub fn apply(
        &mut self,
        left: &mut [f32],
        right: &mut [f32],
        arena: &mut ScratchArena<'_>,
        params: &SynthParams,
    ) -> Result<(), SynthError> {
        assert_eq!(left.len(), right.len(), "channel length mismatch");
        if self.built != (self.index, self.scaling) {
            self.rebuild(params);
        }
        let frames = left.len();
        let bands = self.table.bands();
        let orders = self.orders;

        let (mut lease, _) = arena.lease(2);
        let [work, sum] = lease.split::<2>();
        let (work, sum) = (&mut work[..frames], &mut sum[..frames]);

        for (channel, data) in [left, right].into_iter().enumerate() {
            zero(sum);
            for band in 0..bands {
                let section = &self.sections[band];
                let first = (channel * bands + band) * orders;
                let (cascade, last) = self.history[first..first + orders].split_at_mut(orders - 1);
                copy(data, work);
                for history in cascade {
                    iir2_direct_i_in_place(section, history, work);
                }
                let gain = self.gains[channel * bands + band];
                iir2_direct_i_macc(section, &mut last[0], work, sum, gain);
            }
            copy(sum, data);
        }
        Ok(())
    }

    /// Aligns oscillator control chains to `actual_pre_origin`.
    pub fn fix_up_pre_origin(&mut self, actual_pre_origin: i32) {
        if let ControlState::Oscillator(chains) = &mut self.controls {
            chains.wave_table_index.fix_up_pre_origin(actual_pre_origin);
            chains.output_scaling.fix_up_pre_origin(actual_pre_origin);
        }
    }

    /// Releases sustain point `n` on oscillator control chains.
    pub fn key_up_sustain(&mut self, n: usize) {
        if let ControlState::Oscillator(chains) = &mut self.controls {
            chains.wave_table_index.key_up_sustain(n);
            chains.output_scaling.key_up_sustain(n);
        }
    }

    /// Restarts oscillator control chains from their origin.
    pub fn retrigger_from_origin(&mut self, accents: &Accents, params: &SynthParams) {
        if let ControlState::Oscillator(chains) = &mut self.controls {
            chains.wave_table_index.retrigger_from_origin(accents, params);
            chains.output_scaling.retrigger_from_origin(accents, params);
        }
    }
}
