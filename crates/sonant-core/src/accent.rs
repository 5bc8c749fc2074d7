//! Note accents and accent-modulated scalar parameters.
//!
//! Every note carries a small vector of [`Accents`]. Block-rate controls that
//! are not driven by an envelope (track effect settings, pluggable static
//! parameters, envelope amplitudes) are [`ScalarParam`]s:
//!
//! ```text
//! value = formula(base + Σ accent[i] * weight[i])
//! ```
//!
//! The optional formula is a [`ParamFormula`]; closures implement it directly.
//!
//! ```rust
//! use sonant_core::{Accents, ScalarParam};
//!
//! let cutoff = ScalarParam::constant(1000.0).with_accent(0, 500.0);
//! let accents = Accents::ZERO.with(0, 2.0);
//! assert_eq!(cutoff.evaluate(&accents).unwrap(), 2000.0);
//! ```

use crate::error::SynthError;
use alloc::sync::Arc;
use core::fmt;

/// Number of accent slots per note.
pub const NUM_ACCENTS: usize = 8;

/// Per-note accent values.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Accents(pub [f64; NUM_ACCENTS]);

impl Accents {
    /// All accents zero.
    pub const ZERO: Self = Self([0.0; NUM_ACCENTS]);

    /// Returns a copy with slot `index` set to `value`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= NUM_ACCENTS`.
    #[must_use]
    pub fn with(mut self, index: usize, value: f64) -> Self {
        self.0[index] = value;
        self
    }

    /// Value of slot `index`.
    pub fn get(&self, index: usize) -> f64 {
        self.0[index]
    }

    /// Weighted sum `Σ accent[i] * weights[i]`.
    pub fn dot(&self, weights: &[f64; NUM_ACCENTS]) -> f64 {
        self.0.iter().zip(weights).map(|(a, w)| a * w).sum()
    }
}

/// Post-processing hook for a [`ScalarParam`].
///
/// Receives the accent-weighted value and the note's accents, returns the
/// final value or an evaluation failure.
pub trait ParamFormula: Send + Sync {
    /// Evaluates the formula.
    fn evaluate(&self, value: f64, accents: &Accents) -> Result<f64, SynthError>;
}

impl<F> ParamFormula for F
where
    F: Fn(f64, &Accents) -> Result<f64, SynthError> + Send + Sync,
{
    fn evaluate(&self, value: f64, accents: &Accents) -> Result<f64, SynthError> {
        self(value, accents)
    }
}

/// Accent-modulated constant with an optional formula.
#[derive(Clone)]
pub struct ScalarParam {
    base: f64,
    weights: [f64; NUM_ACCENTS],
    formula: Option<Arc<dyn ParamFormula>>,
}

impl ScalarParam {
    /// A parameter that always evaluates to `base`.
    pub fn constant(base: f64) -> Self {
        Self {
            base,
            weights: [0.0; NUM_ACCENTS],
            formula: None,
        }
    }

    /// Adds `weight * accent[index]` to the value.
    #[must_use]
    pub fn with_accent(mut self, index: usize, weight: f64) -> Self {
        self.weights[index] = weight;
        self
    }

    /// Attaches a formula applied after the accent sum.
    #[must_use]
    pub fn with_formula(mut self, formula: Arc<dyn ParamFormula>) -> Self {
        self.formula = Some(formula);
        self
    }

    /// Base value before accents.
    pub fn base(&self) -> f64 {
        self.base
    }

    /// True when the value does not depend on accents or a formula.
    pub fn is_constant(&self) -> bool {
        self.formula.is_none() && self.weights.iter().all(|&w| w == 0.0)
    }

    /// Evaluates the parameter for a note.
    pub fn evaluate(&self, accents: &Accents) -> Result<f64, SynthError> {
        let value = self.base + accents.dot(&self.weights);
        match &self.formula {
            Some(formula) => formula.evaluate(value, accents),
            None => Ok(value),
        }
    }
}

impl Default for ScalarParam {
    fn default() -> Self {
        Self::constant(0.0)
    }
}

impl fmt::Debug for ScalarParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalarParam")
            .field("base", &self.base)
            .field("weights", &self.weights)
            .field("formula", &self.formula.is_some())
            .finish()
    }
}

impl From<f64> for ScalarParam {
    fn from(base: f64) -> Self {
        Self::constant(base)
    }
}
