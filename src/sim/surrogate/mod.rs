//! Optional learned surrogate for the homogenization solve.
//!
//! A surrogate maps `(mask, kappa1, alpha)` straight to approximate fields and
//! effective properties without iterating. Whether one is loaded is an
//! explicit state ([`SurrogateSlot`]); call sites never null-check a model.

pub mod fno;

use std::fmt;
use std::sync::Arc;

use ndarray::Array2;
use serde::Serialize;

use super::effective::EffectiveProperties;
use crate::error::{HomogError, Result};
use crate::microstructure::PhaseMask;

pub use fno::{Dense, FnoModel, FnoWeights, FourierLayerWeights};

/// Approximate output of a surrogate, shaped like the solver's result.
#[derive(Debug, Clone, Serialize)]
pub struct SurrogatePrediction {
    pub temp0: Array2<f64>,
    pub temp1: Array2<f64>,
    pub flux_norm0: Array2<f64>,
    pub flux_norm1: Array2<f64>,
    #[serde(flatten)]
    pub properties: EffectiveProperties,
}

/// A pre-trained approximator. Implementations must be safe for concurrent
/// read-only inference.
pub trait Surrogate: Send + Sync {
    fn name(&self) -> &str;

    fn predict(&self, mask: &PhaseMask, kappa1: f64, alpha_deg: f64)
    -> Result<SurrogatePrediction>;
}

/// Surrogate capability of a process: absent, or a loaded read-only model.
#[derive(Clone, Default)]
pub enum SurrogateSlot {
    #[default]
    Absent,
    Loaded(Arc<dyn Surrogate>),
}

impl SurrogateSlot {
    pub fn loaded(model: impl Surrogate + 'static) -> Self {
        SurrogateSlot::Loaded(Arc::new(model))
    }

    pub fn has_surrogate(&self) -> bool {
        matches!(self, SurrogateSlot::Loaded(_))
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            SurrogateSlot::Absent => None,
            SurrogateSlot::Loaded(model) => Some(model.name()),
        }
    }

    /// Runs the loaded model. Never falls back to the full solver.
    pub fn predict(
        &self,
        mask: &PhaseMask,
        kappa1: f64,
        alpha_deg: f64,
    ) -> Result<SurrogatePrediction> {
        match self {
            SurrogateSlot::Absent => Err(HomogError::surrogate("no surrogate model is loaded")),
            SurrogateSlot::Loaded(model) => model.predict(mask, kappa1, alpha_deg),
        }
    }
}

impl fmt::Debug for SurrogateSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurrogateSlot::Absent => write!(f, "SurrogateSlot::Absent"),
            SurrogateSlot::Loaded(model) => write!(f, "SurrogateSlot::Loaded({})", model.name()),
        }
    }
}
