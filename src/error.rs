use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the homogenization core.
///
/// Every variant carries enough context to tell the caller what to change.
/// Non-fatal conditions are reported as [`SimWarning`] instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HomogError {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("sample id {id} is out of range: the dataset holds {count} samples (valid ids 0..{count})")]
    OutOfRange { id: usize, count: usize },

    #[error("could not decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },

    #[error(
        "degenerate microstructure: conductive fraction is {fraction}, both phases must be present"
    )]
    DegenerateMicrostructure { fraction: f64 },

    #[error("solver diverged for load case {load_case} at iteration {iteration}: residual is {residual}")]
    SolverDiverged {
        load_case: usize,
        iteration: usize,
        residual: f64,
    },

    #[error("non-physical effective tensor: eigenvalues {eigenvalues:?} must be positive")]
    NonPhysicalResult { eigenvalues: [f64; 2] },

    #[error("surrogate unavailable: {reason}")]
    SurrogateUnavailable { reason: String },
}

impl HomogError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    pub(crate) fn decode(what: &'static str, reason: impl Into<String>) -> Self {
        Self::Decode {
            what,
            reason: reason.into(),
        }
    }

    pub(crate) fn surrogate(reason: impl Into<String>) -> Self {
        Self::SurrogateUnavailable {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HomogError>;

/// Why an iterative solve stopped before reaching its tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Converged,
    IterationCap,
    Deadline,
    Cancelled,
    /// Search directions ran out while the true residual was still above tolerance.
    Stagnated,
}

/// Non-fatal: the solver returned its best estimate without meeting the tolerance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvergenceWarning {
    pub load_case: usize,
    pub iterations: usize,
    pub residual: f64,
    pub tolerance: f64,
    pub reason: StopReason,
}

/// Warnings attached to ingestion and simulation results.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SimWarning {
    /// Volume fraction outside `[low, high]`: solvable but numerically stiff.
    StiffVolumeFraction { fraction: f64, low: f64, high: f64 },
    Convergence(ConvergenceWarning),
    /// The surrogate was requested but could not run; the full solve still ships.
    SurrogateSkipped { reason: String },
}

impl std::fmt::Display for SimWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimWarning::StiffVolumeFraction {
                fraction,
                low,
                high,
            } => write!(
                f,
                "conductive fraction {fraction:.4} is outside [{low}, {high}], the solve may be stiff"
            ),
            SimWarning::Convergence(w) => write!(
                f,
                "load case {} stopped ({:?}) after {} iterations with residual {:.3e} (tolerance {:.1e})",
                w.load_case, w.reason, w.iterations, w.residual, w.tolerance
            ),
            SimWarning::SurrogateSkipped { reason } => write!(f, "surrogate skipped: {reason}"),
        }
    }
}
