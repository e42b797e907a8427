//! Spectral homogenization of two-phase periodic cells.
//!
//! ```text
//! PhaseMask ──► ConductivityField ──► solver (X, Y in parallel) ──► effective
//!                                 └─► surrogate (optional) ─────────┘
//! ```

pub mod conductivity;
pub mod config;
pub mod context;
pub mod effective;
pub mod green;
pub mod simulate;
pub mod solver;
pub mod spectral;
pub mod surrogate;

pub use conductivity::{ConductivityField, KAPPA0};
pub use config::HomogConfig;
pub use context::{Capabilities, SimContext};
pub use effective::{EffectiveProperties, reuss_bound, voigt_bound};
pub use green::KappaRef;
pub use simulate::{
    SimulationOptions, SimulationRequest, SimulationResult, predict_surrogate, simulate,
    validate_parameters,
};
pub use solver::{
    FieldSolution, LoadCase, SolveBudget, SolveReport, SolverConfig, SolverScheme,
    solve_canonical, solve_load_case,
};
pub use surrogate::{FnoModel, Surrogate, SurrogatePrediction, SurrogateSlot};
