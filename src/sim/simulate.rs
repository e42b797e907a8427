//! One homogenization request from parameters to a serializable result.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use ndarray::{Array2, Zip};
use serde::Serialize;
use tracing::{info, warn};

use super::conductivity::{ConductivityField, validate_kappa1};
use super::context::SimContext;
use super::effective::{EffectiveProperties, aggregate};
use super::solver::{FieldSolution, SolveBudget, SolveReport, solve_canonical};
use super::surrogate::SurrogatePrediction;
use crate::error::{HomogError, Result, SimWarning};
use crate::microstructure::{MicrostructureSource, PhaseMask};

/// Per-request knobs that do not change the physics.
#[derive(Debug, Clone)]
pub struct SimulationOptions {
    /// Also run the surrogate when one is loaded.
    pub run_surrogate: bool,
    /// Wall-clock budget for the solve. The tighter of this and
    /// `SolverConfig::time_budget_ms` wins.
    pub timeout: Option<Duration>,
    /// Set to `true` from another thread to stop the solve early.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            run_surrogate: true,
            timeout: None,
            cancel: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulationRequest {
    pub mask: PhaseMask,
    pub kappa1: f64,
    /// Load angle in degrees, measured from the x axis.
    pub alpha_deg: f64,
    pub options: SimulationOptions,
    /// Non-fatal findings carried over from ingestion.
    pub warnings: Vec<SimWarning>,
}

impl SimulationRequest {
    pub fn new(mask: PhaseMask, kappa1: f64, alpha_deg: f64) -> Self {
        Self {
            mask,
            kappa1,
            alpha_deg,
            options: SimulationOptions::default(),
            warnings: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: SimulationOptions) -> Self {
        self.options = options;
        self
    }

    /// Validates the parameters, then ingests `source` through `ctx`.
    pub fn from_source(
        ctx: &SimContext,
        source: &MicrostructureSource,
        kappa1: f64,
        alpha_deg: f64,
    ) -> Result<Self> {
        validate_parameters(kappa1, alpha_deg)?;
        let ingested = ctx.ingest(source)?;
        Ok(Self {
            warnings: ingested.warnings,
            ..Self::new(ingested.mask, kappa1, alpha_deg)
        })
    }

    fn budget(&self, config_budget_ms: Option<u64>) -> SolveBudget {
        let timeout = match (self.options.timeout, config_budget_ms.map(Duration::from_millis)) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        SolveBudget {
            deadline: timeout.map(|t| Instant::now() + t),
            cancel: self.options.cancel.clone(),
        }
    }
}

/// Checks `kappa1` and `alpha_deg` without touching any field data.
pub fn validate_parameters(kappa1: f64, alpha_deg: f64) -> Result<()> {
    validate_kappa1(kappa1)?;
    if !alpha_deg.is_finite() || !(0.0..=90.0).contains(&alpha_deg) {
        return Err(HomogError::invalid(
            "alpha",
            format!("must be an angle in [0, 90] degrees, got {alpha_deg}"),
        ));
    }
    Ok(())
}

/// Everything a homogenization request returns.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationResult {
    /// The phase mask as 0.0/1.0.
    pub image: Array2<f64>,
    /// Conductivity per cell.
    pub param_field: Array2<f64>,
    pub temp0: Array2<f64>,
    pub temp1: Array2<f64>,
    pub flux_norm0: Array2<f64>,
    pub flux_norm1: Array2<f64>,
    #[serde(flatten)]
    pub properties: EffectiveProperties,
    pub alpha_deg: f64,
    /// `|q|` under a unit gradient along the load angle.
    pub flux_norm_alpha: Array2<f64>,
    pub solver: [SolveReport; 2],
    pub warnings: Vec<SimWarning>,
    pub surrogate_results: Option<SurrogatePrediction>,
}

/// Runs the full spectral homogenization for `request`.
///
/// Non-converged solves still return their best estimate, with a
/// [`SimWarning::Convergence`] per affected load case. A failing surrogate
/// never fails the request.
pub fn simulate(ctx: &SimContext, request: &SimulationRequest) -> Result<SimulationResult> {
    validate_parameters(request.kappa1, request.alpha_deg)?;
    let start = Instant::now();
    let config = ctx.config();

    let field = ConductivityField::build(&request.mask, request.kappa1)?;
    let budget = request.budget(config.solver.time_budget_ms);
    let [sx, sy] = solve_canonical(&field, &config.solver, &budget)?;

    let mut warnings = request.warnings.clone();
    for report in [&sx.report, &sy.report] {
        if let Some(w) = report.warning() {
            let w = SimWarning::Convergence(w);
            warn!("{w}");
            warnings.push(w);
        }
    }

    let properties = aggregate(
        request.mask.volume_fraction(),
        request.kappa1,
        sx.mean_flux(),
        sy.mean_flux(),
        request.alpha_deg,
    )?;
    let flux_norm_alpha = superposed_flux_norm(&sx, &sy, request.alpha_deg);

    let surrogate_results = if request.options.run_surrogate && ctx.surrogate().has_surrogate() {
        match ctx
            .surrogate()
            .predict(&request.mask, request.kappa1, request.alpha_deg)
        {
            Ok(prediction) => Some(prediction),
            Err(e) => {
                let w = SimWarning::SurrogateSkipped {
                    reason: e.to_string(),
                };
                warn!("{w}");
                warnings.push(w);
                None
            }
        }
    } else {
        None
    };

    info!(
        n = request.mask.size(),
        kappa1 = request.kappa1,
        alpha = request.alpha_deg,
        vol_frac = properties.vol_frac,
        eig = ?properties.eig_kappa,
        warnings = warnings.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "simulation finished"
    );

    Ok(SimulationResult {
        image: request.mask.to_image(),
        param_field: field.values().clone(),
        flux_norm0: sx.flux_norm(),
        flux_norm1: sy.flux_norm(),
        temp0: sx.temperature,
        temp1: sy.temperature,
        properties,
        alpha_deg: request.alpha_deg,
        flux_norm_alpha,
        solver: [sx.report, sy.report],
        warnings,
        surrogate_results,
    })
}

/// Runs only the surrogate; errors are returned as-is.
pub fn predict_surrogate(ctx: &SimContext, request: &SimulationRequest) -> Result<SurrogatePrediction> {
    validate_parameters(request.kappa1, request.alpha_deg)?;
    ctx.surrogate()
        .predict(&request.mask, request.kappa1, request.alpha_deg)
}

/// Flux magnitude for `E = (cos a, sin a)`, by linearity of the cell problem.
fn superposed_flux_norm(x: &FieldSolution, y: &FieldSolution, alpha_deg: f64) -> Array2<f64> {
    let (s, c) = alpha_deg.to_radians().sin_cos();
    let qx = &x.flux[0] * c + &y.flux[0] * s;
    let qy = &x.flux[1] * c + &y.flux[1] * s;
    Zip::from(&qx).and(&qy).map_collect(|a, b| a.hypot(*b))
}
