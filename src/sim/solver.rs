//! FFT-accelerated Lippmann–Schwinger solver for periodic conduction.
//!
//! For an imposed mean gradient `E` the gradient field is split as
//! `e = E + e~` with `e~` compatible (curl-free, zero mean). Equilibrium
//! `div(kappa e) = 0` is equivalent to `Gamma0[kappa e] = 0`, which gives the
//! linear system
//!
//! ```text
//! Gamma0[kappa e~] = -Gamma0[kappa E]
//! ```
//!
//! `Gamma0 kappa` is symmetric positive definite on compatible fields, so it
//! is solved with conjugate gradients. The classic Moulinec–Suquet fixed point
//! `e <- e - Gamma0[kappa e]` is kept as an alternative scheme.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::conductivity::ConductivityField;
use super::green::{GreenOperator, KappaRef};
use super::spectral::integrate_gradient;
use crate::error::{ConvergenceWarning, HomogError, Result, StopReason};

/// Iteration scheme of the spectral solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverScheme {
    #[default]
    ConjugateGradient,
    FixedPoint,
}

/// Configuration for the spectral solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub scheme: SolverScheme,
    pub kappa_ref: KappaRef,
    /// Tolerance on the equilibrium residual, measured in flux units
    /// relative to the mean flux.
    pub tolerance: f64,
    /// Maximum number of iterations per load case.
    pub max_iterations: usize,
    /// Wall-clock budget per request in milliseconds.
    pub time_budget_ms: Option<u64>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            scheme: SolverScheme::ConjugateGradient,
            kappa_ref: KappaRef::ArithmeticMean,
            tolerance: 1e-6,
            max_iterations: 1000,
            time_budget_ms: None,
        }
    }
}

/// External limits checked at every iteration.
#[derive(Debug, Clone, Default)]
pub struct SolveBudget {
    pub deadline: Option<Instant>,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl SolveBudget {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            cancel: None,
        }
    }

    fn exhausted(&self) -> Option<StopReason> {
        if let Some(flag) = &self.cancel {
            if flag.load(Ordering::Relaxed) {
                return Some(StopReason::Cancelled);
            }
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(StopReason::Deadline),
            _ => None,
        }
    }
}

/// One of the two canonical macroscopic gradient directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadCase {
    /// `E = (1, 0)`.
    X,
    /// `E = (0, 1)`.
    Y,
}

impl LoadCase {
    pub const ALL: [LoadCase; 2] = [LoadCase::X, LoadCase::Y];

    pub fn index(self) -> usize {
        match self {
            LoadCase::X => 0,
            LoadCase::Y => 1,
        }
    }

    pub fn direction(self) -> [f64; 2] {
        match self {
            LoadCase::X => [1.0, 0.0],
            LoadCase::Y => [0.0, 1.0],
        }
    }
}

/// Diagnostics of a single load-case solve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolveReport {
    pub load_case: usize,
    pub scheme: SolverScheme,
    pub kappa_ref: f64,
    pub iterations: usize,
    pub residual: f64,
    pub tolerance: f64,
    pub stop: StopReason,
}

impl SolveReport {
    pub fn converged(&self) -> bool {
        self.stop == StopReason::Converged
    }

    /// Warning to ship alongside a best-effort (non-converged) solution.
    pub fn warning(&self) -> Option<ConvergenceWarning> {
        (!self.converged()).then(|| ConvergenceWarning {
            load_case: self.load_case,
            iterations: self.iterations,
            residual: self.residual,
            tolerance: self.tolerance,
            reason: self.stop,
        })
    }
}

/// Temperature and flux fields for one imposed gradient direction.
#[derive(Debug, Clone)]
pub struct FieldSolution {
    /// Imposed mean gradient `E`.
    pub direction: [f64; 2],
    /// Full temperature `E·x + T~`.
    pub temperature: Array2<f64>,
    /// Gradient `grad T`, components x and y.
    pub gradient: [Array2<f64>; 2],
    /// Flux `kappa grad T`, components x and y.
    pub flux: [Array2<f64>; 2],
    pub report: SolveReport,
}

impl FieldSolution {
    pub fn flux_norm(&self) -> Array2<f64> {
        let [qx, qy] = &self.flux;
        ndarray::Zip::from(qx)
            .and(qy)
            .map_collect(|&a, &b| a.hypot(b))
    }

    /// Volume-averaged flux.
    pub fn mean_flux(&self) -> [f64; 2] {
        let [qx, qy] = &self.flux;
        [mean(qx), mean(qy)]
    }
}

/// Solves the periodic cell problem for one canonical load case.
pub fn solve_load_case(
    field: &ConductivityField,
    load: LoadCase,
    config: &SolverConfig,
    budget: &SolveBudget,
) -> Result<FieldSolution> {
    solve_direction(field, load.direction(), load.index(), config, budget)
}

/// Solves both canonical load cases concurrently.
pub fn solve_canonical(
    field: &ConductivityField,
    config: &SolverConfig,
    budget: &SolveBudget,
) -> Result<[FieldSolution; 2]> {
    let (x, y) = rayon::join(
        || solve_load_case(field, LoadCase::X, config, budget),
        || solve_load_case(field, LoadCase::Y, config, budget),
    );
    Ok([x?, y?])
}

/// Solves the cell problem for an arbitrary imposed gradient `direction`.
///
/// `tag` only labels the report and errors.
pub fn solve_direction(
    field: &ConductivityField,
    direction: [f64; 2],
    tag: usize,
    config: &SolverConfig,
    budget: &SolveBudget,
) -> Result<FieldSolution> {
    let n = field.size();
    let nn = n * n;
    let (k_min, k_max) = field.extrema();
    let kappa_ref = config.kappa_ref.resolve(k_min, k_max);
    let kappa: Vec<f64> = field.values().iter().copied().collect();
    let mut green = GreenOperator::new(n, kappa_ref);

    let mut macro_field = vec![0.0; 2 * nn];
    macro_field[..nn].fill(direction[0]);
    macro_field[nn..].fill(direction[1]);

    let start = Instant::now();
    let (gradient, iterations, residual, stop) = match config.scheme {
        SolverScheme::ConjugateGradient => {
            conjugate_gradient(&mut green, &kappa, &macro_field, tag, config, budget)?
        }
        SolverScheme::FixedPoint => {
            fixed_point(&mut green, &kappa, &macro_field, tag, config, budget)?
        }
    };

    let report = SolveReport {
        load_case: tag,
        scheme: config.scheme,
        kappa_ref,
        iterations,
        residual,
        tolerance: config.tolerance,
        stop,
    };
    debug!(
        load_case = tag,
        iterations,
        residual,
        stop = ?stop,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "spectral solve finished"
    );

    Ok(assemble_solution(&green, &kappa, n, direction, gradient, report))
}

type IterationOutcome = (Vec<f64>, usize, f64, StopReason);

fn conjugate_gradient(
    green: &mut GreenOperator,
    kappa: &[f64],
    macro_field: &[f64],
    tag: usize,
    config: &SolverConfig,
    budget: &SolveBudget,
) -> Result<IterationOutcome> {
    let len = macro_field.len();
    let kappa_ref = green.kappa_ref();
    let diverged = |iteration: usize, residual: f64| HomogError::SolverDiverged {
        load_case: tag,
        iteration,
        residual,
    };

    let mut b = vec![0.0; len];
    green.apply_to_flux(kappa, macro_field, &mut b);
    b.iter_mut().for_each(|v| *v = -*v);

    let mut x = vec![0.0; len];
    let mut r = b.clone();
    let mut rr = dot(&r, &r);
    let mut residual = flux_residual(
        kappa_ref,
        rr,
        len,
        mean_flux_norm(kappa, |i| macro_field[i]),
    );
    if !residual.is_finite() {
        return Err(diverged(0, residual));
    }
    if residual <= config.tolerance {
        // Uniform conductivity or a laminate loaded along its layers.
        return Ok((macro_field.to_vec(), 0, residual, StopReason::Converged));
    }

    let mut p = r.clone();
    let mut ap = vec![0.0; len];
    let mut stop = StopReason::IterationCap;
    let mut iterations = 0;

    while iterations < config.max_iterations {
        if let Some(reason) = budget.exhausted() {
            stop = reason;
            break;
        }
        green.apply_to_flux(kappa, &p, &mut ap);
        let p_ap = dot(&p, &ap);
        if !p_ap.is_finite() {
            return Err(diverged(iterations, p_ap));
        }
        if p_ap <= 0.0 {
            // Krylov space exhausted: accept only if b - Ax agrees.
            let flux_scale = mean_flux_norm(kappa, |i| macro_field[i] + x[i]);
            rr = true_residual(green, kappa, &b, &x, &mut r, &mut ap);
            residual = flux_residual(kappa_ref, rr, len, flux_scale);
            stop = if residual <= config.tolerance {
                StopReason::Converged
            } else {
                StopReason::Stagnated
            };
            break;
        }

        let alpha = rr / p_ap;
        for i in 0..len {
            x[i] += alpha * p[i];
            r[i] -= alpha * ap[i];
        }
        iterations += 1;

        let flux_scale = mean_flux_norm(kappa, |i| macro_field[i] + x[i]);
        let rr_new = dot(&r, &r);
        residual = flux_residual(kappa_ref, rr_new, len, flux_scale);
        if !residual.is_finite() {
            return Err(diverged(iterations, residual));
        }
        trace!(load_case = tag, iteration = iterations, residual, "cg");

        if residual <= config.tolerance {
            // At high contrast the recursive residual drifts away from
            // b - Ax, so convergence is only accepted on the true residual.
            rr = true_residual(green, kappa, &b, &x, &mut r, &mut ap);
            residual = flux_residual(kappa_ref, rr, len, flux_scale);
            if !residual.is_finite() {
                return Err(diverged(iterations, residual));
            }
            if residual <= config.tolerance {
                stop = StopReason::Converged;
                break;
            }
            debug!(
                load_case = tag,
                iteration = iterations,
                residual,
                "cg restarted from the true residual"
            );
            p.copy_from_slice(&r);
            continue;
        }

        let beta = rr_new / rr;
        for i in 0..len {
            p[i] = r[i] + beta * p[i];
        }
        rr = rr_new;
    }

    for (xi, ei) in x.iter_mut().zip(macro_field) {
        *xi += ei;
    }
    Ok((x, iterations, residual, stop))
}

fn fixed_point(
    green: &mut GreenOperator,
    kappa: &[f64],
    macro_field: &[f64],
    tag: usize,
    config: &SolverConfig,
    budget: &SolveBudget,
) -> Result<IterationOutcome> {
    let len = macro_field.len();
    let kappa_ref = green.kappa_ref();
    let mut e = macro_field.to_vec();
    let mut update = vec![0.0; len];
    let mut residual = f64::INFINITY;
    let mut stop = StopReason::IterationCap;
    let mut iterations = 0;

    while iterations < config.max_iterations {
        if let Some(reason) = budget.exhausted() {
            stop = reason;
            break;
        }
        green.apply_to_flux(kappa, &e, &mut update);
        residual = flux_residual(
            kappa_ref,
            dot(&update, &update),
            len,
            mean_flux_norm(kappa, |i| e[i]),
        );
        if !residual.is_finite() {
            return Err(HomogError::SolverDiverged {
                load_case: tag,
                iteration: iterations,
                residual,
            });
        }
        for (ei, ui) in e.iter_mut().zip(&update) {
            *ei -= ui;
        }
        iterations += 1;
        trace!(load_case = tag, iteration = iterations, residual, "fixed point");
        if residual <= config.tolerance {
            stop = StopReason::Converged;
            break;
        }
    }
    Ok((e, iterations, residual, stop))
}

/// Overwrites `r` with `b - Ax` and returns its squared norm.
fn true_residual(
    green: &mut GreenOperator,
    kappa: &[f64],
    b: &[f64],
    x: &[f64],
    r: &mut [f64],
    scratch: &mut [f64],
) -> f64 {
    green.apply_to_flux(kappa, x, scratch);
    for ((ri, bi), ai) in r.iter_mut().zip(b).zip(scratch.iter()) {
        *ri = bi - ai;
    }
    dot(r, r)
}

/// Equilibrium residual in flux units, `|P[kappa e]|` relative to `|<kappa e>|`.
///
/// `kappa_ref * r` is the compatible part of the flux, so this bounds the
/// error of the mean flux independently of the phase contrast.
fn flux_residual(kappa_ref: f64, rr: f64, len: usize, flux_scale: f64) -> f64 {
    if !flux_scale.is_finite() {
        return f64::NAN;
    }
    kappa_ref * (rr / len as f64).sqrt() / flux_scale.max(f64::MIN_POSITIVE)
}

/// `|<kappa e>|` for a gradient stored as `[e_x..., e_y...]`.
fn mean_flux_norm(kappa: &[f64], gradient: impl Fn(usize) -> f64) -> f64 {
    let nn = kappa.len();
    let (mut qx, mut qy) = (0.0, 0.0);
    for (i, k) in kappa.iter().enumerate() {
        qx += k * gradient(i);
        qy += k * gradient(nn + i);
    }
    (qx / nn as f64).hypot(qy / nn as f64)
}

fn assemble_solution(
    green: &GreenOperator,
    kappa: &[f64],
    n: usize,
    direction: [f64; 2],
    gradient: Vec<f64>,
    report: SolveReport,
) -> FieldSolution {
    let nn = n * n;
    let (gx, gy) = gradient.split_at(nn);
    let fluct_x: Vec<f64> = gx.iter().map(|v| v - direction[0]).collect();
    let fluct_y: Vec<f64> = gy.iter().map(|v| v - direction[1]).collect();
    let t_fluct = integrate_gradient(green.fft(), green.waves(), &fluct_x, &fluct_y);

    let temperature = Array2::from_shape_fn((n, n), |(i, j)| {
        let (x, y) = (j as f64 / n as f64, i as f64 / n as f64);
        direction[0] * x + direction[1] * y + t_fluct[i * n + j]
    });
    let grid = |v: &[f64]| Array2::from_shape_fn((n, n), |(i, j)| v[i * n + j]);
    let qx: Vec<f64> = gx.iter().zip(kappa).map(|(g, k)| g * k).collect();
    let qy: Vec<f64> = gy.iter().zip(kappa).map(|(g, k)| g * k).collect();

    FieldSolution {
        direction,
        temperature,
        gradient: [grid(gx), grid(gy)],
        flux: [grid(&qx), grid(&qy)],
        report,
    }
}

fn mean(a: &Array2<f64>) -> f64 {
    a.iter().sum::<f64>() / a.len() as f64
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
