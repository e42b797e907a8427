use serde::Serialize;
use tracing::warn;

use super::conductivity::KAPPA0;
use crate::error::{HomogError, Result};

/// Relative slack allowed when checking `reuss <= eig <= voigt`.
const BOUND_SLACK: f64 = 1e-6;

/// Homogenized properties of a two-phase microstructure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveProperties {
    pub vol_frac: f64,
    pub reuss: f64,
    pub voigt: f64,
    /// Symmetric effective conductivity tensor.
    pub kappa_eff: [[f64; 2]; 2],
    /// Eigenvalues of `kappa_eff`, ascending.
    pub eig_kappa: [f64; 2],
    /// Directional conductivity `e_a · K · e_a` along the load angle.
    pub kappa_alpha: f64,
}

impl EffectiveProperties {
    /// True when both eigenvalues lie within the Reuss/Voigt bracket.
    pub fn within_bounds(&self) -> bool {
        let lo = self.reuss * (1.0 - BOUND_SLACK);
        let hi = self.voigt * (1.0 + BOUND_SLACK);
        self.eig_kappa.iter().all(|&e| e >= lo && e <= hi)
    }
}

/// Harmonic-mean (series) bound.
pub fn reuss_bound(vol_frac: f64, kappa1: f64) -> f64 {
    1.0 / ((1.0 - vol_frac) / KAPPA0 + vol_frac / (kappa1 * KAPPA0))
}

/// Arithmetic-mean (parallel) bound.
pub fn voigt_bound(vol_frac: f64, kappa1: f64) -> f64 {
    (1.0 - vol_frac) * KAPPA0 + vol_frac * kappa1 * KAPPA0
}

/// Reduces the mean fluxes of the two canonical load cases to effective properties.
///
/// `mean_flux_x` and `mean_flux_y` are `<q>` under unit gradients along x and y,
/// i.e. the two columns of the effective tensor.
pub fn aggregate(
    vol_frac: f64,
    kappa1: f64,
    mean_flux_x: [f64; 2],
    mean_flux_y: [f64; 2],
    alpha_deg: f64,
) -> Result<EffectiveProperties> {
    let off = 0.5 * (mean_flux_x[1] + mean_flux_y[0]);
    let kappa_eff = [[mean_flux_x[0], off], [off, mean_flux_y[1]]];
    let eig_kappa = symmetric_eigenvalues(kappa_eff);
    if eig_kappa.iter().any(|e| !e.is_finite() || *e <= 0.0) {
        return Err(HomogError::NonPhysicalResult {
            eigenvalues: eig_kappa,
        });
    }

    let (s, c) = alpha_deg.to_radians().sin_cos();
    let kappa_alpha = c * c * kappa_eff[0][0] + 2.0 * s * c * off + s * s * kappa_eff[1][1];

    let props = EffectiveProperties {
        vol_frac,
        reuss: reuss_bound(vol_frac, kappa1),
        voigt: voigt_bound(vol_frac, kappa1),
        kappa_eff,
        eig_kappa,
        kappa_alpha,
    };
    if !props.within_bounds() {
        warn!(
            eig = ?props.eig_kappa,
            reuss = props.reuss,
            voigt = props.voigt,
            "effective eigenvalues fall outside the Reuss/Voigt bracket"
        );
    }
    Ok(props)
}

/// Eigenvalues of a symmetric 2×2 matrix, ascending.
pub fn symmetric_eigenvalues(m: [[f64; 2]; 2]) -> [f64; 2] {
    let mean = 0.5 * (m[0][0] + m[1][1]);
    let half_diff = 0.5 * (m[0][0] - m[1][1]);
    let radius = half_diff.hypot(m[0][1]);
    [mean - radius, mean + radius]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bounds_limits() {
        assert_relative_eq!(reuss_bound(0.0, 7.0), 1.0);
        assert_relative_eq!(reuss_bound(1.0, 7.0), 7.0);
        assert_relative_eq!(voigt_bound(0.0, 7.0), 1.0);
        assert_relative_eq!(voigt_bound(1.0, 7.0), 7.0);
        assert_relative_eq!(reuss_bound(0.5, 3.0), 1.5);
        assert_relative_eq!(voigt_bound(0.5, 3.0), 2.0);
        assert!(reuss_bound(0.3, 0.2) <= voigt_bound(0.3, 0.2));
    }

    #[test]
    fn test_eigenvalues_of_rotated_diagonal() {
        // R diag(1, 3) Rᵀ with a 30° rotation.
        let (s, c) = 30f64.to_radians().sin_cos();
        let m = [
            [c * c + 3.0 * s * s, (3.0 - 1.0) * s * c],
            [(3.0 - 1.0) * s * c, s * s + 3.0 * c * c],
        ];
        let [lo, hi] = symmetric_eigenvalues(m);
        assert_relative_eq!(lo, 1.0, epsilon = 1e-12);
        assert_relative_eq!(hi, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_aggregate_symmetrizes_and_projects_alpha() {
        let p = aggregate(0.5, 3.0, [1.8, 0.1], [0.3, 1.6], 90.0).unwrap();
        assert_relative_eq!(p.kappa_eff[0][1], 0.2);
        assert_relative_eq!(p.kappa_eff[1][0], 0.2);
        assert_relative_eq!(p.kappa_alpha, 1.6, epsilon = 1e-12);
        let p0 = aggregate(0.5, 3.0, [1.8, 0.1], [0.3, 1.6], 0.0).unwrap();
        assert_relative_eq!(p0.kappa_alpha, 1.8);
        let p45 = aggregate(0.5, 3.0, [1.8, 0.0], [0.0, 1.6], 45.0).unwrap();
        assert_relative_eq!(p45.kappa_alpha, 1.7, epsilon = 1e-12);
        assert!(p45.within_bounds());
    }

    #[test]
    fn test_non_positive_eigenvalue_is_fatal() {
        let err = aggregate(0.5, 3.0, [1.0, 2.0], [2.0, 1.0], 0.0).unwrap_err();
        assert!(matches!(err, HomogError::NonPhysicalResult { eigenvalues } if eigenvalues[0] < 0.0));
        let err = aggregate(0.5, 3.0, [f64::NAN, 0.0], [0.0, 1.0], 0.0).unwrap_err();
        assert!(matches!(err, HomogError::NonPhysicalResult { .. }));
    }
}
