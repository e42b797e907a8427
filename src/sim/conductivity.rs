use ndarray::Array2;

use crate::error::{HomogError, Result};
use crate::microstructure::PhaseMask;

/// Conductivity of the reference matrix phase.
pub const KAPPA0: f64 = 1.0;

/// Per-cell scalar conductivity: [`KAPPA0`] on the matrix, `kappa1` on inclusions.
#[derive(Debug, Clone, PartialEq)]
pub struct ConductivityField {
    values: Array2<f64>,
    kappa1: f64,
}

impl ConductivityField {
    pub fn build(mask: &PhaseMask, kappa1: f64) -> Result<Self> {
        validate_kappa1(kappa1)?;
        let values = mask
            .as_array()
            .mapv(|phase| if phase == 1 { kappa1 * KAPPA0 } else { KAPPA0 });
        Ok(Self { values, kappa1 })
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn size(&self) -> usize {
        self.values.nrows()
    }

    pub fn kappa1(&self) -> f64 {
        self.kappa1
    }

    /// Smallest and largest phase conductivity.
    pub fn extrema(&self) -> (f64, f64) {
        let k1 = self.kappa1 * KAPPA0;
        (KAPPA0.min(k1), KAPPA0.max(k1))
    }
}

pub(crate) fn validate_kappa1(kappa1: f64) -> Result<()> {
    if !kappa1.is_finite() || kappa1 <= 0.0 {
        return Err(HomogError::invalid(
            "kappa1",
            format!("conductivity ratio must be finite and > 0, got {kappa1}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_maps_phases() {
        let mask = PhaseMask::from_rows(&["01", "10"]).unwrap();
        let field = ConductivityField::build(&mask, 5.0).unwrap();
        assert_eq!(field.values()[[0, 0]], 1.0);
        assert_eq!(field.values()[[0, 1]], 5.0);
        assert_eq!(field.extrema(), (1.0, 5.0));

        let soft = ConductivityField::build(&mask, 0.25).unwrap();
        assert_eq!(soft.extrema(), (0.25, 1.0));
    }

    #[test]
    fn test_rejects_non_positive_kappa() {
        let mask = PhaseMask::from_rows(&["01", "10"]).unwrap();
        for bad in [0.0, -2.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                ConductivityField::build(&mask, bad),
                Err(HomogError::InvalidParameter { name: "kappa1", .. })
            ));
        }
    }
}
