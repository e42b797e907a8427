use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::spectral::{C64, Fft2d, Wavevectors};

/// How the reference-medium conductivity is chosen from the two phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KappaRef {
    /// `(k_min + k_max) / 2`. Guarantees a contracting fixed-point iteration.
    #[default]
    ArithmeticMean,
    /// `sqrt(k_min * k_max)`. Only a preconditioner scale for CG; the fixed
    /// point diverges with it once the contrast exceeds 4.
    GeometricMean,
    /// The matrix conductivity `1.0`.
    Matrix,
}

impl KappaRef {
    pub fn resolve(self, k_min: f64, k_max: f64) -> f64 {
        match self {
            KappaRef::ArithmeticMean => 0.5 * (k_min + k_max),
            KappaRef::GeometricMean => (k_min * k_max).sqrt(),
            KappaRef::Matrix => super::conductivity::KAPPA0,
        }
    }
}

/// Periodic Green's operator of a homogeneous reference medium.
///
/// In Fourier space `Gamma0(xi) = xi ⊗ xi / (kappa_ref |xi|²)` with
/// `Gamma0(0) = 0`. Applied to a polarization it returns the compatible
/// (curl-free, zero-mean) gradient field it induces.
pub struct GreenOperator {
    kappa_ref: f64,
    waves: Wavevectors,
    fft: Fft2d,
    /// Fourier buffers for the two components, `[x | y]`.
    spectrum: Vec<C64>,
}

impl GreenOperator {
    pub fn new(n: usize, kappa_ref: f64) -> Self {
        Self {
            kappa_ref,
            waves: Wavevectors::new(n),
            fft: Fft2d::new(n),
            spectrum: vec![C64::new(0.0, 0.0); 2 * n * n],
        }
    }

    pub fn kappa_ref(&self) -> f64 {
        self.kappa_ref
    }

    pub fn fft(&self) -> &Fft2d {
        &self.fft
    }

    pub fn waves(&self) -> &Wavevectors {
        &self.waves
    }

    /// `out = Gamma0[kappa * field]`.
    ///
    /// `field` and `out` hold both components back to back (`[x | y]`, each
    /// `n*n` long); `kappa` is the per-cell conductivity.
    pub fn apply_to_flux(&mut self, kappa: &[f64], field: &[f64], out: &mut [f64]) {
        let nn = kappa.len();
        let (sx, sy) = self.spectrum.split_at_mut(nn);
        let (fx, fy) = field.split_at(nn);
        sx.par_iter_mut()
            .zip(sy.par_iter_mut())
            .enumerate()
            .for_each(|(idx, (a, b))| {
                *a = C64::new(kappa[idx] * fx[idx], 0.0);
                *b = C64::new(kappa[idx] * fy[idx], 0.0);
            });

        self.fft.forward(sx);
        self.fft.forward(sy);
        project(&self.waves, self.kappa_ref, self.fft.size(), sx, sy);
        self.fft.inverse(sx);
        self.fft.inverse(sy);

        let (ox, oy) = out.split_at_mut(nn);
        ox.par_iter_mut()
            .zip(sx.par_iter())
            .for_each(|(o, s)| *o = s.re);
        oy.par_iter_mut()
            .zip(sy.par_iter())
            .for_each(|(o, s)| *o = s.re);
    }
}

fn project(waves: &Wavevectors, kappa_ref: f64, n: usize, sx: &mut [C64], sy: &mut [C64]) {
    sx.par_chunks_mut(n)
        .zip(sy.par_chunks_mut(n))
        .enumerate()
        .for_each(|(ky, (row_x, row_y))| {
            let b = waves.xi(ky);
            for kx in 0..n {
                if !waves.is_resolved(ky, kx) {
                    row_x[kx] = C64::new(0.0, 0.0);
                    row_y[kx] = C64::new(0.0, 0.0);
                    continue;
                }
                let a = waves.xi(kx);
                let coeff = (row_x[kx] * a + row_y[kx] * b) / (kappa_ref * (a * a + b * b));
                row_x[kx] = coeff * a;
                row_y[kx] = coeff * b;
            }
        });
}
