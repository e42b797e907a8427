//! Fourier neural operator inference.
//!
//! Network layout (channel-major activations, `width` channels per cell):
//!
//! ```text
//! [mask, ln kappa, x, y] ─► lift ─► L × (spectral conv + pointwise, GELU) ─► project ─► [T~_x, T~_y]
//! ```
//!
//! The two output channels are the temperature fluctuations for unit
//! gradients along x and y. Fluxes and effective properties are derived from
//! them the same way as for the solver, so the surrogate answers in the same
//! shape.

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{Surrogate, SurrogatePrediction};
use crate::error::{HomogError, Result};
use crate::microstructure::PhaseMask;
use crate::sim::conductivity::ConductivityField;
use crate::sim::effective::aggregate;
use crate::sim::solver::LoadCase;
use crate::sim::spectral::{C64, Fft2d, Wavevectors, differentiate};

const INPUT_CHANNELS: usize = 4;
const OUTPUT_CHANNELS: usize = 2;

/// Pointwise affine map `out = W in + b` applied at every cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    pub in_dim: usize,
    pub out_dim: usize,
    /// Row-major `out_dim × in_dim`.
    pub weight: Vec<f64>,
    pub bias: Vec<f64>,
}

impl Dense {
    pub fn zeros(in_dim: usize, out_dim: usize) -> Self {
        Self {
            in_dim,
            out_dim,
            weight: vec![0.0; in_dim * out_dim],
            bias: vec![0.0; out_dim],
        }
    }

    fn check(&self, what: &str, in_dim: usize) -> Result<()> {
        if self.in_dim != in_dim
            || self.weight.len() != self.in_dim * self.out_dim
            || self.bias.len() != self.out_dim
        {
            return Err(HomogError::surrogate(format!(
                "{what}: expected {in_dim} inputs with consistent weight/bias lengths \
                 (in_dim={}, out_dim={}, weight={}, bias={})",
                self.in_dim,
                self.out_dim,
                self.weight.len(),
                self.bias.len()
            )));
        }
        Ok(())
    }

    /// Channel-major `input` (`in_dim` blocks of `cells`) to channel-major output.
    fn apply(&self, input: &[f64], cells: usize) -> Vec<f64> {
        let mut out = vec![0.0; self.out_dim * cells];
        out.par_chunks_mut(cells)
            .enumerate()
            .for_each(|(o, block)| {
                block.fill(self.bias[o]);
                for i in 0..self.in_dim {
                    let w = self.weight[o * self.in_dim + i];
                    if w == 0.0 {
                        continue;
                    }
                    let src = &input[i * cells..(i + 1) * cells];
                    for (b, s) in block.iter_mut().zip(src) {
                        *b += w * s;
                    }
                }
            });
        out
    }
}

/// Weights of one Fourier layer.
///
/// Spectral weights cover the signed modes `-(modes-1)..=(modes-1)` on both
/// axes, laid out `[in][out][my][mx]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FourierLayerWeights {
    pub spectral_re: Vec<f64>,
    pub spectral_im: Vec<f64>,
    pub pointwise: Dense,
}

/// Serialized FNO checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FnoWeights {
    pub name: String,
    pub grid_size: usize,
    pub width: usize,
    pub modes: usize,
    pub lift: Dense,
    pub layers: Vec<FourierLayerWeights>,
    pub project_hidden: Dense,
    pub project_out: Dense,
}

/// A validated FNO ready for read-only inference.
#[derive(Debug, Clone)]
pub struct FnoModel {
    weights: FnoWeights,
}

impl FnoModel {
    /// Checks every weight shape against the declared architecture.
    pub fn from_weights(weights: FnoWeights) -> Result<Self> {
        let FnoWeights {
            grid_size: n,
            width,
            modes,
            ..
        } = weights;
        if n == 0 || width == 0 {
            return Err(HomogError::surrogate("grid_size and width must be > 0"));
        }
        if modes == 0 || modes > n.div_ceil(2) {
            return Err(HomogError::surrogate(format!(
                "modes must be in 1..={} for a {n}x{n} grid, got {modes}",
                n.div_ceil(2)
            )));
        }
        weights.lift.check("lift", INPUT_CHANNELS)?;
        if weights.lift.out_dim != width {
            return Err(HomogError::surrogate("lift must produce `width` channels"));
        }
        let spectral_len = width * width * kept_modes(modes).pow(2);
        for (l, layer) in weights.layers.iter().enumerate() {
            if layer.spectral_re.len() != spectral_len || layer.spectral_im.len() != spectral_len {
                return Err(HomogError::surrogate(format!(
                    "layer {l}: spectral weights must hold {spectral_len} values"
                )));
            }
            layer.pointwise.check("pointwise", width)?;
            if layer.pointwise.out_dim != width {
                return Err(HomogError::surrogate(format!(
                    "layer {l}: pointwise map must keep `width` channels"
                )));
            }
        }
        weights.project_hidden.check("project_hidden", width)?;
        weights
            .project_out
            .check("project_out", weights.project_hidden.out_dim)?;
        if weights.project_out.out_dim != OUTPUT_CHANNELS {
            return Err(HomogError::surrogate(format!(
                "project_out must produce {OUTPUT_CHANNELS} channels"
            )));
        }
        Ok(Self { weights })
    }

    /// An untrained model with all weights zero.
    ///
    /// It predicts no fluctuation, so its effective tensor is the Voigt bound.
    pub fn zeros(
        name: &str,
        grid_size: usize,
        width: usize,
        modes: usize,
        layers: usize,
    ) -> Result<Self> {
        let spectral_len = width * width * kept_modes(modes).pow(2);
        Self::from_weights(FnoWeights {
            name: name.to_string(),
            grid_size,
            width,
            modes,
            lift: Dense::zeros(INPUT_CHANNELS, width),
            layers: (0..layers)
                .map(|_| FourierLayerWeights {
                    spectral_re: vec![0.0; spectral_len],
                    spectral_im: vec![0.0; spectral_len],
                    pointwise: Dense::zeros(width, width),
                })
                .collect(),
            project_hidden: Dense::zeros(width, width),
            project_out: Dense::zeros(width, OUTPUT_CHANNELS),
        })
    }

    pub fn weights(&self) -> &FnoWeights {
        &self.weights
    }

    /// Network forward pass: channel-major `[T~_x | T~_y]`.
    fn forward(&self, mask: &PhaseMask, kappa: &ConductivityField, fft: &Fft2d) -> Vec<f64> {
        let n = self.weights.grid_size;
        let cells = n * n;

        let mut input = vec![0.0; INPUT_CHANNELS * cells];
        for ((i, j), &phase) in mask.as_array().indexed_iter() {
            let p = i * n + j;
            input[p] = f64::from(phase);
            input[cells + p] = kappa.values()[[i, j]].ln();
            input[2 * cells + p] = j as f64 / n as f64;
            input[3 * cells + p] = i as f64 / n as f64;
        }

        let mut h = self.weights.lift.apply(&input, cells);
        let last = self.weights.layers.len().saturating_sub(1);
        for (l, layer) in self.weights.layers.iter().enumerate() {
            let spectral = self.spectral_conv(layer, &h, fft);
            let mut next = layer.pointwise.apply(&h, cells);
            next.par_iter_mut()
                .zip(spectral.par_iter())
                .for_each(|(a, s)| *a += s);
            if l != last {
                next.par_iter_mut().for_each(|v| *v = gelu(*v));
            }
            h = next;
        }

        let mut hidden = self.weights.project_hidden.apply(&h, cells);
        hidden.par_iter_mut().for_each(|v| *v = gelu(*v));
        self.weights.project_out.apply(&hidden, cells)
    }

    fn spectral_conv(&self, layer: &FourierLayerWeights, h: &[f64], fft: &Fft2d) -> Vec<f64> {
        let n = self.weights.grid_size;
        let cells = n * n;
        let width = self.weights.width;
        let modes = self.weights.modes as isize;
        let kept = kept_modes(self.weights.modes);

        let spectra: Vec<Vec<C64>> = (0..width)
            .map(|c| {
                let mut buf: Vec<C64> = h[c * cells..(c + 1) * cells]
                    .iter()
                    .map(|&v| C64::new(v, 0.0))
                    .collect();
                fft.forward(&mut buf);
                buf
            })
            .collect();

        let bin = |m: isize| m.rem_euclid(n as isize) as usize;
        let mut out = vec![0.0; width * cells];
        for (o, block) in out.chunks_mut(cells).enumerate() {
            let mut acc = vec![C64::new(0.0, 0.0); cells];
            for (qy, my) in (1 - modes..modes).enumerate() {
                for (qx, mx) in (1 - modes..modes).enumerate() {
                    let idx = bin(my) * n + bin(mx);
                    let q = qy * kept + qx;
                    let mut sum = C64::new(0.0, 0.0);
                    for (i, spectrum) in spectra.iter().enumerate() {
                        let w = (i * width + o) * kept * kept + q;
                        sum += C64::new(layer.spectral_re[w], layer.spectral_im[w]) * spectrum[idx];
                    }
                    acc[idx] = sum;
                }
            }
            fft.inverse(&mut acc);
            for (b, a) in block.iter_mut().zip(&acc) {
                *b = a.re;
            }
        }
        out
    }
}

impl Surrogate for FnoModel {
    fn name(&self) -> &str {
        &self.weights.name
    }

    fn predict(
        &self,
        mask: &PhaseMask,
        kappa1: f64,
        alpha_deg: f64,
    ) -> Result<SurrogatePrediction> {
        let n = self.weights.grid_size;
        if mask.size() != n {
            return Err(HomogError::surrogate(format!(
                "model `{}` expects a {n}x{n} grid, got {}x{}",
                self.weights.name,
                mask.size(),
                mask.size()
            )));
        }
        let kappa = ConductivityField::build(mask, kappa1)?;
        let fft = Fft2d::new(n);
        let waves = Wavevectors::new(n);
        let output = self.forward(mask, &kappa, &fft);
        if output.iter().any(|v| !v.is_finite()) {
            return Err(HomogError::surrogate(format!(
                "model `{}` produced non-finite output",
                self.weights.name
            )));
        }

        let cells = n * n;
        let mut temps: [Array2<f64>; 2] = Default::default();
        let mut norms: [Array2<f64>; 2] = Default::default();
        let mut mean_fluxes = [[0.0; 2]; 2];
        for load in LoadCase::ALL {
            let c = load.index();
            let e = load.direction();
            let fluct = &output[c * cells..(c + 1) * cells];
            let (gx, gy) = differentiate(&fft, &waves, fluct);
            let mut norm = Array2::<f64>::zeros((n, n));
            let mut sum = [0.0; 2];
            for ((i, j), v) in norm.indexed_iter_mut() {
                let p = i * n + j;
                let k = kappa.values()[[i, j]];
                let q = [k * (e[0] + gx[p]), k * (e[1] + gy[p])];
                sum[0] += q[0];
                sum[1] += q[1];
                *v = q[0].hypot(q[1]);
            }
            mean_fluxes[c] = [sum[0] / cells as f64, sum[1] / cells as f64];
            temps[c] = Array2::from_shape_fn((n, n), |(i, j)| {
                e[0] * j as f64 / n as f64 + e[1] * i as f64 / n as f64 + fluct[i * n + j]
            });
            norms[c] = norm;
        }

        let properties = aggregate(
            mask.volume_fraction(),
            kappa1,
            mean_fluxes[0],
            mean_fluxes[1],
            alpha_deg,
        )?;
        let [flux_norm0, flux_norm1] = norms;
        let [temp0, temp1] = temps;
        Ok(SurrogatePrediction {
            temp0,
            temp1,
            flux_norm0,
            flux_norm1,
            properties,
        })
    }
}

fn kept_modes(modes: usize) -> usize {
    (2 * modes).saturating_sub(1)
}

/// GELU, tanh approximation.
fn gelu(x: f64) -> f64 {
    const C: f64 = 0.797_884_560_802_865_4; // sqrt(2/pi)
    0.5 * x * (1.0 + (C * (x + 0.044_715 * x * x * x)).tanh())
}
