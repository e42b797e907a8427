use std::f64::consts::PI;
use std::sync::Arc;

use rayon::prelude::*;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

pub type C64 = Complex<f64>;

/// 2-D complex FFT over a flat row-major `n×n` buffer.
///
/// Rows are transformed in parallel; columns go through an in-place transpose.
/// The forward transform is unnormalized and the inverse scales by `1/n²`,
/// so `inverse(forward(x)) == x`.
pub struct Fft2d {
    n: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl Fft2d {
    pub fn new(n: usize) -> Self {
        let mut planner = FftPlanner::<f64>::new();
        Self {
            n,
            forward: planner.plan_fft_forward(n),
            inverse: planner.plan_fft_inverse(n),
        }
    }

    pub fn size(&self) -> usize {
        self.n
    }

    pub fn forward(&self, buf: &mut [C64]) {
        transform_2d(buf, self.n, self.forward.as_ref());
    }

    pub fn inverse(&self, buf: &mut [C64]) {
        transform_2d(buf, self.n, self.inverse.as_ref());
        let scale = 1.0 / (self.n * self.n) as f64;
        buf.par_iter_mut().for_each(|v| *v *= scale);
    }
}

fn transform_2d(buf: &mut [C64], n: usize, fft: &dyn Fft<f64>) {
    assert_eq!(buf.len(), n * n, "buffer must hold an {n}x{n} grid");
    buf.par_chunks_mut(n).for_each(|row| fft.process(row));
    transpose_in_place(buf, n);
    buf.par_chunks_mut(n).for_each(|row| fft.process(row));
    transpose_in_place(buf, n);
}

fn transpose_in_place(buf: &mut [C64], n: usize) {
    for i in 0..n {
        for j in (i + 1)..n {
            buf.swap(i * n + j, j * n + i);
        }
    }
}

/// Angular wavenumbers `xi = 2π m` of a unit-period grid, indexed by FFT bin.
#[derive(Debug, Clone)]
pub struct Wavevectors {
    xi: Vec<f64>,
    nyquist: Option<usize>,
}

impl Wavevectors {
    pub fn new(n: usize) -> Self {
        let nyquist = (n % 2 == 0).then_some(n / 2);
        let xi = (0..n)
            .map(|k| {
                let m = if k < n.div_ceil(2) {
                    k as f64
                } else {
                    k as f64 - n as f64
                };
                2.0 * PI * m
            })
            .collect();
        Self { xi, nyquist }
    }

    pub fn xi(&self, k: usize) -> f64 {
        self.xi[k]
    }

    /// False for the zero mode and for the unpaired Nyquist bins of even grids,
    /// where no real-valued derivative exists.
    pub fn is_resolved(&self, ky: usize, kx: usize) -> bool {
        if ky == 0 && kx == 0 {
            return false;
        }
        match self.nyquist {
            Some(q) => ky != q && kx != q,
            None => true,
        }
    }
}

/// Periodic temperature fluctuation whose gradient is `(gx, gy)`.
///
/// Solves `grad T = g` in Fourier space (`T^ = -i xi·g^ / |xi|²`) with a
/// zero mean. Components of `g` that are not gradients are discarded.
pub fn integrate_gradient(fft: &Fft2d, waves: &Wavevectors, gx: &[f64], gy: &[f64]) -> Vec<f64> {
    let n = fft.size();
    let mut hx: Vec<C64> = gx.iter().map(|&v| C64::new(v, 0.0)).collect();
    let mut hy: Vec<C64> = gy.iter().map(|&v| C64::new(v, 0.0)).collect();
    fft.forward(&mut hx);
    fft.forward(&mut hy);
    for ky in 0..n {
        for kx in 0..n {
            let idx = ky * n + kx;
            if !waves.is_resolved(ky, kx) {
                hx[idx] = C64::new(0.0, 0.0);
                continue;
            }
            let (a, b) = (waves.xi(kx), waves.xi(ky));
            let div = hx[idx] * a + hy[idx] * b;
            hx[idx] = C64::new(0.0, -1.0) * div / (a * a + b * b);
        }
    }
    fft.inverse(&mut hx);
    hx.into_iter().map(|v| v.re).collect()
}

/// Spectral gradient of a periodic scalar field.
pub fn differentiate(fft: &Fft2d, waves: &Wavevectors, t: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let n = fft.size();
    let mut hx: Vec<C64> = t.iter().map(|&v| C64::new(v, 0.0)).collect();
    fft.forward(&mut hx);
    let mut hy = hx.clone();
    for ky in 0..n {
        for kx in 0..n {
            let idx = ky * n + kx;
            if !waves.is_resolved(ky, kx) {
                hx[idx] = C64::new(0.0, 0.0);
                hy[idx] = C64::new(0.0, 0.0);
                continue;
            }
            let i_unit = C64::new(0.0, 1.0);
            hx[idx] *= i_unit * waves.xi(kx);
            hy[idx] *= i_unit * waves.xi(ky);
        }
    }
    fft.inverse(&mut hx);
    fft.inverse(&mut hy);
    (
        hx.into_iter().map(|v| v.re).collect(),
        hy.into_iter().map(|v| v.re).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_identity() {
        let n = 12;
        let fft = Fft2d::new(n);
        let orig: Vec<C64> = (0..n * n)
            .map(|k| C64::new((k as f64 * 0.37).sin(), (k as f64 * 0.11).cos()))
            .collect();
        let mut buf = orig.clone();
        fft.forward(&mut buf);
        fft.inverse(&mut buf);
        for (a, b) in orig.iter().zip(&buf) {
            assert!((a - b).norm() < 1e-12, "{a} vs {b}");
        }
    }

    #[test]
    fn test_single_mode_lands_in_its_bin() {
        // cos(2π(2x + y)) on a 8x8 grid has energy only at (ky, kx) = (1, 2) and (7, 6).
        let n = 8;
        let fft = Fft2d::new(n);
        let mut buf: Vec<C64> = (0..n * n)
            .map(|idx| {
                let (i, j) = (idx / n, idx % n);
                let phase = 2.0 * PI * (2.0 * j as f64 + i as f64) / n as f64;
                C64::new(phase.cos(), 0.0)
            })
            .collect();
        fft.forward(&mut buf);
        let half = (n * n) as f64 / 2.0;
        assert!((buf[n + 2].re - half).abs() < 1e-9);
        assert!((buf[7 * n + 6].re - half).abs() < 1e-9);
        let rest: f64 = buf
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != n + 2 && *idx != 7 * n + 6)
            .map(|(_, v)| v.norm())
            .sum();
        assert!(rest < 1e-9, "leakage {rest}");
    }

    #[test]
    fn test_wavevectors_signed_and_nyquist() {
        let even = Wavevectors::new(4);
        assert_eq!(even.xi(1), 2.0 * PI);
        assert_eq!(even.xi(3), -2.0 * PI);
        assert!(!even.is_resolved(2, 1));
        assert!(!even.is_resolved(0, 0));
        assert!(even.is_resolved(1, 3));

        let odd = Wavevectors::new(5);
        assert_eq!(odd.xi(2), 4.0 * PI);
        assert_eq!(odd.xi(3), -4.0 * PI);
        assert!(odd.is_resolved(2, 3));
    }

    #[test]
    fn test_integrate_recovers_potential() {
        let n = 16;
        let fft = Fft2d::new(n);
        let waves = Wavevectors::new(n);
        let t: Vec<f64> = (0..n * n)
            .map(|idx| {
                let (i, j) = (idx / n, idx % n);
                let (x, y) = (j as f64 / n as f64, i as f64 / n as f64);
                (2.0 * PI * x).sin() + 0.5 * (2.0 * PI * (x + 2.0 * y)).cos()
            })
            .collect();
        let (gx, gy) = differentiate(&fft, &waves, &t);
        let back = integrate_gradient(&fft, &waves, &gx, &gy);
        for (a, b) in t.iter().zip(&back) {
            assert!((a - b).abs() < 1e-10, "{a} vs {b}");
        }
    }
}
