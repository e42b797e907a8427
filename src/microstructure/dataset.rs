use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::mask::{PhaseMask, validate_grid_size, white_fraction};
use crate::error::{HomogError, Result};

/// Read-only table of pre-stored microstructure samples.
///
/// Loaded once at start-up and shared by all requests.
pub trait DatasetStore: Send + Sync {
    /// Number of samples; valid ids are `0..count()`.
    fn count(&self) -> usize;

    /// Returns sample `id`, or [`HomogError::OutOfRange`].
    fn get_sample(&self, id: usize) -> Result<PhaseMask>;
}

/// Dataset held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataset {
    samples: Vec<PhaseMask>,
}

impl InMemoryDataset {
    pub fn new(samples: Vec<PhaseMask>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[PhaseMask] {
        &self.samples
    }

    /// Generates `count` periodic microstructures of size `n` with random
    /// circular inclusions.
    ///
    /// The same `seed` always yields the same dataset. Target conductive
    /// fractions are spread over roughly 0.15..0.55.
    pub fn synthetic(count: usize, n: usize, seed: u64) -> Result<Self> {
        validate_grid_size(n)?;
        let mut rng = StdRng::seed_from_u64(seed);
        let samples = (0..count)
            .map(|_| random_inclusions(n, &mut rng))
            .collect::<Result<_>>()?;
        Ok(Self { samples })
    }
}

impl DatasetStore for InMemoryDataset {
    fn count(&self) -> usize {
        self.samples.len()
    }

    fn get_sample(&self, id: usize) -> Result<PhaseMask> {
        self.samples
            .get(id)
            .cloned()
            .ok_or(HomogError::OutOfRange {
                id,
                count: self.samples.len(),
            })
    }
}

fn random_inclusions(n: usize, rng: &mut impl Rng) -> Result<PhaseMask> {
    let target = rng.gen_range(0.15..0.55);
    let mut cells = Array2::<u8>::zeros((n, n));
    let nf = n as f64;
    let max_attempts = 4 * n * n;

    for _ in 0..max_attempts {
        if white_fraction(&cells) >= target {
            break;
        }
        let cx = rng.gen_range(0.0..nf);
        let cy = rng.gen_range(0.0..nf);
        let radius = rng.gen_range(0.04..0.12) * nf;
        stamp_periodic_disk(&mut cells, cx, cy, radius.max(0.75));
    }

    // Tiny grids can saturate; carve one cell back out to keep both phases.
    if white_fraction(&cells) >= 1.0 {
        cells[[0, 0]] = 0;
    }
    if white_fraction(&cells) <= 0.0 {
        cells[[n / 2, n / 2]] = 1;
    }
    PhaseMask::new(cells)
}

fn stamp_periodic_disk(cells: &mut Array2<u8>, cx: f64, cy: f64, radius: f64) {
    let n = cells.nrows();
    let nf = n as f64;
    for ((i, j), v) in cells.indexed_iter_mut() {
        let mut dx = (j as f64 + 0.5 - cx).abs();
        let mut dy = (i as f64 + 0.5 - cy).abs();
        dx = dx.min(nf - dx);
        dy = dy.min(nf - dy);
        if dx * dx + dy * dy <= radius * radius {
            *v = 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_id() {
        let ds = InMemoryDataset::synthetic(3, 16, 7).unwrap();
        assert_eq!(ds.count(), 3);
        assert!(ds.get_sample(2).is_ok());
        assert_eq!(
            ds.get_sample(3),
            Err(HomogError::OutOfRange { id: 3, count: 3 })
        );
    }

    #[test]
    fn test_synthetic_is_seeded() {
        let a = InMemoryDataset::synthetic(4, 24, 42).unwrap();
        let b = InMemoryDataset::synthetic(4, 24, 42).unwrap();
        let c = InMemoryDataset::synthetic(4, 24, 43).unwrap();
        assert_eq!(a.samples(), b.samples());
        assert_ne!(a.samples(), c.samples());
    }

    #[test]
    fn test_synthetic_rejects_tiny_grids() {
        for n in [0, 1] {
            assert!(matches!(
                InMemoryDataset::synthetic(1, n, 0),
                Err(HomogError::InvalidParameter { name: "grid_size", .. })
            ));
        }
        let ds = InMemoryDataset::synthetic(5, 2, 0).unwrap();
        assert!(ds.samples().iter().all(|m| m.size() == 2));
    }

    #[test]
    fn test_synthetic_samples_are_two_phase() {
        let ds = InMemoryDataset::synthetic(8, 32, 1).unwrap();
        for mask in ds.samples() {
            let f = mask.volume_fraction();
            assert!(f > 0.0 && f < 1.0, "f={f}");
            assert_eq!(mask.size(), 32);
        }
    }
}
