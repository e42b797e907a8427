use ndarray::Array2;

use crate::error::{HomogError, Result};

/// Smallest grid that can hold both phases.
pub const MIN_GRID_SIZE: usize = 2;

pub(crate) fn validate_grid_size(n: usize) -> Result<()> {
    if n < MIN_GRID_SIZE {
        return Err(HomogError::invalid(
            "grid_size",
            format!("must be at least {MIN_GRID_SIZE}, got {n}"),
        ));
    }
    Ok(())
}

/// Binary phase mask on a square `N×N` grid.
///
/// `1` marks the conductive inclusion phase, `0` the reference matrix.
/// A mask always contains at least one cell of each phase.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseMask {
    cells: Array2<u8>,
}

impl PhaseMask {
    /// Wraps a binary array, checking shape, values and the two-phase invariant.
    pub fn new(cells: Array2<u8>) -> Result<Self> {
        let (rows, cols) = cells.dim();
        if rows == 0 || rows != cols {
            return Err(HomogError::invalid(
                "phase_mask",
                format!("mask must be square and non-empty, got {rows}x{cols}"),
            ));
        }
        if let Some(v) = cells.iter().find(|&&v| v > 1) {
            return Err(HomogError::invalid(
                "phase_mask",
                format!("mask values must be 0 or 1, found {v}"),
            ));
        }
        let fraction = white_fraction(&cells);
        if fraction == 0.0 || fraction == 1.0 {
            return Err(HomogError::DegenerateMicrostructure { fraction });
        }
        Ok(Self { cells })
    }

    /// Builds a mask from row strings of `'0'` and `'1'`.
    pub fn from_rows<S: AsRef<str>>(rows: &[S]) -> Result<Self> {
        let n = rows.len();
        let mut cells = Array2::<u8>::zeros((n, n));
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != n {
                return Err(HomogError::invalid(
                    "phase_mask",
                    format!("row {i} has {} cells, expected {n}", row.len()),
                ));
            }
            for (j, c) in row.bytes().enumerate() {
                cells[[i, j]] = match c {
                    b'0' => 0,
                    b'1' => 1,
                    other => {
                        return Err(HomogError::invalid(
                            "phase_mask",
                            format!("unexpected character {:?} in row {i}", other as char),
                        ));
                    }
                };
            }
        }
        Self::new(cells)
    }

    /// Inverse of [`Self::from_rows`].
    pub fn to_rows(&self) -> Vec<String> {
        self.cells
            .rows()
            .into_iter()
            .map(|row| row.iter().map(|&v| if v == 1 { '1' } else { '0' }).collect())
            .collect()
    }

    /// Grid size `N`.
    pub fn size(&self) -> usize {
        self.cells.nrows()
    }

    pub fn get(&self, i: usize, j: usize) -> u8 {
        self.cells[[i, j]]
    }

    pub fn as_array(&self) -> &Array2<u8> {
        &self.cells
    }

    /// Fraction of conductive (`1`) cells.
    pub fn volume_fraction(&self) -> f64 {
        white_fraction(&self.cells)
    }

    /// The mask as a 0.0/1.0 image, as returned to callers.
    pub fn to_image(&self) -> Array2<f64> {
        self.cells.mapv(f64::from)
    }
}

pub(crate) fn white_fraction(cells: &Array2<u8>) -> f64 {
    if cells.is_empty() {
        return 0.0;
    }
    let white = cells.iter().filter(|&&v| v == 1).count();
    white as f64 / cells.len() as f64
}
