use serde::{Deserialize, Serialize};

use super::solver::SolverConfig;
use crate::error::Result;
use crate::microstructure::IngestConfig;
use crate::microstructure::mask::validate_grid_size;

/// Process-wide configuration, read-only after start-up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomogConfig {
    /// Side length `N` of the phase mask every input is normalized to.
    pub grid_size: usize,
    pub solver: SolverConfig,
    pub ingest: IngestConfig,
}

impl HomogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same settings on a different grid.
    pub fn with_grid_size(mut self, grid_size: usize) -> Self {
        self.grid_size = grid_size;
        self
    }

    /// Rejects settings no solve could run with.
    pub fn validate(&self) -> Result<()> {
        validate_grid_size(self.grid_size)
    }
}

impl Default for HomogConfig {
    fn default() -> Self {
        Self {
            grid_size: 400,
            solver: SolverConfig::default(),
            ingest: IngestConfig::default(),
        }
    }
}
