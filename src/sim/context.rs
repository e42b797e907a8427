use std::sync::Arc;

use serde::Serialize;

use super::config::HomogConfig;
use super::surrogate::SurrogateSlot;
use crate::error::Result;
use crate::microstructure::{
    DatasetStore, ImageDecoder, InMemoryDataset, Ingested, MicrostructureSource, RasterDecoder,
    ingest,
};

/// Shared read-only context passed to every request.
///
/// Built once at start-up and never mutated afterwards, so a single instance
/// can serve concurrent requests by reference or behind an `Arc`.
#[derive(Clone)]
pub struct SimContext {
    config: HomogConfig,
    dataset: Arc<dyn DatasetStore>,
    decoder: Arc<dyn ImageDecoder>,
    surrogate: SurrogateSlot,
}

impl SimContext {
    /// Context with an empty dataset, the raster decoder and no surrogate.
    pub fn new(config: HomogConfig) -> Self {
        Self {
            config,
            dataset: Arc::new(InMemoryDataset::default()),
            decoder: Arc::new(RasterDecoder),
            surrogate: SurrogateSlot::Absent,
        }
    }

    pub fn with_dataset(mut self, dataset: impl DatasetStore + 'static) -> Self {
        self.dataset = Arc::new(dataset);
        self
    }

    pub fn with_decoder(mut self, decoder: impl ImageDecoder + 'static) -> Self {
        self.decoder = Arc::new(decoder);
        self
    }

    pub fn with_surrogate(mut self, surrogate: SurrogateSlot) -> Self {
        self.surrogate = surrogate;
        self
    }

    pub fn config(&self) -> &HomogConfig {
        &self.config
    }

    pub fn dataset(&self) -> &dyn DatasetStore {
        self.dataset.as_ref()
    }

    pub fn surrogate(&self) -> &SurrogateSlot {
        &self.surrogate
    }

    /// Normalizes `source` to the configured grid.
    pub fn ingest(&self, source: &MicrostructureSource) -> Result<Ingested> {
        ingest(
            source,
            self.config.grid_size,
            self.dataset.as_ref(),
            self.decoder.as_ref(),
            &self.config.ingest,
        )
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            sample_count: self.dataset.count(),
            has_surrogate: self.surrogate.has_surrogate(),
            surrogate_name: self.surrogate.name().map(str::to_string),
            device: format!("cpu ({} threads)", rayon::current_num_threads()),
            grid_size: self.config.grid_size,
            worker_id: std::process::id(),
        }
    }
}

impl std::fmt::Debug for SimContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimContext")
            .field("config", &self.config)
            .field("samples", &self.dataset.count())
            .field("surrogate", &self.surrogate)
            .finish()
    }
}

/// What this process can serve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Capabilities {
    pub sample_count: usize,
    pub has_surrogate: bool,
    pub surrogate_name: Option<String>,
    pub device: String,
    pub grid_size: usize,
    pub worker_id: u32,
}
