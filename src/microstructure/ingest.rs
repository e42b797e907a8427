use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::dataset::DatasetStore;
use super::decode::{ImageDecoder, decode_drawing_payload};
use super::mask::{PhaseMask, validate_grid_size, white_fraction};
use super::resample::{binarize, resample_area};
use crate::error::{HomogError, Result, SimWarning};

/// Where a microstructure comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum MicrostructureSource {
    /// Pre-stored sample from the dataset table.
    Dataset { id: usize },
    /// Raw bytes of an uploaded image.
    Image { bytes: Vec<u8> },
    /// Base64 canvas payload (optionally a `data:` URL).
    Drawing { payload: String },
}

impl MicrostructureSource {
    fn kind(&self) -> &'static str {
        match self {
            MicrostructureSource::Dataset { .. } => "dataset",
            MicrostructureSource::Image { .. } => "image",
            MicrostructureSource::Drawing { .. } => "drawing",
        }
    }
}

/// Ingestion settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Intensities strictly above this become the conductive phase.
    pub threshold: f64,
    /// Conductive fractions below this raise a stiffness warning.
    pub warn_low_fraction: f64,
    /// Conductive fractions above this raise a stiffness warning.
    pub warn_high_fraction: f64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            warn_low_fraction: 0.05,
            warn_high_fraction: 0.95,
        }
    }
}

/// A validated mask together with its ingestion diagnostics.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub mask: PhaseMask,
    pub white_fraction: f64,
    pub warnings: Vec<SimWarning>,
}

/// Normalizes any source into an `n×n` [`PhaseMask`].
///
/// Pure given its inputs: nothing is cached between calls.
pub fn ingest(
    source: &MicrostructureSource,
    n: usize,
    dataset: &dyn DatasetStore,
    decoder: &dyn ImageDecoder,
    config: &IngestConfig,
) -> Result<Ingested> {
    validate_grid_size(n)?;
    let cells = match source {
        MicrostructureSource::Dataset { id } => {
            let sample = dataset.get_sample(*id)?;
            if sample.size() == n {
                sample.as_array().clone()
            } else {
                binarize(&resample_area(&sample.to_image(), n), config.threshold)
            }
        }
        MicrostructureSource::Image { bytes } => {
            let gray = decoder.decode(bytes)?;
            binarize(&resample_area(&gray, n), config.threshold)
        }
        MicrostructureSource::Drawing { payload } => {
            let bytes = decode_drawing_payload(payload)?;
            let gray = decoder.decode(&bytes)?;
            binarize(&resample_area(&gray, n), config.threshold)
        }
    };
    let ingested = validate(cells, config)?;
    debug!(
        source = source.kind(),
        n,
        fraction = ingested.white_fraction,
        "microstructure ingested"
    );
    Ok(ingested)
}

/// Post-binarization validation shared by every source.
pub fn validate(cells: Array2<u8>, config: &IngestConfig) -> Result<Ingested> {
    let fraction = white_fraction(&cells);
    if fraction == 0.0 || fraction == 1.0 {
        return Err(HomogError::DegenerateMicrostructure { fraction });
    }
    let mut warnings = Vec::new();
    if fraction < config.warn_low_fraction || fraction > config.warn_high_fraction {
        let w = SimWarning::StiffVolumeFraction {
            fraction,
            low: config.warn_low_fraction,
            high: config.warn_high_fraction,
        };
        warn!("{w}");
        warnings.push(w);
    }
    Ok(Ingested {
        mask: PhaseMask::new(cells)?,
        white_fraction: fraction,
        warnings,
    })
}
