//! Microstructure ingestion.
//!
//! Every input source (dataset sample, uploaded image, drawn canvas) ends up as
//! a fixed-size binary [`PhaseMask`] plus non-fatal diagnostics.
//!
//! ```text
//! Dataset id ──► DatasetStore ─────────────────────────┐
//! Image bytes ─► ImageDecoder ─► resample ─► binarize ─┼─► validate ─► Ingested
//! Drawing ─────► base64 ──────► (image path) ──────────┘
//! ```

pub mod dataset;
pub mod decode;
pub mod ingest;
pub mod mask;
pub mod resample;

pub use dataset::{DatasetStore, InMemoryDataset};
pub use decode::{GrayImage, ImageDecoder, MAX_PIXELS, NetpbmDecoder, RasterDecoder};
pub use ingest::{IngestConfig, Ingested, MicrostructureSource, ingest};
pub use mask::{MIN_GRID_SIZE, PhaseMask};
