//! File I/O for datasets, configuration, results and surrogate weights.
//!
//! Everything here is JSON through serde, with `anyhow` context on each step.

pub mod dataset;
pub mod json;

pub use dataset::{DatasetFile, read_dataset, write_dataset};
pub use json::{
    load_surrogate, read_config, read_fno_weights, to_result_string, write_fno_weights,
    write_result_json,
};
