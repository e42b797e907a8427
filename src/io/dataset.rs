//! Dataset files: a grid size plus one mask per sample, each written as rows
//! of `'0'`/`'1'` characters.
//!
//! ```json
//! { "grid_size": 4, "samples": [["0110", "0110", "0000", "0000"]] }
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::microstructure::{InMemoryDataset, PhaseMask};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetFile {
    pub grid_size: usize,
    pub samples: Vec<Vec<String>>,
}

impl DatasetFile {
    pub fn from_masks(masks: &[PhaseMask]) -> Result<Self> {
        let grid_size = masks.first().map_or(0, PhaseMask::size);
        if let Some(bad) = masks.iter().position(|m| m.size() != grid_size) {
            bail!("sample {bad} is not {grid_size}x{grid_size}");
        }
        Ok(Self {
            grid_size,
            samples: masks.iter().map(PhaseMask::to_rows).collect(),
        })
    }

    pub fn into_dataset(self) -> Result<InMemoryDataset> {
        let masks = self
            .samples
            .iter()
            .enumerate()
            .map(|(id, rows)| {
                let mask = PhaseMask::from_rows(rows)
                    .with_context(|| format!("Invalid sample {id}"))?;
                if mask.size() != self.grid_size {
                    bail!(
                        "sample {id} is {0}x{0}, expected {1}x{1}",
                        mask.size(),
                        self.grid_size
                    );
                }
                Ok(mask)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(InMemoryDataset::new(masks))
    }
}

/// Writes `dataset` as a JSON dataset file.
pub fn write_dataset(path: &Path, dataset: &InMemoryDataset) -> Result<()> {
    let contents = DatasetFile::from_masks(dataset.samples())?;
    let file = File::create(path)
        .with_context(|| format!("Failed to create file: {}", path.display()))?;
    serde_json::to_writer(BufWriter::new(file), &contents)
        .with_context(|| format!("Failed to serialize dataset to: {}", path.display()))?;
    Ok(())
}

/// Reads a JSON dataset file, validating every mask.
pub fn read_dataset(path: &Path) -> Result<InMemoryDataset> {
    let file =
        File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
    let contents: DatasetFile = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to deserialize dataset from: {}", path.display()))?;
    contents
        .into_dataset()
        .with_context(|| format!("Invalid dataset: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::microstructure::DatasetStore;
    use tempfile::tempdir;

    #[test]
    fn test_write_and_read_dataset() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("samples.json");
        let original = InMemoryDataset::synthetic(4, 12, 3).unwrap();

        write_dataset(&path, &original)?;
        let loaded = read_dataset(&path)?;

        assert_eq!(loaded.count(), 4);
        for id in 0..4 {
            assert_eq!(loaded.get_sample(id)?, original.get_sample(id)?);
        }
        Ok(())
    }

    #[test]
    fn test_rejects_bad_samples() {
        let wrong_size = DatasetFile {
            grid_size: 3,
            samples: vec![vec!["01".into(), "10".into()]],
        };
        let err = wrong_size.into_dataset().unwrap_err();
        assert!(err.to_string().contains("expected 3x3"));

        let degenerate = DatasetFile {
            grid_size: 2,
            samples: vec![vec!["00".into(), "00".into()]],
        };
        assert!(degenerate.into_dataset().is_err());
    }

    #[test]
    fn test_missing_file_names_the_path() {
        let err = read_dataset(Path::new("/nonexistent/samples.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/samples.json"));
    }
}
