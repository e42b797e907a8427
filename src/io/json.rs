use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::sim::surrogate::{FnoModel, FnoWeights, SurrogateSlot};
use crate::sim::{HomogConfig, SimulationResult};

/// Reads a [`HomogConfig`]; missing fields take their defaults.
pub fn read_config(path: &Path) -> Result<HomogConfig> {
    let file =
        File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
    let config: HomogConfig = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to deserialize config from: {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid config in: {}", path.display()))?;
    Ok(config)
}

/// Writes a simulation result as pretty JSON.
pub fn write_result_json(path: &Path, result: &SimulationResult) -> Result<()> {
    write_json(path, result, "simulation result")
}

/// Serializes a simulation result to a JSON string.
pub fn to_result_string(result: &SimulationResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("Failed to serialize simulation result to string")
}

pub fn read_fno_weights(path: &Path) -> Result<FnoWeights> {
    let file =
        File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to deserialize FNO weights from: {}", path.display()))
}

pub fn write_fno_weights(path: &Path, weights: &FnoWeights) -> Result<()> {
    write_json(path, weights, "FNO weights")
}

/// Loads the surrogate named by `path`, or an empty slot when there is none.
pub fn load_surrogate(path: Option<&Path>) -> Result<SurrogateSlot> {
    let Some(path) = path else {
        return Ok(SurrogateSlot::Absent);
    };
    let weights = read_fno_weights(path)?;
    let model = FnoModel::from_weights(weights)
        .with_context(|| format!("Invalid FNO weights: {}", path.display()))?;
    info!(
        name = %model.weights().name,
        grid_size = model.weights().grid_size,
        layers = model.weights().layers.len(),
        "surrogate loaded"
    );
    Ok(SurrogateSlot::loaded(model))
}

fn write_json<T: Serialize>(path: &Path, value: &T, what: &str) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create file: {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("Failed to serialize {what} to: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::microstructure::PhaseMask;
    use crate::sim::{SimContext, SimulationRequest, SolverScheme, simulate};
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_read_partial_config() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.json");
        let mut f = File::create(&path)?;
        writeln!(f, r#"{{"grid_size": 32, "solver": {{"scheme": "fixed_point", "max_iterations": 50}}}}"#)?;
        drop(f);

        let cfg = read_config(&path)?;
        assert_eq!(cfg.grid_size, 32);
        assert_eq!(cfg.solver.scheme, SolverScheme::FixedPoint);
        assert_eq!(cfg.solver.max_iterations, 50);
        assert_eq!(cfg.ingest, HomogConfig::default().ingest);
        Ok(())
    }

    #[test]
    fn test_config_with_one_cell_grid_is_rejected() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"grid_size": 1}"#)?;

        let err = read_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("grid_size"), "{err:#}");
        Ok(())
    }

    #[test]
    fn test_result_json_layout() -> Result<()> {
        let mask = PhaseMask::from_rows(&["0110", "0110", "0000", "0000"])?;
        let ctx = SimContext::new(HomogConfig::default().with_grid_size(4));
        let result = simulate(&ctx, &SimulationRequest::new(mask, 2.0, 45.0))?;

        let dir = tempdir()?;
        let path = dir.path().join("result.json");
        write_result_json(&path, &result)?;
        let value: serde_json::Value = serde_json::from_reader(File::open(&path)?)?;
        for key in [
            "image",
            "param_field",
            "temp0",
            "temp1",
            "flux_norm0",
            "flux_norm1",
            "vol_frac",
            "reuss",
            "voigt",
            "eig_kappa",
            "kappa_eff",
            "alpha_deg",
            "kappa_alpha",
            "flux_norm_alpha",
            "solver",
            "warnings",
            "surrogate_results",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["vol_frac"], 0.25);
        assert!(to_result_string(&result)?.contains("\"kappa_eff\""));
        Ok(())
    }

    #[test]
    fn test_surrogate_weights_roundtrip() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("fno.json");
        let model = FnoModel::zeros("tiny", 8, 3, 2, 2).unwrap();
        write_fno_weights(&path, model.weights())?;

        let slot = load_surrogate(Some(&path))?;
        assert_eq!(slot.name(), Some("tiny"));
        assert!(!load_surrogate(None)?.has_surrogate());
        Ok(())
    }

    #[test]
    fn test_inconsistent_weights_are_rejected() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.json");
        let mut weights = FnoModel::zeros("broken", 8, 3, 2, 1).unwrap().weights().clone();
        weights.layers[0].spectral_re.pop();
        write_fno_weights(&path, &weights)?;

        let err = load_surrogate(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("spectral weights"));
        Ok(())
    }
}
