pub mod data;
pub mod dataset;
pub mod differ;
pub mod etl;
pub mod folds;
pub mod mining;
pub mod model;
pub mod preprocessing;
pub mod split;
pub mod training;
pub mod vocab;

use anyhow::{Context, Result};
use std::path::Path;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: data::DataConfig,
    pub mining: mining::MiningConfig,
    pub model: model::ModelConfig,
    pub training: training::TrainingConfig,
}

impl Config {
    /// Reads a JSON config; missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        serde_json::from_str(&config_str)
            .with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}
