use crate::infill::FillOrder;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

const CONFIG_SCHEMA_VERSION: u32 = 1;
const DEFAULT_VOCAB_SIZE: usize = 13050;
// 11³ cells.
const DEFAULT_MAX_SEQUENCE_LENGTH: usize = 1331;
const DEFAULT_TEMPERATURE: f32 = 1.0;
const MIN_VOCAB_SIZE: usize = 2;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config io: {0}")]
    Io(#[from] io::Error),
    #[error("config json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decoder settings shared by full-sequence generation and infill.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorConfig {
    pub schema_version: u32,
    /// Number of token classes the model scores.
    pub vocab_size: usize,
    /// Cells in a generated structure; must be the volume of a cube.
    pub max_sequence_length: usize,
    pub temperature: f32,
    pub fill_order: FillOrder,
    /// Causal decoding when true, one-shot otherwise.
    pub autoregressive: bool,
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION,
            vocab_size: DEFAULT_VOCAB_SIZE,
            max_sequence_length: DEFAULT_MAX_SEQUENCE_LENGTH,
            temperature: DEFAULT_TEMPERATURE,
            fill_order: FillOrder::Random,
            autoregressive: true,
            seed: None,
        }
    }
}

impl GeneratorConfig {
    pub fn sanitized(mut self) -> Self {
        if self.schema_version != CONFIG_SCHEMA_VERSION {
            log::warn!(
                "generator config schema {} differs from {}, reading it as {}",
                self.schema_version,
                CONFIG_SCHEMA_VERSION,
                CONFIG_SCHEMA_VERSION
            );
        }
        self.schema_version = CONFIG_SCHEMA_VERSION;
        if self.vocab_size < MIN_VOCAB_SIZE {
            log::warn!("vocab_size {} raised to {MIN_VOCAB_SIZE}", self.vocab_size);
            self.vocab_size = MIN_VOCAB_SIZE;
        }
        if self.max_sequence_length == 0 {
            log::warn!("max_sequence_length 0 raised to 1");
            self.max_sequence_length = 1;
        }
        if !self.temperature.is_finite() {
            log::warn!("non-finite temperature reset to {DEFAULT_TEMPERATURE}");
            self.temperature = DEFAULT_TEMPERATURE;
        }
        self
    }
}

pub fn load_config(path: &Path) -> Result<GeneratorConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    let config: GeneratorConfig = serde_json::from_str(&raw)?;
    Ok(config.sanitized())
}

pub fn save_config(path: &Path, config: &GeneratorConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let bytes = serde_json::to_vec_pretty(config)?;
    std::fs::write(path, bytes)?;
    Ok(())
}
