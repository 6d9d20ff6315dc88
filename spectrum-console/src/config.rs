use serde::Deserialize;
use spectrum_core::PipelineConfig;
use std::path::{Path, PathBuf};

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "spectrum.toml";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub commands: CommandPolicy,
}

#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
}

/// Limits the text commands place on reconfiguration, on top of the
/// pipeline's own validation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandPolicy {
    #[serde(default = "default_max_high_cutoff")]
    pub max_high_cutoff: f64,
    #[serde(default = "default_frame_lengths")]
    pub frame_lengths: Vec<usize>,
    #[serde(default = "default_sample_rates")]
    pub sample_rates: Vec<u32>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
        }
    }
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self {
            max_high_cutoff: default_max_high_cutoff(),
            frame_lengths: default_frame_lengths(),
            sample_rates: default_sample_rates(),
        }
    }
}

fn default_store_dir() -> PathBuf { "record_files".into() }
fn default_max_high_cutoff() -> f64 { 4500.0 }
fn default_frame_lengths() -> Vec<usize> { vec![256, 512, 800, 1024] }
fn default_sample_rates() -> Vec<u32> { vec![4000, 7000, 9000, 44_100, 48_000] }

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            log::warn!("[CONFIG] {}: {}", path.display(), e);
            None
        }
    }
}
