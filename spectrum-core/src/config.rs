//! Pipeline configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::similarity::SsimParams;

/// Everything the pipeline needs to build its filters, spectrum and history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Sampling frequency in Hz.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Samples per block (N). The spectrum has N/2 + 1 bins.
    #[serde(default = "default_block_length")]
    pub block_length: usize,
    /// Rows kept in the spectrogram history (D).
    #[serde(default = "default_depth")]
    pub depth: usize,
    /// High-pass cutoff in Hz. Also the lowest frequency the tuner reports.
    #[serde(default = "default_low_cutoff")]
    pub low_cutoff: f64,
    /// Low-pass cutoff in Hz. At or above Nyquist the low-pass stage is skipped.
    #[serde(default = "default_high_cutoff")]
    pub high_cutoff: f64,
    #[serde(default)]
    pub similarity: SsimParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            block_length: default_block_length(),
            depth: default_depth(),
            low_cutoff: default_low_cutoff(),
            high_cutoff: default_high_cutoff(),
            similarity: SsimParams::default(),
        }
    }
}

impl PipelineConfig {
    pub fn nyquist(&self) -> f64 {
        self.sample_rate as f64 / 2.0
    }

    /// Number of frequency bins produced per block.
    pub fn bin_count(&self) -> usize {
        self.block_length / 2 + 1
    }

    /// Checks every field. A config that passes can be applied without
    /// leaving the pipeline in a partial state.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::SampleRate(self.sample_rate));
        }
        if self.block_length == 0 {
            return Err(ConfigError::BlockLength(self.block_length));
        }
        if self.depth == 0 {
            return Err(ConfigError::Depth(self.depth));
        }
        for cutoff in [self.low_cutoff, self.high_cutoff] {
            if !cutoff.is_finite() || cutoff <= 0.0 {
                return Err(ConfigError::Cutoff(cutoff));
            }
        }
        if self.low_cutoff >= self.nyquist() {
            return Err(ConfigError::AboveNyquist {
                cutoff: self.low_cutoff,
                nyquist: self.nyquist(),
            });
        }
        self.similarity.validate()
    }
}

fn default_sample_rate() -> u32 { 44_100 }
fn default_block_length() -> usize { 2048 }
fn default_depth() -> usize { 100 }
fn default_low_cutoff() -> f64 { 150.0 }
fn default_high_cutoff() -> f64 { 12_000.0 }
