use clap::Parser;
use std::path::PathBuf;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "spectrum",
    about = "Live spectrum analyser with a note tuner and spectrogram fingerprints"
)]
pub struct Cli {
    /// Replay a WAV file instead of capturing from the default input device
    #[arg(long)]
    pub wav: Option<PathBuf>,

    /// Replay as fast as possible instead of in real time
    #[arg(long, requires = "wav")]
    pub no_pacing: bool,

    /// Config file (defaults to spectrum.toml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Sampling frequency in Hz
    #[arg(short, long)]
    pub sample_rate: Option<u32>,

    /// Samples per block
    #[arg(short, long)]
    pub frame: Option<usize>,

    /// Spectrogram rows kept in history
    #[arg(long)]
    pub depth: Option<usize>,

    /// High-pass cutoff in Hz
    #[arg(long)]
    pub low_cutoff: Option<f64>,

    /// Low-pass cutoff in Hz
    #[arg(long)]
    pub high_cutoff: Option<f64>,

    /// Directory holding fingerprint files
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Start in tuning mode
    #[arg(short, long)]
    pub tune: bool,
}

impl Cli {
    /// Explicit flags win over the config file.
    pub fn merge_into(&self, config: &mut Config) {
        let pipeline = &mut config.pipeline;
        if let Some(rate) = self.sample_rate {
            pipeline.sample_rate = rate;
        }
        if let Some(frame) = self.frame {
            pipeline.block_length = frame;
        }
        if let Some(depth) = self.depth {
            pipeline.depth = depth;
        }
        if let Some(hz) = self.low_cutoff {
            pipeline.low_cutoff = hz;
        }
        if let Some(hz) = self.high_cutoff {
            pipeline.high_cutoff = hz;
        }
        if let Some(dir) = &self.store {
            config.store.dir = dir.clone();
        }
    }
}
