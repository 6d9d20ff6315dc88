// spectrum-core/src/lib.rs

//! The core logic for the live spectrum analyser.
//! This crate filters audio blocks, keeps a rolling spectrogram, maps the
//! dominant frequency onto a note, and records or compares spectrogram
//! fingerprints. It is completely headless: no audio device, terminal or
//! plotting code lives here.

pub mod config;
pub mod error;
pub mod fft;
pub mod filter;
pub mod fingerprint;
pub mod pipeline;
pub mod similarity;
pub mod spectrogram;
pub mod tuning;
pub mod workflow;

pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use fingerprint::{DirectoryStore, FingerprintKey, FingerprintStore, Geometry, MemoryStore};
pub use pipeline::{BlockAnalysis, Mode, ModeEvent, Pipeline};
pub use similarity::{structural_similarity, SsimParams};
pub use spectrogram::{Spectrogram, SpectrogramBuffer};
pub use tuning::{NoteDetector, TuneReading};
pub use workflow::{CompareOutcome, WorkflowStatus};
