//! # Error Types
//!
//! Every failure in the core is local and recoverable: a bad block skips one
//! tick, a bad reconfiguration is rejected while the previous state stays in
//! place, and a missing fingerprint is reported as a miss.

use std::path::PathBuf;
use thiserror::Error;

/// A sample block that cannot be processed this tick.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("expected a block of {expected} samples, got {got}")]
    BlockLength { expected: usize, got: usize },

    #[error("block contains a non-finite sample at index {index}")]
    NonFinite { index: usize },

    #[error("block overflowed the spectrum at bin {bin}")]
    SpectrumOverflow { bin: usize },
}

/// A rejected reconfiguration request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("sample rate must be positive, got {0} Hz")]
    SampleRate(u32),

    #[error("block length must be positive, got {0}")]
    BlockLength(usize),

    #[error("spectrogram depth must be positive, got {0}")]
    Depth(usize),

    #[error("cutoff frequency must be a positive finite value, got {0} Hz")]
    Cutoff(f64),

    #[error("low cutoff {cutoff} Hz is not below the Nyquist frequency {nyquist} Hz")]
    AboveNyquist { cutoff: f64, nyquist: f64 },

    #[error("similarity window must be positive and data range finite and positive")]
    Similarity,
}

/// Failure to derive a set of Butterworth coefficients.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterDesignError {
    #[error("filter order must be at least 1")]
    ZeroOrder,

    #[error("normalized cutoff {0} is outside the open interval (0, 1)")]
    CutoffOutOfRange(f64),
}

/// Failure to score two spectrograms against each other.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimilarityError {
    #[error("cannot compare a {left_rows}x{left_cols} matrix with a {right_rows}x{right_cols} matrix")]
    ShapeMismatch {
        left_rows: usize,
        left_cols: usize,
        right_rows: usize,
        right_cols: usize,
    },

    #[error("cannot compare empty spectrograms")]
    Empty,

    #[error("cannot compare a spectrogram with ragged rows")]
    Ragged,
}

/// Failures of a fingerprint backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no fingerprint stored under {0}")]
    NotFound(String),

    #[error("invalid fingerprint label {0:?}")]
    InvalidLabel(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed fingerprint file {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Any error produced by the core.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    FilterDesign(#[from] FilterDesignError),

    #[error(transparent)]
    Similarity(#[from] SimilarityError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, Error>;
