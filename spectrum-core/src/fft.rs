//! # Fast Fourier Transform (FFT) Module
//!
//! This module turns a filtered block into its one-sided magnitude spectrum,
//! the decibel row pushed into the spectrogram, and the dominant frequency.
//!
//! ## Features
//! - High-performance FFT using RustFFT, planned once per block length
//! - Decibel conversion with a fixed floor offset so silent bins stay finite
//! - Frequency and time axes for the external plotting layer

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use crate::error::InputError;

/// Added to every magnitude before taking the logarithm.
///
/// Stored fingerprints were produced with this exact offset, so it must not change.
pub const DB_FLOOR_OFFSET: f64 = 0.1;

/// Spectral view of a single block.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralFrame {
    /// |rfft(block)|, N/2 + 1 bins.
    pub magnitudes: Vec<f64>,
    /// `20 * log10(magnitude + DB_FLOOR_OFFSET)` per bin.
    pub psd_db: Vec<f64>,
    /// Index of the loudest bin (first one on ties).
    pub peak_bin: usize,
    /// Centre frequency of `peak_bin` in Hz.
    pub peak_frequency: f64,
}

/// Real-input FFT for a fixed block length.
pub struct SpectralAnalyzer {
    block_length: usize,
    fft: Arc<dyn Fft<f64>>,
}

impl SpectralAnalyzer {
    pub fn new(block_length: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(block_length);
        Self { block_length, fft }
    }

    pub fn block_length(&self) -> usize {
        self.block_length
    }

    /// Number of one-sided bins, N/2 + 1.
    pub fn bin_count(&self) -> usize {
        self.block_length / 2 + 1
    }

    /// Computes magnitude spectrum, decibel row and peak frequency of `block`.
    ///
    /// # Arguments
    /// * `block` - Filtered samples, exactly `block_length` long
    /// * `sample_rate` - Sample rate in Hz, used to map the peak bin to Hz
    pub fn analyze(&self, block: &[f64], sample_rate: u32) -> Result<SpectralFrame, InputError> {
        if block.len() != self.block_length {
            return Err(InputError::BlockLength {
                expected: self.block_length,
                got: block.len(),
            });
        }

        let mut buffer: Vec<Complex<f64>> = block
            .iter()
            .map(|&sample| Complex { re: sample, im: 0.0 })
            .collect();
        self.fft.process(&mut buffer);

        let magnitudes: Vec<f64> = buffer
            .iter()
            .take(self.bin_count())
            .map(|c| c.norm())
            .collect();

        let peak_bin = magnitudes
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, &m)| if m > best.1 { (i, m) } else { best })
            .0;

        Ok(SpectralFrame {
            psd_db: to_decibels(&magnitudes),
            peak_frequency: bin_frequency(peak_bin, self.block_length, sample_rate),
            magnitudes,
            peak_bin,
        })
    }
}

/// Converts magnitudes to decibels with the fixed floor offset.
pub fn to_decibels(magnitudes: &[f64]) -> Vec<f64> {
    magnitudes
        .iter()
        .map(|m| 20.0 * (m + DB_FLOOR_OFFSET).log10())
        .collect()
}

/// Centre frequency in Hz of bin `bin` for a real FFT of `block_length` samples.
pub fn bin_frequency(bin: usize, block_length: usize, sample_rate: u32) -> f64 {
    bin as f64 * sample_rate as f64 / block_length as f64
}

/// Centre frequencies of all one-sided bins.
pub fn frequency_axis(block_length: usize, sample_rate: u32) -> Vec<f64> {
    (0..block_length / 2 + 1)
        .map(|bin| bin_frequency(bin, block_length, sample_rate))
        .collect()
}

/// `block_length` evenly spaced instants spanning `[0, block_length / sample_rate]` seconds.
pub fn time_axis(block_length: usize, sample_rate: u32) -> Vec<f64> {
    let duration = block_length as f64 / sample_rate as f64;
    if block_length < 2 {
        return vec![0.0; block_length];
    }
    let step = duration / (block_length - 1) as f64;
    (0..block_length).map(|i| i as f64 * step).collect()
}
