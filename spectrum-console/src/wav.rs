//! WAV replay source.
//!
//! Reads a file with hound, keeps the first channel as i16 and feeds it
//! through the same block channel as live capture. The channel closes when
//! the file runs out.

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::capture::BlockSlicer;

/// Decoded mono audio.
pub struct WavClip {
    pub sample_rate: u32,
    pub samples: Vec<i16>,
}

/// Loads `path` as mono i16, whatever its bit depth or channel count.
pub fn load_wav(path: &Path) -> Result<WavClip> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let samples: Vec<i16> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .step_by(channels)
            .map(|s| s.map(float_to_i16))
            .collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => reader
            .samples::<i32>()
            .step_by(channels)
            .map(|s| s.map(|v| int_to_i16(v, spec.bits_per_sample)))
            .collect::<Result<_, _>>()?,
    };

    log::info!(
        "[WAV] {}: {} Hz, {} channel(s), {} bits, {:.1} s",
        path.display(),
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample,
        samples.len() as f64 / spec.sample_rate.max(1) as f64
    );

    Ok(WavClip {
        sample_rate: spec.sample_rate,
        samples,
    })
}

fn float_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn int_to_i16(sample: i32, bits: u16) -> i16 {
    if bits > 16 {
        (sample >> (bits - 16)) as i16
    } else {
        (sample << (16 - bits)) as i16
    }
}

/// Streams `clip` as blocks on a worker thread.
///
/// With `paced` set each block is held back for its own duration, so the
/// pipeline sees the file in real time. A message on `shutdown` or a closed
/// receiver stops the worker early.
pub fn spawn_replay(
    clip: WavClip,
    sender: Sender<Vec<i16>>,
    block_length: Arc<AtomicUsize>,
    paced: bool,
    shutdown: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        log::info!("[WAV] Replay started");
        let mut slicer = BlockSlicer::new(block_length);
        let chunk = (clip.sample_rate as usize / 20).max(1);

        for piece in clip.samples.chunks(chunk) {
            slicer.extend(piece.iter().copied());
            for block in slicer.drain_blocks() {
                let duration = Duration::from_secs_f64(block.len() as f64 / clip.sample_rate.max(1) as f64);
                if sender.send(block).is_err() {
                    log::info!("[WAV] Receiver gone, stopping replay");
                    return;
                }
                if shutdown.try_recv().is_ok() {
                    log::info!("[WAV] Received shutdown signal");
                    return;
                }
                if paced {
                    thread::sleep(duration);
                }
            }
        }
        log::info!("[WAV] End of file");
    })
}
