//! # Audio Capture Module
//!
//! Live input through CPAL. The device callback keeps the first channel of
//! every frame, converts it to signed 16-bit samples and slices the stream
//! into blocks of whatever length the pipeline currently expects.
//!
//! ## Features
//! - Default input device, i16 or f32 sample formats
//! - Sample rate negotiated against the device's supported ranges
//! - Block length read on every callback, so a `frame` change takes effect
//!   without restarting the stream
//! - Full queue drops blocks instead of stalling the audio callback

use anyhow::{Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, SupportedStreamConfigRange};
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Starts audio capture from the default input device.
///
/// # Arguments
/// * `sender` - Channel for finished blocks
/// * `block_length` - Samples per block, shared with the command loop
/// * `target_rate` - Requested sample rate in Hz
///
/// # Returns
/// * `Ok((stream, sample_rate))` - Running stream and the rate the device accepted
/// * `Err(e)` - No device or no usable format
pub fn start_capture(
    sender: Sender<Vec<i16>>,
    block_length: Arc<AtomicUsize>,
    target_rate: u32,
) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    log::info!("[CAPTURE] Using audio input device: {}", device.name()?);

    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    let supported = find_supported_config(configs, target_rate)
        .ok_or_else(|| anyhow!("No i16 or f32 input format found"))?;

    let sample_rate = clamp_rate(&supported, target_rate);
    if sample_rate != target_rate {
        log::warn!(
            "[CAPTURE] {} Hz not supported by the device, using {} Hz",
            target_rate,
            sample_rate
        );
    }
    let supported = supported.with_sample_rate(cpal::SampleRate(sample_rate));
    let format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    log::info!(
        "[CAPTURE] {} Hz, {} channel(s), {:?}",
        sample_rate,
        config.channels,
        format
    );

    let stream = match format {
        SampleFormat::I16 => build_stream::<i16>(&device, &config, sender, block_length)?,
        SampleFormat::F32 => build_stream::<f32>(&device, &config, sender, block_length)?,
        other => return Err(anyhow!("Unsupported sample format {:?}", other)),
    };
    stream.play()?;

    Ok((stream, sample_rate))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sender: Sender<Vec<i16>>,
    block_length: Arc<AtomicUsize>,
) -> Result<cpal::Stream>
where
    T: SizedSample + Send + 'static,
    i16: FromSample<T>,
{
    let channels = usize::from(config.channels.max(1));
    let mut slicer = BlockSlicer::new(block_length);

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            slicer.extend(data.chunks(channels).map(|frame| i16::from_sample(frame[0])));
            for block in slicer.drain_blocks() {
                if sender.try_send(block).is_err() {
                    log::debug!("[CAPTURE] Block queue full, dropping a block");
                }
            }
        },
        |err| log::error!("[CAPTURE] Stream error: {}", err),
        None,
    )?;
    Ok(stream)
}

/// Accumulates samples and cuts them into blocks of the current length.
pub struct BlockSlicer {
    block_length: Arc<AtomicUsize>,
    pending: Vec<i16>,
}

impl BlockSlicer {
    pub fn new(block_length: Arc<AtomicUsize>) -> Self {
        Self {
            block_length,
            pending: Vec::new(),
        }
    }

    pub fn extend(&mut self, samples: impl IntoIterator<Item = i16>) {
        self.pending.extend(samples);
    }

    /// Removes every complete block from the front of the buffer.
    pub fn drain_blocks(&mut self) -> Vec<Vec<i16>> {
        let n = self.block_length.load(Ordering::Relaxed);
        let mut blocks = Vec::new();
        while n > 0 && self.pending.len() >= n {
            blocks.push(self.pending.drain(..n).collect());
        }
        blocks
    }
}

/// Picks the input format whose rate range lies closest to `target_rate`.
///
/// Only i16 and f32 formats are considered; ranges that contain the target
/// rank first, then fewer channels.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| matches!(c.sample_format(), SampleFormat::I16 | SampleFormat::F32))
        .min_by_key(|c| {
            let distance = rate_distance(c.min_sample_rate().0, c.max_sample_rate().0, target_rate);
            (distance, c.channels())
        })
}

fn clamp_rate(config: &SupportedStreamConfigRange, target_rate: u32) -> u32 {
    target_rate.clamp(config.min_sample_rate().0, config.max_sample_rate().0)
}

/// Zero inside `[min, max]`, otherwise the distance to the nearer bound.
fn rate_distance(min: u32, max: u32, target: u32) -> u32 {
    if target < min {
        min - target
    } else {
        target.saturating_sub(max)
    }
}
