//! # Spectrum - Live Spectrum Analyser Console
//!
//! Console front end for `spectrum-core`. Audio arrives as i16 blocks from
//! the default input device or from a replayed WAV file; text commands arrive
//! on stdin. Both feed one `select!` loop that owns the pipeline.
//!
//! ## Architecture
//! - **Audio**: CPAL callback or WAV replay thread slicing samples into blocks
//! - **Commands**: stdin reader thread forwarding whole lines
//! - **Main loop**: processes blocks, prints tune readings and workflow
//!   results, applies commands
//! - **Communication**: Crossbeam channels between the threads

mod capture;
mod cli;
mod commands;
mod config;
mod display;
mod wav;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cpal::traits::StreamTrait;
use crossbeam_channel::{Receiver, Sender};
use spectrum_core::{DirectoryStore, FingerprintStore, Mode, Pipeline};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use cli::Cli;
use commands::Command;
use config::{CommandPolicy, Config};

/// Blocks buffered between the audio source and the main loop.
const BLOCK_QUEUE: usize = 16;

/// Where blocks come from.
enum Source {
    Live {
        stream: cpal::Stream,
        sender: Sender<Vec<i16>>,
    },
    Replay {
        worker: JoinHandle<()>,
        shutdown: Sender<()>,
    },
}

impl Source {
    /// Restarts live capture at `rate` and returns the rate the device took.
    fn restart(&mut self, rate: u32, block_length: &Arc<AtomicUsize>) -> Result<u32> {
        match self {
            Source::Live { stream, sender } => {
                stream.pause()?;
                match capture::start_capture(sender.clone(), block_length.clone(), rate) {
                    Ok((new_stream, actual)) => {
                        *stream = new_stream;
                        Ok(actual)
                    }
                    Err(e) => {
                        stream.play()?;
                        Err(e)
                    }
                }
            }
            Source::Replay { .. } => bail!("the sample rate is fixed by the replayed file"),
        }
    }

    fn stop(self) {
        match self {
            Source::Live { stream, .. } => {
                if let Err(e) = stream.pause() {
                    log::warn!("[MAIN] Error pausing stream: {}", e);
                }
            }
            Source::Replay { worker, shutdown } => {
                // A worker parked on a full queue exits once the block receiver is gone.
                let _ = shutdown.try_send(());
                if worker.join().is_err() {
                    log::warn!("[MAIN] Replay thread panicked");
                }
            }
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(|| {
        let local = PathBuf::from(config::DEFAULT_CONFIG_FILE);
        local.exists().then_some(local)
    });
    let mut settings = Config::default();
    if let Some(ref path) = config_path {
        match config::load_config(path) {
            Some(loaded) => {
                log::info!("[MAIN] Loaded config from {}", path.display());
                settings = loaded;
            }
            None => log::warn!("[MAIN] Failed to load config from {}", path.display()),
        }
    }
    cli.merge_into(&mut settings);

    let block_length = Arc::new(AtomicUsize::new(settings.pipeline.block_length));
    let (block_tx, block_rx) = crossbeam_channel::bounded::<Vec<i16>>(BLOCK_QUEUE);

    let source = match &cli.wav {
        Some(path) => {
            let clip = wav::load_wav(path)?;
            settings.pipeline.sample_rate = clip.sample_rate;
            let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
            let worker = wav::spawn_replay(clip, block_tx, block_length.clone(), !cli.no_pacing, shutdown_rx);
            Source::Replay {
                worker,
                shutdown: shutdown_tx,
            }
        }
        None => {
            let (stream, rate) = capture::start_capture(
                block_tx.clone(),
                block_length.clone(),
                settings.pipeline.sample_rate,
            )
            .context("Failed to start audio capture")?;
            settings.pipeline.sample_rate = rate;
            Source::Live {
                stream,
                sender: block_tx,
            }
        }
    };

    let store = DirectoryStore::new(&settings.store.dir);
    log::info!("[MAIN] Fingerprints in {}", store.root().display());
    let mut pipeline =
        Pipeline::new(settings.pipeline.clone(), store).context("Invalid pipeline configuration")?;
    if cli.tune {
        pipeline.set_mode(Mode::Tuning)?;
    }

    println!("Type h for help.");
    let command_rx = spawn_stdin_reader();
    let mut session = Session {
        pipeline,
        source,
        blocks: block_rx,
        block_length,
        policy: settings.commands,
    };
    session.run(command_rx);
    session.source.stop();
    log::info!("[MAIN] Finished");
    Ok(())
}

/// Forwards stdin lines until EOF.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::warn!("[MAIN] Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

enum Flow {
    Continue,
    Quit,
}

struct Session<S: FingerprintStore> {
    pipeline: Pipeline<S>,
    source: Source,
    blocks: Receiver<Vec<i16>>,
    block_length: Arc<AtomicUsize>,
    policy: CommandPolicy,
}

impl<S: FingerprintStore> Session<S> {
    fn run(&mut self, mut commands: Receiver<String>) {
        let blocks = self.blocks.clone();
        loop {
            let mut stdin_closed = false;
            crossbeam_channel::select! {
                recv(blocks) -> msg => match msg {
                    Ok(block) => self.handle_block(&block),
                    Err(_) => {
                        log::info!("[MAIN] Audio source closed");
                        break;
                    }
                },
                recv(commands) -> msg => match msg {
                    Ok(line) => {
                        if let Flow::Quit = self.handle_line(&line) {
                            break;
                        }
                    }
                    Err(_) => stdin_closed = true,
                },
            }
            if stdin_closed {
                log::debug!("[MAIN] stdin closed, commands disabled");
                commands = crossbeam_channel::never();
            }
        }
    }

    fn handle_block(&mut self, block: &[i16]) {
        match self.pipeline.process_pcm(block) {
            Ok(analysis) => {
                if let Some(line) = analysis.event.as_ref().and_then(display::event_line) {
                    println!("{line}");
                }
            }
            // Blocks captured before a frame change still carry the old length.
            Err(e) => log::debug!("[MAIN] Skipping block: {}", e),
        }
    }

    fn handle_line(&mut self, line: &str) -> Flow {
        let command = match commands::parse(line).and_then(|c| self.policy.check(&c).map(|_| c)) {
            Ok(command) => command,
            Err(e) => {
                println!("{e}");
                return Flow::Continue;
            }
        };

        match command {
            Command::Quit => return Flow::Quit,
            Command::Help => println!("{}", commands::HELP),
            Command::SampleRate(rate) => {
                if let Err(e) = self.change_sample_rate(rate) {
                    println!("{e:#}");
                }
            }
            Command::FrameLength(n) => match commands::apply(&mut self.pipeline, Command::FrameLength(n)) {
                Ok(()) => self.block_length.store(n, Ordering::Relaxed),
                Err(e) => println!("{e}"),
            },
            other => {
                if let Err(e) = commands::apply(&mut self.pipeline, other) {
                    println!("{e}");
                }
            }
        }
        Flow::Continue
    }

    fn change_sample_rate(&mut self, rate: u32) -> Result<()> {
        let mut trial = self.pipeline.config().clone();
        trial.sample_rate = rate;
        trial.validate()?;
        let actual = self.source.restart(rate, &self.block_length)?;
        let stale = discard_queued(&self.blocks);
        if stale > 0 {
            log::debug!("[MAIN] Dropped {} blocks captured at the old rate", stale);
        }
        self.pipeline.set_sample_rate(actual)?;
        Ok(())
    }
}

/// Empties the block queue without blocking and returns how many blocks went.
fn discard_queued(blocks: &Receiver<Vec<i16>>) -> usize {
    blocks.try_iter().count()
}
