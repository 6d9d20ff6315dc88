//! # Analysis Pipeline
//!
//! Runs one block at a time through filter -> spectrum -> spectrogram, then
//! performs whatever the current [`Mode`] asks for. The command layer drives
//! mode changes and reconfiguration; record and compare drop back to
//! [`Mode::Idle`] on their own once they finish.

use crate::config::PipelineConfig;
use crate::error::{Error, InputError, Result};
use crate::fft::{self, SpectralAnalyzer};
use crate::filter::FilterBank;
use crate::fingerprint::{FingerprintKey, FingerprintStore, Geometry};
use crate::spectrogram::SpectrogramBuffer;
use crate::tuning::{NoteDetector, TuneReading};
use crate::workflow::{CompareOutcome, FingerprintWorkflow, WorkflowStatus};

/// What the pipeline does with each block beyond the common analysis.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Idle,
    Tuning,
    Recording {
        label: String,
    },
    Comparing {
        /// Fingerprint to score against; `None` auto-matches.
        target: Option<String>,
        /// Also store the live snapshot under this label.
        save_as: Option<String>,
    },
}

/// Per-block result of the active mode.
#[derive(Debug)]
pub enum ModeEvent {
    /// `None` when the peak lies below the low cutoff.
    Tuned(Option<TuneReading>),
    Recording(WorkflowStatus<FingerprintKey>),
    Comparing(WorkflowStatus<CompareOutcome>),
    /// A record/compare workflow reached completion but could not finish its
    /// store or scoring step. The pipeline has returned to idle.
    WorkflowFailed(Error),
}

impl ModeEvent {
    /// True when a record/compare workflow finished on this block.
    pub fn completes_workflow(&self) -> bool {
        match self {
            ModeEvent::Tuned(_) => false,
            ModeEvent::Recording(status) => status.is_complete(),
            ModeEvent::Comparing(status) => status.is_complete(),
            ModeEvent::WorkflowFailed(_) => true,
        }
    }
}

/// Everything produced for one block.
#[derive(Debug)]
pub struct BlockAnalysis {
    /// Filtered, time-aligned waveform.
    pub waveform: Vec<f64>,
    /// Magnitude spectrum, N/2 + 1 bins.
    pub spectrum: Vec<f64>,
    pub peak_frequency: f64,
    pub event: Option<ModeEvent>,
}

/// Owns all mutable analysis state for one audio stream.
pub struct Pipeline<S: FingerprintStore> {
    config: PipelineConfig,
    filters: FilterBank,
    analyzer: SpectralAnalyzer,
    spectrogram: SpectrogramBuffer,
    detector: NoteDetector,
    workflow: FingerprintWorkflow,
    store: S,
    mode: Mode,
    last_peak: Option<f64>,
}

impl<S: FingerprintStore> Pipeline<S> {
    pub fn new(config: PipelineConfig, store: S) -> Result<Self> {
        config.validate()?;
        log::info!(
            "[PIPELINE] {} Hz, {} samples per block, depth {}, pass band {}-{} Hz",
            config.sample_rate,
            config.block_length,
            config.depth,
            config.low_cutoff,
            config.high_cutoff
        );
        Ok(Self {
            filters: FilterBank::new(config.sample_rate, config.low_cutoff, config.high_cutoff),
            analyzer: SpectralAnalyzer::new(config.block_length),
            spectrogram: SpectrogramBuffer::new(config.depth, config.bin_count()),
            detector: NoteDetector::new(),
            workflow: FingerprintWorkflow::new(),
            store,
            mode: Mode::Idle,
            last_peak: None,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn spectrogram(&self) -> &SpectrogramBuffer {
        &self.spectrogram
    }

    pub fn detector(&self) -> &NoteDetector {
        &self.detector
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn geometry(&self) -> Geometry {
        Geometry {
            sample_rate: self.config.sample_rate,
            block_length: self.config.block_length,
            depth: self.config.depth,
        }
    }

    /// Bin centre frequencies for the current configuration.
    pub fn frequency_axis(&self) -> Vec<f64> {
        fft::frequency_axis(self.config.block_length, self.config.sample_rate)
    }

    /// Sample instants for the current configuration.
    pub fn time_axis(&self) -> Vec<f64> {
        fft::time_axis(self.config.block_length, self.config.sample_rate)
    }

    /// Switches mode. Labels are checked up front and the block counter restarts.
    pub fn set_mode(&mut self, mode: Mode) -> Result<()> {
        let geometry = self.geometry();
        let labels: Vec<&String> = match &mode {
            Mode::Recording { label } => vec![label],
            Mode::Comparing { target, save_as } => target.iter().chain(save_as.iter()).collect(),
            Mode::Idle | Mode::Tuning => Vec::new(),
        };
        for label in labels {
            FingerprintKey::new(label, geometry)?;
        }
        log::info!("[PIPELINE] Mode {:?} -> {:?}", self.mode, mode);
        self.workflow.reset();
        self.mode = mode;
        Ok(())
    }

    /// Processes a block of signed 16-bit capture samples.
    pub fn process_pcm(&mut self, block: &[i16]) -> Result<BlockAnalysis> {
        let samples: Vec<f64> = block.iter().map(|&s| s as f64).collect();
        self.process(&samples)
    }

    /// Processes one block. A malformed block is rejected before any state changes.
    pub fn process(&mut self, block: &[f64]) -> Result<BlockAnalysis> {
        if block.len() != self.config.block_length {
            return Err(InputError::BlockLength {
                expected: self.config.block_length,
                got: block.len(),
            }
            .into());
        }
        if let Some(index) = block.iter().position(|s| !s.is_finite()) {
            return Err(InputError::NonFinite { index }.into());
        }

        let waveform = self.filters.apply(block);
        let frame = self.analyzer.analyze(&waveform, self.config.sample_rate)?;
        // Finite but huge samples can still overflow the transform.
        if let Some(bin) = frame.psd_db.iter().position(|db| !db.is_finite()) {
            return Err(InputError::SpectrumOverflow { bin }.into());
        }
        self.spectrogram.push(&frame.psd_db)?;
        self.last_peak = Some(frame.peak_frequency);
        log::trace!("[PIPELINE] Peak at {:.1} Hz", frame.peak_frequency);

        let event = self.run_mode(frame.peak_frequency);

        Ok(BlockAnalysis {
            waveform,
            spectrum: frame.magnitudes,
            peak_frequency: frame.peak_frequency,
            event,
        })
    }

    /// Tunes against the most recent peak, independent of the current mode.
    pub fn tune(&mut self) -> Option<TuneReading> {
        let peak = self.last_peak?;
        self.detector.tune(peak, self.config.low_cutoff)
    }

    fn run_mode(&mut self, peak_frequency: f64) -> Option<ModeEvent> {
        let geometry = self.geometry();
        let event = match &self.mode {
            Mode::Idle => return None,
            Mode::Tuning => {
                return Some(ModeEvent::Tuned(
                    self.detector.tune(peak_frequency, self.config.low_cutoff),
                ));
            }
            Mode::Recording { label } => self
                .workflow
                .record(&mut self.store, label, geometry, &self.spectrogram)
                .map(ModeEvent::Recording),
            Mode::Comparing { target, save_as } => self
                .workflow
                .compare(
                    &mut self.store,
                    target.as_deref(),
                    save_as.as_deref(),
                    geometry,
                    &self.spectrogram,
                    &self.config.similarity,
                )
                .map(ModeEvent::Comparing),
        };

        let event = event.unwrap_or_else(|e| {
            log::error!("[PIPELINE] Workflow failed: {}", e);
            ModeEvent::WorkflowFailed(e)
        });
        if event.completes_workflow() {
            log::info!("[PIPELINE] Workflow complete, back to idle");
            self.mode = Mode::Idle;
            self.workflow.reset();
        }
        Some(event)
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) -> Result<()> {
        self.reconfigure(PipelineConfig {
            sample_rate,
            ..self.config.clone()
        })
    }

    pub fn set_block_length(&mut self, block_length: usize) -> Result<()> {
        self.reconfigure(PipelineConfig {
            block_length,
            ..self.config.clone()
        })
    }

    pub fn set_low_cutoff(&mut self, low_cutoff: f64) -> Result<()> {
        self.reconfigure(PipelineConfig {
            low_cutoff,
            ..self.config.clone()
        })
    }

    pub fn set_high_cutoff(&mut self, high_cutoff: f64) -> Result<()> {
        self.reconfigure(PipelineConfig {
            high_cutoff,
            ..self.config.clone()
        })
    }

    /// Validates and applies a whole configuration. On rejection nothing changes.
    ///
    /// On success the filters are redesigned, the spectrogram is cleared to
    /// the new shape and any record/compare count restarts.
    pub fn reconfigure(&mut self, config: PipelineConfig) -> Result<()> {
        if let Err(e) = config.validate() {
            log::warn!("[PIPELINE] Rejected reconfiguration: {}", e);
            return Err(e.into());
        }
        if config.block_length != self.config.block_length {
            self.analyzer = SpectralAnalyzer::new(config.block_length);
        }
        self.filters
            .configure(config.sample_rate, config.low_cutoff, config.high_cutoff);
        self.spectrogram.reset(config.depth, config.bin_count());
        self.workflow.reset();
        self.last_peak = None;
        log::info!(
            "[PIPELINE] Reconfigured: {} Hz, {} samples per block, pass band {}-{} Hz",
            config.sample_rate,
            config.block_length,
            config.low_cutoff,
            config.high_cutoff
        );
        self.config = config;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, StoreError};
    use crate::fingerprint::MemoryStore;
    use crate::spectrogram::Spectrogram;

    /// Refuses every write and holds nothing.
    struct FullDisk;

    impl FingerprintStore for FullDisk {
        fn put(&mut self, key: &FingerprintKey, _: &Spectrogram) -> std::result::Result<(), StoreError> {
            Err(StoreError::Io {
                path: format!("{key}.json").into(),
                source: std::io::Error::other("disk full"),
            })
        }

        fn get(&self, key: &FingerprintKey) -> std::result::Result<Spectrogram, StoreError> {
            Err(StoreError::NotFound(key.to_string()))
        }

        fn list_compatible(&self, _: &Geometry) -> std::result::Result<Vec<FingerprintKey>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            sample_rate: 8000,
            block_length: 256,
            depth: 5,
            ..PipelineConfig::default()
        }
    }

    fn tone(freq: f64, config: &PipelineConfig) -> Vec<f64> {
        (0..config.block_length)
            .map(|i| {
                1000.0 * (2.0 * std::f64::consts::PI * freq * i as f64 / config.sample_rate as f64).sin()
            })
            .collect()
    }

    #[test]
    fn idle_blocks_fill_the_spectrogram() {
        let config = small_config();
        let mut pipeline = Pipeline::new(config.clone(), MemoryStore::new()).unwrap();
        let analysis = pipeline.process(&tone(1000.0, &config)).unwrap();
        assert!(analysis.event.is_none());
        assert_eq!(analysis.waveform.len(), 256);
        assert_eq!(analysis.spectrum.len(), 129);
        assert!((analysis.peak_frequency - 1000.0).abs() < 1e-9);
        assert!(pipeline.spectrogram().row(0).unwrap().iter().any(|&db| db > 0.0));
    }

    #[test]
    fn bad_blocks_leave_state_untouched() {
        let config = small_config();
        let mut pipeline = Pipeline::new(config.clone(), MemoryStore::new()).unwrap();
        pipeline.set_mode(Mode::Recording { label: "x".into() }).unwrap();

        assert!(matches!(
            pipeline.process(&[0.0; 100]),
            Err(Error::Input(InputError::BlockLength { expected: 256, got: 100 }))
        ));
        let mut block = tone(500.0, &config);
        block[7] = f64::NAN;
        assert!(matches!(
            pipeline.process(&block),
            Err(Error::Input(InputError::NonFinite { index: 7 }))
        ));
        assert!(pipeline.spectrogram().rows().all(|r| r.iter().all(|&v| v == 0.0)));
        assert_eq!(pipeline.workflow.counter(), 0);
    }

    #[test]
    fn tuning_mode_reports_each_block() {
        let config = small_config();
        let mut pipeline = Pipeline::new(config.clone(), MemoryStore::new()).unwrap();
        pipeline.set_mode(Mode::Tuning).unwrap();
        // 437.5 Hz sits exactly on bin 14 at 8 kHz / 256.
        let analysis = pipeline.process(&tone(437.5, &config)).unwrap();
        match analysis.event {
            Some(ModeEvent::Tuned(Some(reading))) => {
                assert_eq!(reading.note.name, "A4");
                assert!((reading.peak_frequency - 437.5).abs() < 1e-9);
                assert!(reading.is_in_tune());
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(pipeline.mode(), &Mode::Tuning);
        // Just below A4, so the table folded down to A3..A4.
        assert_eq!(pipeline.detector().table().octave_shift(), -1);
    }

    #[test]
    fn tuning_below_low_cutoff_has_no_reading() {
        let config = small_config();
        let mut pipeline = Pipeline::new(config.clone(), MemoryStore::new()).unwrap();
        pipeline.set_mode(Mode::Tuning).unwrap();
        let analysis = pipeline.process(&vec![0.0; 256]).unwrap();
        assert!(matches!(analysis.event, Some(ModeEvent::Tuned(None))));
    }

    #[test]
    fn record_returns_to_idle_when_done() {
        let config = small_config();
        let mut pipeline = Pipeline::new(config.clone(), MemoryStore::new()).unwrap();
        pipeline.set_mode(Mode::Recording { label: "take".into() }).unwrap();
        let block = tone(700.0, &config);
        let mut completions = 0;
        for _ in 0..20 {
            let analysis = pipeline.process(&block).unwrap();
            if analysis.event.as_ref().is_some_and(ModeEvent::completes_workflow) {
                completions += 1;
            }
        }
        assert_eq!(completions, 1);
        assert_eq!(pipeline.mode(), &Mode::Idle);
        assert_eq!(pipeline.store().len(), 1);
    }

    #[test]
    fn failed_store_write_still_returns_to_idle() {
        let config = small_config();
        let mut pipeline = Pipeline::new(config.clone(), FullDisk).unwrap();
        pipeline.set_mode(Mode::Recording { label: "take".into() }).unwrap();
        let block = tone(700.0, &config);

        for _ in 0..config.depth {
            let event = pipeline.process(&block).unwrap().event;
            assert!(matches!(event, Some(ModeEvent::Recording(WorkflowStatus::Pending))));
        }
        let event = pipeline.process(&block).unwrap().event;
        assert!(matches!(
            event,
            Some(ModeEvent::WorkflowFailed(Error::Store(StoreError::Io { .. })))
        ));
        assert_eq!(pipeline.mode(), &Mode::Idle);
        assert_eq!(pipeline.workflow.counter(), 0);
        assert!(pipeline.process(&block).unwrap().event.is_none());
    }

    #[test]
    fn compare_against_missing_label_returns_to_idle() {
        let config = small_config();
        let mut pipeline = Pipeline::new(config.clone(), FullDisk).unwrap();
        pipeline
            .set_mode(Mode::Comparing { target: Some("ghost".into()), save_as: None })
            .unwrap();
        let block = tone(700.0, &config);

        for _ in 0..config.depth {
            pipeline.process(&block).unwrap();
        }
        match pipeline.process(&block).unwrap().event {
            Some(ModeEvent::Comparing(WorkflowStatus::Complete(CompareOutcome::NotFound { key }))) => {
                assert_eq!(key.label, "ghost");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(pipeline.mode(), &Mode::Idle);
    }

    #[test]
    fn invalid_labels_are_refused_up_front() {
        let mut pipeline = Pipeline::new(small_config(), MemoryStore::new()).unwrap();
        assert!(pipeline.set_mode(Mode::Recording { label: "".into() }).is_err());
        assert!(pipeline
            .set_mode(Mode::Comparing { target: None, save_as: Some("a/b".into()) })
            .is_err());
        assert_eq!(pipeline.mode(), &Mode::Idle);
    }

    #[test]
    fn reconfiguration_resets_history_and_counter() {
        let config = small_config();
        let mut pipeline = Pipeline::new(config.clone(), MemoryStore::new()).unwrap();
        pipeline.set_mode(Mode::Recording { label: "take".into() }).unwrap();
        pipeline.process(&tone(700.0, &config)).unwrap();
        assert_eq!(pipeline.workflow.counter(), 1);

        pipeline.set_block_length(512).unwrap();
        assert_eq!(pipeline.spectrogram().bins(), 257);
        assert_eq!(pipeline.spectrogram().depth(), 5);
        assert!(pipeline.spectrogram().rows().all(|r| r.iter().all(|&v| v == 0.0)));
        assert_eq!(pipeline.workflow.counter(), 0);
        assert_eq!(pipeline.frequency_axis().len(), 257);
        assert_eq!(pipeline.time_axis().len(), 512);

        // Old-length blocks are now transient input errors.
        assert!(pipeline.process(&tone(700.0, &config)).is_err());
    }

    #[test]
    fn rejected_reconfiguration_keeps_previous_state() {
        let config = small_config();
        let mut pipeline = Pipeline::new(config.clone(), MemoryStore::new()).unwrap();
        pipeline.process(&tone(700.0, &config)).unwrap();

        assert!(matches!(
            pipeline.set_low_cutoff(4000.0),
            Err(Error::Config(ConfigError::AboveNyquist { .. }))
        ));
        assert!(pipeline.set_block_length(0).is_err());
        assert!(pipeline.set_sample_rate(200).is_err());
        assert_eq!(pipeline.config(), &config);
        assert!(pipeline.spectrogram().row(0).unwrap().iter().any(|&db| db > 0.0));
    }

    #[test]
    fn high_cutoff_above_nyquist_disables_low_pass_only() {
        let mut pipeline = Pipeline::new(small_config(), MemoryStore::new()).unwrap();
        pipeline.set_high_cutoff(3000.0).unwrap();
        assert!(pipeline.filters.low_pass().is_some());
        pipeline.set_high_cutoff(6000.0).unwrap();
        assert!(pipeline.filters.low_pass().is_none());
        assert!(pipeline.filters.high_pass().is_some());
    }

    #[test]
    fn pcm_blocks_are_accepted() {
        let mut pipeline = Pipeline::new(small_config(), MemoryStore::new()).unwrap();
        let block: Vec<i16> = (0..256).map(|i| ((i % 16) as i16 - 8) * 100).collect();
        let analysis = pipeline.process_pcm(&block).unwrap();
        assert_eq!(analysis.spectrum.len(), 129);
    }
}
