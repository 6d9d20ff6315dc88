//! # Record / Compare Workflows
//!
//! Both workflows count blocks and only act once more than `depth` blocks
//! have been pushed since they started, so the snapshot they store or score
//! is a full window of live audio rather than a partly zeroed history.
//!
//! ## Strategies
//! - **Record**: store the live snapshot under a label
//! - **Compare against a label**: score the live snapshot against one stored fingerprint
//! - **Auto-match**: score against every compatible fingerprint, pick the best,
//!   and file the live snapshot as the next numbered take of the winner

use crate::error::{Error, Result, StoreError};
use crate::fingerprint::{split_counter, FingerprintKey, FingerprintStore, Geometry};
use crate::similarity::{structural_similarity, SsimParams};
use crate::spectrogram::{Spectrogram, SpectrogramBuffer};

/// Base label used when auto-match has nothing to compare against.
pub const DEFAULT_LABEL: &str = "unlabelled";

/// Progress of a counting workflow.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowStatus<T> {
    /// Still filling the history.
    Pending,
    Complete(T),
}

impl<T> WorkflowStatus<T> {
    pub fn is_complete(&self) -> bool {
        matches!(self, WorkflowStatus::Complete(_))
    }
}

/// What a finished comparison found.
#[derive(Debug, Clone, PartialEq)]
pub enum CompareOutcome {
    /// Auto-match picked `matched` out of `scores` and saved the live snapshot.
    BestMatch {
        matched: FingerprintKey,
        score: f64,
        scores: Vec<(FingerprintKey, f64)>,
        saved_as: FingerprintKey,
    },
    /// Auto-match had no compatible fingerprints; the live snapshot became the first.
    NoCandidates { saved_as: FingerprintKey },
    /// A named fingerprint was scored.
    Scored {
        key: FingerprintKey,
        score: f64,
        saved_as: Option<FingerprintKey>,
    },
    /// The named fingerprint does not exist.
    NotFound { key: FingerprintKey },
}

/// Block counter shared by the record and compare workflows.
#[derive(Debug, Clone, Default)]
pub struct FingerprintWorkflow {
    counter: usize,
}

impl FingerprintWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self) -> usize {
        self.counter
    }

    /// Restarts the count, e.g. after the history was cleared.
    pub fn reset(&mut self) {
        self.counter = 0;
    }

    /// Counts one block; true (and reset) once the count exceeds `depth`.
    fn advance(&mut self, depth: usize) -> bool {
        self.counter += 1;
        if self.counter > depth {
            self.counter = 0;
            true
        } else {
            false
        }
    }

    /// Counts a block and, once the history is full, stores it under `label`.
    pub fn record<S: FingerprintStore + ?Sized>(
        &mut self,
        store: &mut S,
        label: &str,
        geometry: Geometry,
        live: &SpectrogramBuffer,
    ) -> Result<WorkflowStatus<FingerprintKey>> {
        if !self.advance(geometry.depth) {
            return Ok(WorkflowStatus::Pending);
        }
        let key = FingerprintKey::new(label, geometry)?;
        store.put(&key, &live.snapshot())?;
        log::info!("[RECORD] Record saved as {}", key);
        Ok(WorkflowStatus::Complete(key))
    }

    /// Counts a block and, once the history is full, compares it.
    ///
    /// With a `target` label the live snapshot is scored against that one
    /// fingerprint and optionally saved as `save_as`. Without one, every
    /// compatible fingerprint is scored and the snapshot is saved as the next
    /// numbered take of the best match.
    pub fn compare<S: FingerprintStore + ?Sized>(
        &mut self,
        store: &mut S,
        target: Option<&str>,
        save_as: Option<&str>,
        geometry: Geometry,
        live: &SpectrogramBuffer,
        params: &SsimParams,
    ) -> Result<WorkflowStatus<CompareOutcome>> {
        if !self.advance(geometry.depth) {
            return Ok(WorkflowStatus::Pending);
        }
        let snapshot = live.snapshot();
        let outcome = match target {
            Some(label) => compare_named(store, label, save_as, geometry, &snapshot, params)?,
            None => auto_match(store, geometry, &snapshot, params)?,
        };
        Ok(WorkflowStatus::Complete(outcome))
    }
}

fn compare_named<S: FingerprintStore + ?Sized>(
    store: &mut S,
    label: &str,
    save_as: Option<&str>,
    geometry: Geometry,
    snapshot: &Spectrogram,
    params: &SsimParams,
) -> Result<CompareOutcome> {
    let key = FingerprintKey::new(label, geometry)?;
    let stored = match store.get(&key) {
        Ok(stored) => stored,
        Err(StoreError::NotFound(_)) => {
            log::warn!("[COMPARE] No fingerprint stored as {}", key);
            return Ok(CompareOutcome::NotFound { key });
        }
        Err(e) => return Err(e.into()),
    };

    let score = structural_similarity(&stored, snapshot, params)?;
    log::info!("[COMPARE] Similarity of new recording to {}: {:.4}", key, score);

    let saved_as = match save_as {
        Some(new_label) => {
            let new_key = FingerprintKey::new(new_label, geometry)?;
            store.put(&new_key, snapshot)?;
            log::info!("[COMPARE] Comparison saved as {}", new_key);
            Some(new_key)
        }
        None => None,
    };
    Ok(CompareOutcome::Scored { key, score, saved_as })
}

fn auto_match<S: FingerprintStore + ?Sized>(
    store: &mut S,
    geometry: Geometry,
    snapshot: &Spectrogram,
    params: &SsimParams,
) -> Result<CompareOutcome> {
    let mut scores = Vec::new();
    for key in store.list_compatible(&geometry)? {
        let scored = store
            .get(&key)
            .map_err(Error::from)
            .and_then(|stored| Ok(structural_similarity(&stored, snapshot, params)?));
        match scored {
            Ok(score) => {
                log::info!("[COMPARE] Similarity to {}: {:.4}", key, score);
                scores.push((key, score));
            }
            Err(e) => log::warn!("[COMPARE] Skipping {}: {}", key, e),
        }
    }

    let best = scores
        .iter()
        .fold(None::<&(FingerprintKey, f64)>, |best, candidate| match best {
            Some(b) if b.1 >= candidate.1 => Some(b),
            _ => Some(candidate),
        })
        .cloned();

    match best {
        Some((matched, score)) => {
            log::info!("[COMPARE] Best estimate: {} ({:.4})", matched.label, score);
            let saved_as = next_take(store, matched.base_label(), geometry)?;
            store.put(&saved_as, snapshot)?;
            log::info!("[COMPARE] Record saved as {}", saved_as);
            Ok(CompareOutcome::BestMatch {
                matched,
                score,
                scores,
                saved_as,
            })
        }
        None => {
            log::warn!("[COMPARE] No compatible fingerprints to compare against");
            let saved_as = next_take(store, DEFAULT_LABEL, geometry)?;
            store.put(&saved_as, snapshot)?;
            log::info!("[COMPARE] Record saved as {}", saved_as);
            Ok(CompareOutcome::NoCandidates { saved_as })
        }
    }
}

/// `{base}_{n}` with `n` one past the highest take already filed for `base`.
fn next_take<S: FingerprintStore + ?Sized>(
    store: &S,
    base: &str,
    geometry: Geometry,
) -> Result<FingerprintKey> {
    let highest = store
        .list_compatible(&geometry)?
        .iter()
        .filter_map(|key| match split_counter(&key.label) {
            (b, Some(n)) if b == base => Some(n),
            _ if key.label == base => Some(0),
            _ => None,
        })
        .max()
        .unwrap_or(0);
    Ok(FingerprintKey::new(&format!("{}_{}", base, highest + 1), geometry)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::MemoryStore;

    const GEOMETRY: Geometry = Geometry {
        sample_rate: 8000,
        block_length: 16,
        depth: 3,
    };

    fn live_with(rows: &[[f64; 9]]) -> SpectrogramBuffer {
        let mut buffer = SpectrogramBuffer::new(GEOMETRY.depth, 9);
        for row in rows.iter().rev() {
            buffer.push(row).unwrap();
        }
        buffer
    }

    fn textured(offset: f64) -> SpectrogramBuffer {
        live_with(&[
            [1.0, 9.0, 3.0, 7.0, 2.0, 8.0, 4.0, 6.0, 5.0].map(|v| v * 10.0 + offset),
            [9.0, 1.0, 8.0, 2.0, 7.0, 3.0, 6.0, 4.0, 5.0].map(|v| v * 10.0 + offset),
            [5.0, 5.0, 1.0, 9.0, 1.0, 9.0, 2.0, 8.0, 3.0].map(|v| v * 10.0 + offset),
        ])
    }

    fn params() -> SsimParams {
        SsimParams { window: 3, data_range: 2.0 }
    }

    #[test]
    fn record_completes_after_depth_plus_one_blocks() {
        let mut store = MemoryStore::new();
        let mut workflow = FingerprintWorkflow::new();
        let live = textured(0.0);
        for _ in 0..GEOMETRY.depth {
            let status = workflow.record(&mut store, "A4test", GEOMETRY, &live).unwrap();
            assert_eq!(status, WorkflowStatus::Pending);
        }
        let status = workflow.record(&mut store, "A4test", GEOMETRY, &live).unwrap();
        let key = FingerprintKey::new("A4test", GEOMETRY).unwrap();
        assert_eq!(status, WorkflowStatus::Complete(key.clone()));
        assert_eq!(workflow.counter(), 0);
        assert_eq!(store.get(&key).unwrap(), live.snapshot());
    }

    fn run_compare(
        workflow: &mut FingerprintWorkflow,
        store: &mut MemoryStore,
        target: Option<&str>,
        save_as: Option<&str>,
        live: &SpectrogramBuffer,
    ) -> CompareOutcome {
        for _ in 0..GEOMETRY.depth {
            let status = workflow
                .compare(store, target, save_as, GEOMETRY, live, &params())
                .unwrap();
            assert!(!status.is_complete());
        }
        match workflow.compare(store, target, save_as, GEOMETRY, live, &params()).unwrap() {
            WorkflowStatus::Complete(outcome) => outcome,
            WorkflowStatus::Pending => panic!("comparison did not complete"),
        }
    }

    #[test]
    fn self_comparison_scores_one() {
        let mut store = MemoryStore::new();
        let live = textured(0.0);
        let key = FingerprintKey::new("A4test", GEOMETRY).unwrap();
        store.put(&key, &live.snapshot()).unwrap();

        let mut workflow = FingerprintWorkflow::new();
        let outcome = run_compare(&mut workflow, &mut store, Some("A4test"), Some("again"), &live);
        match outcome {
            CompareOutcome::Scored { key: scored, score, saved_as } => {
                assert_eq!(scored, key);
                assert!((score - 1.0).abs() < 1e-9);
                assert_eq!(saved_as.map(|k| k.label), Some("again".to_string()));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn missing_named_fingerprint_is_a_miss() {
        let mut store = MemoryStore::new();
        let mut workflow = FingerprintWorkflow::new();
        let outcome = run_compare(&mut workflow, &mut store, Some("ghost"), Some("kept"), &textured(0.0));
        assert!(matches!(outcome, CompareOutcome::NotFound { ref key } if key.label == "ghost"));
        assert!(store.is_empty());
    }

    #[test]
    fn auto_match_picks_best_and_numbers_the_take() {
        let mut store = MemoryStore::new();
        let piano = textured(0.0);
        let other = live_with(&[[3.0; 9], [50.0; 9], [3.0; 9]]);
        store.put(&FingerprintKey::new("piano", GEOMETRY).unwrap(), &piano.snapshot()).unwrap();
        store.put(&FingerprintKey::new("piano_1", GEOMETRY).unwrap(), &other.snapshot()).unwrap();
        store.put(&FingerprintKey::new("whistle", GEOMETRY).unwrap(), &other.snapshot()).unwrap();

        let mut workflow = FingerprintWorkflow::new();
        let outcome = run_compare(&mut workflow, &mut store, None, None, &piano);
        match outcome {
            CompareOutcome::BestMatch { matched, score, scores, saved_as } => {
                assert_eq!(matched.label, "piano");
                assert!((score - 1.0).abs() < 1e-9);
                assert_eq!(scores.len(), 3);
                assert_eq!(saved_as.label, "piano_2");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn auto_match_with_empty_store_files_a_default_take() {
        let mut store = MemoryStore::new();
        let mut workflow = FingerprintWorkflow::new();
        let outcome = run_compare(&mut workflow, &mut store, None, None, &textured(0.0));
        let expected = FingerprintKey::new("unlabelled_1", GEOMETRY).unwrap();
        assert_eq!(outcome, CompareOutcome::NoCandidates { saved_as: expected.clone() });
        assert!(store.get(&expected).is_ok());
    }

    #[test]
    fn auto_match_ignores_other_geometries() {
        let mut store = MemoryStore::new();
        let elsewhere = Geometry { block_length: 32, ..GEOMETRY };
        store
            .put(&FingerprintKey::new("piano", elsewhere).unwrap(), &Spectrogram::filled(3, 17, 1.0))
            .unwrap();
        let mut workflow = FingerprintWorkflow::new();
        let outcome = run_compare(&mut workflow, &mut store, None, None, &textured(0.0));
        assert!(matches!(outcome, CompareOutcome::NoCandidates { .. }));
    }
}
