//! Console rendering of tune readings and workflow results.

use spectrum_core::tuning::{BAND_COUNT, CENTER_BAND};
use spectrum_core::{CompareOutcome, ModeEvent, TuneReading, WorkflowStatus};

const BAND_MARKS: [&str; BAND_COUNT] = ["<<", "<", "=", ">", ">>"];

/// Five-position indicator with the active band lit, e.g. `[ . < . . . ]`.
pub fn meter(band_index: usize) -> String {
    let cells: Vec<&str> = BAND_MARKS
        .iter()
        .enumerate()
        .map(|(i, mark)| if i == band_index { *mark } else { "." })
        .collect();
    format!("[ {} ]", cells.join(" "))
}

pub fn tune_line(reading: &TuneReading) -> String {
    let verdict = match reading.band_index {
        i if i < CENTER_BAND => "flat",
        i if i > CENTER_BAND => "sharp",
        _ => "in tune",
    };
    format!(
        "{:<4} {:>8.1} Hz {:>+7.1} cents {} {}",
        reading.note.name,
        reading.peak_frequency,
        reading.cents,
        meter(reading.band_index),
        verdict
    )
}

/// Line to print for a block's event, if it is worth printing.
pub fn event_line(event: &ModeEvent) -> Option<String> {
    match event {
        ModeEvent::Tuned(reading) => reading.as_ref().map(tune_line),
        ModeEvent::Recording(WorkflowStatus::Pending) | ModeEvent::Comparing(WorkflowStatus::Pending) => None,
        ModeEvent::Recording(WorkflowStatus::Complete(key)) => Some(format!("Record saved as {key}")),
        ModeEvent::Comparing(WorkflowStatus::Complete(outcome)) => Some(outcome_line(outcome)),
        ModeEvent::WorkflowFailed(e) => Some(format!("Workflow failed: {e}")),
    }
}

fn outcome_line(outcome: &CompareOutcome) -> String {
    match outcome {
        CompareOutcome::BestMatch {
            matched,
            score,
            scores,
            saved_as,
        } => {
            let mut lines: Vec<String> = scores
                .iter()
                .map(|(key, score)| format!("  {:<32} {:.4}", key.label, score))
                .collect();
            lines.push(format!("Best estimate: {} ({:.4})", matched.label, score));
            lines.push(format!("Record saved as {saved_as}"));
            lines.join("\n")
        }
        CompareOutcome::NoCandidates { saved_as } => {
            format!("Nothing to compare against. Record saved as {saved_as}")
        }
        CompareOutcome::Scored { key, score, saved_as } => {
            let mut line = format!("Similarity to {}: {:.4}", key.label, score);
            if let Some(saved) = saved_as {
                line.push_str(&format!("\nComparison saved as {saved}"));
            }
            line
        }
        CompareOutcome::NotFound { key } => format!("No fingerprint named {} for this geometry", key.label),
    }
}
