//! Run timings, scorecards and leaderboard comparison.

use crate::error::DashboardError;
use crate::models::{ModelPerformance, parse_timestamp};

pub const DURATION_FALLBACK: &str = "N/A";

/// Minimum number of leaderboard entries a comparison needs.
pub const MIN_COMPARISON_ENTRIES: usize = 2;

/// Wall time between two RFC 3339 timestamps as `HHh MMm SSs`.
///
/// Hours are not wrapped at 24. Missing or unparsable timestamps, and an end
/// before the start, give [`DURATION_FALLBACK`].
pub fn format_run_duration(start: Option<&str>, end: Option<&str>) -> String {
    match seconds_between(start, end) {
        Some(total) => {
            let total = total as i64;
            format!(
                "{:02}h {:02}m {:02}s",
                total / 3600,
                (total % 3600) / 60,
                total % 60
            )
        }
        None => DURATION_FALLBACK.to_string(),
    }
}

/// Seconds between two RFC 3339 timestamps, if both parse and are ordered.
pub fn seconds_between(start: Option<&str>, end: Option<&str>) -> Option<f64> {
    let start = parse_timestamp(start?)?;
    let end = parse_timestamp(end?)?;
    let seconds = (end - start).as_seconds_f64();
    (seconds >= 0.0).then_some(seconds)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scorecard {
    pub expected: f64,
    pub detected: f64,
    pub absolute_error: f64,
    pub percent_error: f64,
    pub score: f64,
}

impl Scorecard {
    /// `None` when nothing was detected yet.
    pub fn evaluate(expected: f64, detected: Option<f64>) -> Option<Scorecard> {
        let detected = detected?;
        let absolute_error = (detected - expected).abs();
        let percent_error = if expected > 0.0 {
            absolute_error / expected * 100.0
        } else {
            0.0
        };
        let score = (100.0 - percent_error.min(100.0)).max(0.0);
        Some(Scorecard {
            expected,
            detected,
            absolute_error,
            percent_error,
            score,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelComparison {
    pub entry_id: u64,
    pub model_name: String,
    pub accuracy: f64,
    pub size_mb: Option<f64>,
    pub seconds_taken: Option<f64>,
}

impl ModelComparison {
    pub fn from_entry(entry: &ModelPerformance) -> Self {
        let step_run = &entry.workflow_step_run;
        ModelComparison {
            entry_id: entry.id,
            model_name: entry.model_name(),
            accuracy: entry.accuracy,
            size_mb: entry.model().and_then(|m| m.size_mb()).map(round_two),
            seconds_taken: seconds_between(
                step_run.start_time.as_deref(),
                step_run.end_time.as_deref(),
            ),
        }
    }

    pub fn size_label(&self) -> String {
        match self.size_mb {
            Some(mb) => format!("{:.2} MB", mb),
            None => DURATION_FALLBACK.to_string(),
        }
    }
}

/// Side-by-side rows for the selected leaderboard entries.
pub fn compare_models(selected: &[&ModelPerformance]) -> Result<Vec<ModelComparison>, DashboardError> {
    if selected.len() < MIN_COMPARISON_ENTRIES {
        return Err(DashboardError::Validation(format!(
            "Select at least {} models to compare",
            MIN_COMPARISON_ENTRIES
        )));
    }
    Ok(selected.iter().map(|entry| ModelComparison::from_entry(entry)).collect())
}

fn round_two(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
