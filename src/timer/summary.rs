//! Completion summary handed to the reflection flow when a run stops.

use serde::{Deserialize, Serialize};

/// Actual-vs-estimated outcome of one stopped run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Final elapsed seconds
    pub elapsed_seconds: u64,
    /// Final elapsed time in hours
    pub actual_hours: f64,
    /// Estimated hours, if the session had an estimate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
    /// `1 - |estimated - actual| / estimated`, floored at 0; 1.0 without an estimate
    pub estimation_accuracy: f64,
}

impl SessionSummary {
    /// Builds the summary for a run that ended at `elapsed_seconds`.
    pub fn new(elapsed_seconds: u64, estimated_hours: Option<f64>) -> Self {
        let actual_hours = elapsed_seconds as f64 / 3600.0;
        let estimation_accuracy = match estimated_hours {
            Some(estimated) if estimated > 0.0 => {
                (1.0 - (estimated - actual_hours).abs() / estimated).max(0.0)
            }
            _ => 1.0,
        };
        Self {
            elapsed_seconds,
            actual_hours,
            estimated_hours,
            estimation_accuracy,
        }
    }
}
