//! Timer error types.
//!
//! Every error is returned synchronously from the operation that caused it.
//! Conditions the engine recovers from by itself (a corrupt record, the
//! duration cap, a backwards clock) are reported as events instead.

use thiserror::Error;

use crate::types::TimerPhase;

/// Errors raised by the key/value store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("ストレージの入出力に失敗しました: {0}")]
    Io(#[from] std::io::Error),

    /// Value could not be encoded.
    #[error("シリアライズに失敗しました: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors returned by timer operations.
#[derive(Debug, Error)]
pub enum TimerError {
    /// Operation attempted from an incompatible phase.
    #[error("'{operation}' は現在の状態 ({phase}) では実行できません")]
    InvalidTransition {
        /// Name of the rejected operation
        operation: &'static str,
        /// Phase the timer was in
        phase: TimerPhase,
    },

    /// Reset was requested without confirmation.
    #[error("リセットには明示的な確認が必要です")]
    ResetNotConfirmed,

    /// Configuration failed validation.
    #[error("設定が不正です: {0}")]
    InvalidConfig(String),

    /// The state could not be persisted.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl TimerError {
    /// Returns true if the operation was rejected because of the current phase.
    #[must_use]
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_display() {
        let err = TimerError::InvalidTransition {
            operation: "pause",
            phase: TimerPhase::Idle,
        };
        assert!(err.to_string().contains("pause"));
        assert!(err.to_string().contains("idle"));
        assert!(err.is_invalid_transition());
    }

    #[test]
    fn test_storage_error_is_transparent() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = TimerError::from(StoreError::from(io));
        assert!(err.to_string().contains("denied"));
        assert!(!err.is_invalid_transition());
    }

    #[test]
    fn test_reset_not_confirmed_display() {
        assert!(TimerError::ResetNotConfirmed.to_string().contains("確認"));
    }
}
