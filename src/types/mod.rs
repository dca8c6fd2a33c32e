//! Core data types for the Study Timer.
//!
//! This module defines the data structures used for:
//! - Timer identity, phase and the persisted timer record
//! - Timer and interval-cycle configuration with validation
//! - IPC request/response serialization

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// TimerIdentity
// ============================================================================

/// Opaque identity scoping a timer to one study session.
///
/// Every persistence key and bus topic is namespaced by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimerIdentity(String);

impl TimerIdentity {
    /// Creates a new identity.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Store key of the timer record.
    pub fn record_key(&self) -> String {
        format!("timer:{}", self.0)
    }

    /// Store key of the interval cycle state.
    pub fn cycle_key(&self) -> String {
        format!("cycle:{}", self.0)
    }
}

impl fmt::Display for TimerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TimerIdentity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// TimerPhase
// ============================================================================

/// Represents the current phase of the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerPhase {
    /// Never started (or freshly reset)
    #[default]
    Idle,
    /// Accumulating time against an anchor
    Running,
    /// Suspended, elapsed time committed
    Paused,
    /// Finished; terminal until reset
    Stopped,
}

impl TimerPhase {
    /// Returns the string representation of the phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerPhase::Idle => "idle",
            TimerPhase::Running => "running",
            TimerPhase::Paused => "paused",
            TimerPhase::Stopped => "stopped",
        }
    }

    /// Returns true if the timer is accumulating time.
    pub fn is_running(&self) -> bool {
        matches!(self, TimerPhase::Running)
    }
}

impl fmt::Display for TimerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// PersistedTimerRecord
// ============================================================================

/// Durable snapshot of one timer's state.
///
/// While `phase` is `Running`, the live elapsed time is
/// `elapsed_millis + (now - anchor_millis)`; otherwise `elapsed_millis`
/// is authoritative on its own.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedTimerRecord {
    /// Current phase
    pub phase: TimerPhase,
    /// Accumulated time committed at the last transition or checkpoint
    pub elapsed_millis: u64,
    /// Wall-clock instant (epoch ms) the current running period started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_millis: Option<u64>,
    /// Wall-clock instant (epoch ms) of the write that produced this record
    #[serde(default)]
    pub written_at: u64,
    /// Instance id of the writer, used to break `written_at` ties
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writer: Option<String>,
}

impl PersistedTimerRecord {
    /// Creates the default IDLE/0 record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the anchor is present exactly when running.
    pub fn is_consistent(&self) -> bool {
        self.anchor_millis.is_some() == self.phase.is_running()
    }

    /// Committed elapsed time in whole seconds.
    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_millis / 1000
    }

    /// Elapsed time derived at `now_millis`, without any cap applied.
    ///
    /// A `now` earlier than the anchor contributes nothing rather than
    /// going negative.
    pub fn derived_elapsed_millis(&self, now_millis: u64) -> u64 {
        match (self.phase, self.anchor_millis) {
            (TimerPhase::Running, Some(anchor)) => self
                .elapsed_millis
                .saturating_add(now_millis.saturating_sub(anchor)),
            _ => self.elapsed_millis,
        }
    }

    /// Ordering key for last-writer-wins resolution.
    pub fn write_order(&self) -> (u64, &str) {
        (self.written_at, self.writer.as_deref().unwrap_or(""))
    }

    /// Returns true if this record wins over `other` under last-writer-wins.
    pub fn supersedes(&self, other: &PersistedTimerRecord) -> bool {
        self.write_order() > other.write_order()
    }
}

// ============================================================================
// TimerConfig
// ============================================================================

/// Default duration ceiling: 12 hours.
pub const DEFAULT_MAX_SECONDS: u64 = 12 * 60 * 60;

/// Default checkpoint interval while running.
pub const DEFAULT_CHECKPOINT_INTERVAL_MILLIS: u64 = 1000;

fn default_max_seconds() -> u64 {
    DEFAULT_MAX_SECONDS
}

fn default_checkpoint_interval_millis() -> u64 {
    DEFAULT_CHECKPOINT_INTERVAL_MILLIS
}

/// Configuration for one timer engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Hard duration ceiling in seconds
    #[serde(default = "default_max_seconds")]
    pub max_seconds: u64,
    /// Minimum spacing between checkpoints while running
    #[serde(default = "default_checkpoint_interval_millis")]
    pub checkpoint_interval_millis: u64,
    /// Estimated session length, used for the completion summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            max_seconds: DEFAULT_MAX_SECONDS,
            checkpoint_interval_millis: DEFAULT_CHECKPOINT_INTERVAL_MILLIS,
            estimated_hours: None,
        }
    }
}

impl TimerConfig {
    /// Sets the duration ceiling.
    pub fn with_max_seconds(mut self, seconds: u64) -> Self {
        self.max_seconds = seconds;
        self
    }

    /// Sets the checkpoint interval.
    pub fn with_checkpoint_interval_millis(mut self, millis: u64) -> Self {
        self.checkpoint_interval_millis = millis;
        self
    }

    /// Sets the estimated session length.
    pub fn with_estimated_hours(mut self, hours: f64) -> Self {
        self.estimated_hours = Some(hours);
        self
    }

    /// Duration ceiling in milliseconds.
    pub fn max_millis(&self) -> u64 {
        self.max_seconds.saturating_mul(1000)
    }

    /// Validates the configuration.
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_seconds == 0 {
            return Err("上限時間は1秒以上で指定してください".to_string());
        }
        if self.checkpoint_interval_millis == 0 {
            return Err("チェックポイント間隔は1ミリ秒以上で指定してください".to_string());
        }
        if let Some(hours) = self.estimated_hours {
            if !hours.is_finite() || hours < 0.0 {
                return Err("見積もり時間は0以上の数値で指定してください".to_string());
            }
        }
        Ok(())
    }
}

// ============================================================================
// Interval cycle
// ============================================================================

/// Kind of interval in the focus/break cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalKind {
    /// Focused study period
    #[default]
    Focus,
    /// Rest period between focus periods
    Break,
}

impl IntervalKind {
    /// Returns the string representation of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalKind::Focus => "focus",
            IntervalKind::Break => "break",
        }
    }
}

/// Configuration for the focus/break cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleConfig {
    /// Focus duration in minutes (1-120)
    pub focus_minutes: u32,
    /// Short break duration in minutes (1-60)
    pub short_break_minutes: u32,
    /// Long break duration in minutes (1-60)
    pub long_break_minutes: u32,
    /// Every n-th completed focus interval earns a long break
    pub long_break_every: u32,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            focus_minutes: 25,
            short_break_minutes: 5,
            long_break_minutes: 15,
            long_break_every: 4,
        }
    }
}

impl CycleConfig {
    /// Sets the focus duration.
    pub fn with_focus_minutes(mut self, minutes: u32) -> Self {
        self.focus_minutes = minutes;
        self
    }

    /// Sets the short break duration.
    pub fn with_short_break_minutes(mut self, minutes: u32) -> Self {
        self.short_break_minutes = minutes;
        self
    }

    /// Sets the long break duration.
    pub fn with_long_break_minutes(mut self, minutes: u32) -> Self {
        self.long_break_minutes = minutes;
        self
    }

    /// Sets how many focus intervals precede a long break.
    pub fn with_long_break_every(mut self, count: u32) -> Self {
        self.long_break_every = count;
        self
    }

    /// Focus duration in seconds.
    pub fn focus_seconds(&self) -> u64 {
        u64::from(self.focus_minutes) * 60
    }

    /// Break duration in seconds after the given number of completed focus intervals.
    pub fn break_seconds_after(&self, completed_focus_count: u32) -> u64 {
        if self.is_long_break(completed_focus_count) {
            u64::from(self.long_break_minutes) * 60
        } else {
            u64::from(self.short_break_minutes) * 60
        }
    }

    /// Returns true if the break after `completed_focus_count` completions is long.
    pub fn is_long_break(&self, completed_focus_count: u32) -> bool {
        self.long_break_every > 0
            && completed_focus_count > 0
            && completed_focus_count % self.long_break_every == 0
    }

    /// Validates the configuration.
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.focus_minutes < 1 || self.focus_minutes > 120 {
            return Err("集中時間は1-120分の範囲で指定してください".to_string());
        }
        if self.short_break_minutes < 1 || self.short_break_minutes > 60 {
            return Err("休憩時間は1-60分の範囲で指定してください".to_string());
        }
        if self.long_break_minutes < 1 || self.long_break_minutes > 60 {
            return Err("長い休憩時間は1-60分の範囲で指定してください".to_string());
        }
        if self.long_break_every < 1 {
            return Err("長い休憩の間隔は1以上で指定してください".to_string());
        }
        Ok(())
    }
}

/// Persisted state of the focus/break cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleState {
    /// Interval currently being timed
    pub kind: IntervalKind,
    /// Number of completed focus intervals since the last explicit reset
    pub completed_focus_count: u32,
    /// Whether the cycle drives the engine
    #[serde(default)]
    pub active: bool,
    /// Ceiling of the interval being timed, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_seconds: Option<u64>,
}

// ============================================================================
// TimerSnapshot
// ============================================================================

/// Point-in-time view of a timer, for display and status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    /// Timer identity
    pub identity: TimerIdentity,
    /// Current phase
    pub phase: TimerPhase,
    /// Derived elapsed seconds
    pub elapsed_seconds: u64,
    /// Duration ceiling in seconds
    pub max_seconds: u64,
    /// Whether the ceiling has been reached
    pub capped: bool,
    /// Whether a backwards clock jump is currently being masked
    pub clock_anomaly: bool,
}

// ============================================================================
// IPC Types
// ============================================================================

/// Parameters for the start command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartParams {
    /// Duration ceiling in seconds, applied when the timer is not running
    #[serde(rename = "maxSeconds", skip_serializing_if = "Option::is_none")]
    pub max_seconds: Option<u64>,
}

/// IPC request from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum IpcRequest {
    /// Start the timer
    Start {
        /// Start parameters
        #[serde(flatten)]
        params: StartParams,
    },
    /// Pause the running timer
    Pause,
    /// Resume the paused timer
    Resume,
    /// Stop the timer
    Stop,
    /// Reset the timer to IDLE/0
    Reset {
        /// Explicit confirmation of the destructive reset
        #[serde(default)]
        confirm: bool,
    },
    /// Query the current status
    Status,
    /// Begin a focus/break cycle
    CycleStart,
    /// Zero the completed focus count
    CycleReset {
        /// Explicit confirmation of the destructive reset
        #[serde(default)]
        confirm: bool,
    },
    /// Schedule a reminder ahead of a study session
    #[serde(rename_all = "camelCase")]
    Remind {
        /// Session the reminder belongs to
        session_id: String,
        /// Scheduled start of the session (epoch milliseconds)
        starts_at_millis: u64,
        /// Minutes between the reminder and the start
        lead_minutes: u32,
    },
    /// Cancel a scheduled reminder
    #[serde(rename_all = "camelCase")]
    CancelReminder {
        /// Session whose reminder is cancelled
        session_id: String,
    },
}

/// Response data for IPC responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseData {
    /// Current phase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Derived elapsed seconds
    #[serde(rename = "elapsedSeconds", skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<u64>,
    /// Duration ceiling in seconds
    #[serde(rename = "maxSeconds", skip_serializing_if = "Option::is_none")]
    pub max_seconds: Option<u64>,
    /// Whether the ceiling has been reached
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub capped: bool,
    /// Completed focus intervals
    #[serde(rename = "completedFocusCount", skip_serializing_if = "Option::is_none")]
    pub completed_focus_count: Option<u32>,
    /// Current interval kind
    #[serde(rename = "intervalKind", skip_serializing_if = "Option::is_none")]
    pub interval_kind: Option<String>,
}

impl ResponseData {
    /// Creates response data from a timer snapshot.
    pub fn from_snapshot(snapshot: &TimerSnapshot) -> Self {
        Self {
            state: Some(snapshot.phase.as_str().to_string()),
            elapsed_seconds: Some(snapshot.elapsed_seconds),
            max_seconds: Some(snapshot.max_seconds),
            capped: snapshot.capped,
            completed_focus_count: None,
            interval_kind: None,
        }
    }

    /// Adds interval cycle information.
    pub fn with_cycle(mut self, state: &CycleState) -> Self {
        self.completed_focus_count = Some(state.completed_focus_count);
        self.interval_kind = Some(state.kind.as_str().to_string());
        self
    }
}

/// IPC response from daemon to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcResponse {
    /// Response status ("success" or "error")
    pub status: String,
    /// Human-readable message
    pub message: String,
    /// Optional response data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
}

impl IpcResponse {
    /// Creates a success response.
    pub fn success(message: impl Into<String>, data: Option<ResponseData>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
            data,
        }
    }

    /// Creates an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            data: None,
        }
    }

    /// Returns true if this is a success response.
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // ------------------------------------------------------------------------
    // TimerIdentity Tests
    // ------------------------------------------------------------------------

    mod timer_identity_tests {
        use super::*;

        #[test]
        fn test_keys_are_namespaced() {
            let id = TimerIdentity::new("session-42");
            assert_eq!(id.record_key(), "timer:session-42");
            assert_eq!(id.cycle_key(), "cycle:session-42");
        }

        #[test]
        fn test_serializes_as_plain_string() {
            let id = TimerIdentity::from("abc");
            assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
            assert_eq!(id.to_string(), "abc");
        }
    }

    // ------------------------------------------------------------------------
    // TimerPhase Tests
    // ------------------------------------------------------------------------

    mod timer_phase_tests {
        use super::*;

        #[test]
        fn test_default_is_idle() {
            assert_eq!(TimerPhase::default(), TimerPhase::Idle);
        }

        #[test]
        fn test_as_str() {
            assert_eq!(TimerPhase::Idle.as_str(), "idle");
            assert_eq!(TimerPhase::Running.as_str(), "running");
            assert_eq!(TimerPhase::Paused.as_str(), "paused");
            assert_eq!(TimerPhase::Stopped.as_str(), "stopped");
        }

        #[test]
        fn test_serialize_deserialize() {
            let json = serde_json::to_string(&TimerPhase::Running).unwrap();
            assert_eq!(json, "\"running\"");

            let phase: TimerPhase = serde_json::from_str(&json).unwrap();
            assert_eq!(phase, TimerPhase::Running);
        }
    }

    // ------------------------------------------------------------------------
    // PersistedTimerRecord Tests
    // ------------------------------------------------------------------------

    mod record_tests {
        use super::*;

        fn running(elapsed: u64, anchor: u64) -> PersistedTimerRecord {
            PersistedTimerRecord {
                phase: TimerPhase::Running,
                elapsed_millis: elapsed,
                anchor_millis: Some(anchor),
                ..PersistedTimerRecord::default()
            }
        }

        #[test]
        fn test_default_is_idle_zero() {
            let record = PersistedTimerRecord::new();
            assert_eq!(record.phase, TimerPhase::Idle);
            assert_eq!(record.elapsed_millis, 0);
            assert!(record.anchor_millis.is_none());
            assert!(record.is_consistent());
        }

        #[test]
        fn test_consistency_requires_anchor_iff_running() {
            assert!(running(0, 10).is_consistent());

            let mut record = running(0, 10);
            record.anchor_millis = None;
            assert!(!record.is_consistent());

            let paused = PersistedTimerRecord {
                phase: TimerPhase::Paused,
                anchor_millis: Some(5),
                ..PersistedTimerRecord::default()
            };
            assert!(!paused.is_consistent());
        }

        #[test]
        fn test_derived_elapsed_while_running() {
            let record = running(2_000, 10_000);
            assert_eq!(record.derived_elapsed_millis(15_500), 7_500);
        }

        #[test]
        fn test_derived_elapsed_ignores_clock_before_anchor() {
            let record = running(2_000, 10_000);
            assert_eq!(record.derived_elapsed_millis(9_000), 2_000);
        }

        #[test]
        fn test_derived_elapsed_when_paused_is_committed_value() {
            let record = PersistedTimerRecord {
                phase: TimerPhase::Paused,
                elapsed_millis: 4_200,
                ..PersistedTimerRecord::default()
            };
            assert_eq!(record.derived_elapsed_millis(999_999), 4_200);
            assert_eq!(record.elapsed_seconds(), 4);
        }

        #[test]
        fn test_supersedes_by_written_at_then_writer() {
            let older = PersistedTimerRecord {
                written_at: 10,
                writer: Some("b".to_string()),
                ..PersistedTimerRecord::default()
            };
            let newer = PersistedTimerRecord {
                written_at: 11,
                writer: Some("a".to_string()),
                ..PersistedTimerRecord::default()
            };
            assert!(newer.supersedes(&older));
            assert!(!older.supersedes(&newer));

            let tie = PersistedTimerRecord {
                written_at: 10,
                writer: Some("c".to_string()),
                ..PersistedTimerRecord::default()
            };
            assert!(tie.supersedes(&older));
            assert!(!older.supersedes(&tie));
            assert!(!older.supersedes(&older.clone()));
        }

        #[test]
        fn test_camel_case_layout() {
            let record = running(1_000, 2_000);
            let json = serde_json::to_value(&record).unwrap();
            assert_eq!(json["phase"], "running");
            assert_eq!(json["elapsedMillis"], 1_000);
            assert_eq!(json["anchorMillis"], 2_000);
            assert!(json.get("writer").is_none());
        }
    }

    // ------------------------------------------------------------------------
    // TimerConfig Tests
    // ------------------------------------------------------------------------

    mod timer_config_tests {
        use super::*;

        #[test]
        fn test_default_values() {
            let config = TimerConfig::default();
            assert_eq!(config.max_seconds, 43_200);
            assert_eq!(config.checkpoint_interval_millis, 1_000);
            assert!(config.estimated_hours.is_none());
            assert_eq!(config.max_millis(), 43_200_000);
        }

        #[test]
        fn test_missing_fields_use_defaults() {
            let config: TimerConfig = serde_json::from_str("{}").unwrap();
            assert_eq!(config, TimerConfig::default());
        }

        #[test]
        fn test_validate() {
            assert!(TimerConfig::default().validate().is_ok());
            assert!(TimerConfig::default().with_max_seconds(0).validate().is_err());
            assert!(TimerConfig::default()
                .with_checkpoint_interval_millis(0)
                .validate()
                .is_err());
            assert!(TimerConfig::default()
                .with_estimated_hours(-1.0)
                .validate()
                .is_err());
            assert!(TimerConfig::default()
                .with_estimated_hours(1.5)
                .validate()
                .is_ok());
        }
    }

    // ------------------------------------------------------------------------
    // CycleConfig Tests
    // ------------------------------------------------------------------------

    mod cycle_config_tests {
        use super::*;

        #[test]
        fn test_default_values() {
            let config = CycleConfig::default();
            assert_eq!(config.focus_minutes, 25);
            assert_eq!(config.short_break_minutes, 5);
            assert_eq!(config.long_break_minutes, 15);
            assert_eq!(config.long_break_every, 4);
        }

        #[test]
        fn test_every_fourth_break_is_long() {
            let config = CycleConfig::default();
            assert!(!config.is_long_break(0));
            assert!(!config.is_long_break(1));
            assert!(!config.is_long_break(3));
            assert!(config.is_long_break(4));
            assert!(!config.is_long_break(5));
            assert!(config.is_long_break(8));

            assert_eq!(config.break_seconds_after(3), 5 * 60);
            assert_eq!(config.break_seconds_after(4), 15 * 60);
        }

        #[test]
        fn test_validate_boundaries() {
            assert!(CycleConfig::default().validate().is_ok());
            assert!(CycleConfig::default().with_focus_minutes(0).validate().is_err());
            assert!(CycleConfig::default().with_focus_minutes(121).validate().is_err());
            assert!(CycleConfig::default()
                .with_short_break_minutes(61)
                .validate()
                .is_err());
            assert!(CycleConfig::default()
                .with_long_break_minutes(0)
                .validate()
                .is_err());

            let config = CycleConfig {
                long_break_every: 0,
                ..CycleConfig::default()
            };
            assert!(config.validate().is_err());
        }

        #[test]
        fn test_cycle_state_without_activity_fields_loads_inactive() {
            let state: CycleState =
                serde_json::from_str(r#"{"kind":"break","completedFocusCount":2}"#).unwrap();
            assert_eq!(state.kind, IntervalKind::Break);
            assert_eq!(state.completed_focus_count, 2);
            assert!(!state.active);
            assert_eq!(state.target_seconds, None);
        }
    }

    // ------------------------------------------------------------------------
    // IPC Type Tests
    // ------------------------------------------------------------------------

    mod ipc_tests {
        use super::*;

        #[test]
        fn test_request_tags() {
            let json = serde_json::to_string(&IpcRequest::Pause).unwrap();
            assert_eq!(json, r#"{"command":"pause"}"#);

            let json = serde_json::to_string(&IpcRequest::CycleStart).unwrap();
            assert_eq!(json, r#"{"command":"cycle_start"}"#);
        }

        #[test]
        fn test_reminder_request_layout() {
            let request = IpcRequest::Remind {
                session_id: "exam".to_string(),
                starts_at_millis: 1_700_000_600_000,
                lead_minutes: 10,
            };
            let json = serde_json::to_string(&request).unwrap();
            assert_eq!(
                json,
                r#"{"command":"remind","sessionId":"exam","startsAtMillis":1700000600000,"leadMinutes":10}"#
            );

            let request: IpcRequest =
                serde_json::from_str(r#"{"command":"cancel_reminder","sessionId":"exam"}"#)
                    .unwrap();
            assert!(
                matches!(request, IpcRequest::CancelReminder { session_id } if session_id == "exam")
            );
        }

        #[test]
        fn test_reset_without_confirm_defaults_false() {
            let request: IpcRequest = serde_json::from_str(r#"{"command":"reset"}"#).unwrap();
            assert!(matches!(request, IpcRequest::Reset { confirm: false }));
        }

        #[test]
        fn test_start_params_flattened() {
            let request = IpcRequest::Start {
                params: StartParams {
                    max_seconds: Some(60),
                },
            };
            let json = serde_json::to_string(&request).unwrap();
            assert_eq!(json, r#"{"command":"start","maxSeconds":60}"#);
        }

        #[test]
        fn test_response_from_snapshot() {
            let snapshot = TimerSnapshot {
                identity: TimerIdentity::new("s"),
                phase: TimerPhase::Paused,
                elapsed_seconds: 90,
                max_seconds: 600,
                capped: false,
                clock_anomaly: false,
            };
            let data = ResponseData::from_snapshot(&snapshot).with_cycle(&CycleState {
                kind: IntervalKind::Break,
                completed_focus_count: 2,
                ..CycleState::default()
            });

            assert_eq!(data.state.as_deref(), Some("paused"));
            assert_eq!(data.elapsed_seconds, Some(90));
            assert_eq!(data.completed_focus_count, Some(2));
            assert_eq!(data.interval_kind.as_deref(), Some("break"));

            let json = serde_json::to_value(&data).unwrap();
            assert!(json.get("capped").is_none());
        }

        #[test]
        fn test_response_constructors() {
            assert!(IpcResponse::success("ok", None).is_success());
            let err = IpcResponse::error("bad");
            assert!(!err.is_success());
            assert_eq!(err.message, "bad");
        }
    }
}
