//! Command definitions for the Study Timer CLI.
//!
//! Uses clap derive macro for argument parsing.

use clap::{Args, Parser, Subcommand};

use crate::types::{CycleConfig, TimerConfig, DEFAULT_MAX_SECONDS};

// ============================================================================
// CLI Structure
// ============================================================================

/// Study Timer CLI - a crash-safe study session stopwatch
#[derive(Parser, Debug)]
#[command(
    name = "study-timer",
    version,
    about = "学習セッション用タイマーCLI",
    long_about = "再起動やスリープをまたいでも経過時間を正確に保つ学習用ストップウォッチ。\n\
                  集中と休憩を交互に繰り返すポモドーロモードにも対応しています。",
    propagate_version = true
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

// ============================================================================
// Subcommands
// ============================================================================

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the timer
    Start(StartArgs),

    /// Pause the running timer
    Pause,

    /// Resume a paused timer
    Resume,

    /// Stop the timer and show the session summary
    Stop,

    /// Discard the current run and return to idle
    Reset(ConfirmArgs),

    /// Show current timer status
    Status,

    /// Focus/break interval cycle
    Cycle {
        /// Cycle action
        #[command(subcommand)]
        action: CycleCommand,
    },

    /// Reminders ahead of scheduled study sessions
    Reminder {
        /// Reminder action
        #[command(subcommand)]
        action: ReminderCommand,
    },

    /// Run as daemon (background service)
    Daemon(DaemonArgs),

    /// Generate shell completion scripts
    Completions {
        /// Shell type for completion script
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Interval cycle actions
#[derive(Subcommand, Debug, Clone)]
pub enum CycleCommand {
    /// Start a focus interval
    Start,

    /// Clear the completed focus count
    Reset(ConfirmArgs),
}

/// Reminder actions
#[derive(Subcommand, Debug, Clone)]
pub enum ReminderCommand {
    /// Schedule a reminder before a session starts
    Add(ReminderArgs),

    /// Cancel a scheduled reminder
    Cancel {
        /// Session identifier
        #[arg(value_parser = validate_identity)]
        session_id: String,
    },
}

// ============================================================================
// Arguments
// ============================================================================

/// Arguments for the start command
#[derive(Args, Debug, Clone, Default)]
pub struct StartArgs {
    /// Duration ceiling in seconds
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    pub max_seconds: Option<u64>,
}

/// Confirmation flag for destructive commands
#[derive(Args, Debug, Clone, Default)]
pub struct ConfirmArgs {
    /// Confirm the reset
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the reminder add command
#[derive(Args, Debug, Clone)]
pub struct ReminderArgs {
    /// Session identifier
    #[arg(value_parser = validate_identity)]
    pub session_id: String,

    /// Minutes until the session starts
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    pub starts_in: u64,

    /// Minutes before the start to remind (0-1440)
    #[arg(
        short,
        long,
        default_value = "10",
        value_parser = clap::value_parser!(u32).range(0..=1440)
    )]
    pub lead: u32,
}

impl ReminderArgs {
    /// Session start as epoch milliseconds, counted from `now_millis`.
    pub fn starts_at_millis(&self, now_millis: u64) -> u64 {
        now_millis.saturating_add(self.starts_in.saturating_mul(60_000))
    }
}

/// Arguments for the daemon command
#[derive(Args, Debug, Clone)]
pub struct DaemonArgs {
    /// Timer identity to serve
    #[arg(short, long, default_value = "default", value_parser = validate_identity)]
    pub identity: String,

    /// Duration ceiling in seconds
    #[arg(
        short,
        long,
        default_value_t = DEFAULT_MAX_SECONDS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub max_seconds: u64,

    /// Estimated session length in hours, used for the completion summary
    #[arg(short, long, value_parser = validate_estimated_hours)]
    pub estimated_hours: Option<f64>,

    /// Focus duration in minutes (1-120)
    #[arg(
        long,
        default_value = "25",
        value_parser = clap::value_parser!(u32).range(1..=120)
    )]
    pub focus: u32,

    /// Short break duration in minutes (1-60)
    #[arg(
        long,
        default_value = "5",
        value_parser = clap::value_parser!(u32).range(1..=60)
    )]
    pub short_break: u32,

    /// Long break duration in minutes (1-60)
    #[arg(
        long,
        default_value = "15",
        value_parser = clap::value_parser!(u32).range(1..=60)
    )]
    pub long_break: u32,

    /// Focus intervals before each long break
    #[arg(
        long,
        default_value = "4",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub long_break_every: u32,
}

impl DaemonArgs {
    /// Engine configuration from the flags.
    pub fn timer_config(&self) -> TimerConfig {
        let config = TimerConfig::default().with_max_seconds(self.max_seconds);
        match self.estimated_hours {
            Some(hours) => config.with_estimated_hours(hours),
            None => config,
        }
    }

    /// Cycle configuration from the flags.
    pub fn cycle_config(&self) -> CycleConfig {
        CycleConfig::default()
            .with_focus_minutes(self.focus)
            .with_short_break_minutes(self.short_break)
            .with_long_break_minutes(self.long_break)
            .with_long_break_every(self.long_break_every)
    }
}

// ============================================================================
// Validation Functions
// ============================================================================

/// Validates the timer identity.
///
/// - Must not be empty
/// - Must not exceed 100 characters
fn validate_identity(s: &str) -> Result<String, String> {
    if s.trim().is_empty() {
        return Err("識別子は空にできません".to_string());
    }
    if s.chars().count() > 100 {
        return Err("識別子は100文字以内にしてください".to_string());
    }
    Ok(s.to_string())
}

fn validate_estimated_hours(s: &str) -> Result<f64, String> {
    let hours: f64 = s
        .parse()
        .map_err(|_| format!("数値を指定してください: {s}"))?;
    if !hours.is_finite() || hours < 0.0 {
        return Err("見積もり時間は0以上の数値で指定してください".to_string());
    }
    Ok(hours)
}

// ============================================================================
// Tests
// ============================================================================
