//! Display utilities for the Study Timer CLI.
//!
//! This module provides formatted output for:
//! - Success messages
//! - Error messages
//! - Status display

use crate::types::{IpcResponse, ResponseData};

// ============================================================================
// Display
// ============================================================================

/// Display utilities for CLI output.
pub struct Display;

impl Display {
    /// Shows a success message for timer start.
    pub fn show_start_success(response: &IpcResponse) {
        println!("* タイマーを開始しました");
        Self::print_elapsed(response.data.as_ref());
    }

    /// Shows a success message for timer pause.
    pub fn show_pause_success(response: &IpcResponse) {
        println!("|| タイマーを一時停止しました");
        Self::print_elapsed(response.data.as_ref());
    }

    /// Shows a success message for timer resume.
    pub fn show_resume_success(response: &IpcResponse) {
        println!("> タイマーを再開しました");
        Self::print_elapsed(response.data.as_ref());
    }

    /// Shows a success message for timer stop.
    pub fn show_stop_success(response: &IpcResponse) {
        println!("[] タイマーを停止しました");
        if let Some(seconds) = response.data.as_ref().and_then(|d| d.elapsed_seconds) {
            println!("  学習時間: {}", Self::format_elapsed(seconds));
            println!("  実績: {:.2} 時間", seconds as f64 / 3600.0);
        }
    }

    /// Shows a success message for timer reset.
    pub fn show_reset_success(_response: &IpcResponse) {
        println!("0 タイマーをリセットしました");
    }

    /// Shows a success message for cycle start.
    pub fn show_cycle_start_success(response: &IpcResponse) {
        println!("* ポモドーロを開始しました");
        if let Some(data) = &response.data {
            if let Some(max) = data.max_seconds {
                println!("  集中時間: {}", Self::format_elapsed(max));
            }
        }
    }

    /// Shows a success message for cycle history reset.
    pub fn show_cycle_reset_success(_response: &IpcResponse) {
        println!("0 ポモドーロ履歴をリセットしました");
    }

    /// Shows a success message for a scheduled reminder.
    pub fn show_reminder_added(session_id: &str, lead_minutes: u32) {
        println!("! リマインダーを登録しました: {session_id}");
        println!("  開始{lead_minutes}分前に通知します");
    }

    /// Shows a success message for a cancelled reminder.
    pub fn show_reminder_cancelled(session_id: &str) {
        println!("x リマインダーを取り消しました: {session_id}");
    }

    /// Shows the current timer status.
    pub fn show_status(response: &IpcResponse) {
        for line in Self::status_lines(response) {
            println!("{}", line);
        }
    }

    /// Builds the status output.
    pub fn status_lines(response: &IpcResponse) -> Vec<String> {
        let mut lines = vec![
            "学習タイマー ステータス".to_string(),
            "─────────────────────────────".to_string(),
        ];

        let Some(data) = &response.data else {
            lines.push("タイマーは起動していません".to_string());
            return lines;
        };

        let state = data.state.as_deref().unwrap_or("unknown");
        lines.push(format!("状態: {}", Self::state_label(state)));

        if let Some(elapsed) = data.elapsed_seconds {
            lines.push(format!("経過時間: {}", Self::format_elapsed(elapsed)));
        }
        if let Some(max) = data.max_seconds {
            lines.push(format!("上限時間: {}", Self::format_elapsed(max)));
        }
        if data.capped {
            lines.push("上限時間に達しました。リセットすると再開できます".to_string());
        }
        if let Some(kind) = data.interval_kind.as_deref() {
            let label = match kind {
                "focus" => "集中",
                "break" => "休憩",
                other => other,
            };
            lines.push(format!("インターバル: {}", label));
        }
        if let Some(count) = data.completed_focus_count {
            lines.push(format!("完了ポモドーロ: {}", count));
        }

        lines
    }

    /// Shows an error message.
    pub fn show_error(message: &str) {
        eprintln!("エラー: {}", message);
    }

    /// Formats seconds as `h:mm:ss`.
    pub fn format_elapsed(total_seconds: u64) -> String {
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    }

    fn state_label(state: &str) -> &str {
        match state {
            "idle" => "待機中",
            "running" => "計測中",
            "paused" => "一時停止中",
            "stopped" => "停止中",
            other => other,
        }
    }

    fn print_elapsed(data: Option<&ResponseData>) {
        if let Some(seconds) = data.and_then(|d| d.elapsed_seconds) {
            println!("  経過時間: {}", Self::format_elapsed(seconds));
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
