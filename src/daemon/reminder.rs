//! One-shot reminders ahead of a scheduled study session.
//!
//! Each reminder is a spawned task sleeping until `lead_minutes` before the
//! session's start. Scheduling the same session again aborts the earlier
//! task, so a rescheduled session never fires twice.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::timer::TimeSource;

/// Reminder delivered when its lead instant arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    /// Session the reminder belongs to
    pub session_id: String,
    /// Scheduled start of the session (epoch milliseconds)
    pub starts_at_millis: u64,
    /// Minutes between the reminder and the start
    pub lead_minutes: u32,
}

impl Reminder {
    /// Instant at which the reminder fires.
    pub fn fire_at_millis(&self) -> u64 {
        self.starts_at_millis
            .saturating_sub(u64::from(self.lead_minutes) * 60_000)
    }
}

/// Errors returned when scheduling a reminder.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReminderError {
    /// The lead instant is not in the future.
    #[error("リマインダーの時刻は既に過ぎています (セッション: {session_id})")]
    AlreadyPast {
        /// Rejected session
        session_id: String,
    },
}

/// Schedules and cancels per-session reminders.
pub struct ReminderScheduler {
    clock: Arc<dyn TimeSource>,
    tx: mpsc::UnboundedSender<Reminder>,
    pending: HashMap<String, JoinHandle<()>>,
}

impl ReminderScheduler {
    /// Creates a scheduler delivering reminders on `tx`.
    pub fn new(clock: Arc<dyn TimeSource>, tx: mpsc::UnboundedSender<Reminder>) -> Self {
        Self {
            clock,
            tx,
            pending: HashMap::new(),
        }
    }

    /// Schedules a reminder, replacing any earlier one for the same session.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyPast` if the reminder would fire now or earlier.
    pub fn schedule(&mut self, reminder: Reminder) -> Result<(), ReminderError> {
        let now = self.clock.now_millis();
        let fire_at = reminder.fire_at_millis();
        if fire_at <= now {
            return Err(ReminderError::AlreadyPast {
                session_id: reminder.session_id,
            });
        }

        self.cancel(&reminder.session_id);
        self.pending.retain(|_, handle| !handle.is_finished());

        let delay = Duration::from_millis(fire_at - now);
        let session_id = reminder.session_id.clone();
        let tx = self.tx.clone();
        tracing::debug!(session_id = %session_id, delay_ms = fire_at - now, "リマインダーを登録しました");

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(reminder).is_err() {
                tracing::debug!("リマインダーの受信側が閉じられています");
            }
        });
        self.pending.insert(session_id, handle);
        Ok(())
    }

    /// Cancels the reminder for `session_id`. Returns true if one was pending.
    pub fn cancel(&mut self, session_id: &str) -> bool {
        match self.pending.remove(session_id) {
            Some(handle) => {
                let was_pending = !handle.is_finished();
                handle.abort();
                was_pending
            }
            None => false,
        }
    }

    /// Number of reminders that have not fired yet.
    pub fn pending_count(&self) -> usize {
        self.pending.values().filter(|h| !h.is_finished()).count()
    }
}

/// Announces delivered reminders until every scheduler is gone.
pub async fn deliver(mut reminders: mpsc::UnboundedReceiver<Reminder>) {
    while let Some(reminder) = reminders.recv().await {
        tracing::info!(
            session_id = %reminder.session_id,
            lead_minutes = reminder.lead_minutes,
            "リマインダーを通知しました"
        );
        println!(
            "! セッション「{}」が{}分後に始まります",
            reminder.session_id, reminder.lead_minutes
        );
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.pending.drain() {
            handle.abort();
        }
    }
}
