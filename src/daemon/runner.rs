//! Tick loop driving one timer session inside the daemon.
//!
//! A single task owns the cadence: it ticks the engine, routes engine
//! events to the interval cycle, and performs the teardown checkpoint
//! when the shutdown future resolves.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, Duration, MissedTickBehavior};

use super::reminder::ReminderScheduler;
use crate::timer::{IntervalCycle, TimerEngine, TimerEvent};
use crate::types::ResponseData;

/// Default tick cadence.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(250);

// ============================================================================
// Session
// ============================================================================

/// Engine plus its optional interval cycle and reminder scheduler.
pub struct Session {
    /// Timer engine
    pub engine: TimerEngine,
    /// Interval cycle sharing the engine's identity
    pub cycle: IntervalCycle,
    /// Reminder scheduler, absent when reminders are not served
    pub reminders: Option<ReminderScheduler>,
}

/// Session shared between the tick loop and the IPC handler.
pub type SharedSession = Arc<Mutex<Session>>;

impl Session {
    /// Creates a session. The cycle keeps whatever activity it restored.
    pub fn new(engine: TimerEngine, cycle: IntervalCycle) -> Self {
        Self {
            engine,
            cycle,
            reminders: None,
        }
    }

    /// Serves reminders through `scheduler`.
    pub fn with_reminders(mut self, scheduler: ReminderScheduler) -> Self {
        self.reminders = Some(scheduler);
        self
    }

    /// Wraps the session for sharing.
    pub fn shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    /// Routes one engine event.
    pub fn handle_event(&mut self, event: &TimerEvent) {
        match event {
            TimerEvent::Tick { .. } | TimerEvent::Checkpointed { .. } => {}
            TimerEvent::Stopped { summary } => {
                tracing::info!(
                    elapsed_seconds = summary.elapsed_seconds,
                    accuracy = summary.estimation_accuracy,
                    "セッションが終了しました"
                );
                if let Err(e) = self.cycle.deactivate() {
                    tracing::warn!(error = %e, "サイクル状態の保存に失敗しました");
                }
            }
            TimerEvent::DurationCapReached { .. } if !self.cycle.is_active() => {
                tracing::warn!("上限時間に達しました");
            }
            TimerEvent::Recovered {
                elapsed_seconds,
                was_running: true,
            } if self.cycle.is_active() => {
                tracing::info!(
                    elapsed_seconds,
                    kind = self.cycle.kind().as_str(),
                    "停止中に進んだインターバルを引き継ぎます"
                );
            }
            TimerEvent::ClockAnomaly { .. } | TimerEvent::CorruptStateDiscarded => {
                tracing::warn!(?event, "タイマーの警告");
            }
            other => tracing::debug!(event = ?other, "タイマーイベント"),
        }

        if self.cycle.is_active() {
            if let Err(e) = self.cycle.handle_event(event, &mut self.engine) {
                tracing::warn!(error = %e, "次のインターバルを開始できませんでした");
            }
        }
    }

    /// Status payload for IPC responses.
    pub fn response_data(&self) -> ResponseData {
        ResponseData::from_snapshot(&self.engine.snapshot()).with_cycle(&self.cycle.state())
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Runs the tick loop until `shutdown` resolves.
pub async fn run<F>(
    session: SharedSession,
    mut events: mpsc::UnboundedReceiver<TimerEvent>,
    tick_interval: Duration,
    shutdown: F,
) where
    F: Future<Output = ()>,
{
    let mut ticker = interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                session.lock().await.engine.tick();
            }
            Some(event) = events.recv() => {
                session.lock().await.handle_event(&event);
            }
            _ = &mut shutdown => {
                tracing::info!("シャットダウンします");
                let mut session = session.lock().await;
                session.engine.prepare_teardown();
                break;
            }
        }
    }
}
