//! Timer engine for the Study Timer.
//!
//! This module provides the core timer functionality:
//! - State transitions (Idle → Running ⇄ Paused → Stopped, reset to Idle)
//! - Elapsed time derived from a persisted anchor, never from tick counting
//! - Periodic checkpoints and recovery after the host went away mid-run
//! - Duration cap enforcement and backwards clock masking
//! - Last-writer-wins synchronisation with sibling instances

use std::sync::Arc;

use tokio::sync::mpsc;

use super::bus::{BusMessage, BusSubscription, CrossInstanceBus};
use super::clock::TimeSource;
use super::error::TimerError;
use super::store::RecordStore;
use super::summary::SessionSummary;
use crate::types::{PersistedTimerRecord, TimerConfig, TimerIdentity, TimerPhase, TimerSnapshot};

// ============================================================================
// TimerEvent
// ============================================================================

/// Timer events for display and external integrations.
#[derive(Debug, Clone, PartialEq)]
pub enum TimerEvent {
    /// Timer started from idle
    Started,
    /// Timer resumed from pause
    Resumed {
        /// Elapsed seconds carried into the new run
        elapsed_seconds: u64,
    },
    /// Timer paused
    Paused {
        /// Committed elapsed seconds
        elapsed_seconds: u64,
    },
    /// Timer stopped
    Stopped {
        /// Outcome handed to the completion flow
        summary: SessionSummary,
    },
    /// Timer reset to idle
    Reset,
    /// Displayed elapsed second changed
    Tick {
        /// Derived elapsed seconds
        elapsed_seconds: u64,
    },
    /// Running progress written to the store
    Checkpointed {
        /// Checkpointed elapsed seconds
        elapsed_seconds: u64,
    },
    /// Persisted state loaded at construction
    Recovered {
        /// Elapsed seconds after recovery
        elapsed_seconds: u64,
        /// Whether the record was still running and has been paused
        was_running: bool,
    },
    /// A stored record could not be read and was replaced by a fresh one
    CorruptStateDiscarded,
    /// A newer record from another instance was adopted
    RemoteApplied {
        /// Adopted phase
        phase: TimerPhase,
        /// Adopted elapsed seconds
        elapsed_seconds: u64,
    },
    /// The duration ceiling was reached and the timer was paused
    DurationCapReached {
        /// Elapsed seconds at the ceiling
        elapsed_seconds: u64,
    },
    /// The clock went backwards; display is held at the last good value
    ClockAnomaly {
        /// Value the clock would have produced
        derived_seconds: u64,
        /// Value being reported instead
        reported_seconds: u64,
    },
}

// ============================================================================
// TimerContext
// ============================================================================

/// Collaborators shared by every engine in one process.
#[derive(Debug, Clone)]
pub struct TimerContext {
    /// Clock
    pub clock: Arc<dyn TimeSource>,
    /// Record persistence
    pub store: RecordStore,
    /// Sibling notification
    pub bus: CrossInstanceBus,
}

impl TimerContext {
    /// Bundles the collaborators.
    pub fn new(clock: Arc<dyn TimeSource>, store: RecordStore, bus: CrossInstanceBus) -> Self {
        Self { clock, store, bus }
    }

    /// Context with an in-memory store and a private bus.
    pub fn in_memory(clock: Arc<dyn TimeSource>) -> Self {
        Self::new(clock, RecordStore::in_memory(), CrossInstanceBus::new())
    }
}

// ============================================================================
// TimerEngine
// ============================================================================

/// Single authority over one timer identity's elapsed time.
pub struct TimerEngine {
    identity: TimerIdentity,
    instance_id: String,
    config: TimerConfig,
    clock: Arc<dyn TimeSource>,
    store: RecordStore,
    bus: CrossInstanceBus,
    subscription: BusSubscription,
    /// Last-known record, own or adopted
    record: PersistedTimerRecord,
    /// Highest elapsed value reported so far in this run
    last_reported_millis: u64,
    /// Wall-clock instant of the last own write
    last_write_millis: u64,
    last_tick_seconds: Option<u64>,
    anomaly_active: bool,
    cap_signalled: bool,
    event_tx: mpsc::UnboundedSender<TimerEvent>,
}

impl TimerEngine {
    /// Opens the timer for `identity` and recovers its persisted state.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the initial
    /// record cannot be written.
    pub fn open(
        identity: TimerIdentity,
        config: TimerConfig,
        context: TimerContext,
        event_tx: mpsc::UnboundedSender<TimerEvent>,
    ) -> Result<Self, TimerError> {
        config.validate().map_err(TimerError::InvalidConfig)?;

        let instance_id = uuid::Uuid::new_v4().to_string();
        let subscription = context.bus.subscribe(&identity, &instance_id);

        let mut engine = Self {
            identity,
            instance_id,
            config,
            clock: context.clock,
            store: context.store,
            bus: context.bus,
            subscription,
            record: PersistedTimerRecord::default(),
            last_reported_millis: 0,
            last_write_millis: 0,
            last_tick_seconds: None,
            anomaly_active: false,
            cap_signalled: false,
            event_tx,
        };
        engine.recover()?;
        Ok(engine)
    }

    /// Reloads the persisted record.
    ///
    /// A record left running (the host went away mid-run) is paused at the
    /// elapsed time derived from its stale anchor, never kept running.
    pub fn recover(&mut self) -> Result<(), TimerError> {
        let outcome = self.store.load(&self.identity);
        let now = self.clock.now_millis();
        let max = self.config.max_millis();

        self.record = outcome.value;
        self.reset_run_tracking();

        if outcome.corrupt {
            self.emit(TimerEvent::CorruptStateDiscarded);
        }
        if !outcome.existed || outcome.corrupt {
            self.transition(PersistedTimerRecord::default(), now)?;
        }

        let was_running = self.record.phase.is_running();
        if was_running {
            let elapsed = self.record.derived_elapsed_millis(now).min(max);
            self.transition(Self::paused_at(elapsed), now)?;
            tracing::info!(
                identity = %self.identity,
                elapsed_seconds = elapsed / 1000,
                "実行中のまま残っていたタイマーを一時停止状態で復元しました"
            );
        } else if self.record.elapsed_millis > max {
            let next = PersistedTimerRecord {
                elapsed_millis: max,
                ..self.record.clone()
            };
            self.transition(next, now)?;
        }

        self.last_reported_millis = self.record.elapsed_millis.min(max);
        self.emit(TimerEvent::Recovered {
            elapsed_seconds: self.last_reported_millis / 1000,
            was_running,
        });

        if self.record.elapsed_millis >= max {
            if was_running {
                self.signal_cap();
            } else {
                self.cap_signalled = true;
            }
        }
        Ok(())
    }

    /// Starts the timer from idle, or from pause.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if already running, stopped, or capped.
    pub fn start(&mut self) -> Result<(), TimerError> {
        self.sync_from_bus();
        match self.record.phase {
            TimerPhase::Idle | TimerPhase::Paused => self.begin_running("start"),
            phase => Err(TimerError::InvalidTransition {
                operation: "start",
                phase,
            }),
        }
    }

    /// Resumes a paused timer.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless paused below the ceiling.
    pub fn resume(&mut self) -> Result<(), TimerError> {
        self.sync_from_bus();
        match self.record.phase {
            TimerPhase::Paused => self.begin_running("resume"),
            phase => Err(TimerError::InvalidTransition {
                operation: "resume",
                phase,
            }),
        }
    }

    fn begin_running(&mut self, operation: &'static str) -> Result<(), TimerError> {
        let phase = self.record.phase;
        if self.is_capped() {
            return Err(TimerError::InvalidTransition { operation, phase });
        }

        let now = self.clock.now_millis();
        let next = PersistedTimerRecord {
            phase: TimerPhase::Running,
            elapsed_millis: self.record.elapsed_millis,
            anchor_millis: Some(now),
            ..PersistedTimerRecord::default()
        };
        self.transition(next, now)?;
        self.last_reported_millis = self.record.elapsed_millis;
        self.anomaly_active = false;

        tracing::info!(identity = %self.identity, operation, "タイマーを開始しました");
        if phase == TimerPhase::Paused {
            self.emit(TimerEvent::Resumed {
                elapsed_seconds: self.record.elapsed_seconds(),
            });
        } else {
            self.emit(TimerEvent::Started);
        }
        Ok(())
    }

    /// Pauses the running timer, committing the derived elapsed time.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless running.
    pub fn pause(&mut self) -> Result<(), TimerError> {
        self.sync_from_bus();
        if !self.record.phase.is_running() {
            return Err(TimerError::InvalidTransition {
                operation: "pause",
                phase: self.record.phase,
            });
        }

        let now = self.clock.now_millis();
        let elapsed = self.derive_elapsed(now);
        self.transition(Self::paused_at(elapsed), now)?;

        tracing::info!(
            identity = %self.identity,
            elapsed_seconds = elapsed / 1000,
            "タイマーを一時停止しました"
        );
        self.emit(TimerEvent::Paused {
            elapsed_seconds: elapsed / 1000,
        });
        if elapsed >= self.config.max_millis() {
            self.signal_cap();
        }
        Ok(())
    }

    /// Stops the timer. Stopping a stopped timer is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the timer never started.
    pub fn stop(&mut self) -> Result<(), TimerError> {
        self.sync_from_bus();
        let elapsed = match self.record.phase {
            TimerPhase::Stopped => return Ok(()),
            TimerPhase::Idle => {
                return Err(TimerError::InvalidTransition {
                    operation: "stop",
                    phase: TimerPhase::Idle,
                })
            }
            TimerPhase::Running => self.derive_elapsed(self.clock.now_millis()),
            TimerPhase::Paused => self.record.elapsed_millis.min(self.config.max_millis()),
        };

        let now = self.clock.now_millis();
        let next = PersistedTimerRecord {
            phase: TimerPhase::Stopped,
            elapsed_millis: elapsed,
            ..PersistedTimerRecord::default()
        };
        self.transition(next, now)?;

        let summary = self.summary();
        tracing::info!(
            identity = %self.identity,
            elapsed_seconds = summary.elapsed_seconds,
            "タイマーを停止しました"
        );
        self.emit(TimerEvent::Stopped { summary });
        Ok(())
    }

    /// Clears the timer back to IDLE/0. Resetting an untouched timer is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `ResetNotConfirmed` unless `confirmed` is true.
    pub fn reset(&mut self, confirmed: bool) -> Result<(), TimerError> {
        if !confirmed {
            return Err(TimerError::ResetNotConfirmed);
        }
        self.sync_from_bus();
        if self.record.phase == TimerPhase::Idle && self.record.elapsed_millis == 0 {
            return Ok(());
        }

        let now = self.clock.now_millis();
        self.store.clear(&self.identity)?;
        self.transition(PersistedTimerRecord::default(), now)?;
        self.reset_run_tracking();

        tracing::info!(identity = %self.identity, "タイマーをリセットしました");
        self.emit(TimerEvent::Reset);
        Ok(())
    }

    /// Recomputes the displayed elapsed seconds.
    ///
    /// Safe to call at any cadence: the value is derived from the anchor,
    /// so late or missing ticks never skew it. Also checkpoints when due and
    /// enforces the ceiling. Never fails; persistence problems are logged.
    pub fn tick(&mut self) -> u64 {
        self.sync_from_bus();
        if !self.record.phase.is_running() {
            return self.record.elapsed_millis.min(self.config.max_millis()) / 1000;
        }

        let now = self.clock.now_millis();
        let elapsed = self.derive_elapsed(now);

        if elapsed >= self.config.max_millis() {
            self.force_cap(now);
            return elapsed / 1000;
        }

        if now.saturating_sub(self.last_write_millis) >= self.config.checkpoint_interval_millis {
            if let Err(e) = self.write_checkpoint(now, elapsed) {
                tracing::warn!(identity = %self.identity, error = %e, "チェックポイントの保存に失敗しました");
            }
        }

        let seconds = elapsed / 1000;
        if self.last_tick_seconds != Some(seconds) {
            self.last_tick_seconds = Some(seconds);
            self.emit(TimerEvent::Tick {
                elapsed_seconds: seconds,
            });
        }
        seconds
    }

    /// Writes the currently derived elapsed time while running.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be persisted.
    pub fn checkpoint(&mut self) -> Result<(), TimerError> {
        self.sync_from_bus();
        if !self.record.phase.is_running() {
            return Ok(());
        }
        let now = self.clock.now_millis();
        let elapsed = self.derive_elapsed(now);
        if elapsed >= self.config.max_millis() {
            self.force_cap(now);
            return Ok(());
        }
        self.write_checkpoint(now, elapsed)
    }

    /// Best-effort checkpoint before the host shuts down.
    pub fn prepare_teardown(&mut self) {
        if let Err(e) = self.checkpoint() {
            tracing::warn!(identity = %self.identity, error = %e, "終了前のチェックポイントに失敗しました");
        }
    }

    /// Changes the duration ceiling for the next run.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` while running, `InvalidConfig` for zero.
    pub fn set_max_seconds(&mut self, seconds: u64) -> Result<(), TimerError> {
        if self.record.phase.is_running() {
            return Err(TimerError::InvalidTransition {
                operation: "set_max_seconds",
                phase: self.record.phase,
            });
        }
        let config = self.config.clone().with_max_seconds(seconds);
        config.validate().map_err(TimerError::InvalidConfig)?;

        let max = config.max_millis();
        let clamp = self.record.elapsed_millis > max;
        if clamp {
            let next = PersistedTimerRecord {
                elapsed_millis: max,
                ..self.record.clone()
            };
            let now = self.clock.now_millis();
            self.transition(next, now)?;
            tracing::info!(
                identity = %self.identity,
                max_seconds = seconds,
                "上限時間を下げたため経過時間を切り詰めました"
            );
        }
        self.config = config;
        self.last_reported_millis = self.last_reported_millis.min(max);

        if clamp && self.record.phase == TimerPhase::Paused {
            self.cap_signalled = false;
            self.signal_cap();
        } else {
            self.cap_signalled = self.record.elapsed_millis >= max;
        }
        Ok(())
    }

    /// Drains pending sibling records and adopts the winning ones.
    ///
    /// Returns the number of records adopted.
    pub fn sync_from_bus(&mut self) -> usize {
        let mut adopted = 0;
        while let Some(message) = self.subscription.try_next() {
            if self.apply_remote(message) {
                adopted += 1;
            }
        }
        adopted
    }

    /// Adopts a sibling's record wholesale if it is strictly newer.
    pub fn apply_remote(&mut self, message: BusMessage) -> bool {
        if message.identity != self.identity || !message.record.supersedes(&self.record) {
            return false;
        }
        if !message.record.is_consistent() {
            tracing::warn!(identity = %self.identity, "整合性のないレコードを受信したため無視します");
            return false;
        }

        let max = self.config.max_millis();
        self.record = message.record;
        self.last_reported_millis = self
            .record
            .derived_elapsed_millis(self.clock.now_millis())
            .min(max);
        self.last_write_millis = self.clock.now_millis();
        self.last_tick_seconds = None;
        self.anomaly_active = false;
        self.cap_signalled = self.record.elapsed_millis >= max;

        tracing::debug!(
            identity = %self.identity,
            source = %message.source,
            phase = %self.record.phase,
            "他インスタンスの状態を適用しました"
        );
        self.emit(TimerEvent::RemoteApplied {
            phase: self.record.phase,
            elapsed_seconds: self.last_reported_millis / 1000,
        });
        true
    }

    /// Returns a point-in-time view without side effects.
    pub fn snapshot(&self) -> TimerSnapshot {
        let max = self.config.max_millis();
        let derived = self
            .record
            .derived_elapsed_millis(self.clock.now_millis())
            .min(max);
        let elapsed = if self.record.phase.is_running() {
            derived.max(self.last_reported_millis)
        } else {
            derived
        };
        TimerSnapshot {
            identity: self.identity.clone(),
            phase: self.record.phase,
            elapsed_seconds: elapsed / 1000,
            max_seconds: self.config.max_seconds,
            capped: self.is_capped(),
            clock_anomaly: self.anomaly_active,
        }
    }

    /// Completion summary for the current elapsed time.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary::new(self.snapshot().elapsed_seconds, self.config.estimated_hours)
    }

    /// Returns true if the ceiling has been reached and the timer is not running.
    pub fn is_capped(&self) -> bool {
        !self.record.phase.is_running() && self.record.elapsed_millis >= self.config.max_millis()
    }

    /// Returns the current phase.
    pub fn phase(&self) -> TimerPhase {
        self.record.phase
    }

    /// Returns the last-known record.
    pub fn record(&self) -> &PersistedTimerRecord {
        &self.record
    }

    /// Returns the timer identity.
    pub fn identity(&self) -> &TimerIdentity {
        &self.identity
    }

    /// Returns this instance's id.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    /// Returns the record store.
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn paused_at(elapsed_millis: u64) -> PersistedTimerRecord {
        PersistedTimerRecord {
            phase: TimerPhase::Paused,
            elapsed_millis,
            ..PersistedTimerRecord::default()
        }
    }

    /// Derived elapsed time, capped and never below a value already reported.
    fn derive_elapsed(&mut self, now: u64) -> u64 {
        let derived = self
            .record
            .derived_elapsed_millis(now)
            .min(self.config.max_millis());

        if derived < self.last_reported_millis {
            if !self.anomaly_active {
                self.anomaly_active = true;
                tracing::warn!(
                    identity = %self.identity,
                    derived_millis = derived,
                    reported_millis = self.last_reported_millis,
                    "時計の巻き戻りを検出しました。最後の正常値を維持します"
                );
                self.emit(TimerEvent::ClockAnomaly {
                    derived_seconds: derived / 1000,
                    reported_seconds: self.last_reported_millis / 1000,
                });
            }
            return self.last_reported_millis;
        }

        self.anomaly_active = false;
        self.last_reported_millis = derived;
        derived
    }

    fn write_checkpoint(&mut self, now: u64, elapsed: u64) -> Result<(), TimerError> {
        let next = PersistedTimerRecord {
            phase: TimerPhase::Running,
            elapsed_millis: elapsed,
            anchor_millis: Some(now),
            ..PersistedTimerRecord::default()
        };
        self.transition(next, now)?;
        tracing::debug!(identity = %self.identity, elapsed_millis = elapsed, "チェックポイントを保存しました");
        self.emit(TimerEvent::Checkpointed {
            elapsed_seconds: elapsed / 1000,
        });
        Ok(())
    }

    /// Pauses at the ceiling. Applied in memory even if persisting fails.
    fn force_cap(&mut self, now: u64) {
        let max = self.config.max_millis();
        let next = Self::paused_at(max);
        if let Err(e) = self.transition(next.clone(), now) {
            tracing::warn!(identity = %self.identity, error = %e, "上限到達状態の保存に失敗しました");
            self.record = next;
        }
        self.last_reported_millis = max;
        self.emit(TimerEvent::Paused {
            elapsed_seconds: max / 1000,
        });
        self.signal_cap();
    }

    fn signal_cap(&mut self) {
        if self.cap_signalled {
            return;
        }
        self.cap_signalled = true;
        tracing::warn!(
            identity = %self.identity,
            max_seconds = self.config.max_seconds,
            "上限時間に達したためタイマーを一時停止しました"
        );
        self.emit(TimerEvent::DurationCapReached {
            elapsed_seconds: self.config.max_seconds,
        });
    }

    /// Stamps, persists and publishes `next`, then makes it current.
    fn transition(&mut self, mut next: PersistedTimerRecord, now: u64) -> Result<(), TimerError> {
        let stamp = now.max(self.record.written_at.saturating_add(1));
        self.store
            .save(&self.identity, &mut next, stamp, &self.instance_id)?;
        self.record = next;
        self.last_write_millis = now;
        self.bus.publish(&self.instance_id, &self.identity, &self.record);
        Ok(())
    }

    fn reset_run_tracking(&mut self) {
        self.last_reported_millis = 0;
        self.last_tick_seconds = None;
        self.anomaly_active = false;
        self.cap_signalled = false;
    }

    fn emit(&self, event: TimerEvent) {
        if self.event_tx.send(event).is_err() {
            tracing::trace!("イベントの受信側が閉じられています");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
