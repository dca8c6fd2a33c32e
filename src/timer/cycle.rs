//! Focus/break interval cycle layered on top of [`TimerEngine`].
//!
//! The cycle never touches elapsed time itself. When the engine reports
//! that the current interval hit its ceiling, the cycle decides the next
//! interval and restarts the engine from zero with that interval's length
//! as the new ceiling.
//!
//! Whether the cycle is active, and the ceiling of the interval it is
//! timing, are persisted with the counter so a restarted daemon can put
//! the engine back under the interval's ceiling.

use super::engine::{TimerEngine, TimerEvent};
use super::error::TimerError;
use super::store::RecordStore;
use crate::types::{CycleConfig, CycleState, IntervalKind, TimerIdentity};

/// Next interval requested from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseRequest {
    /// Interval to run
    pub kind: IntervalKind,
    /// Its length, used as the engine's ceiling
    pub duration_seconds: u64,
}

/// Pomodoro-style sequencer with a persisted completion counter.
#[derive(Debug)]
pub struct IntervalCycle {
    identity: TimerIdentity,
    config: CycleConfig,
    state: CycleState,
    store: RecordStore,
}

impl IntervalCycle {
    /// Creates the cycle for `identity`, restoring its saved counter.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration fails validation.
    pub fn new(
        identity: TimerIdentity,
        config: CycleConfig,
        store: RecordStore,
    ) -> Result<Self, TimerError> {
        config.validate().map_err(TimerError::InvalidConfig)?;
        let state = store.load_cycle(&identity).value;
        Ok(Self {
            identity,
            config,
            state,
            store,
        })
    }

    /// Creates the cycle sharing an engine's identity and store.
    pub fn for_engine(engine: &TimerEngine, config: CycleConfig) -> Result<Self, TimerError> {
        Self::new(engine.identity().clone(), config, engine.store().clone())
    }

    /// Current cycle state.
    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Interval currently being timed.
    pub fn kind(&self) -> IntervalKind {
        self.state.kind
    }

    /// Completed focus intervals since the last explicit reset.
    pub fn completed_focus_count(&self) -> u32 {
        self.state.completed_focus_count
    }

    /// Cycle configuration.
    pub fn config(&self) -> &CycleConfig {
        &self.config
    }

    /// Whether the cycle currently drives the engine.
    pub fn is_active(&self) -> bool {
        self.state.active
    }

    /// Starts a fresh focus interval on `engine`.
    ///
    /// The completion counter is left untouched.
    pub fn begin(&mut self, engine: &mut TimerEngine) -> Result<PhaseRequest, TimerError> {
        let request = PhaseRequest {
            kind: IntervalKind::Focus,
            duration_seconds: self.config.focus_seconds(),
        };
        self.state.kind = IntervalKind::Focus;
        self.state.active = true;
        self.state.target_seconds = Some(request.duration_seconds);
        self.store.save_cycle(&self.identity, &self.state)?;
        Self::apply(engine, request)?;
        Ok(request)
    }

    /// Hands the engine back to plain timing. The counter is kept.
    pub fn deactivate(&mut self) -> Result<(), TimerError> {
        if !self.state.active {
            return Ok(());
        }
        self.state.active = false;
        self.state.target_seconds = None;
        self.store.save_cycle(&self.identity, &self.state)?;
        tracing::debug!(identity = %self.identity, "ポモドーロを終了しました");
        Ok(())
    }

    /// Puts a freshly opened engine back under the saved interval's ceiling.
    ///
    /// Returns whether the cycle is active. Must run before the engine is
    /// resumed; an interval that already ran past its ceiling is reported
    /// by the engine as a reached cap.
    pub fn restore(&mut self, engine: &mut TimerEngine) -> Result<bool, TimerError> {
        if !self.state.active {
            return Ok(false);
        }
        let target = self
            .state
            .target_seconds
            .unwrap_or_else(|| match self.state.kind {
                IntervalKind::Focus => self.config.focus_seconds(),
                IntervalKind::Break => self
                    .config
                    .break_seconds_after(self.state.completed_focus_count),
            });
        if engine.config().max_seconds != target {
            engine.set_max_seconds(target)?;
        }
        tracing::info!(
            identity = %self.identity,
            kind = self.state.kind.as_str(),
            max_seconds = target,
            "ポモドーロを復元しました"
        );
        Ok(true)
    }

    /// Advances past the current interval and returns the next one.
    pub fn complete_interval(&mut self) -> PhaseRequest {
        let request = match self.state.kind {
            IntervalKind::Focus => {
                self.state.completed_focus_count = self.state.completed_focus_count.saturating_add(1);
                self.state.kind = IntervalKind::Break;
                PhaseRequest {
                    kind: IntervalKind::Break,
                    duration_seconds: self
                        .config
                        .break_seconds_after(self.state.completed_focus_count),
                }
            }
            IntervalKind::Break => {
                self.state.kind = IntervalKind::Focus;
                PhaseRequest {
                    kind: IntervalKind::Focus,
                    duration_seconds: self.config.focus_seconds(),
                }
            }
        };
        self.state.target_seconds = Some(request.duration_seconds);

        if let Err(e) = self.store.save_cycle(&self.identity, &self.state) {
            tracing::warn!(identity = %self.identity, error = %e, "サイクル状態の保存に失敗しました");
        }
        tracing::info!(
            identity = %self.identity,
            next = request.kind.as_str(),
            completed = self.state.completed_focus_count,
            "インターバルが完了しました"
        );
        request
    }

    /// Reacts to an engine event.
    ///
    /// A reached ceiling completes the interval and starts the next one;
    /// a record adopted from a sibling reloads the shared counter.
    /// A ceiling found already crossed when the engine recovered counts
    /// the same way: the interval that ran out while the host was down is
    /// completed and the next one starts from zero.
    pub fn handle_event(
        &mut self,
        event: &TimerEvent,
        engine: &mut TimerEngine,
    ) -> Result<Option<PhaseRequest>, TimerError> {
        match event {
            TimerEvent::DurationCapReached { .. } => {
                let request = self.complete_interval();
                Self::apply(engine, request)?;
                Ok(Some(request))
            }
            TimerEvent::RemoteApplied { .. } => {
                self.state = self.store.load_cycle(&self.identity).value;
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    /// Zeroes the completion counter. Stopping the engine never does this.
    ///
    /// An interval in progress keeps running under its ceiling.
    ///
    /// # Errors
    ///
    /// Returns `ResetNotConfirmed` unless `confirmed` is true.
    pub fn reset_history(&mut self, confirmed: bool) -> Result<(), TimerError> {
        if !confirmed {
            return Err(TimerError::ResetNotConfirmed);
        }
        self.state.completed_focus_count = 0;
        if !self.state.active {
            self.state = CycleState::default();
        }
        self.store.save_cycle(&self.identity, &self.state)?;
        tracing::info!(identity = %self.identity, "ポモドーロ履歴をリセットしました");
        Ok(())
    }

    fn apply(engine: &mut TimerEngine, request: PhaseRequest) -> Result<(), TimerError> {
        engine.reset(true)?;
        engine.set_max_seconds(request.duration_seconds)?;
        engine.start()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use crate::timer::clock::ManualTimeSource;
    use crate::timer::engine::TimerContext;
    use crate::types::{TimerConfig, TimerPhase};

    fn setup() -> (
        ManualTimeSource,
        TimerEngine,
        mpsc::UnboundedReceiver<TimerEvent>,
        IntervalCycle,
    ) {
        let clock = ManualTimeSource::new(1_700_000_000_000);
        let context = TimerContext::in_memory(Arc::new(clock.clone()));
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = TimerEngine::open(
            TimerIdentity::new("study"),
            TimerConfig::default(),
            context,
            tx,
        )
        .unwrap();
        let cycle = IntervalCycle::for_engine(&engine, CycleConfig::default()).unwrap();
        (clock, engine, rx, cycle)
    }

    /// Runs the engine past the current interval and feeds events to the cycle.
    fn finish_interval(
        clock: &ManualTimeSource,
        engine: &mut TimerEngine,
        rx: &mut mpsc::UnboundedReceiver<TimerEvent>,
        cycle: &mut IntervalCycle,
    ) -> Option<PhaseRequest> {
        clock.advance_secs(engine.config().max_seconds + 1);
        engine.tick();
        let mut requested = None;
        while let Ok(event) = rx.try_recv() {
            if let Some(request) = cycle.handle_event(&event, engine).unwrap() {
                requested = Some(request);
            }
        }
        requested
    }

    #[test]
    fn test_begin_starts_focus_with_focus_ceiling() {
        let (_clock, mut engine, _rx, mut cycle) = setup();

        let request = cycle.begin(&mut engine).unwrap();

        assert_eq!(request.kind, IntervalKind::Focus);
        assert_eq!(request.duration_seconds, 25 * 60);
        assert_eq!(engine.phase(), TimerPhase::Running);
        assert_eq!(engine.config().max_seconds, 25 * 60);
    }

    #[test]
    fn test_fourth_focus_completion_requests_long_break() {
        let (clock, mut engine, mut rx, mut cycle) = setup();
        cycle.begin(&mut engine).unwrap();

        let mut breaks = Vec::new();
        for _ in 0..4 {
            let brk = finish_interval(&clock, &mut engine, &mut rx, &mut cycle).unwrap();
            assert_eq!(brk.kind, IntervalKind::Break);
            breaks.push(brk.duration_seconds);

            let focus = finish_interval(&clock, &mut engine, &mut rx, &mut cycle).unwrap();
            assert_eq!(focus.kind, IntervalKind::Focus);
            assert_eq!(focus.duration_seconds, 25 * 60);
        }

        assert_eq!(breaks, vec![5 * 60, 5 * 60, 5 * 60, 15 * 60]);
        assert_eq!(cycle.completed_focus_count(), 4);
    }

    #[test]
    fn test_each_interval_restarts_engine_from_zero() {
        let (clock, mut engine, mut rx, mut cycle) = setup();
        cycle.begin(&mut engine).unwrap();

        finish_interval(&clock, &mut engine, &mut rx, &mut cycle);

        assert_eq!(engine.phase(), TimerPhase::Running);
        assert_eq!(engine.snapshot().elapsed_seconds, 0);
        assert_eq!(engine.config().max_seconds, 5 * 60);
    }

    #[test]
    fn test_count_survives_pause_resume_and_stop() {
        let (clock, mut engine, mut rx, mut cycle) = setup();
        cycle.begin(&mut engine).unwrap();
        finish_interval(&clock, &mut engine, &mut rx, &mut cycle);

        engine.pause().unwrap();
        engine.resume().unwrap();
        engine.stop().unwrap();
        while let Ok(event) = rx.try_recv() {
            cycle.handle_event(&event, &mut engine).unwrap();
        }

        assert_eq!(cycle.completed_focus_count(), 1);
    }

    #[test]
    fn test_reset_history_requires_confirmation() {
        let (clock, mut engine, mut rx, mut cycle) = setup();
        cycle.begin(&mut engine).unwrap();
        finish_interval(&clock, &mut engine, &mut rx, &mut cycle);

        assert!(matches!(
            cycle.reset_history(false),
            Err(TimerError::ResetNotConfirmed)
        ));
        assert_eq!(cycle.completed_focus_count(), 1);

        cycle.reset_history(true).unwrap();
        assert_eq!(cycle.completed_focus_count(), 0);
        assert_eq!(cycle.kind(), IntervalKind::Break);
        assert!(cycle.is_active());

        cycle.deactivate().unwrap();
        cycle.reset_history(true).unwrap();
        assert_eq!(cycle.kind(), IntervalKind::Focus);
        assert!(!cycle.is_active());
    }

    #[test]
    fn test_counter_is_persisted() {
        let (clock, mut engine, mut rx, mut cycle) = setup();
        cycle.begin(&mut engine).unwrap();
        finish_interval(&clock, &mut engine, &mut rx, &mut cycle);

        let restored = IntervalCycle::for_engine(&engine, CycleConfig::default()).unwrap();
        assert_eq!(restored.completed_focus_count(), 1);
        assert_eq!(restored.kind(), IntervalKind::Break);
    }

    #[test]
    fn test_activity_and_ceiling_are_persisted() {
        let (clock, mut engine, mut rx, mut cycle) = setup();
        cycle.begin(&mut engine).unwrap();
        finish_interval(&clock, &mut engine, &mut rx, &mut cycle);

        let restored = IntervalCycle::for_engine(&engine, CycleConfig::default()).unwrap();
        assert!(restored.is_active());
        assert_eq!(restored.state().target_seconds, Some(5 * 60));

        cycle.deactivate().unwrap();
        let restored = IntervalCycle::for_engine(&engine, CycleConfig::default()).unwrap();
        assert!(!restored.is_active());
        assert_eq!(restored.completed_focus_count(), 1);
    }

    #[test]
    fn test_restore_after_restart_keeps_interval_ceiling() {
        let clock = ManualTimeSource::new(1_700_000_000_000);
        let context = TimerContext::in_memory(Arc::new(clock.clone()));
        let identity = TimerIdentity::new("study");
        let (tx, _old_rx) = mpsc::unbounded_channel();
        let mut engine =
            TimerEngine::open(identity.clone(), TimerConfig::default(), context.clone(), tx)
                .unwrap();
        let mut cycle = IntervalCycle::for_engine(&engine, CycleConfig::default()).unwrap();
        cycle.begin(&mut engine).unwrap();
        clock.advance_secs(600);
        engine.prepare_teardown();
        drop(engine);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut engine = TimerEngine::open(identity, TimerConfig::default(), context, tx).unwrap();
        let mut cycle = IntervalCycle::for_engine(&engine, CycleConfig::default()).unwrap();
        assert!(cycle.restore(&mut engine).unwrap());
        assert_eq!(engine.config().max_seconds, 25 * 60);
        while let Ok(event) = rx.try_recv() {
            cycle.handle_event(&event, &mut engine).unwrap();
        }

        engine.resume().unwrap();
        clock.advance_secs(3_600);
        engine.tick();
        let mut requested = None;
        while let Ok(event) = rx.try_recv() {
            if let Some(request) = cycle.handle_event(&event, &mut engine).unwrap() {
                requested = Some(request);
            }
        }

        assert_eq!(requested.map(|r| r.kind), Some(IntervalKind::Break));
        assert_eq!(cycle.kind(), IntervalKind::Break);
        assert_eq!(cycle.completed_focus_count(), 1);
        assert_eq!(engine.config().max_seconds, 5 * 60);
    }

    #[test]
    fn test_restore_completes_interval_that_ran_out_while_down() {
        let clock = ManualTimeSource::new(1_700_000_000_000);
        let context = TimerContext::in_memory(Arc::new(clock.clone()));
        let identity = TimerIdentity::new("study");
        let (tx, _old_rx) = mpsc::unbounded_channel();
        let mut engine =
            TimerEngine::open(identity.clone(), TimerConfig::default(), context.clone(), tx)
                .unwrap();
        let mut cycle = IntervalCycle::for_engine(&engine, CycleConfig::default()).unwrap();
        cycle.begin(&mut engine).unwrap();
        engine.prepare_teardown();
        drop(engine);
        clock.advance_secs(40 * 60);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut engine = TimerEngine::open(identity, TimerConfig::default(), context, tx).unwrap();
        let mut cycle = IntervalCycle::for_engine(&engine, CycleConfig::default()).unwrap();
        cycle.restore(&mut engine).unwrap();
        let mut requested = None;
        while let Ok(event) = rx.try_recv() {
            if let Some(request) = cycle.handle_event(&event, &mut engine).unwrap() {
                requested = Some(request);
            }
        }

        assert_eq!(requested.map(|r| r.kind), Some(IntervalKind::Break));
        assert_eq!(cycle.completed_focus_count(), 1);
        assert_eq!(engine.phase(), TimerPhase::Running);
        assert_eq!(engine.snapshot().elapsed_seconds, 0);
    }

    #[test]
    fn test_restore_is_noop_when_inactive() {
        let (_clock, mut engine, _rx, mut cycle) = setup();
        assert!(!cycle.restore(&mut engine).unwrap());
        assert_eq!(engine.config().max_seconds, TimerConfig::default().max_seconds);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let (_clock, engine, _rx, _cycle) = setup();
        let config = CycleConfig::default().with_focus_minutes(0);
        assert!(matches!(
            IntervalCycle::for_engine(&engine, config),
            Err(TimerError::InvalidConfig(_))
        ));
    }
}
