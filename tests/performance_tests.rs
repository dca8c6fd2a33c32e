//! Performance Tests for the Study Timer.
//!
//! - TC-PF-001: Tick cost (target: 10,000 ticks well under a second)
//! - TC-PF-002: IPC round-trip latency (target: 50ms)
//! - TC-PF-003: Bus fan-out to several instances
//!
//! Note: Targets are generous so the tests hold under CI load.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use study_timer::cli::client::IpcClient;
use study_timer::daemon::ipc::{IpcServer, RequestHandler};
use study_timer::daemon::runner::Session;
use study_timer::timer::{IntervalCycle, ManualTimeSource, TimerContext, TimerEngine};
use study_timer::types::{CycleConfig, TimerConfig, TimerIdentity, TimerPhase};

// ============================================================================
// Test Helpers
// ============================================================================

fn create_temp_socket_path() -> PathBuf {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("perf_test.sock");
    std::mem::forget(dir);
    path
}

fn open_engine(context: &TimerContext) -> TimerEngine {
    let (tx, _rx) = mpsc::unbounded_channel();
    TimerEngine::open(
        TimerIdentity::new("perf"),
        TimerConfig::default(),
        context.clone(),
        tx,
    )
    .unwrap()
}

// ============================================================================
// TC-PF-001: Tick Cost
// ============================================================================

/// TC-PF-001: ティック処理の速度
#[test]
fn tc_pf_001_tick_throughput() {
    let clock = ManualTimeSource::new(1_700_000_000_000);
    let context = TimerContext::in_memory(Arc::new(clock.clone()));
    let mut engine = open_engine(&context);
    engine.start().unwrap();

    let started = Instant::now();
    for _ in 0..10_000 {
        clock.advance(Duration::from_millis(250));
        engine.tick();
    }
    let elapsed = started.elapsed();

    assert_eq!(engine.snapshot().elapsed_seconds, 2_500);
    assert!(
        elapsed < Duration::from_secs(2),
        "10,000 ticks took {:?}",
        elapsed
    );
}

// ============================================================================
// TC-PF-002: IPC Latency
// ============================================================================

/// TC-PF-002: IPC往復の平均レイテンシ
#[tokio::test]
async fn tc_pf_002_ipc_latency() {
    let clock = ManualTimeSource::new(1_700_000_000_000);
    let context = TimerContext::in_memory(Arc::new(clock));
    let (tx, _rx) = mpsc::unbounded_channel();
    let engine =
        TimerEngine::open(TimerIdentity::new("perf"), TimerConfig::default(), context, tx).unwrap();
    let cycle = IntervalCycle::for_engine(&engine, CycleConfig::default()).unwrap();
    let session = Session::new(engine, cycle).shared();

    let socket_path = create_temp_socket_path();
    let server = IpcServer::new(&socket_path).unwrap();
    let handler = RequestHandler::new(session);
    let server_task = tokio::spawn(async move {
        let _ = server.serve(&handler).await;
    });

    let client = IpcClient::with_socket_path(socket_path);
    const REQUESTS: u32 = 20;
    let started = Instant::now();
    for _ in 0..REQUESTS {
        client.status().await.unwrap();
    }
    let average = started.elapsed() / REQUESTS;
    server_task.abort();

    assert!(
        average < Duration::from_millis(50),
        "average IPC latency {:?}",
        average
    );
}

// ============================================================================
// TC-PF-003: Bus Fan-out
// ============================================================================

/// TC-PF-003: 複数インスタンスへの伝播
#[test]
fn tc_pf_003_bus_fan_out() {
    let clock = ManualTimeSource::new(1_700_000_000_000);
    let context = TimerContext::in_memory(Arc::new(clock.clone()));
    let mut writer = open_engine(&context);
    let mut readers: Vec<TimerEngine> = (0..16).map(|_| open_engine(&context)).collect();

    let started = Instant::now();
    for _ in 0..50 {
        writer.start().unwrap();
        clock.advance_secs(1);
        writer.pause().unwrap();
        for reader in &mut readers {
            reader.tick();
        }
    }
    let elapsed = started.elapsed();

    for reader in &readers {
        assert_eq!(reader.phase(), TimerPhase::Paused);
        assert_eq!(reader.record(), writer.record());
    }
    assert!(elapsed < Duration::from_secs(2), "fan-out took {:?}", elapsed);
}
