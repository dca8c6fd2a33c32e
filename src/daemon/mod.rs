//! Daemon module for the Study Timer.
//!
//! This module contains the long-running host for one timer:
//! - `runner`: tick loop and event routing
//! - `ipc`: Unix socket server and request dispatch
//! - `reminder`: one-shot reminders before scheduled sessions

pub mod ipc;
pub mod reminder;
pub mod runner;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use crate::timer::{
    CrossInstanceBus, FileStore, IntervalCycle, RecordStore, SystemTimeSource, TimerContext,
    TimerEngine,
};
use crate::types::{CycleConfig, TimerConfig, TimerIdentity};

pub use ipc::{IpcError, IpcServer, RequestHandler};
pub use reminder::{Reminder, ReminderError, ReminderScheduler};
pub use runner::{Session, SharedSession, DEFAULT_TICK_INTERVAL};

/// Data directory name under the home directory
const DATA_DIR_NAME: &str = ".study-timer";

/// Socket file name inside the data directory
const SOCKET_FILE_NAME: &str = "study-timer.sock";

/// State directory name inside the data directory
const STATE_DIR_NAME: &str = "state";

/// Identity used when none is given
pub const DEFAULT_IDENTITY: &str = "default";

/// Returns `~/.study-timer`.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn data_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("ホームディレクトリを特定できません")?;
    Ok(home.join(DATA_DIR_NAME))
}

/// Returns the default IPC socket path.
pub fn default_socket_path() -> Result<PathBuf> {
    Ok(data_dir()?.join(SOCKET_FILE_NAME))
}

/// Returns the default record directory.
pub fn default_state_dir() -> Result<PathBuf> {
    Ok(data_dir()?.join(STATE_DIR_NAME))
}

/// Daemon startup options.
#[derive(Debug, Clone)]
pub struct DaemonOptions {
    /// Timer identity served by this daemon
    pub identity: TimerIdentity,
    /// Engine configuration
    pub timer: TimerConfig,
    /// Interval cycle configuration
    pub cycle: CycleConfig,
    /// Socket path
    pub socket_path: PathBuf,
    /// Record directory
    pub state_dir: PathBuf,
}

impl DaemonOptions {
    /// Options for `identity` using the default paths.
    pub fn new(identity: TimerIdentity) -> Result<Self> {
        Ok(Self {
            identity,
            timer: TimerConfig::default(),
            cycle: CycleConfig::default(),
            socket_path: default_socket_path()?,
            state_dir: default_state_dir()?,
        })
    }
}

/// Runs the daemon until Ctrl-C.
///
/// The socket is claimed first, so a second daemon for the same socket
/// exits before touching the stored record.
///
/// # Errors
///
/// Returns an error if another daemon owns the socket, or if the store,
/// engine, or socket cannot be set up.
pub async fn run_daemon(options: DaemonOptions) -> Result<()> {
    options
        .timer
        .validate()
        .map_err(|e| anyhow::anyhow!("設定が不正です: {e}"))?;

    let server = IpcServer::new(&options.socket_path)?;

    let store = FileStore::open(&options.state_dir)
        .with_context(|| format!("状態ディレクトリを開けません: {:?}", options.state_dir))?;
    let context = TimerContext::new(
        Arc::new(SystemTimeSource),
        RecordStore::new(Arc::new(store)),
        CrossInstanceBus::new(),
    );

    let clock = Arc::clone(&context.clock);

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let mut engine = TimerEngine::open(options.identity.clone(), options.timer, context, event_tx)
        .context("タイマーを初期化できません")?;
    let mut cycle = IntervalCycle::for_engine(&engine, options.cycle)
        .context("ポモドーロを初期化できません")?;
    cycle
        .restore(&mut engine)
        .context("ポモドーロを復元できません")?;

    let (reminder_tx, reminder_rx) = mpsc::unbounded_channel();
    let session = Session::new(engine, cycle)
        .with_reminders(ReminderScheduler::new(clock, reminder_tx))
        .shared();
    let delivery_task = tokio::spawn(reminder::deliver(reminder_rx));

    tracing::info!(
        identity = %options.identity,
        socket = ?server.socket_path(),
        "Daemonを起動しました"
    );

    let handler = RequestHandler::new(session.clone());
    let server_task = tokio::spawn(async move {
        if let Err(e) = server.serve(&handler).await {
            tracing::error!(error = %e, "IPCサーバーが停止しました");
        }
    });

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "シグナルの待機に失敗しました");
        }
    };
    runner::run(session, event_rx, DEFAULT_TICK_INTERVAL, shutdown).await;

    server_task.abort();
    let _ = server_task.await;
    delivery_task.abort();
    Ok(())
}
