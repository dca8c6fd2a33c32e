//! IPC Server for the Study Timer daemon.
//!
//! This module provides Unix Domain Socket IPC functionality:
//! - Server that listens on a Unix socket
//! - Request/response handling for timer commands
//! - Dispatch into the shared timer session

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::time::{timeout, Duration};

use crate::timer::TimerError;
use crate::types::{IpcRequest, IpcResponse, StartParams, TimerPhase};

use super::reminder::{Reminder, ReminderScheduler};
use super::runner::{Session, SharedSession};

// ============================================================================
// Constants
// ============================================================================

/// Maximum request size in bytes (4KB)
const MAX_REQUEST_SIZE: u64 = 4096;

/// Read timeout in seconds
const READ_TIMEOUT_SECS: u64 = 5;

// ============================================================================
// IpcError
// ============================================================================

/// IPC-specific error types.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    /// Read error
    #[error("Failed to read request: {0}")]
    ReadError(String),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Request too large
    #[error("Request too large (max 4096 bytes)")]
    RequestTooLarge,
}

// ============================================================================
// IpcServer
// ============================================================================

/// Unix Domain Socket IPC server.
pub struct IpcServer {
    /// Unix socket listener
    listener: UnixListener,
    /// Socket path (for cleanup)
    socket_path: PathBuf,
}

impl IpcServer {
    /// Creates a new IPC server bound to the specified socket path.
    ///
    /// A leftover socket file nobody listens on is removed before binding.
    ///
    /// # Errors
    ///
    /// Returns an error if another daemon is listening on the socket, or if
    /// the socket cannot be bound.
    pub fn new(socket_path: &Path) -> Result<Self> {
        if socket_path.exists() {
            Self::remove_stale_socket(socket_path)?;
        }

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create socket directory: {:?}", parent))?;
        }

        let listener = UnixListener::bind(socket_path)
            .with_context(|| format!("Failed to bind Unix socket: {:?}", socket_path))?;

        Ok(Self {
            listener,
            socket_path: socket_path.to_path_buf(),
        })
    }

    fn remove_stale_socket(socket_path: &Path) -> Result<()> {
        match std::os::unix::net::UnixStream::connect(socket_path) {
            Ok(_) => anyhow::bail!("Daemonは既に起動しています: {:?}", socket_path),
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::NotFound
                ) =>
            {
                tracing::debug!(path = ?socket_path, "残っていたソケットを削除します");
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to connect to existing socket: {:?}", socket_path)
                })
            }
        }
        std::fs::remove_file(socket_path)
            .with_context(|| format!("Failed to remove existing socket: {:?}", socket_path))
    }

    /// Accepts an incoming client connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be accepted.
    pub async fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self
            .listener
            .accept()
            .await
            .context("Failed to accept connection")?;
        Ok(stream)
    }

    /// Receives and deserializes an IPC request from the stream.
    ///
    /// Reads until the client shuts down its write side, with a timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or deserialization fails.
    pub async fn receive_request(stream: &mut UnixStream) -> Result<IpcRequest> {
        let mut buffer = Vec::new();
        let mut limited = (&mut *stream).take(MAX_REQUEST_SIZE + 1);

        let n = match timeout(
            Duration::from_secs(READ_TIMEOUT_SECS),
            limited.read_to_end(&mut buffer),
        )
        .await
        {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(IpcError::ReadError(e.to_string()).into()),
            Err(_) => return Err(IpcError::Timeout.into()),
        };

        if n == 0 {
            anyhow::bail!("Connection closed by client");
        }
        if n as u64 > MAX_REQUEST_SIZE {
            return Err(IpcError::RequestTooLarge.into());
        }

        let request: IpcRequest =
            serde_json::from_slice(&buffer).context("Failed to deserialize IPC request")?;

        Ok(request)
    }

    /// Serializes and sends an IPC response to the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub async fn send_response(stream: &mut UnixStream, response: &IpcResponse) -> Result<()> {
        let json = serde_json::to_vec(response).context("Failed to serialize IPC response")?;

        stream
            .write_all(&json)
            .await
            .context("Failed to write response")?;
        stream.flush().await.context("Failed to flush response")?;

        Ok(())
    }

    /// Serves connections one at a time until the listener fails.
    pub async fn serve(&self, handler: &RequestHandler) -> Result<()> {
        loop {
            let mut stream = self.accept().await?;
            let response = match Self::receive_request(&mut stream).await {
                Ok(request) => handler.handle(request).await,
                Err(e) => {
                    tracing::debug!(error = %e, "不正なリクエストを受信しました");
                    IpcResponse::error(format!("リクエストを処理できません: {e}"))
                }
            };
            if let Err(e) = Self::send_response(&mut stream, &response).await {
                tracing::debug!(error = %e, "レスポンスの送信に失敗しました");
            }
        }
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

// ============================================================================
// RequestHandler
// ============================================================================

/// Handles IPC requests by dispatching to the shared session.
pub struct RequestHandler {
    session: SharedSession,
}

impl RequestHandler {
    /// Creates a new request handler over the given session.
    pub fn new(session: SharedSession) -> Self {
        Self { session }
    }

    /// Handles an IPC request and returns the appropriate response.
    pub async fn handle(&self, request: IpcRequest) -> IpcResponse {
        let mut session = self.session.lock().await;

        let result = match request {
            IpcRequest::Start { params } => Self::handle_start(&mut session, params),
            IpcRequest::Pause => session
                .engine
                .pause()
                .map(|()| "タイマーを一時停止しました")
                .map_err(|e| e.to_string()),
            IpcRequest::Resume => session
                .engine
                .resume()
                .map(|()| "タイマーを再開しました")
                .map_err(|e| e.to_string()),
            IpcRequest::Stop => session
                .engine
                .stop()
                .map(|()| "タイマーを停止しました")
                .map_err(|e| e.to_string()),
            IpcRequest::Reset { confirm } => session
                .engine
                .reset(confirm)
                .map(|()| "タイマーをリセットしました")
                .map_err(|e| e.to_string()),
            IpcRequest::Status => {
                session.engine.sync_from_bus();
                Ok("")
            }
            IpcRequest::CycleStart => {
                let Session { engine, cycle, .. } = &mut *session;
                cycle
                    .begin(engine)
                    .map(|_| "ポモドーロを開始しました")
                    .map_err(|e| e.to_string())
            }
            IpcRequest::CycleReset { confirm } => session
                .cycle
                .reset_history(confirm)
                .map(|()| "ポモドーロ履歴をリセットしました")
                .map_err(|e| e.to_string()),
            IpcRequest::Remind {
                session_id,
                starts_at_millis,
                lead_minutes,
            } => Self::reminders(&mut session).and_then(|scheduler| {
                scheduler
                    .schedule(Reminder {
                        session_id,
                        starts_at_millis,
                        lead_minutes,
                    })
                    .map(|()| "リマインダーを登録しました")
                    .map_err(|e| e.to_string())
            }),
            IpcRequest::CancelReminder { session_id } => {
                Self::reminders(&mut session).and_then(|scheduler| {
                    if scheduler.cancel(&session_id) {
                        Ok("リマインダーを取り消しました")
                    } else {
                        Err(format!("リマインダーが見つかりません: {session_id}"))
                    }
                })
            }
        };

        match result {
            Ok(message) => IpcResponse::success(message, Some(session.response_data())),
            Err(message) => IpcResponse::error(message),
        }
    }

    fn reminders(session: &mut Session) -> Result<&mut ReminderScheduler, String> {
        session
            .reminders
            .as_mut()
            .ok_or_else(|| "このDaemonではリマインダーを利用できません".to_string())
    }

    /// Handles the start command.
    ///
    /// A rejected start leaves the ceiling and the cycle untouched.
    fn handle_start(session: &mut Session, params: StartParams) -> Result<&'static str, String> {
        let engine = &mut session.engine;
        engine.sync_from_bus();
        let previous = engine.config().max_seconds;

        if let Some(max_seconds) = params.max_seconds {
            let phase = engine.phase();
            let startable = match phase {
                TimerPhase::Idle => true,
                TimerPhase::Paused => {
                    max_seconds.saturating_mul(1000) > engine.record().elapsed_millis
                }
                TimerPhase::Running | TimerPhase::Stopped => false,
            };
            if !startable {
                return Err(TimerError::InvalidTransition {
                    operation: "start",
                    phase,
                }
                .to_string());
            }
            engine
                .set_max_seconds(max_seconds)
                .map_err(|e| e.to_string())?;
        }

        if let Err(e) = engine.start() {
            if engine.config().max_seconds != previous {
                if let Err(restore) = engine.set_max_seconds(previous) {
                    tracing::warn!(error = %restore, "上限時間を元に戻せませんでした");
                }
            }
            return Err(e.to_string());
        }

        if let Err(e) = session.cycle.deactivate() {
            tracing::warn!(error = %e, "サイクル状態の保存に失敗しました");
        }
        Ok("タイマーを開始しました")
    }
}

// ============================================================================
// Tests
// ============================================================================
