//! JSON-RPC over a child process's stdio.
//!
//! The provider executable is spawned on first use and kept alive as a
//! persistent duplex channel. Requests are written as one JSON object per
//! line; a background reader task demultiplexes stdout lines by id into a
//! pending-request map, so several calls may be in flight over one process.
//! When the child exits every pending request fails with `ConnectFailure`
//! and the next request respawns it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::client::{RpcChannel, TransportSettings};
use super::envelope::{encode_line, encode_notification_line, extract_result, next_request_id};
use super::errors::TransportError;
use super::types::{
    error_codes, methods, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ProcessParams,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Protocol version announced in the `initialize` handshake.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Maximum stderr bytes retained for diagnostics.
const STDERR_TAIL_LIMIT: usize = 2000;

// ─── Pending Requests ────────────────────────────────────────────────────────

type PendingMap = Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes a request id from the pending map when the waiting future ends,
/// including when it is dropped by a caller-side timeout.
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.id);
    }
}

// ─── ProcessSession ──────────────────────────────────────────────────────────

/// One live child process with its stdio pair and background tasks.
struct ProcessSession {
    pid: Option<u32>,
    child: tokio::sync::Mutex<Child>,
    writer: tokio::sync::Mutex<ChildStdin>,
    pending: Arc<PendingMap>,
    alive: Arc<AtomicBool>,
    stderr_tail: Arc<Mutex<String>>,
    tasks: Vec<JoinHandle<()>>,
}

impl ProcessSession {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn stderr_suffix(&self) -> String {
        let tail = lock(&self.stderr_tail);
        if tail.trim().is_empty() {
            String::new()
        } else {
            format!(" | stderr: {}", tail.trim())
        }
    }

    async fn write_line(&self, provider: &str, line: &str) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        let result = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        }
        .await;

        result.map_err(|e| {
            self.alive.store(false, Ordering::Release);
            TransportError::connect(
                provider,
                format!("failed to write to stdin: {e}{}", self.stderr_suffix()),
            )
        })
    }

    async fn request(
        &self,
        provider: &str,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, TransportError> {
        let id = next_request_id();
        let line = encode_line(provider, &JsonRpcRequest::new(id, method, params))?;

        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        // The reader marks the session dead before draining the map, so a
        // waiter registered after the drain is caught here.
        if !self.is_alive() {
            return Err(TransportError::connect(
                provider,
                format!("process is not running{}", self.stderr_suffix()),
            ));
        }

        self.write_line(provider, &line).await?;

        rx.await.map_err(|_| {
            TransportError::connect(
                provider,
                format!(
                    "process exited before answering '{method}'{}",
                    self.stderr_suffix()
                ),
            )
        })
    }

    async fn notify(
        &self,
        provider: &str,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), TransportError> {
        let line = encode_notification_line(provider, &JsonRpcNotification::new(method, params))?;
        self.write_line(provider, &line).await
    }

    /// Ask the child to exit, then force-kill after `grace`.
    async fn terminate(&self, provider: &str, grace: Duration) {
        if self.is_alive() {
            let _ = self.notify(provider, methods::SHUTDOWN, None).await;
        }
        let mut child = self.child.lock().await;
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(provider, pid = ?self.pid, %status, "provider process exited");
            }
            _ => {
                tracing::warn!(provider, pid = ?self.pid, "provider did not exit in time, killing");
                let _ = child.kill().await;
            }
        }
        self.alive.store(false, Ordering::Release);
    }
}

impl Drop for ProcessSession {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

// ─── Background Tasks ────────────────────────────────────────────────────────

fn spawn_stdout_reader(
    provider: String,
    stdout: ChildStdout,
    pending: Arc<PendingMap>,
    alive: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stdout);
        let mut line_buf = String::new();

        loop {
            line_buf.clear();
            match reader.read_line(&mut line_buf).await {
                Ok(0) => {
                    tracing::debug!(provider = %provider, "provider stdout closed");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(provider = %provider, error = %e, "failed to read provider stdout");
                    break;
                }
            }

            let trimmed = line_buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            // Anything that is not a JSON-RPC message is treated as log noise.
            let Ok(message) = serde_json::from_str::<JsonRpcResponse>(trimmed) else {
                tracing::trace!(provider = %provider, line = %trimmed, "ignoring non-JSON stdout line");
                continue;
            };

            if let Some(method) = message.method.as_deref() {
                tracing::debug!(provider = %provider, method, "provider notification");
                continue;
            }

            let Some(id) = message.id else {
                continue;
            };

            let waiter = lock(&pending).remove(&id);
            match waiter {
                Some(tx) => {
                    let _ = tx.send(message);
                }
                None => {
                    tracing::debug!(provider = %provider, id, "dropping response with no waiter");
                }
            }
        }

        alive.store(false, Ordering::Release);
        // Dropping the senders wakes every waiter with a closed-channel error.
        lock(&pending).clear();
    })
}

fn spawn_stderr_drain(
    provider: String,
    stderr: ChildStderr,
    tail: Arc<Mutex<String>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    tracing::debug!(provider = %provider, stderr = %line.trim_end(), "provider stderr");
                    let mut buf = lock(&tail);
                    buf.push_str(&line);
                    if buf.len() > STDERR_TAIL_LIMIT {
                        let mut cut = buf.len() - STDERR_TAIL_LIMIT;
                        while !buf.is_char_boundary(cut) {
                            cut += 1;
                        }
                        buf.drain(..cut);
                    }
                }
            }
        }
    })
}

// ─── ProcessChannel ──────────────────────────────────────────────────────────

/// `RpcChannel` owning at most one provider process at a time.
pub struct ProcessChannel {
    provider_id: String,
    params: ProcessParams,
    init_timeout: Duration,
    shutdown_timeout: Duration,
    session: tokio::sync::Mutex<Option<Arc<ProcessSession>>>,
}

impl ProcessChannel {
    pub fn new(provider_id: &str, params: ProcessParams, settings: &TransportSettings) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            params,
            init_timeout: settings.init_timeout,
            shutdown_timeout: settings.shutdown_timeout,
            session: tokio::sync::Mutex::new(None),
        }
    }

    /// OS process id of the live child, if one is running.
    pub async fn pid(&self) -> Option<u32> {
        let guard = self.session.lock().await;
        guard.as_ref().filter(|s| s.is_alive()).and_then(|s| s.pid)
    }

    /// Return the live session, spawning (or respawning) as needed.
    async fn session(&self) -> Result<Arc<ProcessSession>, TransportError> {
        let mut guard = self.session.lock().await;

        if let Some(existing) = guard.as_ref() {
            if existing.is_alive() {
                return Ok(existing.clone());
            }
            tracing::warn!(
                provider = %self.provider_id,
                pid = ?existing.pid,
                "provider process is gone, respawning"
            );
            *guard = None;
        }

        let session = match tokio::time::timeout(self.init_timeout, self.spawn()).await {
            Ok(result) => Arc::new(result?),
            Err(_) => {
                return Err(TransportError::connect(
                    &self.provider_id,
                    format!(
                        "spawn and initialization timed out after {}ms",
                        self.init_timeout.as_millis()
                    ),
                ))
            }
        };
        *guard = Some(session.clone());
        Ok(session)
    }

    /// Spawn the child, start its background tasks and run the handshake.
    async fn spawn(&self) -> Result<ProcessSession, TransportError> {
        let provider = self.provider_id.as_str();

        let mut cmd = Command::new(&self.params.command);
        cmd.args(&self.params.args);
        for (key, value) in &self.params.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.params.cwd {
            cmd.current_dir(dir);
        }

        #[cfg(target_os = "windows")]
        {
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd.stdin(std::process::Stdio::piped());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            TransportError::connect(
                provider,
                format!("failed to spawn '{}': {e}", self.params.command),
            )
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::connect(provider, "failed to capture stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::connect(provider, "failed to capture stdout"))?;

        let pending: Arc<PendingMap> = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));
        let stderr_tail = Arc::new(Mutex::new(String::new()));

        let mut tasks = vec![spawn_stdout_reader(
            provider.to_string(),
            stdout,
            pending.clone(),
            alive.clone(),
        )];
        if let Some(stderr) = child.stderr.take() {
            tasks.push(spawn_stderr_drain(
                provider.to_string(),
                stderr,
                stderr_tail.clone(),
            ));
        }

        let pid = child.id();
        let session = ProcessSession {
            pid,
            child: tokio::sync::Mutex::new(child),
            writer: tokio::sync::Mutex::new(stdin),
            pending,
            alive,
            stderr_tail,
            tasks,
        };

        initialize(provider, &session).await?;

        tracing::info!(
            provider,
            pid = ?pid,
            command = %self.params.command,
            "provider process started"
        );
        Ok(session)
    }
}

/// Perform the `initialize` handshake.
///
/// Providers that answer "method not found" speak plain JSON-RPC and are
/// accepted without a handshake.
async fn initialize(provider: &str, session: &ProcessSession) -> Result<(), TransportError> {
    let params = serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": "toolbridge",
            "version": env!("CARGO_PKG_VERSION"),
        },
    });

    let response = session
        .request(provider, methods::INITIALIZE, Some(params))
        .await?;

    match extract_result(provider, response) {
        Ok(result) => {
            let server_name = result
                .pointer("/serverInfo/name")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            tracing::debug!(provider, server_name, "initialize handshake complete");
            session
                .notify(provider, methods::INITIALIZED, None)
                .await
        }
        Err(e) if e.rpc_code() == Some(error_codes::METHOD_NOT_FOUND) => {
            tracing::debug!(provider, "provider has no initialize method, skipping handshake");
            Ok(())
        }
        Err(e) => Err(TransportError::connect(
            provider,
            format!("initialization failed: {e}{}", session.stderr_suffix()),
        )),
    }
}

#[async_trait]
impl RpcChannel for ProcessChannel {
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, TransportError> {
        let exchange = async {
            let session = self.session().await?;
            session.request(&self.provider_id, method, params).await
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| {
                TransportError::timeout(&self.provider_id, method, timeout.as_millis() as u64)
            })?
    }

    async fn close(&self) {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            session
                .terminate(&self.provider_id, self.shutdown_timeout)
                .await;
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
