//! Command sessions: spawn, poll, terminate, list and reap.
//!
//! Each spawned command gets one [`Session`] record keyed by its pid. The
//! record is owned by the engine's registry; the background tasks that read
//! the child's output and wait for its exit only ever touch it through the
//! registry lock, and only while the record they were started for (checked
//! by generation) is still registered.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use shellgate_policy::{CommandGate, Operation, PathGate};
use shellgate_telemetry::EventLog;

use crate::error::{ToolError, ToolOutcome};

/// Exit code reported for killed sessions and for processes that ended
/// without one.
pub const KILLED_EXIT_CODE: i32 = -1;

/// How long to keep collecting output after the process exits while
/// something else still holds its pipes open.
const STREAM_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Read buffer size for the output pumps.
const READ_CHUNK: usize = 8192;

/// Tunables for the session engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Wait used by `execute` when the caller gives none.
    pub default_timeout: Duration,
    /// Upper bound on a caller-supplied wait.
    pub max_timeout: Duration,
    /// How long a finished session stays readable.
    pub retention: Duration,
    /// Period of the background sweep.
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_millis(1000),
            max_timeout: Duration::from_millis(600_000),
            retention: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(300),
        }
    }
}

impl SessionConfig {
    /// The wait to use for a caller-requested timeout.
    #[must_use]
    pub fn clamp_timeout(&self, requested_ms: Option<u64>) -> Duration {
        requested_ms
            .map_or(self.default_timeout, Duration::from_millis)
            .min(self.max_timeout)
    }
}

/// Lifecycle state of a session. Terminal states never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    /// The process is running, or has exited but its output is still being
    /// collected.
    Running,
    /// The process exited on its own.
    Exited {
        /// Exit code, [`KILLED_EXIT_CODE`] when ended by a signal.
        code: i32,
    },
    /// The process was terminated through [`SessionEngine::force_terminate`].
    Killed,
}

impl SessionStatus {
    /// Whether the session is still running.
    #[must_use]
    pub fn is_running(self) -> bool {
        self == Self::Running
    }

    /// Exit code of a terminal session.
    #[must_use]
    pub fn exit_code(self) -> Option<i32> {
        match self {
            Self::Running => None,
            Self::Exited { code } => Some(code),
            Self::Killed => Some(KILLED_EXIT_CODE),
        }
    }
}

type KillReply = oneshot::Sender<std::io::Result<()>>;

#[derive(Debug)]
struct Session {
    generation: u64,
    command: String,
    output: String,
    status: SessionStatus,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    control: mpsc::Sender<KillReply>,
}

impl Session {
    fn finish(&mut self, status: SessionStatus) {
        if self.status.is_running() {
            self.status = status;
            self.ended_at = Some(Utc::now());
        }
    }

    fn info(&self, pid: u32) -> SessionInfo {
        SessionInfo {
            pid,
            command: self.command.clone(),
            is_running: self.status.is_running(),
            exit_code: self.status.exit_code(),
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }
}

/// Point-in-time view of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Process id.
    pub pid: u32,
    /// Command as run, after alias substitution.
    pub command: String,
    /// Whether the session is still running.
    pub is_running: bool,
    /// Exit code once terminal.
    pub exit_code: Option<i32>,
    /// Spawn time.
    pub started_at: DateTime<Utc>,
    /// Time the session became terminal.
    pub ended_at: Option<DateTime<Utc>>,
}

/// What `execute` saw before returning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteOutcome {
    /// Process id, the handle for follow-up calls.
    pub pid: u32,
    /// Command as run, after alias substitution.
    pub command: String,
    /// Output produced so far. Drained from the session buffer.
    pub output: String,
    /// State when the call returned.
    pub status: SessionStatus,
}

/// Output drained by `read_output`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    /// Process id.
    pub pid: u32,
    /// Command as run.
    pub command: String,
    /// Output since the previous read.
    pub output: String,
    /// Current state.
    pub status: SessionStatus,
}

/// Result of a termination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    /// A kill was delivered and the session is now `Killed`.
    Terminated,
    /// The session was already terminal; nothing was sent.
    AlreadyFinished(SessionStatus),
}

type Registry = Arc<Mutex<HashMap<u32, Session>>>;

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<u32, Session>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns every command session.
pub struct SessionEngine {
    sessions: Registry,
    next_generation: AtomicU64,
    commands: CommandGate,
    paths: PathGate,
    events: Arc<EventLog>,
    config: SessionConfig,
}

impl std::fmt::Debug for SessionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEngine")
            .field("sessions", &lock(&self.sessions).len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionEngine {
    /// Create an engine that checks commands with `commands` and working
    /// directories with `paths`.
    #[must_use]
    pub fn new(commands: CommandGate, paths: PathGate, config: SessionConfig) -> Self {
        let events = Arc::clone(paths.store().events());
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
            commands,
            paths,
            events,
            config,
        }
    }

    /// Engine tunables.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Spawn `command` through the platform shell and wait up to `timeout`
    /// for it to finish.
    ///
    /// The blocklist is checked against the command as given; the alias is
    /// substituted afterwards. `cwd`, when set, must be a directory the
    /// policy grants execute on. Returns as soon as the process finishes or
    /// the wait elapses, whichever comes first; in the latter case the
    /// session keeps running and is polled with [`read_output`](Self::read_output).
    ///
    /// # Errors
    ///
    /// Policy denials, a blank command, or a shell that fails to start.
    pub async fn execute(
        &self,
        command: &str,
        timeout: Duration,
        cwd: Option<&str>,
    ) -> ToolOutcome<ExecuteOutcome> {
        self.commands.check(command)?;
        let workdir = cwd
            .map(|dir| self.paths.validate(dir, Operation::Execute))
            .transpose()?
            .map(|decision| decision.path);
        let resolved = self.commands.resolve(command);

        let (pid, generation, done) = self.spawn(&resolved, workdir)?;

        let finished = tokio::time::timeout(timeout, done).await.is_ok();
        debug!(pid, finished, "execute wait ended");

        let mut sessions = lock(&self.sessions);
        let outcome = match sessions.get_mut(&pid) {
            Some(session) if session.generation == generation => ExecuteOutcome {
                pid,
                command: session.command.clone(),
                output: std::mem::take(&mut session.output),
                status: session.status,
            },
            // Reaped by a sweep before we looked.
            _ => ExecuteOutcome {
                pid,
                command: resolved,
                output: String::new(),
                status: SessionStatus::Exited {
                    code: KILLED_EXIT_CODE,
                },
            },
        };
        Ok(outcome)
    }

    fn spawn(
        &self,
        command: &str,
        workdir: Option<PathBuf>,
    ) -> ToolOutcome<(u32, u64, oneshot::Receiver<()>)> {
        let spawn_failed = |source| ToolError::SpawnFailed {
            command: command.to_string(),
            source,
        };

        let mut cmd = shell_command(command);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &workdir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(spawn_failed)?;
        let pid = child.id().ok_or_else(|| {
            spawn_failed(std::io::Error::other("process exited before its pid was read"))
        })?;
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let (control, control_rx) = mpsc::channel(4);
        let (done_tx, done_rx) = oneshot::channel();

        {
            let mut sessions = lock(&self.sessions);
            // A registered pid can only come back once its child was reaped,
            // so whatever is still filed under it is stale.
            if let Some(stale) = sessions.remove(&pid) {
                warn!(pid, command = %stale.command, "pid reused, evicting stale session");
            }
            sessions.insert(
                pid,
                Session {
                    generation,
                    command: command.to_string(),
                    output: String::new(),
                    status: SessionStatus::Running,
                    started_at: Utc::now(),
                    ended_at: None,
                    control,
                },
            );
        }

        info!(pid, command, "spawned command");
        self.events.command(pid, command);

        let stdout = child.stdout.take().map(|out| {
            tokio::spawn(pump(out, Arc::clone(&self.sessions), pid, generation))
        });
        let stderr = child.stderr.take().map(|err| {
            tokio::spawn(pump(err, Arc::clone(&self.sessions), pid, generation))
        });

        tokio::spawn(monitor(
            child,
            control_rx,
            [stdout, stderr],
            Arc::clone(&self.sessions),
            pid,
            generation,
            done_tx,
        ));

        Ok((pid, generation, done_rx))
    }

    /// Take the output buffered since the last read.
    ///
    /// # Errors
    ///
    /// [`ToolError::SessionNotFound`] if no session has that pid.
    pub fn read_output(&self, pid: u32) -> ToolOutcome<OutputChunk> {
        let mut sessions = lock(&self.sessions);
        let session = sessions
            .get_mut(&pid)
            .ok_or(ToolError::SessionNotFound(pid))?;
        Ok(OutputChunk {
            pid,
            command: session.command.clone(),
            output: std::mem::take(&mut session.output),
            status: session.status,
        })
    }

    /// Ask the session's process to die and mark the session `Killed`.
    ///
    /// Best effort: the process may ignore the request or may already have
    /// exited. A session that is already terminal is left as it is.
    ///
    /// # Errors
    ///
    /// [`ToolError::SessionNotFound`] for an unknown pid and
    /// [`ToolError::SignalFailed`] if the kill could not be delivered, in
    /// which case the session keeps its last known state.
    pub async fn force_terminate(&self, pid: u32) -> ToolOutcome<TerminateOutcome> {
        let (generation, control) = {
            let sessions = lock(&self.sessions);
            let session = sessions.get(&pid).ok_or(ToolError::SessionNotFound(pid))?;
            if !session.status.is_running() {
                return Ok(TerminateOutcome::AlreadyFinished(session.status));
            }
            (session.generation, session.control.clone())
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        if control.send(reply_tx).await.is_err() {
            return Ok(self.already_finished(pid));
        }

        match reply_rx.await {
            Ok(Ok(())) => {
                if let Some(session) = lock(&self.sessions).get_mut(&pid)
                    && session.generation == generation
                {
                    session.finish(SessionStatus::Killed);
                }
                info!(pid, "terminated session");
                self.events
                    .diagnostic(&format!("terminated process with PID: {pid}"));
                Ok(TerminateOutcome::Terminated)
            },
            Ok(Err(source)) => {
                warn!(pid, error = %source, "failed to deliver kill");
                Err(ToolError::SignalFailed { pid, source })
            },
            // The child was reaped while the request was in flight.
            Err(_) => Ok(self.already_finished(pid)),
        }
    }

    fn already_finished(&self, pid: u32) -> TerminateOutcome {
        let status = lock(&self.sessions)
            .get(&pid)
            .map_or(SessionStatus::Exited { code: KILLED_EXIT_CODE }, |s| s.status);
        TerminateOutcome::AlreadyFinished(status)
    }

    /// Snapshot of every registered session, oldest first.
    #[must_use]
    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        let mut listed: Vec<SessionInfo> = lock(&self.sessions)
            .iter()
            .map(|(pid, session)| session.info(*pid))
            .collect();
        listed.sort_by_key(|s| (s.started_at, s.pid));
        listed
    }

    /// Evict sessions that have been terminal for longer than the retention
    /// window. Returns how many were evicted.
    pub fn cleanup(&self) -> usize {
        let retention =
            chrono::Duration::from_std(self.config.retention).unwrap_or(chrono::Duration::MAX);
        let mut sessions = lock(&self.sessions);
        // Taken under the lock: nothing can turn terminal mid-sweep.
        let now = Utc::now();

        let before = sessions.len();
        sessions.retain(|pid, session| {
            let expired = session
                .ended_at
                .is_some_and(|ended| now.signed_duration_since(ended) > retention);
            if expired {
                debug!(pid, command = %session.command, "evicting finished session");
            }
            !expired
        });
        before.saturating_sub(sessions.len())
    }

    /// Run [`cleanup`](Self::cleanup) every `sweep_interval` until the
    /// engine is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::downgrade(self);
        let period = self.config.sweep_interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                let evicted = engine.cleanup();
                if evicted > 0 {
                    debug!(evicted, "session sweep");
                }
            }
        })
    }
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[cfg(not(windows))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

/// Copy one output stream into the session buffer until it closes.
async fn pump(mut stream: impl AsyncRead + Unpin, sessions: Registry, pid: u32, generation: u64) {
    let mut buf = vec![0u8; READ_CHUNK];
    let mut decoder = Utf8Decoder::default();

    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let Some(chunk) = buf.get(..n) else { break };
                append(&sessions, pid, generation, &decoder.push(chunk));
            },
            Err(e) => {
                debug!(pid, error = %e, "output stream read failed");
                break;
            },
        }
    }
    append(&sessions, pid, generation, &decoder.finish());
}

fn append(sessions: &Registry, pid: u32, generation: u64, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(session) = lock(sessions).get_mut(&pid)
        && session.generation == generation
        && session.status.is_running()
    {
        session.output.push_str(text);
    }
}

/// Own the child: serve kill requests until it exits, then let the pumps
/// finish and mark the session exited.
async fn monitor(
    mut child: Child,
    mut control: mpsc::Receiver<KillReply>,
    pumps: [Option<JoinHandle<()>>; 2],
    sessions: Registry,
    pid: u32,
    generation: u64,
    done: oneshot::Sender<()>,
) {
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            Some(reply) = control.recv() => {
                let _ = reply.send(child.start_kill());
            },
        }
    };
    // Refuse further kill requests; the pid may be reused from here on.
    drop(control);

    let code = match status {
        Ok(status) => status.code().unwrap_or(KILLED_EXIT_CODE),
        Err(e) => {
            warn!(pid, error = %e, "failed to wait for child");
            KILLED_EXIT_CODE
        },
    };

    for pump in pumps.into_iter().flatten() {
        let abort = pump.abort_handle();
        if tokio::time::timeout(STREAM_DRAIN_GRACE, pump).await.is_err() {
            debug!(pid, "output stream still open after exit, detaching");
            abort.abort();
        }
    }

    if let Some(session) = lock(&sessions).get_mut(&pid)
        && session.generation == generation
    {
        session.finish(SessionStatus::Exited { code });
    }
    debug!(pid, code, "command exited");
    let _ = done.send(());
}

/// Incremental UTF-8 decoder that holds back a multi-byte sequence split
/// across reads.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn push(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                },
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(
                        self.pending.get(..valid).unwrap_or_default(),
                    ));
                    match e.error_len() {
                        // Incomplete trailing sequence: keep it for the next read.
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        },
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid.saturating_add(len));
                        },
                    }
                },
            }
        }
    }

    fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}
