//! PTY session management for driving terminal applications.
//!
//! [`Session`] owns one application process attached to a pseudo-terminal. A
//! dedicated reader thread performs the blocking PTY reads and hands chunks to
//! the control thread over a channel, so every control-thread operation is
//! bounded in time:
//!
//! - [`Session::spawn`] starts the process, optionally waiting for first output
//! - [`Session::send`] writes keystrokes in issue order
//! - [`Session::drain`] performs one bounded wait for output and appends it to the buffer
//! - [`Session::is_alive`] checks liveness without consuming output
//! - [`Session::terminate`] sends SIGTERM, then SIGKILL after a grace period, and releases the PTY
//!
//! # Example
//!
//! ```no_run
//! use ptycheck::model::Key;
//! use ptycheck::session::{Session, SessionConfig};
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), ptycheck::HarnessError> {
//! let mut session = Session::spawn(SessionConfig::new("/bin/cat"))?;
//! session.send_text("hello")?;
//! session.send_key(Key::Enter)?;
//! session.drain_until_quiet(64 * 1024, Duration::from_millis(200), Duration::from_secs(1))?;
//! println!("{:?}", session.snapshot(10_000).lines);
//! session.terminate(Duration::from_millis(500))?;
//! # Ok(())
//! # }
//! ```
//!
//! Dropping a session that was never terminated performs a best-effort
//! SIGTERM/SIGKILL of its process group.

use crate::buffer::{OutputBuffer, DEFAULT_RETENTION_CHARS};
use crate::error::{HarnessError, HarnessResult};
use crate::model::{EmulatedScreen, Key, ScreenSnapshot, SessionId, TerminalSize};
use crate::normalize::normalize;
use crate::process::{duration_ms, poll_until, signal_group, Teardown};
use crate::terminal::Terminal;
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const READ_CHUNK: usize = 4096;
const EXIT_POLL: Duration = Duration::from_millis(10);
const KILL_WAIT: Duration = Duration::from_millis(500);
const DROP_GRACE: Duration = Duration::from_millis(100);

/// Configuration for spawning a session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Executable to run (absolute path recommended).
    pub command: String,
    /// Command arguments.
    pub args: Vec<String>,
    /// Working directory; inherited when `None`.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables layered over the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Initial terminal size.
    pub size: TerminalSize,
    /// Fail the spawn unless output arrives within this window.
    pub startup_timeout: Option<Duration>,
    /// Output buffer retention ceiling, in characters.
    pub retention_chars: usize,
}

impl SessionConfig {
    /// Defaults for everything except the command.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            size: TerminalSize::default(),
            startup_timeout: None,
            retention_chars: DEFAULT_RETENTION_CHARS,
        }
    }
}

/// How a session's process ended.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitInfo {
    /// Exit code, when the process was reaped.
    pub exit_code: Option<u32>,
    pub success: bool,
    /// Whether the harness had to signal the process to end it.
    pub terminated_by_harness: bool,
}

impl ExitInfo {
    fn from_status(status: &portable_pty::ExitStatus, terminated_by_harness: bool) -> Self {
        Self {
            exit_code: Some(status.exit_code()),
            success: status.success(),
            terminated_by_harness,
        }
    }
}

/// A PTY-backed session for driving a terminal application.
pub struct Session {
    session_id: SessionId,
    command: String,
    master: Option<Box<dyn MasterPty + Send>>,
    writer: Option<Box<dyn Write + Send>>,
    child: Box<dyn Child + Send + Sync>,
    chunks: Receiver<Vec<u8>>,
    carry: Vec<u8>,
    buffer: OutputBuffer,
    terminal: Terminal,
    started_at: Instant,
    eof: bool,
    exit: Option<ExitInfo>,
    terminated: Option<ExitInfo>,
}

impl Session {
    /// Spawn a new PTY session with the given configuration.
    ///
    /// # Errors
    /// `E_SPAWN` when the executable or working directory is invalid, the PTY
    /// cannot be opened, the process cannot start, or (with a startup timeout)
    /// no output arrives in time. `E_CAPABILITY` is never returned here; use
    /// [`crate::suite::check_pty_capability`] to probe for PTY support up front.
    pub fn spawn(config: SessionConfig) -> HarnessResult<Self> {
        validate_spawn_target(&config)?;

        let system = native_pty_system();
        let pair = system
            .openpty(PtySize {
                rows: config.size.rows,
                cols: config.size.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|err| spawn_error("failed to open pty", &config, err))?;

        let mut cmd = CommandBuilder::new(&config.command);
        cmd.args(&config.args);
        if let Some(cwd) = &config.cwd {
            cmd.cwd(cwd);
        }
        if std::env::var_os("TERM").is_none() && !config.env.contains_key("TERM") {
            cmd.env("TERM", "xterm-256color");
        }
        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|err| spawn_error("failed to spawn command", &config, err))?;
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|err| HarnessError::io("failed to clone pty reader", err))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|err| HarnessError::io("failed to take pty writer", err))?;
        let chunks = spawn_reader(reader)?;

        debug!(
            command = %config.command,
            args = ?config.args,
            pid = ?child.process_id(),
            "spawned pty session"
        );

        let mut session = Self {
            session_id: SessionId::new(),
            command: config.command.clone(),
            master: Some(pair.master),
            writer: Some(writer),
            child,
            chunks,
            carry: Vec::new(),
            buffer: OutputBuffer::new(config.retention_chars),
            terminal: Terminal::new(config.size),
            started_at: Instant::now(),
            eof: false,
            exit: None,
            terminated: None,
        };

        if let Some(timeout) = config.startup_timeout {
            session.await_first_output(timeout, &config)?;
        }
        Ok(session)
    }

    fn await_first_output(
        &mut self,
        timeout: Duration,
        config: &SessionConfig,
    ) -> HarnessResult<()> {
        match self.chunks.recv_timeout(timeout) {
            Ok(chunk) => self.ingest(&chunk),
            Err(reason) => {
                let detail = match reason {
                    RecvTimeoutError::Timeout => "no output within startup timeout",
                    RecvTimeoutError::Disconnected => "process closed the terminal without output",
                };
                let exit = self.terminate(KILL_WAIT).ok();
                Err(HarnessError::spawn(
                    format!("{} failed to start: {detail}", config.command),
                    serde_json::json!({
                        "command": config.command,
                        "args": config.args,
                        "startup_timeout_ms": duration_ms(timeout),
                        "exit": exit,
                    }),
                ))
            }
        }
    }

    /// Write raw bytes to the application's input, in order.
    ///
    /// # Errors
    /// - `E_UNEXPECTED_EXIT`: the process exited, closed its terminal, or was terminated
    /// - `E_WRITE`: the write itself failed
    pub fn send(&mut self, bytes: &[u8]) -> HarnessResult<()> {
        if self.terminated.is_some() {
            return Err(HarnessError::unexpected_exit(
                "session was already terminated",
                None,
            ));
        }
        if self.eof || !self.is_alive() {
            return Err(HarnessError::unexpected_exit(
                format!("{} exited before input could be delivered", self.command),
                serde_json::json!({ "exit": self.exit }),
            ));
        }
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| HarnessError::internal("pty writer already released"))?;
        writer
            .write_all(bytes)
            .map_err(|err| HarnessError::write("failed to write to pty", err))?;
        writer
            .flush()
            .map_err(|err| HarnessError::write("failed to flush pty", err))
    }

    /// Send one named key.
    pub fn send_key(&mut self, key: Key) -> HarnessResult<()> {
        self.send(&key.to_bytes())
    }

    /// Send literal text.
    pub fn send_text(&mut self, text: &str) -> HarnessResult<()> {
        self.send(text.as_bytes())
    }

    /// One bounded-time read attempt.
    ///
    /// Waits at most `poll_timeout` for the first chunk, then takes whatever else
    /// is already available, up to `max_bytes`. Returns the number of bytes
    /// appended to the buffer; zero is the normal idle result.
    ///
    /// # Errors
    /// `E_INTERNAL` if output arrives after the buffer was sealed.
    pub fn drain(&mut self, max_bytes: usize, poll_timeout: Duration) -> HarnessResult<usize> {
        if max_bytes == 0 || (self.eof && self.carry.is_empty()) {
            return Ok(0);
        }

        let mut out = std::mem::take(&mut self.carry);
        if out.is_empty() {
            match self.chunks.recv_timeout(poll_timeout) {
                Ok(chunk) => out = chunk,
                Err(RecvTimeoutError::Timeout) => return Ok(0),
                Err(RecvTimeoutError::Disconnected) => {
                    self.mark_eof();
                    return Ok(0);
                }
            }
        }
        while out.len() < max_bytes {
            match self.chunks.try_recv() {
                Ok(chunk) => out.extend_from_slice(&chunk),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.eof = true;
                    break;
                }
            }
        }
        if out.len() > max_bytes {
            self.carry = out.split_off(max_bytes);
        }

        self.ingest(&out)?;
        if self.eof && self.carry.is_empty() {
            self.mark_eof();
        }
        Ok(out.len())
    }

    /// Drain repeatedly until a poll comes back empty, `max_bytes` were read,
    /// or `window` has passed.
    ///
    /// Applications that repaint on a timer are never quiet; `window` is what
    /// ends the observation for them.
    pub fn drain_until_quiet(
        &mut self,
        max_bytes: usize,
        poll_timeout: Duration,
        window: Duration,
    ) -> HarnessResult<usize> {
        let deadline = Instant::now() + window;
        let mut total = 0;
        while total < max_bytes {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let read = self.drain(max_bytes - total, poll_timeout.min(remaining))?;
            if read == 0 {
                break;
            }
            total += read;
        }
        Ok(total)
    }

    /// Non-blocking liveness check. Does not consume output.
    pub fn is_alive(&mut self) -> bool {
        if self.exit.is_some() || self.terminated.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!(exit_code = status.exit_code(), "pty child exited");
                self.exit = Some(ExitInfo::from_status(&status, false));
                false
            }
            Ok(None) => true,
            Err(err) => {
                debug!(error = %err, "pty child wait failed; treating as exited");
                self.exit = Some(ExitInfo::default());
                false
            }
        }
    }

    /// Wait up to `timeout` for the process to exit on its own.
    pub fn wait_for_exit(&mut self, timeout: Duration) -> HarnessResult<Option<ExitInfo>> {
        poll_until(timeout, EXIT_POLL, || {
            Ok((!self.is_alive()).then(|| self.exit.clone().unwrap_or_default()))
        })
    }

    /// Tear the session down: SIGTERM to the process group, SIGKILL after
    /// `grace`, then release the PTY and seal the buffer.
    ///
    /// Idempotent; later calls return the first call's result.
    ///
    /// # Errors
    /// `E_IO` if the process group cannot be signalled.
    pub fn terminate(&mut self, grace: Duration) -> HarnessResult<ExitInfo> {
        if let Some(done) = &self.terminated {
            return Ok(done.clone());
        }

        let info = if self.is_alive() {
            self.stop_process(grace)?
        } else {
            self.exit.clone().unwrap_or_default()
        };

        self.collect_pending();
        self.buffer.seal();
        self.writer = None;
        self.master = None;
        debug!(session_id = %self.session_id, exit = ?info, "pty session terminated");
        self.terminated = Some(info.clone());
        Ok(info)
    }

    fn stop_process(&mut self, grace: Duration) -> HarnessResult<ExitInfo> {
        let Some(pid) = self.child.process_id() else {
            self.child
                .kill()
                .map_err(|err| HarnessError::io("failed to kill child", err))?;
            return Ok(self.reap(KILL_WAIT)?.unwrap_or_default());
        };

        signal_group(pid, Teardown::Terminate)?;
        if let Some(info) = self.reap(grace)? {
            return Ok(info);
        }
        warn!(pid, "application ignored SIGTERM; sending SIGKILL");
        signal_group(pid, Teardown::Kill)?;
        Ok(self.reap(KILL_WAIT)?.unwrap_or(ExitInfo {
            exit_code: None,
            success: false,
            terminated_by_harness: true,
        }))
    }

    fn reap(&mut self, timeout: Duration) -> HarnessResult<Option<ExitInfo>> {
        let exited = self.wait_for_exit(timeout)?;
        Ok(exited.map(|info| {
            let info = ExitInfo {
                terminated_by_harness: true,
                ..info
            };
            self.exit = Some(info.clone());
            info
        }))
    }

    /// Resize the PTY and the emulated grid.
    ///
    /// # Errors
    /// `E_UNEXPECTED_EXIT` after termination, `E_IO` if the resize ioctl fails.
    pub fn resize(&mut self, size: TerminalSize) -> HarnessResult<()> {
        let master = self
            .master
            .as_ref()
            .ok_or_else(|| HarnessError::unexpected_exit("session was already terminated", None))?;
        master
            .resize(PtySize {
                rows: size.rows,
                cols: size.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|err| HarnessError::io("failed to resize pty", err))?;
        self.terminal.resize(size);
        Ok(())
    }

    /// Linearized view of the last `window_chars` characters of output.
    pub fn snapshot(&self, window_chars: usize) -> ScreenSnapshot {
        ScreenSnapshot {
            window_chars,
            lines: normalize(self.buffer.tail(window_chars)),
        }
    }

    /// Grid view from the terminal emulator.
    pub fn emulated_screen(&self) -> EmulatedScreen {
        self.terminal.screen()
    }

    pub fn buffer(&self) -> &OutputBuffer {
        &self.buffer
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Exit details, once the process has been seen to exit.
    pub fn exit_info(&self) -> Option<&ExitInfo> {
        self.terminated.as_ref().or(self.exit.as_ref())
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    fn ingest(&mut self, bytes: &[u8]) -> HarnessResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.buffer.append(bytes)?;
        self.terminal.process_bytes(bytes);
        Ok(())
    }

    fn mark_eof(&mut self) {
        self.eof = true;
        if !self.buffer.is_sealed() {
            debug!(session_id = %self.session_id, "pty reached end of output");
            self.buffer.seal();
        }
    }

    /// Move anything already received into the buffer without waiting.
    fn collect_pending(&mut self) {
        if self.buffer.is_sealed() {
            return;
        }
        let mut rest = std::mem::take(&mut self.carry);
        while let Ok(chunk) = self.chunks.try_recv() {
            rest.extend_from_slice(&chunk);
        }
        if let Err(err) = self.ingest(&rest) {
            debug!(error = %err, "dropping output received during teardown");
        }
    }

    fn cleanup_best_effort(&mut self) {
        let Some(pid) = self.child.process_id() else {
            let _ = self.child.kill();
            return;
        };
        if self.child.try_wait().ok().flatten().is_some() {
            return;
        }
        let _ = signal_group(pid, Teardown::Terminate);
        let exited = poll_until(DROP_GRACE, Duration::from_millis(5), || {
            Ok(self.child.try_wait().ok().flatten())
        });
        if !matches!(exited, Ok(Some(_))) {
            let _ = signal_group(pid, Teardown::Kill);
        }
    }
}

impl Drop for Session {
    /// Best-effort SIGTERM/SIGKILL of a session that was never terminated.
    fn drop(&mut self) {
        if self.terminated.is_none() {
            self.cleanup_best_effort();
        }
    }
}

fn validate_spawn_target(config: &SessionConfig) -> HarnessResult<()> {
    if config.command.trim().is_empty() {
        return Err(spawn_error("empty command", config, "no executable given"));
    }
    if config.command.contains('/') && !Path::new(&config.command).is_file() {
        return Err(spawn_error(
            "executable not found",
            config,
            format!("{} does not exist", config.command),
        ));
    }
    if let Some(cwd) = &config.cwd {
        if !cwd.is_dir() {
            return Err(spawn_error(
                "working directory is not a directory",
                config,
                cwd.display(),
            ));
        }
    }
    Ok(())
}

fn spawn_error(
    message: &str,
    config: &SessionConfig,
    err: impl std::fmt::Display,
) -> HarnessError {
    HarnessError::spawn(
        message,
        serde_json::json!({
            "command": config.command,
            "args": config.args,
            "cwd": config.cwd,
            "source": err.to_string(),
        }),
    )
}

fn spawn_reader(mut reader: Box<dyn Read + Send>) -> HarnessResult<Receiver<Vec<u8>>> {
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("ptycheck-pty-reader".to_string())
        .spawn(move || {
            let mut chunk = [0u8; READ_CHUNK];
            loop {
                match reader.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(count) => {
                        let data = chunk.get(..count).unwrap_or_default().to_vec();
                        if tx.send(data).is_err() {
                            break;
                        }
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
                    // EIO once the child side closes
                    Err(_) => break,
                }
            }
        })
        .map_err(|err| HarnessError::io("failed to start pty reader thread", err))?;
    Ok(rx)
}
