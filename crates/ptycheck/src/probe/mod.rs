//! One-shot invocations of the application's non-interactive surface.
//!
//! Probes run the program with piped stdout/stderr (no PTY) in its own process
//! group, with a hard timeout. The output is then checked with [`JsonExpect`]
//! or [`StdoutCheck`], and chained probes feed an id picked by
//! [`select_min_by`] from one probe into the next.

mod chain;
mod shape;

pub use chain::{select_min_by, substitute_id, ChainSelect, ID_PLACEHOLDER};
pub(crate) use shape::clip;
pub use shape::{validate_json_shape, ItemRule, JsonExpect, StdoutCheck};

use crate::error::{HarnessError, HarnessResult};
use crate::process::{duration_ms, poll_until, signal_group, Teardown};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const EXIT_POLL: Duration = Duration::from_millis(10);
const REAP_WAIT: Duration = Duration::from_secs(2);

/// Where and how the application is launched for probes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProbeTarget {
    pub program: String,
    /// Arguments placed before every probe's own (e.g. `--cli`).
    pub cli_prefix: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl ProbeTarget {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }
}

/// Captured result of one probe.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOutput {
    /// Probe arguments, without the target's prefix.
    pub args: Vec<String>,
    /// `None` when the process was ended by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl ProbeOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Run `target.program [cli_prefix...] args` to completion.
///
/// # Errors
/// `E_SPAWN` if the program or working directory is unusable,
/// `E_PROBE_TIMEOUT` if it runs longer than `timeout` (the process group is
/// killed first), `E_IO` on other OS failures.
pub fn probe(
    target: &ProbeTarget,
    args: &[String],
    timeout: Duration,
) -> HarnessResult<ProbeOutput> {
    let started = Instant::now();
    let mut child = spawn(target, args)?;
    let pid = child.id();
    debug!(pid, program = %target.program, ?args, "probe spawned");

    let stdout = child.stdout.take().map(read_to_end);
    let stderr = child.stderr.take().map(read_to_end);

    let status = poll_until(timeout, EXIT_POLL, || {
        child
            .try_wait()
            .map_err(|err| HarnessError::io("failed to poll probe process", err))
    });
    let status = match status {
        Ok(Some(status)) => status,
        Ok(None) => {
            warn!(
                pid,
                timeout_ms = duration_ms(timeout),
                "probe timed out; killing process group"
            );
            kill_and_reap(&mut child, pid);
            join(stdout);
            join(stderr);
            return Err(HarnessError::probe_timeout(
                format!("probe exceeded {}ms", duration_ms(timeout)),
                serde_json::json!({ "args": args, "timeout_ms": duration_ms(timeout) }),
            ));
        }
        Err(err) => {
            kill_and_reap(&mut child, pid);
            join(stdout);
            join(stderr);
            return Err(err);
        }
    };

    // anything the program forked may still hold the pipes open
    let _ = signal_group(pid, Teardown::Kill);
    let output = ProbeOutput {
        args: args.to_vec(),
        exit_code: status.code(),
        stdout: join(stdout),
        stderr: join(stderr),
        duration_ms: duration_ms(started.elapsed()),
    };
    debug!(
        exit_code = ?output.exit_code,
        stdout_len = output.stdout.len(),
        duration_ms = output.duration_ms,
        "probe finished"
    );
    Ok(output)
}

fn spawn(target: &ProbeTarget, args: &[String]) -> HarnessResult<Child> {
    let context = || {
        serde_json::json!({ "program": target.program, "args": args, "cwd": target.cwd })
    };
    if target.program.trim().is_empty() {
        return Err(HarnessError::spawn("empty probe program", context()));
    }
    if let Some(cwd) = &target.cwd {
        if !cwd.is_dir() {
            return Err(HarnessError::spawn(
                format!("working directory {} is not a directory", cwd.display()),
                context(),
            ));
        }
    }

    let mut command = Command::new(&target.program);
    command
        .args(&target.cli_prefix)
        .args(args)
        .envs(&target.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = &target.cwd {
        command.current_dir(cwd);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    command.spawn().map_err(|err| {
        HarnessError::spawn(
            format!("failed to start {}: {err}", target.program),
            context(),
        )
    })
}

fn kill_and_reap(child: &mut Child, pid: u32) {
    if let Err(err) = signal_group(pid, Teardown::Kill) {
        debug!(error = %err, "killpg failed; killing probe directly");
        let _ = child.kill();
    }
    let reaped = poll_until(REAP_WAIT, EXIT_POLL, || {
        child
            .try_wait()
            .map_err(|err| HarnessError::io("failed to reap probe", err))
    });
    if !matches!(reaped, Ok(Some(_))) {
        warn!(pid, "probe process could not be reaped");
    }
}

fn read_to_end<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut bytes = Vec::new();
        let _ = pipe.read_to_end(&mut bytes);
        bytes
    })
}

fn join(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}
