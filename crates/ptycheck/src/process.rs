//! Process-group signalling shared by the PTY session and the probe runner.
//!
//! Both spawn the application as a process-group leader, so signalling the group
//! also reaches anything the application forked.

use crate::error::{HarnessError, HarnessResult};
use std::time::{Duration, Instant};

/// Signals the harness sends during teardown.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Teardown {
    /// Polite request (SIGTERM).
    Terminate,
    /// Forced kill (SIGKILL).
    Kill,
}

/// Signal every process in the group led by `pid`.
///
/// A group that no longer exists is not an error.
#[cfg(unix)]
pub fn signal_group(pid: u32, teardown: Teardown) -> HarnessResult<()> {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid)
        .map_err(|_| HarnessError::internal(format!("process id {pid} out of range")))?;
    let signal = match teardown {
        Teardown::Terminate => Signal::SIGTERM,
        Teardown::Kill => Signal::SIGKILL,
    };
    match killpg(Pid::from_raw(raw), signal) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(err) => Err(HarnessError::io("failed to signal process group", err)),
    }
}

#[cfg(not(unix))]
pub fn signal_group(_pid: u32, _teardown: Teardown) -> HarnessResult<()> {
    Err(HarnessError::capability(
        "process groups are not supported on this platform",
        "no killpg",
    ))
}

/// Poll `check` every `interval` until it yields a value or `timeout` elapses.
pub fn poll_until<T>(
    timeout: Duration,
    interval: Duration,
    mut check: impl FnMut() -> HarnessResult<Option<T>>,
) -> HarnessResult<Option<T>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = check()? {
            return Ok(Some(value));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        std::thread::sleep(interval.min(deadline - now));
    }
}

/// Milliseconds in a duration, saturating.
pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_until_returns_first_value() {
        let mut calls = 0;
        let result = poll_until(Duration::from_secs(1), Duration::from_millis(1), || {
            calls += 1;
            Ok((calls == 3).then_some(calls))
        })
        .unwrap();
        assert_eq!(result, Some(3));
    }

    #[test]
    fn poll_until_gives_up_after_timeout() {
        let started = Instant::now();
        let result: Option<()> =
            poll_until(Duration::from_millis(30), Duration::from_millis(5), || Ok(None)).unwrap();
        assert!(result.is_none());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[cfg(unix)]
    #[test]
    fn signalling_a_missing_group_is_ok() {
        // pid_max on Linux is well below this value
        assert!(signal_group(4_000_000, Teardown::Kill).is_ok());
    }
}
