// Test module - relaxed lint rules
#![cfg(unix)]
#![allow(clippy::indexing_slicing)]
#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(missing_docs)]

//! Session controller integration tests
//!
//! Drives real processes (`/bin/cat`, `/bin/echo`, `/bin/sh`) through a PTY.

use ptycheck::model::{Key, TerminalSize};
use ptycheck::session::{Session, SessionConfig};
use ptycheck::ErrorCode;
use std::time::{Duration, Instant};

const POLL: Duration = Duration::from_millis(50);
const GRACE: Duration = Duration::from_millis(300);

// =============================================================================
// Helper Functions
// =============================================================================

fn sh(script: &str) -> SessionConfig {
    SessionConfig {
        args: vec!["-c".to_string(), script.to_string()],
        ..SessionConfig::new("/bin/sh")
    }
}

/// Drain until `needle` shows up in the snapshot or `timeout` passes.
fn wait_for_text(session: &mut Session, needle: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        session.drain(64 * 1024, POLL).unwrap();
        if session.snapshot(10_000).contains(needle) {
            return true;
        }
    }
    false
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn cat_echoes_keystrokes_in_order() {
    let mut session = Session::spawn(SessionConfig::new("/bin/cat")).unwrap();
    assert!(session.is_alive());

    session.send_text("first").unwrap();
    session.send_key(Key::Enter).unwrap();
    session.send_text("second").unwrap();
    session.send_key(Key::Enter).unwrap();
    assert!(wait_for_text(&mut session, "second", Duration::from_secs(5)));

    let text = session.buffer().as_str();
    let first = text.find("first").unwrap();
    let second = text.find("second").unwrap();
    assert!(first < second);

    let exit = session.terminate(GRACE).unwrap();
    assert!(exit.terminated_by_harness);
    assert!(session.buffer().is_sealed());
}

#[test]
fn terminate_is_idempotent() {
    let mut session = Session::spawn(SessionConfig::new("/bin/cat")).unwrap();
    let first = session.terminate(GRACE).unwrap();
    let second = session.terminate(GRACE).unwrap();
    assert_eq!(first, second);
    assert!(!session.is_alive());
}

#[test]
fn send_after_exit_is_unexpected_exit() {
    let mut session = Session::spawn(SessionConfig {
        args: vec!["bye".to_string()],
        ..SessionConfig::new("/bin/echo")
    })
    .unwrap();
    let exit = session.wait_for_exit(Duration::from_secs(5)).unwrap();
    assert!(exit.is_some());

    let err = session.send_key(Key::Enter).unwrap_err();
    assert_eq!(err.code, ErrorCode::UnexpectedExit);
}

#[test]
fn send_after_terminate_is_unexpected_exit() {
    let mut session = Session::spawn(SessionConfig::new("/bin/cat")).unwrap();
    session.terminate(GRACE).unwrap();
    let err = session.send_text("late").unwrap_err();
    assert_eq!(err.code, ErrorCode::UnexpectedExit);
}

#[test]
fn output_after_exit_is_still_collected() {
    let mut session = Session::spawn(sh("printf 'all done\\n'; exit 4")).unwrap();
    assert!(wait_for_text(&mut session, "all done", Duration::from_secs(5)));
    let exit = session.wait_for_exit(Duration::from_secs(5)).unwrap().unwrap();
    assert_eq!(exit.exit_code, Some(4));
    assert!(!exit.success);
    assert!(!exit.terminated_by_harness);
}

#[test]
fn sigterm_ignoring_process_is_killed() {
    let mut session = Session::spawn(sh("trap '' TERM; echo ready; while :; do sleep 1; done")).unwrap();
    assert!(wait_for_text(&mut session, "ready", Duration::from_secs(5)));
    let started = Instant::now();
    let exit = session.terminate(Duration::from_millis(200)).unwrap();
    assert!(exit.terminated_by_harness);
    assert!(started.elapsed() < Duration::from_secs(3));
}

// =============================================================================
// Spawn Errors
// =============================================================================

#[test]
fn missing_executable_is_spawn_error() {
    let started = Instant::now();
    let err = Session::spawn(SessionConfig::new("/nonexistent/ptycheck-aut"))
        .err()
        .expect("spawn should fail");
    assert_eq!(err.code, ErrorCode::Spawn);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn invalid_cwd_is_spawn_error() {
    let config = SessionConfig {
        cwd: Some("/nonexistent/dir".into()),
        ..SessionConfig::new("/bin/cat")
    };
    let err = Session::spawn(config).err().expect("spawn should fail");
    assert_eq!(err.code, ErrorCode::Spawn);
}

#[test]
fn silent_startup_times_out() {
    let config = SessionConfig {
        startup_timeout: Some(Duration::from_millis(200)),
        ..sh("sleep 5")
    };
    let err = Session::spawn(config).err().expect("spawn should fail");
    assert_eq!(err.code, ErrorCode::Spawn);
}

#[test]
fn startup_output_satisfies_timeout() {
    let config = SessionConfig {
        startup_timeout: Some(Duration::from_secs(5)),
        ..sh("echo hello; sleep 5")
    };
    let mut session = Session::spawn(config).unwrap();
    assert!(wait_for_text(&mut session, "hello", Duration::from_secs(5)));
    session.terminate(GRACE).unwrap();
}

// =============================================================================
// Views
// =============================================================================

#[test]
fn emulated_screen_tracks_size_and_resize() {
    let config = SessionConfig {
        size: TerminalSize { rows: 10, cols: 40 },
        ..sh("printf '\\033[3;5HMenu'; sleep 5")
    };
    let mut session = Session::spawn(config).unwrap();
    assert!(wait_for_text(&mut session, "Menu", Duration::from_secs(5)));
    let screen = session.emulated_screen();
    assert_eq!((screen.rows, screen.cols), (10, 40));
    assert_eq!(screen.lines[2].trim(), "Menu");

    session.resize(TerminalSize { rows: 20, cols: 60 }).unwrap();
    let screen = session.emulated_screen();
    assert_eq!((screen.rows, screen.cols), (20, 60));
    session.terminate(GRACE).unwrap();
}

#[test]
fn drain_respects_max_bytes() {
    let mut session = Session::spawn(sh("head -c 20000 /dev/zero | tr '\\0' x; sleep 5")).unwrap();
    std::thread::sleep(Duration::from_millis(500));
    let read = session.drain(1_000, POLL).unwrap();
    assert!(read <= 1_000);
    let rest = session
        .drain_until_quiet(1_000_000, POLL, Duration::from_secs(5))
        .unwrap();
    assert!(read + rest >= 20_000);
    session.terminate(GRACE).unwrap();
}

#[test]
fn drain_until_quiet_stops_at_window_for_chatty_output() {
    let mut session =
        Session::spawn(sh("while :; do printf 'tick\\n'; sleep 0.05; done")).unwrap();
    let started = Instant::now();
    let read = session
        .drain_until_quiet(1_000_000, Duration::from_millis(200), Duration::from_millis(500))
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
    assert!(read > 0);
    assert!(session.snapshot(10_000).contains("tick"));
    session.terminate(GRACE).unwrap();
}
