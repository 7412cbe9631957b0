//! Environment capability checks, performed once before a suite runs.

use crate::error::{HarnessError, HarnessResult};
use portable_pty::{native_pty_system, PtySize};
use tracing::{debug, warn};

/// Check that a pseudo-terminal can be opened here.
///
/// The PTY pair is closed again immediately.
///
/// # Errors
/// `E_CAPABILITY` when the platform refuses to allocate a PTY.
pub fn check_pty_capability() -> HarnessResult<()> {
    let pair = native_pty_system()
        .openpty(PtySize {
            rows: 1,
            cols: 1,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|err| {
            warn!(error = %err, "pseudo-terminal support unavailable");
            HarnessError::capability("cannot open a pseudo-terminal", err)
        })?;
    drop(pair);
    debug!("pseudo-terminal capability confirmed");
    Ok(())
}
