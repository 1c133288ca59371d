//! Terminal-bridged runner: executes a command on a pseudo-terminal so CLIs
//! that insist on a TTY still run, answering their cursor-position probes.
//!
//! stdout and stderr share the PTY, so diagnostics on failure are the merged stream.

#[cfg(unix)]
mod io;
#[cfg(unix)]
mod osc;
#[cfg(unix)]
mod pty;


use crate::codex::{CancelToken, ProcessSpec, RunError};

/// Whether this build can allocate pseudo-terminals.
pub const PTY_SUPPORTED: bool = cfg!(unix);

/// Run `spec` attached to a fresh PTY and return everything it printed.
///
/// Input, if any, is written newline-terminated before reading starts. The
/// master descriptor is closed before this returns on every path.
#[cfg(unix)]
pub fn run_with_pty(spec: &ProcessSpec, cancel: &CancelToken) -> Result<Vec<u8>, RunError> {
    let report = run_with_pty_report(spec, cancel)?;
    if report.replies_sent > 0 {
        crate::log_debug(&format!(
            "answered {} cursor-position queries",
            report.replies_sent
        ));
    }
    Ok(report.output)
}

#[cfg(not(unix))]
pub fn run_with_pty(_spec: &ProcessSpec, _cancel: &CancelToken) -> Result<Vec<u8>, RunError> {
    Err(RunError::UnsupportedPlatform)
}

/// Successful PTY run plus the number of cursor-position replies written back.
#[cfg(unix)]
pub(crate) struct PtyReport {
    pub(crate) output: Vec<u8>,
    pub(crate) replies_sent: usize,
}

#[cfg(unix)]
pub(crate) fn run_with_pty_report(
    spec: &ProcessSpec,
    cancel: &CancelToken,
) -> Result<PtyReport, RunError> {
    let command_line = spec.command_line();
    let mut session = pty::PtySession::spawn(spec, &command_line)?;
    let _inflight = cancel.enter_child();
    let result = io::pump_session(&mut session, spec, cancel, &command_line);
    // Closes the master (and kills the child if the loop bailed out early).
    drop(session);
    let pumped = result?;

    if !pumped.status.success() {
        return Err(RunError::NonZeroExit {
            command_line,
            code: pumped.status.code(),
            diagnostics: String::from_utf8_lossy(&pumped.output).into_owned(),
            pty: true,
        });
    }
    Ok(PtyReport {
        output: pumped.output,
        replies_sent: pumped.replies_sent,
    })
}
