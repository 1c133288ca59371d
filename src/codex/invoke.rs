//! Fallback automaton that delivers a prompt to the assistant CLI.
//!
//! Order is fixed: direct arg mode, direct stdin mode (both only when our own
//! stdout is a terminal), captured arg mode, captured stdin mode. A captured
//! failure whose stderr looks like a "needs a terminal" complaint is retried
//! once under a PTY before moving on. The first success wins.

use super::{
    cancel::CancelToken,
    cli::{self, ProcessSpec},
    error::RunError,
    request::{AttemptError, AttemptMode, InvocationOutcome, InvocationRequest},
};
use crate::{log_debug, pty_session, tools::require_command};
use regex::Regex;
use std::{
    io::{self, IsTerminal},
    sync::OnceLock,
    time::Instant,
};

/// Execution seam for the automaton; the system implementation spawns real processes.
pub trait AttemptRunner {
    /// Whether the direct (terminal-inheriting) attempts should run.
    fn stdout_is_terminal(&self) -> bool;
    fn pty_supported(&self) -> bool;
    fn run_direct(&self, spec: &ProcessSpec) -> Result<(), RunError>;
    fn run_captured(&self, spec: &ProcessSpec) -> Result<Vec<u8>, RunError>;
    fn run_pty(&self, spec: &ProcessSpec) -> Result<Vec<u8>, RunError>;
}

/// Runs attempts as real child processes, honouring the shared cancel token.
pub struct SystemRunner {
    cancel: CancelToken,
    allow_direct: bool,
}

impl SystemRunner {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            cancel,
            allow_direct: true,
        }
    }

    /// Disable the direct attempts even when stdout is a terminal.
    pub fn allow_direct(mut self, allow: bool) -> Self {
        self.allow_direct = allow;
        self
    }
}

impl AttemptRunner for SystemRunner {
    fn stdout_is_terminal(&self) -> bool {
        self.allow_direct && io::stdout().is_terminal()
    }

    fn pty_supported(&self) -> bool {
        pty_session::PTY_SUPPORTED
    }

    fn run_direct(&self, spec: &ProcessSpec) -> Result<(), RunError> {
        cli::run_direct(spec, &self.cancel)
    }

    fn run_captured(&self, spec: &ProcessSpec) -> Result<Vec<u8>, RunError> {
        cli::run_captured(spec, &self.cancel)
    }

    fn run_pty(&self, spec: &ProcessSpec) -> Result<Vec<u8>, RunError> {
        pty_session::run_with_pty(spec, &self.cancel)
    }
}

/// Heuristic: does this diagnostic text complain about a missing terminal?
///
/// The text comes from an external program, so this only recognises the
/// phrases known to be emitted and will miss others.
pub fn is_terminal_requirement_error(text: &str) -> bool {
    static TTY_ERROR: OnceLock<Regex> = OnceLock::new();
    TTY_ERROR
        .get_or_init(|| {
            Regex::new(r"(?i)stdout is not a terminal|isatty|not a tty")
                .expect("terminal-requirement pattern is valid")
        })
        .is_match(text)
}

/// Run the automaton. `Err` is reserved for fatal conditions (missing tool,
/// unsupported platform, interruption); exhausted attempts come back as
/// `InvocationOutcome::Failure`.
pub fn invoke<R: AttemptRunner + ?Sized>(
    request: &InvocationRequest,
    runner: &R,
) -> Result<InvocationOutcome, RunError> {
    let started = Instant::now();
    let mut attempts: Vec<AttemptError> = Vec::new();
    let arg_spec = attempt_spec(request, request.arg_mode_argv(), None);
    let stdin_spec = attempt_spec(
        request,
        request.stdin_mode_argv(),
        Some(request.stdin_payload()),
    );

    if runner.stdout_is_terminal() {
        for (mode, spec) in [
            (AttemptMode::ArgMode, &arg_spec),
            (AttemptMode::StdinMode, &stdin_spec),
        ] {
            match runner.run_direct(spec) {
                Ok(()) => {
                    log_success(mode, true, started);
                    return Ok(InvocationOutcome::DirectSuccess);
                }
                Err(err) => record_failure(&mut attempts, mode, true, err)?,
            }
        }
    }

    for (mode, spec) in [
        (AttemptMode::ArgMode, &arg_spec),
        (AttemptMode::StdinMode, &stdin_spec),
    ] {
        match runner.run_captured(spec) {
            Ok(output) => {
                log_success(mode, false, started);
                return Ok(InvocationOutcome::CapturedSuccess(output));
            }
            Err(err) => {
                let needs_terminal = is_terminal_requirement_error(err.diagnostics());
                record_failure(&mut attempts, mode, false, err)?;
                if needs_terminal && runner.pty_supported() {
                    let pty_mode = mode.pty_variant();
                    log_debug(&format!("{}: retrying under a PTY", mode.label()));
                    match runner.run_pty(spec) {
                        Ok(output) => {
                            log_success(pty_mode, false, started);
                            return Ok(InvocationOutcome::CapturedSuccess(output));
                        }
                        Err(err) => record_failure(&mut attempts, pty_mode, false, err)?,
                    }
                }
            }
        }
    }

    tracing::warn!(attempts = attempts.len(), "all invocation modes failed");
    Ok(InvocationOutcome::Failure(attempts))
}

/// Same as [`invoke`], but first confirms the command exists on PATH.
pub fn invoke_checked<R: AttemptRunner + ?Sized>(
    request: &InvocationRequest,
    runner: &R,
) -> Result<InvocationOutcome, RunError> {
    require_command(request.command())?;
    invoke(request, runner)
}

fn attempt_spec(
    request: &InvocationRequest,
    argv: Vec<String>,
    input: Option<Vec<u8>>,
) -> ProcessSpec {
    ProcessSpec::new(argv)
        .with_input(input)
        .with_timeout(request.timeout())
        .with_env(request.environment().clone())
}

fn record_failure(
    attempts: &mut Vec<AttemptError>,
    mode: AttemptMode,
    direct: bool,
    err: RunError,
) -> Result<(), RunError> {
    if err.is_fatal() {
        log_debug(&format!("{}: fatal error, aborting: {err}", mode.label()));
        return Err(err);
    }
    let attempt = AttemptError::from_run_error(mode, direct, &err);
    log_debug(&format!("{}: attempt failed: {err}", mode.label()));
    tracing::info!(
        mode = mode.label(),
        direct,
        failure = ?attempt.failure,
        "invocation attempt failed"
    );
    attempts.push(attempt);
    Ok(())
}

fn log_success(mode: AttemptMode, direct: bool, started: Instant) {
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    log_debug(&format!(
        "{} succeeded (direct={direct}) after {elapsed_ms:.1}ms",
        mode.label()
    ));
    tracing::info!(mode = mode.label(), direct, elapsed_ms, "invocation succeeded");
}
