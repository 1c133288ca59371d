//! Values exchanged with the invocation automaton: the immutable request, the
//! per-attempt error record, and the tagged outcome.

use super::error::{describe_exit, RunError};
use std::{collections::BTreeMap, env, fmt, time::Duration};

/// TERM exported to the assistant when the caller's environment has none.
pub const DEFAULT_TERM: &str = "xterm-256color";

/// One prompt delivery, built once per pipeline run and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRequest {
    command: String,
    extra_args: Vec<String>,
    prompt: String,
    timeout: Option<Duration>,
    environment: BTreeMap<String, String>,
}

impl InvocationRequest {
    /// Start a request; TERM is inherited when set and defaulted otherwise.
    pub fn new(command: impl Into<String>, prompt: impl Into<String>) -> Self {
        let mut environment = BTreeMap::new();
        let term = env::var("TERM")
            .ok()
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_TERM.to_string());
        environment.insert("TERM".to_string(), term);
        Self {
            command: command.into(),
            extra_args: Vec::new(),
            prompt: prompt.into(),
            timeout: None,
            environment,
        }
    }

    /// Arguments placed after the command on every attempt, in order.
    pub fn with_extra_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.extra_args = args.into_iter().collect();
        self
    }

    /// Per-attempt time budget; `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override (or add) one environment variable for the child.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn extra_args(&self) -> &[String] {
        &self.extra_args
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    /// `command extra... prompt`
    pub fn arg_mode_argv(&self) -> Vec<String> {
        let mut argv = self.stdin_mode_argv();
        argv.push(self.prompt.clone());
        argv
    }

    /// `command extra...`; the prompt travels on stdin.
    pub fn stdin_mode_argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.extra_args.len() + 2);
        argv.push(self.command.clone());
        argv.extend(self.extra_args.iter().cloned());
        argv
    }

    /// Prompt bytes for stdin delivery, terminated by exactly one added newline at most.
    ///
    /// Captured stdin attempts get the newline too, not only the direct and PTY
    /// ones, so an empty prompt arrives as a lone `\n` on every stdin path.
    pub fn stdin_payload(&self) -> Vec<u8> {
        with_trailing_newline(self.prompt.as_bytes())
    }
}

pub(crate) fn with_trailing_newline(data: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(data.len() + 1);
    payload.extend_from_slice(data);
    if !payload.ends_with(b"\n") {
        payload.push(b'\n');
    }
    payload
}

/// Invocation style used by an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptMode {
    ArgMode,
    StdinMode,
    PtyArgMode,
    PtyStdinMode,
}

impl AttemptMode {
    pub fn label(self) -> &'static str {
        match self {
            AttemptMode::ArgMode => "Arg mode",
            AttemptMode::StdinMode => "Stdin mode",
            AttemptMode::PtyArgMode => "PTY arg mode",
            AttemptMode::PtyStdinMode => "PTY stdin mode",
        }
    }

    /// The PTY retry paired with a captured mode.
    pub fn pty_variant(self) -> AttemptMode {
        match self {
            AttemptMode::ArgMode | AttemptMode::PtyArgMode => AttemptMode::PtyArgMode,
            AttemptMode::StdinMode | AttemptMode::PtyStdinMode => AttemptMode::PtyStdinMode,
        }
    }
}

/// How an attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    Exit { code: Option<i32> },
    Timeout { after: Duration },
    Io { message: String },
}

/// Diagnostic record of one failed attempt; the automaton keeps every one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptError {
    pub mode: AttemptMode,
    /// True for the terminal-inheriting attempts that run before capture.
    pub direct: bool,
    pub command_line: String,
    pub failure: AttemptFailure,
    pub diagnostics: String,
}

impl AttemptError {
    pub(crate) fn from_run_error(mode: AttemptMode, direct: bool, err: &RunError) -> Self {
        let failure = match err {
            RunError::Timeout { after, .. } => AttemptFailure::Timeout { after: *after },
            RunError::NonZeroExit { code, .. } => AttemptFailure::Exit { code: *code },
            other => AttemptFailure::Io {
                message: other.to_string(),
            },
        };
        Self {
            mode,
            direct,
            command_line: err.command_line().unwrap_or_default().to_string(),
            failure,
            diagnostics: err.diagnostics().trim().to_string(),
        }
    }
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = self.mode.label();
        let direct = if self.direct { " (direct)" } else { "" };
        match &self.failure {
            AttemptFailure::Exit { code } => write!(
                f,
                "{label}{direct} exit {}: {}",
                describe_exit(*code),
                self.command_line
            )?,
            AttemptFailure::Timeout { after } => write!(
                f,
                "{label}{direct} timed out after {:.1}s: {}",
                after.as_secs_f64(),
                self.command_line
            )?,
            AttemptFailure::Io { message } => write!(f, "{label}{direct} error: {message}")?,
        }
        if !self.diagnostics.is_empty() {
            write!(f, "\n{}", self.diagnostics)?;
        }
        Ok(())
    }
}

/// Result of running the automaton once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationOutcome {
    /// The child wrote straight to the caller's terminal; nothing left to print.
    DirectSuccess,
    /// Output the caller must print itself.
    CapturedSuccess(Vec<u8>),
    /// Every attempt failed, in execution order. Never empty.
    Failure(Vec<AttemptError>),
}

impl InvocationOutcome {
    /// `Ok(None)` for direct success, `Ok(Some(bytes))` for captured output.
    pub fn into_result(self) -> Result<Option<Vec<u8>>, AggregateFailure> {
        match self {
            InvocationOutcome::DirectSuccess => Ok(None),
            InvocationOutcome::CapturedSuccess(output) => Ok(Some(output)),
            InvocationOutcome::Failure(attempts) => Err(AggregateFailure { attempts }),
        }
    }
}

/// Every mode was exhausted; carries the full per-attempt trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateFailure {
    pub attempts: Vec<AttemptError>,
}

impl fmt::Display for AggregateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Codex invocation failed:")?;
        for (idx, attempt) in self.attempts.iter().enumerate() {
            if idx > 0 {
                write!(f, "\n---")?;
            }
            write!(f, "\n{attempt}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateFailure {}
