use std::{fmt, io, time::Duration};

/// Failure raised by a single external-process run (piped, direct, or PTY).
#[derive(Debug)]
pub enum RunError {
    /// The executable could not be found on PATH.
    MissingTool { command: String },
    /// The process could not be started for a reason other than a missing binary.
    Spawn {
        command_line: String,
        source: io::Error,
    },
    /// Plumbing failure while the child was running (pipes, PTY descriptors).
    Io {
        command_line: String,
        context: &'static str,
        source: io::Error,
    },
    Timeout {
        command_line: String,
        after: Duration,
        diagnostics: String,
        pty: bool,
    },
    NonZeroExit {
        command_line: String,
        code: Option<i32>,
        diagnostics: String,
        pty: bool,
    },
    UnsupportedPlatform,
    /// The caller asked to stop (Ctrl-C) while the child was in flight.
    Interrupted { command_line: String },
}

impl RunError {
    /// Errors that must abort the whole invocation instead of advancing to the next mode.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RunError::MissingTool { .. } | RunError::UnsupportedPlatform | RunError::Interrupted { .. }
        )
    }

    /// Free-form text the child produced (stderr, or the merged PTY stream).
    pub fn diagnostics(&self) -> &str {
        match self {
            RunError::Timeout { diagnostics, .. } | RunError::NonZeroExit { diagnostics, .. } => {
                diagnostics
            }
            _ => "",
        }
    }

    pub fn command_line(&self) -> Option<&str> {
        match self {
            RunError::Spawn { command_line, .. }
            | RunError::Io { command_line, .. }
            | RunError::Timeout { command_line, .. }
            | RunError::NonZeroExit { command_line, .. }
            | RunError::Interrupted { command_line } => Some(command_line),
            RunError::MissingTool { .. } | RunError::UnsupportedPlatform => None,
        }
    }
}

fn pty_suffix(pty: bool) -> &'static str {
    if pty {
        " (PTY)"
    } else {
        ""
    }
}

pub(crate) fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "by signal".to_string(),
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::MissingTool { command } => write!(f, "Command not found on PATH: {command}"),
            RunError::Spawn {
                command_line,
                source,
            } => write!(f, "Failed to start: {command_line}: {source}"),
            RunError::Io {
                command_line,
                context,
                source,
            } => write!(f, "{context} failed for {command_line}: {source}"),
            RunError::Timeout {
                command_line,
                after,
                diagnostics,
                pty,
            } => {
                write!(
                    f,
                    "Timeout after {:.1}s running{}: {command_line}",
                    after.as_secs_f64(),
                    pty_suffix(*pty)
                )?;
                if !diagnostics.trim().is_empty() {
                    write!(f, "\n{}", diagnostics.trim_end())?;
                }
                Ok(())
            }
            RunError::NonZeroExit {
                command_line,
                code,
                diagnostics,
                pty,
            } => {
                write!(
                    f,
                    "Nonzero exit {}{}: {command_line}",
                    describe_exit(*code),
                    pty_suffix(*pty)
                )?;
                if !diagnostics.trim().is_empty() {
                    write!(f, "\n{}", diagnostics.trim_end())?;
                }
                Ok(())
            }
            RunError::UnsupportedPlatform => {
                write!(f, "PTY fallback is not supported on this platform")
            }
            RunError::Interrupted { command_line } => write!(f, "Interrupted: {command_line}"),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::Spawn { source, .. } | RunError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_are_classified() {
        assert!(RunError::MissingTool {
            command: "codex".into()
        }
        .is_fatal());
        assert!(RunError::UnsupportedPlatform.is_fatal());
        assert!(RunError::Interrupted {
            command_line: "codex hi".into()
        }
        .is_fatal());
        assert!(!RunError::NonZeroExit {
            command_line: "codex hi".into(),
            code: Some(1),
            diagnostics: String::new(),
            pty: false,
        }
        .is_fatal());
    }

    #[test]
    fn nonzero_exit_message_carries_command_and_stderr() {
        let err = RunError::NonZeroExit {
            command_line: "codex --model x hi".into(),
            code: Some(2),
            diagnostics: "stdout is not a terminal\n".into(),
            pty: true,
        };
        let text = err.to_string();
        assert_eq!(
            text,
            "Nonzero exit 2 (PTY): codex --model x hi\nstdout is not a terminal"
        );
    }

    #[test]
    fn timeout_message_omits_empty_diagnostics() {
        let err = RunError::Timeout {
            command_line: "sleep 10".into(),
            after: Duration::from_secs(1),
            diagnostics: "  ".into(),
            pty: false,
        };
        assert_eq!(err.to_string(), "Timeout after 1.0s running: sleep 10");
    }
}
