//! Plain subprocess execution: piped (captured) runs and direct runs that
//! inherit the caller's terminal, both bounded by a timeout and the cancel token.

use super::{cancel::CancelToken, error::RunError};
use crate::log_debug;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use std::{
    collections::BTreeMap,
    io::{self, ErrorKind, Read, Write},
    path::PathBuf,
    process::{Child, ChildStdin, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

const WAIT_SLICE: Duration = Duration::from_millis(50);
/// How long to wait for pipe EOF once the child itself has exited.
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(2);
/// Wait for EOF after killing the stragglers that still held the pipes.
const POST_KILL_DRAIN: Duration = Duration::from_millis(500);
const PIPE_CHUNK: usize = 4096;

/// Everything needed to launch one child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSpec {
    pub argv: Vec<String>,
    /// Written to stdin once, then stdin is closed.
    pub input: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
    pub cwd: Option<PathBuf>,
    /// Overrides layered on top of the inherited environment.
    pub env: BTreeMap<String, String>,
}

impl ProcessSpec {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_input(mut self, input: Option<Vec<u8>>) -> Self {
        self.input = input;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cwd(mut self, cwd: Option<PathBuf>) -> Self {
        self.cwd = cwd;
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or("")
    }

    /// Shell-quoted rendering used in diagnostics.
    pub fn command_line(&self) -> String {
        shell_words::join(&self.argv)
    }

    pub(crate) fn command(&self) -> Result<Command, RunError> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err(RunError::Spawn {
                command_line: String::new(),
                source: io::Error::new(ErrorKind::InvalidInput, "empty argument vector"),
            });
        };
        let mut cmd = Command::new(program);
        cmd.args(args).envs(&self.env);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        Ok(cmd)
    }
}

/// Run with stdin/stdout/stderr piped and return stdout bytes untouched.
pub fn run_captured(spec: &ProcessSpec, cancel: &CancelToken) -> Result<Vec<u8>, RunError> {
    let command_line = spec.command_line();
    let mut cmd = spec.command()?;
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        // Own process group so a timeout kill also reaches grandchildren holding the pipes.
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let started = Instant::now();
    let mut child = spawn_child(&mut cmd, spec, &command_line)?;
    let _inflight = cancel.enter_child();
    let mut stdout = PipeCollector::spawn(child.stdout.take());
    let mut stderr = PipeCollector::spawn(child.stderr.take());
    feed_stdin(child.stdin.take(), spec.input.clone());

    let outcome = wait_with_deadline(&mut child, spec.timeout, cancel, KillScope::Group)
        .map_err(|source| RunError::Io {
            command_line: command_line.clone(),
            context: "waiting for child",
            source,
        })?;

    // Background processes the child left behind may still hold the pipes open.
    let grace = match spec.timeout {
        Some(limit) => PIPE_DRAIN_GRACE.min(limit.saturating_sub(started.elapsed())),
        None => PIPE_DRAIN_GRACE,
    };
    if !drain_pipes(&mut [&mut stdout, &mut stderr], Instant::now() + grace) {
        log_debug("child exited with its pipes still open; killing its process group");
        #[cfg(unix)]
        kill_process_group(child.id());
        drain_pipes(&mut [&mut stdout, &mut stderr], Instant::now() + POST_KILL_DRAIN);
    }
    let stderr = String::from_utf8_lossy(&stderr.into_bytes()).into_owned();
    finish(outcome, spec, command_line, stderr).map(|()| stdout.into_bytes())
}

/// Run with stdout attached to the caller's terminal; stderr is still captured for diagnostics.
///
/// When `spec.input` is set the prompt is piped to stdin, otherwise stdin is inherited too.
pub fn run_direct(spec: &ProcessSpec, cancel: &CancelToken) -> Result<(), RunError> {
    let command_line = spec.command_line();
    let mut cmd = spec.command()?;
    let stdin = if spec.input.is_some() {
        Stdio::piped()
    } else {
        Stdio::inherit()
    };
    cmd.stdin(stdin)
        .stdout(Stdio::inherit())
        .stderr(Stdio::piped());

    let mut child = spawn_child(&mut cmd, spec, &command_line)?;
    let _inflight = cancel.enter_child();
    let mut stderr = PipeCollector::spawn(child.stderr.take());
    if spec.input.is_some() {
        feed_stdin(child.stdin.take(), spec.input.clone());
    }

    let outcome = wait_with_deadline(&mut child, spec.timeout, cancel, KillScope::Child)
        .map_err(|source| RunError::Io {
            command_line: command_line.clone(),
            context: "waiting for child",
            source,
        })?;
    // The child shares our process group here, so whatever is read within the grace is kept.
    drain_pipes(&mut [&mut stderr], Instant::now() + PIPE_DRAIN_GRACE);
    let stderr = String::from_utf8_lossy(&stderr.into_bytes()).into_owned();
    finish(outcome, spec, command_line, stderr)
}

fn finish(
    outcome: WaitOutcome,
    spec: &ProcessSpec,
    command_line: String,
    stderr: String,
) -> Result<(), RunError> {
    match outcome {
        WaitOutcome::Exited(status) if status.success() => Ok(()),
        WaitOutcome::Exited(status) => Err(RunError::NonZeroExit {
            command_line,
            code: status.code(),
            diagnostics: stderr,
            pty: false,
        }),
        WaitOutcome::TimedOut => Err(RunError::Timeout {
            command_line,
            after: spec.timeout.unwrap_or_default(),
            diagnostics: stderr,
            pty: false,
        }),
        WaitOutcome::Cancelled => Err(RunError::Interrupted { command_line }),
    }
}

pub(crate) fn spawn_child(
    cmd: &mut Command,
    spec: &ProcessSpec,
    command_line: &str,
) -> Result<Child, RunError> {
    cmd.spawn().map_err(|source| {
        if source.kind() == ErrorKind::NotFound {
            RunError::MissingTool {
                command: spec.program().to_string(),
            }
        } else {
            RunError::Spawn {
                command_line: command_line.to_string(),
                source,
            }
        }
    })
}

/// Write the payload once from a helper thread so a chatty child cannot deadlock us.
fn feed_stdin(stdin: Option<ChildStdin>, input: Option<Vec<u8>>) {
    let Some(mut stdin) = stdin else {
        return;
    };
    let Some(payload) = input else {
        // Dropping the handle closes stdin.
        return;
    };
    thread::spawn(move || {
        if let Err(err) = stdin.write_all(&payload) {
            if err.kind() != ErrorKind::BrokenPipe {
                log_debug(&format!("failed to write child stdin: {err}"));
            }
        }
    });
}

/// Bytes read so far from one child pipe, fed chunk by chunk by a reader thread.
struct PipeCollector {
    rx: Option<Receiver<Vec<u8>>>,
    buf: Vec<u8>,
}

impl PipeCollector {
    fn spawn<R: Read + Send + 'static>(reader: Option<R>) -> Self {
        let rx = reader.map(|mut reader| {
            let (tx, rx) = unbounded();
            thread::spawn(move || {
                let mut chunk = [0u8; PIPE_CHUNK];
                loop {
                    match reader.read(&mut chunk) {
                        Ok(0) => break,
                        Ok(n) => {
                            if tx.send(chunk[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                        Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                        Err(err) => {
                            log_debug(&format!("child pipe read failed: {err}"));
                            break;
                        }
                    }
                }
            });
            rx
        });
        Self {
            rx,
            buf: Vec::new(),
        }
    }

    /// Absorb chunks until EOF (returns true) or the deadline passes.
    fn drain_until(&mut self, deadline: Instant) -> bool {
        let Some(rx) = self.rx.take() else {
            return true;
        };
        loop {
            match rx.recv_deadline(deadline) {
                Ok(chunk) => self.buf.extend_from_slice(&chunk),
                Err(RecvTimeoutError::Disconnected) => return true,
                Err(RecvTimeoutError::Timeout) => {
                    self.rx = Some(rx);
                    return false;
                }
            }
        }
    }

    fn into_bytes(mut self) -> Vec<u8> {
        // Keep anything already queued even if EOF never came.
        if let Some(rx) = self.rx.take() {
            self.buf.extend(rx.try_iter().flatten());
        }
        self.buf
    }
}

/// True when every pipe reached EOF before `deadline`.
fn drain_pipes(pipes: &mut [&mut PipeCollector], deadline: Instant) -> bool {
    let mut closed = true;
    for pipe in pipes.iter_mut() {
        closed &= pipe.drain_until(deadline);
    }
    closed
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitOutcome {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KillScope {
    /// Kill the child only (it shares our process group and terminal).
    Child,
    /// Kill the child's whole process group.
    Group,
}

/// Poll the child until it exits, the budget runs out, or the caller cancels.
/// On timeout or cancel the child is killed and reaped before returning.
pub(crate) fn wait_with_deadline(
    child: &mut Child,
    timeout: Option<Duration>,
    cancel: &CancelToken,
    scope: KillScope,
) -> io::Result<WaitOutcome> {
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(WaitOutcome::Exited(status));
        }
        if cancel.is_cancelled() {
            log_debug("child wait: cancellation requested; killing child");
            kill_and_reap(child, scope);
            return Ok(WaitOutcome::Cancelled);
        }
        let slice = match timeout {
            Some(limit) => {
                let elapsed = started.elapsed();
                if elapsed >= limit {
                    log_debug(&format!(
                        "child wait: timeout after {:.1}s; killing child",
                        limit.as_secs_f64()
                    ));
                    kill_and_reap(child, scope);
                    return Ok(WaitOutcome::TimedOut);
                }
                WAIT_SLICE.min(limit - elapsed)
            }
            None => WAIT_SLICE,
        };
        thread::sleep(slice);
    }
}

pub(crate) fn kill_and_reap(child: &mut Child, scope: KillScope) {
    #[cfg(unix)]
    if scope == KillScope::Group {
        kill_process_group(child.id());
    }
    #[cfg(not(unix))]
    let _ = scope;
    if let Err(err) = child.kill() {
        if err.kind() != ErrorKind::InvalidInput {
            log_debug(&format!("failed to kill child {}: {err}", child.id()));
        }
    }
    if let Err(err) = child.wait() {
        log_debug(&format!("failed to reap child {}: {err}", child.id()));
    }
}

#[cfg(unix)]
pub(crate) fn kill_process_group(pid: u32) {
    // SAFETY: kill with a negative pid only signals the process group the child leads.
    unsafe {
        if libc::kill(-(pid as i32), libc::SIGKILL) != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                log_debug(&format!("failed to kill process group {pid}: {err}"));
            }
        }
    }
}
