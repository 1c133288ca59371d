use super::osc::{QueryFilter, CURSOR_POSITION_REPLY};
use super::pty::PtySession;
use crate::codex::{CancelToken, ProcessSpec, RunError};
use crate::log_debug;
use std::io::{self, ErrorKind};
use std::os::unix::io::RawFd;
use std::process::ExitStatus;
use std::thread;
use std::time::{Duration, Instant};

/// Upper bound on one wait for PTY data; the timeout budget is re-checked between slices.
const READ_SLICE: Duration = Duration::from_millis(100);
/// Sleep between exit checks once the master reports end of output.
const EOF_POLL: Duration = Duration::from_millis(10);
/// Budget for writing the prompt when the caller set no timeout.
const DEFAULT_WRITE_BUDGET: Duration = Duration::from_secs(5);
const READ_CHUNK_BYTES: usize = 4096;

pub(super) enum ReadResult {
    Data(Vec<u8>),
    /// The child's side is closed (EOF or EIO).
    Closed,
    WouldBlock,
}

pub(super) fn should_retry_read_error(err: &io::Error) -> bool {
    matches!(err.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock)
}

/// Read one chunk from the non-blocking master.
pub(super) fn read_chunk(fd: RawFd) -> io::Result<ReadResult> {
    let mut buffer = [0u8; READ_CHUNK_BYTES];
    // SAFETY: buffer is valid for buffer.len() bytes and fd is an open descriptor.
    let n = unsafe { libc::read(fd, buffer.as_mut_ptr() as *mut libc::c_void, buffer.len()) };
    if n > 0 {
        return Ok(ReadResult::Data(buffer[..n as usize].to_vec()));
    }
    if n == 0 {
        return Ok(ReadResult::Closed);
    }
    let err = io::Error::last_os_error();
    if should_retry_read_error(&err) {
        return Ok(ReadResult::WouldBlock);
    }
    // Linux reports EIO once every slave descriptor is closed.
    if err.raw_os_error() == Some(libc::EIO) {
        return Ok(ReadResult::Closed);
    }
    Err(err)
}

/// Wait up to `wait` for the master to become readable (or hang up).
pub(super) fn poll_readable(fd: RawFd, wait: Duration) -> io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let millis = wait.as_millis().min(i32::MAX as u128) as libc::c_int;
    // SAFETY: pfd is a single initialised pollfd.
    let ready = unsafe { libc::poll(&mut pfd, 1, millis) };
    if ready < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(err);
    }
    Ok(ready > 0 && pfd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0)
}

/// Write the entire buffer to the PTY master, retrying short writes until `deadline`.
pub(super) fn write_all(fd: RawFd, mut data: &[u8], deadline: Instant) -> io::Result<()> {
    while !data.is_empty() {
        // SAFETY: data is a valid slice and fd is an open descriptor.
        let written = unsafe { libc::write(fd, data.as_ptr() as *const libc::c_void, data.len()) };
        if written < 0 {
            let err = io::Error::last_os_error();
            if should_retry_read_error(&err) {
                if Instant::now() >= deadline {
                    return Err(io::Error::new(
                        ErrorKind::TimedOut,
                        "PTY input buffer stayed full",
                    ));
                }
                thread::sleep(Duration::from_millis(1));
                continue;
            }
            return Err(err);
        }
        if written == 0 {
            return Err(io::Error::new(ErrorKind::WriteZero, "write to PTY returned 0"));
        }
        data = &data[written as usize..];
    }
    Ok(())
}

/// Collected state of one PTY read loop.
struct Pump {
    filter: QueryFilter,
    output: Vec<u8>,
    replies_sent: usize,
}

impl Pump {
    fn absorb(&mut self, fd: RawFd, chunk: &[u8]) {
        let filtered = self.filter.feed(chunk);
        for _ in 0..filtered.replies {
            let deadline = Instant::now() + Duration::from_millis(500);
            match write_all(fd, CURSOR_POSITION_REPLY, deadline) {
                Ok(()) => self.replies_sent += 1,
                Err(err) => log_debug(&format!("failed to answer cursor query: {err}")),
            }
        }
        self.output.extend_from_slice(&filtered.output);
    }

    /// Read until the master has nothing left, answering queries on the way.
    fn drain(&mut self, fd: RawFd) -> io::Result<()> {
        while let ReadResult::Data(chunk) = read_chunk(fd)? {
            self.absorb(fd, &chunk);
        }
        Ok(())
    }
}

/// Output and exit status of a PTY run that ended on its own.
pub(super) struct PumpResult {
    pub(super) status: ExitStatus,
    pub(super) output: Vec<u8>,
    pub(super) replies_sent: usize,
}

/// Feed the optional input, then read until the child exits, the budget is
/// spent, or the caller cancels. Timeout and cancel kill the child first.
pub(super) fn pump_session(
    session: &mut PtySession,
    spec: &ProcessSpec,
    cancel: &CancelToken,
    command_line: &str,
) -> Result<PumpResult, RunError> {
    let started = Instant::now();
    let fd = session.master_fd();
    let io_err = |context: &'static str, source: io::Error| RunError::Io {
        command_line: command_line.to_string(),
        context,
        source,
    };

    if let Some(input) = &spec.input {
        let payload = crate::codex::with_trailing_newline(input);
        let deadline = started + spec.timeout.unwrap_or(DEFAULT_WRITE_BUDGET);
        write_all(fd, &payload, deadline).map_err(|err| io_err("writing PTY input", err))?;
    }

    let mut pump = Pump {
        filter: QueryFilter::default(),
        output: Vec::new(),
        replies_sent: 0,
    };
    let mut master_closed = false;

    let status = loop {
        if cancel.is_cancelled() {
            session.kill();
            return Err(RunError::Interrupted {
                command_line: command_line.to_string(),
            });
        }

        let wait = match spec.timeout {
            Some(limit) => {
                let elapsed = started.elapsed();
                if elapsed >= limit {
                    log_debug(&format!(
                        "PTY run timed out after {:.1}s: {command_line}",
                        limit.as_secs_f64()
                    ));
                    session.kill();
                    pump.output.extend(pump.filter.finish());
                    return Err(RunError::Timeout {
                        command_line: command_line.to_string(),
                        after: limit,
                        diagnostics: String::from_utf8_lossy(&pump.output).into_owned(),
                        pty: true,
                    });
                }
                READ_SLICE.min(limit - elapsed)
            }
            None => READ_SLICE,
        };

        if master_closed {
            thread::sleep(wait.min(EOF_POLL));
        } else if poll_readable(fd, wait).map_err(|err| io_err("polling PTY", err))? {
            match read_chunk(fd).map_err(|err| io_err("reading PTY", err))? {
                ReadResult::Data(chunk) => pump.absorb(fd, &chunk),
                ReadResult::Closed => master_closed = true,
                ReadResult::WouldBlock => {}
            }
        }

        if let Some(status) = session
            .try_wait()
            .map_err(|err| io_err("waiting for PTY child", err))?
        {
            if !master_closed {
                pump.drain(fd).map_err(|err| io_err("draining PTY", err))?;
            }
            break status;
        }
    };

    pump.output.extend(pump.filter.finish());
    Ok(PumpResult {
        status,
        output: pump.output,
        replies_sent: pump.replies_sent,
    })
}
