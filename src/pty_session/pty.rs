//! Pseudo-terminal allocation and the child spawned on its slave end.

use crate::codex::{kill_and_reap, spawn_child, KillScope, ProcessSpec, RunError};
use crate::log_debug;
use std::io;
use std::mem;
use std::os::unix::io::{FromRawFd, OwnedFd, RawFd};
use std::os::unix::process::CommandExt;
use std::process::{Child, ExitStatus, Stdio};
use std::ptr;

/// Owns the PTY master descriptor and closes it on every exit path.
pub(super) struct MasterFd(RawFd);

impl MasterFd {
    pub(super) fn raw(&self) -> RawFd {
        self.0
    }
}

impl Drop for MasterFd {
    fn drop(&mut self) {
        // SAFETY: the descriptor came from openpty and is only closed here.
        unsafe { close_fd(self.0) };
    }
}

/// One child attached to a fresh PTY. Dropping the session kills an
/// unreaped child and closes the master.
pub(super) struct PtySession {
    child: Child,
    reaped: bool,
    master: MasterFd,
}

impl PtySession {
    /// Allocate a PTY pair and spawn `spec` with all three standard streams on the slave.
    /// Our copies of the slave end are released before this returns.
    pub(super) fn spawn(spec: &ProcessSpec, command_line: &str) -> Result<Self, RunError> {
        let io_err = |context: &'static str| {
            let command_line = command_line.to_string();
            move |source: io::Error| RunError::Io {
                command_line,
                context,
                source,
            }
        };

        // SAFETY: open_pty returns two freshly allocated descriptors we own.
        let (master_fd, slave_fd) = unsafe { open_pty() }.map_err(io_err("openpty"))?;
        let master = MasterFd(master_fd);
        // SAFETY: slave_fd is open and owned by nobody else.
        let slave = unsafe { OwnedFd::from_raw_fd(slave_fd) };

        // SAFETY: fcntl only touches the descriptor we own.
        unsafe {
            set_cloexec(master.raw()).map_err(io_err("fcntl(FD_CLOEXEC) on master"))?;
            set_cloexec(slave_fd).map_err(io_err("fcntl(FD_CLOEXEC) on slave"))?;
            set_nonblocking(master.raw()).map_err(io_err("fcntl(O_NONBLOCK)"))?;
        }

        let stdin = slave.try_clone().map_err(io_err("dup slave"))?;
        let stdout = slave.try_clone().map_err(io_err("dup slave"))?;
        let stderr = slave;

        let mut cmd = spec.command()?;
        cmd.stdin(Stdio::from(stdin))
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));
        // SAFETY: only async-signal-safe calls run between fork and exec.
        unsafe {
            cmd.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(io::Error::last_os_error());
                }
                if libc::ioctl(libc::STDIN_FILENO, libc::TIOCSCTTY as _, 0) == -1 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let child = spawn_child(&mut cmd, spec, command_line)?;
        // The Command holds the slave copies; dropping it leaves the child as the only holder.
        drop(cmd);

        Ok(Self {
            child,
            reaped: false,
            master,
        })
    }

    pub(super) fn master_fd(&self) -> RawFd {
        self.master.raw()
    }

    /// Non-blocking exit check; reaps the child once it is gone.
    pub(super) fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        let status = self.child.try_wait()?;
        if status.is_some() {
            self.reaped = true;
        }
        Ok(status)
    }

    /// Kill the child's session and wait for it.
    pub(super) fn kill(&mut self) {
        if self.reaped {
            return;
        }
        kill_and_reap(&mut self.child, KillScope::Group);
        self.reaped = true;
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        if !self.reaped {
            log_debug("PTY session dropped with a live child; killing it");
            self.kill();
        }
    }
}

/// Allocate a PTY pair with a conventional 24x80 window.
///
/// # Safety
///
/// The caller takes ownership of both returned descriptors.
unsafe fn open_pty() -> io::Result<(RawFd, RawFd)> {
    let mut master_fd: RawFd = -1;
    let mut slave_fd: RawFd = -1;

    // Some CLIs read the window size as part of terminal detection.
    // SAFETY: libc::winsize is a plain C struct; zeroed is a valid baseline.
    let mut winsize: libc::winsize = mem::zeroed();
    winsize.ws_row = 24;
    winsize.ws_col = 80;

    if libc::openpty(
        &mut master_fd,
        &mut slave_fd,
        ptr::null_mut(),
        ptr::null_mut(),
        &mut winsize,
    ) != 0
    {
        return Err(io::Error::last_os_error());
    }
    Ok((master_fd, slave_fd))
}

/// # Safety
///
/// `fd` must be a valid, open file descriptor.
unsafe fn set_cloexec(fd: RawFd) -> io::Result<()> {
    let flags = libc::fcntl(fd, libc::F_GETFD, 0);
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Configure the PTY master for non-blocking reads.
///
/// # Safety
///
/// `fd` must be a valid, open file descriptor.
unsafe fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = libc::fcntl(fd, libc::F_GETFL, 0);
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Close a file descriptor while ignoring errors.
///
/// # Safety
///
/// `fd` must be a valid, open file descriptor (or -1 to ignore).
unsafe fn close_fd(fd: RawFd) {
    if fd >= 0 {
        let _ = libc::close(fd);
    }
}
