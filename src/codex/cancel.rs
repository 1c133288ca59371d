use crate::log_debug;
use std::{
    fs,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

/// Shared interrupt flag plus a count of children currently being waited on.
///
/// Runners poll the flag in every wait slice; the Ctrl-C handler uses the
/// in-flight count to decide between killing a child and exiting outright.
/// When it exits outright it first removes the registered scratch directory.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    inflight: Arc<AtomicUsize>,
    scratch_dir: Arc<Mutex<Option<PathBuf>>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// True while at least one runner is waiting on a child process.
    pub fn has_inflight_child(&self) -> bool {
        self.inflight.load(Ordering::SeqCst) > 0
    }

    /// Register the directory to delete if the process has to exit without unwinding.
    pub fn set_scratch_dir(&self, path: Option<PathBuf>) {
        *self.scratch_slot() = path;
    }

    /// Delete the registered scratch directory, if any. Only the first caller removes it.
    pub fn remove_scratch_dir(&self) {
        let Some(path) = self.scratch_slot().take() else {
            return;
        };
        if let Err(err) = fs::remove_dir_all(&path) {
            log_debug(&format!(
                "failed to remove run directory {}: {err}",
                path.display()
            ));
        }
    }

    fn scratch_slot(&self) -> std::sync::MutexGuard<'_, Option<PathBuf>> {
        self.scratch_dir
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mark a child as in flight until the returned guard drops.
    pub(crate) fn enter_child(&self) -> InflightGuard {
        self.inflight.fetch_add(1, Ordering::SeqCst);
        InflightGuard {
            inflight: Arc::clone(&self.inflight),
        }
    }
}

pub(crate) struct InflightGuard {
    inflight: Arc<AtomicUsize>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.inflight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn inflight_guard_tracks_children() {
        let token = CancelToken::new();
        assert!(!token.has_inflight_child());
        let first = token.enter_child();
        let second = token.clone().enter_child();
        assert!(token.has_inflight_child());
        drop(first);
        assert!(token.has_inflight_child());
        drop(second);
        assert!(!token.has_inflight_child());
    }

    #[test]
    fn scratch_dir_is_removed_once() {
        let dir = std::env::temp_dir().join(format!(
            "codex_voice_cancel_scratch_{}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("audio.wav"), b"RIFF").unwrap();

        let token = CancelToken::new();
        token.clone().set_scratch_dir(Some(dir.clone()));
        token.remove_scratch_dir();
        assert!(!dir.exists());

        fs::create_dir_all(&dir).unwrap();
        token.remove_scratch_dir();
        assert!(dir.exists());
        let _ = fs::remove_dir_all(&dir);
    }
}
