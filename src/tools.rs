//! Locate external executables before dispatching a subprocess.

use crate::codex::RunError;
use std::{
    env,
    ffi::OsStr,
    path::{Path, PathBuf},
};

/// Resolve `command` the way the OS would when spawning it, or report `MissingTool`.
pub fn require_command(command: &str) -> Result<PathBuf, RunError> {
    find_command(command, env::var_os("PATH").as_deref()).ok_or_else(|| RunError::MissingTool {
        command: command.to_string(),
    })
}

/// Search `path_var` for `command`; names containing a separator are checked directly.
pub fn find_command(command: &str, path_var: Option<&OsStr>) -> Option<PathBuf> {
    if command.is_empty() {
        return None;
    }
    let candidate = Path::new(command);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    let path_var = path_var?;
    env::split_paths(path_var)
        .flat_map(|dir| executable_names(command).map(move |name| dir.join(name)))
        .find(|path| is_executable(path))
}

#[cfg(windows)]
fn executable_names(command: &str) -> impl Iterator<Item = String> + '_ {
    let has_ext = Path::new(command).extension().is_some();
    std::iter::once(command.to_string()).chain(
        ["exe", "cmd", "bat"]
            .into_iter()
            .filter(move |_| !has_ext)
            .map(move |ext| format!("{command}.{ext}")),
    )
}

#[cfg(not(windows))]
fn executable_names(command: &str) -> impl Iterator<Item = String> + '_ {
    std::iter::once(command.to_string())
}

fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = path.metadata() else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn scratch_dir(tag: &str) -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let dir = env::temp_dir().join(format!("codex_voice_tools_{tag}_{unique}"));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn finds_executable_on_custom_path() {
        let dir = scratch_dir("found");
        let tool = dir.join("fake-tool");
        fs::write(&tool, "#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

        let found = find_command("fake-tool", Some(dir.as_os_str()));
        assert_eq!(found, Some(tool));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn skips_non_executable_files() {
        let dir = scratch_dir("noexec");
        let tool = dir.join("fake-tool");
        fs::write(&tool, "data").unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o644)).unwrap();

        assert!(find_command("fake-tool", Some(dir.as_os_str())).is_none());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_tool_is_reported_by_name() {
        let err = require_command("codex-voice-definitely-missing-tool").unwrap_err();
        assert!(matches!(err, RunError::MissingTool { ref command } if command == "codex-voice-definitely-missing-tool"));
    }

    #[test]
    fn absolute_paths_bypass_path_search() {
        assert_eq!(
            find_command("/bin/sh", None),
            Some(PathBuf::from("/bin/sh"))
        );
    }
}
