use std::process::Command;

fn combined_output(output: &std::process::Output) -> String {
    let mut combined = String::new();
    combined.push_str(&String::from_utf8_lossy(&output.stdout));
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    combined
}

fn codex_voice_bin() -> &'static str {
    option_env!("CARGO_BIN_EXE_codex-voice").expect("codex-voice test binary not built")
}

#[test]
fn help_mentions_name_and_core_flags() {
    let output = Command::new(codex_voice_bin())
        .arg("--help")
        .output()
        .expect("run codex-voice --help");
    assert!(output.status.success());
    let combined = combined_output(&output);
    assert!(combined.contains("codex-voice"));
    assert!(combined.contains("--codex-cmd"));
    assert!(combined.contains("--emit-json"));
}

#[test]
fn invalid_seconds_exits_with_error() {
    let output = Command::new(codex_voice_bin())
        .args(["--seconds", "0", "--no-logs"])
        .output()
        .expect("run codex-voice --seconds 0");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error: --seconds must be between 1 and 60"));
}

#[test]
fn missing_ffmpeg_is_reported() {
    let output = Command::new(codex_voice_bin())
        .args([
            "--ffmpeg-cmd",
            "codex-voice-definitely-missing-ffmpeg",
            "--emit-json",
            "--no-logs",
        ])
        .output()
        .expect("run codex-voice with missing ffmpeg");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error: audio capture failed"), "{stderr}");
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
mod pipeline {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::time::{SystemTime, UNIX_EPOCH};

    struct FakeTools {
        dir: PathBuf,
        ffmpeg: PathBuf,
        whisper: PathBuf,
        model: PathBuf,
    }

    impl FakeTools {
        fn new(label: &str) -> Self {
            let unique = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos();
            let dir = std::env::temp_dir().join(format!(
                "codex_voice_cli_{label}_{}_{unique}",
                std::process::id()
            ));
            fs::create_dir_all(&dir).unwrap();
            let ffmpeg = write_script(&dir, "fake-ffmpeg", "exit 0");
            // whisper.cpp-style: "-of <base>" is the ninth argument.
            let whisper = write_script(&dir, "fake-stt", "printf 'hello there\\n' > \"$9.txt\"");
            let model = dir.join("ggml-test.bin");
            fs::write(&model, b"model").unwrap();
            Self {
                dir,
                ffmpeg,
                whisper,
                model,
            }
        }

        fn command(&self, codex: &Path) -> Command {
            let mut cmd = Command::new(codex_voice_bin());
            cmd.args([
                "--seconds",
                "1",
                "--no-logs",
                "--ffmpeg-cmd",
                self.ffmpeg.to_str().unwrap(),
                "--whisper-cmd",
                self.whisper.to_str().unwrap(),
                "--whisper-model-path",
                self.model.to_str().unwrap(),
                "--codex-cmd",
                codex.to_str().unwrap(),
                "--codex-timeout-secs",
                "10",
            ]);
            cmd
        }
    }

    impl Drop for FakeTools {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn parse_json(stdout: &[u8]) -> serde_json::Value {
        let text = String::from_utf8_lossy(stdout);
        let line = text
            .lines()
            .rev()
            .find(|line| line.trim_start().starts_with('{'))
            .unwrap_or_else(|| panic!("no JSON in stdout: {text}"));
        serde_json::from_str(line).unwrap()
    }

    #[test]
    fn emit_json_runs_the_whole_round_trip() {
        let tools = FakeTools::new("ok");
        let codex = write_script(&tools.dir, "fake-codex", "echo \"codex got: $*\"");
        let output = tools
            .command(&codex)
            .args(["--codex-args", "--quiet", "--emit-json"])
            .output()
            .expect("run codex-voice pipeline");
        assert!(output.status.success(), "{}", combined_output(&output));
        let value = parse_json(&output.stdout);
        assert_eq!(value["transcript"], "hello there");
        assert_eq!(value["prompt"], "hello there");
        assert_eq!(value["codex_output"], "codex got: --quiet hello there");
        assert!(value["metrics"]["total_s"].as_f64().unwrap() >= 0.0);
    }

    #[test]
    fn no_codex_stops_after_transcription() {
        let tools = FakeTools::new("no_codex");
        let codex = write_script(&tools.dir, "fake-codex", "echo should-not-run; exit 9");
        let output = tools
            .command(&codex)
            .args(["--no-codex", "--emit-json"])
            .output()
            .expect("run codex-voice --no-codex");
        assert!(output.status.success(), "{}", combined_output(&output));
        let value = parse_json(&output.stdout);
        assert_eq!(value["transcript"], "hello there");
        assert!(value["codex_output"].is_null());
        assert_eq!(value["metrics"]["codex_s"], 0.0);
    }

    #[test]
    fn interactive_run_prints_sections_and_latency() {
        let tools = FakeTools::new("interactive");
        let codex = write_script(&tools.dir, "fake-codex", "echo \"reply: $1\"");
        let output = tools
            .command(&codex)
            .arg("--capture-output")
            .stdin(std::process::Stdio::null())
            .output()
            .expect("run codex-voice interactively");
        assert!(output.status.success(), "{}", combined_output(&output));
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("[Transcript]\nhello there"));
        assert!(stdout.contains("Press Enter to send to Codex"));
        assert!(stdout.contains("[Codex output]"));
        assert!(stdout.contains("reply: hello there"));
        assert!(stdout.contains("[Latency] {\"record_s\":"));
    }

    #[test]
    fn ctrl_c_at_edit_prompt_removes_run_directory() {
        use std::io::{BufRead, BufReader};
        use std::process::Stdio;
        use std::sync::mpsc;
        use std::time::Duration;

        let tools = FakeTools::new("sigint");
        let codex = write_script(&tools.dir, "fake-codex", "echo unused");
        let tmp = tools.dir.join("tmp");
        fs::create_dir_all(&tmp).unwrap();
        let mut child = tools
            .command(&codex)
            .arg("--capture-output")
            .env("TMPDIR", &tmp)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("spawn codex-voice");
        let _stdin = child.stdin.take();
        let stdout = child.stdout.take().unwrap();

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                if line.contains("Press Enter to send to Codex") {
                    let _ = tx.send(());
                }
            }
        });
        rx.recv_timeout(Duration::from_secs(20))
            .expect("edit prompt never appeared");

        let run_dirs = |dir: &Path| -> usize {
            fs::read_dir(dir)
                .unwrap()
                .filter_map(Result::ok)
                .filter(|entry| entry.file_name().to_string_lossy().starts_with("codex_voice_"))
                .count()
        };
        assert_eq!(run_dirs(&tmp), 1);

        // SAFETY: signalling a child we spawned and have not reaped yet.
        unsafe {
            libc::kill(child.id() as libc::pid_t, libc::SIGINT);
        }
        let status = child.wait().expect("wait for codex-voice");
        assert_eq!(status.code(), Some(130));
        assert_eq!(run_dirs(&tmp), 0);
    }

    #[test]
    fn total_codex_failure_lists_every_attempt() {
        let tools = FakeTools::new("fail");
        let codex = write_script(&tools.dir, "fake-codex", "echo 'backend unavailable' >&2; exit 1");
        let output = tools
            .command(&codex)
            .arg("--emit-json")
            .output()
            .expect("run codex-voice with failing codex");
        assert_eq!(output.status.code(), Some(1));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("Codex invocation failed:"), "{stderr}");
        assert!(stderr.contains("Arg mode exit 1"), "{stderr}");
        assert!(stderr.contains("Stdin mode exit 1"), "{stderr}");
        assert_eq!(stderr.matches("backend unavailable").count(), 2);
    }
}
