//! One voice round trip: record, transcribe, let the user edit, send to Codex,
//! report latency.

use super::logging::{log_debug, log_debug_content, log_timing};
use crate::codex::{invoke_checked, CancelToken, InvocationRequest, ProcessSpec, SystemRunner};
use crate::config::AppConfig;
use crate::stt::TranscribeRequest;
use crate::{audio, codex, stt};
use anyhow::{Context, Result};
use serde::Serialize;
use std::{
    env, fs,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
    process,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

const EDIT_PROMPT: &str = "Press Enter to send to Codex, or edit the text then Enter:";
const READY_PHRASE: &str = "Codex result ready";
const SAY_TIMEOUT: Duration = Duration::from_secs(30);

/// Wall-clock seconds per phase, rounded to milliseconds.
#[derive(Debug, Serialize, Default, Clone, Copy, PartialEq)]
pub struct PipelineMetrics {
    pub record_s: f64,
    pub stt_s: f64,
    pub codex_s: f64,
    pub total_s: f64,
}

impl PipelineMetrics {
    pub fn from_phases(record: Duration, stt: Duration, codex: Duration) -> Self {
        Self {
            record_s: round_ms(record),
            stt_s: round_ms(stt),
            codex_s: round_ms(codex),
            total_s: round_ms(record + stt + codex),
        }
    }

    /// `[Latency] {...}` line printed at the end of an interactive run.
    pub fn latency_line(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("[Latency] {json}")
    }
}

fn round_ms(duration: Duration) -> f64 {
    (duration.as_secs_f64() * 1000.0).round() / 1000.0
}

/// Single JSON object printed under `--emit-json`.
#[derive(Debug, Serialize)]
pub struct PipelineJsonResult {
    pub transcript: String,
    pub prompt: String,
    pub codex_output: Option<String>,
    pub metrics: PipelineMetrics,
}

/// The edited line wins unless it is blank.
pub fn choose_prompt(transcript: &str, edited: &str) -> String {
    let edited = edited.trim();
    if edited.is_empty() {
        transcript.to_string()
    } else {
        edited.to_string()
    }
}

/// Show the transcript and read one edited line. EOF keeps the transcript.
pub fn review_transcript<R: BufRead, W: Write>(
    transcript: &str,
    input: &mut R,
    out: &mut W,
) -> io::Result<String> {
    writeln!(out, "\n[Transcript]")?;
    writeln!(out, "{transcript}")?;
    writeln!(out, "\n{EDIT_PROMPT}")?;
    write!(out, "> ")?;
    out.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(choose_prompt(transcript, &line))
}

/// Codex output for JSON consumers: ANSI sequences removed, CRLF folded to LF.
pub fn clean_codex_output(raw: &[u8]) -> String {
    let stripped = strip_ansi_escapes::strip(raw);
    String::from_utf8_lossy(&stripped)
        .replace("\r\n", "\n")
        .trim_end()
        .to_string()
}

/// Per-run scratch directory; removed on drop unless the caller keeps it.
///
/// The path is also registered with the cancel token so an interrupt that
/// exits without unwinding still removes it.
struct RunDir {
    path: PathBuf,
    keep: bool,
    cancel: CancelToken,
}

impl RunDir {
    fn create(keep: bool, cancel: &CancelToken) -> Result<Self> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let path = env::temp_dir().join(format!("codex_voice_{}_{nanos}", process::id()));
        fs::create_dir_all(&path)
            .with_context(|| format!("failed to create temp dir {}", path.display()))?;
        if !keep {
            cancel.set_scratch_dir(Some(path.clone()));
        }
        Ok(Self {
            path,
            keep,
            cancel: cancel.clone(),
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunDir {
    fn drop(&mut self) {
        if self.keep {
            log_debug(&format!("keeping run directory {}", self.path.display()));
            return;
        }
        self.cancel.remove_scratch_dir();
    }
}

/// Run the full pipeline against the real terminal.
pub fn run_pipeline(config: &AppConfig, cancel: &CancelToken) -> Result<()> {
    let run_dir = RunDir::create(config.keep_audio, cancel)?;
    let wav = run_dir.path().join("audio.wav");

    let started = Instant::now();
    audio::record_wav(
        &wav,
        config.seconds,
        &config.ffmpeg_cmd,
        config.ffmpeg_device.as_deref(),
        cancel,
    )?;
    let record_elapsed = started.elapsed();
    log_timing("record", record_elapsed);

    let stt_started = Instant::now();
    let transcript = stt::transcribe(
        &TranscribeRequest {
            audio: &wav,
            whisper_cmd: &config.whisper_cmd,
            lang: &config.lang,
            model: &config.whisper_model,
            model_path: config.whisper_model_path.as_deref(),
            out_dir: run_dir.path(),
            timeout: config.stt_timeout(),
        },
        cancel,
    )?;
    let stt_elapsed = stt_started.elapsed();
    log_timing("stt", stt_elapsed);

    let stdout = io::stdout();
    let prompt = if config.emit_json {
        transcript.clone()
    } else {
        let stdin = io::stdin();
        review_transcript(&transcript, &mut stdin.lock(), &mut stdout.lock())
            .context("failed to read edited prompt")?
    };
    log_debug_content(&format!("prompt: {prompt}"));

    let codex_started = Instant::now();
    let codex_output = if config.no_codex {
        None
    } else {
        if !config.emit_json {
            let mut out = stdout.lock();
            writeln!(out, "\n[Codex output]")?;
            out.flush()?;
        }
        send_to_codex(config, &prompt, cancel)?
    };
    let codex_elapsed = if config.no_codex {
        Duration::ZERO
    } else {
        codex_started.elapsed()
    };
    log_timing("codex", codex_elapsed);

    let metrics = PipelineMetrics::from_phases(record_elapsed, stt_elapsed, codex_elapsed);
    log_timing("total", started.elapsed());
    tracing::info!(
        record_s = metrics.record_s,
        stt_s = metrics.stt_s,
        codex_s = metrics.codex_s,
        total_s = metrics.total_s,
        "pipeline finished"
    );

    let mut out = stdout.lock();
    if config.emit_json {
        let result = PipelineJsonResult {
            transcript,
            prompt,
            codex_output: codex_output.as_deref().map(clean_codex_output),
            metrics,
        };
        writeln!(out, "{}", serde_json::to_string(&result)?)?;
    } else {
        if let Some(output) = &codex_output {
            writeln!(out, "{}", String::from_utf8_lossy(output).trim_end())?;
        }
        writeln!(out, "\n{}", metrics.latency_line())?;
    }
    out.flush()?;
    drop(out);

    if config.say_ready && !config.no_codex {
        say_ready(cancel);
    }
    if config.keep_audio && !config.emit_json {
        eprintln!("Audio kept in {}", run_dir.path().display());
    }
    Ok(())
}

/// Returns captured bytes, or `None` when Codex wrote straight to the terminal.
fn send_to_codex(config: &AppConfig, prompt: &str, cancel: &CancelToken) -> Result<Option<Vec<u8>>> {
    let request = InvocationRequest::new(&config.codex_cmd, prompt)
        .with_extra_args(config.extra_codex_args()?)
        .with_timeout(config.codex_timeout())
        .with_env("TERM", &config.term_value);
    let runner = SystemRunner::new(cancel.clone())
        .allow_direct(!(config.capture_output || config.emit_json));
    let outcome = invoke_checked(&request, &runner)?;
    Ok(outcome.into_result()?)
}

fn say_ready(cancel: &CancelToken) {
    if !cfg!(target_os = "macos") {
        return;
    }
    let spec = ProcessSpec::new(["say", READY_PHRASE]).with_timeout(Some(SAY_TIMEOUT));
    if let Err(err) = codex::run_captured(&spec, cancel) {
        log_debug(&format!("say failed: {err}"));
    }
}
