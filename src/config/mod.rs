//! Command-line parsing and validation helpers.

mod defaults;
mod validation;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use std::time::Duration;

use defaults::default_term;
pub use defaults::{DEFAULT_CODEX_TIMEOUT_SECS, DEFAULT_RECORD_SECONDS, DEFAULT_STT_TIMEOUT_SECS};

/// CLI options for codex-voice. Validated values keep downstream subprocesses safe.
#[derive(Debug, Parser, Clone)]
#[command(
    name = "codex-voice",
    about = "Record a voice prompt, transcribe it, and send it to Codex",
    author,
    version
)]
pub struct AppConfig {
    /// Recording duration in seconds
    #[arg(long, default_value_t = DEFAULT_RECORD_SECONDS)]
    pub seconds: u64,

    /// Language passed to Whisper (ISO-639-1, optional region suffix, or 'auto')
    #[arg(long, default_value = "en")]
    pub lang: String,

    /// Path to whisper executable (OpenAI whisper CLI or whisper.cpp)
    #[arg(long, default_value = "whisper")]
    pub whisper_cmd: String,

    /// Whisper model name (OpenAI whisper CLI)
    #[arg(long, default_value = "small")]
    pub whisper_model: String,

    /// Whisper model path (required for whisper.cpp)
    #[arg(long)]
    pub whisper_model_path: Option<String>,

    /// Path to the Codex CLI binary
    #[arg(long, default_value = "codex")]
    pub codex_cmd: String,

    /// Extra arguments for the Codex CLI as one shell-style string
    #[arg(long = "codex-args", default_value = "", allow_hyphen_values = true)]
    pub codex_args_line: String,

    /// Extra argument for the Codex CLI (repeatable, appended after --codex-args)
    #[arg(
        long = "codex-arg",
        action = ArgAction::Append,
        value_name = "ARG",
        allow_hyphen_values = true
    )]
    pub codex_args: Vec<String>,

    /// Per-attempt Codex timeout in seconds (0 disables)
    #[arg(long, default_value_t = DEFAULT_CODEX_TIMEOUT_SECS)]
    pub codex_timeout_secs: u64,

    /// Transcription timeout in seconds (0 disables)
    #[arg(long, default_value_t = DEFAULT_STT_TIMEOUT_SECS)]
    pub stt_timeout_secs: u64,

    /// FFmpeg binary location
    #[arg(long, default_value = "ffmpeg")]
    pub ffmpeg_cmd: String,

    /// FFmpeg audio device override
    #[arg(long)]
    pub ffmpeg_device: Option<String>,

    /// TERM value exported to Codex
    #[arg(long = "term", default_value_t = default_term())]
    pub term_value: String,

    /// Speak "Codex result ready" when done (macOS only)
    #[arg(long)]
    pub say_ready: bool,

    /// Keep the recorded audio and transcript on disk
    #[arg(long)]
    pub keep_audio: bool,

    /// Stop after transcription
    #[arg(long)]
    pub no_codex: bool,

    /// Skip the edit prompt and print one JSON object with transcript, output, and timings
    #[arg(long)]
    pub emit_json: bool,

    /// Always capture Codex output instead of handing it the terminal
    #[arg(long)]
    pub capture_output: bool,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "CODEX_VOICE_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "CODEX_VOICE_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Allow logging prompt/transcript snippets (debug log only)
    #[arg(
        long = "log-content",
        env = "CODEX_VOICE_LOG_CONTENT",
        default_value_t = false
    )]
    pub log_content: bool,

    /// Enable per-phase timing logs
    #[arg(long)]
    pub log_timings: bool,
}

impl AppConfig {
    /// The fixed argument list placed after the Codex command on every attempt:
    /// `--codex-args` split shell-style, then each `--codex-arg` in order.
    pub fn extra_codex_args(&self) -> Result<Vec<String>> {
        let mut args = shell_words::split(&self.codex_args_line)
            .with_context(|| format!("failed to parse --codex-args '{}'", self.codex_args_line))?;
        args.extend(self.codex_args.iter().cloned());
        Ok(args)
    }

    pub fn codex_timeout(&self) -> Option<Duration> {
        seconds_or_none(self.codex_timeout_secs)
    }

    pub fn stt_timeout(&self) -> Option<Duration> {
        seconds_or_none(self.stt_timeout_secs)
    }

    /// Whether the file logger and tracing subscriber should run.
    pub fn logging_enabled(&self) -> bool {
        (self.logs || self.log_timings) && !self.no_logs
    }
}

fn seconds_or_none(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
