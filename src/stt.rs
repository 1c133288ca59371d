//! Whisper speech-to-text through an external CLI.
//!
//! Two tools are supported: the OpenAI `whisper` CLI (named model, writes
//! `<audio stem>.txt` into an output directory) and the whisper.cpp binary
//! (needs a ggml model file, writes to an explicit output base). Which one is
//! in use is decided from the executable name.

use crate::codex::{run_captured, CancelToken, ProcessSpec};
use crate::tools::require_command;
use crate::{log_debug, log_debug_content};
use anyhow::{anyhow, bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Output base handed to whisper.cpp inside the run directory.
const WHISPER_CPP_OUTPUT_BASE: &str = "transcript";

/// Which Whisper front end a command refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhisperEngine {
    /// OpenAI `whisper` Python CLI.
    OpenAi,
    /// whisper.cpp `main`-style binary.
    Cpp,
}

impl WhisperEngine {
    /// Executables whose file name starts with "whisper" (any case) are treated as
    /// the OpenAI CLI; everything else as whisper.cpp.
    pub fn detect(whisper_cmd: &str) -> Self {
        let exe = Path::new(whisper_cmd)
            .file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if exe.starts_with("whisper") {
            WhisperEngine::OpenAi
        } else {
            WhisperEngine::Cpp
        }
    }
}

/// Everything one transcription run needs.
#[derive(Debug, Clone)]
pub struct TranscribeRequest<'a> {
    pub audio: &'a Path,
    pub whisper_cmd: &'a str,
    pub lang: &'a str,
    pub model: &'a str,
    pub model_path: Option<&'a str>,
    /// Per-run directory the transcript is written into.
    pub out_dir: &'a Path,
    pub timeout: Option<Duration>,
}

/// Build the argv for `request` and report where the transcript will appear.
pub fn whisper_args(request: &TranscribeRequest<'_>) -> Result<(Vec<String>, PathBuf)> {
    let audio = request.audio.to_string_lossy().into_owned();
    match WhisperEngine::detect(request.whisper_cmd) {
        WhisperEngine::OpenAi => {
            let stem = request
                .audio
                .file_stem()
                .ok_or_else(|| anyhow!("audio path '{audio}' has no file name"))?;
            let transcript = request
                .out_dir
                .join(format!("{}.txt", stem.to_string_lossy()));
            let argv = vec![
                request.whisper_cmd.to_string(),
                audio,
                "--language".to_string(),
                request.lang.to_string(),
                "--model".to_string(),
                request.model.to_string(),
                "--output_format".to_string(),
                "txt".to_string(),
                "--output_dir".to_string(),
                request.out_dir.to_string_lossy().into_owned(),
            ];
            Ok((argv, transcript))
        }
        WhisperEngine::Cpp => {
            let Some(model_path) = request.model_path else {
                bail!("whisper.cpp requires --whisper-model-path to a ggml*.bin file");
            };
            let base = request.out_dir.join(WHISPER_CPP_OUTPUT_BASE);
            let argv = vec![
                request.whisper_cmd.to_string(),
                "-m".to_string(),
                model_path.to_string(),
                "-f".to_string(),
                audio,
                "-l".to_string(),
                request.lang.to_string(),
                "-otxt".to_string(),
                "-of".to_string(),
                base.to_string_lossy().into_owned(),
            ];
            Ok((argv, base.with_extension("txt")))
        }
    }
}

/// Run Whisper on the clip and return the trimmed transcript.
pub fn transcribe(request: &TranscribeRequest<'_>, cancel: &CancelToken) -> Result<String> {
    require_command(request.whisper_cmd).context("transcription failed")?;
    let (argv, transcript_path) = whisper_args(request)?;
    log_debug(&format!(
        "transcribing with {:?}",
        WhisperEngine::detect(request.whisper_cmd)
    ));

    let spec = ProcessSpec::new(argv).with_timeout(request.timeout);
    run_captured(&spec, cancel).context("transcription failed")?;

    if !transcript_path.exists() {
        bail!("Transcript file not found: {}", transcript_path.display());
    }
    let text = fs::read_to_string(&transcript_path)
        .with_context(|| format!("failed to read transcript {}", transcript_path.display()))?;
    let transcript = text.trim().to_string();
    log_debug_content(&format!("transcript: {transcript}"));
    Ok(transcript)
}
