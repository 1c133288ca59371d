use super::defaults::{
    FORBIDDEN_DEVICE_CHARS, ISO_639_1_CODES, MAX_CODEX_ARGS, MAX_CODEX_ARG_BYTES,
    MAX_FFMPEG_DEVICE_LEN, MAX_RECORD_SECONDS, MIN_RECORD_SECONDS,
};
use super::AppConfig;
use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::{fs, path::Path};

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values and normalize paths.
    pub fn validate(&mut self) -> Result<()> {
        if !(MIN_RECORD_SECONDS..=MAX_RECORD_SECONDS).contains(&self.seconds) {
            bail!(
                "--seconds must be between {MIN_RECORD_SECONDS} and {MAX_RECORD_SECONDS}, got {}",
                self.seconds
            );
        }

        self.codex_cmd = sanitize_binary(&self.codex_cmd, "--codex-cmd")?;
        self.ffmpeg_cmd = sanitize_binary(&self.ffmpeg_cmd, "--ffmpeg-cmd")?;
        self.whisper_cmd = sanitize_binary(&self.whisper_cmd, "--whisper-cmd")?;

        if self.whisper_model.trim().is_empty() {
            bail!("--whisper-model must not be empty");
        }
        if let Some(model) = &mut self.whisper_model_path {
            let model_path = Path::new(model.as_str());
            if !model_path.exists() {
                bail!(
                    "whisper model path '{}' does not exist",
                    model_path.display()
                );
            }
            // Store a canonical absolute path for subprocesses.
            let canonical = model_path
                .canonicalize()
                .with_context(|| format!("failed to canonicalize whisper model path '{model}'"))?;
            *model = canonical
                .to_str()
                .map(|s| s.to_string())
                .ok_or_else(|| anyhow!("whisper model path must be valid UTF-8"))?;
        }

        validate_language(&self.lang)?;

        let extra = self.extra_codex_args()?;
        // Avoid huge argument lists when forwarding to Codex.
        if extra.len() > MAX_CODEX_ARGS {
            bail!(
                "too many Codex arguments (max {MAX_CODEX_ARGS}, got {})",
                extra.len()
            );
        }
        let total_arg_bytes: usize = extra.iter().map(|arg| arg.len()).sum();
        if total_arg_bytes > MAX_CODEX_ARG_BYTES {
            bail!("combined Codex argument length exceeds {MAX_CODEX_ARG_BYTES} bytes");
        }

        if let Some(device) = &self.ffmpeg_device {
            validate_device(device)?;
        }

        if self.term_value.trim().is_empty() {
            bail!("--term must not be empty");
        }

        Ok(())
    }
}

fn validate_language(lang: &str) -> Result<()> {
    if lang.trim().is_empty() {
        bail!("--lang must not be empty");
    }
    if lang.eq_ignore_ascii_case("auto") {
        return Ok(());
    }
    if !lang
        .chars()
        .all(|ch| ch.is_ascii_alphabetic() || ch == '-' || ch == '_')
    {
        bail!("--lang must contain only alphabetic characters or '-'/'_' separators");
    }
    // Locale-style values are fine; only the leading code is checked.
    let primary = lang
        .split(['-', '_'])
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    if !ISO_639_1_CODES.contains(&primary.as_str()) {
        bail!("--lang must start with a valid ISO-639-1 code or be 'auto', got '{lang}'");
    }
    Ok(())
}

pub(super) fn validate_device(device: &str) -> Result<()> {
    if device.trim().is_empty()
        || device.len() > MAX_FFMPEG_DEVICE_LEN
        || device.chars().any(|ch| ch.is_control())
        || device
            .chars()
            .any(|ch| FORBIDDEN_DEVICE_CHARS.contains(&ch))
    {
        bail!(
            "--ffmpeg-device must be 1-{MAX_FFMPEG_DEVICE_LEN} characters with no control or shell metacharacters"
        );
    }
    Ok(())
}

/// Accept a bare command name (resolved on PATH at spawn time) or an existing executable path.
pub(super) fn sanitize_binary(value: &str, flag: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("{flag} cannot be empty");
    }

    let path = Path::new(trimmed);
    if !path.is_absolute() && !trimmed.contains(std::path::MAIN_SEPARATOR) && !trimmed.contains('/')
    {
        if trimmed
            .chars()
            .any(|ch| ch.is_whitespace() || ch.is_control() || FORBIDDEN_DEVICE_CHARS.contains(&ch))
        {
            bail!("{flag} '{trimmed}' is not a plain command name");
        }
        return Ok(trimmed.to_string());
    }

    let canonical = path
        .canonicalize()
        .with_context(|| format!("failed to canonicalize {flag} '{trimmed}'"))?;
    let metadata = fs::metadata(&canonical)
        .with_context(|| format!("failed to inspect {flag} '{}'", canonical.display()))?;
    if !metadata.is_file() {
        bail!("{flag} '{}' is not a file", canonical.display());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = metadata.permissions().mode();
        if mode & 0o111 == 0 {
            bail!(
                "{flag} '{}' exists but is not executable (mode {:o})",
                canonical.display(),
                mode
            );
        }
    }
    canonical
        .to_str()
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow!("{flag} must be valid UTF-8"))
}
