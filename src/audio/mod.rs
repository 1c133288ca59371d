//! Microphone capture through ffmpeg.
//!
//! One fixed ffmpeg invocation records a mono 16 kHz WAV clip. Which input
//! format and default device to use is a pure function of the host platform;
//! `--ffmpeg-device` overrides the device.

mod device;

pub use device::{input_backend, resolve_device, HostPlatform, InputBackend};

use crate::codex::{run_captured, CancelToken, ProcessSpec};
use crate::log_debug;
use crate::tools::require_command;
use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;

/// Target sample rate for Whisper STT.
pub const TARGET_RATE: u32 = 16_000;

/// Target channel count for Whisper STT.
pub const TARGET_CHANNELS: u32 = 1;

/// Extra time ffmpeg gets beyond the clip length to open the device and flush the file.
const CAPTURE_GRACE: Duration = Duration::from_secs(15);

/// Full ffmpeg argv for recording `seconds` of audio into `output`.
pub fn ffmpeg_record_args(
    ffmpeg_cmd: &str,
    platform: HostPlatform,
    device_override: Option<&str>,
    seconds: u64,
    output: &Path,
) -> Vec<String> {
    let backend = input_backend(platform);
    let device = resolve_device(platform, device_override);
    vec![
        ffmpeg_cmd.to_string(),
        "-y".to_string(),
        "-f".to_string(),
        backend.format.to_string(),
        "-i".to_string(),
        device.to_string(),
        "-t".to_string(),
        seconds.to_string(),
        "-ac".to_string(),
        TARGET_CHANNELS.to_string(),
        "-ar".to_string(),
        TARGET_RATE.to_string(),
        "-vn".to_string(),
        output.to_string_lossy().into_owned(),
    ]
}

/// Record a clip into `output`, failing if ffmpeg is missing, the OS has no
/// capture backend, or ffmpeg exits non-zero.
pub fn record_wav(
    output: &Path,
    seconds: u64,
    ffmpeg_cmd: &str,
    device_override: Option<&str>,
    cancel: &CancelToken,
) -> Result<()> {
    require_command(ffmpeg_cmd).context("audio capture failed")?;
    let platform = HostPlatform::current().context("audio capture failed")?;
    let argv = ffmpeg_record_args(ffmpeg_cmd, platform, device_override, seconds, output);
    log_debug(&format!("recording {seconds}s via {platform:?}"));

    let spec = ProcessSpec::new(argv)
        .with_timeout(Some(Duration::from_secs(seconds) + CAPTURE_GRACE));
    run_captured(&spec, cancel).context("audio capture failed")?;
    Ok(())
}
