use crate::codex::DEFAULT_TERM;
use std::env;

pub const DEFAULT_RECORD_SECONDS: u64 = 5;
pub const DEFAULT_CODEX_TIMEOUT_SECS: u64 = 180;
pub const DEFAULT_STT_TIMEOUT_SECS: u64 = 300;

pub(super) const MIN_RECORD_SECONDS: u64 = 1;
pub(super) const MAX_RECORD_SECONDS: u64 = 60;
pub(super) const MAX_CODEX_ARGS: usize = 64;
pub(super) const MAX_CODEX_ARG_BYTES: usize = 8 * 1024;
pub(super) const MAX_FFMPEG_DEVICE_LEN: usize = 256;
pub(super) const ISO_639_1_CODES: &[&str] = &[
    "af", "am", "ar", "az", "be", "bg", "bn", "bs", "ca", "cs", "cy", "da", "de", "el", "en", "es",
    "et", "eu", "fa", "fi", "fil", "fr", "ga", "gl", "gu", "he", "hi", "hr", "hu", "hy", "id",
    "is", "it", "ja", "jv", "ka", "kk", "km", "kn", "ko", "lo", "lt", "lv", "mk", "ml", "mn", "mr",
    "ms", "my", "ne", "nl", "no", "pa", "pl", "pt", "ro", "ru", "si", "sk", "sl", "sq", "sr", "sv",
    "sw", "ta", "te", "th", "tr", "uk", "ur", "vi", "zh",
];
// The device string lands in an ffmpeg argv; keep anything shell-flavoured out of it.
pub(super) const FORBIDDEN_DEVICE_CHARS: &[char] =
    &[';', '|', '&', '$', '`', '<', '>', '\\', '\'', '"'];

pub(super) fn default_term() -> String {
    term_or_default(env::var("TERM").ok())
}

pub(super) fn term_or_default(term: Option<String>) -> String {
    term.filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TERM.to_string())
}
