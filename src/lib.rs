//! Voice front end for the Codex CLI: record a clip with ffmpeg, transcribe it
//! with Whisper, and deliver the text to Codex through whichever invocation
//! mode the CLI accepts.

pub mod app;
pub mod audio;
pub mod codex;
pub mod config;
pub mod pty_session;
pub mod stt;
pub mod telemetry;
pub mod tools;

pub use app::logging::{init_logging, log_debug, log_debug_content, log_panic, log_timing};
