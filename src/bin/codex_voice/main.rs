//! codex-voice entry point: parse flags, set up logging and Ctrl-C handling,
//! run one voice round trip.

use anyhow::{Context, Result};
use codex_voice::app::{logging::log_file_path, run_pipeline};
use codex_voice::codex::{CancelToken, RunError};
use codex_voice::config::AppConfig;
use codex_voice::telemetry::init_tracing;
use codex_voice::{init_logging, log_debug, log_panic};
use std::{panic, process};

const EXIT_FAILURE: i32 = 1;
const EXIT_INTERRUPTED: i32 = 130;

fn main() {
    let code = match run() {
        Ok(()) => 0,
        Err(err) if is_interrupted(&err) => {
            log_debug("run interrupted");
            eprintln!("\nInterrupted.");
            EXIT_INTERRUPTED
        }
        Err(err) => {
            log_debug(&format!("run failed: {err:#}"));
            eprintln!("Error: {err:#}");
            EXIT_FAILURE
        }
    };
    process::exit(code);
}

fn run() -> Result<()> {
    let config = AppConfig::parse_args()?;
    init_logging(&config);
    init_tracing(&config);
    log_debug("=== codex-voice started ===");
    log_debug(&format!("Log file: {:?}", log_file_path()));

    let previous_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        log_panic(info);
        previous_hook(info);
    }));

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        handler_token.cancel();
        // Runners notice the flag and kill their child; with none running, leave now.
        if !handler_token.has_inflight_child() {
            handler_token.remove_scratch_dir();
            eprintln!("\nInterrupted.");
            process::exit(EXIT_INTERRUPTED);
        }
    })
    .context("failed to set ctrl-c handler")?;

    run_pipeline(&config, &cancel)
}

fn is_interrupted(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<RunError>(),
            Some(RunError::Interrupted { .. })
        )
    })
}
