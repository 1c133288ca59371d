//! Application layer: file logging and the voice-to-Codex pipeline driver.

pub mod logging;
mod pipeline;

pub use pipeline::{
    choose_prompt, clean_codex_output, review_transcript, run_pipeline, PipelineJsonResult,
    PipelineMetrics,
};
