//! Invocation layer: gets a prompt into the assistant CLI whatever its terminal
//! requirements, and hands back either captured output or a full diagnostic trail.

mod cancel;
mod cli;
mod error;
mod invoke;
mod request;

pub use cancel::CancelToken;
pub use cli::{run_captured, run_direct, ProcessSpec};
pub use error::RunError;
pub use invoke::{
    invoke, invoke_checked, is_terminal_requirement_error, AttemptRunner, SystemRunner,
};
pub use request::{
    AggregateFailure, AttemptError, AttemptFailure, AttemptMode, InvocationOutcome,
    InvocationRequest, DEFAULT_TERM,
};

pub(crate) use cli::{kill_and_reap, spawn_child, KillScope};
pub(crate) use request::with_trailing_newline;
