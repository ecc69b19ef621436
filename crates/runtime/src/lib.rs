//! World runtime: the Simulation Loop that owns every registry, plus the Mod
//! Ingestion Pipeline that feeds it.
//!
//! # Invariants
//! - Within a tick: physics step, then sync, then effects, then animation
//!   tasks, then render.
//! - Nothing a mod does can change the loop's state; only host signals
//!   (context loss, exhausted init retries) and explicit calls do.
//! - Automatic quality changes only go down; reinitializing restores high.

mod config;
mod events;
mod host;
mod ingest;
mod runtime;
mod summary;

pub use config::{RetryPolicy, RuntimeConfig};
pub use events::{EventOutcome, InboundEvent};
pub use host::{HeadlessHost, Host, HostError};
pub use ingest::{IngestError, Ingested, LoadTicket, ModRecord, ModStatus};
pub use runtime::{FrameReport, LoopState, PauseReason, WorldRuntime};
pub use summary::RuntimeSummary;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("runtime has been torn down")]
    TornDown,
    #[error("initialization failed after {attempts} attempts: {source}")]
    InitFailed {
        attempts: u32,
        #[source]
        source: HostError,
    },
    #[error("config {path}: {message}")]
    Config { path: String, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub fn crate_info() -> &'static str {
    "worldspace-runtime v0.1.0"
}
