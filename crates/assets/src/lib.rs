//! Asset side of mod ingestion: classify dropped files, decode models and
//! images, parse declarative config payloads.
//!
//! Decoders are `async` so the runtime can track them as pending loads
//! without blocking its tick. Decoded models are cached by the SHA-256 of
//! their payload.

mod cache;
mod classify;
mod config;
mod loader;

pub use cache::{AssetCache, ContentHash};
pub use classify::{classify, read_mod_file};
pub use config::{ConfigEffect, ConfigError, ConfigOutcome, FogDecl, LightDecl, parse_config};
pub use loader::{ImageInfo, LoaderError, ModelInfo, decode_image, decode_model};

/// Errors from reading mod files off disk.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a file name: {0}")]
    BadPath(String),
}

pub fn crate_info() -> &'static str {
    "worldspace-assets v0.1.0"
}
