//! Rendering Adapter: renderer-agnostic interface.
//!
//! # Invariants
//! - Renderer cannot mutate world truth directly.
//! - Render state derives from world state and view.
//!
//! The text renderer stands in for a GPU backend. The trait is stable; a
//! GPU implementation can replace it without changing consumers.

mod renderer;

pub use renderer::{DebugTextRenderer, RenderView, Renderer};

pub fn crate_info() -> &'static str {
    "worldspace-render v0.1.0"
}
