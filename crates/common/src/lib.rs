//! Shared types for the worldspace mod runtime.
//!
//! Everything here is plain data: identifiers, transforms, mod descriptors and
//! the outbound notification record. No crate in the workspace depends on
//! anything lighter than this.

mod mods;
mod notice;
mod types;

pub use mods::{Mod, ModKind, ModMetadata, ModPayload};
pub use notice::{Notification, Severity};
pub use types::{EntityId, ModId, TaskId, Transform, color_to_rgb, rgb_to_color};
