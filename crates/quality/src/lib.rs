//! Adaptive quality: frame-rate sampling and tier downgrades under load.
//!
//! # Invariants
//! - Automatic transitions only ever lower the tier.
//! - A transition is reported once, at the window boundary that caused it.

mod controller;
mod timer;

pub use controller::{QualityConfig, QualityController, QualityTier, TierChange, TierSettings};
pub use timer::FrameTimer;

pub fn crate_info() -> &'static str {
    "worldspace-quality v0.1.0"
}
