use std::time::Duration;
use worldspace_quality::QualityTier;

use crate::runtime::LoopState;

/// Point-in-time counts for inspection and the CLI.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSummary {
    pub state: LoopState,
    pub frame: u64,
    pub elapsed: f64,
    pub entities: usize,
    pub mod_owned: usize,
    pub bodies: usize,
    pub tasks_active: usize,
    /// Failed tasks still kept for inspection.
    pub tasks_inactive: usize,
    pub particles: usize,
    pub markers: usize,
    pub tier: QualityTier,
    pub fps: f32,
    pub avg_frame: Duration,
    pub max_frame: Duration,
    pub pending_loads: usize,
    pub mods_loaded: usize,
    pub mods_failed: usize,
    pub cache_hits: u64,
}

impl std::fmt::Display for RuntimeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Runtime: {} frame={} t={:.2}s tier={} fps={:.1}",
            self.state, self.frame, self.elapsed, self.tier, self.fps
        )?;
        writeln!(
            f,
            "Entities: {} ({} mod-owned, {} bodies), particles={}, markers={}",
            self.entities, self.mod_owned, self.bodies, self.particles, self.markers
        )?;
        writeln!(
            f,
            "Tasks: {} active, {} failed",
            self.tasks_active, self.tasks_inactive
        )?;
        writeln!(
            f,
            "Mods: {} loaded, {} failed, {} pending, cache hits={}",
            self.mods_loaded, self.mods_failed, self.pending_loads, self.cache_hits
        )?;
        write!(
            f,
            "Frame time: avg={:.2}ms max={:.2}ms",
            self.avg_frame.as_secs_f64() * 1000.0,
            self.max_frame.as_secs_f64() * 1000.0
        )
    }
}
