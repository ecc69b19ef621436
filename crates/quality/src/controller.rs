use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Discrete fidelity level, ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    Medium,
    High,
}

impl QualityTier {
    /// Render and effect settings for this tier.
    pub fn settings(&self) -> TierSettings {
        match self {
            QualityTier::High => TierSettings {
                pixel_ratio: 2.0,
                shadows: true,
                antialias: true,
                particle_density: 1.0,
            },
            QualityTier::Medium => TierSettings {
                pixel_ratio: 1.5,
                shadows: true,
                antialias: false,
                particle_density: 0.5,
            },
            QualityTier::Low => TierSettings {
                pixel_ratio: 1.0,
                shadows: false,
                antialias: false,
                particle_density: 0.25,
            },
        }
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            QualityTier::Low => "low",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierSettings {
    pub pixel_ratio: f32,
    pub shadows: bool,
    pub antialias: bool,
    pub particle_density: f32,
}

/// Sampling window and downgrade thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Length of one sampling window, in milliseconds.
    pub window_ms: u64,
    /// `high -> medium` below this many frames per second.
    pub medium_below_fps: f32,
    /// `medium -> low` below this many frames per second.
    pub low_below_fps: f32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            window_ms: 1000,
            medium_below_fps: 30.0,
            low_below_fps: 20.0,
        }
    }
}

impl QualityConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms.max(1))
    }
}

/// A downgrade decided at a window boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierChange {
    pub from: QualityTier,
    pub to: QualityTier,
    pub fps: f32,
}

/// Samples frame rate over fixed windows and lowers the tier when it drops.
#[derive(Debug, Clone)]
pub struct QualityController {
    config: QualityConfig,
    tier: QualityTier,
    window_start: Option<Duration>,
    frames: u32,
    fps: f32,
}

impl QualityController {
    pub fn new(config: QualityConfig) -> Self {
        Self {
            config,
            tier: QualityTier::High,
            window_start: None,
            frames: 0,
            fps: 0.0,
        }
    }

    pub fn tier(&self) -> QualityTier {
        self.tier
    }

    /// Frame rate measured at the last window boundary.
    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Frames counted in the window that is still open.
    pub fn frames_in_window(&self) -> u32 {
        self.frames
    }

    /// Count one rendered frame at time `now`. Returns the transition taken
    /// if this frame closed a window and the measured rate warranted one.
    pub fn record_frame(&mut self, now: Duration) -> Option<TierChange> {
        let Some(start) = self.window_start else {
            self.window_start = Some(now);
            return None;
        };
        self.frames += 1;
        let elapsed = now.saturating_sub(start);
        if elapsed < self.config.window() {
            return None;
        }

        self.fps = self.frames as f32 / elapsed.as_secs_f32();
        self.frames = 0;
        self.window_start = Some(now);

        let next = if self.fps < self.config.low_below_fps && self.tier == QualityTier::Medium {
            QualityTier::Low
        } else if self.fps < self.config.medium_below_fps && self.tier == QualityTier::High {
            QualityTier::Medium
        } else {
            return None;
        };
        let change = TierChange {
            from: self.tier,
            to: next,
            fps: self.fps,
        };
        tracing::info!(from = %change.from, to = %change.to, fps = change.fps, "quality tier lowered");
        self.tier = next;
        Some(change)
    }

    /// Back to `High` with a fresh window. Only explicit reinitialization
    /// does this.
    pub fn reset(&mut self) {
        self.tier = QualityTier::High;
        self.window_start = None;
        self.frames = 0;
        self.fps = 0.0;
    }

    /// Drop the open window without touching the tier, so a gap in frame
    /// delivery (a pause) is not measured as a slow window.
    pub fn restart_window(&mut self) {
        self.window_start = None;
        self.frames = 0;
    }
}

impl Default for QualityController {
    fn default() -> Self {
        Self::new(QualityConfig::default())
    }
}
