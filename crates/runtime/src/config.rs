use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use worldspace_kernel::PhysicsConfig;
use worldspace_quality::QualityConfig;
use worldspace_sandbox::SandboxLimits;

use crate::RuntimeError;

/// Bounded retry schedule for [`crate::WorldRuntime::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl RetryPolicy {
    /// Delay before the attempt following attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        let ms = self.initial_backoff_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(ms.min(self.max_backoff_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 2_000,
        }
    }
}

/// Everything a [`crate::WorldRuntime`] is built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub physics: PhysicsConfig,
    pub quality: QualityConfig,
    pub sandbox: SandboxLimits,
    pub retry: RetryPolicy,
    /// Upper bound on one frame's delta, in seconds.
    pub max_delta: f64,
    /// Spawn the static ground slab on first initialization.
    pub ground: bool,
    /// Frame durations kept for the summary statistics.
    pub frame_history: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            physics: PhysicsConfig::default(),
            quality: QualityConfig::default(),
            sandbox: SandboxLimits::default(),
            retry: RetryPolicy::default(),
            max_delta: 0.1,
            ground: true,
            frame_history: 120,
        }
    }
}

impl RuntimeConfig {
    /// Load from a `.json`, `.yaml` or `.yml` file. Missing fields keep
    /// their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let parsed = if is_json {
            serde_json::from_str(&text).map_err(|e| e.to_string())
        } else {
            serde_yaml::from_str(&text).map_err(|e| e.to_string())
        };
        parsed.map_err(|message| RuntimeError::Config {
            path: path.display().to_string(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn backoff_doubles_up_to_cap() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (1..=7).map(|n| policy.backoff(n).as_millis() as u64).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1600, 2000, 2000]);
    }

    #[test]
    fn yaml_overrides_only_named_fields() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "max_delta: 0.05\nquality:\n  window_ms: 500\nsandbox:\n  max_operations: 1000").unwrap();
        let config = RuntimeConfig::load(file.path()).unwrap();
        assert_eq!(config.max_delta, 0.05);
        assert_eq!(config.quality.window_ms, 500);
        assert_eq!(config.quality.medium_below_fps, 30.0);
        assert_eq!(config.sandbox.max_operations, 1000);
        assert_eq!(config.retry, RetryPolicy::default());
        assert!(config.ground);
    }

    #[test]
    fn json_config_is_accepted() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"ground": false, "physics": {{"gravity": [0.0, -1.62, 0.0]}}}}"#).unwrap();
        let config = RuntimeConfig::load(file.path()).unwrap();
        assert!(!config.ground);
        assert_eq!(config.physics.gravity.y, -1.62);
    }

    #[test]
    fn malformed_file_names_its_path() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = RuntimeConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, RuntimeError::Config { .. }));
    }
}
