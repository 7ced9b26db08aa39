use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{Result, SyncError};

/// Upper bound for every configured duration.
const MAX_CONFIG_SECONDS: f64 = 86_400.0;

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sync: SyncConfig,
    pub driver: DriverConfig,
}

impl AppConfig {
    pub fn live_defaults() -> Self {
        Self::default()
    }

    /// Parses a JSON document. Missing sections and fields fall back to their
    /// defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        tracing::info!(?path, "loading configuration");
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        self.sync.validate()?;
        if self.driver.frame_interval_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "frame_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Timing constants of the lyrics synchronisation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// A pause longer than this after a line marks the line as a fade-out
    /// boundary.
    pub fade_out_threshold_ms: f64,
    /// How early a line is shown before it starts after a fade-in.
    pub fade_in_attack_seconds: f64,
    pub countdown_seconds: f64,
    /// Width of the lead-time window in which the countdown may arm.
    pub countdown_arm_window_seconds: f64,
    pub update_throttle_ms: u64,
    /// How long lyrics stay up after the last line or a fade-out line ends.
    pub tail_ms: f64,
    /// Backward clock movement beyond this is handled like a seek.
    pub clock_regression_tolerance_ms: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fade_out_threshold_ms: 5_000.0,
            fade_in_attack_seconds: 10.0,
            countdown_seconds: 3.0,
            countdown_arm_window_seconds: 0.5,
            update_throttle_ms: 50,
            tail_ms: 3_000.0,
            clock_regression_tolerance_ms: 100.0,
        }
    }
}

impl SyncConfig {
    pub fn fade_in_attack_ms(&self) -> f64 {
        self.fade_in_attack_seconds * 1_000.0
    }

    pub fn countdown_ms(&self) -> f64 {
        self.countdown_seconds * 1_000.0
    }

    pub fn countdown_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.countdown_seconds).unwrap_or(Duration::MAX)
    }

    pub fn update_throttle(&self) -> Duration {
        Duration::from_millis(self.update_throttle_ms)
    }

    /// Returns true when `lead_ms` lies inside the countdown arming window.
    pub fn in_countdown_window(&self, lead_ms: f64) -> bool {
        let start = self.countdown_ms();
        let end = start + self.countdown_arm_window_seconds * 1_000.0;
        lead_ms >= start && lead_ms <= end
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("fade_out_threshold_ms", self.fade_out_threshold_ms / 1_000.0),
            ("fade_in_attack_seconds", self.fade_in_attack_seconds),
            ("countdown_seconds", self.countdown_seconds),
            (
                "countdown_arm_window_seconds",
                self.countdown_arm_window_seconds,
            ),
            ("tail_ms", self.tail_ms / 1_000.0),
            (
                "clock_regression_tolerance_ms",
                self.clock_regression_tolerance_ms / 1_000.0,
            ),
            ("update_throttle_ms", self.update_throttle_ms as f64 / 1_000.0),
        ];
        for (name, seconds) in fields {
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(SyncError::InvalidConfig(format!(
                    "{name} must be a non-negative number"
                )));
            }
            if seconds > MAX_CONFIG_SECONDS {
                return Err(SyncError::InvalidConfig(format!(
                    "{name} must not exceed {MAX_CONFIG_SECONDS} seconds"
                )));
            }
        }
        if self.countdown_seconds == 0.0 {
            return Err(SyncError::InvalidConfig(
                "countdown_seconds must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Cadence of the frame loop that drives the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub frame_interval_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 16,
        }
    }
}
