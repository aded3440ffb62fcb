//! Simulation Configuration

use crate::sim::clock::replay_step;
use crate::sim::dataset::HorizonHours;
use crate::sim::error::{Result, SimError};
use crate::sim::window::NoiseProfile;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Clock policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimMode {
    /// Wall-clock time-of-day mirrored onto the dataset's day.
    Live,
    /// Fast-forward through the dataset, looping at the end.
    Replay,
}

impl Default for SimMode {
    fn default() -> Self {
        SimMode::Live
    }
}

impl std::fmt::Display for SimMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimMode::Live => write!(f, "live"),
            SimMode::Replay => write!(f, "replay"),
        }
    }
}

impl std::str::FromStr for SimMode {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "live" => Ok(SimMode::Live),
            "replay" => Ok(SimMode::Replay),
            other => Err(SimError::configuration(
                "mode",
                format!("unknown mode {:?} (expected live or replay)", other),
            )),
        }
    }
}

/// Main configuration for the simulation engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub mode: SimMode,

    /// Dataset minutes advanced per real second in REPLAY mode
    pub replay_speed: f64,

    /// Synthetic horizon (24 or 48)
    pub horizon_hours: HorizonHours,

    /// Real-time period between ticks
    #[serde(rename = "tick_period_ms", with = "duration_serde")]
    pub tick_period: Duration,

    /// Jitter the most recent record in LIVE mode
    pub live_noise: bool,

    /// Fixed seed for LIVE jitter (unset = entropy)
    pub noise_seed: Option<u64>,

    pub noise: NoiseProfile,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            mode: SimMode::Live,
            replay_speed: 60.0,
            horizon_hours: HorizonHours::H48,
            tick_period: Duration::from_millis(100),
            live_noise: true,
            noise_seed: None,
            noise: NoiseProfile::default(),
        }
    }
}

impl SimConfig {
    /// Reject values the clock cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !self.replay_speed.is_finite() || self.replay_speed <= 0.0 {
            return Err(SimError::configuration(
                "replay_speed",
                format!("must be a positive number, got {}", self.replay_speed),
            ));
        }
        if self.tick_period.is_zero() {
            return Err(SimError::configuration(
                "tick_period_ms",
                "must be greater than zero",
            ));
        }
        if replay_step(self.replay_speed, self.tick_period) <= 0 {
            return Err(SimError::configuration(
                "replay_speed",
                format!(
                    "{} min/s at {}ms advances less than 1ns per tick",
                    self.replay_speed,
                    self.tick_period.as_millis()
                ),
            ));
        }
        self.noise.validate()
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SimConfig = toml::from_str(content)
            .map_err(|e| SimError::configuration("toml", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SimError::configuration("path", format!("{}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }
}

// Serde helper for Duration (milliseconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = SimConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_period, Duration::from_millis(100));
        assert_eq!(config.horizon_hours, HorizonHours::H48);
    }

    #[test]
    fn test_rejects_non_positive_speed() {
        for speed in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let config = SimConfig {
                replay_speed: speed,
                ..Default::default()
            };
            assert!(matches!(
                config.validate(),
                Err(SimError::Configuration { field: "replay_speed", .. })
            ));
        }
    }

    #[test]
    fn test_rejects_speed_that_rounds_to_no_step() {
        let config = SimConfig {
            replay_speed: 1e-12,
            ..Default::default()
        };
        assert_eq!(replay_step(config.replay_speed, config.tick_period), 0);
        assert!(matches!(
            config.validate(),
            Err(SimError::Configuration { field: "replay_speed", .. })
        ));

        // Smallest speeds that still move the clock are accepted.
        let slow = SimConfig {
            replay_speed: 1e-9,
            ..Default::default()
        };
        assert!(slow.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_tick_period() {
        let config = SimConfig {
            tick_period: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SimError::Configuration { field: "tick_period_ms", .. })
        ));
    }

    #[test]
    fn test_parse_toml() {
        let config = SimConfig::from_toml_str(
            r#"
            mode = "replay"
            replay_speed = 30.0
            horizon_hours = 24
            tick_period_ms = 250
            noise_seed = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.mode, SimMode::Replay);
        assert_eq!(config.replay_speed, 30.0);
        assert_eq!(config.horizon_hours, HorizonHours::H24);
        assert_eq!(config.tick_period, Duration::from_millis(250));
        assert_eq!(config.noise_seed, Some(7));
        assert!(config.live_noise);
        assert_eq!(config.noise, NoiseProfile::default());
    }

    #[test]
    fn test_toml_rejects_unsupported_horizon() {
        let err = SimConfig::from_toml_str("horizon_hours = 12").unwrap_err();
        assert!(matches!(err, SimError::Configuration { .. }));
    }

    #[test]
    fn test_toml_rejects_zero_tick() {
        let err = SimConfig::from_toml_str("tick_period_ms = 0").unwrap_err();
        assert!(matches!(
            err,
            SimError::Configuration { field: "tick_period_ms", .. }
        ));
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("LIVE".parse::<SimMode>().unwrap(), SimMode::Live);
        assert_eq!("replay".parse::<SimMode>().unwrap(), SimMode::Replay);
        assert!("paused".parse::<SimMode>().is_err());
    }
}
