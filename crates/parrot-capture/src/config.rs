//! Configuration for the capture engine.

use crate::replay::ReplayOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Origin prefix identifying the capture system's own traffic,
    /// e.g. `ext://parrot-3f9c`. Requests from or to this origin are never
    /// captured.
    pub self_origin: String,

    /// Marker header appended to every replayed request so the self-traffic
    /// filter recognizes replays.
    #[serde(default = "default_marker_header")]
    pub marker_header: String,

    #[serde(default)]
    pub sweep: SweepConfig,

    #[serde(default)]
    pub replay: ReplayConfig,
}

/// Age-based purge of records whose completion event never arrives
/// (dropped connections, navigation away).
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepConfig {
    /// Interval between sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub interval_secs: u64,
    /// Age beyond which unresolved records are purged regardless of replay
    /// state.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval_secs(),
            max_age_secs: default_max_age_secs(),
        }
    }
}

/// Replay execution policy.
///
/// The defaults mirror the diagnostic posture this engine was built for:
/// credentialed, cross-origin, cache-bypassing replay with redirects
/// followed. Deployments that consider that too wide can narrow each flag.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayConfig {
    #[serde(default = "default_true")]
    pub include_credentials: bool,
    #[serde(default = "default_true")]
    pub cross_origin_allowed: bool,
    #[serde(default = "default_true")]
    pub cache_bypass: bool,
    #[serde(default = "default_true")]
    pub follow_redirects: bool,
    #[serde(default)]
    pub retention: RetentionPolicy,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            include_credentials: true,
            cross_origin_allowed: true,
            cache_bypass: true,
            follow_redirects: true,
            retention: RetentionPolicy::default(),
        }
    }
}

/// What happens to a record once its replay outcome is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RetentionPolicy {
    /// Keep replayed records for inspection until the age sweep purges them.
    #[default]
    Retain,
    /// Drop a record as soon as its replay outcome is recorded.
    Purge,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.self_origin.is_empty() {
            anyhow::bail!("'selfOrigin' must not be empty: the self-traffic filter needs it to break replay feedback loops");
        }

        if self.marker_header.is_empty()
            || !self
                .marker_header
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        {
            anyhow::bail!(
                "'markerHeader' must be a lowercase header name (got '{}')",
                self.marker_header
            );
        }

        if self.sweep.interval_secs == 0 {
            anyhow::bail!("'sweep.intervalSecs' must be greater than zero");
        }

        if self.sweep.max_age_secs == 0 {
            anyhow::bail!("'sweep.maxAgeSecs' must be greater than zero");
        }

        Ok(())
    }

    pub fn replay_options(&self) -> ReplayOptions {
        ReplayOptions {
            include_credentials: self.replay.include_credentials,
            cross_origin_allowed: self.replay.cross_origin_allowed,
            cache_bypass: self.replay.cache_bypass,
            follow_redirects: self.replay.follow_redirects,
        }
    }
}

fn default_marker_header() -> String {
    "x-parrot-replay".to_string()
}

fn default_sweep_interval_secs() -> u64 {
    30 * 60
}

fn default_max_age_secs() -> u64 {
    60 * 60
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn minimal_config() -> Config {
        serde_yaml::from_str("selfOrigin: \"ext://parrot-test\"").unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let config = minimal_config();
        assert_eq!(config.marker_header, "x-parrot-replay");
        assert_eq!(config.sweep.interval_secs, 1800);
        assert_eq!(config.sweep.max_age_secs, 3600);
        assert!(config.replay.include_credentials);
        assert!(config.replay.cross_origin_allowed);
        assert!(config.replay.cache_bypass);
        assert!(config.replay.follow_redirects);
        assert_eq!(config.replay.retention, RetentionPolicy::Retain);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_self_origin_rejected() {
        let mut config = minimal_config();
        config.self_origin = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_uppercase_marker_header_rejected() {
        let mut config = minimal_config();
        config.marker_header = "X-Parrot-Replay".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_sweep_interval_rejected() {
        let mut config = minimal_config();
        config.sweep.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "selfOrigin: \"ext://parrot-abc\"\nreplay:\n  crossOriginAllowed: false\n  retention: purge\nsweep:\n  intervalSecs: 60\n  maxAgeSecs: 120"
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.self_origin, "ext://parrot-abc");
        assert!(!config.replay.cross_origin_allowed);
        assert!(config.replay.include_credentials);
        assert_eq!(config.replay.retention, RetentionPolicy::Purge);
        assert_eq!(config.sweep.interval_secs, 60);
        assert_eq!(config.sweep.max_age_secs, 120);
    }
}
