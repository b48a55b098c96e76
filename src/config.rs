//! Harness configuration.
//!
//! All timing and buffering knobs for the simulated medium, the capture
//! engine, and the matcher live here. Defaults suit in-process
//! simulation; a YAML file can override any subset of fields:
//!
//! ```yaml
//! match_timeout_ms: 5000
//! settle_timeout_ms: 10000
//! advertisement_interval_ms: 700
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Tunables for a harness run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// How long a matcher waits for an expected message before failing.
    pub match_timeout_ms: u64,

    /// How long to wait for a device role transition (attach, promotion).
    pub settle_timeout_ms: u64,

    /// Interval between periodic advertisements from routing devices.
    pub advertisement_interval_ms: u64,

    /// How long a ping waits for its echo reply.
    pub ping_timeout_ms: u64,

    /// Buffer size for medium frame channels.
    pub channel_buffer: usize,

    /// Default delay between child attach and router promotion.
    pub router_selection_jitter_ms: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            match_timeout_ms: 5_000,
            settle_timeout_ms: 10_000,
            advertisement_interval_ms: 700,
            ping_timeout_ms: 1_000,
            channel_buffer: 64,
            router_selection_jitter_ms: 1_000,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a YAML file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::ParseYaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Matcher wait deadline.
    pub fn match_timeout(&self) -> Duration {
        Duration::from_millis(self.match_timeout_ms)
    }

    /// Role transition deadline.
    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    /// Advertisement period.
    pub fn advertisement_interval(&self) -> Duration {
        Duration::from_millis(self.advertisement_interval_ms)
    }

    /// Echo reply deadline.
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    /// Router promotion delay.
    pub fn router_selection_jitter(&self) -> Duration {
        Duration::from_millis(self.router_selection_jitter_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.match_timeout(), Duration::from_secs(5));
        assert_eq!(config.channel_buffer, 64);
    }

    #[test]
    fn test_load_partial_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "match_timeout_ms: 250").unwrap();
        writeln!(file, "channel_buffer: 8").unwrap();

        let config = HarnessConfig::load_from(file.path()).unwrap();
        assert_eq!(config.match_timeout(), Duration::from_millis(250));
        assert_eq!(config.channel_buffer, 8);
        // untouched fields keep defaults
        assert_eq!(config.ping_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_load_missing_file() {
        let err = HarnessConfig::load_from(Path::new("/nonexistent/harness.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_load_bad_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "match_timeout_ms: [not a number").unwrap();
        let err = HarnessConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseYaml { .. }));
    }
}
