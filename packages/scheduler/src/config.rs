//! TOML configuration for a traffic map session.
//!
//! Every field has a default, so an empty file (or no file) is valid. API
//! keys are never stored here; sections name the environment variable that
//! holds them instead.
//!
//! ```toml
//! [scheduler]
//! refresh_interval_secs = 60
//! cache_ttl_secs = 60
//! default_radius_miles = 5.0
//! default_corridor_width_miles = 1.0
//! filters = ["incidents", "construction"]
//!
//! [feed]
//! api_url = "https://traffic.example.com/v1/incidents"
//! records_path = "results"
//! api_key_env = "TRAFFIC_API_KEY"
//!
//! [router]
//! api_key_env = "HERE_API_KEY"
//!
//! [geocoder]
//! enabled = true
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use traffic_map_geocoder::GeocoderConfig;
use traffic_map_route::RouterConfig;
use traffic_map_source_models::FeedConfig;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "traffic_map.toml";

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid {field}: {message}")]
    Invalid {
        /// Dotted field name.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },
}

/// Refresh and query defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between timer-driven refreshes.
    pub refresh_interval_secs: u64,
    /// Seconds a cached incident query stays fresh.
    pub cache_ttl_secs: u64,
    /// Area query radius until the user picks one.
    pub default_radius_miles: f64,
    /// Corridor half-width until the user picks one.
    pub default_corridor_width_miles: f64,
    /// Feed filters applied to every query.
    pub filters: Vec<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 60,
            cache_ttl_secs: 60,
            default_radius_miles: 5.0,
            default_corridor_width_miles: 1.0,
            filters: Vec::new(),
        }
    }
}

impl SchedulerConfig {
    /// Timer period.
    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Cache time-to-live.
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Checks that intervals are non-zero and distances finite and
    /// positive.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "scheduler.refresh_interval_secs",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.cache_ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "scheduler.cache_ttl_secs",
                message: "must be greater than zero".to_string(),
            });
        }
        check_positive_miles("scheduler.default_radius_miles", self.default_radius_miles)?;
        check_positive_miles(
            "scheduler.default_corridor_width_miles",
            self.default_corridor_width_miles,
        )
    }
}

/// Checks that a distance setting is finite and positive.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] if it is not.
pub fn check_positive_miles(field: &'static str, miles: f64) -> Result<(), ConfigError> {
    if miles.is_finite() && miles > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            message: format!("{miles} is not a positive number of miles"),
        })
    }
}

/// The whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficMapConfig {
    /// Refresh and query defaults.
    pub scheduler: SchedulerConfig,
    /// Incident feed.
    pub feed: FeedConfig,
    /// Routing provider.
    pub router: RouterConfig,
    /// Reverse geocoder.
    pub geocoder: GeocoderConfig,
}

impl TrafficMapConfig {
    /// Parses and validates a configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the TOML is malformed or a value is out
    /// of range.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::de::from_str(toml_str)?;
        config.scheduler.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::parse(&contents)?;
        log::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Loads `path` if it exists, otherwise returns the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file exists but cannot be read or is
    /// invalid.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            log::debug!("{} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_all_defaults() {
        let config = TrafficMapConfig::parse("").unwrap();
        assert_eq!(config, TrafficMapConfig::default());
        assert_eq!(config.scheduler.refresh_interval(), Duration::from_secs(60));
        assert_eq!(config.feed.records_path, "results");
        assert!(!config.geocoder.enabled);
    }

    #[test]
    fn parses_sections() {
        let config = TrafficMapConfig::parse(
            r#"
            [scheduler]
            refresh_interval_secs = 30
            default_radius_miles = 10.0
            filters = ["incidents", "construction"]

            [feed]
            api_url = "https://traffic.example.com/v1/incidents"
            records_path = "data.incidents"
            api_key_env = "TRAFFIC_API_KEY"

            [router]
            api_key_env = "MY_HERE_KEY"

            [geocoder]
            enabled = true
            rate_limit_ms = 2000
            "#,
        )
        .unwrap();

        assert_eq!(config.scheduler.refresh_interval_secs, 30);
        assert_eq!(config.scheduler.cache_ttl_secs, 60);
        assert!((config.scheduler.default_radius_miles - 10.0).abs() < f64::EPSILON);
        assert_eq!(config.scheduler.filters, ["incidents", "construction"]);
        assert_eq!(config.feed.records_path, "data.incidents");
        assert_eq!(config.feed.api_key_env.as_deref(), Some("TRAFFIC_API_KEY"));
        assert_eq!(config.router.api_key_env.as_deref(), Some("MY_HERE_KEY"));
        assert!(config.router.base_url.contains("hereapi"));
        assert!(config.geocoder.enabled);
        assert_eq!(config.geocoder.rate_limit_ms, 2000);
    }

    #[test]
    fn rejects_zero_interval() {
        let err = TrafficMapConfig::parse("[scheduler]\nrefresh_interval_secs = 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "scheduler.refresh_interval_secs",
                ..
            }
        ));
    }

    #[test]
    fn rejects_non_positive_distances() {
        let err = TrafficMapConfig::parse("[scheduler]\ndefault_radius_miles = -1.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        let err = TrafficMapConfig::parse("[scheduler]\ndefault_corridor_width_miles = 0.0\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            TrafficMapConfig::parse("[scheduler\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("traffic_map_config_that_does_not_exist.toml");
        let config = TrafficMapConfig::load_or_default(&path).unwrap();
        assert_eq!(config, TrafficMapConfig::default());
        assert!(matches!(
            TrafficMapConfig::load(&path),
            Err(ConfigError::Io { .. })
        ));
    }
}
