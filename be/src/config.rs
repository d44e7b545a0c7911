use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::animator::{AnimatorSettings, DEFAULT_SPEED_KMH};
use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Where `simulate` fetches route paths from.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub animation: AnimationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimationConfig {
    #[serde(default = "default_speed_kmh")]
    pub speed_kmh: f64,

    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            data_dir: default_data_dir(),
            api_url: default_api_url(),
            request_timeout_secs: default_request_timeout_secs(),
            animation: AnimationConfig::default(),
        }
    }
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            speed_kmh: default_speed_kmh(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl AnimationConfig {
    pub fn settings(&self) -> AnimatorSettings {
        AnimatorSettings {
            speed_kmh: self.speed_kmh,
            tick_interval: Duration::from_millis(self.tick_interval_ms.max(1)),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:3030".to_string()
}

fn default_data_dir() -> String {
    "../gtfs_data".to_string()
}

fn default_api_url() -> String {
    "http://localhost:3030".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_speed_kmh() -> f64 {
    DEFAULT_SPEED_KMH
}

fn default_tick_interval_ms() -> u64 {
    250
}

impl Config {
    /// Reads `path` if it exists, otherwise falls back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Config::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.bind, "0.0.0.0:3030");
        assert_eq!(config.animation.speed_kmh, 30.0);
        assert_eq!(config.animation.settings().tick_interval, Duration::from_millis(250));
    }

    #[test]
    fn partial_animation_table() {
        let config = Config::parse(
            r#"
            data_dir = "/srv/gtfs"

            [animation]
            tick_interval_ms = 100
            "#,
        )
        .unwrap();
        assert_eq!(config.data_dir, "/srv/gtfs");
        assert_eq!(config.animation.speed_kmh, 30.0);
        assert_eq!(config.animation.tick_interval_ms, 100);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let config = Config::load("/definitely/not/here/busboard.toml").unwrap();
        assert_eq!(config.api_url, "http://localhost:3030");
    }

    #[test]
    fn bad_toml_is_reported() {
        assert!(Config::parse("bind = ").is_err());
    }
}
