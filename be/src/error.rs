use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Which input list a malformed coordinate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSource {
    Polyline,
    Stop,
}

#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum AnimationError {
    #[error("Malformed {origin:?} coordinate at index {index}")]
    MalformedCoordinate {
        origin: CoordinateSource,
        index: usize,
    },
}

#[derive(Error, Debug)]
pub enum GtfsError {
    #[error("Failed to open {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path:?}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("Route '{0}' not found")]
    RouteNotFound(String),

    #[error("No trips found for route '{route_id}' in direction {direction}")]
    NoTripForDirection { route_id: String, direction: u32 },

    #[error("No stop times found for trip '{0}'")]
    NoStopTimes(String),

    #[error("Stop '{0}' not found")]
    StopNotFound(String),

    #[error("Invalid GTFS time {0:?}")]
    InvalidTime(String),
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("No path for route '{route_id}' in direction {direction}")]
    NotFound { route_id: String, direction: u32 },

    #[error("Route data provider unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
