// Error types for the fallible outer surfaces. The detection core itself never fails:
// malformed input degrades to a skipped tick.

use std::path::PathBuf;
use thiserror::Error;

/// Problems loading or validating a `DetectorConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to encode base profile: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("unknown profile `{0}` (expected `default` or `sensitive`)")]
    UnknownProfile(String),

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Problems reading a recorded landmark clip.
#[derive(Debug, Error)]
pub enum ClipError {
    #[error("failed to read clip: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed tick on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Problems talking to a running `MonitorService`.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("monitor task has stopped")]
    Stopped,

    #[error("monitor task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
