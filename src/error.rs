use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Reasons a manager operation was declined.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("job '{0}' is not configured")]
    NotFound(String),

    #[error("job '{id}' has an unusable configuration: {reason}")]
    InvalidConfig { id: String, reason: String },

    #[error("job '{0}' is already running")]
    AlreadyRunning(String),

    #[error("job '{0}' is not running")]
    NotRunning(String),

    #[error("job '{0}' is running; stop it before deleting")]
    DeleteRejected(String),

    #[error("failed to spawn job '{id}': {source}")]
    Spawn {
        id: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to signal job '{id}': {source}")]
    Signal {
        id: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid log data in {}: {source}", path.display())]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
