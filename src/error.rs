use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Why a health check ended in the `Failed` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthCheckFailure {
    BadStatus(u16),
    StartupTimeout,
    UnexpectedRedirect,
}

impl fmt::Display for HealthCheckFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadStatus(code) => write!(f, "health check returned status {code}"),
            Self::StartupTimeout => f.write_str("failed to connect to app before the startup deadline"),
            Self::UnexpectedRedirect => f.write_str("health check should not redirect"),
        }
    }
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("no free port available in {start}..{end}")]
    NoFreePortAvailable { start: u16, end: u16 },

    #[error("manifest error for {}: {message}", path.display())]
    Manifest { path: PathBuf, message: String },

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{reason}")]
    HealthCheck { reason: HealthCheckFailure },

    #[error("registry I/O failed at {}: {source}", path.display())]
    RegistryIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse registry at {}: {source}", path.display())]
    RegistryParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
}

impl DeployError {
    pub fn manifest(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Manifest {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn health(reason: HealthCheckFailure) -> Self {
        Self::HealthCheck { reason }
    }

    /// True when a process was started for this attempt and may still be running.
    ///
    /// Side effects do not require a started process: with eager assignment a `Spawn` failure
    /// still leaves the port recorded in the registry.
    pub fn process_started(&self) -> bool {
        matches!(self, Self::HealthCheck { .. })
    }
}

pub type Result<T, E = DeployError> = std::result::Result<T, E>;
