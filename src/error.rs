//! Error taxonomy for ingest, persistence and configuration.

use std::path::PathBuf;

use thiserror::Error;

/// A single inbound message could not be turned into a sample.
/// Always recoverable: the message is discarded and the session continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid sample format: {0:?}")]
    InvalidFormat(String),
}

/// Failure opening, writing or finalizing a WAV file.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("WAV error on {path:?}: {source}")]
    Wav {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SinkError {
    pub(crate) fn wav(path: impl Into<PathBuf>, source: hound::Error) -> Self {
        SinkError::Wav {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SinkError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors that end an ingest session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Sink(#[from] SinkError),
    /// Another session already records to this path.
    #[error("output {0:?} is owned by another session")]
    OutputBusy(PathBuf),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
