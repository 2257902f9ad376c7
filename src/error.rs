use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CattrackError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame source error: {0}")]
    Source(#[from] SourceError),

    #[error("Detector error: {0}")]
    Detector(#[from] DetectorError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

/// Failures of the video source. All of them are recovered by reconnecting.
#[derive(Error, Debug, Clone)]
pub enum SourceError {
    #[error("failed to connect to {target}: {details}")]
    Connect { target: String, details: String },

    #[error("connection to {target} dropped: {details}")]
    Dropped { target: String, details: String },

    #[error("no frame within {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("invalid frame: {details}")]
    InvalidFrame { details: String },

    #[error("source backend unavailable: {details}")]
    Unavailable { details: String },
}

#[derive(Error, Debug, Clone)]
pub enum DetectorError {
    #[error("failed to load model from {path}: {details}")]
    ModelLoad { path: String, details: String },

    #[error("frame decode failed: {details}")]
    Decode { details: String },

    #[error("inference failed: {details}")]
    Inference { details: String },

    #[error("invalid detection: {details}")]
    InvalidDetection { details: String },

    #[error("annotated frame encoding failed: {details}")]
    Encode { details: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to create captures directory {path}: {source}")]
    DirectoryCreation {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write snapshot {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove snapshot {path}: {source}")]
    Remove {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid snapshot filename '{filename}'")]
    InvalidFilename { filename: String },

    #[error("no free snapshot filename for '{base}'")]
    NameExhausted { base: String },

    #[error("event count must be at least 1")]
    EmptyEvent,
}

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("failed to bind {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server startup failed: {details}")]
    StartupFailed { details: String },
}

impl CattrackError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Whether the running system can carry on after this error.
    ///
    /// Source, detector and storage failures are handled by skipping the
    /// affected cycle; configuration and startup failures are fatal.
    pub fn is_recoverable(&self) -> bool {
        match self {
            CattrackError::Source(_) | CattrackError::Detector(_) => true,
            CattrackError::Storage(StorageError::DirectoryCreation { .. }) => false,
            CattrackError::Storage(_) => true,
            CattrackError::Io(_) => true,
            CattrackError::Config(_)
            | CattrackError::Stream(_)
            | CattrackError::System { .. }
            | CattrackError::Component { .. } => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CattrackError>;
