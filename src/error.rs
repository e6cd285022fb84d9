use std::path::PathBuf;
use thiserror::Error;

/// Errors that end a transcription session in the failed state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The job was rejected before anything went over the network
    #[error("{0}")]
    Validation(String),

    /// The submission call failed at the network layer or returned a non-success status
    #[error("{0}")]
    Transport(String),

    /// The backend reported a structured error on either channel
    #[error("{0}")]
    Remote(String),
}

impl SessionError {
    /// The message surfaced verbatim to the presentation layer
    pub fn message(&self) -> &str {
        match self {
            SessionError::Validation(msg)
            | SessionError::Transport(msg)
            | SessionError::Remote(msg) => msg,
        }
    }
}

/// A push message that could not be decoded
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid push message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported frame: {0}")]
    UnsupportedFrame(&'static str),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid server URL {url}: {reason}")]
    InvalidServerUrl { url: String, reason: String },
}

/// Export storage errors with contextual information
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Could not find Documents directory")]
    NoDocumentsDir,

    #[error("Nothing to export")]
    EmptyExport,

    #[error("Failed to create directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to file {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_message_is_verbatim() {
        let err = SessionError::Remote("Unsupported file format".to_string());
        assert_eq!(err.message(), "Unsupported file format");
        assert_eq!(err.to_string(), "Unsupported file format");
    }
}
