//! Error types for request validation, workspace preparation and container runs
//!
//! Validation and preparation failures are raised before any container exists,
//! so they carry no captured output. Runtime failures describe the sandbox
//! itself misbehaving and are kept apart from the executed program's own exit
//! status, which is never an error at this level.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("empty filename")]
    EmptyFilename,
    #[error("invalid path: {0:?}")]
    InvalidPath(String),
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("unsupported mode: {0}")]
    UnsupportedMode(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecutorError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

// Failures of the container runtime itself, as opposed to the program it ran
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("failed to start container runtime '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("container runtime exited with status {code}: {message}")]
    Daemon { code: i32, message: String },
    #[error("container runtime was terminated by a signal")]
    Terminated,
    #[error("Docker Engine API error: {0}")]
    Engine(#[from] bollard::errors::Error),
    #[error("I/O error while talking to the container runtime: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExecutorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_messages_name_the_offending_value() {
        assert_eq!(
            ExecutorError::UnsupportedLanguage("ruby".to_string()).to_string(),
            "unsupported language: ruby"
        );
        assert_eq!(
            ExecutorError::UnsupportedMode("bench".to_string()).to_string(),
            "unsupported mode: bench"
        );
        assert_eq!(
            ExecutorError::InvalidPath("../etc/passwd".to_string()).to_string(),
            "invalid path: \"../etc/passwd\""
        );
    }

    #[test]
    fn test_daemon_error_includes_status() {
        let err = RuntimeError::Daemon {
            code: 125,
            message: "No such image: golang:1.22-alpine".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("125"));
        assert!(msg.contains("No such image"));
    }
}
