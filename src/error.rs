//! Error types for executor construction.
//!
//! The keep-alive protocol itself has no recoverable errors: a refused
//! acquisition is an empty handle, and misuse is an assertion. What can fail
//! is setting up the collaborators around it.

use std::io;

/// Error returned when building an executor or its worker pool.
#[derive(Debug)]
pub enum ExecutorError {
    /// The OS refused to spawn a worker thread.
    Spawn { name: String, source: io::Error },
    /// A configuration value is out of range.
    InvalidConfig(String),
}

impl ExecutorError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        ExecutorError::InvalidConfig(msg.into())
    }
}

impl std::fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorError::Spawn { name, source } => {
                write!(f, "failed to spawn worker thread '{}': {}", name, source)
            }
            ExecutorError::InvalidConfig(msg) => write!(f, "invalid executor config: {}", msg),
        }
    }
}

impl std::error::Error for ExecutorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecutorError::Spawn { source, .. } => Some(source),
            ExecutorError::InvalidConfig(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn spawn_error_exposes_source() {
        let err = ExecutorError::Spawn {
            name: "pool-0".into(),
            source: io::Error::new(io::ErrorKind::Other, "no threads left"),
        };
        assert!(err.to_string().contains("pool-0"));
        assert!(err.source().is_some());
    }

    #[test]
    fn invalid_config_message() {
        let err = ExecutorError::invalid_config("num_workers must be >= 1");
        assert_eq!(
            err.to_string(),
            "invalid executor config: num_workers must be >= 1"
        );
        assert!(err.source().is_none());
    }
}
