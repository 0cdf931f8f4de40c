//! Node error taxonomy
//!
//! One error type for the whole node. The variants map onto how a failure is
//! handled: configuration errors are fatal at startup, transport and decode
//! errors are local to one deal or one stream, not-found is an ordinary
//! negative answer, and unsupported marks a mutation of a read-only store.

use std::path::{Path, PathBuf};

/// Errors produced by the storage provider node
#[derive(Debug, thiserror::Error)]
pub enum SimSpError {
    /// Bad paths, keys or addresses; fatal at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network or stream failure during a download or an exchange
    #[error("Transport error: {0}")]
    Transport(String),

    /// Lookup miss
    #[error("Not found: {0}")]
    NotFound(String),

    /// Mutation attempted on a read-only store
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    /// Malformed wire message
    #[error("Decode error: {0}")]
    Decode(String),

    /// Archive could not be opened or parsed
    #[error("Archive error at {}: {reason}", path.display())]
    Archive {
        /// Archive file path
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// Local filesystem failure
    #[error("Storage error at {}: {source}", path.display())]
    Storage {
        /// Path of the file or directory involved
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Deal status change outside the lifecycle state machine
    #[error("Invalid deal transition from {from} to {to}")]
    InvalidTransition {
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },
}

/// Result type used across the node
pub type SimSpResult<T> = std::result::Result<T, SimSpError>;

impl SimSpError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create an unsupported-operation error
    pub fn unsupported(operation: &'static str) -> Self {
        Self::Unsupported(operation)
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create an archive error for `path`
    pub fn archive(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::Archive {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Create a storage error for `path`
    pub fn storage(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create an invalid-transition error
    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Whether this error is a lookup miss
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether this error rejects a mutation of a read-only store
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}
