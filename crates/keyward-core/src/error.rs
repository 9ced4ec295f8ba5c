//! Error types for Keyward operations.
//!
//! This module provides the common `Error` type and `Result<T>` alias used
//! across all Keyward crates. Uses `thiserror` for derive macros.
//!
//! Every store-level variant carries the key it failed on (owner, access key,
//! or volume) so that callers translating errors into protocol responses
//! never need extra context to produce a useful message.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Boxed underlying cause of a durability failure.
pub type BoxedCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in Keyward operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A credential already exists for this owner.
    #[error("Owner '{0}' already has a credential")]
    DuplicateOwner(String),

    /// A caller-supplied access key is already in use.
    #[error("Access key '{0}' is already in use")]
    DuplicateAccessKey(String),

    /// No credential exists for this owner.
    #[error("Owner not found: {0}")]
    OwnerNotFound(String),

    /// No credential exists with this access key.
    #[error("Access key not found: {0}")]
    AccessKeyNotFound(String),

    /// The credential does not hold the referenced grant.
    #[error("Access key '{access_key}' holds no '{grant}' grant on volume '{volume}'")]
    NoSuchGrant {
        /// Access key of the credential.
        access_key: String,
        /// Volume the grant was expected on.
        volume: String,
        /// Action name, or the wildcard for ownership.
        grant: String,
    },

    /// The volume has no tracked reverse-index entries.
    #[error("No policy tracked for volume: {0}")]
    NoSuchVolumePolicy(String),

    /// The reverse index is missing a tag that a credential's grants imply.
    #[error("Grant index for volume '{volume}' has no entry '{tag}'")]
    InconsistentIndex {
        /// Volume whose entry list was scanned.
        volume: String,
        /// The tag that was expected.
        tag: String,
    },

    /// The replicated log rejected or failed to commit a proposal.
    #[error("Durable commit of {operation} failed: {source}")]
    Durability {
        /// Kind of operation that was being proposed.
        operation: String,
        /// Underlying cause reported by the log.
        #[source]
        source: BoxedCause,
    },

    /// Malformed access or secret key.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Malformed grant set (empty names, reserved action token).
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error with the path that caused it.
    #[error("I/O error at {path}: {source}")]
    IoWithPath {
        /// The underlying I/O error.
        source: std::io::Error,
        /// Path being accessed.
        path: PathBuf,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create an invalid key error.
    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    /// Create an invalid policy error.
    pub fn invalid_policy(msg: impl Into<String>) -> Self {
        Self::InvalidPolicy(msg.into())
    }

    /// Create a durability error for the given operation kind.
    pub fn durability(operation: impl Into<String>, source: impl Into<BoxedCause>) -> Self {
        Self::Durability {
            operation: operation.into(),
            source: source.into(),
        }
    }

    /// Create an I/O error annotated with a path.
    pub fn io_with_path(source: std::io::Error, path: impl AsRef<Path>) -> Self {
        Self::IoWithPath {
            source,
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Whether this is a lookup miss.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::OwnerNotFound(_)
                | Self::AccessKeyNotFound(_)
                | Self::NoSuchGrant { .. }
                | Self::NoSuchVolumePolicy(_)
        )
    }

    /// Whether the replicated log failed to commit.
    pub fn is_durability(&self) -> bool {
        matches!(self, Self::Durability { .. })
    }

    /// Whether a caller may reasonably retry the same request.
    ///
    /// The store never retries on its own.
    pub fn is_retryable(&self) -> bool {
        self.is_durability()
    }
}

/// Result type alias using Keyward's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_keys() {
        let err = Error::DuplicateOwner("alice".into());
        assert_eq!(err.to_string(), "Owner 'alice' already has a credential");

        let err = Error::NoSuchGrant {
            access_key: "AK1".into(),
            volume: "vol1".into(),
            grant: "all".into(),
        };
        assert!(err.to_string().contains("AK1"));
        assert!(err.to_string().contains("vol1"));
    }

    #[test]
    fn test_durability_keeps_source() {
        let cause = std::io::Error::other("quorum lost");
        let err = Error::durability("update_policy", cause);
        assert!(err.is_durability());
        assert!(err.is_retryable());
        assert!(err.to_string().contains("update_policy"));
        assert!(err.to_string().contains("quorum lost"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_not_found_inspector() {
        assert!(Error::OwnerNotFound("bob".into()).is_not_found());
        assert!(Error::AccessKeyNotFound("AK".into()).is_not_found());
        assert!(Error::NoSuchVolumePolicy("vol".into()).is_not_found());
        assert!(!Error::DuplicateAccessKey("AK".into()).is_not_found());
        assert!(!Error::config("bad").is_retryable());
    }

    #[test]
    fn test_io_with_path() {
        let err = Error::io_with_path(
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
            "/var/lib/keyward.journal",
        );
        assert!(err.to_string().contains("/var/lib/keyward.journal"));
    }
}
