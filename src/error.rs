//! Error types for statmon.
//!
//! All errors are strongly typed using thiserror. Every failure reflects a
//! caller contract violation and is raised synchronously from the offending
//! call; nothing in the engine retries internally.

use thiserror::Error;

/// Reasons a status variable path fails to parse.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("path is empty")]
    Empty,

    #[error("expected exactly two '/'-separated segments, found {found}")]
    SegmentCount {
        found: usize,
    },

    #[error("path segment is empty")]
    EmptySegment,

    #[error("segment '{segment}' is not a valid identifier")]
    InvalidIdentifier {
        segment: String,
    },

    #[error("segment '{segment}' exceeds maximum length of {max}")]
    IdentifierTooLong {
        segment: String,
        max: usize,
    },

    #[error("wildcards are not allowed here")]
    WildcardNotAllowed,

    #[error("segment '{segment}' mixes the wildcard with other characters")]
    MalformedWildcard {
        segment: String,
    },

    #[error("only '*/<variable>' and '*/*' wildcard forms are supported")]
    UnsupportedWildcardForm,
}

/// Top-level error type for statmon.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Invalid address '{path}': {source}")]
    InvalidAddress {
        path: String,
        #[source]
        source: AddressError,
    },

    #[error("Invalid argument '{argument}': {reason}")]
    InvalidArgument {
        argument: String,
        reason: String,
    },

    #[error("Unknown target: {target}")]
    UnknownTarget {
        target: String,
    },

    #[error("Status variable '{path}' does not support change notifications")]
    UnsupportedCapability {
        path: String,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl MonitorError {
    /// Creates an invalid address error for `path`.
    #[must_use]
    pub fn invalid_address(path: impl Into<String>, source: AddressError) -> Self {
        Self::InvalidAddress {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid argument error.
    #[must_use]
    pub fn invalid_argument(argument: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument: argument.into(),
            reason: reason.into(),
        }
    }

    /// Creates an unknown target error.
    #[must_use]
    pub fn unknown_target(target: impl Into<String>) -> Self {
        Self::UnknownTarget {
            target: target.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_invalid_address(&self) -> bool {
        matches!(self, Self::InvalidAddress { .. })
    }

    #[must_use]
    pub const fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }

    #[must_use]
    pub const fn is_unknown_target(&self) -> bool {
        matches!(self, Self::UnknownTarget { .. })
    }

    #[must_use]
    pub const fn is_unsupported_capability(&self) -> bool {
        matches!(self, Self::UnsupportedCapability { .. })
    }

    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if this error is retryable.
    ///
    /// Every error reflects a contract violation, so none are.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        false
    }
}

/// Result type alias for statmon operations.
pub type MonitorResult<T> = Result<T, MonitorError>;

pub(crate) fn lock_err(context: &'static str) -> MonitorError {
    MonitorError::internal(format!("poisoned lock: {context}"))
}
