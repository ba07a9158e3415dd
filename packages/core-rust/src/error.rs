//! Error taxonomy shared by managers, adapters, and the RPC surface.
//!
//! Errors are classified by *kind* rather than by type: every failure that
//! crosses a component boundary is a [`ServiceError`] carrying an
//! [`ErrorKind`] and a human-readable message. Adapters add context as the
//! error travels upward with [`ServiceError::context`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of a failure, independent of where it originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A required field is missing or malformed. Never reaches a backend.
    InvalidArgument,
    /// The organization or the addressed entity does not exist.
    NotFound,
    /// The entity is already present.
    AlreadyExists,
    /// A backend call failed or returned malformed data.
    Internal,
    /// The operation is explicitly not handled.
    Unimplemented,
    /// The target is reachable but currently not eligible (e.g. cordoned).
    Unavailable,
}

impl ErrorKind {
    /// Returns the stable string form used in logs and RPC error bodies.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::Internal => "internal",
            Self::Unimplemented => "unimplemented",
            Self::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error returned by every manager and adapter operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ServiceError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unimplemented, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    /// Prefixes the message with `context`, keeping the kind.
    ///
    /// ```
    /// use netplane_core::{ErrorKind, ServiceError};
    ///
    /// let err = ServiceError::internal("connection refused").context("adding network n1");
    /// assert_eq!(err.kind, ErrorKind::Internal);
    /// assert_eq!(err.message, "adding network n1: connection refused");
    /// ```
    #[must_use]
    pub fn context(self, context: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{context}: {}", self.message),
        }
    }

    #[must_use]
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

/// Convenience alias used across the workspace.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Extension for attaching context to a `ServiceResult` lazily.
pub trait ResultExt<T> {
    /// Wraps the error (if any) with context produced by `f`.
    ///
    /// # Errors
    ///
    /// Returns the original error with the context prepended.
    fn with_context<C, F>(self, f: F) -> ServiceResult<T>
    where
        C: fmt::Display,
        F: FnOnce() -> C;
}

impl<T> ResultExt<T> for ServiceResult<T> {
    fn with_context<C, F>(self, f: F) -> ServiceResult<T>
    where
        C: fmt::Display,
        F: FnOnce() -> C,
    {
        self.map_err(|e| e.context(f()))
    }
}
