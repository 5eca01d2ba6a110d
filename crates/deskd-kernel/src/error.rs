//! Kernel error taxonomy.
//!
//! Every failure from path resolution, authorization and dispatch ends up
//! as a [`CoreError`]. The dispatcher is the only place that turns one into
//! an HTTP status and an error envelope.

use http::StatusCode;
use thiserror::Error;

use crate::storage::StorageError;
use crate::vfs::VfsError;

/// Errors surfaced to clients.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No valid session for a call that needs one.
    #[error("Access denied: no session")]
    NoSession,

    /// A group, mount or blacklist rule refused the call.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// The path names a protocol with no mount.
    #[error("Unknown protocol: {0}")]
    UnknownProtocol(String),

    /// The mount for this protocol is switched off.
    #[error("Mount is disabled: {0}")]
    MountDisabled(String),

    /// The API method table has no entry with this name.
    #[error("No such API method")]
    NoSuchMethod(String),

    /// Request arguments are missing or malformed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Passed through from a transport.
    #[error(transparent)]
    Vfs(#[from] VfsError),

    /// Passed through from the storage backend.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Opaque failure from another collaborator.
    #[error("{0}")]
    Backend(String),
}

impl CoreError {
    pub fn access_denied(reason: impl Into<String>) -> Self {
        Self::AccessDenied(reason.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// True for session and permission failures.
    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::NoSession | Self::AccessDenied(_))
    }

    /// HTTP status for this error.
    ///
    /// - NoSession, AccessDenied: 403
    /// - everything else (classification, backend, internal): 500
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        if self.is_authorization() {
            StatusCode::FORBIDDEN
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(CoreError::NoSession.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            CoreError::access_denied("fs").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            CoreError::NoSuchMethod("doesNotExist".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            CoreError::UnknownProtocol("ftp".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            CoreError::from(VfsError::not_found("/x")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_no_such_method_message() {
        let err = CoreError::NoSuchMethod("doesNotExist".into());
        assert_eq!(err.to_string(), "No such API method");
    }

    #[test]
    fn test_vfs_errors_pass_through_display() {
        let err = CoreError::from(VfsError::not_found("/a.txt"));
        assert_eq!(err.to_string(), "not found: /a.txt");
    }
}
