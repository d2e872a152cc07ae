//! Error type surfaced across the repository façade.
//!
//! Lower layers keep their own `thiserror` enums (`ApiError`, `CacheError`,
//! `RemoteError`). The repository folds them into `AppError`, which carries
//! a coarse kind for the UI to branch on plus a human-readable message.

use thiserror::Error;

use crate::api::ApiError;
use crate::cache::CacheError;
use crate::remote::RemoteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input such as a bad email or a blank group name
    Validation,
    /// Sign-in or registration failed
    Login,
    /// A group command failed
    Group,
    /// A movie command or catalogue lookup failed
    Movie,
    /// The network or a remote service was unreachable
    Network,
    /// The local cache could not be read or written
    Storage,
    Generic,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "Invalid input"),
            ErrorKind::Login => write!(f, "Login failed"),
            ErrorKind::Group => write!(f, "Group operation failed"),
            ErrorKind::Movie => write!(f, "Movie operation failed"),
            ErrorKind::Network => write!(f, "Network error"),
            ErrorKind::Storage => write!(f, "Storage error"),
            ErrorKind::Generic => write!(f, "Error"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn login(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Login, message)
    }

    pub fn group(message: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::Group, message.to_string())
    }

    pub fn movie(message: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::Movie, message.to_string())
    }

    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Generic, message)
    }
}

impl From<ApiError> for AppError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::NotFound(_) | ApiError::InvalidResponse(_) => AppError::movie(e),
            _ => AppError::new(ErrorKind::Network, e.to_string()),
        }
    }
}

impl From<CacheError> for AppError {
    fn from(e: CacheError) -> Self {
        AppError::new(ErrorKind::Storage, e.to_string())
    }
}

impl From<RemoteError> for AppError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::Unavailable => AppError::new(ErrorKind::Network, e.to_string()),
            _ => AppError::generic(e.to_string()),
        }
    }
}
