//! Domain error taxonomy shared by every ledger operation.
//!
//! The variants are transport agnostic; `http::error` maps them onto status
//! codes and JSON bodies.

use thiserror::Error;

use crate::split::SplitError;
use crate::store::StoreError;

/// Stable, machine-readable failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidRequest,
    Conflict,
    Unauthorized,
    Forbidden,
    NotFound,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::Conflict => "conflict",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::NotFound => "not_found",
            ErrorCode::InternalError => "internal_error",
        }
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    /// A referenced group, expense, share or user does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The caller is authenticated but may not act on this resource.
    #[error("{0}")]
    Forbidden(String),

    /// A uniqueness rule would be broken.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidInput(String),

    /// An internal invariant does not hold. Never a user mistake.
    #[error("invariant violated: {0}")]
    InvalidState(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error(transparent)]
    Store(StoreError),
}

impl LedgerError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            LedgerError::NotFound(_) => ErrorCode::NotFound,
            LedgerError::Forbidden(_) => ErrorCode::Forbidden,
            LedgerError::Conflict(_) => ErrorCode::Conflict,
            LedgerError::InvalidInput(_) => ErrorCode::InvalidRequest,
            LedgerError::Unauthenticated(_) => ErrorCode::Unauthorized,
            LedgerError::InvalidState(_) | LedgerError::Store(_) => ErrorCode::InternalError,
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(what) => LedgerError::Conflict(format!("{what} already exists")),
            other => LedgerError::Store(other),
        }
    }
}

impl From<SplitError> for LedgerError {
    fn from(err: SplitError) -> Self {
        LedgerError::InvalidInput(err.to_string())
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
