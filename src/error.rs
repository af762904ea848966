//! # Error Types
//!
//! A single [`ThrottlerError`] covers every failure mode the core engine can
//! surface: bad configuration/limit strings, store I/O, and observed
//! cancellation. Each variant carries enough context for a caller to decide
//! whether to fail open or fail closed (see [`crate::config::Config::fail_open`]).
//!
//! No HTTP status mapping lives here; that belongs to whichever framework
//! adapter wraps this crate.

use thiserror::Error;

/// All errors the throttler core can produce.
#[derive(Debug, Error, Clone)]
pub enum ThrottlerError {
    /// Invalid limit string, bounds violation, or an empty/unmatched policy
    /// table. Fatal to the admission that triggered it; also used at
    /// config build time.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// The backing store failed, timed out, or returned malformed state.
    /// The admission is aborted; callers decide fail-open/fail-closed.
    #[error("backend error: {0}")]
    BackendError(String),

    /// A cancellation token fired before the admission completed. The
    /// outcome is unknown (in-memory: unmodified; remote: possibly
    /// committed), never retry blindly with a fresh `n`.
    #[error("admission cancelled")]
    CancelledError,
}

impl ThrottlerError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        ThrottlerError::ConfigError(msg.into())
    }

    pub fn backend<S: Into<String>>(msg: S) -> Self {
        ThrottlerError::BackendError(msg.into())
    }

    /// True for errors a fail-open policy may swallow (backend trouble);
    /// false for errors that indicate a caller/programmer mistake and
    /// should always surface.
    pub fn is_backend(&self) -> bool {
        matches!(self, ThrottlerError::BackendError(_))
    }
}

impl From<crate::store::StoreError> for ThrottlerError {
    fn from(err: crate::store::StoreError) -> Self {
        match err {
            crate::store::StoreError::Cancelled => ThrottlerError::CancelledError,
            other => ThrottlerError::BackendError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ThrottlerError {
    fn from(err: serde_json::Error) -> Self {
        ThrottlerError::BackendError(format!("state serialization failed: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, ThrottlerError>;
