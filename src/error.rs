//! Error taxonomy.
//!
//! The storage backend raises backend-native errors; [`BackendError`] wraps
//! them and is then classified into the two kinds the rest of the engine
//! cares about: [`RuntimeError::EmptyIndex`] (schema missing or stale) and
//! [`RuntimeError::Unknown`] (everything else).

use thiserror::Error;

/// Errors surfaced by the SQLite storage backend, before classification.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    /// Classify a raw backend error as schema-absence vs. everything else.
    ///
    /// SQLite reports a missing table/column via `SQLITE_ERROR` (extended
    /// code 1) with a message of the form "no such table: …" / "no such
    /// column: …". This mirrors the duplicate-column detection already used
    /// by schema migration.
    fn is_empty_index(&self) -> bool {
        match self {
            BackendError::Sqlite(rusqlite::Error::SqliteFailure(err, msg)) => {
                err.code == rusqlite::ErrorCode::Unknown
                    && msg
                        .as_ref()
                        .map(|m| m.starts_with("no such table") || m.starts_with("no such column"))
                        .unwrap_or(false)
            }
            _ => false,
        }
    }
}

impl From<BackendError> for RuntimeError {
    fn from(err: BackendError) -> Self {
        if err.is_empty_index() {
            RuntimeError::EmptyIndex
        } else {
            RuntimeError::Unknown(err.to_string())
        }
    }
}

/// Domain supertype. `EmptyIndex`, `UnknownId`, `Immutable` are its subtypes.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("index schema is absent or stale")]
    EmptyIndex,
    #[error("external id not found: {0}")]
    UnknownId(String),
    #[error("result set is frozen and cannot be mutated")]
    Immutable,
    #[error("backend error: {0}")]
    Unknown(String),
}

/// Top-level error type returned by every fallible public operation.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// An invariant of the pipeline was violated (e.g. `Immutable`/`UnknownId`
    /// raised against a frozen result set) — a bug in the pipeline itself,
    /// not a recoverable condition.
    #[error("internal invariant violated: {0}")]
    Logic(String),
}

impl From<BackendError> for Error {
    fn from(err: BackendError) -> Self {
        Error::Runtime(err.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
