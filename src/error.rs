//! Crate-wide error taxonomy.
//!
//! Each failure class the engine can surface gets its own variant so callers
//! can distinguish a missing row from an empty result, a constraint violation
//! from an I/O failure, and a remote backend fault from local storage trouble.

use thiserror::Error;

/// Errors surfaced by the storage engine and its backends.
#[derive(Debug, Error)]
pub enum Error {
    /// A source, chunk, alert, or quarantine item that was asked for by id
    /// does not exist. Distinct from an empty search result.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Source creation with a URL that is already registered.
    #[error("source url already exists: {0}")]
    DuplicateUrl(String),

    /// Input rejected before touching storage (unknown tier, empty batch, …).
    #[error("validation: {0}")]
    Validation(String),

    /// Local storage failure: I/O, corrupt index, SQL error.
    #[error("storage: {0}")]
    Storage(#[from] sqlx::Error),

    /// The remote vector backend rejected a request: failed sign-in,
    /// statement error, or a response the client could not interpret.
    #[error("remote backend: {0}")]
    RemoteBackend(String),

    /// Transport-level failure talking to the remote vector backend
    /// (timeout, connection refused). Distinct from local storage failure.
    #[error("remote backend transport: {0}")]
    RemoteTransport(#[from] reqwest::Error),

    /// An explicit backend override was requested for a backend whose
    /// availability probe failed. Never produced by `detect()`.
    #[error("vector backend not available: {0}")]
    BackendUnavailable(&'static str),

    /// Configuration could not be loaded or failed validation.
    #[error("config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for a [`Error::NotFound`] with an owned id.
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }
}
