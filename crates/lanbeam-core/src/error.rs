//! Error types for lanbeam.
//!
//! Display strings double as the protocol's HTTP error bodies, so the
//! request-facing variants must not be reworded.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid request body")]
    BadRequest,

    #[error("Missing parameters")]
    MissingParameters,

    #[error("PIN required")]
    PinRequired,

    #[error("Invalid PIN")]
    InvalidPin,

    #[error("rejected")]
    Rejected,

    #[error("Invalid token or IP address")]
    InvalidToken,

    /// Prepare-upload refused because another session is active.
    #[error("blocked by another session")]
    SessionBlocked,

    /// Upload against a session the store no longer knows.
    #[error("Blocked by another session")]
    UnknownSession,

    /// A second concurrent upload of the same file within a session.
    #[error("upload already in progress")]
    UploadInFlight,

    #[error("too many requests")]
    TooManyRequests,

    #[error("size mismatch")]
    SizeMismatch,

    #[error("hash mismatch")]
    HashMismatch,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Discovery/client-side network failure; logged, never user-visible.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// HTTP status this error maps to on the protocol surface.
    pub fn status(&self) -> u16 {
        match self {
            Error::BadRequest | Error::MissingParameters => 400,
            Error::PinRequired | Error::InvalidPin => 401,
            Error::Rejected | Error::InvalidToken => 403,
            Error::NotFound(_) => 404,
            Error::SessionBlocked | Error::UnknownSession | Error::UploadInFlight => 409,
            Error::TooManyRequests => 429,
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
