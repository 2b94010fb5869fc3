use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("identity lookup failed with {status}: {body}")]
    Auth { status: u16, body: String },
    #[error("{operation} query failed with {status}: {body}")]
    Query {
        operation: &'static str,
        status: u16,
        body: String,
    },
    #[error(
        "too many requests in a short amount of time; hit the undocumented anti-abuse limit, wait and rerun"
    )]
    RateLimited,
    #[error("http error: {0}")]
    Http(String),
    #[error("failed to decode {operation} response: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },
    #[error("cache corruption: {0}")]
    CacheCorruption(String),
    #[error("render error: {0}")]
    Render(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
