use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// No usable refresh token. Requires running the device-authorization
    /// flow again; nothing in this crate recovers from this automatically.
    Unauthenticated,
    /// The vendor returned 429. The poll scheduler slows down in response;
    /// there is no in-cycle retry.
    RateLimited,
    Http { status: u16, message: String },
    Transport(reqwest::Error),
    Json(serde_json::Error),
    Io(std::io::Error),
    NotConfigured(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Unauthenticated => write!(f, "not authenticated (no valid refresh token)"),
            Error::RateLimited => write!(f, "rate limit exceeded"),
            Error::Http { status, message } => write!(f, "http {status}: {message}"),
            Error::Transport(e) => write!(f, "transport error: {e}"),
            Error::Json(e) => write!(f, "json error: {e}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
            Error::NotConfigured(what) => write!(f, "not configured: {what}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transport(e) => Some(e),
            Error::Json(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
