use thiserror::Error;

/// Errors raised by the catalog, favorites and storage layers.
///
/// None of these are fatal to the UI: callers degrade to an empty or
/// unchanged view and log.
#[derive(Debug, Error)]
pub enum BookError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("authorization failed: {0}")]
    Auth(String),

    #[error("malformed payload: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("storage unavailable: {0}")]
    StoreUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BookError {
    pub fn is_auth(&self) -> bool {
        matches!(self, BookError::Auth(_))
    }

    /// Maps a non-2xx status to the matching variant. 401 and 403 are
    /// credential problems, everything else is a plain status failure.
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => BookError::Auth(format!("{}: {}", status, body)),
            code => BookError::Status { status: code, body },
        }
    }
}

pub type Result<T> = std::result::Result<T, BookError>;
