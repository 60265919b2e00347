use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("{url} answered with HTTP {status}")]
    StatusError { url: String, status: u16 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Selector inference failed: {0}")]
    InferenceError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl ScanError {
    /// True for failures that happen while retrieving a page (transport, timeout, non-2xx).
    pub fn is_fetch_error(&self) -> bool {
        matches!(
            self,
            ScanError::HttpError(_) | ScanError::StatusError { .. } | ScanError::InvalidUrl(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
