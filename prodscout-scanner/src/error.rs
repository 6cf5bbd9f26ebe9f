use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    #[error("Other error: {0}")]
    Other(String),
}

impl ScanError {
    /// Whether retrying the same request could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ScanError::HttpError(_) => true,
            ScanError::Status { status, .. } => *status == 429 || *status >= 500 || *status == 403,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_retryability() {
        let server_error = ScanError::Status { url: "http://x.test/".into(), status: 503 };
        let not_found = ScanError::Status { url: "http://x.test/".into(), status: 404 };
        assert!(server_error.is_retryable());
        assert!(!not_found.is_retryable());
        assert!(!ScanError::InvalidUrl("nope".into()).is_retryable());
    }

    #[test]
    fn test_status_display() {
        let err = ScanError::Status { url: "http://x.test/p".into(), status: 500 };
        assert_eq!(err.to_string(), "HTTP 500 for http://x.test/p");
    }
}
