use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("HTTP {status} returned by {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Timed out after {0:?} loading {1}")]
    Timeout(Duration, String),

    /// The page the caller holds a reference to is no longer the loaded one.
    #[error("Stale page reference: {0}")]
    StaleReference(String),

    #[error("No such element: {0}")]
    NoSuchElement(String),

    /// A native dialog blocks access to the page until dismissed.
    #[error("Blocking dialog open on {0}")]
    BlockingDialog(String),

    #[error("Document error: {0}")]
    DocumentError(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl ScanError {
    /// Network, status, timeout and document failures: the URL is skipped.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            ScanError::HttpError(_)
                | ScanError::HttpStatus { .. }
                | ScanError::InvalidUrl(_)
                | ScanError::Timeout(..)
                | ScanError::DocumentError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
