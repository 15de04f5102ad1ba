// Errors a caller can cause, as opposed to data-quality problems
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RequestError {
    #[error("unknown site: {0}")]
    UnknownSite(String),

    #[error("unknown alignment mode: {0}")]
    UnknownMode(String),

    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("missing query parameter: {0}")]
    MissingParameter(&'static str),

    #[error("date range of {days} days exceeds the {max_days} day limit")]
    RangeTooLong { days: i64, max_days: u32 },
}

impl RequestError {
    /// Whether the request named something that does not exist, rather
    /// than being malformed.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RequestError::UnknownSite(_))
    }
}
