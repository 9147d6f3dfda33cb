//! Error taxonomy for the crawl loop.
//!
//! Only wall errors terminate a search term's iteration early; no error
//! short of explicit cancellation terminates the whole run.

/// Failure modes of a single-candidate iteration.
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    /// All three navigation strategies exhausted. Non-fatal: skip the
    /// candidate and continue.
    #[error("all navigation strategies exhausted for {url}")]
    NavigationFailure { url: String },

    /// A login wall was detected. Fatal to the current term's batch only.
    #[error("login wall detected")]
    LoginWallDetected,

    /// A block or rate-limit page was detected. Fatal to the current term's
    /// batch only.
    #[error("blocked or rate limited by the target site")]
    BlockedOrRateLimited,

    /// Classifier error or unparseable payload. Non-fatal: a zero-item group
    /// is persisted so freshness still advances.
    #[error("extraction failed: {0}")]
    ExtractionFailure(String),

    /// Store I/O error. Non-fatal per listing; freshness is not advanced so
    /// the listing retries on the next run.
    #[error("persistence failed: {0}")]
    PersistenceFailure(String),

    /// Browser transport failure outside any specific strategy.
    #[error("browser session error: {0}")]
    Session(String),
}

impl CrawlError {
    /// Whether this error aborts the remaining candidates of the current
    /// search term.
    pub fn aborts_term(&self) -> bool {
        matches!(self, Self::LoginWallDetected | Self::BlockedOrRateLimited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_wall_errors_abort_a_term() {
        assert!(CrawlError::LoginWallDetected.aborts_term());
        assert!(CrawlError::BlockedOrRateLimited.aborts_term());
        assert!(!CrawlError::NavigationFailure { url: "u".into() }.aborts_term());
        assert!(!CrawlError::ExtractionFailure("x".into()).aborts_term());
        assert!(!CrawlError::PersistenceFailure("x".into()).aborts_term());
    }
}
