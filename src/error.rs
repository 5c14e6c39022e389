use thiserror::Error;

/// Pipeline error taxonomy. Fetch and merge failures abort a single metric
/// kind's contribution to the cycle; delivery failures are retried by the
/// batch writer and surfaced here only once the retry budget is exhausted.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("provider fetch failed ({what}): {cause:#}")]
    Fetch { what: String, cause: anyhow::Error },

    #[error("provider payload malformed ({what}): {cause:#}")]
    Merge { what: String, cause: anyhow::Error },

    #[error("batch delivery failed after {attempts} attempts: {cause:#}")]
    Delivery { attempts: usize, cause: anyhow::Error },
}

impl SyncError {
    pub fn fetch(what: impl Into<String>, cause: impl Into<anyhow::Error>) -> Self {
        Self::Fetch {
            what: what.into(),
            cause: cause.into(),
        }
    }

    pub fn merge(what: impl Into<String>, cause: impl Into<anyhow::Error>) -> Self {
        Self::Merge {
            what: what.into(),
            cause: cause.into(),
        }
    }

    pub fn delivery(attempts: usize, cause: impl Into<anyhow::Error>) -> Self {
        Self::Delivery {
            attempts,
            cause: cause.into(),
        }
    }
}
