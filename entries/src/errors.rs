use crate::fallback::FallbackError;
use crate::store::StoreError;
use reqwest::StatusCode;

#[derive(thiserror::Error, Debug)]
pub enum EntriesError {
    /// The replica tier is not configured. Callers fall back to the CMS API.
    #[error("content replica is not configured")]
    ReplicaDisabled,

    /// The CMS API tier is not configured. There is no tier left to try.
    #[error("content fallback is not configured")]
    FallbackDisabled,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("could not decode stored content: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Fallback(#[from] FallbackError),
}

impl EntriesError {
    /// HTTP status to report this error with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            EntriesError::Fallback(FallbackError::Status { status, .. }) => *status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code() {
        let upstream = EntriesError::Fallback(FallbackError::Status {
            status: StatusCode::NOT_FOUND,
            message: "The resource could not be found.".into(),
        });
        assert_eq!(upstream.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            upstream.to_string(),
            "CMS responded with 404 Not Found: The resource could not be found."
        );

        assert_eq!(
            EntriesError::FallbackDisabled.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            EntriesError::Store(StoreError::Unavailable { attempts: 10 }).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
