//! Error taxonomy shared by every Leadwatch component.
//!
//! | Variant | Meaning | Policy |
//! |---------|---------|--------|
//! | [`LeadError::InvalidArgument`] | caller-supplied value out of contract | fail fast, no retry |
//! | [`LeadError::UpstreamUnavailable`] | search/scoring provider or network failure | logged, skipped |
//! | [`LeadError::ScoringDegraded`] | scoring call failed or returned garbage | converted to a neutral score, never propagated |
//! | [`LeadError::NotFound`] | referenced id absent | surfaced as a failed operation |
//! | [`LeadError::StorageFailure`] | persistence operation failed | surfaced; batch writes roll back |

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LeadError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LeadError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("scoring degraded: {0}")]
    ScoringDegraded(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage failure: {0}")]
    StorageFailure(String),
}

impl LeadError {
    pub fn invalid(message: impl Into<String>) -> Self {
        LeadError::InvalidArgument(message.into())
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        LeadError::UpstreamUnavailable(message.into())
    }

    pub fn storage(message: impl std::fmt::Display) -> Self {
        LeadError::StorageFailure(message.to_string())
    }

    /// Machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            LeadError::InvalidArgument(_) => "bad_request",
            LeadError::UpstreamUnavailable(_) => "upstream_unavailable",
            LeadError::ScoringDegraded(_) => "scoring_degraded",
            LeadError::NotFound(_) => "not_found",
            LeadError::StorageFailure(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_kind() {
        let err = LeadError::invalid("limit must be between 1 and 100");
        assert_eq!(
            err.to_string(),
            "invalid argument: limit must be between 1 and 100"
        );
    }

    #[test]
    fn test_codes() {
        assert_eq!(LeadError::NotFound("x".into()).code(), "not_found");
        assert_eq!(LeadError::storage("disk full").code(), "internal");
        assert_eq!(LeadError::upstream("503").code(), "upstream_unavailable");
    }
}
