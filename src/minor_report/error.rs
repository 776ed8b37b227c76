//! Error types for the minor-report system
//!
//! This module defines the various errors that can occur during report operations.

use crate::gateway::GatewayError;
use crate::minor_report::ReportStatus;
use thiserror::Error;

/// Errors that can occur during minor-report operations
#[derive(Debug, Error)]
pub enum ReportError {
    /// Suspected age outside the 1-17 range
    #[error("suspected age must be between 1 and 17")]
    InvalidAge(i64),

    /// Evidence text missing at creation
    #[error("evidence must not be empty")]
    EmptyEvidence,

    /// Ban duration string could not be parsed
    #[error("invalid ban duration: {0}")]
    InvalidDuration(String),

    /// Report not found by id or card message id
    #[error("report not found: {0}")]
    NotFound(String),

    /// Invalid state transition attempted
    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        from: ReportStatus,
        to: ReportStatus,
    },

    /// Report is no longer pending, action controls are stale
    #[error("report is no longer pending")]
    NotPending,

    /// Caller is not in the reviewer allowlist
    #[error("not authorized to review minor reports")]
    NotAuthorized,

    /// User is already in the reviewer allowlist
    #[error("user {0} is already a reviewer")]
    AlreadyReviewer(u64),

    /// User is not in the reviewer allowlist
    #[error("user {0} is not in the reviewer list")]
    NotReviewer(u64),

    /// Seed attempted while the reviewer table is non-empty
    #[error("reviewers already configured")]
    AlreadySeeded,

    /// Discord call failed
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

/// Result type for minor-report operations
pub type ReportResult<T> = Result<T, ReportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ReportError::InvalidAge(19);
        assert_eq!(error.to_string(), "suspected age must be between 1 and 17");

        let error = ReportError::NotFound("message 42".to_string());
        assert_eq!(error.to_string(), "report not found: message 42");

        let error = ReportError::InvalidStateTransition {
            from: ReportStatus::Denied,
            to: ReportStatus::Approved,
        };
        assert_eq!(
            error.to_string(),
            "invalid state transition: denied -> approved"
        );
    }
}
