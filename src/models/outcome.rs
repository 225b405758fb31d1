//! Verification outcome models

use serde::{Deserialize, Serialize};

use crate::error::RejectReason;

use super::Subject;

/// Result of one `authenticate` call
///
/// A subject is only reachable through the `Authenticated` variant, so a
/// caller cannot observe one without a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// Credential verified
    Authenticated { subject: Subject },

    /// Credential rejected
    Rejected { reason: RejectReason },
}

impl VerificationOutcome {
    /// Whether the outcome is `Authenticated`
    pub fn is_authenticated(&self) -> bool {
        matches!(self, VerificationOutcome::Authenticated { .. })
    }

    /// Verified subject, if any
    pub fn subject(&self) -> Option<&Subject> {
        match self {
            VerificationOutcome::Authenticated { subject } => Some(subject),
            VerificationOutcome::Rejected { .. } => None,
        }
    }

    /// Rejection reason, if any
    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            VerificationOutcome::Authenticated { .. } => None,
            VerificationOutcome::Rejected { reason } => Some(*reason),
        }
    }

    /// Tag used in logs and metrics
    pub fn tag(&self) -> &'static str {
        match self {
            VerificationOutcome::Authenticated { .. } => "authenticated",
            VerificationOutcome::Rejected { .. } => "rejected",
        }
    }
}

impl From<Result<Subject, RejectReason>> for VerificationOutcome {
    fn from(result: Result<Subject, RejectReason>) -> Self {
        match result {
            Ok(subject) => VerificationOutcome::Authenticated { subject },
            Err(reason) => VerificationOutcome::Rejected { reason },
        }
    }
}

/// Externally visible refusal class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Refusal {
    /// Any credential failure
    Unauthorized,
    /// Caller network not allowed
    Forbidden,
    /// Trust store could not be consulted
    Unavailable,
}

impl Refusal {
    /// Generic message safe to return to callers
    pub fn message(&self) -> &'static str {
        match self {
            Refusal::Unauthorized => "Unauthorized",
            Refusal::Forbidden => "Forbidden",
            Refusal::Unavailable => "Service unavailable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_ok() {
        let outcome: VerificationOutcome = Ok(Subject::new("alice")).into();
        assert!(outcome.is_authenticated());
        assert_eq!(outcome.subject().map(Subject::as_str), Some("alice"));
        assert_eq!(outcome.reason(), None);
        assert_eq!(outcome.tag(), "authenticated");
    }

    #[test]
    fn test_outcome_from_err() {
        let outcome: VerificationOutcome = Err(RejectReason::Expired).into();
        assert!(!outcome.is_authenticated());
        assert!(outcome.subject().is_none());
        assert_eq!(outcome.reason(), Some(RejectReason::Expired));
        assert_eq!(outcome.tag(), "rejected");
    }

    #[test]
    fn test_refusal_messages_hide_reason() {
        assert_eq!(Refusal::Unauthorized.message(), "Unauthorized");
        assert_eq!(Refusal::Forbidden.message(), "Forbidden");
        assert_eq!(Refusal::Unavailable.message(), "Service unavailable");
    }
}
