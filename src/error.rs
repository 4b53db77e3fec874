//! Pipeline Error Taxonomy
//!
//! Every failure the authorization pipeline can produce is an enumerated
//! kind so callers can branch on it. The command layer renders each kind
//! as a one-line message; secrets never appear in any variant.

use thiserror::Error;

use crate::authz::DenyReason;

/// Kinds of records a store lookup can miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Identity,
    Token,
    Domain,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Identity => write!(f, "identity"),
            ResourceKind::Token => write!(f, "token"),
            ResourceKind::Domain => write!(f, "domain"),
        }
    }
}

/// Errors produced by the authorization-and-intent pipeline and the stores
/// it writes through.
///
/// `Conflict` is the only kind a caller may retry automatically (re-read the
/// store, then reapply); every other kind requires new user input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// No identity is active in the session.
    #[error("no active identity; create or select one first")]
    NoActiveIdentity,

    /// The acting identity lacks the required capability or ownership.
    #[error("unauthorized: {0}")]
    Unauthorized(DenyReason),

    /// The operation payload failed resource-specific validation.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The supplied secret did not unlock the identity's key material.
    #[error("invalid password")]
    InvalidSecret,

    /// Secret and confirmation did not match during create/import.
    #[error("passwords do not match")]
    SecretMismatch,

    /// The store was modified by another writer since it was read.
    #[error("store changed by another process; operation can be retried")]
    Conflict,

    /// The submission channel did not answer within the bounded wait.
    #[error("transaction submission timed out")]
    SubmissionTimeout,

    /// The submission channel refused the intent.
    #[error("transaction rejected: {0}")]
    SubmissionRejected(String),

    /// A referenced identity, token, or domain does not exist.
    #[error("{0} not found")]
    NotFound(ResourceKind),

    /// Filesystem or encoding failure underneath a store operation.
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Storage(err.to_string())
    }
}
