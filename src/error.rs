//! Error types for jtx
//!
//! Defines a unified error type covering configuration, propagation and
//! resource-manager failures. Resource managers report their own failures as
//! [`ResourceError`]; the transaction manager wraps those into the
//! `Resource*` variants so callers always know which resource type failed.

use thiserror::Error;

use crate::transaction::{TransactionId, TransactionStatus};

/// Failure reported by a resource manager implementation.
pub type ResourceError = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for jtx operations
#[derive(Error, Debug)]
pub enum JtxError {
    /// Invalid resource-manager registration or manager settings
    #[error("invalid transaction manager configuration: {0}")]
    Configuration(String),

    /// MANDATORY propagation found no ambient transaction
    #[error(
        "no existing transaction found for mandatory propagation (scope {})",
        scope_label(.scope)
    )]
    NoTransaction { scope: Option<String> },

    /// NEVER propagation found an ambient transaction
    #[error("existing transaction found for propagation 'never' (scope {})", scope_label(.scope))]
    ExistingTransaction { scope: Option<String> },

    #[error("failed to begin {resource} resource: {source}")]
    ResourceBegin {
        resource: String,
        source: ResourceError,
    },

    #[error("failed to commit {resource} resource: {source}")]
    ResourceCommit {
        resource: String,
        source: ResourceError,
    },

    #[error("failed to roll back {resource} resource: {source}")]
    ResourceRollback {
        resource: String,
        source: ResourceError,
    },

    #[error("failed to close {resource} resource manager: {source}")]
    ResourceClose {
        resource: String,
        source: ResourceError,
    },

    /// Several failures collected while completing a multi-resource transaction
    #[error("{} failure(s): {}", .0.len(), join_errors(.0))]
    Aggregate(Vec<JtxError>),

    /// Commit was requested on a transaction marked rollback-only; it was rolled back instead
    #[error("transaction {id} was marked rollback-only and has been rolled back")]
    RollbackOnly { id: TransactionId },

    #[error("transaction {id} is {status}")]
    InvalidState {
        id: TransactionId,
        status: TransactionStatus,
    },

    /// Completion was requested for a transaction that is not the innermost one of its scope
    #[error("transaction {id} is not the current transaction of its scope")]
    NotCurrent { id: TransactionId },

    /// A joiner's mode is incompatible with the existing transaction
    #[error("incompatible participating transaction: {0}")]
    IncompatibleTransaction(String),

    /// The resource is still borrowed through a `ResourceGuard`
    #[error("{0} resource is still in use")]
    ResourceInUse(String),

    #[error("no resource manager registered for resource type {0}")]
    ResourceNotRegistered(String),

    #[error("no transaction context is available for the current task")]
    NoExecutionContext,

    #[error("transaction context of the current task is already borrowed")]
    ContextInUse,

    #[error("invalid transaction metadata: {0}")]
    Metadata(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn scope_label(scope: &Option<String>) -> String {
    match scope {
        Some(scope) => format!("'{}'", scope),
        None => "<unscoped>".to_string(),
    }
}

fn join_errors(errors: &[JtxError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl JtxError {
    /// Build a single error out of collected failures.
    ///
    /// Returns `None` for an empty list and the error itself when only one
    /// failure was collected.
    pub fn aggregate(mut errors: Vec<JtxError>) -> Option<JtxError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(JtxError::Aggregate(errors)),
        }
    }

    /// Flatten this error into its individual failures.
    pub fn failures(&self) -> Vec<&JtxError> {
        match self {
            JtxError::Aggregate(errors) => errors.iter().flat_map(|e| e.failures()).collect(),
            other => vec![other],
        }
    }

    /// True if this error (or any aggregated failure) wraps a resource-manager failure
    pub fn is_resource_failure(&self) -> bool {
        self.failures().iter().any(|e| {
            matches!(
                e,
                JtxError::ResourceBegin { .. }
                    | JtxError::ResourceCommit { .. }
                    | JtxError::ResourceRollback { .. }
                    | JtxError::ResourceClose { .. }
            )
        })
    }
}

/// Result type alias for jtx operations
pub type Result<T> = std::result::Result<T, JtxError>;
