//! Controller error types.

use thiserror::Error;

use crate::loader::LoadError;
use crate::store::StoreError;

/// Errors from a single reconcile pass.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A load failure that does not disqualify the content itself.
    #[error("Resource load failed: {0}")]
    Load(#[from] LoadError),

    /// Every revision in the history is tainted; only a new version can help.
    #[error("All revisions of node '{node_id}' are tainted")]
    AllRevisionsTainted { node_id: String },

    #[error("Found {count} revisions for node '{node_id}' at version '{version}'")]
    DuplicateRevisions {
        node_id: String,
        version: String,
        count: usize,
    },

    #[error("No revision for node '{node_id}' at version '{version}'")]
    RevisionNotFound { node_id: String, version: String },

    #[error("No DesiredConfig for node '{node_id}'")]
    ConfigNotFound { node_id: String },

    #[error("Found {count} DesiredConfigs for node '{node_id}'")]
    MultipleConfigsForNode { node_id: String, count: usize },
}

impl ReconcileError {
    /// Whether the runner should requeue the work item with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::Store(e) => e.is_retryable(),
            ReconcileError::Load(e) => !e.is_validation(),
            ReconcileError::RevisionNotFound { .. } => true,
            ReconcileError::AllRevisionsTainted { .. }
            | ReconcileError::DuplicateRevisions { .. }
            | ReconcileError::ConfigNotFound { .. }
            | ReconcileError::MultipleConfigsForNode { .. } => false,
        }
    }
}
