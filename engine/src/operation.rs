//! Bulk operations submitted to the search index.
//!
//! The index is never mutated directly. The reconciler expresses every change
//! as a [`BulkOperation`] keyed by person id, and the index answers each one
//! with an [`OperationOutcome`].

use crate::{PersonDocument, PersonId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    /// Replace the whole document under the key
    Replace,
    /// Remove the document under the key
    Delete,
}

impl fmt::Display for BulkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BulkAction::Replace => f.write_str("replace"),
            BulkAction::Delete => f.write_str("delete"),
        }
    }
}

/// One operation of a bulk batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum BulkOperation {
    /// Full replacement; sending it twice leaves the same document.
    Replace { id: PersonId, document: PersonDocument },
    /// Removal; deleting an absent document is not a failure.
    Delete { id: PersonId },
}

impl BulkOperation {
    /// Get the person id this operation targets.
    pub fn id(&self) -> PersonId {
        match self {
            BulkOperation::Replace { id, .. } => *id,
            BulkOperation::Delete { id } => *id,
        }
    }

    /// Get the kind of this operation.
    pub fn action(&self) -> BulkAction {
        match self {
            BulkOperation::Replace { .. } => BulkAction::Replace,
            BulkOperation::Delete { .. } => BulkAction::Delete,
        }
    }

    /// Get the document payload, if any.
    pub fn document(&self) -> Option<&PersonDocument> {
        match self {
            BulkOperation::Replace { document, .. } => Some(document),
            BulkOperation::Delete { .. } => None,
        }
    }
}

/// The index's verdict on a single bulk operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutcome {
    pub id: PersonId,
    pub action: BulkAction,
    /// Why the index rejected the operation; `None` on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationOutcome {
    /// A successful outcome for `op`.
    pub fn applied(op: &BulkOperation) -> Self {
        Self {
            id: op.id(),
            action: op.action(),
            error: None,
        }
    }

    /// A failed outcome for `op`.
    pub fn failed(op: &BulkOperation, reason: impl Into<String>) -> Self {
        Self {
            id: op.id(),
            action: op.action(),
            error: Some(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors() {
        let op = BulkOperation::Delete { id: 4 };
        assert_eq!(op.id(), 4);
        assert_eq!(op.action(), BulkAction::Delete);
        assert!(op.document().is_none());
    }

    #[test]
    fn outcomes() {
        let op = BulkOperation::Delete { id: 9 };

        let ok = OperationOutcome::applied(&op);
        assert!(ok.is_success());

        let failed = OperationOutcome::failed(&op, "index_closed_exception: closed");
        assert!(!failed.is_success());
        assert_eq!(failed.id, 9);
        assert_eq!(failed.action, BulkAction::Delete);
    }

    #[test]
    fn delete_serialization_format() {
        let json = serde_json::to_string(&BulkOperation::Delete { id: 3 }).unwrap();
        assert_eq!(json, r#"{"action":"delete","id":3}"#);
    }

    #[test]
    fn action_display() {
        assert_eq!(BulkAction::Replace.to_string(), "replace");
        assert_eq!(BulkAction::Delete.to_string(), "delete");
    }
}
