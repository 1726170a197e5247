//! Bulk reconciliation of a change set into the index.
//!
//! # Algorithm
//!
//! 1. Turn every upsert into a replace keyed by person id
//! 2. Turn every delete into a delete keyed by person id
//! 3. Submit the whole batch in one bulk call; the index keeps going past
//!    failing operations
//! 4. Fold the per-operation outcomes into a [`ReconcileReport`]
//!
//! Nothing is retried here. A failed operation is reported to the caller and
//! left for the next cycle or for manual follow-up.

use crate::{
    error::Result, BulkAction, BulkOperation, ChangeSet, OperationOutcome, PersonId, SearchIndex,
};
use serde::{Deserialize, Serialize};

/// Reason recorded for an operation the index did not answer.
pub const MISSING_OUTCOME: &str = "no outcome reported by index";

/// A single operation the index rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationFailure {
    pub id: PersonId,
    pub action: BulkAction,
    pub reason: String,
}

/// Result of reconciling one change set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Persons considered for replace
    pub upserted: usize,
    /// Documents considered for delete
    pub deleted: usize,
    /// Operations the index applied
    pub succeeded: usize,
    /// Operations the index rejected
    pub failed: usize,
    /// One entry per rejected operation, in submission order
    pub failures: Vec<OperationFailure>,
}

impl ReconcileReport {
    /// True when every submitted operation was applied.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }

    /// Ids of rejected operations of the given kind.
    pub fn failed_ids(&self, action: BulkAction) -> impl Iterator<Item = PersonId> + '_ {
        self.failures
            .iter()
            .filter(move |f| f.action == action)
            .map(|f| f.id)
    }
}

/// Turns change sets into bulk batches and applies them.
#[derive(Debug, Clone, Copy, Default)]
pub struct BulkReconciler;

impl BulkReconciler {
    pub fn new() -> Self {
        Self
    }

    /// Build the batch for `change_set`: replaces first, then deletes.
    pub fn plan(&self, change_set: &ChangeSet) -> Vec<BulkOperation> {
        let mut ops = Vec::with_capacity(change_set.len());

        for upsert in &change_set.upserts {
            tracing::debug!(
                id = upsert.id,
                lat = upsert.document.location.lat,
                lon = upsert.document.location.lon,
                "preparing replace"
            );
            ops.push(BulkOperation::Replace {
                id: upsert.id,
                document: upsert.document.clone(),
            });
        }

        for id in &change_set.deletes {
            tracing::debug!(id, "preparing delete");
            ops.push(BulkOperation::Delete { id: *id });
        }

        ops
    }

    /// Apply `change_set` to `index` in one bulk call.
    ///
    /// Only an unreachable index is an error. Operations the index rejects
    /// are counted and listed in the report.
    pub async fn apply<I: SearchIndex>(
        &self,
        index: &I,
        change_set: &ChangeSet,
    ) -> Result<ReconcileReport> {
        let ops = self.plan(change_set);

        if ops.is_empty() {
            tracing::info!("no bulk operations to execute");
            return Ok(ReconcileReport::default());
        }

        let outcomes = index.bulk(&ops).await?;
        let report = Self::summarize(change_set, &ops, outcomes);

        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            "bulk sync completed"
        );
        for failure in &report.failures {
            tracing::error!(
                id = failure.id,
                action = %failure.action,
                reason = %failure.reason,
                "bulk operation failed"
            );
        }

        Ok(report)
    }

    /// Fold per-operation outcomes into a report.
    ///
    /// Outcomes are matched to operations by position. Operations past the
    /// end of `outcomes` count as failures.
    pub fn summarize(
        change_set: &ChangeSet,
        ops: &[BulkOperation],
        outcomes: Vec<OperationOutcome>,
    ) -> ReconcileReport {
        let mut report = ReconcileReport {
            upserted: change_set.upserts.len(),
            deleted: change_set.deletes.len(),
            ..ReconcileReport::default()
        };

        let mut outcomes = outcomes.into_iter();
        for op in ops {
            let outcome = outcomes
                .next()
                .unwrap_or_else(|| OperationOutcome::failed(op, MISSING_OUTCOME));

            match outcome.error {
                None => report.succeeded += 1,
                Some(reason) => {
                    report.failed += 1;
                    report.failures.push(OperationFailure {
                        id: op.id(),
                        action: op.action(),
                        reason,
                    });
                }
            }
        }

        report
    }
}
