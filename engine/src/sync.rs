//! One sync cycle: resolve, reconcile, advance the watermark.

use crate::{
    error::Result, resolve, BulkReconciler, Clock, EntitySource, Error, OperationFailure,
    ReconcileReport, SearchIndex, SearchHit, SearchQuery, Timestamp, WatermarkPolicy,
    WatermarkStore, MAX_SEARCH_RESULTS,
};
use chrono::{SubsecRound, TimeDelta};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// What a completed cycle did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Watermark the cycle started from
    pub watermark_from: Timestamp,
    /// Watermark persisted at the end of the cycle
    pub watermark_to: Timestamp,
    /// Persons considered for replace
    pub upserted: usize,
    /// Documents considered for delete
    pub deleted: usize,
    /// Bulk operations applied
    pub succeeded: usize,
    /// Bulk operations rejected
    pub failed: usize,
    /// Rejected operations, for manual follow-up
    pub failures: Vec<OperationFailure>,
}

impl SyncReport {
    fn new(watermark_from: Timestamp, watermark_to: Timestamp, report: ReconcileReport) -> Self {
        Self {
            watermark_from,
            watermark_to,
            upserted: report.upserted,
            deleted: report.deleted,
            succeeded: report.succeeded,
            failed: report.failed,
            failures: report.failures,
        }
    }
}

/// Releases the single-flight flag when a cycle ends, however it ends.
struct CycleGuard<'a> {
    in_flight: &'a AtomicBool,
}

impl<'a> CycleGuard<'a> {
    fn acquire(in_flight: &'a AtomicBool) -> Option<Self> {
        in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { in_flight })
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
    }
}

/// Owns the three store handles and runs sync cycles over them.
///
/// At most one cycle runs at a time per engine; a concurrent call fails with
/// [`Error::CycleInProgress`] instead of racing on the watermark. Engines in
/// different processes sharing one watermark must be serialized by the
/// caller.
pub struct SyncEngine<S, I, W, C> {
    source: S,
    index: I,
    watermark: W,
    clock: C,
    policy: WatermarkPolicy,
    commit_lag: TimeDelta,
    reconciler: BulkReconciler,
    in_flight: AtomicBool,
}

impl<S, I, W, C> SyncEngine<S, I, W, C>
where
    S: EntitySource,
    I: SearchIndex,
    W: WatermarkStore,
    C: Clock,
{
    pub fn new(source: S, index: I, watermark: W, clock: C, policy: WatermarkPolicy) -> Self {
        Self {
            source,
            index,
            watermark,
            clock,
            policy,
            commit_lag: TimeDelta::zero(),
            reconciler: BulkReconciler::new(),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Hold the watermark `lag` behind the cycle start.
    ///
    /// A row stamped before the cycle started but committed after the cycle
    /// read the source would otherwise never be picked up. Rows inside the
    /// lag window are re-read on the next cycle; replacing them again is
    /// harmless.
    pub fn with_commit_lag(mut self, lag: Duration) -> Self {
        self.commit_lag = TimeDelta::from_std(lag).unwrap_or(TimeDelta::MAX);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    pub fn watermark_store(&self) -> &W {
        &self.watermark
    }

    pub fn policy(&self) -> WatermarkPolicy {
        self.policy
    }

    /// True while a cycle is running.
    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one sync cycle.
    ///
    /// Errors leave the watermark where it was: a failed read means nothing
    /// was touched, and an unreachable index during the bulk call means the
    /// next cycle replays the same window. Operations the index rejects do not
    /// fail the cycle; they are listed in the report and the watermark moves
    /// according to the engine's [`WatermarkPolicy`].
    pub async fn run_cycle(&self) -> Result<SyncReport> {
        let _guard = CycleGuard::acquire(&self.in_flight).ok_or(Error::CycleInProgress)?;

        // Stored timestamps keep microseconds; a finer watermark would not
        // survive a round trip through the watermark store.
        let cycle_start = self.clock.now().trunc_subsecs(6);
        let from = self.watermark.read().await?;
        tracing::info!(watermark = %from, "starting sync cycle");

        let change_set = match resolve(&self.source, &self.index, from).await {
            Ok(change_set) => change_set,
            Err(e) => {
                tracing::error!(error = %e, "change-set resolution failed");
                return Err(e);
            }
        };

        let report = match self.reconciler.apply(&self.index, &change_set).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "bulk apply failed");
                return Err(e);
            }
        };

        let horizon = cycle_start
            .checked_sub_signed(self.commit_lag)
            .unwrap_or_else(crate::clock::epoch);
        let to = self
            .policy
            .next_watermark(from, horizon, &change_set, &report);
        self.watermark.write(to).await?;

        if !report.is_clean() && self.policy == WatermarkPolicy::CycleStart {
            tracing::warn!(
                failed = report.failed,
                "watermark advanced past failed operations; they will not be retried"
            );
        }
        tracing::info!(
            upserted = report.upserted,
            deleted = report.deleted,
            watermark = %to,
            "synchronization completed"
        );

        Ok(SyncReport::new(from, to, report))
    }

    /// Search the index, capped at [`MAX_SEARCH_RESULTS`] hits.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>> {
        self.index.search(query, MAX_SEARCH_RESULTS).await
    }
}
