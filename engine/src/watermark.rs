//! The sync watermark: "synchronized up to and including this instant".

use crate::{
    clock::epoch, error::Result, BulkAction, ChangeSet, PersonId, ReconcileReport, Timestamp,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::future::Future;
use std::str::FromStr;
use std::sync::Mutex;

/// Persistence for the single watermark value.
pub trait WatermarkStore: Send + Sync {
    /// The stored watermark, or the Unix epoch if none was ever written.
    fn read(&self) -> impl Future<Output = Result<Timestamp>> + Send;

    /// Overwrite the stored watermark.
    fn write(&self, at: Timestamp) -> impl Future<Output = Result<()>> + Send;
}

/// A watermark held in memory.
#[derive(Debug, Default)]
pub struct MemoryWatermarkStore {
    value: Mutex<Option<Timestamp>>,
}

impl MemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `at`.
    pub fn at(at: Timestamp) -> Self {
        Self {
            value: Mutex::new(Some(at)),
        }
    }

    /// The stored value without going through the async trait.
    pub fn get(&self) -> Option<Timestamp> {
        *self.value.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl WatermarkStore for MemoryWatermarkStore {
    async fn read(&self) -> Result<Timestamp> {
        Ok(self.get().unwrap_or_else(epoch))
    }

    async fn write(&self, at: Timestamp) -> Result<()> {
        *self.value.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(at);
        Ok(())
    }
}

/// How far the watermark moves at the end of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkPolicy {
    /// Advance to the cycle start even if some operations failed. Failed
    /// replaces are not picked up again until their person is modified.
    #[default]
    CycleStart,
    /// Advance to the cycle start only if every replace succeeded; otherwise
    /// stop just before the oldest failed replace so the next cycle reads it
    /// again.
    HoldOnFailure,
}

impl WatermarkPolicy {
    /// Pick the watermark to persist after a cycle.
    ///
    /// The result is never earlier than `previous`.
    pub fn next_watermark(
        &self,
        previous: Timestamp,
        cycle_start: Timestamp,
        change_set: &ChangeSet,
        report: &ReconcileReport,
    ) -> Timestamp {
        let candidate = match self {
            WatermarkPolicy::CycleStart => cycle_start,
            WatermarkPolicy::HoldOnFailure => {
                let failed: BTreeSet<PersonId> = report.failed_ids(BulkAction::Replace).collect();
                change_set
                    .upserts
                    .iter()
                    .filter(|u| failed.contains(&u.id))
                    .map(|u| u.document.last_modified)
                    .min()
                    .map(|oldest| (oldest - Duration::microseconds(1)).min(cycle_start))
                    .unwrap_or(cycle_start)
            }
        };
        candidate.max(previous)
    }
}

impl FromStr for WatermarkPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cycle_start" => Ok(WatermarkPolicy::CycleStart),
            "hold_on_failure" => Ok(WatermarkPolicy::HoldOnFailure),
            other => Err(format!("unknown watermark policy: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::millis_to_timestamp;
    use crate::{GeoPoint, NewPerson, OperationFailure, Upsert};
    use futures::executor::block_on;

    fn upsert(id: PersonId, millis: i64) -> Upsert {
        let person = NewPerson {
            firstname: "Éric".into(),
            lastname: "Pelletier".into(),
            address: "8 rue King".into(),
            city: "Sherbrooke".into(),
            postal_code: "J1H 1P7".into(),
            country: "Canada".into(),
            email: "eric@example.com".into(),
            phone: "819-555-0188".into(),
            location: GeoPoint::new(45.4, -71.9),
        }
        .into_person(id, millis_to_timestamp(millis));
        Upsert::from(&person)
    }

    fn failed_replace(id: PersonId) -> OperationFailure {
        OperationFailure {
            id,
            action: BulkAction::Replace,
            reason: "boom".into(),
        }
    }

    #[test]
    fn memory_store_defaults_to_epoch() {
        let store = MemoryWatermarkStore::new();
        assert_eq!(block_on(store.read()).unwrap(), epoch());

        let at = millis_to_timestamp(5_000);
        block_on(store.write(at)).unwrap();
        assert_eq!(block_on(store.read()).unwrap(), at);
        assert_eq!(store.get(), Some(at));
    }

    #[test]
    fn cycle_start_ignores_failures() {
        let cs = ChangeSet {
            upserts: vec![upsert(1, 100)],
            ..ChangeSet::default()
        };
        let report = ReconcileReport {
            upserted: 1,
            failed: 1,
            failures: vec![failed_replace(1)],
            ..ReconcileReport::default()
        };

        let next = WatermarkPolicy::CycleStart.next_watermark(
            millis_to_timestamp(50),
            millis_to_timestamp(1_000),
            &cs,
            &report,
        );
        assert_eq!(next, millis_to_timestamp(1_000));
    }

    #[test]
    fn hold_on_failure_stops_before_oldest_failed_replace() {
        let cs = ChangeSet {
            upserts: vec![upsert(1, 100), upsert(2, 300), upsert(3, 200)],
            ..ChangeSet::default()
        };
        let report = ReconcileReport {
            upserted: 3,
            succeeded: 1,
            failed: 2,
            failures: vec![failed_replace(2), failed_replace(3)],
            ..ReconcileReport::default()
        };

        let next = WatermarkPolicy::HoldOnFailure.next_watermark(
            millis_to_timestamp(50),
            millis_to_timestamp(1_000),
            &cs,
            &report,
        );
        assert_eq!(next, millis_to_timestamp(200) - Duration::microseconds(1));
        assert!(next < cs.upserts[2].document.last_modified);
    }

    #[test]
    fn hold_on_failure_ignores_failed_deletes() {
        let report = ReconcileReport {
            deleted: 1,
            failed: 1,
            failures: vec![OperationFailure {
                id: 9,
                action: BulkAction::Delete,
                reason: "boom".into(),
            }],
            ..ReconcileReport::default()
        };

        let next = WatermarkPolicy::HoldOnFailure.next_watermark(
            millis_to_timestamp(50),
            millis_to_timestamp(1_000),
            &ChangeSet::default(),
            &report,
        );
        assert_eq!(next, millis_to_timestamp(1_000));
    }

    #[test]
    fn never_moves_backwards() {
        let next = WatermarkPolicy::CycleStart.next_watermark(
            millis_to_timestamp(2_000),
            millis_to_timestamp(1_000),
            &ChangeSet::default(),
            &ReconcileReport::default(),
        );
        assert_eq!(next, millis_to_timestamp(2_000));
    }

    #[test]
    fn parse_policy() {
        assert_eq!(
            "cycle_start".parse::<WatermarkPolicy>(),
            Ok(WatermarkPolicy::CycleStart)
        );
        assert_eq!(
            " HOLD_ON_FAILURE ".parse::<WatermarkPolicy>(),
            Ok(WatermarkPolicy::HoldOnFailure)
        );
        assert!("sometimes".parse::<WatermarkPolicy>().is_err());
    }
}
