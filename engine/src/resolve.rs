//! Change-set resolution.
//!
//! Given a watermark, work out what the index needs to converge:
//!
//! - every person modified strictly after the watermark is replaced;
//! - every indexed id with no person behind it is deleted.
//!
//! Deletes come from a full comparison of both id sets rather than from
//! tombstones, so a hard delete in the system of record is always noticed.

use crate::{
    error::Result, EntitySource, Person, PersonDocument, PersonId, SearchIndex, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A person to (re)index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upsert {
    pub id: PersonId,
    pub document: PersonDocument,
}

impl From<&Person> for Upsert {
    fn from(person: &Person) -> Self {
        Self {
            id: person.id,
            document: person.to_document(),
        }
    }
}

/// The work one sync cycle has to do. Computed fresh every cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Persons modified since the watermark, ordered by id
    pub upserts: Vec<Upsert>,
    /// Indexed ids absent from the system of record
    pub deletes: BTreeSet<PersonId>,
}

impl ChangeSet {
    /// Build a change set from the three reads of a cycle.
    ///
    /// `modified` is filtered again against `watermark`, so a source that
    /// over-reports cannot cause extra replaces. An id that is both modified
    /// and missing from `record_ids` was deleted between the two reads; the
    /// delete wins.
    pub fn compute(
        watermark: Timestamp,
        modified: impl IntoIterator<Item = Person>,
        record_ids: &BTreeSet<PersonId>,
        index_ids: &BTreeSet<PersonId>,
    ) -> Self {
        let deletes: BTreeSet<PersonId> = index_ids.difference(record_ids).copied().collect();

        let mut upserts: Vec<Upsert> = modified
            .into_iter()
            .filter(|p| p.last_modified > watermark && !deletes.contains(&p.id))
            .map(|p| Upsert::from(&p))
            .collect();
        upserts.sort_by_key(|u| u.id);
        upserts.dedup_by_key(|u| u.id);

        Self { upserts, deletes }
    }

    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }

    /// Total number of operations this change set turns into.
    pub fn len(&self) -> usize {
        self.upserts.len() + self.deletes.len()
    }

    /// Ids of every person to (re)index.
    pub fn upsert_ids(&self) -> BTreeSet<PersonId> {
        self.upserts.iter().map(|u| u.id).collect()
    }
}

/// Read both stores and compute the change set for `watermark`.
///
/// The three reads are independent and run concurrently. If any of them
/// fails, the error is returned and nothing is computed.
pub async fn resolve<S, I>(source: &S, index: &I, watermark: Timestamp) -> Result<ChangeSet>
where
    S: EntitySource,
    I: SearchIndex,
{
    let (modified, record_ids, index_ids) = futures::try_join!(
        source.modified_since(watermark),
        source.all_ids(),
        index.indexed_ids(),
    )?;

    tracing::debug!(
        modified = modified.len(),
        records = record_ids.len(),
        indexed = index_ids.len(),
        "resolved sync inputs"
    );

    Ok(ChangeSet::compute(watermark, modified, &record_ids, &index_ids))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::millis_to_timestamp;
    use crate::{GeoPoint, ManualClock, MemoryEntityStore, MemoryIndex, NewPerson};
    use futures::executor::block_on;
    use std::sync::Arc;

    fn new_person(lastname: &str) -> NewPerson {
        NewPerson {
            firstname: "Luc".into(),
            lastname: lastname.into(),
            address: "9 av. du Parc".into(),
            city: "Montréal".into(),
            postal_code: "H2V 4E6".into(),
            country: "Canada".into(),
            email: "luc@example.com".into(),
            phone: "514-555-0123".into(),
            location: GeoPoint::new(45.51, -73.6),
        }
    }

    fn person(id: PersonId, millis: i64) -> Person {
        new_person("Roy").into_person(id, millis_to_timestamp(millis))
    }

    #[test]
    fn compute_upserts_strictly_after_watermark() {
        let modified = vec![person(1, 100), person(2, 200), person(3, 300)];
        let ids = BTreeSet::from([1, 2, 3]);

        let cs = ChangeSet::compute(millis_to_timestamp(100), modified, &ids, &BTreeSet::new());

        assert_eq!(cs.upsert_ids(), BTreeSet::from([2, 3]));
        assert!(cs.deletes.is_empty());
    }

    #[test]
    fn compute_deletes_index_orphans() {
        let ids = BTreeSet::from([1, 2]);
        let indexed = BTreeSet::from([2, 5, 9]);

        let cs = ChangeSet::compute(millis_to_timestamp(0), vec![], &ids, &indexed);

        assert!(cs.upserts.is_empty());
        assert_eq!(cs.deletes, BTreeSet::from([5, 9]));
    }

    #[test]
    fn compute_delete_wins_over_upsert() {
        // Person 4 was read as modified, then deleted before the id read.
        let modified = vec![person(4, 500)];
        let ids = BTreeSet::from([1]);
        let indexed = BTreeSet::from([1, 4]);

        let cs = ChangeSet::compute(millis_to_timestamp(0), modified, &ids, &indexed);

        assert!(cs.upserts.is_empty());
        assert_eq!(cs.deletes, BTreeSet::from([4]));
    }

    #[test]
    fn compute_orders_and_dedups_upserts() {
        let modified = vec![person(3, 10), person(1, 10), person(3, 10)];
        let ids = BTreeSet::from([1, 3]);

        let cs = ChangeSet::compute(millis_to_timestamp(0), modified, &ids, &BTreeSet::new());

        let order: Vec<_> = cs.upserts.iter().map(|u| u.id).collect();
        assert_eq!(order, vec![1, 3]);
        assert_eq!(cs.len(), 2);
    }

    #[test]
    fn empty_change_set() {
        let cs = ChangeSet::default();
        assert!(cs.is_empty());
        assert_eq!(cs.len(), 0);
    }

    #[test]
    fn resolve_reads_both_stores() {
        let clock = Arc::new(ManualClock::from_millis(1_000));
        let source = MemoryEntityStore::new(clock.clone());
        let first = source.insert(new_person("Roy"));
        clock.advance_millis(10);
        source.insert(new_person("Côté"));

        let index = MemoryIndex::with_documents([(42, first.to_document())]);

        let cs = block_on(resolve(&source, &index, first.last_modified)).unwrap();
        assert_eq!(cs.upsert_ids(), BTreeSet::from([2]));
        assert_eq!(cs.deletes, BTreeSet::from([42]));
    }

    #[test]
    fn resolve_aborts_on_index_failure() {
        let source = MemoryEntityStore::new(ManualClock::from_millis(0));
        source.insert(new_person("Roy"));
        let index = MemoryIndex::new();
        index.set_available(false);

        let err = block_on(resolve(&source, &index, millis_to_timestamp(-1))).unwrap_err();
        assert!(err.is_connectivity());
    }
}
