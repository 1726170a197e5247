//! Store seams and their in-memory implementations.
//!
//! The sync engine reads the system of record through [`EntitySource`] and
//! reads and writes the index through [`SearchIndex`]. The in-memory stores
//! here back the engine's tests and examples; the server crate provides the
//! PostgreSQL and Elasticsearch implementations.

use crate::{
    error::Result, record::parse_document_key, BulkOperation, Clock, Error, NewPerson,
    OperationOutcome, Person, PersonDocument, PersonId, SearchHit, SearchQuery, Timestamp,
};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Read access to the system of record.
pub trait EntitySource: Send + Sync {
    /// Every person whose `last_modified` is strictly after `since`.
    fn modified_since(&self, since: Timestamp) -> impl Future<Output = Result<Vec<Person>>> + Send;

    /// The identifiers of every person currently stored.
    fn all_ids(&self) -> impl Future<Output = Result<BTreeSet<PersonId>>> + Send;
}

/// The search index holding person documents.
pub trait SearchIndex: Send + Sync {
    /// The keys of every document currently indexed.
    fn indexed_ids(&self) -> impl Future<Output = Result<BTreeSet<PersonId>>> + Send;

    /// Apply `ops` with continue-on-error semantics.
    ///
    /// Returns one outcome per operation, in submission order. An `Err` means
    /// the index could not be reached at all, not that an operation failed.
    fn bulk(
        &self,
        ops: &[BulkOperation],
    ) -> impl Future<Output = Result<Vec<OperationOutcome>>> + Send;

    /// Run `query`, returning at most `limit` hits.
    fn search(
        &self,
        query: &SearchQuery,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<SearchHit>>> + Send;
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct EntityTable {
    next_id: PersonId,
    persons: BTreeMap<PersonId, Person>,
}

/// An in-memory system of record.
///
/// Every insert and update stamps `last_modified` from the store's clock, the
/// same contract the relational store enforces with a trigger.
pub struct MemoryEntityStore {
    clock: Arc<dyn Clock>,
    table: RwLock<EntityTable>,
    available: AtomicBool,
}

impl MemoryEntityStore {
    /// Create an empty store stamping modifications with `clock`.
    pub fn new(clock: impl Clock + 'static) -> Self {
        Self {
            clock: Arc::new(clock),
            table: RwLock::new(EntityTable {
                next_id: 1,
                persons: BTreeMap::new(),
            }),
            available: AtomicBool::new(true),
        }
    }

    /// Insert a person under the next free identifier.
    pub fn insert(&self, person: NewPerson) -> Person {
        let mut table = write(&self.table);
        let id = table.next_id;
        self.insert_locked(&mut table, id, person)
    }

    /// Insert a person under a caller-chosen identifier, replacing any
    /// existing row with that id.
    pub fn insert_with_id(&self, id: PersonId, person: NewPerson) -> Person {
        let mut table = write(&self.table);
        self.insert_locked(&mut table, id, person)
    }

    fn insert_locked(&self, table: &mut EntityTable, id: PersonId, person: NewPerson) -> Person {
        let person = person.into_person(id, self.clock.now());
        table.next_id = table.next_id.max(id + 1);
        table.persons.insert(id, person.clone());
        person
    }

    /// Modify a person in place and restamp it.
    pub fn update(&self, id: PersonId, change: impl FnOnce(&mut Person)) -> Option<Person> {
        let mut table = write(&self.table);
        let person = table.persons.get_mut(&id)?;
        change(person);
        person.id = id;
        person.last_modified = self.clock.now();
        Some(person.clone())
    }

    /// Hard-delete a person.
    pub fn remove(&self, id: PersonId) -> Option<Person> {
        write(&self.table).persons.remove(&id)
    }

    /// Get a person by id.
    pub fn get(&self, id: PersonId) -> Option<Person> {
        read(&self.table).persons.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        read(&self.table).persons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Simulate the store going away; reads fail while unavailable.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::entity_store("connection refused"))
        }
    }
}

impl EntitySource for MemoryEntityStore {
    async fn modified_since(&self, since: Timestamp) -> Result<Vec<Person>> {
        self.check_available()?;
        Ok(read(&self.table)
            .persons
            .values()
            .filter(|p| p.last_modified > since)
            .cloned()
            .collect())
    }

    async fn all_ids(&self) -> Result<BTreeSet<PersonId>> {
        self.check_available()?;
        Ok(read(&self.table).persons.keys().copied().collect())
    }
}

/// An in-memory search index.
///
/// Replaces with an out-of-range location are rejected the way a geo_point
/// mapping rejects them, and individual ids can be set to fail so tests can
/// exercise partial failures.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    documents: RwLock<BTreeMap<PersonId, PersonDocument>>,
    rejected: RwLock<BTreeSet<PersonId>>,
    unavailable: AtomicBool,
    bulk_calls: AtomicUsize,
}

impl MemoryIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index already holding `documents`.
    pub fn with_documents(documents: impl IntoIterator<Item = (PersonId, PersonDocument)>) -> Self {
        let index = Self::new();
        write(&index.documents).extend(documents);
        index
    }

    /// Put a document directly, bypassing bulk.
    pub fn put(&self, id: PersonId, document: PersonDocument) {
        write(&self.documents).insert(id, document);
    }

    /// Get a document by key.
    pub fn get(&self, id: PersonId) -> Option<PersonDocument> {
        read(&self.documents).get(&id).cloned()
    }

    /// Keys of every indexed document.
    pub fn ids(&self) -> BTreeSet<PersonId> {
        read(&self.documents).keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        read(&self.documents).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every future operation on `id` fail.
    pub fn reject(&self, id: PersonId) {
        write(&self.rejected).insert(id);
    }

    /// Stop failing operations on `id`.
    pub fn accept(&self, id: PersonId) {
        write(&self.rejected).remove(&id);
    }

    /// Simulate the index going away; every call fails while unavailable.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Number of bulk calls received so far.
    pub fn bulk_calls(&self) -> usize {
        self.bulk_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(Error::search_index("connection refused"))
        } else {
            Ok(())
        }
    }

    fn apply_one(&self, op: &BulkOperation) -> OperationOutcome {
        if read(&self.rejected).contains(&op.id()) {
            return OperationOutcome::failed(op, "rejected_exception: operation rejected by index");
        }

        match op {
            BulkOperation::Replace { id, document } => {
                if !document.location.is_valid() {
                    return OperationOutcome::failed(
                        op,
                        "mapper_parsing_exception: failed to parse field [location] of type [geo_point]",
                    );
                }
                write(&self.documents).insert(*id, document.clone());
            }
            BulkOperation::Delete { id } => {
                write(&self.documents).remove(id);
            }
        }
        OperationOutcome::applied(op)
    }
}

impl SearchIndex for MemoryIndex {
    async fn indexed_ids(&self) -> Result<BTreeSet<PersonId>> {
        self.check_available()?;
        Ok(self.ids())
    }

    async fn bulk(&self, ops: &[BulkOperation]) -> Result<Vec<OperationOutcome>> {
        self.check_available()?;
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ops.iter().map(|op| self.apply_one(op)).collect())
    }

    async fn search(&self, query: &SearchQuery, limit: usize) -> Result<Vec<SearchHit>> {
        self.check_available()?;
        Ok(read(&self.documents)
            .iter()
            .filter(|(_, doc)| query.matches(doc))
            .take(limit)
            .map(|(id, doc)| SearchHit {
                id: *id,
                document: doc.clone(),
            })
            .collect())
    }
}

/// Parse index document keys, dropping any that are not person ids.
///
/// Returns the parsed ids and the keys that were skipped.
pub fn parse_document_keys<'a>(
    keys: impl IntoIterator<Item = &'a str>,
) -> (BTreeSet<PersonId>, Vec<String>) {
    let mut ids = BTreeSet::new();
    let mut skipped = Vec::new();
    for key in keys {
        match parse_document_key(key) {
            Some(id) => {
                ids.insert(id);
            }
            None => skipped.push(key.to_string()),
        }
    }
    (ids, skipped)
}
