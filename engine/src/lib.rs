//! # Geolab Engine
//!
//! Keeps a person search index eventually consistent with its relational
//! system of record.
//!
//! The engine performs no I/O of its own. Stores are reached through the
//! traits in [`store`]; the server crate plugs in PostgreSQL, Elasticsearch and
//! a file-backed watermark, and tests plug in the in-memory stores.
//!
//! ## Sync cycle
//!
//! One cycle runs three steps in order:
//!
//! 1. [`resolve`] reads every person modified after the watermark, the full
//!    set of person ids, and the full set of indexed ids, and turns them into a
//!    [`ChangeSet`].
//! 2. [`BulkReconciler`] turns the change set into replace/delete
//!    [`BulkOperation`]s, submits them in one bulk call and collects a
//!    [`ReconcileReport`]. A failing operation never aborts its siblings.
//! 3. The [`WatermarkPolicy`] picks the next watermark, which is persisted
//!    through the [`WatermarkStore`].
//!
//! [`SyncEngine::run_cycle`] wires the three together and refuses to start a
//! second cycle while one is in flight.
//!
//! ## Delivery
//!
//! Delivery is at-least-once. Replaces are keyed by person id and deletes of
//! absent documents succeed, so re-sending any operation converges to the same
//! index state.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use geolab_engine::{
//!     GeoPoint, ManualClock, MemoryEntityStore, MemoryIndex, MemoryWatermarkStore,
//!     NewPerson, SyncEngine, WatermarkPolicy,
//! };
//!
//! let clock = Arc::new(ManualClock::from_millis(1_000));
//! let source = MemoryEntityStore::new(clock.clone());
//! source.insert(NewPerson {
//!     firstname: "Alice".into(),
//!     lastname: "Tremblay".into(),
//!     address: "12 rue Sherbrooke".into(),
//!     city: "Montréal".into(),
//!     postal_code: "H2X 1X1".into(),
//!     country: "Canada".into(),
//!     email: "alice@example.com".into(),
//!     phone: "514-555-0100".into(),
//!     location: GeoPoint::new(45.45, -73.55),
//! });
//!
//! clock.advance_millis(10);
//! let engine = SyncEngine::new(
//!     source,
//!     MemoryIndex::new(),
//!     MemoryWatermarkStore::new(),
//!     clock.clone(),
//!     WatermarkPolicy::CycleStart,
//! );
//!
//! let report = futures::executor::block_on(engine.run_cycle()).unwrap();
//! assert_eq!(report.upserted, 1);
//! assert_eq!(report.failed, 0);
//! assert_eq!(engine.index().len(), 1);
//! ```

pub mod clock;
pub mod error;
pub mod operation;
pub mod reconcile;
pub mod record;
pub mod resolve;
pub mod search;
pub mod store;
pub mod sync;
pub mod watermark;

// Re-export main types at crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, StoreKind};
pub use operation::{BulkAction, BulkOperation, OperationOutcome};
pub use reconcile::{BulkReconciler, OperationFailure, ReconcileReport};
pub use record::{GeoPoint, NewPerson, Person, PersonDocument};
pub use resolve::{resolve, ChangeSet, Upsert};
pub use search::{SearchHit, SearchQuery, DEFAULT_RADIUS_METERS, MAX_SEARCH_RESULTS};
pub use store::{EntitySource, MemoryEntityStore, MemoryIndex, SearchIndex};
pub use sync::{SyncEngine, SyncReport};
pub use watermark::{MemoryWatermarkStore, WatermarkPolicy, WatermarkStore};

/// Type aliases for clarity
pub type PersonId = i64;
pub type Timestamp = chrono::DateTime<chrono::Utc>;
