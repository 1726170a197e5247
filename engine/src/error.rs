//! Error types for the geolab engine.
//!
//! Only failures that abort a whole sync cycle are errors. A single replace or
//! delete rejected by the index is reported as data in
//! [`ReconcileReport`](crate::ReconcileReport) instead.

use std::fmt;
use thiserror::Error;

/// The store a connectivity failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// The relational system of record
    EntityStore,
    /// The search index
    SearchIndex,
    /// Wherever the watermark is persisted
    WatermarkStore,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreKind::EntityStore => "entity store",
            StoreKind::SearchIndex => "search index",
            StoreKind::WatermarkStore => "watermark store",
        };
        f.write_str(name)
    }
}

/// All possible errors from the geolab engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("{store} unavailable: {message}")]
    Connectivity { store: StoreKind, message: String },

    #[error("a sync cycle is already in progress")]
    CycleInProgress,

    #[error("invalid search query: {0}")]
    InvalidQuery(String),
}

impl Error {
    /// Connectivity failure against the system of record.
    pub fn entity_store(message: impl fmt::Display) -> Self {
        Error::Connectivity {
            store: StoreKind::EntityStore,
            message: message.to_string(),
        }
    }

    /// Connectivity failure against the search index.
    pub fn search_index(message: impl fmt::Display) -> Self {
        Error::Connectivity {
            store: StoreKind::SearchIndex,
            message: message.to_string(),
        }
    }

    /// Connectivity failure against the watermark store.
    pub fn watermark_store(message: impl fmt::Display) -> Self {
        Error::Connectivity {
            store: StoreKind::WatermarkStore,
            message: message.to_string(),
        }
    }

    /// True when retrying the whole cycle later may succeed.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Error::Connectivity { .. })
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
