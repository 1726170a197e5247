//! Elasticsearch as the search index of the sync engine.

pub mod bulk;
mod client;
pub mod query;

pub use client::*;
