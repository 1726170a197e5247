//! Database module for the PostgreSQL system of record.

mod persons;
mod pool;

pub use persons::*;
pub use pool::*;
