//! Request handlers for sync, search and data generation.

mod generate;
mod search;
mod sync;

pub use generate::*;
pub use search::*;
pub use sync::*;
