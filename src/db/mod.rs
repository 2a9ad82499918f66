//! Persistence layer: SQLite-backed store and its model types.

mod models;
mod store;

pub use models::*;
pub use store::{DbError, Store};
