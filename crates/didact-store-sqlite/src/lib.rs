//! SQLite backend for the Didact task store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Mutating task operations run under
//! `BEGIN IMMEDIATE` transactions on that thread, which is what makes
//! version numbering and the modified-flag compare-and-set race-free.

mod access;
mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
