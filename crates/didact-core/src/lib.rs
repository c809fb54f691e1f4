//! Core types and trait definitions for the Didact task store.
//!
//! Domain vocabulary, the error taxonomy, the pure option reconciler, the
//! grading policy, and the [`store::TaskStore`] trait that backends
//! implement. No HTTP and no database here; every other crate depends on
//! this one.

pub mod access;
pub mod audit;
pub mod error;
pub mod grading;
pub mod graph;
pub mod reconcile;
pub mod stats;
pub mod store;
pub mod task;
pub mod version;

pub use error::{Error, ErrorKind, Result, StoreFailure};
