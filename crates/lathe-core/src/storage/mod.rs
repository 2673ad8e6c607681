//! Storage layer for Lathe.
//!
//! Training job records live in SQLite behind the [`JobStore`] trait.

// SQL strings don't need hash-less raw strings
#![allow(clippy::needless_raw_string_hashes)]

pub mod database;
pub mod error;
pub mod jobs;

pub use database::Database;
pub use error::{StorageError, StorageResult};
pub use jobs::{JobMutator, JobStore, LogReferenceFn, SqliteJobStore};
