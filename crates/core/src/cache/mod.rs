//! SQLite-backed storage for the denormalized record cache.
//!
//! This module provides persistent storage using SQLite with async access
//! via tokio-rusqlite. It holds:
//!
//! - The unified record store (one row per live source record)
//! - The secondary author index, rebuilt in bulk
//! - Content fingerprints that make idempotent rewrites free
//! - Automatic schema migrations

pub mod author_index;
pub mod connection;
pub mod hash;
pub mod migrations;
pub mod queries;
pub mod records;

pub use crate::Error;

pub use author_index::AuthorIndexEntry;
pub use connection::CacheDb;
pub use records::{CachedRecord, StoreOutcome};
