//! Core types and shared functionality for bibcache.
//!
//! This crate provides:
//! - A denormalized record cache over five kinds of bibliographic record
//! - The change-event protocol that keeps it in sync with the source tables
//! - A secondary author index and the queries built on it
//! - Unified error types
//! - Configuration structures

mod builder;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod controller;
pub mod describe;
pub mod error;
pub mod events;
pub mod key;
pub mod rebuild;
pub mod router;
pub mod scheduler;
pub mod service;

#[cfg(test)]
mod testing;

pub use cache::{AuthorIndexEntry, CacheDb, CachedRecord};
pub use catalog::Catalog;
pub use config::{AppConfig, ConfigError};
pub use describe::{DescriptionRenderer, PlainRenderer};
pub use error::Error;
pub use events::{ChangeEvent, ChangeKind, EventSink};
pub use key::{RecordKey, SourceKind};
pub use rebuild::RebuildReport;
pub use service::{CacheSettings, RecordCache};
