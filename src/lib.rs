//! pipeline-feeds Library
//!
//! Incremental polling and local caching of the crypto ML pipeline feeds
//! (price candles with model predictions, TRL-scored news, DAG task events)

pub mod config;
pub mod dag;
pub mod error;
pub mod fetch;
pub mod oracle;
pub mod overlay;
pub mod persistence;
pub mod sync;
pub mod types;

#[cfg(feature = "dashboard")]
pub mod dashboard;

pub use error::{SyncError, SyncResult};
