//! Incremental feed synchronization
//!
//! Each cycle reads the cached entry, checks the upstream fingerprint,
//! fetches only the window after the last cached record, merges by key and
//! publishes the result:
//!
//! ```text
//! COLD --first cycle--> WARM --merge--> WARM
//!   ^                     |
//!   +--fingerprint change-+
//! ```

mod engine;
mod merge;
mod runner;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{CacheState, CycleOutcome, CycleReport, CycleToken, Liveness, SyncEngine};
pub use merge::{merge_records, MergeOutcome, MergePolicy};
pub use runner::{FeedHandle, FeedRunner, SyncCommand};
