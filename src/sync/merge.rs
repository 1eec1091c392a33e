//! Keyed union of cached and freshly fetched records

use serde::Deserialize;
use std::collections::HashMap;

use crate::types::Record;

/// What to do when a fetched record's key is already cached.
///
/// `KeepCached` is the long-standing dashboard behavior: a record whose
/// upstream state changed (a task going RUNNING -> SUCCESS) keeps its
/// first-seen version. `PreferFetched` replaces it in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    #[default]
    KeepCached,
    PreferFetched,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome<R> {
    pub records: Vec<R>,
    /// Records appended under a previously unseen key
    pub added: usize,
    /// Existing records overwritten (only under `PreferFetched`)
    pub replaced: usize,
}

/// `cached ++ [r in fetched | key(r) unseen]`.
///
/// Cached order is kept, new keys are appended in fetch order and never
/// re-sorted. A key repeated inside `fetched` is appended once.
pub fn merge_records<R: Record>(
    cached: Vec<R>,
    fetched: Vec<R>,
    policy: MergePolicy,
) -> MergeOutcome<R> {
    let mut positions: HashMap<String, usize> = cached
        .iter()
        .enumerate()
        .map(|(i, r)| (r.key(), i))
        .collect();
    let mut records = cached;
    let mut added = 0;
    let mut replaced = 0;

    for record in fetched {
        let key = record.key();
        match positions.get(&key) {
            Some(&pos) => {
                if policy == MergePolicy::PreferFetched {
                    records[pos] = record;
                    replaced += 1;
                }
            }
            None => {
                positions.insert(key, records.len());
                records.push(record);
                added += 1;
            }
        }
    }

    MergeOutcome {
        records,
        added,
        replaced,
    }
}
