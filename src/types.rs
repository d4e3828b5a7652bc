use std::fmt::Display;

use serde::Deserialize;
use serde::Serialize;

/// Where a reply's data came from. Serialized into the `source` field of the response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheSource {
    Persistent,
    Memory,
    Upstream,
}

impl CacheSource {
    pub fn is_cached(&self) -> bool {
        !matches!(self, Self::Upstream)
    }
}

impl Display for CacheSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Persistent => write!(f, "persistent"),
            Self::Memory => write!(f, "memory"),
            Self::Upstream => write!(f, "upstream"),
        }
    }
}

/// Read-side classification of a cache entry at a given moment.
///
/// Only [`EntryState::Fresh`] entries are served. `Stale` and `Expired` are both treated as a miss; the difference is
/// that an `Expired` entry is flagged stale in the persistent store and a background refresh is requested for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Fresh,
    Stale,
    Expired,
}

/// Order in which the two cache tiers are consulted for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierOrder {
    PersistentFirst,
    MemoryFirst,
}
