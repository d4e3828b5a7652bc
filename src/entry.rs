use chrono::DateTime;
use chrono::TimeDelta;
use chrono::Utc;
use serde_json::Value;

use crate::types::EntryState;

/// One cached result. Both tiers store the same shape; the two copies of a key are not synchronized.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key:        String,
    pub value:      Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_stale:   bool,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, value: Value, ttl: TimeDelta, now: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            value,
            created_at: now,
            expires_at: now + ttl,
            is_stale: false,
        }
    }

    /// The entry stops being served at `expires_at` exactly.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn ttl(&self) -> TimeDelta {
        self.expires_at - self.created_at
    }

    /// Time left until expiry, zero when already expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> TimeDelta {
        (self.expires_at - now).max(TimeDelta::zero())
    }

    pub fn state(&self, now: DateTime<Utc>) -> EntryState {
        if self.is_expired(now) {
            EntryState::Expired
        }
        else if self.is_stale {
            EntryState::Stale
        }
        else {
            EntryState::Fresh
        }
    }
}
