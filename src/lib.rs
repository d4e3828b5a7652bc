//! # lms-catalog-cache
//!
//! Cache-aside aggregation layer for a Moodle-compatible LMS web-service API.
//!
//! Think of it as the piece that sits between a web portal and a slow, rate-limit-sensitive upstream: catalog
//! queries are answered from a shared persistent cache when possible, from a per-process memory cache as a local
//! accelerator, and only on a full miss from the LMS itself.
//!
//! # The Basics
//!
//! - Every logical query is a variant of [`Query`](action::Query). Its cache key is derived from the typed
//!   parameters, so `categoryId=5` and `categoryId="5"` end up under the same key.
//! - The persistent tier is a [`PersistentStore`](traits::PersistentStore). When persistence is not configured it is
//!   a [`NullStore`](store::NullStore), so nothing else has to check for its presence.
//! - The memory tier is a [`MemoryStore`](store::MemoryStore) implemented over the
//!   [moka](https://crates.io/crates/moka) cache.
//! - Expensive "courses with details" listings are assembled by the [`Aggregator`](aggregate::Aggregator), which
//!   fans out per-course lookups in fixed-size batches and degrades failed lookups into defaults.
//! - Concurrent misses for the same key are collapsed into one upstream aggregation by a single-flight registry.
//!
//! # Data Flow
//!
//! ```text
//! request -> CacheService -> persistent (fresh?) -> memory (fresh?) -> single-flight -> upstream
//!                                                                                        |
//!            response <- write-through to persistent + memory (non-empty results only) <-
//! ```
//!
//! # Staleness
//!
//! An entry is served only while it is both unexpired and not flagged stale. An expired entry is marked stale in the
//! persistent store and a refresh is queued for the background worker; either way the current request refetches
//! inline. See [`EntryState`](types::EntryState).

pub mod action;
pub mod aggregate;
pub mod app;
pub mod clock;
pub mod entry;
pub mod error;
pub mod policy;
pub mod server;
pub mod service;
pub mod single_flight;
pub mod store;
pub mod traits;
pub mod types;
pub mod upstream;

#[doc(inline)]
pub use service::CacheService;
#[doc(inline)]
pub use traits::LmsClient;
#[doc(inline)]
pub use traits::PersistentStore;

pub mod prelude {
    pub use crate::action::Action;
    pub use crate::action::CourseFilter;
    pub use crate::action::Query;
    pub use crate::aggregate::Aggregator;
    pub use crate::clock::SystemClock;
    pub use crate::entry::CacheEntry;
    pub use crate::error::*;
    pub use crate::policy::CachePolicy;
    pub use crate::service::CacheService;
    pub use crate::service::Reply;
    pub use crate::store::MemoryStore;
    pub use crate::store::NullStore;
    pub use crate::traits::*;
    pub use crate::types::*;
    pub use crate::upstream::model::*;
}
