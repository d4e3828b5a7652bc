//! The cache-aside request handler.
use std::fmt::Debug;
use std::sync::Arc;

use fieldx::fxstruct;
use serde::Serialize;
use serde_json::json;
use serde_json::Value;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::action::Action;
use crate::action::Query;
use crate::aggregate::Aggregator;
use crate::clock::SystemClock;
use crate::entry::CacheEntry;
use crate::error::ServiceError;
use crate::error::UpstreamError;
use crate::policy::CachePolicy;
use crate::single_flight::SingleFlight;
use crate::store::MemoryStore;
use crate::store::NullStore;
use crate::traits::CacheStore;
use crate::traits::Clock;
use crate::traits::PersistentStore;
use crate::types::CacheSource;
use crate::types::EntryState;
use crate::types::TierOrder;
use crate::upstream::model::EnrollmentStats;
use crate::upstream::with_timeout;

type FetchResult = Result<Value, Arc<UpstreamError>>;

/// Outcome of a successfully handled [`Action`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// A list-shaped query result, served as `{success, data, cached, source}`.
    List { data: Value, source: CacheSource },
    /// Enrolment stats. Their fields are inlined into the envelope next to `success` and `cached`.
    Stats { stats: Value, source: CacheSource },
    /// Result of an administrative action.
    Admin(Value),
}

impl Reply {
    pub fn source(&self) -> Option<CacheSource> {
        match self {
            Self::List { source, .. } | Self::Stats { source, .. } => Some(*source),
            Self::Admin(_) => None,
        }
    }

    pub fn is_cached(&self) -> bool {
        self.source().is_some_and(|s| s.is_cached())
    }

    /// Data replies may be kept by browsers, administrative ones may not.
    pub fn is_cacheable(&self) -> bool {
        !matches!(self, Self::Admin(_))
    }

    pub fn to_envelope(&self) -> Value {
        match self {
            Self::List { data, source } => json!({
                "success": true,
                "data": data,
                "cached": source.is_cached(),
                "source": source,
            }),
            Self::Stats { stats, source } => {
                let mut envelope = match stats {
                    Value::Object(fields) => fields.clone(),
                    other => {
                        let mut fields = serde_json::Map::new();
                        fields.insert("data".to_string(), other.clone());
                        fields
                    }
                };
                envelope.insert("success".to_string(), Value::Bool(true));
                envelope.insert("cached".to_string(), Value::Bool(source.is_cached()));
                envelope.insert("source".to_string(), json!(source));
                Value::Object(envelope)
            }
            Self::Admin(details) => {
                let mut envelope = serde_json::Map::new();
                envelope.insert("success".to_string(), Value::Bool(true));
                if let Value::Object(fields) = details {
                    envelope.extend(fields.clone());
                }
                Value::Object(envelope)
            }
        }
    }
}

// What the persistent tier says about a key.
enum Persisted {
    Fresh(CacheEntry),
    /// Present but flagged stale or past its expiry. Any copy elsewhere is just as outdated.
    Invalidated,
    /// Not stored, or the store could not be read.
    Unknown,
}

fn null_store() -> Arc<dyn PersistentStore> {
    Arc::new(NullStore)
}

fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

// Nulls and empty lists are not worth caching: an empty listing is as likely to be an upstream hiccup as the truth.
fn is_worth_caching(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
        _ => true,
    }
}

fn to_json<T: Serialize>(value: T) -> Result<Value, UpstreamError> {
    Ok(serde_json::to_value(value)?)
}

/// Explicitly constructed cache service: one per process, shared by all request handlers.
///
/// Lookup order is decided by [`CachePolicy::tier_order`]. A miss in both tiers goes upstream through a single-flight
/// registry so concurrent requests for the same cold key share one aggregation.
///
/// ```ignore
/// let service = CacheService::builder()
///     .aggregator(Arc::new(aggregator))
///     .memory(Arc::new(MemoryStore::builder().max_capacity(10_000).build()?))
///     .persistent(persistent)
///     .build()?;
///
/// let reply = service.handle(Action::Query(Query::RootCategories)).await?;
/// ```
#[fxstruct(sync, no_new, default(off), builder)]
pub struct CacheService {
    #[fieldx(get(clone), builder(required))]
    aggregator: Arc<Aggregator>,

    #[fieldx(get(clone), builder(required))]
    memory: Arc<MemoryStore>,

    #[fieldx(get(clone), default(null_store()))]
    persistent: Arc<dyn PersistentStore>,

    #[fieldx(get(clone), default(system_clock()))]
    clock: Arc<dyn Clock>,

    #[fieldx(get(copy), default(CachePolicy::default()))]
    policy: CachePolicy,

    #[fieldx(lazy, private, get(clone), builder(off))]
    in_flight: Arc<SingleFlight<FetchResult>>,
}

impl CacheService {
    fn build_in_flight(&self) -> Arc<SingleFlight<FetchResult>> {
        Arc::new(SingleFlight::new())
    }

    #[instrument(level = "debug", skip(self), fields(action = action.name()))]
    pub async fn handle(&self, action: Action) -> Result<Reply, ServiceError> {
        match action {
            Action::Query(query) => self.query(&query).await,
            Action::ClearCache => {
                self.memory.clear();
                info!("memory cache cleared");
                Ok(Reply::Admin(json!({ "message": "Memory cache cleared" })))
            }
            Action::MarkStale { key, reason } => {
                let found = self
                    .persistent
                    .mark_stale(&key, &reason)
                    .await
                    .unwrap_or_else(|err| {
                        warn!(key = %key, error = %err, "cannot mark entry stale");
                        false
                    });
                self.request_refresh(&key, &reason).await;
                self.memory.remove(&key).await;
                Ok(Reply::Admin(json!({ "key": key, "marked": found })))
            }
            Action::PurgeCache { key } => {
                let purged = self.persistent.purge(key.as_deref()).await.unwrap_or_else(|err| {
                    warn!(error = %err, "persistent purge failed");
                    0
                });
                match key.as_deref() {
                    Some(key) => {
                        self.memory.remove(key).await;
                    }
                    None => self.memory.clear(),
                }
                info!(key = key.as_deref().unwrap_or("*"), purged, "cache purged");
                Ok(Reply::Admin(json!({ "key": key, "purged": purged })))
            }
        }
    }

    /// Serve a query from the first tier holding a fresh entry, falling back to the LMS.
    pub async fn query(&self, query: &Query) -> Result<Reply, ServiceError> {
        let key = query.cache_key();

        let (value, source) = match self.lookup(query, &key).await {
            Some(hit) => hit,
            None => {
                let (result, leader) = self.in_flight().run(&key, || self.fetch_and_store(query, &key)).await;
                if !leader {
                    debug!(key = %key, "joined in-flight fetch");
                }
                (result?, CacheSource::Upstream)
            }
        };

        Ok(match query {
            Query::CourseEnrollmentStats { .. } => Reply::Stats { stats: value, source },
            _ => Reply::List { data: value, source },
        })
    }

    async fn lookup(&self, query: &Query, key: &str) -> Option<(Value, CacheSource)> {
        let now = self.clock.now();

        match self.policy.tier_order(query) {
            TierOrder::PersistentFirst => match self.from_persistent(key, now).await {
                Persisted::Fresh(entry) => Some((entry.value, CacheSource::Persistent)),
                Persisted::Invalidated => {
                    // A local copy must not outlive the shared stale flag.
                    self.memory.remove(key).await;
                    None
                }
                Persisted::Unknown => self
                    .from_memory(key, now)
                    .await
                    .map(|entry| (entry.value, CacheSource::Memory)),
            },
            TierOrder::MemoryFirst => {
                if let Some(entry) = self.from_memory(key, now).await {
                    return Some((entry.value, CacheSource::Memory));
                }
                match self.from_persistent(key, now).await {
                    Persisted::Fresh(entry) => {
                        self.memory.insert(entry.clone()).await;
                        Some((entry.value, CacheSource::Persistent))
                    }
                    Persisted::Invalidated | Persisted::Unknown => None,
                }
            }
        }
    }

    async fn from_persistent(&self, key: &str, now: chrono::DateTime<chrono::Utc>) -> Persisted {
        let entry = match self.persistent.get(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return Persisted::Unknown,
            Err(err) => {
                warn!(key, store = self.persistent.name(), error = %err, "cache read failed, treating as miss");
                return Persisted::Unknown;
            }
        };

        match entry.state(now) {
            EntryState::Fresh => Persisted::Fresh(entry),
            EntryState::Stale => {
                debug!(key, "persistent entry flagged stale");
                Persisted::Invalidated
            }
            EntryState::Expired => {
                // Already flagged means a refresh has been requested before.
                if !entry.is_stale {
                    self.flag_expired(key).await;
                }
                Persisted::Invalidated
            }
        }
    }

    async fn from_memory(&self, key: &str, now: chrono::DateTime<chrono::Utc>) -> Option<CacheEntry> {
        self.memory
            .entry(key)
            .await
            .filter(|entry| entry.state(now) == EntryState::Fresh)
    }

    // The flag is set before the refetch so it cannot land on the rewritten entry. Only the refresh request runs
    // detached.
    async fn flag_expired(&self, key: &str) {
        if let Err(err) = self.persistent.mark_stale(key, "expired").await {
            warn!(key, error = %err, "cannot flag expired entry");
        }

        let persistent = self.persistent();
        let key = key.to_string();
        tokio::spawn(async move {
            if let Err(err) = persistent.queue_refresh(&key, "expired").await {
                warn!(key = %key, error = %err, "cannot queue refresh");
            }
        });
    }

    async fn request_refresh(&self, key: &str, reason: &str) {
        if let Err(err) = self.persistent.queue_refresh(key, reason).await {
            warn!(key, error = %err, "cannot queue refresh");
        }
    }

    async fn fetch_and_store(&self, query: &Query, key: &str) -> FetchResult {
        let value = self.fetch(query).await.map_err(|err| {
            warn!(key, error = %err, "upstream fetch failed");
            Arc::new(err)
        })?;

        if is_worth_caching(&value) {
            let entry = CacheEntry::new(key, value.clone(), self.policy.ttl(query), self.clock.now());
            if let Err(err) = self.persistent.set(entry.clone()).await {
                warn!(key, store = self.persistent.name(), error = %err, "cache write failed");
            }
            self.memory.insert(entry).await;
        }
        else {
            debug!(key, "empty result, not cached");
        }

        Ok(value)
    }

    async fn fetch(&self, query: &Query) -> Result<Value, UpstreamError> {
        let client = self.aggregator.client();
        let limit = self.aggregator.call_timeout();

        match query {
            Query::RootCategories => to_json(with_timeout(limit, client.root_categories()).await?),
            Query::CategoryChildren { category_id } => {
                to_json(with_timeout(limit, client.category_children(*category_id)).await?)
            }
            Query::Courses(filter) => to_json(with_timeout(limit, client.courses(filter)).await?),
            Query::CoursesWithDetails { category_id } => {
                to_json(self.aggregator.courses_with_details(*category_id).await?)
            }
            Query::CourseEnrollmentStats { course_id } => {
                let stats: EnrollmentStats = with_timeout(limit, client.course_enrollment_stats(*course_id)).await?;
                to_json(stats)
            }
            Query::UserCourses { user_id } => to_json(with_timeout(limit, client.user_courses(*user_id)).await?),
        }
    }

    /// Tear down: drop the memory tier and release the persistent store.
    pub async fn close(&self) {
        self.memory.clear();
        self.persistent.close().await;
        info!("cache service closed");
    }
}

impl Debug for CacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheService")
            .field("persistent", &self.persistent.name())
            .field("policy", &self.policy)
            .finish()
    }
}
