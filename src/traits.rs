use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use std::fmt::Debug;

use crate::action::CourseFilter;
use crate::entry::CacheEntry;
use crate::error::StoreError;
use crate::error::UpstreamError;
use crate::upstream::model::EnrollmentStats;
use crate::upstream::model::INSTRUCTOR_ROLES;
use crate::upstream::model::UpstreamCategory;
use crate::upstream::model::UpstreamCourse;
use crate::upstream::model::User;

// Key/value contract shared by both cache tiers.
//
// Implementations report their own failures; it is up to the caller to decide that a failing cache is just a miss.
#[async_trait]
pub trait CacheStore: Debug + Send + Sync + 'static {
    /// Tier name for logging.
    fn name(&self) -> &'static str;

    /// Returns the entry as stored, regardless of its expiry or stale flag. Classification belongs to the reader, see
    /// [`CacheEntry::state()`].
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError>;

    /// Upsert. Any existing entry under the same key is overwritten.
    async fn set(&self, entry: CacheEntry) -> Result<(), StoreError>;

    /// Remove a single key or, with `None`, everything. Returns the number of entries removed when the backend can tell.
    async fn purge(&self, key: Option<&str>) -> Result<u64, StoreError>;
}

/// The shared, cross-instance tier.
#[async_trait]
pub trait PersistentStore: CacheStore {
    /// Flag the entry as stale without removing it. Returns `false` if there was no such key.
    async fn mark_stale(&self, key: &str, reason: &str) -> Result<bool, StoreError>;

    /// Fire-and-forget signal for the background refresh worker.
    async fn queue_refresh(&self, key: &str, reason: &str) -> Result<(), StoreError>;

    async fn close(&self) {}
}

/// Upstream LMS operations. Implementations normalize whatever the LMS returns into the `upstream::model` shapes and
/// own no state beyond their connection settings.
#[async_trait]
pub trait LmsClient: Debug + Send + Sync + 'static {
    async fn root_categories(&self) -> Result<Vec<UpstreamCategory>, UpstreamError>;

    /// Direct children only. An empty list means the category is a leaf and carries courses.
    async fn category_children(&self, category_id: u64) -> Result<Vec<UpstreamCategory>, UpstreamError>;

    async fn courses(&self, filter: &CourseFilter) -> Result<Vec<UpstreamCourse>, UpstreamError>;

    async fn course_enrollments(&self, course_id: u64) -> Result<Vec<User>, UpstreamError>;

    /// The enrolled users holding an instructor role, see [`is_instructor`](LmsClient::is_instructor).
    async fn course_instructors(&self, course_id: u64) -> Result<Vec<User>, UpstreamError>;

    /// Lets callers that already hold a course roster pick instructors out of it without another round trip.
    fn is_instructor(&self, user: &User) -> bool {
        user.roles.iter().any(|r| INSTRUCTOR_ROLES.contains(&r.shortname.as_str()))
    }

    async fn course_enrollment_stats(&self, course_id: u64) -> Result<EnrollmentStats, UpstreamError>;

    async fn user_courses(&self, user_id: u64) -> Result<Vec<UpstreamCourse>, UpstreamError>;
}

pub trait Clock: Debug + Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}
