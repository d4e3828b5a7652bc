use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use chrono::TimeDelta;
use chrono::Utc;
use parking_lot::Mutex;

use crate::action::CourseFilter;
use crate::error::UpstreamError;
use crate::traits::LmsClient;
use crate::upstream::model::EnrollmentStats;
use crate::upstream::model::INSTRUCTOR_ROLES;
use crate::upstream::model::UpstreamCategory;
use crate::upstream::model::UpstreamCourse;
use crate::upstream::model::User;

/// Scripted in-memory LMS.
///
/// Counts calls per operation, can be told to fail the base listing or the detail lookups of particular courses, and
/// tracks how many per-course enrolment lookups are outstanding at once.
#[derive(Debug, Default)]
pub struct MockLms {
    categories:      Mutex<Vec<UpstreamCategory>>,
    courses:         Mutex<Vec<UpstreamCourse>>,
    enrollments:     Mutex<HashMap<u64, Vec<User>>>,
    user_courses:    Mutex<HashMap<u64, Vec<UpstreamCourse>>>,
    failing_courses: Mutex<HashSet<u64>>,
    fail_listing:    AtomicBool,
    listing_delay:   Mutex<Option<Duration>>,
    detail_delays:   Mutex<HashMap<u64, Duration>>,
    default_delay:   Mutex<Option<Duration>>,
    calls:           Mutex<HashMap<&'static str, usize>>,
    detail_starts:   Mutex<Vec<u64>>,
    outstanding:     AtomicUsize,
    max_outstanding: AtomicUsize,
}

impl MockLms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_category(&self, category: UpstreamCategory) -> &Self {
        self.categories.lock().push(category);
        self
    }

    pub fn add_course(&self, course: UpstreamCourse) -> &Self {
        self.courses.lock().push(course);
        self
    }

    pub fn enroll(&self, course_id: u64, user: User) -> &Self {
        self.enrollments.lock().entry(course_id).or_default().push(user);
        self
    }

    pub fn set_user_courses(&self, user_id: u64, courses: Vec<UpstreamCourse>) -> &Self {
        self.user_courses.lock().insert(user_id, courses);
        self
    }

    /// Detail lookups of this course fail.
    pub fn fail_course(&self, course_id: u64) -> &Self {
        self.failing_courses.lock().insert(course_id);
        self
    }

    /// Every category and course listing fails.
    pub fn fail_listing(&self, fail: bool) -> &Self {
        self.fail_listing.store(fail, Ordering::SeqCst);
        self
    }

    pub fn set_listing_delay(&self, delay: Duration) -> &Self {
        *self.listing_delay.lock() = Some(delay);
        self
    }

    /// Delay of every per-course lookup without an explicit one.
    pub fn set_detail_delay(&self, delay: Duration) -> &Self {
        *self.default_delay.lock() = Some(delay);
        self
    }

    pub fn set_course_delay(&self, course_id: u64, delay: Duration) -> &Self {
        self.detail_delays.lock().insert(course_id, delay);
        self
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.calls.lock().get(operation).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().clear();
        self.detail_starts.lock().clear();
        self.max_outstanding.store(0, Ordering::SeqCst);
    }

    /// Course ids in the order their enrolment lookups started.
    pub fn detail_starts(&self) -> Vec<u64> {
        self.detail_starts.lock().clone()
    }

    /// High-water mark of concurrently outstanding enrolment lookups.
    pub fn max_concurrent_details(&self) -> usize {
        self.max_outstanding.load(Ordering::SeqCst)
    }

    fn count(&self, operation: &'static str) {
        *self.calls.lock().entry(operation).or_default() += 1;
    }

    async fn listing_pause(&self, function: &str) -> Result<(), UpstreamError> {
        let delay = *self.listing_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(UpstreamError::Status {
                function: function.to_string(),
                status:   503,
            });
        }
        Ok(())
    }

    async fn detail_pause(&self, function: &str, course_id: u64) -> Result<(), UpstreamError> {
        let delay = self
            .detail_delays
            .lock()
            .get(&course_id)
            .copied()
            .or(*self.default_delay.lock());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_courses.lock().contains(&course_id) {
            return Err(UpstreamError::Api {
                function:  function.to_string(),
                errorcode: "invalidrecord".to_string(),
                message:   format!("course {course_id} is not available"),
            });
        }
        Ok(())
    }

    fn enrolled(&self, course_id: u64) -> Vec<User> {
        self.enrollments.lock().get(&course_id).cloned().unwrap_or_default()
    }

    fn children_of(&self, parent: u64) -> Vec<UpstreamCategory> {
        self.categories
            .lock()
            .iter()
            .filter(|c| c.parent == parent)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LmsClient for MockLms {
    async fn root_categories(&self) -> Result<Vec<UpstreamCategory>, UpstreamError> {
        self.count("root_categories");
        self.listing_pause("core_course_get_categories").await?;
        Ok(self.children_of(0))
    }

    async fn category_children(&self, category_id: u64) -> Result<Vec<UpstreamCategory>, UpstreamError> {
        self.count("category_children");
        self.listing_pause("core_course_get_categories").await?;
        Ok(self.children_of(category_id))
    }

    async fn courses(&self, filter: &CourseFilter) -> Result<Vec<UpstreamCourse>, UpstreamError> {
        self.count("courses");
        self.listing_pause("core_course_get_courses_by_field").await?;

        let courses = self
            .courses
            .lock()
            .iter()
            .filter(|c| filter.category_id.is_none_or(|id| c.categoryid == id))
            .filter(|c| {
                filter
                    .search
                    .as_ref()
                    .is_none_or(|s| c.fullname.to_lowercase().contains(s.as_str()))
            })
            .cloned()
            .collect::<Vec<_>>();

        let offset = filter.offset.unwrap_or(0) as usize;
        let limit = filter.limit.map_or(usize::MAX, |l| l as usize);
        Ok(courses.into_iter().skip(offset).take(limit).collect())
    }

    async fn course_enrollments(&self, course_id: u64) -> Result<Vec<User>, UpstreamError> {
        self.count("course_enrollments");
        self.detail_starts.lock().push(course_id);

        let now = self.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_outstanding.fetch_max(now, Ordering::SeqCst);
        let result = self.detail_pause("core_enrol_get_enrolled_users", course_id).await;
        self.outstanding.fetch_sub(1, Ordering::SeqCst);

        result.map(|_| self.enrolled(course_id))
    }

    async fn course_instructors(&self, course_id: u64) -> Result<Vec<User>, UpstreamError> {
        self.count("course_instructors");
        self.detail_pause("core_enrol_get_enrolled_users", course_id).await?;
        Ok(self
            .enrolled(course_id)
            .into_iter()
            .filter(|u| u.roles.iter().any(|r| INSTRUCTOR_ROLES.contains(&r.shortname.as_str())))
            .collect())
    }

    async fn course_enrollment_stats(&self, course_id: u64) -> Result<EnrollmentStats, UpstreamError> {
        self.count("course_enrollment_stats");
        self.detail_pause("core_enrol_get_enrolled_users", course_id).await?;
        Ok(EnrollmentStats::from_users(
            &self.enrolled(course_id),
            Utc::now(),
            TimeDelta::days(30),
        ))
    }

    async fn user_courses(&self, user_id: u64) -> Result<Vec<UpstreamCourse>, UpstreamError> {
        self.count("user_courses");
        self.listing_pause("core_enrol_get_users_courses").await?;
        Ok(self.user_courses.lock().get(&user_id).cloned().unwrap_or_default())
    }
}
