//! Cache policy shared by every tier: TTLs, tier order and the browser-facing max-age.
//!
//! Key derivation lives with the typed queries in [`crate::action`]; browsers get the same contract through the
//! `Cache-Control` header rather than a cache implementation of their own.

use chrono::TimeDelta;

use crate::action::Query;
use crate::types::TierOrder;

pub const DEFAULT_BROWSER_MAX_AGE_SECS: u32 = 60;

/// TTLs are in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub root_categories_ttl:      u32,
    pub category_children_ttl:    u32,
    pub courses_ttl:              u32,
    pub courses_with_details_ttl: u32,
    pub enrollment_stats_ttl:     u32,
    pub user_courses_ttl:         u32,
    pub browser_max_age_secs:     u32,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            root_categories_ttl:      60,
            category_children_ttl:    30,
            courses_ttl:              15,
            courses_with_details_ttl: 30,
            enrollment_stats_ttl:     5,
            user_courses_ttl:         10,
            browser_max_age_secs:     DEFAULT_BROWSER_MAX_AGE_SECS,
        }
    }
}

impl CachePolicy {
    pub fn ttl_minutes(&self, query: &Query) -> u32 {
        match query {
            Query::RootCategories => self.root_categories_ttl,
            Query::CategoryChildren { .. } => self.category_children_ttl,
            Query::Courses(_) => self.courses_ttl,
            Query::CoursesWithDetails { .. } => self.courses_with_details_ttl,
            Query::CourseEnrollmentStats { .. } => self.enrollment_stats_ttl,
            Query::UserCourses { .. } => self.user_courses_ttl,
        }
    }

    pub fn ttl(&self, query: &Query) -> TimeDelta {
        TimeDelta::minutes(self.ttl_minutes(query) as i64)
    }

    // Per-course stats are the hot keys; skip the persistent round trip for them when this instance already has them.
    pub fn tier_order(&self, query: &Query) -> TierOrder {
        match query {
            Query::CourseEnrollmentStats { .. } => TierOrder::MemoryFirst,
            _ => TierOrder::PersistentFirst,
        }
    }

    pub fn cache_control(&self) -> String {
        format!("public, max-age={}", self.browser_max_age_secs)
    }
}
