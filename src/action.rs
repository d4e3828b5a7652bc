//! Typed request variants for the `/api/moodle` endpoint.
//!
//! The endpoint takes a free-form `action` query parameter; it is parsed exactly once, here, into [`Action`]. Cache
//! keys are derived from the parsed, typed parameters so that equivalent requests never fragment the cache.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

use crate::error::ServiceError;

pub const ACTION_PARAM: &str = "action";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Query(Query),
    /// Drop the in-process memory tier. The persistent tier is left alone.
    ClearCache,
    /// Flag a persistent entry stale and ask the refresh worker to rebuild it.
    MarkStale { key: String, reason: String },
    /// Administrative purge of both tiers, one key or everything.
    PurgeCache { key: Option<String> },
}

/// Read-only catalog queries. Each one maps to a cache key and a TTL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Query {
    RootCategories,
    CategoryChildren { category_id: u64 },
    Courses(CourseFilter),
    CoursesWithDetails { category_id: u64 },
    CourseEnrollmentStats { course_id: u64 },
    UserCourses { user_id: u64 },
}

/// Parameters of a course listing. `search` is kept normalized (trimmed, whitespace-collapsed, lowercase).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CourseFilter {
    pub category_id: Option<u64>,
    pub search:      Option<String>,
    pub limit:       Option<u32>,
    pub offset:      Option<u32>,
}

impl CourseFilter {
    pub fn in_category(category_id: u64) -> Self {
        Self {
            category_id: Some(category_id),
            ..Default::default()
        }
    }

    pub fn with_search(mut self, search: &str) -> Self {
        self.search = normalize_search(search);
        self
    }

    // Sorted `name=value` pairs. Absent parameters are left out entirely so `limit` missing and `limit` empty agree.
    fn key_params(&self) -> String {
        let mut params = BTreeMap::new();
        if let Some(category_id) = self.category_id {
            params.insert("categoryId", category_id.to_string());
        }
        if let Some(ref search) = self.search {
            params.insert("search", search.clone());
        }
        if let Some(limit) = self.limit {
            params.insert("limit", limit.to_string());
        }
        if let Some(offset) = self.offset {
            params.insert("offset", offset.to_string());
        }

        params
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl Query {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RootCategories => "root-categories",
            Self::CategoryChildren { .. } => "category-children",
            Self::Courses(_) => "courses",
            Self::CoursesWithDetails { .. } => "courses-with-details",
            Self::CourseEnrollmentStats { .. } => "course-enrollment-stats",
            Self::UserCourses { .. } => "user-courses",
        }
    }

    pub fn cache_key(&self) -> String {
        match self {
            Self::RootCategories => "root_categories".to_string(),
            Self::CategoryChildren { category_id } => format!("category_children_{category_id}"),
            Self::Courses(filter) => format!("courses_{}", filter.key_params()),
            Self::CoursesWithDetails { category_id } => format!("courses_with_details_{category_id}"),
            Self::CourseEnrollmentStats { course_id } => format!("enrollment-{course_id}"),
            Self::UserCourses { user_id } => format!("user_courses_{user_id}"),
        }
    }
}

impl Action {
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, ServiceError> {
        let action = params
            .get(ACTION_PARAM)
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .ok_or(ServiceError::MissingParameter(ACTION_PARAM))?;

        Ok(match action {
            "root-categories" => Self::Query(Query::RootCategories),
            "category-children" => Self::Query(Query::CategoryChildren {
                category_id: required(params, "categoryId")?,
            }),
            "courses" => Self::Query(Query::Courses(CourseFilter {
                category_id: optional(params, "categoryId")?,
                search:      params.get("search").and_then(|s| normalize_search(s)),
                limit:       optional(params, "limit")?,
                offset:      optional(params, "offset")?,
            })),
            "courses-with-details" => Self::Query(Query::CoursesWithDetails {
                category_id: required(params, "categoryId")?,
            }),
            "course-enrollment-stats" => Self::Query(Query::CourseEnrollmentStats {
                course_id: required(params, "courseId")?,
            }),
            "user-courses" => Self::Query(Query::UserCourses {
                user_id: required(params, "userId")?,
            }),
            "clear-cache" => Self::ClearCache,
            "mark-stale" => Self::MarkStale {
                key:    required_str(params, "key")?,
                reason: params
                    .get("reason")
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| "manual".to_string()),
            },
            "purge-cache" => Self::PurgeCache {
                key: params.get("key").map(|k| k.trim().to_string()).filter(|k| !k.is_empty()),
            },
            other => return Err(ServiceError::UnknownAction(other.to_string())),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Query(query) => query.name(),
            Self::ClearCache => "clear-cache",
            Self::MarkStale { .. } => "mark-stale",
            Self::PurgeCache { .. } => "purge-cache",
        }
    }
}

fn normalize_search(search: &str) -> Option<String> {
    let normalized = search.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    (!normalized.is_empty()).then_some(normalized)
}

fn parse_param<T>(name: &'static str, raw: &str) -> Result<T, ServiceError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse().map_err(|_| ServiceError::InvalidParameter {
        name,
        value: raw.to_string(),
    })
}

fn required<T>(params: &HashMap<String, String>, name: &'static str) -> Result<T, ServiceError>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = params
        .get(name)
        .filter(|v| !v.trim().is_empty())
        .ok_or(ServiceError::MissingParameter(name))?;
    parse_param(name, raw)
}

fn optional<T>(params: &HashMap<String, String>, name: &'static str) -> Result<Option<T>, ServiceError>
where
    T: FromStr,
    T::Err: Display,
{
    params
        .get(name)
        .filter(|v| !v.trim().is_empty())
        .map(|raw| parse_param(name, raw))
        .transpose()
}

fn required_str(params: &HashMap<String, String>, name: &'static str) -> Result<String, ServiceError> {
    params
        .get(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ServiceError::MissingParameter(name))
}
