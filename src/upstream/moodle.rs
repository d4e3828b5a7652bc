use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use chrono::TimeDelta;
use chrono::Utc;
use fieldx::fxstruct;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use tracing::instrument;

use super::model::EnrollmentStats;
use super::model::INSTRUCTOR_ROLES;
use super::model::UpstreamCategory;
use super::model::UpstreamCourse;
use super::model::User;
use crate::action::CourseFilter;
use crate::error::UpstreamError;
use crate::traits::LmsClient;

const REST_ENDPOINT: &str = "webservice/rest/server.php";

#[derive(Deserialize)]
struct CourseList {
    #[serde(default)]
    courses: Vec<UpstreamCourse>,
}

/// Client for the Moodle REST web-service protocol, authenticated by a service token.
#[fxstruct(sync, no_new, builder)]
pub struct MoodleClient {
    /// Site root, e.g. `https://lms.example.edu`.
    #[fieldx(get)]
    base_url: String,

    token: String,

    /// Transport-level timeout. Callers apply their own per-call budget on top of it.
    #[fieldx(get(copy), default(Duration::from_secs(30)))]
    request_timeout: Duration,

    /// Role short names that make an enrolled user an instructor.
    #[fieldx(get, default(INSTRUCTOR_ROLES.iter().map(|r| r.to_string()).collect()))]
    instructor_roles: Vec<String>,

    #[fieldx(get(copy), default(30))]
    active_window_days: i64,

    #[fieldx(lazy, get(clone), builder(off))]
    http: reqwest::Client,
}

impl MoodleClient {
    fn build_http(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(self.request_timeout())
            .build()
            .unwrap_or_else(|err| {
                tracing::warn!("Falling back to default HTTP client settings: {err}");
                reqwest::Client::new()
            })
    }

    fn endpoint(&self) -> String {
        format!("{}/{REST_ENDPOINT}", self.base_url.trim_end_matches('/'))
    }

    #[instrument(level = "debug", skip(self, params))]
    async fn call<T: DeserializeOwned>(&self, function: &str, params: &[(&str, String)]) -> Result<T, UpstreamError> {
        let response = self
            .http()
            .get(self.endpoint())
            .query(&[
                ("wstoken", self.token.as_str()),
                ("wsfunction", function),
                ("moodlewsrestformat", "json"),
            ])
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                function: function.to_string(),
                status:   status.as_u16(),
            });
        }

        let body: Value = serde_json::from_slice(&response.bytes().await?)?;
        Self::check_exception(function, &body)?;
        debug!("{function} answered");

        Ok(serde_json::from_value(body)?)
    }

    // Moodle reports failures as a regular 200 response carrying an exception object.
    fn check_exception(function: &str, body: &Value) -> Result<(), UpstreamError> {
        if body.get("exception").is_some() {
            let field = |name: &str| body.get(name).and_then(Value::as_str).unwrap_or_default().to_string();
            return Err(UpstreamError::Api {
                function:  function.to_string(),
                errorcode: field("errorcode"),
                message:   field("message"),
            });
        }
        Ok(())
    }

    async fn categories_with_parent(&self, parent: u64) -> Result<Vec<UpstreamCategory>, UpstreamError> {
        let categories: Vec<UpstreamCategory> = self
            .call(
                "core_course_get_categories",
                &[
                    ("criteria[0][key]", "parent".to_string()),
                    ("criteria[0][value]", parent.to_string()),
                    ("addsubcategories", "0".to_string()),
                ],
            )
            .await?;

        Ok(categories.into_iter().filter(|c| c.parent == parent).collect())
    }
}

#[async_trait]
impl LmsClient for MoodleClient {
    async fn root_categories(&self) -> Result<Vec<UpstreamCategory>, UpstreamError> {
        self.categories_with_parent(0).await
    }

    async fn category_children(&self, category_id: u64) -> Result<Vec<UpstreamCategory>, UpstreamError> {
        self.categories_with_parent(category_id).await
    }

    async fn courses(&self, filter: &CourseFilter) -> Result<Vec<UpstreamCourse>, UpstreamError> {
        let mut courses = if let Some(ref search) = filter.search {
            let found: CourseList = self
                .call(
                    "core_course_search_courses",
                    &[
                        ("criterianame", "search".to_string()),
                        ("criteriavalue", search.clone()),
                    ],
                )
                .await?;
            found.courses
        }
        else if let Some(category_id) = filter.category_id {
            let found: CourseList = self
                .call(
                    "core_course_get_courses_by_field",
                    &[("field", "category".to_string()), ("value", category_id.to_string())],
                )
                .await?;
            found.courses
        }
        else {
            let found: CourseList = self.call("core_course_get_courses_by_field", &[]).await?;
            found.courses
        };

        if let (Some(category_id), Some(_)) = (filter.category_id, &filter.search) {
            courses.retain(|c| c.categoryid == category_id);
        }

        let offset = filter.offset.unwrap_or(0) as usize;
        let limit = filter.limit.map_or(usize::MAX, |l| l as usize);
        Ok(courses.into_iter().skip(offset).take(limit).collect())
    }

    async fn course_enrollments(&self, course_id: u64) -> Result<Vec<User>, UpstreamError> {
        self.call("core_enrol_get_enrolled_users", &[("courseid", course_id.to_string())])
            .await
    }

    async fn course_instructors(&self, course_id: u64) -> Result<Vec<User>, UpstreamError> {
        let users = self.course_enrollments(course_id).await?;
        Ok(users.into_iter().filter(|u| self.is_instructor(u)).collect())
    }

    fn is_instructor(&self, user: &User) -> bool {
        user.has_any_role(self.instructor_roles())
    }

    async fn course_enrollment_stats(&self, course_id: u64) -> Result<EnrollmentStats, UpstreamError> {
        let users = self.course_enrollments(course_id).await?;
        Ok(EnrollmentStats::from_users(
            &users,
            Utc::now(),
            TimeDelta::days(self.active_window_days()),
        ))
    }

    async fn user_courses(&self, user_id: u64) -> Result<Vec<UpstreamCourse>, UpstreamError> {
        self.call("core_enrol_get_users_courses", &[("userid", user_id.to_string())])
            .await
    }
}

impl Debug for MoodleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MoodleClient")
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout())
            .finish_non_exhaustive()
    }
}
