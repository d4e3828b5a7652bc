//! Read-only mirrors of LMS entities.
//!
//! Field names follow the Moodle web-service JSON, which is also what the portal front end consumes. Everything not
//! strictly needed is optional or defaulted; the LMS omits fields depending on the caller's capabilities.
use chrono::DateTime;
use chrono::TimeDelta;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

pub const NOT_ASSIGNED: &str = "Not assigned";

/// Moodle role short names that make an enrolled user an instructor, unless configured otherwise.
pub const INSTRUCTOR_ROLES: [&str; 2] = ["editingteacher", "teacher"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamCategory {
    pub id:          u64,
    pub name:        String,
    #[serde(default)]
    pub parent:      u64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub coursecount: u64,
    #[serde(default)]
    pub depth:       u32,
    #[serde(default)]
    pub path:        String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible:     Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamCourse {
    pub id:                u64,
    pub fullname:          String,
    #[serde(default)]
    pub shortname:         String,
    #[serde(default)]
    pub categoryid:        u64,
    #[serde(default)]
    pub summary:           String,
    #[serde(default)]
    pub startdate:         i64,
    #[serde(default)]
    pub enddate:           i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible:           Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrolledusercount: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    #[serde(default)]
    pub roleid:    u64,
    pub shortname: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id:               u64,
    #[serde(default)]
    pub fullname:         String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email:            Option<String>,
    #[serde(default)]
    pub roles:            Vec<Role>,
    /// Unix seconds of the user's last visit to the course in question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lastcourseaccess: Option<i64>,
}

impl User {
    pub fn has_any_role(&self, roles: &[String]) -> bool {
        self.roles.iter().any(|r| roles.iter().any(|name| *name == r.shortname))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentStats {
    pub enrolled_users: u64,
    pub active_users:   u64,
    /// Unix seconds; `None` when nobody ever accessed the course.
    pub last_access:    Option<i64>,
}

impl EnrollmentStats {
    /// Users are "active" when they accessed the course within `window` before `now`.
    pub fn from_users(users: &[User], now: DateTime<Utc>, window: TimeDelta) -> Self {
        let threshold = (now - window).timestamp();
        let accesses = users.iter().filter_map(|u| u.lastcourseaccess).filter(|ts| *ts > 0);

        Self {
            enrolled_users: users.len() as u64,
            active_users:   accesses.clone().filter(|ts| *ts >= threshold).count() as u64,
            last_access:    accesses.max(),
        }
    }
}

/// A course with its enrolment count and instructor names attached. Serializes flat, as the course itself plus an
/// `instructorNames` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedCourse {
    #[serde(flatten)]
    pub course:           UpstreamCourse,
    #[serde(rename = "instructorNames")]
    pub instructor_names: String,
}

/// Enrichment for one course. The default is what a course gets when its lookups fail.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CourseDetails {
    pub enrolled:    u64,
    pub instructors: Vec<String>,
}

impl DetailedCourse {
    pub fn new(mut course: UpstreamCourse, details: CourseDetails) -> Self {
        course.enrolledusercount = Some(details.enrolled);
        let instructor_names = if details.instructors.is_empty() {
            NOT_ASSIGNED.to_string()
        }
        else {
            details.instructors.join(", ")
        };

        Self {
            course,
            instructor_names,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(id: u64, last: Option<i64>) -> User {
        User {
            id,
            fullname: format!("User {id}"),
            email: None,
            roles: vec![],
            lastcourseaccess: last,
        }
    }

    #[test]
    fn stats_count_recent_access_only() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let day = 86_400;
        let users = vec![
            user(1, Some(now.timestamp() - day)),
            user(2, Some(now.timestamp() - 40 * day)),
            user(3, None),
            user(4, Some(0)),
        ];

        let stats = EnrollmentStats::from_users(&users, now, TimeDelta::days(30));
        assert_eq!(stats.enrolled_users, 4);
        assert_eq!(stats.active_users, 1);
        assert_eq!(stats.last_access, Some(now.timestamp() - day));
    }

    #[test]
    fn detailed_course_serializes_flat() {
        let course: UpstreamCourse = serde_json::from_value(json!({
            "id": 7,
            "fullname": "Applied Statistics",
            "shortname": "STAT201",
            "categoryid": 3,
            "format": "topics"
        }))
        .unwrap();

        let detailed = DetailedCourse::new(course, CourseDetails::default());
        let value = serde_json::to_value(&detailed).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["enrolledusercount"], 0);
        assert_eq!(value["instructorNames"], NOT_ASSIGNED);
    }
}
