use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::Json;
use axum::Router;
use lms_catalog_cache::prelude::*;
use lms_catalog_cache::upstream::MoodleClient;
use parking_lot::Mutex;
use serde_json::json;
use serde_json::Value;
use tokio::net::TcpListener;

const TOKEN: &str = "ws-token-1234";

/// Query strings received by the fake site, in arrival order.
#[derive(Clone, Default)]
struct Requests(Arc<Mutex<Vec<HashMap<String, String>>>>);

impl Requests {
    fn of(&self, function: &str) -> Vec<HashMap<String, String>> {
        self.0
            .lock()
            .iter()
            .filter(|params| params.get("wsfunction").map(String::as_str) == Some(function))
            .cloned()
            .collect()
    }
}

fn catalog() -> Vec<Value> {
    vec![
        json!({"id": 1, "fullname": "Linear Algebra", "shortname": "MATH101", "categoryid": 3}),
        json!({"id": 2, "fullname": "Organic Chemistry", "shortname": "CHEM201", "categoryid": 3}),
        json!({"id": 3, "fullname": "Statistics", "shortname": "STAT110", "categoryid": 3}),
        json!({"id": 5, "fullname": "Linear Programming", "shortname": "OR300", "categoryid": 4}),
    ]
}

fn roster(course_id: &str) -> Value {
    let member = |id: u64, name: &str, role: &str| {
        json!({
            "id": id,
            "fullname": name,
            "roles": [{"roleid": 3, "shortname": role}],
            "lastcourseaccess": 0,
        })
    };

    match course_id {
        "1" => json!([member(10, "Ada Lovelace", "editingteacher"), member(20, "Student One", "student")]),
        "2" => json!([member(21, "Student Two", "student")]),
        "3" => json!([member(11, "Grace Hopper", "teacher"), member(22, "Student Three", "student")]),
        _ => json!([]),
    }
}

fn moodle_exception(message: &str) -> Response {
    Json(json!({
        "exception": "dml_missing_record_exception",
        "errorcode": "invalidrecord",
        "message": message,
    }))
    .into_response()
}

async fn server_php(State(requests): State<Requests>, Query(params): Query<HashMap<String, String>>) -> Response {
    requests.0.lock().push(params.clone());
    let param = |name: &str| params.get(name).map(String::as_str);

    match param("wsfunction") {
        // The whole tree regardless of the criteria; filtering by parent is the client's job.
        Some("core_course_get_categories") => Json(json!([
            {"id": 1, "name": "Science", "parent": 0, "depth": 1, "path": "/1"},
            {"id": 2, "name": "Physics", "parent": 1, "depth": 2, "path": "/1/2"},
            {"id": 3, "name": "Arts", "parent": 0, "depth": 1, "path": "/3"},
            {"id": 4, "name": "Chemistry", "parent": 1, "depth": 2, "path": "/1/4"},
        ]))
        .into_response(),
        Some("core_course_get_courses_by_field") => match param("value") {
            Some("666") => moodle_exception("Can't find data record in database table course_categories."),
            Some(category) => {
                let courses = catalog()
                    .into_iter()
                    .filter(|c| c["categoryid"].to_string() == category)
                    .collect::<Vec<_>>();
                Json(json!({"courses": courses, "warnings": []})).into_response()
            }
            None => Json(json!({"courses": catalog(), "warnings": []})).into_response(),
        },
        Some("core_course_search_courses") => {
            let needle = param("criteriavalue").unwrap_or_default().to_lowercase();
            let courses = catalog()
                .into_iter()
                .filter(|c| c["fullname"].as_str().unwrap().to_lowercase().contains(&needle))
                .collect::<Vec<_>>();
            Json(json!({"total": courses.len(), "courses": courses, "warnings": []})).into_response()
        }
        Some("core_enrol_get_enrolled_users") => Json(roster(param("courseid").unwrap_or_default())).into_response(),
        Some("core_enrol_get_users_courses") => (StatusCode::SERVICE_UNAVAILABLE, "site maintenance").into_response(),
        _ => (StatusCode::NOT_FOUND, "unknown function").into_response(),
    }
}

async fn moodle_site() -> (Arc<MoodleClient>, Requests) {
    let requests = Requests::default();
    let app = Router::new()
        .route("/webservice/rest/server.php", get(server_php))
        .with_state(requests.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    let client = MoodleClient::builder()
        .base_url(format!("http://{addr}/"))
        .token(TOKEN.to_string())
        .build()
        .unwrap();
    (Arc::new(client), requests)
}

fn ids<T>(items: &[T], id: impl Fn(&T) -> u64) -> Vec<u64> {
    items.iter().map(id).collect()
}

#[tokio::test]
async fn categories_are_requested_by_parent_and_filtered_locally() {
    let (client, requests) = moodle_site().await;

    let children = client.category_children(1).await.unwrap();
    assert_eq!(ids(&children, |c| c.id), vec![2, 4]);
    assert_eq!(children[0].name, "Physics");

    let roots = client.root_categories().await.unwrap();
    assert_eq!(ids(&roots, |c| c.id), vec![1, 3]);

    let calls = requests.of("core_course_get_categories");
    assert_eq!(calls.len(), 2);
    let first = &calls[0];
    assert_eq!(first["wstoken"], TOKEN);
    assert_eq!(first["moodlewsrestformat"], "json");
    assert_eq!(first["criteria[0][key]"], "parent");
    assert_eq!(first["criteria[0][value]"], "1");
    assert_eq!(calls[1]["criteria[0][value]"], "0");
}

#[tokio::test]
async fn course_listing_unwraps_the_courses_field() {
    let (client, requests) = moodle_site().await;

    let courses = client.courses(&CourseFilter::in_category(3)).await.unwrap();
    assert_eq!(ids(&courses, |c| c.id), vec![1, 2, 3]);
    assert_eq!(courses[0].shortname, "MATH101");

    let calls = requests.of("core_course_get_courses_by_field");
    assert_eq!(calls[0]["field"], "category");
    assert_eq!(calls[0]["value"], "3");

    let everything = client.courses(&CourseFilter::default()).await.unwrap();
    assert_eq!(everything.len(), 4);
}

#[tokio::test]
async fn search_within_a_category_is_filtered_locally() {
    let (client, requests) = moodle_site().await;

    let courses = client
        .courses(&CourseFilter::in_category(3).with_search("  LINEAR "))
        .await
        .unwrap();
    assert_eq!(ids(&courses, |c| c.id), vec![1]);

    let calls = requests.of("core_course_search_courses");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["criterianame"], "search");
    assert_eq!(calls[0]["criteriavalue"], "linear");

    let anywhere = client.courses(&CourseFilter::default().with_search("linear")).await.unwrap();
    assert_eq!(ids(&anywhere, |c| c.id), vec![1, 5]);
}

#[tokio::test]
async fn limit_and_offset_page_the_result() {
    let (client, _) = moodle_site().await;

    let filter = CourseFilter {
        limit: Some(1),
        offset: Some(1),
        ..CourseFilter::in_category(3)
    };
    let page = client.courses(&filter).await.unwrap();
    assert_eq!(ids(&page, |c| c.id), vec![2]);

    let filter = CourseFilter {
        offset: Some(10),
        ..CourseFilter::in_category(3)
    };
    assert!(client.courses(&filter).await.unwrap().is_empty());
}

#[tokio::test]
async fn roster_yields_instructors_and_stats() {
    let (client, requests) = moodle_site().await;

    let instructors = client.course_instructors(1).await.unwrap();
    assert_eq!(instructors.iter().map(|u| u.fullname.as_str()).collect::<Vec<_>>(), vec!["Ada Lovelace"]);

    let stats = client.course_enrollment_stats(3).await.unwrap();
    assert_eq!(stats.enrolled_users, 2);
    assert_eq!(stats.active_users, 0);
    assert_eq!(stats.last_access, None);

    let calls = requests.of("core_enrol_get_enrolled_users");
    assert_eq!(calls.iter().map(|c| c["courseid"].as_str()).collect::<Vec<_>>(), vec!["1", "3"]);
}

#[tokio::test]
async fn aggregation_fetches_each_roster_once() {
    let (client, requests) = moodle_site().await;
    let aggregator = Aggregator::builder()
        .client(client as Arc<dyn LmsClient>)
        .batch_size(2)
        .build()
        .unwrap();

    let courses = aggregator.courses_with_details(3).await.unwrap();

    assert_eq!(ids(&courses, |c| c.course.id), vec![1, 2, 3]);
    assert_eq!(
        courses.iter().map(|c| c.instructor_names.as_str()).collect::<Vec<_>>(),
        vec!["Ada Lovelace", NOT_ASSIGNED, "Grace Hopper"]
    );
    assert_eq!(courses[0].course.enrolledusercount, Some(2));
    assert_eq!(courses[1].course.enrolledusercount, Some(1));
    assert_eq!(requests.of("core_enrol_get_enrolled_users").len(), 3);
}

#[tokio::test]
async fn exception_body_fails_the_aggregation() {
    let (client, requests) = moodle_site().await;
    let aggregator = Aggregator::builder()
        .client(client as Arc<dyn LmsClient>)
        .build()
        .unwrap();

    let err = aggregator.courses_with_details(666).await.unwrap_err();

    match err {
        UpstreamError::Api {
            function, errorcode, ..
        } => {
            assert_eq!(function, "core_course_get_courses_by_field");
            assert_eq!(errorcode, "invalidrecord");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(requests.of("core_enrol_get_enrolled_users").is_empty());
}

#[tokio::test]
async fn error_status_is_reported() {
    let (client, _) = moodle_site().await;

    let err = client.user_courses(9).await.unwrap_err();

    assert!(
        matches!(err, UpstreamError::Status { ref function, status: 503 } if function == "core_enrol_get_users_courses"),
        "unexpected error: {err}"
    );
}
