use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use fieldx::fxstruct;
use tokio::task::JoinSet;
use tracing::debug;
use tracing::instrument;
use tracing::warn;

use crate::action::CourseFilter;
use crate::error::UpstreamError;
use crate::traits::LmsClient;
use crate::upstream::model::CourseDetails;
use crate::upstream::model::DetailedCourse;
use crate::upstream::model::UpstreamCourse;
use crate::upstream::with_timeout;

pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Composes several upstream calls into one result while bounding how many of them are outstanding.
///
/// Each course costs a single roster lookup. Lookups run concurrently within a batch of
/// [`batch_size`](Aggregator::batch_size) courses; batches run one after another, so the number of courses being
/// enriched at any moment never exceeds the batch size. A failed or timed out lookup only costs its own course: it
/// stays in the list with zero enrolments and "Not assigned" instructors.
///
/// ```ignore
/// let aggregator = Aggregator::builder()
///     .client(client)
///     .batch_size(5)
///     .call_timeout(Duration::from_secs(10))
///     .build()?;
///
/// let courses = aggregator.courses_with_details(category_id).await?;
/// ```
#[fxstruct(sync, no_new, default(off), builder)]
pub struct Aggregator {
    #[fieldx(get(clone), builder(required))]
    client: Arc<dyn LmsClient>,

    #[fieldx(get(copy), default(DEFAULT_BATCH_SIZE))]
    batch_size: usize,

    /// Budget for every single upstream call.
    #[fieldx(get(copy), default(Duration::from_secs(10)))]
    call_timeout: Duration,
}

impl Aggregator {
    /// Only a failure of the base course listing fails the aggregation.
    #[instrument(level = "debug", skip(self))]
    pub async fn courses_with_details(&self, category_id: u64) -> Result<Vec<DetailedCourse>, UpstreamError> {
        let courses = with_timeout(
            self.call_timeout(),
            self.client.courses(&CourseFilter::in_category(category_id)),
        )
        .await?;

        if courses.is_empty() {
            return Ok(Vec::new());
        }

        let batch_size = self.batch_size().max(1);
        let mut detailed = Vec::with_capacity(courses.len());

        for (batch_no, batch) in courses.chunks(batch_size).enumerate() {
            debug!(batch = batch_no, size = batch.len(), "enriching course batch");
            detailed.extend(self.enrich_batch(batch).await);
        }

        Ok(detailed)
    }

    // Results are put back by index, the completion order of the tasks doesn't matter.
    async fn enrich_batch(&self, batch: &[UpstreamCourse]) -> Vec<DetailedCourse> {
        let mut tasks = JoinSet::new();

        for (idx, course) in batch.iter().enumerate() {
            let client = self.client();
            let course_id = course.id;
            let limit = self.call_timeout();
            tasks.spawn(async move { (idx, Self::course_details(client, course_id, limit).await) });
        }

        let mut details = vec![CourseDetails::default(); batch.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, course_details)) => details[idx] = course_details,
                Err(err) => warn!("course detail task died: {err}"),
            }
        }

        batch
            .iter()
            .cloned()
            .zip(details)
            .map(|(course, course_details)| DetailedCourse::new(course, course_details))
            .collect()
    }

    // One roster request per course yields both the count and the instructors.
    async fn course_details(client: Arc<dyn LmsClient>, course_id: u64, limit: Duration) -> CourseDetails {
        match with_timeout(limit, client.course_enrollments(course_id)).await {
            Ok(users) => CourseDetails {
                enrolled:    users.len() as u64,
                instructors: users
                    .iter()
                    .filter(|u| client.is_instructor(u))
                    .map(|u| u.fullname.clone())
                    .filter(|n| !n.is_empty())
                    .collect(),
            },
            Err(err) => {
                warn!(course_id, error = %err, "enrolment lookup failed, using defaults");
                CourseDetails::default()
            }
        }
    }
}

impl Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("batch_size", &self.batch_size())
            .field("call_timeout", &self.call_timeout())
            .finish()
    }
}
