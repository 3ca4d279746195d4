use bughunt_atoms::delivered::{self, DeliveredTask};
use bughunt_atoms::reviews::{self, Review};
use bughunt_atoms::tasks;
use bughunt_atoms::users::{self, Role};
use bughunt_atoms::{ServiceError, ServiceResult};
use bughunt_shared::AppState;
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::str::FromStr;

/// Review queries in flight at once while building the board.
const REVIEW_QUERY_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    All,
    Week,
    Month,
}

impl TimeRange {
    /// Start of the window, or `None` for all time.
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            TimeRange::All => None,
            TimeRange::Week => Some(now - Duration::days(7)),
            TimeRange::Month => Some(now - Duration::days(30)),
        }
    }
}

impl FromStr for TimeRange {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "" | "all" => Ok(TimeRange::All),
            "week" => Ok(TimeRange::Week),
            "month" => Ok(TimeRange::Month),
            other => Err(ServiceError::Validation(format!(
                "Invalid timeRange '{}'; expected all, week or month",
                other
            ))),
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub username: String,
    pub delivered_count: u32,
    pub review_count: u32,
}

fn within(timestamp: &str, since: Option<DateTime<Utc>>) -> bool {
    match since {
        None => true,
        Some(since) => DateTime::parse_from_rfc3339(timestamp)
            .map(|t| t.with_timezone(&Utc) >= since)
            .unwrap_or(false),
    }
}

/// Rank hunters by delivered tasks, then reviews written, then name.
/// Equal counts share a rank and the next distinct pair takes the next rank.
pub fn build_leaderboard(
    hunters: &[String],
    delivered: &[DeliveredTask],
    reviews: &[Review],
    since: Option<DateTime<Utc>>,
) -> Vec<LeaderboardEntry> {
    let mut counts: BTreeMap<&str, (u32, u32)> = hunters.iter().map(|h| (h.as_str(), (0, 0))).collect();

    for task in delivered.iter().filter(|d| within(&d.delivered_at, since)) {
        if !task.owner().is_empty() {
            counts.entry(task.owner()).or_default().0 += 1;
        }
    }
    for review in reviews.iter().filter(|r| within(&r.created_at, since)) {
        counts.entry(review.reviewer_name.as_str()).or_default().1 += 1;
    }

    let mut rows: Vec<(&str, u32, u32)> = counts.into_iter().map(|(name, (d, r))| (name, d, r)).collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)).then(a.0.cmp(b.0)));

    let mut entries = Vec::with_capacity(rows.len());
    let mut rank = 0;
    let mut previous = None;
    for (username, delivered_count, review_count) in rows {
        if previous != Some((delivered_count, review_count)) {
            rank += 1;
            previous = Some((delivered_count, review_count));
        }
        entries.push(LeaderboardEntry {
            rank,
            username: username.to_string(),
            delivered_count,
            review_count,
        });
    }
    entries
}

/// Run `load` over `inputs` with at most `limit` calls in flight.
async fn load_bounded<I, T, F, Fut>(inputs: I, limit: usize, load: F) -> ServiceResult<Vec<T>>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = ServiceResult<T>>,
{
    stream::iter(inputs.into_iter().map(load).collect::<Vec<_>>()).buffer_unordered(limit).try_collect().await
}

/// Reviews still attached to open tasks plus those frozen in deliveries.
async fn all_reviews(state: &AppState, delivered: &[DeliveredTask]) -> ServiceResult<Vec<Review>> {
    let client = &state.dynamo_client;
    let table = state.table();
    let open_tasks = tasks::load_tasks(client, table).await?;
    let per_task = load_bounded(open_tasks.iter(), REVIEW_QUERY_CONCURRENCY, |task| {
        reviews::load_reviews_for_task(client, table, &task.task_id)
    })
    .await?;

    let mut all: Vec<Review> = per_task.into_iter().flatten().collect();
    all.extend(delivered.iter().flat_map(|d| d.reviews.iter().cloned()));
    Ok(all)
}

pub async fn leaderboard(state: &AppState, time_range: Option<&str>) -> ServiceResult<Vec<LeaderboardEntry>> {
    let range: TimeRange = time_range.unwrap_or("all").parse()?;

    let client = &state.dynamo_client;
    let table = state.table();
    let (hunters, delivered) = tokio::join!(
        users::list_users_with_role(client, table, Role::Hunter),
        delivered::load_delivered(client, table),
    );
    let hunters: Vec<String> = hunters?.into_iter().map(|u| u.username).collect();
    let delivered = delivered?;
    let reviews = all_reviews(state, &delivered).await?;

    Ok(build_leaderboard(&hunters, &delivered, &reviews, range.since(Utc::now())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bughunt_atoms::feedback::Feedback;
    use bughunt_atoms::tasks::{Task, TaskStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn delivered(owner: &str, at: &str) -> DeliveredTask {
        DeliveredTask {
            task: Task {
                task_id: format!("t-{}-{}", owner, at),
                external_id: "BH".into(),
                project_name: "P".into(),
                industry: String::new(),
                domain_link: String::new(),
                tool_link: String::new(),
                status: TaskStatus::Deliver,
                owner: owner.into(),
                review_ids: vec![],
                final_report: false,
                version: 1,
                created_at: at.into(),
                updated_at: at.into(),
            },
            reviews: vec![],
            final_report: None,
            delivered_at: at.into(),
            delivered_by: "root".into(),
        }
    }

    fn review(by: &str, at: &str) -> Review {
        Review {
            review_id: format!("r-{}-{}", by, at),
            task_id: "t".into(),
            observed_behavior: "x".into(),
            vulnerabilities: "y".into(),
            script_file_id: "a".into(),
            support_file_id: "b".into(),
            reviewer_name: by.into(),
            feedback: Feedback::default(),
            created_at: at.into(),
            updated_at: at.into(),
        }
    }

    const OLD: &str = "2026-01-01T00:00:00Z";
    const RECENT: &str = "2026-06-10T00:00:00Z";

    #[test]
    fn ordering_and_dense_ranks() {
        let hunters = vec!["ann".to_string(), "bob".to_string(), "cat".to_string(), "dan".to_string()];
        let board = build_leaderboard(
            &hunters,
            &[delivered("bob", OLD), delivered("bob", OLD), delivered("ann", OLD), delivered("cat", OLD)],
            &[review("ann", OLD), review("cat", OLD)],
            None,
        );
        let rows: Vec<(u32, &str)> = board.iter().map(|e| (e.rank, e.username.as_str())).collect();
        // ann and cat tie on both counts; the tie is broken by name but shares a rank
        assert_eq!(rows, vec![(1, "bob"), (2, "ann"), (2, "cat"), (3, "dan")]);
    }

    #[test]
    fn window_excludes_older_work() {
        let now = DateTime::parse_from_rfc3339("2026-06-15T00:00:00Z").unwrap().with_timezone(&Utc);
        let board = build_leaderboard(
            &["ann".to_string()],
            &[delivered("ann", OLD), delivered("ann", RECENT)],
            &[review("ann", OLD)],
            TimeRange::Week.since(now),
        );
        assert_eq!(board[0].delivered_count, 1);
        assert_eq!(board[0].review_count, 0);
    }

    #[tokio::test]
    async fn review_queries_are_bounded() {
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let loaded = load_bounded(0..40, REVIEW_QUERY_CONCURRENCY, |i| {
            let (in_flight, peak) = (&in_flight, &peak);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(i)
            }
        })
        .await
        .unwrap();
        assert_eq!(loaded.len(), 40);
        assert!(peak.load(Ordering::SeqCst) <= REVIEW_QUERY_CONCURRENCY);
    }

    #[tokio::test]
    async fn first_failed_query_fails_the_board() {
        let loaded: ServiceResult<Vec<u32>> = load_bounded(0..5u32, 2, |i| async move {
            if i == 3 {
                Err(ServiceError::Upstream("DynamoDB query".into()))
            } else {
                Ok(i)
            }
        })
        .await;
        assert!(matches!(loaded, Err(ServiceError::Upstream(_))));
    }

    #[test]
    fn time_range_parsing() {
        assert_eq!("".parse::<TimeRange>().unwrap(), TimeRange::All);
        assert_eq!("month".parse::<TimeRange>().unwrap(), TimeRange::Month);
        assert!(matches!("year".parse::<TimeRange>(), Err(ServiceError::Validation(_))));
    }
}
