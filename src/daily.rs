//! Per-day message counts
//!
//! One bounded `ON <day>` search per calendar day. A day that hits the
//! deadline is recorded without a count and the walk moves on with a new
//! session.

use std::future::Future;

use chrono::{Duration as ChronoDuration, NaiveDate};
use tracing::warn;

use crate::bridge::{Bridge, Operation};
use crate::criteria::{SearchCriteria, parse_ymd};
use crate::errors::{AppError, AppResult};
use crate::models::DayCount;
use crate::session::{self, MailQuery, Release};

/// Longest range accepted by [`DayRange::new`], in days
pub const MAX_RANGE_DAYS: i64 = 366;

/// Inclusive range of calendar days
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DayRange {
    /// # Errors
    ///
    /// - `InvalidInput` if `start > end` or the range exceeds [`MAX_RANGE_DAYS`]
    pub fn new(start: NaiveDate, end: NaiveDate) -> AppResult<Self> {
        if start > end {
            return Err(AppError::invalid("start_date must be <= end_date"));
        }
        let days = (end - start).num_days() + 1;
        if days > MAX_RANGE_DAYS {
            return Err(AppError::InvalidInput(format!(
                "date range covers {days} days; at most {MAX_RANGE_DAYS} are allowed"
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse both bounds from `YYYY-MM-DD` strings
    pub fn parse(start: &str, end: &str) -> AppResult<Self> {
        Self::new(parse_ymd(start)?, parse_ymd(end)?)
    }

    pub fn day_count(&self) -> usize {
        ((self.end - self.start).num_days() + 1) as usize
    }

    /// Days in ascending order
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let start = self.start;
        (0..self.day_count() as i64).map(move |offset| start + ChronoDuration::days(offset))
    }
}

/// Count messages for every day in `range`
///
/// Sessions come from `open`, lazily. Timeouts produce `count: None` for
/// that day only; the timed-out session is released and the next day runs
/// on a fresh one, since a late `* SEARCH` reply would otherwise be merged
/// into the next count. Any other failure aborts the walk.
pub async fn count_daily<Q, F, Fut>(
    mut open: F,
    bridge: &Bridge,
    range: &DayRange,
) -> AppResult<Vec<DayCount>>
where
    Q: MailQuery + Release,
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<Q>>,
{
    let mut rows = Vec::with_capacity(range.day_count());
    let mut session: Option<Q> = None;

    for date in range.days() {
        let mut query = match session.take() {
            Some(query) => query,
            None => open().await?,
        };
        let criteria = SearchCriteria::on(date);
        let count = match bridge.bounded(Operation::Count, query.search(&criteria)).await {
            Ok(uids) => {
                session = Some(query);
                Some(uids.len())
            }
            Err(AppError::Timeout(_)) => {
                warn!(%date, "daily count timed out; reopening session for next day");
                query.release().await;
                None
            }
            Err(e) => return session::finish(query, Err(e)).await,
        };
        rows.push(DayCount { date, count });
    }

    match session {
        Some(query) => session::finish(query, Ok(rows)).await,
        None => Ok(rows),
    }
}

#[cfg(test)]
mod tests {
    use std::future::{Ready, ready};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use chrono::NaiveDate;

    use super::{DayRange, MAX_RANGE_DAYS, count_daily};
    use crate::bridge::Bridge;
    use crate::criteria::SearchCriteria;
    use crate::errors::{AppError, AppResult};
    use crate::session::{MailQuery, Release, ReleaseReport};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[derive(Debug, Default)]
    struct Log {
        searches: Vec<String>,
        opens: usize,
        releases: usize,
    }

    /// One hit per day, three on the stalled day
    ///
    /// A stalled search leaves its reply queued on the session, the way a
    /// late `* SEARCH` line stays on the wire, and the next search on the
    /// same session returns it merged with its own hits.
    struct DayMailbox {
        log: Arc<Mutex<Log>>,
        stall_on: Option<&'static str>,
        fail_on: Option<&'static str>,
        backlog: Vec<u32>,
    }

    impl MailQuery for DayMailbox {
        async fn search(&mut self, criteria: &SearchCriteria) -> AppResult<Vec<u32>> {
            let predicate = criteria.as_str().to_owned();
            self.log
                .lock()
                .expect("log lock")
                .searches
                .push(predicate.clone());

            if self.fail_on.is_some_and(|m| predicate.contains(m)) {
                return Err(AppError::Protocol("BYE server shutting down".to_owned()));
            }
            if self.stall_on.is_some_and(|m| predicate.contains(m)) {
                self.backlog = vec![1, 2, 3];
                std::future::pending::<()>().await;
            }
            let mut uids = std::mem::take(&mut self.backlog);
            uids.push(7);
            Ok(uids)
        }

        async fn fetch_headers(&mut self, uid: u32) -> AppResult<Vec<u8>> {
            Err(AppError::NotFound(format!("no email with ID {uid}")))
        }

        async fn fetch_message(&mut self, uid: u32) -> AppResult<Vec<u8>> {
            Err(AppError::NotFound(format!("no email with ID {uid}")))
        }
    }

    impl Release for DayMailbox {
        async fn release(self) -> ReleaseReport {
            self.log.lock().expect("log lock").releases += 1;
            ReleaseReport::default()
        }
    }

    fn opener(
        log: &Arc<Mutex<Log>>,
        stall_on: Option<&'static str>,
        fail_on: Option<&'static str>,
    ) -> impl FnMut() -> Ready<AppResult<DayMailbox>> {
        let log = Arc::clone(log);
        move || {
            log.lock().expect("log lock").opens += 1;
            ready(Ok(DayMailbox {
                log: Arc::clone(&log),
                stall_on,
                fail_on,
                backlog: Vec::new(),
            }))
        }
    }

    #[test]
    fn range_rejects_inverted_and_oversized_bounds() {
        assert!(DayRange::new(day(2024, 1, 3), day(2024, 1, 1)).is_err());
        assert_eq!(
            DayRange::new(day(2024, 1, 1), day(2024, 1, 1))
                .expect("single day")
                .day_count(),
            1
        );
        let end = day(2024, 1, 1) + chrono::Duration::days(MAX_RANGE_DAYS);
        assert!(DayRange::new(day(2024, 1, 1), end).is_err());
        assert!(DayRange::parse("2024-01-01", "Jan 3").is_err());
    }

    #[test]
    fn days_cross_month_boundaries() {
        let range = DayRange::parse("2024-02-28", "2024-03-01").expect("valid range");
        let days: Vec<NaiveDate> = range.days().collect();
        assert_eq!(days, vec![day(2024, 2, 28), day(2024, 2, 29), day(2024, 3, 1)]);
    }

    #[tokio::test]
    async fn issues_one_query_per_day_on_one_session() {
        let log = Arc::new(Mutex::new(Log::default()));
        let bridge = Bridge::new(Duration::from_secs(60));
        let range = DayRange::new(day(2024, 1, 1), day(2024, 1, 5)).expect("valid range");

        let rows = count_daily(opener(&log, None, None), &bridge, &range)
            .await
            .expect("count must succeed");

        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|row| row.count == Some(1)));
        assert_eq!(rows[2].date, day(2024, 1, 3));

        let log = log.lock().expect("log lock");
        assert_eq!(log.searches.len(), 5);
        assert_eq!(log.searches[0], "ON \"01-Jan-2024\"");
        assert_eq!(log.searches[4], "ON \"05-Jan-2024\"");
        assert_eq!(log.opens, 1);
        assert_eq!(log.releases, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_day_does_not_leak_into_next_day() {
        let log = Arc::new(Mutex::new(Log::default()));
        let bridge = Bridge::new(Duration::from_secs(60));
        let range = DayRange::new(day(2024, 1, 1), day(2024, 1, 3)).expect("valid range");

        let rows = count_daily(opener(&log, Some("02-Jan-2024"), None), &bridge, &range)
            .await
            .expect("count must succeed");

        let counts: Vec<Option<usize>> = rows.iter().map(|row| row.count).collect();
        assert_eq!(counts, vec![Some(1), None, Some(1)]);

        let log = log.lock().expect("log lock");
        assert_eq!(log.searches.len(), 3);
        assert_eq!(log.opens, 2);
        assert_eq!(log.releases, 2);
    }

    #[tokio::test]
    async fn protocol_failure_aborts_and_releases() {
        let log = Arc::new(Mutex::new(Log::default()));
        let bridge = Bridge::new(Duration::from_secs(60));
        let range = DayRange::new(day(2024, 1, 1), day(2024, 1, 3)).expect("valid range");

        let err = count_daily(opener(&log, None, Some("02-Jan-2024")), &bridge, &range)
            .await
            .expect_err("must abort");
        assert!(matches!(err, AppError::Protocol(_)));

        let log = log.lock().expect("log lock");
        assert_eq!(log.searches.len(), 2);
        assert_eq!(log.releases, 1);
    }
}
