//! Search and fetch orchestration
//!
//! Runs the read-path tools against any [`MailQuery`]: one bounded search,
//! then sequential header fetches for at most [`MAX_EMAILS`] hits, or a
//! single bounded fetch-by-id.

use crate::bridge::{Bridge, Operation};
use crate::criteria::SearchCriteria;
use crate::errors::{AppError, AppResult};
use crate::mime;
use crate::models::{EmailContent, EmailSummary};
use crate::session::MailQuery;

/// Maximum summaries returned by one search
pub const MAX_EMAILS: usize = 100;

/// Search the selected mailbox and summarize the newest hits
///
/// The search and the fetch of all summaries are each bounded by the
/// bridge deadline. Fetches run one at a time in newest-first order.
pub async fn search_emails<Q>(
    query: &mut Q,
    bridge: &Bridge,
    criteria: &SearchCriteria,
) -> AppResult<Vec<EmailSummary>>
where
    Q: MailQuery,
{
    let mut uids = bridge
        .bounded(Operation::Search, query.search(criteria))
        .await?;
    uids.sort_unstable_by(|a, b| b.cmp(a));
    uids.truncate(MAX_EMAILS);

    bridge
        .bounded(Operation::FetchMany, fetch_summaries(query, &uids))
        .await
}

async fn fetch_summaries<Q>(query: &mut Q, uids: &[u32]) -> AppResult<Vec<EmailSummary>>
where
    Q: MailQuery,
{
    let mut summaries = Vec::with_capacity(uids.len());
    for uid in uids {
        let header_bytes = query.fetch_headers(*uid).await?;
        summaries.push(mime::parse_summary(*uid, &header_bytes)?);
    }
    Ok(summaries)
}

/// Fetch and parse one message by the ID shown in search results
pub async fn get_email_content<Q>(query: &mut Q, bridge: &Bridge, uid: u32) -> AppResult<EmailContent>
where
    Q: MailQuery,
{
    let raw = bridge
        .bounded(Operation::FetchOne, query.fetch_message(uid))
        .await?;
    mime::parse_content(&raw)
}

/// Validate an email ID argument
pub fn parse_email_id(raw: &str) -> AppResult<u32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid("Email ID is required."));
    }
    match trimmed.parse::<u32>() {
        Ok(uid) if uid > 0 => Ok(uid),
        _ => Err(AppError::InvalidInput(format!(
            "Email ID '{trimmed}' is not valid; use an ID listed by search-emails."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use chrono::NaiveDate;

    use super::{MAX_EMAILS, get_email_content, parse_email_id, search_emails};
    use crate::bridge::{Bridge, Operation};
    use crate::criteria::SearchCriteria;
    use crate::errors::{AppError, AppResult};
    use crate::session::MailQuery;

    /// In-memory mailbox keyed by UID
    #[derive(Default)]
    struct FakeMailbox {
        messages: BTreeMap<u32, Vec<u8>>,
        searches: Vec<String>,
        header_fetches: Vec<u32>,
        /// Searches whose predicate contains this text never finish
        stall_on: Option<String>,
    }

    impl FakeMailbox {
        fn with_messages(count: u32) -> Self {
            let messages = (1..=count)
                .map(|uid| {
                    let raw = format!(
                        "From: sender{uid}@example.com\r\nDate: Mon, 1 Jan 2024 00:00:00 +0000\r\nSubject: Message {uid}\r\n\r\nBody {uid}"
                    );
                    (uid, raw.into_bytes())
                })
                .collect();
            Self {
                messages,
                ..Self::default()
            }
        }
    }

    impl MailQuery for FakeMailbox {
        async fn search(&mut self, criteria: &SearchCriteria) -> AppResult<Vec<u32>> {
            self.searches.push(criteria.as_str().to_owned());
            if let Some(marker) = &self.stall_on
                && criteria.as_str().contains(marker.as_str())
            {
                std::future::pending::<()>().await;
            }
            Ok(self.messages.keys().copied().collect())
        }

        async fn fetch_headers(&mut self, uid: u32) -> AppResult<Vec<u8>> {
            self.header_fetches.push(uid);
            let raw = self.fetch_message(uid).await?;
            let end = raw
                .windows(4)
                .position(|w| w == b"\r\n\r\n")
                .map_or(raw.len(), |p| p + 4);
            Ok(raw[..end].to_vec())
        }

        async fn fetch_message(&mut self, uid: u32) -> AppResult<Vec<u8>> {
            self.messages
                .get(&uid)
                .cloned()
                .ok_or_else(|| AppError::NotFound(format!("no email with ID {uid}")))
        }
    }

    fn criteria() -> SearchCriteria {
        SearchCriteria::on(NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date"))
    }

    #[tokio::test]
    async fn search_caps_results_and_returns_newest_first() {
        let mut mailbox = FakeMailbox::with_messages(150);
        let bridge = Bridge::new(Duration::from_secs(60));

        let summaries = search_emails(&mut mailbox, &bridge, &criteria())
            .await
            .expect("search must succeed");

        assert_eq!(summaries.len(), MAX_EMAILS);
        assert_eq!(summaries[0].id, "150");
        assert_eq!(summaries[0].subject, "Message 150");
        assert_eq!(summaries[99].id, "51");
        assert_eq!(mailbox.searches.len(), 1);
        assert_eq!(mailbox.header_fetches.len(), MAX_EMAILS);
    }

    #[tokio::test]
    async fn search_with_no_hits_fetches_nothing() {
        let mut mailbox = FakeMailbox::default();
        let bridge = Bridge::new(Duration::from_secs(60));

        let summaries = search_emails(&mut mailbox, &bridge, &criteria())
            .await
            .expect("search must succeed");
        assert!(summaries.is_empty());
        assert!(mailbox.header_fetches.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_search_surfaces_timeout() {
        let mut mailbox = FakeMailbox::with_messages(3);
        mailbox.stall_on = Some("ON".to_owned());
        let bridge = Bridge::new(Duration::from_secs(60));

        let err = search_emails(&mut mailbox, &bridge, &criteria())
            .await
            .expect_err("must time out");
        assert!(matches!(err, AppError::Timeout(Operation::Search)));
        assert!(mailbox.header_fetches.is_empty());
    }

    #[tokio::test]
    async fn content_is_fetched_and_parsed() {
        let mut mailbox = FakeMailbox::with_messages(2);
        let bridge = Bridge::new(Duration::from_secs(60));

        let content = get_email_content(&mut mailbox, &bridge, 2)
            .await
            .expect("fetch must succeed");
        assert_eq!(content.subject, "Message 2");
        assert_eq!(content.content, "Body 2");

        let err = get_email_content(&mut mailbox, &bridge, 9)
            .await
            .expect_err("missing uid must fail");
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn email_id_must_be_a_positive_number() {
        assert_eq!(parse_email_id(" 42 ").expect("valid id"), 42);
        let err = parse_email_id("").expect_err("must fail");
        assert_eq!(err.to_string(), "invalid input: Email ID is required.");
        assert!(parse_email_id("0").is_err());
        assert!(parse_email_id("abc").is_err());
    }
}
