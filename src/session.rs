//! Per-invocation IMAP session
//!
//! A [`MailSession`] is opened at the start of a read-path tool call and
//! consumed by [`finish`] at the end, whatever the outcome. Release failures
//! are reported through [`ReleaseReport`] and the debug log only; they never
//! replace the invocation's own result.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::config::{Folder, ServiceConfig};
use crate::criteria::SearchCriteria;
use crate::errors::AppResult;
use crate::imap::{self, ImapSession};

/// Read operations the query engine needs from a selected mailbox
pub trait MailQuery {
    /// UIDs matching the criteria, ascending
    fn search(
        &mut self,
        criteria: &SearchCriteria,
    ) -> impl Future<Output = AppResult<Vec<u32>>> + Send;

    /// `Date`, `From` and `Subject` header bytes of one message
    fn fetch_headers(&mut self, uid: u32) -> impl Future<Output = AppResult<Vec<u8>>> + Send;

    /// Full RFC822 source of one message
    fn fetch_message(&mut self, uid: u32) -> impl Future<Output = AppResult<Vec<u8>>> + Send;
}

/// Best-effort teardown of a per-invocation session
pub trait Release {
    fn release(self) -> impl Future<Output = ReleaseReport> + Send;
}

/// Release `session` and hand back the invocation's own result unchanged
pub async fn finish<S, T>(session: S, result: AppResult<T>) -> AppResult<T>
where
    S: Release,
{
    let report = session.release().await;
    if !report.is_clean() {
        debug!(succeeded = result.is_ok(), "invocation result kept despite release failure");
    }
    result
}

/// Authenticated session with one mailbox selected read-only
pub struct MailSession {
    inner: ImapSession,
    mailbox: String,
    release_timeout: Duration,
}

/// Outcome of a best-effort release
#[derive(Debug, Default)]
pub struct ReleaseReport {
    /// `CLOSE` failure, if any
    pub close_error: Option<String>,
    /// `LOGOUT` failure, if any
    pub logout_error: Option<String>,
}

impl ReleaseReport {
    pub fn is_clean(&self) -> bool {
        self.close_error.is_none() && self.logout_error.is_none()
    }
}

impl MailSession {
    /// Connect, log in and `EXAMINE` the mailbox configured for `folder`
    ///
    /// If the mailbox cannot be opened, the authenticated session is logged
    /// out before the error is returned.
    pub async fn open(config: &ServiceConfig, folder: Folder) -> AppResult<Self> {
        let mailbox = config.mailbox_for(folder).to_owned();
        let mut inner = imap::connect_authenticated(config).await?;

        if let Err(e) = imap::examine(&mut inner, &mailbox, config.greeting_timeout).await {
            if let Err(logout) = imap::logout(&mut inner, config.greeting_timeout).await {
                debug!(error = %logout, "logout after failed EXAMINE failed");
            }
            return Err(e);
        }

        debug!(mailbox = %mailbox, "mailbox opened read-only");
        Ok(Self {
            inner,
            mailbox,
            release_timeout: config.greeting_timeout,
        })
    }

}

impl Release for MailSession {
    /// Close the mailbox and log out
    ///
    /// Both steps are attempted even if the first fails. Failures are
    /// logged at debug level and returned for diagnostics only.
    async fn release(mut self) -> ReleaseReport {
        let mut report = ReleaseReport::default();

        if let Err(e) = imap::close(&mut self.inner, self.release_timeout).await {
            report.close_error = Some(e.to_string());
        }
        if let Err(e) = imap::logout(&mut self.inner, self.release_timeout).await {
            report.logout_error = Some(e.to_string());
        }

        if report.is_clean() {
            debug!(mailbox = %self.mailbox, "session released");
        } else {
            debug!(
                mailbox = %self.mailbox,
                close_error = report.close_error.as_deref(),
                logout_error = report.logout_error.as_deref(),
                "session release failed; ignored"
            );
        }
        report
    }
}

impl MailQuery for MailSession {
    async fn search(&mut self, criteria: &SearchCriteria) -> AppResult<Vec<u32>> {
        debug!(mailbox = %self.mailbox, criteria = criteria.as_str(), "UID SEARCH");
        imap::uid_search(&mut self.inner, criteria).await
    }

    async fn fetch_headers(&mut self, uid: u32) -> AppResult<Vec<u8>> {
        imap::fetch_summary_headers(&mut self.inner, uid).await
    }

    async fn fetch_message(&mut self, uid: u32) -> AppResult<Vec<u8>> {
        imap::fetch_raw_message(&mut self.inner, uid).await
    }
}

#[cfg(test)]
mod tests {
    use super::{Release, ReleaseReport, finish};
    use crate::bridge::Operation;
    use crate::errors::AppError;

    struct BrokenSession;

    impl Release for BrokenSession {
        async fn release(self) -> ReleaseReport {
            ReleaseReport {
                close_error: Some("CLOSE failed: connection reset".to_owned()),
                logout_error: Some("LOGOUT timed out".to_owned()),
            }
        }
    }

    #[tokio::test]
    async fn release_failure_keeps_success() {
        let result = finish(BrokenSession, Ok(3_usize)).await;
        assert_eq!(result.expect("result must survive"), 3);
    }

    #[tokio::test]
    async fn release_failure_keeps_original_error() {
        let result: Result<(), _> =
            finish(BrokenSession, Err(AppError::Timeout(Operation::Search))).await;
        assert!(matches!(result, Err(AppError::Timeout(Operation::Search))));
    }

    #[test]
    fn release_report_is_clean_only_without_errors() {
        assert!(ReleaseReport::default().is_clean());
        let report = ReleaseReport {
            close_error: None,
            logout_error: Some("LOGOUT timed out".to_owned()),
        };
        assert!(!report.is_clean());
    }
}
