//! Records and tool input DTOs
//!
//! Inputs are annotated with `JsonSchema` so rmcp can publish the argument
//! contract of each tool. Records are transient: built per call, rendered to
//! text, then dropped.

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::config::Folder;

/// Trimmed optional text argument; blank counts as absent
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Header-level view of one search hit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailSummary {
    /// IMAP UID within the selected mailbox
    pub id: String,
    pub from: String,
    pub date: String,
    pub subject: String,
}

/// Full message with a selected plain-text body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailContent {
    pub from: String,
    pub to: String,
    pub date: String,
    pub subject: String,
    /// `text/plain` body, or the HTML part when no plain part exists
    pub content: String,
}

/// Message count for one calendar day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayCount {
    pub date: NaiveDate,
    /// `None` when the count query hit its deadline
    pub count: Option<usize>,
}

/// Input: `search-emails`
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct SearchEmailsInput {
    /// Start date in YYYY-MM-DD format (optional, defaults to 7 days ago)
    pub start_date: Option<String>,
    /// End date in YYYY-MM-DD format (optional, defaults to today)
    pub end_date: Option<String>,
    /// Keyword to search in email subject and body (optional)
    pub keyword: Option<String>,
    /// Folder to search in ('inbox' or 'sent', defaults to 'inbox')
    #[serde(default)]
    pub folder: Folder,
}

/// Input: `get-email-content`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetEmailContentInput {
    /// The ID of the email to retrieve, as listed by search-emails
    pub email_id: String,
    /// Folder the ID belongs to ('inbox' or 'sent', defaults to 'inbox')
    #[serde(default)]
    pub folder: Folder,
}

/// Input: `count-daily-emails`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CountDailyEmailsInput {
    /// Start date in YYYY-MM-DD format
    pub start_date: String,
    /// End date in YYYY-MM-DD format
    pub end_date: String,
    /// Folder to count in ('inbox' or 'sent', defaults to 'inbox')
    #[serde(default)]
    pub folder: Folder,
}

/// Input: `send-email`
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct SendEmailInput {
    /// List of recipient email addresses (confirmed)
    pub to: Vec<String>,
    /// Confirmed email subject
    pub subject: String,
    /// Confirmed email content
    pub content: String,
    /// List of CC recipient email addresses (optional, confirmed)
    #[serde(default)]
    pub cc: Vec<String>,
    /// Email address to send from (optional, uses default if not specified)
    pub sender_email: Option<String>,
    /// Display name for the sender (optional, uses default if not specified)
    pub sender_name: Option<String>,
}
