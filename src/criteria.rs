//! IMAP SEARCH predicate construction
//!
//! Turns an optional date window and keyword into a predicate string. The
//! builder is pure: "today" is an argument, so defaults are testable.

use chrono::{Duration as ChronoDuration, NaiveDate};

use crate::errors::{AppError, AppResult};

/// Days covered by a search when no start date is given
const DEFAULT_WINDOW_DAYS: i64 = 7;

/// Immutable IMAP SEARCH predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCriteria {
    predicate: String,
    utf8: bool,
}

impl SearchCriteria {
    /// `ON "<date>"` for a single calendar day
    pub fn on(date: NaiveDate) -> Self {
        Self {
            predicate: format!("ON {}", imap_date(date)),
            utf8: false,
        }
    }

    /// Window from `start` to `end`, both inclusive
    ///
    /// A one-day window collapses to `ON`. Otherwise the exclusive `BEFORE`
    /// bound is moved one day past `end`.
    pub fn between(start: NaiveDate, end: NaiveDate) -> AppResult<Self> {
        if start > end {
            return Err(AppError::invalid("start_date must be <= end_date"));
        }
        if start == end {
            return Ok(Self::on(start));
        }
        let end_exclusive = end + ChronoDuration::days(1);
        Ok(Self {
            predicate: format!(
                "SINCE {} BEFORE {}",
                imap_date(start),
                imap_date(end_exclusive)
            ),
            utf8: false,
        })
    }

    /// Require the subject or body to contain `keyword` as well
    ///
    /// Produces one parenthesized group; IMAP ANDs the keys inside it.
    pub fn with_keyword(self, keyword: &str) -> AppResult<Self> {
        let quoted = escape_imap_quoted(keyword)?;
        Ok(Self {
            predicate: format!(
                "((OR SUBJECT \"{quoted}\" BODY \"{quoted}\") {})",
                self.predicate
            ),
            utf8: self.utf8 || !keyword.is_ascii(),
        })
    }

    /// Predicate text as sent after `UID SEARCH`
    pub fn as_str(&self) -> &str {
        &self.predicate
    }

    /// Whether the predicate must be sent with `CHARSET UTF-8`
    pub fn requires_utf8(&self) -> bool {
        self.utf8
    }
}

/// Build the predicate for the search tool
///
/// Missing `start_date` defaults to seven days before `today`, missing
/// `end_date` to `today`.
pub fn build_search_criteria(
    start_date: Option<&str>,
    end_date: Option<&str>,
    keyword: Option<&str>,
    today: NaiveDate,
) -> AppResult<SearchCriteria> {
    let start = match start_date {
        Some(s) => parse_ymd(s)?,
        None => today - ChronoDuration::days(DEFAULT_WINDOW_DAYS),
    };
    let end = match end_date {
        Some(s) => parse_ymd(s)?,
        None => today,
    };

    let criteria = SearchCriteria::between(start, end)?;
    match keyword {
        Some(kw) => criteria.with_keyword(kw),
        None => Ok(criteria),
    }
}

/// Validate search text field bounds and characters
fn validate_search_text(input: &str) -> AppResult<()> {
    if input.is_empty() || input.chars().count() > 256 {
        return Err(AppError::InvalidInput(
            "keyword must be 1..256 characters".to_owned(),
        ));
    }
    if input.chars().any(|ch| ch.is_control()) {
        return Err(AppError::InvalidInput(
            "keyword must not contain control characters".to_owned(),
        ));
    }
    Ok(())
}

/// Escape backslashes and quotes for IMAP quoted strings
fn escape_imap_quoted(input: &str) -> AppResult<String> {
    validate_search_text(input)?;
    Ok(input.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Format date as a quoted IMAP SEARCH date (e.g., `"01-Jan-2024"`)
pub fn imap_date(date: NaiveDate) -> String {
    format!("\"{}\"", date.format("%d-%b-%Y"))
}

/// Parse YYYY-MM-DD date string
pub fn parse_ymd(input: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::InvalidInput(format!("invalid date '{input}', expected YYYY-MM-DD")))
}
