//! Message parsing and MIME handling
//!
//! Parses RFC822 messages using `mailparse` into the two records the tools
//! render: a header-only [`EmailSummary`] and a full [`EmailContent`].

use mailparse::{DispositionType, MailHeader, MailHeaderMap, ParsedMail};
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::models::{EmailContent, EmailSummary};

const UNKNOWN: &str = "Unknown";
const NO_SUBJECT: &str = "No Subject";

/// Build a summary from header bytes; the body is never touched
pub fn parse_summary(id: u32, header_bytes: &[u8]) -> AppResult<EmailSummary> {
    let (headers, _) = mailparse::parse_headers(header_bytes)
        .map_err(|e| AppError::Internal(format!("failed to parse message headers: {e}")))?;

    Ok(EmailSummary {
        id: id.to_string(),
        from: header_or(&headers, "From", UNKNOWN),
        date: header_or(&headers, "Date", UNKNOWN),
        subject: header_or(&headers, "Subject", NO_SUBJECT),
    })
}

/// Parse a full RFC822 message into headers plus a plain-text body
///
/// # Errors
///
/// - `Internal` if `mailparse` cannot parse the message structure
pub fn parse_content(raw: &[u8]) -> AppResult<EmailContent> {
    let parsed = mailparse::parse_mail(raw)
        .map_err(|e| AppError::Internal(format!("failed to parse RFC822 message: {e}")))?;

    let content = if parsed.subparts.is_empty() {
        decode_part(&parsed).unwrap_or_default()
    } else {
        let mut slots = BodySlots::default();
        walk_parts(&parsed, &mut slots);
        slots.select()
    };

    let headers = &parsed.headers;
    Ok(EmailContent {
        from: header_or(headers, "From", UNKNOWN),
        to: header_or(headers, "To", UNKNOWN),
        date: header_or(headers, "Date", UNKNOWN),
        subject: header_or(headers, "Subject", NO_SUBJECT),
        content,
    })
}

/// Body candidates collected during a full tree walk
#[derive(Debug, Default)]
struct BodySlots {
    plain_text: Option<String>,
    html_fallback: Option<String>,
}

impl BodySlots {
    /// Plain text wins over HTML regardless of part order
    fn select(self) -> String {
        self.plain_text
            .or(self.html_fallback)
            .unwrap_or_default()
    }
}

/// Walk the MIME tree in document order, filling the first candidate of each kind
fn walk_parts(part: &ParsedMail<'_>, slots: &mut BodySlots) {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            walk_parts(sub, slots);
        }
        return;
    }

    if part.get_content_disposition().disposition == DispositionType::Attachment {
        return;
    }

    let slot = match part.ctype.mimetype.to_ascii_lowercase().as_str() {
        "text/plain" => &mut slots.plain_text,
        "text/html" => &mut slots.html_fallback,
        _ => return,
    };
    if slot.is_none() {
        *slot = decode_part(part);
    }
}

/// Decode one leaf body; failures leave the candidate empty
fn decode_part(part: &ParsedMail<'_>) -> Option<String> {
    match part.get_body() {
        Ok(body) => Some(body),
        Err(e) => {
            debug!(mimetype = %part.ctype.mimetype, error = %e, "skipping undecodable part");
            None
        }
    }
}

/// First header value by case-insensitive key, or `fallback`
fn header_or(headers: &[MailHeader<'_>], key: &str, fallback: &str) -> String {
    headers
        .get_first_value(key)
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| fallback.to_owned())
}
