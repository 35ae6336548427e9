//! Text rendering for tool results
//!
//! Every tool answers with plain text. Success and failure both render here
//! so the handlers only decide which of the two they have.

use std::fmt::Write as _;

use crate::errors::AppError;
use crate::models::{DayCount, EmailContent, EmailSummary};
use crate::smtp::Sender;

const SEARCH_RULE_WIDTH: usize = 80;
const COUNT_RULE_WIDTH: usize = 30;

const CREDENTIAL_HINTS: &str = "Please check:\n\
1. EMAIL_USERNAME and EMAIL_PASSWORD are correct\n\
2. Server host, port and security settings are correct\n\
3. IMAP/SMTP access is enabled for the account\n\
4. An App Password is used if 2FA is enabled (Gmail)";

/// Tool whose failure is being rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Search,
    Content,
    Count,
    Send,
}

pub fn search_results(emails: &[EmailSummary]) -> String {
    if emails.is_empty() {
        return "No emails found matching the criteria.".to_owned();
    }

    let mut out = String::from("Found emails:\n\nID | From | Date | Subject\n");
    out.push_str(&"-".repeat(SEARCH_RULE_WIDTH));
    out.push('\n');
    for email in emails {
        let _ = writeln!(
            out,
            "{} | {} | {} | {}",
            email.id, email.from, email.date, email.subject
        );
    }
    out.push_str(
        "\nUse get-email-content with an email ID to view the full content of a specific email.",
    );
    out
}

pub fn email_content(email: &EmailContent) -> String {
    format!(
        "From: {}\nTo: {}\nDate: {}\nSubject: {}\n\nContent:\n{}",
        email.from, email.to, email.date, email.subject, email.content
    )
}

pub fn daily_counts(rows: &[DayCount]) -> String {
    let mut out = String::from("Daily email counts:\n\nDate | Count\n");
    out.push_str(&"-".repeat(COUNT_RULE_WIDTH));
    out.push('\n');
    for row in rows {
        let date = row.date.format("%Y-%m-%d");
        match row.count {
            Some(count) => {
                let _ = writeln!(out, "{date} | {count}");
            }
            None => {
                let _ = writeln!(out, "{date} | Timeout");
            }
        }
    }
    out
}

pub fn email_sent(sender: &Sender) -> String {
    format!("Email sent successfully from {sender}!")
}

/// User-facing text for a failed invocation
pub fn failure(tool: Tool, err: &AppError) -> String {
    match (tool, err) {
        (_, AppError::InvalidInput(msg)) => msg.clone(),
        (Tool::Search, AppError::Timeout(_)) => {
            "Search operation timed out. Please try with a more specific search criteria."
                .to_owned()
        }
        (Tool::Content, AppError::Timeout(_)) => {
            "Operation timed out while fetching email content.".to_owned()
        }
        (Tool::Send, AppError::Timeout(_)) => "Operation timed out while sending email. \
             The message may still have been delivered; check the sent folder before retrying."
            .to_owned(),
        (Tool::Send, AppError::PartialDelivery { rejected }) => {
            let mut out = String::from(
                "Email was accepted, but the server refused these recipients:\n",
            );
            for recipient in rejected {
                let _ = writeln!(out, "- {}: {}", recipient.address, recipient.reason);
            }
            out
        }
        (Tool::Send, err) => format!("Failed to send email: {err}\n\n{CREDENTIAL_HINTS}"),
        (_, AppError::AuthFailed(_) | AppError::Protocol(_)) => {
            format!("Error: {err}\n\n{CREDENTIAL_HINTS}")
        }
        (_, err) => format!("Error: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{Tool, daily_counts, email_content, failure, search_results};
    use crate::bridge::Operation;
    use crate::errors::{AppError, RejectedRecipient};
    use crate::models::{DayCount, EmailContent, EmailSummary};

    #[test]
    fn search_table_lists_rows_and_hint() {
        let text = search_results(&[EmailSummary {
            id: "7".to_owned(),
            from: "a@x.com".to_owned(),
            date: "Mon, 1 Jan 2024".to_owned(),
            subject: "Invoice".to_owned(),
        }]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Found emails:");
        assert_eq!(lines[2], "ID | From | Date | Subject");
        assert_eq!(lines[3].len(), 80);
        assert_eq!(lines[4], "7 | a@x.com | Mon, 1 Jan 2024 | Invoice");
        assert!(text.ends_with("view the full content of a specific email."));
        assert_eq!(search_results(&[]), "No emails found matching the criteria.");
    }

    #[test]
    fn content_block_has_labeled_fields() {
        let text = email_content(&EmailContent {
            from: "a@x.com".to_owned(),
            to: "b@x.com".to_owned(),
            date: "today".to_owned(),
            subject: "Hi".to_owned(),
            content: "Hello".to_owned(),
        });
        assert_eq!(
            text,
            "From: a@x.com\nTo: b@x.com\nDate: today\nSubject: Hi\n\nContent:\nHello"
        );
    }

    #[test]
    fn count_table_marks_timed_out_days() {
        let day = |d| NaiveDate::from_ymd_opt(2024, 1, d).expect("valid date");
        let text = daily_counts(&[
            DayCount { date: day(1), count: Some(3) },
            DayCount { date: day(2), count: None },
        ]);
        assert!(text.starts_with("Daily email counts:\n\nDate | Count\n"));
        assert!(text.contains(&format!("{}\n", "-".repeat(30))));
        assert!(text.contains("2024-01-01 | 3\n"));
        assert!(text.contains("2024-01-02 | Timeout\n"));
    }

    #[test]
    fn failures_use_tool_specific_text() {
        assert_eq!(
            failure(Tool::Content, &AppError::invalid("Email ID is required.")),
            "Email ID is required."
        );
        assert_eq!(
            failure(Tool::Search, &AppError::Timeout(Operation::Search)),
            "Search operation timed out. Please try with a more specific search criteria."
        );
        assert!(
            failure(Tool::Send, &AppError::Timeout(Operation::Send)).contains("may still have been delivered")
        );
        let text = failure(Tool::Send, &AppError::AuthFailed("535 bad credentials".to_owned()));
        assert!(text.starts_with("Failed to send email: authentication failed: 535"));
        assert!(text.contains("App Password"));
        assert_eq!(
            failure(Tool::Count, &AppError::NotFound("no email with ID 9".to_owned())),
            "Error: not found: no email with ID 9"
        );
    }

    #[test]
    fn connection_failures_on_read_tools_carry_hints() {
        let err = AppError::Protocol("TLS handshake failed: invalid peer certificate".to_owned());
        for tool in [Tool::Search, Tool::Content, Tool::Count] {
            let text = failure(tool, &err);
            assert!(text.starts_with(
                "Error: protocol error: TLS handshake failed: invalid peer certificate\n\nPlease check:"
            ));
            assert!(text.contains("security settings"));
            assert!(text.contains("App Password"));
        }
        let auth = failure(Tool::Search, &AppError::AuthFailed("LOGIN rejected".to_owned()));
        assert!(auth.contains("EMAIL_USERNAME and EMAIL_PASSWORD"));
    }

    #[test]
    fn partial_delivery_lists_refused_recipients() {
        let text = failure(
            Tool::Send,
            &AppError::PartialDelivery {
                rejected: vec![RejectedRecipient {
                    address: "b@x.com".to_owned(),
                    reason: "550 user unknown".to_owned(),
                }],
            },
        );
        assert!(text.contains("- b@x.com: 550 user unknown"));
    }
}
