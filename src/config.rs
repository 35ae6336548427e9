//! Service configuration
//!
//! Loaded once at startup from environment variables (optionally seeded from
//! a `.env` file) and shared read-only behind an `Arc`. Loading goes through
//! a lookup function so tests never touch the process environment.

use std::env::{self, VarError};
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::errors::{AppError, AppResult};

/// Default per-operation deadline in seconds
pub const SEARCH_TIMEOUT_SECONDS: u64 = 60;

/// Mailbox selector exposed by the tools
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Folder {
    /// The account's default mailbox
    #[default]
    Inbox,
    /// The provider's sent-items mailbox
    Sent,
}

/// How the SMTP connection is secured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpSecurity {
    /// Plain connect followed by `STARTTLS` (typically port 587)
    StartTls,
    /// TLS from the first byte (typically port 465)
    Tls,
}

/// Process-wide configuration
///
/// Credentials authenticate both IMAP and SMTP. The visible sender of
/// outgoing mail is resolved separately, see [`crate::smtp::resolve_sender`].
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Account used for IMAP LOGIN and SMTP AUTH
    pub auth_account: String,
    /// Password or app password, never logged
    pub auth_secret: SecretString,
    /// Default display name for outgoing mail
    pub display_name: String,
    /// Default visible From address when the request gives none
    pub default_send_as: Option<String>,
    /// IMAP server hostname
    pub imap_host: String,
    /// IMAP server port (implicit TLS)
    pub imap_port: u16,
    /// Mailbox selected for [`Folder::Inbox`]
    pub inbox_mailbox: String,
    /// Mailbox selected for [`Folder::Sent`]
    pub sent_mailbox: String,
    /// SMTP server hostname
    pub smtp_host: String,
    /// SMTP server port
    pub smtp_port: u16,
    /// SMTP transport security
    pub smtp_security: SmtpSecurity,
    /// Deadline applied to each search, fetch, count and send
    pub operation_timeout: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// TLS handshake, greeting, login and release timeout
    pub greeting_timeout: Duration,
}

impl ServiceConfig {
    /// Load configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if `EMAIL_USERNAME`/`EMAIL_PASSWORD` are
    /// missing or any variable is malformed.
    ///
    /// # Example Environment
    ///
    /// ```text
    /// EMAIL_USERNAME=user@gmail.com
    /// EMAIL_PASSWORD=app-password
    /// NAME=Jane Doe
    /// DEFAULT_EMAIL=jane@example.com
    /// IMAP_SERVER=imap.gmail.com
    /// SMTP_SERVER=smtp.gmail.com
    /// SMTP_PORT=587
    /// ```
    pub fn load_from_env() -> AppResult<Self> {
        Self::load_with(|key| env::var(key))
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn load_with<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        let auth_account = required(&lookup, "EMAIL_USERNAME")?;
        let auth_secret = required(&lookup, "EMAIL_PASSWORD")?;
        let display_name =
            optional(&lookup, "NAME")?.unwrap_or_else(|| auth_account.clone());

        let operation_timeout_secs = parse_u64(
            &lookup,
            "EMAIL_OPERATION_TIMEOUT_SECONDS",
            SEARCH_TIMEOUT_SECONDS,
        )?;
        if operation_timeout_secs == 0 {
            return Err(AppError::invalid(
                "EMAIL_OPERATION_TIMEOUT_SECONDS must be greater than zero",
            ));
        }

        Ok(Self {
            default_send_as: optional(&lookup, "DEFAULT_EMAIL")?,
            imap_host: optional(&lookup, "IMAP_SERVER")?
                .unwrap_or_else(|| "imap.gmail.com".to_owned()),
            imap_port: parse_u16(&lookup, "IMAP_PORT", 993)?,
            inbox_mailbox: optional(&lookup, "IMAP_INBOX_FOLDER")?
                .unwrap_or_else(|| "INBOX".to_owned()),
            sent_mailbox: optional(&lookup, "IMAP_SENT_FOLDER")?
                .unwrap_or_else(|| "[Gmail]/Sent Mail".to_owned()),
            smtp_host: optional(&lookup, "SMTP_SERVER")?
                .unwrap_or_else(|| "smtp.gmail.com".to_owned()),
            smtp_port: parse_u16(&lookup, "SMTP_PORT", 587)?,
            smtp_security: parse_security(&lookup, "SMTP_SECURITY")?,
            operation_timeout: Duration::from_secs(operation_timeout_secs),
            connect_timeout: Duration::from_millis(parse_u64(
                &lookup,
                "EMAIL_CONNECT_TIMEOUT_MS",
                30_000,
            )?),
            greeting_timeout: Duration::from_millis(parse_u64(
                &lookup,
                "EMAIL_GREETING_TIMEOUT_MS",
                15_000,
            )?),
            auth_account,
            auth_secret: SecretString::new(auth_secret.into()),
            display_name,
        })
    }

    /// Map a tool folder selector to the configured mailbox name
    pub fn mailbox_for(&self, folder: Folder) -> &str {
        match folder {
            Folder::Inbox => &self.inbox_mailbox,
            Folder::Sent => &self.sent_mailbox,
        }
    }
}

/// Read a required variable, returning error if missing or blank
fn required<F>(lookup: &F, key: &str) -> AppResult<String>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    optional(lookup, key)?.ok_or_else(|| {
        AppError::InvalidInput(format!("missing required environment variable {key}"))
    })
}

/// Read an optional variable; blank values count as unset
fn optional<F>(lookup: &F, key: &str) -> AppResult<Option<String>>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    match lookup(key) {
        Ok(v) if v.trim().is_empty() => Ok(None),
        Ok(v) => Ok(Some(v.trim().to_owned())),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(AppError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

fn parse_u16<F>(lookup: &F, key: &str, default: u16) -> AppResult<u16>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    match optional(lookup, key)? {
        Some(v) => v.parse::<u16>().map_err(|_| {
            AppError::InvalidInput(format!("invalid u16 environment variable {key}: '{v}'"))
        }),
        None => Ok(default),
    }
}

fn parse_u64<F>(lookup: &F, key: &str, default: u64) -> AppResult<u64>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    match optional(lookup, key)? {
        Some(v) => v.parse::<u64>().map_err(|_| {
            AppError::InvalidInput(format!("invalid u64 environment variable {key}: '{v}'"))
        }),
        None => Ok(default),
    }
}

fn parse_security<F>(lookup: &F, key: &str) -> AppResult<SmtpSecurity>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    match optional(lookup, key)? {
        None => Ok(SmtpSecurity::StartTls),
        Some(v) => parse_security_value(&v).ok_or_else(|| {
            AppError::InvalidInput(format!(
                "invalid {key}: '{v}', expected 'starttls' or 'tls'"
            ))
        }),
    }
}

fn parse_security_value(value: &str) -> Option<SmtpSecurity> {
    match value.trim().to_ascii_lowercase().as_str() {
        "starttls" => Some(SmtpSecurity::StartTls),
        "tls" | "ssl" | "smtps" => Some(SmtpSecurity::Tls),
        _ => None,
    }
}
