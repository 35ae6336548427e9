//! Outbound mail composition and SMTP submission
//!
//! The visible sender (`From` header and `MAIL FROM`) is resolved per request,
//! while AUTH always uses the configured service account. Recipients are
//! submitted one `RCPT TO` at a time so refusals can be reported per address.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use lettre::address::{Address, Envelope};
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{AsyncSmtpConnection, TlsParameters};
use lettre::transport::smtp::commands::{Data, Mail, Rcpt};
use lettre::transport::smtp::extension::ClientId;
use lettre::Message;
use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

use crate::bridge::{Bridge, Operation};
use crate::config::{ServiceConfig, SmtpSecurity};
use crate::errors::{AppError, AppResult, RejectedRecipient};
use crate::models::{SendEmailInput, non_blank};

/// Resolved visible sender of one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub name: String,
    pub address: Address,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.address)
    }
}

/// A composed message ready for submission
#[derive(Debug)]
pub struct Outgoing {
    pub sender: Sender,
    pub envelope: Envelope,
    pub message: Vec<u8>,
}

/// Pick the visible sender for a request
///
/// Address: request override, then `DEFAULT_EMAIL`, then the auth account.
/// Name: request override, then the configured display name.
pub fn resolve_sender(config: &ServiceConfig, request: &SendEmailInput) -> AppResult<Sender> {
    let address = non_blank(request.sender_email.as_deref())
        .or(config.default_send_as.as_deref())
        .unwrap_or(config.auth_account.as_str());
    let name = non_blank(request.sender_name.as_deref()).unwrap_or(config.display_name.as_str());

    Ok(Sender {
        name: name.to_owned(),
        address: parse_address("sender_email", address)?,
    })
}

/// Validate the request and build headers, body and envelope
///
/// Blank addresses are ignored. The envelope holds `to` then `cc`, each
/// address once.
///
/// # Errors
///
/// - `InvalidInput` if no `to` address remains or any address is malformed
pub fn compose(config: &ServiceConfig, request: &SendEmailInput) -> AppResult<Outgoing> {
    let to = parse_addresses("to", &request.to)?;
    if to.is_empty() {
        return Err(AppError::invalid(
            "At least one recipient email address is required.",
        ));
    }
    let cc = parse_addresses("cc", &request.cc)?;
    let sender = resolve_sender(config, request)?;

    let mut recipients: Vec<Address> = Vec::with_capacity(to.len() + cc.len());
    for address in to.iter().chain(cc.iter()) {
        if !recipients.contains(address) {
            recipients.push(address.clone());
        }
    }
    let envelope = Envelope::new(Some(sender.address.clone()), recipients)
        .map_err(|e| AppError::Internal(format!("failed to build envelope: {e}")))?;

    let mut builder = Message::builder()
        .from(Mailbox::new(Some(sender.name.clone()), sender.address.clone()))
        .subject(request.subject.as_str())
        .envelope(envelope.clone());
    for address in to {
        builder = builder.to(Mailbox::new(None, address));
    }
    for address in cc {
        builder = builder.cc(Mailbox::new(None, address));
    }
    let message = builder
        .multipart(MultiPart::mixed().singlepart(SinglePart::plain(request.content.clone())))
        .map_err(|e| AppError::Internal(format!("failed to build message: {e}")))?;

    Ok(Outgoing {
        sender,
        envelope,
        message: message.formatted(),
    })
}

/// Delivery of a composed message
pub trait Submission {
    /// Submit `message` to every envelope recipient
    ///
    /// Returns the recipients the server refused. An empty vector means
    /// every recipient was accepted.
    fn submit(
        &self,
        envelope: &Envelope,
        message: &[u8],
    ) -> impl Future<Output = AppResult<Vec<RejectedRecipient>>> + Send;
}

/// SMTP submission authenticated as the service account
#[derive(Debug, Clone)]
pub struct SmtpSubmission {
    config: Arc<ServiceConfig>,
}

impl SmtpSubmission {
    pub fn new(config: Arc<ServiceConfig>) -> Self {
        Self { config }
    }

    /// Account used for AUTH, independent of any sender override
    pub fn login_account(&self) -> &str {
        &self.config.auth_account
    }

    async fn connect(&self) -> AppResult<AsyncSmtpConnection> {
        let config = &self.config;
        let host = config.smtp_host.as_str();
        let hello = ClientId::default();
        let tls = TlsParameters::new(host.to_owned())
            .map_err(|e| AppError::InvalidInput(format!("invalid SMTP host for TLS: {e}")))?;

        debug!(host, port = config.smtp_port, security = ?config.smtp_security, "connecting to SMTP server");
        let implicit_tls = match config.smtp_security {
            SmtpSecurity::Tls => Some(tls.clone()),
            SmtpSecurity::StartTls => None,
        };
        let mut conn = AsyncSmtpConnection::connect_tokio1(
            (host, config.smtp_port),
            Some(config.connect_timeout),
            &hello,
            implicit_tls,
            None,
        )
        .await
        .map_err(|e| AppError::Protocol(format!("SMTP connect to {host} failed: {e}")))?;

        if config.smtp_security == SmtpSecurity::StartTls {
            if !conn.can_starttls() {
                conn.abort().await;
                return Err(AppError::Protocol(format!(
                    "{host} does not offer STARTTLS"
                )));
            }
            conn.starttls(tls, &hello)
                .await
                .map_err(|e| AppError::Protocol(format!("STARTTLS failed: {e}")))?;
        }
        Ok(conn)
    }

    async fn transact(
        &self,
        conn: &mut AsyncSmtpConnection,
        envelope: &Envelope,
        message: &[u8],
    ) -> AppResult<Vec<RejectedRecipient>> {
        let credentials = Credentials::new(
            self.login_account().to_owned(),
            self.config.auth_secret.expose_secret().to_owned(),
        );
        conn.auth(&[Mechanism::Plain, Mechanism::Login], &credentials)
            .await
            .map_err(|e| AppError::AuthFailed(e.to_string()))?;

        conn.command(Mail::new(envelope.from().cloned(), vec![]))
            .await
            .map_err(|e| AppError::Protocol(format!("MAIL FROM refused: {e}")))?;

        let mut rejected = Vec::new();
        for address in envelope.to() {
            match conn.command(Rcpt::new(address.clone(), vec![])).await {
                Ok(_) => {}
                Err(e) if e.is_permanent() || e.is_transient() => {
                    debug!(recipient = %address, error = %e, "RCPT TO refused");
                    rejected.push(RejectedRecipient {
                        address: address.to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(AppError::Protocol(format!("RCPT TO failed: {e}"))),
            }
        }

        if rejected.len() == envelope.to().len() {
            let detail = rejected
                .iter()
                .map(|r| format!("{} ({})", r.address, r.reason))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(AppError::Protocol(format!(
                "all recipients were refused: {detail}"
            )));
        }

        conn.command(Data)
            .await
            .map_err(|e| AppError::Protocol(format!("DATA refused: {e}")))?;
        conn.message(message)
            .await
            .map_err(|e| AppError::Protocol(format!("message refused: {e}")))?;
        Ok(rejected)
    }
}

impl Submission for SmtpSubmission {
    async fn submit(&self, envelope: &Envelope, message: &[u8]) -> AppResult<Vec<RejectedRecipient>> {
        let mut conn = self.connect().await?;
        match self.transact(&mut conn, envelope, message).await {
            Ok(rejected) => {
                if let Err(e) = conn.quit().await {
                    debug!(error = %e, "SMTP QUIT failed; ignored");
                }
                Ok(rejected)
            }
            Err(e) => {
                conn.abort().await;
                Err(e)
            }
        }
    }
}

/// Compose and submit one message within the send deadline
///
/// Returns the resolved sender on full delivery.
///
/// # Errors
///
/// - `InvalidInput` before any network call for a bad request
/// - `PartialDelivery` if the message was accepted for only some recipients
/// - `Timeout(Send)` if submission did not finish in time; the message may
///   still have been accepted
pub async fn send_email<S>(
    config: &ServiceConfig,
    submission: &S,
    bridge: &Bridge,
    request: &SendEmailInput,
) -> AppResult<Sender>
where
    S: Submission,
{
    let outgoing = compose(config, request)?;
    let rejected = bridge
        .bounded(
            Operation::Send,
            submission.submit(&outgoing.envelope, &outgoing.message),
        )
        .await?;

    if !rejected.is_empty() {
        warn!(
            sender = %outgoing.sender,
            refused = rejected.len(),
            "message accepted for some recipients only"
        );
        return Err(AppError::PartialDelivery { rejected });
    }

    info!(
        sender = %outgoing.sender,
        recipients = outgoing.envelope.to().len(),
        "email sent"
    );
    Ok(outgoing.sender)
}

fn parse_address(field: &str, raw: &str) -> AppResult<Address> {
    raw.trim().parse::<Address>().map_err(|e| {
        AppError::InvalidInput(format!("{field}: '{}' is not a valid email address ({e})", raw.trim()))
    })
}

fn parse_addresses(field: &str, raw: &[String]) -> AppResult<Vec<Address>> {
    raw.iter()
        .filter(|a| !a.trim().is_empty())
        .map(|a| parse_address(field, a))
        .collect()
}
