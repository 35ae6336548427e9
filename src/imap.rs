//! IMAP transport operations
//!
//! Thin wrappers around `async-imap` that map protocol failures to
//! [`AppError`]. Connection setup carries its own connect/greeting timeouts;
//! the per-operation deadline for search and fetch is applied by
//! [`crate::bridge::Bridge`].

use std::sync::Arc;
use std::time::Duration;

use async_imap::types::Fetch;
use async_imap::{Client, Session};
use futures::TryStreamExt;
use rustls::ClientConfig;
use rustls::RootCertStore;
use rustls_pki_types::ServerName;
use secrecy::ExposeSecret;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::config::ServiceConfig;
use crate::criteria::SearchCriteria;
use crate::errors::{AppError, AppResult};

/// Header fields a search summary needs; the body is never fetched
pub const SUMMARY_FETCH: &str = "UID BODY.PEEK[HEADER.FIELDS (DATE FROM SUBJECT)]";

/// Authenticated IMAP session over TLS
pub type ImapSession = Session<tokio_rustls::client::TlsStream<TcpStream>>;

/// Connect to the IMAP server and authenticate
///
/// Performs the full connection sequence with timeouts:
/// 1. TCP connect (`connect_timeout`)
/// 2. TLS handshake with webpki root certificates (`greeting_timeout`)
/// 3. Read IMAP greeting (`greeting_timeout`)
/// 4. LOGIN with the service account (`greeting_timeout`)
///
/// # Errors
///
/// - `InvalidInput` if the hostname is invalid for TLS SNI
/// - `AuthFailed` if LOGIN is rejected
/// - `Protocol` for TCP, TLS or greeting failures and phase timeouts
pub async fn connect_authenticated(config: &ServiceConfig) -> AppResult<ImapSession> {
    let host = config.imap_host.as_str();
    let greeting_duration = config.greeting_timeout;

    debug!(host, port = config.imap_port, "connecting to IMAP server");
    let tcp = timeout(
        config.connect_timeout,
        TcpStream::connect((host, config.imap_port)),
    )
    .await
    .map_err(|_| AppError::Protocol(format!("tcp connect to {host} timed out")))
    .and_then(|r| r.map_err(|e| AppError::Protocol(format!("tcp connect to {host} failed: {e}"))))?;

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(tls_config));

    let server_name = ServerName::try_from(host.to_owned())
        .map_err(|_| AppError::InvalidInput("invalid IMAP host for TLS SNI".to_owned()))?;
    let tls_stream = timeout(greeting_duration, connector.connect(server_name, tcp))
        .await
        .map_err(|_| AppError::Protocol("TLS handshake timed out".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Protocol(format!("TLS handshake failed: {e}"))))?;

    let mut client = Client::new(tls_stream);
    let greeting = timeout(greeting_duration, client.read_response())
        .await
        .map_err(|_| AppError::Protocol("IMAP greeting timed out".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Protocol(format!("IMAP greeting failed: {e}"))))?;

    if greeting.is_none() {
        return Err(AppError::Protocol(
            "IMAP server closed connection before greeting".to_owned(),
        ));
    }

    let pass = config.auth_secret.expose_secret();
    let session = timeout(
        greeting_duration,
        client.login(config.auth_account.as_str(), pass),
    )
    .await
    .map_err(|_| AppError::Protocol("IMAP login timed out".to_owned()))
    .and_then(|r| {
        r.map_err(|(e, _)| {
            let msg = e.to_string();
            if msg.to_ascii_lowercase().contains("auth") || msg.contains("LOGIN") {
                AppError::AuthFailed(msg)
            } else {
                AppError::Protocol(msg)
            }
        })
    })?;

    debug!(account = %config.auth_account, "IMAP login succeeded");
    Ok(session)
}

/// Select mailbox in read-only mode
///
/// Uses `EXAMINE` so fetching never marks messages as read. The name is
/// encoded to IMAP modified UTF-7 first.
pub async fn examine(session: &mut ImapSession, mailbox: &str, limit: Duration) -> AppResult<()> {
    let encoded = utf7_imap::encode_utf7_imap(mailbox.to_owned());
    timeout(limit, session.examine(&encoded))
        .await
        .map_err(|_| AppError::Protocol(format!("EXAMINE timed out for mailbox '{mailbox}'")))
        .and_then(|r| {
            r.map_err(|e| AppError::NotFound(format!("cannot open mailbox '{mailbox}': {e}")))
        })?;
    Ok(())
}

/// Search for messages matching the criteria
///
/// Runs `UID SEARCH`, prefixed with `CHARSET UTF-8` when the predicate
/// carries non-ASCII text. Returns UIDs in ascending order.
pub async fn uid_search(session: &mut ImapSession, criteria: &SearchCriteria) -> AppResult<Vec<u32>> {
    let query = if criteria.requires_utf8() {
        format!("CHARSET UTF-8 {}", criteria.as_str())
    } else {
        criteria.as_str().to_owned()
    };
    let set = session
        .uid_search(&query)
        .await
        .map_err(|e| AppError::Protocol(format!("uid search failed: {e}")))?;
    let mut uids: Vec<u32> = set.into_iter().collect();
    uids.sort_unstable();
    Ok(uids)
}

/// Fetch a single message with custom query
///
/// # Errors
///
/// - `NotFound` if the UID does not exist in the selected mailbox
pub async fn fetch_one(session: &mut ImapSession, uid: u32, query: &str) -> AppResult<Fetch> {
    let stream = session
        .uid_fetch(uid.to_string(), query)
        .await
        .map_err(|e| AppError::Protocol(format!("uid fetch failed: {e}")))?;
    let fetches: Vec<Fetch> = stream
        .try_collect()
        .await
        .map_err(|e| AppError::Protocol(format!("uid fetch stream failed: {e}")))?;

    fetches
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound(format!("no email with ID {uid} in this folder")))
}

/// Fetch full RFC822 message source
///
/// The mailbox is opened with `EXAMINE`, so `RFC822` does not set `\Seen`.
pub async fn fetch_raw_message(session: &mut ImapSession, uid: u32) -> AppResult<Vec<u8>> {
    let fetch = fetch_one(session, uid, "UID RFC822").await?;
    let body = fetch
        .body()
        .ok_or_else(|| AppError::Protocol("message has no RFC822 body".to_owned()))?;
    Ok(body.to_vec())
}

/// Fetch only the headers a summary needs
///
/// Uses `BODY.PEEK` to avoid marking the message as read.
pub async fn fetch_summary_headers(session: &mut ImapSession, uid: u32) -> AppResult<Vec<u8>> {
    let fetch = fetch_one(session, uid, SUMMARY_FETCH).await?;
    let header_bytes = fetch
        .header()
        .or_else(|| fetch.body())
        .ok_or_else(|| AppError::Protocol("message headers not available".to_owned()))?
        .to_vec();
    Ok(header_bytes)
}

/// Close the selected mailbox
pub async fn close(session: &mut ImapSession, limit: Duration) -> AppResult<()> {
    timeout(limit, session.close())
        .await
        .map_err(|_| AppError::Protocol("CLOSE timed out".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Protocol(format!("CLOSE failed: {e}"))))
}

/// End the IMAP session
pub async fn logout(session: &mut ImapSession, limit: Duration) -> AppResult<()> {
    timeout(limit, session.logout())
        .await
        .map_err(|_| AppError::Protocol("LOGOUT timed out".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Protocol(format!("LOGOUT failed: {e}"))))
}

#[cfg(test)]
mod tests {
    use super::SUMMARY_FETCH;

    #[test]
    fn summary_fetch_peeks_only_summary_headers() {
        assert!(SUMMARY_FETCH.contains("BODY.PEEK["));
        assert!(SUMMARY_FETCH.ends_with("HEADER.FIELDS (DATE FROM SUBJECT)]"));
    }
}
