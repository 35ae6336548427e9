//! Worker offload and per-operation deadlines
//!
//! Every tool invocation runs on its own runtime task so the MCP dispatcher
//! only ever awaits a join handle. Inside the task, each protocol operation
//! is wrapped with the configured deadline.
//!
//! # Cancellation
//!
//! The wrapped operations are async socket futures, so deadline expiry drops
//! them and no further bytes are exchanged. That does not make the outcome
//! known: a SEARCH may have completed server-side, and a message may already
//! have been accepted after `DATA` when the send future is dropped. Callers
//! treat [`AppError::Timeout`] as "result unknown", never "aborted".

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{Instrument, info_span, warn};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};

/// Protocol operation subject to a deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `UID SEARCH` for the search tool
    Search,
    /// Header fetches for every search hit
    FetchMany,
    /// Full message fetch for one id
    FetchOne,
    /// `UID SEARCH` used only for its hit count
    Count,
    /// SMTP submission
    Send,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Search => "search",
            Self::FetchMany => "fetch email summaries",
            Self::FetchOne => "fetch email content",
            Self::Count => "count",
            Self::Send => "send email",
        };
        f.write_str(name)
    }
}

/// Deadline-bounded executor for protocol operations
#[derive(Debug, Clone, Copy)]
pub struct Bridge {
    deadline: Duration,
}

impl Bridge {
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    /// Run one operation, failing with `Timeout(op)` once the deadline passes
    pub async fn bounded<T, F>(&self, op: Operation, fut: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        match timeout(self.deadline, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    operation = %op,
                    deadline_ms = self.deadline.as_millis() as u64,
                    "operation deadline expired; server-side outcome unknown"
                );
                Err(AppError::Timeout(op))
            }
        }
    }

    /// Run a whole invocation on a runtime worker task
    ///
    /// The task carries a tracing span with the tool name and a fresh
    /// invocation id. A panic inside the task is reported as
    /// `AppError::Internal` instead of unwinding into the dispatcher.
    pub async fn offload<T, F>(&self, tool: &'static str, fut: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let span = info_span!("invocation", tool, id = %Uuid::new_v4());
        match tokio::spawn(fut.instrument(span)).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(AppError::Internal(format!(
                "{tool} worker panicked"
            ))),
            Err(e) => Err(AppError::Internal(format!("{tool} worker failed: {e}"))),
        }
    }
}
