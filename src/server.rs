//! MCP server implementation with tool handlers
//!
//! Registers the four mail tools. Each handler offloads its invocation to a
//! worker task through [`Bridge`], then renders the outcome as text. Failures
//! become error-flagged tool results, never protocol faults.

use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, ErrorData, ServerCapabilities, ServerInfo};
use rmcp::{ServerHandler, tool, tool_handler, tool_router};
use tracing::{debug, warn};

use crate::bridge::Bridge;
use crate::config::ServiceConfig;
use crate::criteria::build_search_criteria;
use crate::daily::{self, DayRange};
use crate::errors::AppResult;
use crate::models::{
    CountDailyEmailsInput, DayCount, EmailContent, EmailSummary, GetEmailContentInput,
    SearchEmailsInput, SendEmailInput, non_blank,
};
use crate::query;
use crate::render::{self, Tool};
use crate::session::{self, MailSession};
use crate::smtp::{self, Sender, SmtpSubmission};

const SEARCH_TOOL: &str = "search-emails";
const CONTENT_TOOL: &str = "get-email-content";
const COUNT_TOOL: &str = "count-daily-emails";
const SEND_TOOL: &str = "send-email";

/// Mail bridge MCP server
///
/// Holds the shared read-only configuration and the deadline bridge. No
/// connection state lives here; every invocation opens its own session.
#[derive(Clone)]
pub struct MailBridgeServer {
    config: Arc<ServiceConfig>,
    bridge: Bridge,
    /// Tool router for dispatching MCP tool calls
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl MailBridgeServer {
    pub fn new(config: ServiceConfig) -> Self {
        let bridge = Bridge::new(config.operation_timeout);
        Self {
            config: Arc::new(config),
            bridge,
            tool_router: Self::tool_router(),
        }
    }

    /// Tool: Search emails by date window and keyword
    ///
    /// Returns at most 100 summaries, newest first.
    #[tool(
        name = "search-emails",
        description = "Search emails within a date range and/or with specific keywords"
    )]
    async fn search_emails(
        &self,
        Parameters(input): Parameters<SearchEmailsInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        let result = self
            .bridge
            .offload(SEARCH_TOOL, search_impl(Arc::clone(&self.config), self.bridge, input))
            .await
            .map(|emails| render::search_results(&emails));
        finalize_tool(SEARCH_TOOL, Tool::Search, started, result)
    }

    /// Tool: Fetch one message by the ID listed in search results
    #[tool(
        name = "get-email-content",
        description = "Get the full content of a specific email by its ID"
    )]
    async fn get_email_content(
        &self,
        Parameters(input): Parameters<GetEmailContentInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        let result = self
            .bridge
            .offload(CONTENT_TOOL, content_impl(Arc::clone(&self.config), self.bridge, input))
            .await
            .map(|email| render::email_content(&email));
        finalize_tool(CONTENT_TOOL, Tool::Content, started, result)
    }

    /// Tool: Per-day message counts over an inclusive date range
    #[tool(
        name = "count-daily-emails",
        description = "Count emails received for each day in a date range"
    )]
    async fn count_daily_emails(
        &self,
        Parameters(input): Parameters<CountDailyEmailsInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        let result = self
            .bridge
            .offload(COUNT_TOOL, count_impl(Arc::clone(&self.config), self.bridge, input))
            .await
            .map(|rows| render::daily_counts(&rows));
        finalize_tool(COUNT_TOOL, Tool::Count, started, result)
    }

    /// Tool: Send a confirmed message over SMTP
    ///
    /// Authenticates as the service account; the visible sender may differ.
    #[tool(
        name = "send-email",
        description = "CONFIRMATION STEP: Actually send the email after user confirms the details. Before calling this, first show the email details to the user for confirmation. Required fields: recipients (to), subject, and content. Optional: CC recipients, sender_email, and sender_name."
    )]
    async fn send_email(
        &self,
        Parameters(input): Parameters<SendEmailInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        let result = self
            .bridge
            .offload(SEND_TOOL, send_impl(Arc::clone(&self.config), self.bridge, input))
            .await
            .map(|sender| render::email_sent(&sender));
        finalize_tool(SEND_TOOL, Tool::Send, started, result)
    }
}

/// MCP server handler implementation
///
/// Provides server info and capabilities to MCP client.
#[tool_handler(router = self.tool_router)]
impl ServerHandler for MailBridgeServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build()).with_instructions(
            "Email bridge over IMAP and SMTP. Use search-emails to list messages, get-email-content to read one by ID, count-daily-emails for per-day totals, and send-email only after the user has confirmed recipients, subject and content.",
        )
    }
}

async fn search_impl(
    config: Arc<ServiceConfig>,
    bridge: Bridge,
    input: SearchEmailsInput,
) -> AppResult<Vec<EmailSummary>> {
    let criteria = build_search_criteria(
        non_blank(input.start_date.as_deref()),
        non_blank(input.end_date.as_deref()),
        non_blank(input.keyword.as_deref()),
        Local::now().date_naive(),
    )?;
    debug!(criteria = criteria.as_str(), folder = ?input.folder, "search criteria built");

    let mut session = MailSession::open(&config, input.folder).await?;
    let result = query::search_emails(&mut session, &bridge, &criteria).await;
    session::finish(session, result).await
}

async fn content_impl(
    config: Arc<ServiceConfig>,
    bridge: Bridge,
    input: GetEmailContentInput,
) -> AppResult<EmailContent> {
    let uid = query::parse_email_id(&input.email_id)?;

    let mut session = MailSession::open(&config, input.folder).await?;
    let result = query::get_email_content(&mut session, &bridge, uid).await;
    session::finish(session, result).await
}

async fn count_impl(
    config: Arc<ServiceConfig>,
    bridge: Bridge,
    input: CountDailyEmailsInput,
) -> AppResult<Vec<DayCount>> {
    let range = DayRange::parse(&input.start_date, &input.end_date)?;

    let config = config.as_ref();
    let folder = input.folder;
    daily::count_daily(|| MailSession::open(config, folder), &bridge, &range).await
}

async fn send_impl(
    config: Arc<ServiceConfig>,
    bridge: Bridge,
    input: SendEmailInput,
) -> AppResult<Sender> {
    let submission = SmtpSubmission::new(Arc::clone(&config));
    smtp::send_email(&config, &submission, &bridge, &input).await
}

/// Calculate elapsed milliseconds
fn duration_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

/// Turn an invocation outcome into a text tool result
///
/// Errors are rendered into an `is_error` result so the caller always gets
/// readable text back.
fn finalize_tool(
    name: &'static str,
    tool: Tool,
    started: Instant,
    result: AppResult<String>,
) -> Result<CallToolResult, ErrorData> {
    match result {
        Ok(text) => {
            debug!(tool = name, duration_ms = duration_ms(started), "tool succeeded");
            Ok(CallToolResult::success(vec![Content::text(text)]))
        }
        Err(e) => {
            if e.is_validation() {
                debug!(tool = name, error = %e, "tool rejected input");
            } else {
                warn!(tool = name, error = %e, duration_ms = duration_ms(started), "tool failed");
            }
            Ok(CallToolResult::error(vec![Content::text(render::failure(
                tool, &e,
            ))]))
        }
    }
}
