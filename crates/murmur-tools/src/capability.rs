//! Host capabilities the remote model can call, and the name-based
//! dispatch that maps wire tool names onto them.

use chrono::{Local, Utc};
use murmur_types::ToolInvocation;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ToolError;

/// A calendar entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    /// `YYYY-MM-DD`.
    pub date: String,
    pub time: String,
}

/// An inbox message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Email {
    pub id: String,
    pub from: String,
    pub subject: String,
    pub snippet: String,
    #[serde(default)]
    pub is_read: bool,
}

/// Wall-clock reading returned by `getCurrentTime`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentTime {
    /// Human-readable local date and time.
    pub datetime: String,
    /// `YYYY-MM-DD` in UTC.
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl CurrentTime {
    pub fn now(include_timezone: bool) -> Self {
        let local = Local::now();
        Self {
            datetime: local.format("%-m/%-d/%Y, %-I:%M:%S %p").to_string(),
            date: today(),
            timezone: include_timezone.then(|| local.format("UTC%:z").to_string()),
        }
    }
}

/// Today's date as `YYYY-MM-DD` (UTC).
pub fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// Side-effecting operations supplied by the host application.
///
/// Implementations run on the blocking thread pool and may take their time;
/// they are never called from the audio path.
pub trait Capabilities: Send + Sync {
    fn current_time(&self, include_timezone: bool) -> Result<CurrentTime, ToolError> {
        Ok(CurrentTime::now(include_timezone))
    }

    /// Searches past conversations. Returns display text, one hit per line.
    fn search_history(&self, query: &str) -> Result<String, ToolError>;

    /// Events on `date`, or on today when `None`.
    fn list_events(&self, date: Option<&str>) -> Result<Vec<CalendarEvent>, ToolError>;

    /// Adds an event and returns a confirmation sentence.
    fn add_event(&self, title: &str, date: &str, time: &str) -> Result<String, ToolError>;

    /// Inbox messages matching `query`, or all of them when `None`.
    fn list_emails(&self, query: Option<&str>) -> Result<Vec<Email>, ToolError>;

    /// Sends a message and returns a confirmation sentence.
    fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<String, ToolError>;
}

pub const GET_CURRENT_TIME: &str = "getCurrentTime";
pub const SEARCH_HISTORY: &str = "searchHistory";
pub const CHECK_CALENDAR: &str = "checkCalendar";
pub const SCHEDULE_EVENT: &str = "scheduleEvent";
pub const LIST_EMAILS: &str = "listEmails";
pub const SEND_EMAIL: &str = "sendEmail";

fn required<'a>(invocation: &'a ToolInvocation, key: &str) -> Result<&'a str, ToolError> {
    invocation
        .arg_str(key)
        .ok_or_else(|| ToolError::InvalidArguments {
            tool: invocation.name.clone(),
            reason: format!("missing string argument '{key}'"),
        })
}

/// Optional string argument; empty strings count as absent.
fn optional<'a>(invocation: &'a ToolInvocation, key: &str) -> Option<&'a str> {
    invocation.arg_str(key).filter(|s| !s.is_empty())
}

/// Runs `invocation` against `capabilities` and builds the response payload.
///
/// Unknown tool names are not an error: they produce
/// `{"error": "Function <name> not found"}` like any other reply.
///
/// # Errors
///
/// `InvalidArguments` if the arguments are not an object or a required one
/// is missing, or whatever the capability reports.
pub fn execute(
    capabilities: &dyn Capabilities,
    invocation: &ToolInvocation,
) -> Result<Value, ToolError> {
    if !invocation.has_object_args() {
        return Err(ToolError::InvalidArguments {
            tool: invocation.name.clone(),
            reason: format!("arguments must be an object, got {}", invocation.args),
        });
    }
    let payload = match invocation.name.as_str() {
        GET_CURRENT_TIME => {
            let include_timezone = invocation.arg_bool("includeTimezone").unwrap_or(false);
            serde_json::to_value(capabilities.current_time(include_timezone)?)
                .map_err(|e| ToolError::Capability(e.to_string()))?
        }
        SEARCH_HISTORY => {
            let results = capabilities.search_history(required(invocation, "query")?)?;
            json!({ "results": results })
        }
        CHECK_CALENDAR => {
            let date = optional(invocation, "date");
            let events = capabilities.list_events(date)?;
            let events = if events.is_empty() {
                json!("No events found.")
            } else {
                json!(events)
            };
            json!({ "date": date.unwrap_or("today"), "events": events })
        }
        SCHEDULE_EVENT => {
            let confirmation = capabilities.add_event(
                required(invocation, "title")?,
                required(invocation, "date")?,
                required(invocation, "time")?,
            )?;
            json!({ "result": confirmation })
        }
        LIST_EMAILS => {
            let emails = capabilities.list_emails(optional(invocation, "query"))?;
            let emails = if emails.is_empty() {
                json!("No emails found matching your query.")
            } else {
                json!(emails)
            };
            json!({ "emails": emails })
        }
        SEND_EMAIL => {
            let status = capabilities.send_email(
                required(invocation, "to")?,
                required(invocation, "subject")?,
                required(invocation, "body")?,
            )?;
            json!({ "result": status })
        }
        other => json!({ "error": format!("Function {other} not found") }),
    };
    Ok(payload)
}
