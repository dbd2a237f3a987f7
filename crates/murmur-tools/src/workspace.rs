//! In-memory calendar, inbox, and conversation history.
//!
//! Good enough to drive a voice session end to end without any external
//! service. Sent mail is recorded, not delivered.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::info;
use uuid::Uuid;

use crate::capability::{today, CalendarEvent, Capabilities, Email};
use crate::error::ToolError;

const HISTORY_HIT_LIMIT: usize = 5;
const HISTORY_SNIPPET_CHARS: usize = 60;

/// A message recorded by `send_email`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Default)]
struct WorkspaceData {
    history: Vec<String>,
    events: Vec<CalendarEvent>,
    emails: Vec<Email>,
    sent: Vec<SentEmail>,
}

/// `Capabilities` backed by plain vectors.
#[derive(Debug, Default)]
pub struct InMemoryWorkspace {
    data: RwLock<WorkspaceData>,
}

impl InMemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// A workspace with a few events and messages to talk about.
    pub fn demo() -> Self {
        let today = today();
        let workspace = Self::new();
        workspace.push_event("Team standup", &today, "09:30");
        workspace.push_event("Dentist", &today, "16:00");
        workspace.push_email(Email {
            id: "1".into(),
            from: "alice@example.com".into(),
            subject: "Quarterly planning".into(),
            snippet: "Can we move the planning review to Thursday?".into(),
            is_read: false,
        });
        workspace.push_email(Email {
            id: "2".into(),
            from: "billing@example.com".into(),
            subject: "Your invoice is ready".into(),
            snippet: "Invoice #2041 for October is attached.".into(),
            is_read: true,
        });
        workspace
    }

    fn read(&self) -> RwLockReadGuard<'_, WorkspaceData> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, WorkspaceData> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a conversation message for `search_history`.
    pub fn push_history(&self, text: impl Into<String>) {
        self.write().history.push(text.into());
    }

    pub fn push_event(&self, title: &str, date: &str, time: &str) -> CalendarEvent {
        let event = CalendarEvent {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            date: date.to_string(),
            time: time.to_string(),
        };
        self.write().events.push(event.clone());
        event
    }

    pub fn push_email(&self, email: Email) {
        self.write().emails.push(email);
    }

    pub fn events(&self) -> Vec<CalendarEvent> {
        self.read().events.clone()
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.read().sent.clone()
    }
}

impl Capabilities for InMemoryWorkspace {
    fn search_history(&self, query: &str) -> Result<String, ToolError> {
        let needle = query.to_lowercase();
        let hits: Vec<String> = self
            .read()
            .history
            .iter()
            .filter(|text| text.to_lowercase().contains(&needle))
            .take(HISTORY_HIT_LIMIT)
            .map(|text| text.chars().take(HISTORY_SNIPPET_CHARS).collect())
            .collect();
        if hits.is_empty() {
            Ok("No history matches.".to_string())
        } else {
            Ok(hits.join("\n"))
        }
    }

    fn list_events(&self, date: Option<&str>) -> Result<Vec<CalendarEvent>, ToolError> {
        let target = date.map_or_else(today, str::to_string);
        Ok(self
            .read()
            .events
            .iter()
            .filter(|e| e.date == target)
            .cloned()
            .collect())
    }

    fn add_event(&self, title: &str, date: &str, time: &str) -> Result<String, ToolError> {
        self.push_event(title, date, time);
        info!(title, date, time, "calendar event added");
        Ok(format!("Event '{title}' scheduled for {date} at {time}."))
    }

    fn list_emails(&self, query: Option<&str>) -> Result<Vec<Email>, ToolError> {
        let data = self.read();
        let Some(query) = query else {
            return Ok(data.emails.clone());
        };
        let needle = query.to_lowercase();
        Ok(data
            .emails
            .iter()
            .filter(|e| {
                e.from.to_lowercase().contains(&needle)
                    || e.subject.to_lowercase().contains(&needle)
                    || e.snippet.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }

    fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<String, ToolError> {
        self.write().sent.push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        info!(to, subject, "email sent");
        Ok(format!("Email sent to {to} successfully."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_search_is_case_insensitive_and_capped() {
        let ws = InMemoryWorkspace::new();
        for i in 0..8 {
            ws.push_history(format!("Trip to LISBON number {i} {}", "x".repeat(80)));
        }
        ws.push_history("unrelated");

        let out = ws.search_history("lisbon").unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines.iter().all(|l| l.chars().count() == 60));
        assert!(lines[0].starts_with("Trip to LISBON number 0"));
    }

    #[test]
    fn history_search_without_hits() {
        let ws = InMemoryWorkspace::new();
        ws.push_history("hello");
        assert_eq!(ws.search_history("goodbye").unwrap(), "No history matches.");
    }

    #[test]
    fn events_default_to_today() {
        let ws = InMemoryWorkspace::new();
        ws.push_event("Lunch", &today(), "12:00");
        ws.push_event("Flight", "2099-01-01", "06:00");

        let todays = ws.list_events(None).unwrap();
        assert_eq!(todays.len(), 1);
        assert_eq!(todays[0].title, "Lunch");
        assert_eq!(ws.list_events(Some("2099-01-01")).unwrap()[0].title, "Flight");
    }

    #[test]
    fn added_event_is_visible_to_later_calls() {
        let ws = InMemoryWorkspace::new();
        let msg = ws.add_event("Review", "2030-05-01", "2 PM").unwrap();
        assert_eq!(msg, "Event 'Review' scheduled for 2030-05-01 at 2 PM.");
        assert_eq!(ws.list_events(Some("2030-05-01")).unwrap().len(), 1);
    }

    #[test]
    fn email_filter_matches_sender_subject_or_snippet() {
        let ws = InMemoryWorkspace::demo();
        assert_eq!(ws.list_emails(None).unwrap().len(), 2);
        assert_eq!(ws.list_emails(Some("ALICE")).unwrap().len(), 1);
        assert_eq!(ws.list_emails(Some("invoice")).unwrap()[0].id, "2");
        assert_eq!(ws.list_emails(Some("thursday")).unwrap()[0].id, "1");
        assert!(ws.list_emails(Some("nothing")).unwrap().is_empty());
    }

    #[test]
    fn sent_mail_is_recorded() {
        let ws = InMemoryWorkspace::new();
        let msg = ws.send_email("bob@example.com", "Hi", "See you").unwrap();
        assert_eq!(msg, "Email sent to bob@example.com successfully.");
        assert_eq!(ws.sent()[0].to, "bob@example.com");
    }
}
