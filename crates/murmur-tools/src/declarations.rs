//! Tool declarations advertised to the remote model at session setup.

use murmur_types::ToolDeclaration;
use serde_json::{json, Value};

use crate::capability::{
    CHECK_CALENDAR, GET_CURRENT_TIME, LIST_EMAILS, SCHEDULE_EVENT, SEARCH_HISTORY, SEND_EMAIL,
};

fn declaration(name: &str, description: &str, parameters: Value) -> ToolDeclaration {
    ToolDeclaration {
        name: name.to_string(),
        description: description.to_string(),
        parameters,
    }
}

fn string_param(description: &str) -> Value {
    json!({ "type": "STRING", "description": description })
}

/// Declarations for every tool `capability::execute` understands.
pub fn default_tool_declarations() -> Vec<ToolDeclaration> {
    vec![
        declaration(
            GET_CURRENT_TIME,
            "Get the current date and time of the user.",
            json!({
                "type": "OBJECT",
                "properties": {
                    "includeTimezone": {
                        "type": "BOOLEAN",
                        "description": "Whether to include the timezone in the response."
                    }
                }
            }),
        ),
        declaration(
            SEARCH_HISTORY,
            "Search through the user's past conversation history for a specific topic or keyword.",
            json!({
                "type": "OBJECT",
                "properties": {
                    "query": string_param("The topic or keyword to search for.")
                },
                "required": ["query"]
            }),
        ),
        declaration(
            CHECK_CALENDAR,
            "Check the user's calendar for events on a specific date.",
            json!({
                "type": "OBJECT",
                "properties": {
                    "date": string_param(
                        "The date to check (YYYY-MM-DD). If unspecified, defaults to today."
                    )
                }
            }),
        ),
        declaration(
            SCHEDULE_EVENT,
            "Schedule a new event on the user's calendar.",
            json!({
                "type": "OBJECT",
                "properties": {
                    "title": string_param("The title or description of the event."),
                    "date": string_param("The date of the event (YYYY-MM-DD)."),
                    "time": string_param("The time of the event (e.g., \"14:00\" or \"2 PM\").")
                },
                "required": ["title", "date", "time"]
            }),
        ),
        declaration(
            LIST_EMAILS,
            "List or search emails in the user's inbox.",
            json!({
                "type": "OBJECT",
                "properties": {
                    "query": string_param("Optional search query for sender or subject.")
                }
            }),
        ),
        declaration(
            SEND_EMAIL,
            "Send an email to a specific recipient.",
            json!({
                "type": "OBJECT",
                "properties": {
                    "to": string_param("The recipient's email address."),
                    "subject": string_param("The subject line of the email."),
                    "body": string_param("The main content/body of the email.")
                },
                "required": ["to", "subject", "body"]
            }),
        ),
    ]
}
