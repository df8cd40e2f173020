//! The todo resource.

use chrono::{DateTime, SecondsFormat, Utc};
use errand_core::{ErrandError, ErrandResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Identifier of a stored todo.
pub type TodoId = u64;

/// Maximum length of a todo name, in characters.
pub const MAX_NAME_LEN: usize = 64;

/// Maximum length of a todo task, in characters.
pub const MAX_TASK_LEN: usize = 250;

const INVALID_REQUEST: &str = "invalid request";

/// A stored todo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    /// Identifier, assigned on creation.
    pub id: TodoId,
    /// Short name.
    pub name: String,
    /// Task description.
    pub task: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl Todo {
    /// Renders the public representation `{url, name, task, timestamp}`.
    ///
    /// This value is what item ETags are computed over, so it must only
    /// depend on stored state.
    pub fn to_json(&self, urls: &ResourceUrls) -> Value {
        json!({
            "url": urls.todo(self.id),
            "name": self.name,
            "task": self.task,
            "timestamp": self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        })
    }
}

/// Client-supplied fields of a todo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoInput {
    /// Short name.
    pub name: String,
    /// Task description.
    pub task: String,
}

impl TodoInput {
    /// Creates an input from already-validated fields.
    pub fn new(name: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            task: task.into(),
        }
    }

    /// Parses a JSON request body.
    ///
    /// # Errors
    ///
    /// `ErrandError::Validation` when the body is not a JSON object, when
    /// `name` or `task` is missing or not a string, or when a field is too
    /// long.
    pub fn from_json(body: &[u8]) -> ErrandResult<Self> {
        let value: Value =
            serde_json::from_slice(body).map_err(|_| ErrandError::validation(INVALID_REQUEST))?;
        let Value::Object(fields) = value else {
            return Err(ErrandError::validation(INVALID_REQUEST));
        };

        Ok(Self {
            name: text_field(&fields, "name", MAX_NAME_LEN)?,
            task: text_field(&fields, "task", MAX_TASK_LEN)?,
        })
    }
}

fn text_field(fields: &Map<String, Value>, name: &str, max_len: usize) -> ErrandResult<String> {
    match fields.get(name) {
        None => Err(ErrandError::validation(format!("Invalid todo: missing {name}"))),
        Some(Value::String(text)) if text.chars().count() > max_len => Err(
            ErrandError::validation(format!("Invalid todo: {name} longer than {max_len} characters")),
        ),
        Some(Value::String(text)) => Ok(text.clone()),
        Some(_) => Err(ErrandError::validation(format!(
            "Invalid todo: {name} must be a string"
        ))),
    }
}

/// Builds absolute resource URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceUrls {
    public_url: String,
    api_prefix: String,
}

impl ResourceUrls {
    /// Creates a builder. Trailing slashes on either part are dropped.
    pub fn new(public_url: impl Into<String>, api_prefix: impl Into<String>) -> Self {
        let trim = |s: String| s.trim_end_matches('/').to_string();
        Self {
            public_url: trim(public_url.into()),
            api_prefix: trim(api_prefix.into()),
        }
    }

    /// Returns the externally visible origin.
    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    /// Path of the todo collection, with its trailing slash.
    pub fn todos_path(&self) -> String {
        format!("{}/todos/", self.api_prefix)
    }

    /// Path template of a single todo.
    pub fn todo_pattern(&self) -> String {
        format!("{}/todos/{{id}}", self.api_prefix)
    }

    /// Canonical URL of one todo.
    pub fn todo(&self, id: TodoId) -> String {
        format!("{}{}/todos/{id}", self.public_url, self.api_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn urls() -> ResourceUrls {
        ResourceUrls::new("http://localhost/", "/api/v1.0")
    }

    #[test]
    fn test_representation() {
        let todo = Todo {
            id: 3,
            name: "buy".to_string(),
            task: "buy groceries".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        };

        assert_eq!(
            todo.to_json(&urls()),
            json!({
                "url": "http://localhost/api/v1.0/todos/3",
                "name": "buy",
                "task": "buy groceries",
                "timestamp": "2024-05-01T12:00:00Z",
            })
        );
    }

    #[test]
    fn test_paths() {
        let urls = urls();
        assert_eq!(urls.todos_path(), "/api/v1.0/todos/");
        assert_eq!(urls.todo_pattern(), "/api/v1.0/todos/{id}");
        assert_eq!(urls.public_url(), "http://localhost");
    }

    #[test]
    fn test_parse_input() {
        let input = TodoInput::from_json(br#"{"name": "one", "task": "sth", "extra": 1}"#).unwrap();
        assert_eq!(input, TodoInput::new("one", "sth"));
    }

    #[test]
    fn test_parse_errors() {
        let message = |body: &[u8]| TodoInput::from_json(body).unwrap_err().public_message().to_string();

        assert_eq!(message(br#"{"task": "sth"}"#), "Invalid todo: missing name");
        assert_eq!(message(br#"{"name": "one"}"#), "Invalid todo: missing task");
        assert_eq!(message(br#"{"name": 1, "task": "sth"}"#), "Invalid todo: name must be a string");
        assert_eq!(message(b"not json"), "invalid request");
        assert_eq!(message(b""), "invalid request");
        assert_eq!(message(b"[1, 2]"), "invalid request");

        let long = format!(r#"{{"name": "{}", "task": "sth"}}"#, "x".repeat(65));
        assert!(message(long.as_bytes()).contains("longer than 64"));
    }
}
