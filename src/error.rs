// Error handling module
// Defines the error taxonomy surfaced to callers of the API client

use serde_json::Value;
use thiserror::Error;

/// Errors that can occur while talking to the expense backend
#[derive(Error, Debug)]
pub enum ApiError {
    /// No response was received (connection refused, DNS, reset...)
    #[error("Network error: {0}")]
    Network(String),

    /// Backend answered with a non-2xx status; payload kept verbatim
    #[error("API error: {status} - {body}")]
    Status { status: u16, body: Value },

    /// 2xx response whose body did not match the expected shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// Token storage failure
    #[error("Token storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// HTTP status of the backend response, if there was one
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Message suitable for showing next to a form.
    ///
    /// Field-keyed validation payloads such as
    /// `{"password": ["Password fields didn't match."]}` are flattened in
    /// payload order and joined with a single space. Anything without a
    /// usable backend message falls back to `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        let ApiError::Status { body, .. } = self else {
            return fallback.to_string();
        };

        let mut messages = Vec::new();
        collect_messages(body, &mut messages);

        if messages.is_empty() {
            fallback.to_string()
        } else {
            messages.join(" ")
        }
    }
}

fn collect_messages(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) if !s.trim().is_empty() => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|item| collect_messages(item, out)),
        Value::Object(map) => map.values().for_each(|item| collect_messages(item, out)),
        Value::Number(n) => out.push(n.to_string()),
        Value::Bool(b) => out.push(b.to_string()),
        _ => {}
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::Storage(err.to_string())
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ApiError>;
