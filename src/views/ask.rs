use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::http_client::ApiClient;
use crate::models::{QueryRequest, QueryResponse};

pub const QUERY_PATH: &str = "/query/";

pub const QUERY_ERROR_REPLY: &str =
    "Sorry, I encountered an error processing your request. Please try again.";

pub const SUGGESTED_QUESTIONS: [&str; 4] = [
    "How much did I spend this month?",
    "What are my biggest expense categories?",
    "Show me my spending trends",
    "Where can I cut back on expenses?",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Clears the pending flag even if the asking task is dropped mid-flight
struct Pending<'a>(&'a AtomicBool);

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Chat transcript for "ask AI about my expenses"
pub struct AskAi {
    client: Arc<ApiClient>,
    messages: Mutex<Vec<Message>>,
    pending: AtomicBool,
}

impl AskAi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self {
            client,
            messages: Mutex::new(Vec::new()),
            pending: AtomicBool::new(false),
        }
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().clone()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// Ask a question and return the assistant's reply.
    ///
    /// Blank input, or input submitted while a question is still
    /// outstanding, is ignored and yields `None`. Backend failures become
    /// the apology reply rather than an error.
    pub async fn ask(&self, input: &str) -> Option<Message> {
        let query = input.trim();
        if query.is_empty() {
            return None;
        }
        if self.pending.swap(true, Ordering::SeqCst) {
            tracing::debug!("Ignoring question while another is pending");
            return None;
        }
        let _pending = Pending(&self.pending);

        self.push(Message::new(Role::User, query));

        let request = QueryRequest {
            query: query.to_string(),
        };
        let reply = match self
            .client
            .post::<_, QueryResponse>(QUERY_PATH, &request)
            .await
        {
            Ok(data) => Message::new(Role::Assistant, data.response),
            Err(e) => {
                tracing::error!("Failed to query AI: {}", e);
                Message::new(Role::Assistant, QUERY_ERROR_REPLY)
            }
        };

        self.push(reply.clone());
        Some(reply)
    }

    fn push(&self, message: Message) {
        self.lock().push(message);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Message>> {
        self.messages.lock().unwrap_or_else(|p| p.into_inner())
    }
}
