use serde::{Deserialize, Serialize};

/// Natural-language question about the user's expenses
#[derive(Debug, Clone, Serialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse {
    pub query: String,
    pub response: String,
}
