use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use crate::error::{ApiError, Result};
use crate::http_client::ApiClient;
use crate::models::{Category, Expense, ExpenseCreate, Paginated};
use crate::task::{KeyedTask, Ticket};

pub const EXPENSES_PATH: &str = "/expenses/";
pub const CATEGORIES_PATH: &str = "/categories/";
pub const DEFAULT_ORDERING: &str = "-date";
pub const SAVE_ERROR_FALLBACK: &str = "Failed to save expense. Please try again.";

/// Query string for `GET /expenses/`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpenseQuery {
    pub ordering: Option<String>,
    pub page: Option<u32>,
    pub category: Option<i64>,
}

impl ExpenseQuery {
    /// Newest first, one page, optionally filtered
    pub fn page(page: u32, category: Option<i64>) -> Self {
        Self {
            ordering: Some(DEFAULT_ORDERING.to_string()),
            page: Some(page),
            category,
        }
    }

    /// Newest first, first page, no filter
    pub fn recent() -> Self {
        Self {
            ordering: Some(DEFAULT_ORDERING.to_string()),
            ..Self::default()
        }
    }

    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(ref ordering) = self.ordering {
            pairs.push(("ordering".to_string(), ordering.clone()));
        }
        if let Some(page) = self.page {
            pairs.push(("page".to_string(), page.to_string()));
        }
        if let Some(category) = self.category {
            pairs.push(("category".to_string(), category.to_string()));
        }
        pairs
    }
}

fn expense_path(id: i64) -> String {
    format!("{}{}/", EXPENSES_PATH, id)
}

/// Expense and category endpoints
pub struct ExpenseApi {
    client: Arc<ApiClient>,
}

impl ExpenseApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub async fn list(&self, query: &ExpenseQuery) -> Result<Paginated<Expense>> {
        self.client
            .get_with_query(EXPENSES_PATH, query.to_pairs())
            .await
    }

    pub async fn get(&self, id: i64) -> Result<Expense> {
        self.client.get(&expense_path(id)).await
    }

    pub async fn create(&self, data: &ExpenseCreate) -> Result<Expense> {
        self.client.post(EXPENSES_PATH, data).await
    }

    pub async fn update(&self, id: i64, data: &ExpenseCreate) -> Result<Expense> {
        self.client.put(&expense_path(id), data).await
    }

    /// Create when `id` is `None`, update otherwise (the expense form)
    pub async fn save(&self, id: Option<i64>, data: &ExpenseCreate) -> Result<Expense> {
        match id {
            Some(id) => self.update(id, data).await,
            None => self.create(data).await,
        }
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        self.client.delete(&expense_path(id)).await
    }

    pub async fn categories(&self) -> Result<Vec<Category>> {
        let page: Paginated<Category> = self.client.get(CATEGORIES_PATH).await?;
        Ok(page.results)
    }
}

/// Error text for the expense form
pub fn save_error_message(err: &ApiError) -> String {
    err.user_message(SAVE_ERROR_FALLBACK)
}

/// State behind the expense list page
#[derive(Debug, Clone, PartialEq)]
pub struct ListState {
    pub page: u32,
    pub category: Option<i64>,
    pub expenses: Vec<Expense>,
    pub categories: Vec<Category>,
    pub total_count: u64,
    pub has_next: bool,
    pub has_prev: bool,
    pub is_loading: bool,
}

impl Default for ListState {
    fn default() -> Self {
        Self {
            page: 1,
            category: None,
            expenses: Vec::new(),
            categories: Vec::new(),
            total_count: 0,
            has_next: false,
            has_prev: false,
            is_loading: true,
        }
    }
}

type ListKey = (u32, Option<i64>);

/// Paginated, category-filtered expense list.
///
/// Loads are keyed by `(page, category)`. A load that finishes after the
/// parameters moved on is dropped instead of overwriting newer results.
pub struct ExpenseListView {
    api: Arc<ExpenseApi>,
    state: Mutex<ListState>,
    fetches: KeyedTask<ListKey>,
}

impl ExpenseListView {
    pub fn new(api: Arc<ExpenseApi>) -> Self {
        Self {
            api,
            state: Mutex::new(ListState::default()),
            fetches: KeyedTask::new(),
        }
    }

    pub fn snapshot(&self) -> ListState {
        self.update(|state| state.clone())
    }

    pub fn query(&self) -> ExpenseQuery {
        let (page, category) = self.params();
        ExpenseQuery::page(page, category)
    }

    /// Changing the filter always starts over at page 1
    pub fn set_category(&self, category: Option<i64>) {
        self.update(|state| {
            state.category = category;
            state.page = 1;
        });
    }

    pub fn set_page(&self, page: u32) {
        self.update(|state| state.page = page.max(1));
    }

    pub fn next_page(&self) -> bool {
        self.update(|state| {
            if state.has_next {
                state.page += 1;
            }
            state.has_next
        })
    }

    pub fn prev_page(&self) -> bool {
        self.update(|state| {
            let moved = state.has_prev && state.page > 1;
            if moved {
                state.page -= 1;
            }
            moved
        })
    }

    /// Load the current page in place. Returns whether the result was applied.
    pub async fn load(&self) -> Result<bool> {
        let ticket = self.begin();
        self.run(ticket).await
    }

    /// Load the current page on a background task, aborting any load it supersedes
    pub fn spawn_load(self: &Arc<Self>) -> JoinHandle<Result<bool>> {
        let ticket = self.begin();
        let view = Arc::clone(self);
        let running = ticket.clone();
        let handle = tokio::spawn(async move { view.run(running).await });
        self.fetches.attach(&ticket, handle.abort_handle());
        handle
    }

    pub async fn load_categories(&self) -> Result<()> {
        let categories = self.api.categories().await?;
        self.update(|state| state.categories = categories);
        Ok(())
    }

    /// Delete on the backend, then drop the row locally
    pub async fn delete(&self, id: i64) -> Result<()> {
        self.api.delete(id).await?;
        self.update(|state| {
            let before = state.expenses.len();
            state.expenses.retain(|e| e.id != id);
            if state.expenses.len() < before {
                state.total_count = state.total_count.saturating_sub(1);
            }
        });
        Ok(())
    }

    fn params(&self) -> ListKey {
        self.update(|state| (state.page, state.category))
    }

    fn begin(&self) -> Ticket<ListKey> {
        let ticket = self.fetches.begin(self.params());
        self.update(|state| state.is_loading = true);
        ticket
    }

    async fn run(&self, ticket: Ticket<ListKey>) -> Result<bool> {
        let (page, category) = *ticket.key();
        if !self.fetches.is_current(&ticket) {
            return Ok(false);
        }
        let result = self.api.list(&ExpenseQuery::page(page, category)).await;

        if !self.fetches.finish(&ticket) {
            tracing::debug!(page, ?category, "Discarding superseded expense page");
            return Ok(false);
        }

        self.update(|state| state.is_loading = false);
        let data = result?;
        self.update(|state| {
            state.has_next = data.has_next();
            state.has_prev = data.has_previous();
            state.total_count = data.count;
            state.expenses = data.results;
        });
        Ok(true)
    }

    fn update<R>(&self, f: impl FnOnce(&mut ListState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut state)
    }
}
