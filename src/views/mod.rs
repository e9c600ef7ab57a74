// Page-level state consuming the session and API client

pub mod ask;
pub mod dashboard;
pub mod expenses;

pub use ask::{AskAi, Message, Role};
pub use dashboard::{load_dashboard, DashboardSummary};
pub use expenses::{save_error_message, ExpenseApi, ExpenseListView, ExpenseQuery, ListState};
