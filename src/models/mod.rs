// Data models mirrored from the backend schema

pub mod expense;
pub mod query;

pub use expense::{Category, Expense, ExpenseCreate, Paginated};
pub use query::{QueryRequest, QueryResponse};
