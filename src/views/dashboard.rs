use crate::error::Result;
use crate::models::{Category, Expense};

use super::expenses::{ExpenseApi, ExpenseQuery};

/// Number of recent expenses the dashboard shows
pub const RECENT_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSummary {
    pub recent: Vec<Expense>,
    pub categories: Vec<Category>,
    /// Sum over `recent`
    pub total: f64,
    /// Per-category sums over `recent`, in first-seen order
    pub by_category: Vec<(String, f64)>,
}

impl DashboardSummary {
    pub fn from_parts(mut expenses: Vec<Expense>, categories: Vec<Category>) -> Self {
        expenses.truncate(RECENT_LIMIT);

        let mut total = 0.0;
        let mut by_category: Vec<(String, f64)> = Vec::new();
        for expense in &expenses {
            let amount = expense.amount_value();
            total += amount;

            let label = expense.category_label();
            match by_category.iter_mut().find(|(name, _)| name == label) {
                Some((_, sum)) => *sum += amount,
                None => by_category.push((label.to_string(), amount)),
            }
        }

        Self {
            recent: expenses,
            categories,
            total,
            by_category,
        }
    }
}

/// Fetch the newest expenses and the category list concurrently
pub async fn load_dashboard(api: &ExpenseApi) -> Result<DashboardSummary> {
    let recent = ExpenseQuery::recent();
    let (expenses, categories) = futures::try_join!(api.list(&recent), api.categories())?;
    Ok(DashboardSummary::from_parts(expenses.results, categories))
}
