use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ==================================================================================================
// Categories
// ==================================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

// ==================================================================================================
// Expenses
// ==================================================================================================

/// Expense as returned by the backend.
///
/// List responses use a lighter serializer (id, amount, category_name,
/// description, date) so everything else is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    /// Decimal string, e.g. `"12.50"`
    pub amount: String,
    pub description: String,
    #[serde(default)]
    pub notes: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub category: Option<i64>,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default)]
    pub ai_suggested_category: Option<i64>,
    #[serde(default)]
    pub ai_suggested_category_name: Option<String>,
    #[serde(default)]
    pub ai_confidence: Option<f64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Expense {
    /// Numeric amount; unparseable amounts count as zero
    pub fn amount_value(&self) -> f64 {
        self.amount.trim().parse().unwrap_or(0.0)
    }

    pub fn category_label(&self) -> &str {
        self.category_name.as_deref().unwrap_or("Uncategorized")
    }

    /// `AI suggested: Food (85%)`, shown only while no category is assigned
    pub fn ai_hint(&self) -> Option<String> {
        if self.category.is_some() || self.category_name.is_some() {
            return None;
        }
        let name = self.ai_suggested_category_name.as_deref()?;
        let confidence = self.ai_confidence.unwrap_or(0.0) * 100.0;
        Some(format!("AI suggested: {} ({:.0}%)", name, confidence))
    }
}

/// Body of `POST /expenses/` and `PUT /expenses/{id}/`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpenseCreate {
    pub amount: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<i64>,
}

impl ExpenseCreate {
    pub fn new(amount: impl Into<String>, description: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            amount: amount.into(),
            description: description.into(),
            notes: None,
            date,
            category: None,
        }
    }

    /// Blank notes are left out of the payload
    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes.filter(|n| !n.trim().is_empty());
        self
    }

    pub fn with_category(mut self, category: Option<i64>) -> Self {
        self.category = category;
        self
    }
}

impl From<&Expense> for ExpenseCreate {
    fn from(expense: &Expense) -> Self {
        ExpenseCreate::new(expense.amount.clone(), expense.description.clone(), expense.date)
            .with_notes(Some(expense.notes.clone()))
            .with_category(expense.category)
    }
}

// ==================================================================================================
// Pagination
// ==================================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Paginated<T> {
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    pub fn has_previous(&self) -> bool {
        self.previous.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn list_item() -> Expense {
        serde_json::from_value(json!({
            "id": 10,
            "amount": "42.50",
            "category_name": null,
            "description": "Groceries",
            "date": "2024-06-02"
        }))
        .unwrap()
    }

    #[test]
    fn test_list_serializer_shape() {
        let expense = list_item();
        assert_eq!(expense.id, 10);
        assert_eq!(expense.amount_value(), 42.5);
        assert_eq!(expense.category_label(), "Uncategorized");
        assert!(expense.notes.is_empty());
        assert_eq!(expense.date, NaiveDate::from_ymd_opt(2024, 6, 2).unwrap());
    }

    #[test]
    fn test_detail_serializer_shape() {
        let expense: Expense = serde_json::from_value(json!({
            "id": 11,
            "amount": "8.00",
            "category": null,
            "category_name": null,
            "description": "Coffee beans",
            "notes": "",
            "date": "2024-06-03",
            "created_at": "2024-06-03T08:00:00.000001Z",
            "updated_at": "2024-06-03T08:00:00.000001Z",
            "ai_suggested_category": 2,
            "ai_suggested_category_name": "Food",
            "ai_confidence": 0.74
        }))
        .unwrap();

        assert_eq!(expense.ai_hint().as_deref(), Some("AI suggested: Food (74%)"));
    }

    #[test]
    fn test_ai_hint_hidden_when_categorized() {
        let mut expense = list_item();
        expense.ai_suggested_category_name = Some("Food".to_string());
        expense.category = Some(2);
        assert_eq!(expense.ai_hint(), None);
    }

    #[test]
    fn test_unparseable_amount_is_zero() {
        let mut expense = list_item();
        expense.amount = "n/a".to_string();
        assert_eq!(expense.amount_value(), 0.0);
    }

    #[test]
    fn test_expense_create_omits_empty_fields() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
        let body = ExpenseCreate::new("12.00", "Lunch", date).with_notes(Some("  ".to_string()));
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"amount": "12.00", "description": "Lunch", "date": "2024-06-02"})
        );

        let body = body
            .with_notes(Some("with team".to_string()))
            .with_category(Some(3));
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "amount": "12.00",
                "description": "Lunch",
                "notes": "with team",
                "date": "2024-06-02",
                "category": 3
            })
        );
    }

    #[test]
    fn test_paginated_flags() {
        let page: Paginated<Category> = serde_json::from_value(json!({
            "count": 12,
            "next": "http://localhost:8000/api/categories/?page=2",
            "previous": null,
            "results": [{"id": 1, "name": "Food", "description": "", "created_at": "2024-01-01T00:00:00Z"}]
        }))
        .unwrap();

        assert!(page.has_next());
        assert!(!page.has_previous());
        assert_eq!(page.results[0].name, "Food");
    }
}
