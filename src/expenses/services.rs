use std::sync::Arc;

use axum::extract::FromRef;
use time::Date;
use tracing::{debug, info};

use super::{
    dto::{CreateExpenseRequest, UpdateExpenseRequest},
    repo::ExpenseStore,
    repo_types::{Expense, ExpenseChanges, NewExpense},
};
use crate::{db::StoreError, error::ApiError, state::AppState};

#[derive(Debug, thiserror::Error)]
pub enum ExpenseError {
    #[error("{0}")]
    Validation(&'static str),
    #[error("expense not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ExpenseError> for ApiError {
    fn from(err: ExpenseError) -> Self {
        match err {
            ExpenseError::Validation(msg) => ApiError::bad_request(msg),
            ExpenseError::NotFound => ApiError::NotFound("expense not found"),
            ExpenseError::Store(e) => ApiError::from(e),
        }
    }
}

/// Expense CRUD and queries, always scoped to the calling user.
#[derive(Clone)]
pub struct ExpenseService {
    expenses: Arc<dyn ExpenseStore>,
}

impl FromRef<AppState> for ExpenseService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.expenses.clone())
    }
}

fn check_amount(amount: f64) -> Result<f64, ExpenseError> {
    if amount.is_finite() && amount > 0.0 {
        Ok(amount)
    } else {
        Err(ExpenseError::Validation("amount must be positive"))
    }
}

fn check_category(category: &str) -> Result<String, ExpenseError> {
    let category = category.trim();
    if category.is_empty() {
        return Err(ExpenseError::Validation("category is required"));
    }
    Ok(category.to_string())
}

impl ExpenseService {
    pub fn new(expenses: Arc<dyn ExpenseStore>) -> Self {
        Self { expenses }
    }

    pub async fn create(
        &self,
        user_id: i64,
        req: CreateExpenseRequest,
    ) -> Result<Expense, ExpenseError> {
        let new = NewExpense {
            amount: check_amount(req.amount)?,
            category: check_category(&req.category)?,
            description: req.description,
            date: req.date,
        };
        let expense = self.expenses.insert(user_id, &new).await?;
        info!(user_id, expense_id = expense.id, "expense created");
        Ok(expense)
    }

    pub async fn get(&self, user_id: i64, id: i64) -> Result<Expense, ExpenseError> {
        self.expenses
            .find(user_id, id)
            .await?
            .ok_or(ExpenseError::NotFound)
    }

    pub async fn update(
        &self,
        user_id: i64,
        id: i64,
        req: UpdateExpenseRequest,
    ) -> Result<Expense, ExpenseError> {
        let changes = ExpenseChanges {
            amount: req.amount.map(check_amount).transpose()?,
            category: req.category.as_deref().map(check_category).transpose()?,
            description: req.description,
            date: req.date,
        };
        let expense = self
            .expenses
            .update(user_id, id, &changes)
            .await?
            .ok_or(ExpenseError::NotFound)?;
        info!(user_id, expense_id = id, "expense updated");
        Ok(expense)
    }

    pub async fn delete(&self, user_id: i64, id: i64) -> Result<(), ExpenseError> {
        if !self.expenses.delete(user_id, id).await? {
            return Err(ExpenseError::NotFound);
        }
        info!(user_id, expense_id = id, "expense deleted");
        Ok(())
    }

    pub async fn list(
        &self,
        user_id: i64,
        limit: Option<i64>,
        offset: i64,
    ) -> Result<Vec<Expense>, ExpenseError> {
        if limit.is_some_and(|l| l < 0) || offset < 0 {
            return Err(ExpenseError::Validation("limit and offset must not be negative"));
        }
        let rows = self.expenses.list(user_id, limit, offset).await?;
        debug!(user_id, count = rows.len(), "expenses listed");
        Ok(rows)
    }

    pub async fn by_period(
        &self,
        user_id: i64,
        start: Date,
        end: Date,
    ) -> Result<Vec<Expense>, ExpenseError> {
        if end < start {
            return Err(ExpenseError::Validation("end date must not be before start date"));
        }
        Ok(self.expenses.list_by_period(user_id, start, end).await?)
    }

    pub async fn by_category(
        &self,
        user_id: i64,
        category: &str,
    ) -> Result<Vec<Expense>, ExpenseError> {
        let category = check_category(category)?;
        Ok(self.expenses.list_by_category(user_id, &category).await?)
    }
}
