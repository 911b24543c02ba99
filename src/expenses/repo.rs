use async_trait::async_trait;
use sqlx::PgPool;
use time::Date;

use super::repo_types::{Expense, ExpenseChanges, NewExpense};
use crate::db::StoreError;

/// Every query is keyed by owner: an expense belonging to someone else is
/// reported exactly like a missing one.
#[async_trait]
pub trait ExpenseStore: Send + Sync {
    async fn insert(&self, user_id: i64, expense: &NewExpense) -> Result<Expense, StoreError>;
    async fn find(&self, user_id: i64, id: i64) -> Result<Option<Expense>, StoreError>;
    async fn update(
        &self,
        user_id: i64,
        id: i64,
        changes: &ExpenseChanges,
    ) -> Result<Option<Expense>, StoreError>;
    async fn delete(&self, user_id: i64, id: i64) -> Result<bool, StoreError>;
    /// `limit: None` returns everything past `offset`.
    async fn list(
        &self,
        user_id: i64,
        limit: Option<i64>,
        offset: i64,
    ) -> Result<Vec<Expense>, StoreError>;
    /// Inclusive on both ends.
    async fn list_by_period(
        &self,
        user_id: i64,
        start: Date,
        end: Date,
    ) -> Result<Vec<Expense>, StoreError>;
    async fn list_by_category(
        &self,
        user_id: i64,
        category: &str,
    ) -> Result<Vec<Expense>, StoreError>;
}

#[derive(Clone)]
pub struct PgExpenseStore {
    db: PgPool,
}

impl PgExpenseStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ExpenseStore for PgExpenseStore {
    async fn insert(&self, user_id: i64, expense: &NewExpense) -> Result<Expense, StoreError> {
        let row = sqlx::query_as::<_, Expense>(
            r#"
            INSERT INTO expenses (user_id, amount, category, description, date)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, amount, category, description, date
            "#,
        )
        .bind(user_id)
        .bind(expense.amount)
        .bind(&expense.category)
        .bind(&expense.description)
        .bind(expense.date)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn find(&self, user_id: i64, id: i64) -> Result<Option<Expense>, StoreError> {
        let row = sqlx::query_as::<_, Expense>(
            r#"
            SELECT id, user_id, amount, category, description, date
            FROM expenses
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn update(
        &self,
        user_id: i64,
        id: i64,
        changes: &ExpenseChanges,
    ) -> Result<Option<Expense>, StoreError> {
        let row = sqlx::query_as::<_, Expense>(
            r#"
            UPDATE expenses
               SET amount = COALESCE($1, amount),
                   category = COALESCE($2, category),
                   description = COALESCE($3, description),
                   date = COALESCE($4, date)
             WHERE id = $5 AND user_id = $6
            RETURNING id, user_id, amount, category, description, date
            "#,
        )
        .bind(changes.amount)
        .bind(&changes.category)
        .bind(&changes.description)
        .bind(changes.date)
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn delete(&self, user_id: i64, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM expenses WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(
        &self,
        user_id: i64,
        limit: Option<i64>,
        offset: i64,
    ) -> Result<Vec<Expense>, StoreError> {
        // LIMIT NULL is no limit in Postgres.
        let rows = sqlx::query_as::<_, Expense>(
            r#"
            SELECT id, user_id, amount, category, description, date
            FROM expenses
            WHERE user_id = $1
            ORDER BY date, id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn list_by_period(
        &self,
        user_id: i64,
        start: Date,
        end: Date,
    ) -> Result<Vec<Expense>, StoreError> {
        let rows = sqlx::query_as::<_, Expense>(
            r#"
            SELECT id, user_id, amount, category, description, date
            FROM expenses
            WHERE user_id = $1 AND date BETWEEN $2 AND $3
            ORDER BY date, id
            "#,
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn list_by_category(
        &self,
        user_id: i64,
        category: &str,
    ) -> Result<Vec<Expense>, StoreError> {
        let rows = sqlx::query_as::<_, Expense>(
            r#"
            SELECT id, user_id, amount, category, description, date
            FROM expenses
            WHERE user_id = $1 AND category = $2
            ORDER BY date, id
            "#,
        )
        .bind(user_id)
        .bind(category)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}
