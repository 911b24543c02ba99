use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};
use time::{macros::format_description, Date};
use tracing::instrument;

use super::{
    dto::{CategoryQuery, CreateExpenseRequest, Pagination, PeriodQuery, UpdateExpenseRequest},
    repo_types::Expense,
    services::ExpenseService,
};
use crate::{auth::AuthUser, error::ApiError, state::AppState};

pub fn expense_routes() -> Router<AppState> {
    Router::new()
        .route("/expenses", get(list_expenses).post(create_expense))
        .route("/expenses/period", get(expenses_by_period))
        .route("/expenses/category", get(expenses_by_category))
        .route(
            "/expenses/:id",
            get(get_expense).put(update_expense).delete(delete_expense),
        )
}

fn parse_date(value: Option<&str>, which: &'static str) -> Result<Date, ApiError> {
    value
        .and_then(|v| Date::parse(v, format_description!("[year]-[month]-[day]")).ok())
        .ok_or_else(|| ApiError::bad_request(format!("invalid {which} date (use YYYY-MM-DD)")))
}

#[instrument(skip(expenses, payload))]
pub async fn create_expense(
    State(expenses): State<ExpenseService>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<CreateExpenseRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Expense>), ApiError> {
    let Json(payload) = payload?;
    let expense = expenses.create(user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(expense)))
}

#[instrument(skip(expenses, id))]
pub async fn get_expense(
    State(expenses): State<ExpenseService>,
    AuthUser(user_id): AuthUser,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Expense>, ApiError> {
    let Path(id) = id?;
    Ok(Json(expenses.get(user_id, id).await?))
}

#[instrument(skip(expenses, id, payload))]
pub async fn update_expense(
    State(expenses): State<ExpenseService>,
    AuthUser(user_id): AuthUser,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdateExpenseRequest>, JsonRejection>,
) -> Result<Json<Expense>, ApiError> {
    let Path(id) = id?;
    let Json(payload) = payload?;
    Ok(Json(expenses.update(user_id, id, payload).await?))
}

#[instrument(skip(expenses, id))]
pub async fn delete_expense(
    State(expenses): State<ExpenseService>,
    AuthUser(user_id): AuthUser,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id?;
    expenses.delete(user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(expenses, page))]
pub async fn list_expenses(
    State(expenses): State<ExpenseService>,
    AuthUser(user_id): AuthUser,
    page: Result<Query<Pagination>, QueryRejection>,
) -> Result<Json<Vec<Expense>>, ApiError> {
    let Query(page) = page?;
    Ok(Json(expenses.list(user_id, page.limit, page.offset).await?))
}

#[instrument(skip(expenses, query))]
pub async fn expenses_by_period(
    State(expenses): State<ExpenseService>,
    AuthUser(user_id): AuthUser,
    query: Result<Query<PeriodQuery>, QueryRejection>,
) -> Result<Json<Vec<Expense>>, ApiError> {
    let Query(query) = query?;
    let start = parse_date(query.start.as_deref(), "start")?;
    let end = parse_date(query.end.as_deref(), "end")?;
    Ok(Json(expenses.by_period(user_id, start, end).await?))
}

#[instrument(skip(expenses, query))]
pub async fn expenses_by_category(
    State(expenses): State<ExpenseService>,
    AuthUser(user_id): AuthUser,
    query: Result<Query<CategoryQuery>, QueryRejection>,
) -> Result<Json<Vec<Expense>>, ApiError> {
    let Query(query) = query?;
    let category = query
        .category
        .ok_or_else(|| ApiError::bad_request("category parameter is required"))?;
    Ok(Json(expenses.by_category(user_id, &category).await?))
}
