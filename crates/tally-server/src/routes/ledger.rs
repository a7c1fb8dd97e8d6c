//! Ledger routes: read totals and add or delete income and expense entries.
//!
//! Every route requires a session. Successful responses carry the full
//! updated ledger and its totals.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use tally_core::error::ValidationError;
use tally_core::ledger::{EntryKind, Ledger, Totals};
use tally_core::mutator::amount_field;
use tally_core::validation::AmountInput;

use crate::error::AppError;
use crate::extract::AppJson;
use crate::middleware::SessionUser;
use crate::state::AppState;

/// Build the ledger router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/get-user-data", get(get_user_data))
        .route("/add-expense", post(add_expense))
        .route("/add-income", post(add_income))
        .route("/delete-expense", delete(delete_expense))
        .route("/delete-income", delete(delete_income))
}

// ── Request / Response types ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddExpenseRequest {
    #[serde(default)]
    pub expense_name: String,
    pub expense_amount: Option<AmountInput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddIncomeRequest {
    #[serde(default)]
    pub income_name: String,
    pub income_amount: Option<AmountInput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteExpenseRequest {
    #[serde(default)]
    pub expense_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteIncomeRequest {
    #[serde(default)]
    pub income_name: String,
}

#[derive(Debug, Serialize)]
pub struct LedgerResponse {
    pub data: Ledger,
    pub totals: Totals,
}

impl From<Ledger> for LedgerResponse {
    fn from(data: Ledger) -> Self {
        let totals = data.totals();
        Self { data, totals }
    }
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn get_user_data(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
) -> Result<Json<LedgerResponse>, AppError> {
    let ledger = state.ledgers.get_ledger(&user.username).await?;
    Ok(Json(ledger.into()))
}

async fn add_expense(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    AppJson(body): AppJson<AddExpenseRequest>,
) -> Result<Json<LedgerResponse>, AppError> {
    add_entry(
        &state,
        &user,
        EntryKind::Expense,
        &body.expense_name,
        body.expense_amount,
    )
    .await
}

async fn add_income(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    AppJson(body): AppJson<AddIncomeRequest>,
) -> Result<Json<LedgerResponse>, AppError> {
    add_entry(
        &state,
        &user,
        EntryKind::Income,
        &body.income_name,
        body.income_amount,
    )
    .await
}

async fn delete_expense(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    AppJson(body): AppJson<DeleteExpenseRequest>,
) -> Result<Json<LedgerResponse>, AppError> {
    let ledger = state
        .ledgers
        .delete_entry(&user.username, EntryKind::Expense, &body.expense_name)
        .await?;
    Ok(Json(ledger.into()))
}

async fn delete_income(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    AppJson(body): AppJson<DeleteIncomeRequest>,
) -> Result<Json<LedgerResponse>, AppError> {
    let ledger = state
        .ledgers
        .delete_entry(&user.username, EntryKind::Income, &body.income_name)
        .await?;
    Ok(Json(ledger.into()))
}

async fn add_entry(
    state: &AppState,
    user: &SessionUser,
    kind: EntryKind,
    name: &str,
    amount: Option<AmountInput>,
) -> Result<Json<LedgerResponse>, AppError> {
    let amount = amount.ok_or(ValidationError::Missing {
        field: amount_field(kind),
    })?;
    let ledger = state
        .ledgers
        .add_entry(&user.username, kind, name, &amount)
        .await?;
    Ok(Json(ledger.into()))
}
