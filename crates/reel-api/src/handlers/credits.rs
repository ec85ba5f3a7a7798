//! Credit balance and history handlers.

use axum::extract::{Query, State};
use axum::Json;
use chrono::DateTime;
use reel_models::{CreditTransaction, Credits};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Maximum allowed limit for credit history queries.
const MAX_LIMIT: u32 = 100;

#[derive(Serialize)]
pub struct BalanceResponse {
    pub user_id: String,
    pub balance: Credits,
}

pub async fn get_balance(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<BalanceResponse>> {
    let balance = state.pipeline.ledger().balance(&user.uid).await?;
    Ok(Json(BalanceResponse {
        user_id: user.uid,
        balance,
    }))
}

/// Query parameters for the credit history endpoint.
#[derive(Debug, Deserialize)]
pub struct CreditHistoryQuery {
    /// Maximum number of transactions to return (clamped to 1..100).
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Timestamp of the last item on the previous page (RFC 3339).
    pub cursor: Option<String>,
}

fn default_limit() -> u32 {
    50
}

#[derive(Debug, Serialize)]
pub struct CreditHistoryResponse {
    pub transactions: Vec<CreditTransaction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Newest-first transaction history, paged by timestamp cursor.
pub async fn get_credit_history(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<CreditHistoryQuery>,
) -> ApiResult<Json<CreditHistoryResponse>> {
    let limit = query.limit.clamp(1, MAX_LIMIT);

    if let Some(cursor) = query.cursor.as_deref() {
        DateTime::parse_from_rfc3339(cursor).map_err(|_| {
            ApiError::bad_request(format!(
                "Invalid cursor '{}': expected an RFC 3339 timestamp",
                cursor
            ))
        })?;
    }

    let page = state
        .pipeline
        .ledger()
        .history(&user.uid, Some(limit), query.cursor.as_deref())
        .await?;

    Ok(Json(CreditHistoryResponse {
        transactions: page.transactions,
        next_page_token: page.next_cursor,
    }))
}
