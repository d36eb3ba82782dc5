use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};

use fanonym_types::api::{Claims, HistoryQuery};

use crate::error::ApiError;
use crate::state::AppState;

const MAX_HISTORY: u32 = 200;

pub async fn get_balances(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let account = claims.sub;
    let balances = state.run(move |ledger| ledger.balances(account)).await?;
    Ok(Json(balances))
}

pub async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let account = claims.sub;
    let limit = query.limit.min(MAX_HISTORY);
    let entries = state.run(move |ledger| ledger.history(account, limit)).await?;
    Ok(Json(entries))
}
