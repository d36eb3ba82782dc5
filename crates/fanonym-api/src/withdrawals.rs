use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use fanonym_types::api::{Claims, Role, QuoteQuery, ResolveWithdrawalRequest, WithdrawalCreateRequest};
use fanonym_types::events::LedgerEvent;
use fanonym_types::models::WithdrawalStatus;

use crate::error::ApiError;
use crate::middleware::require_admin;
use crate::state::AppState;

pub async fn quote(
    State(state): State<AppState>,
    Query(query): Query<QuoteQuery>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let quote = state.ledger.quote_withdrawal(query.amount)?;
    Ok(Json(quote))
}

pub async fn list_withdrawals(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let creator = claims.sub;
    let withdrawals = state.run(move |ledger| ledger.list_withdrawals(creator)).await?;
    Ok(Json(withdrawals))
}

pub async fn request_withdrawal(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<WithdrawalCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let creator = claims.sub;
    let withdrawal = state
        .run(move |ledger| ledger.request_withdrawal(creator, req.amount, req.bank))
        .await?;

    state.publish_balances(&[creator]).await;
    Ok((StatusCode::CREATED, Json(withdrawal)))
}

/// One payout, visible to the creator who requested it and to admins.
pub async fn get_withdrawal(
    State(state): State<AppState>,
    Path(withdrawal_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let withdrawal = state
        .run(move |ledger| ledger.get_withdrawal(withdrawal_id))
        .await?;
    if withdrawal.creator_id != claims.sub && claims.role != Role::Admin {
        return Err(ApiError::Forbidden("not your withdrawal"));
    }
    Ok(Json(withdrawal))
}

/// Operator queue, oldest first.
pub async fn pending_withdrawals(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&claims)?;
    let pending = state.run(|ledger| ledger.pending_withdrawals()).await?;
    Ok(Json(pending))
}

pub async fn resolve_withdrawal(
    State(state): State<AppState>,
    Path(withdrawal_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ResolveWithdrawalRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&claims)?;

    let note = req.note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    let withdrawal = state
        .run(move |ledger| ledger.resolve_withdrawal(withdrawal_id, req.outcome, note))
        .await?;

    info!(
        "{} resolved withdrawal {} as {}",
        claims.sub,
        withdrawal_id,
        withdrawal.status.as_str()
    );
    state.dispatcher.publish(LedgerEvent::WithdrawalResolved {
        withdrawal_id,
        creator_id: withdrawal.creator_id,
        status: withdrawal.status,
    });
    if withdrawal.status == WithdrawalStatus::Rejected {
        state.publish_balances(&[withdrawal.creator_id]).await;
    }

    Ok(Json(withdrawal))
}
