use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;

use fanonym_types::api::{Claims, GrantCreditsRequest, GrantCreditsResponse};

use crate::error::ApiError;
use crate::middleware::require_admin;
use crate::state::AppState;

/// Credit a sender after the payment gateway confirmed a top-up. The payment
/// reference is the idempotency key: replays return the current balance.
pub async fn grant_credits(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<GrantCreditsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&claims)?;

    let reference = req.reference.trim();
    if reference.is_empty() {
        return Err(ApiError::BadRequest("reference must not be empty".into()));
    }

    let op_id = format!("grant:{}", reference);
    let account = req.account_id;
    let amount = req.amount;

    let (balance, replayed) = {
        let op_id = op_id.clone();
        state
            .run(move |ledger| ledger.grant_credits(&op_id, account, amount))
            .await?
    };

    if !replayed {
        info!("{} granted {} credits to {}", claims.sub, amount, account);
        state.publish_balances(&[account]).await;
    }

    let status = if replayed { StatusCode::OK } else { StatusCode::CREATED };
    Ok((
        status,
        Json(GrantCreditsResponse {
            op_id,
            balance,
            replayed,
        }),
    ))
}
