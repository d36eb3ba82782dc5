use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};

use fanonym_types::api::{Claims, SetPricingRequest};
use fanonym_types::models::AccountId;

use crate::error::ApiError;
use crate::state::AppState;

/// Any member may read a creator's prices before unlocking a chat.
pub async fn list_pricing(
    State(state): State<AppState>,
    Path(creator_id): Path<AccountId>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let options = state
        .run(move |ledger| ledger.list_pricing_options(creator_id))
        .await?;
    Ok(Json(options))
}

pub async fn set_pricing(
    State(state): State<AppState>,
    Path(creator_id): Path<AccountId>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SetPricingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if claims.sub != creator_id {
        return Err(ApiError::Forbidden("only the creator can change their prices"));
    }

    let options = state
        .run(move |ledger| ledger.set_pricing_options(creator_id, &req.options))
        .await?;
    Ok(Json(options))
}
