use axum::{
    Json, Router, middleware,
    routing::{get, post},
};
use serde_json::json;

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{balances, credits, pricing, sessions, withdrawals};

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// REST routes. Everything except `/health` requires a bearer token.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/balances", get(balances::get_balances))
        .route("/balances/history", get(balances::get_history))
        .route("/credits/grants", post(credits::grant_credits))
        .route(
            "/creators/{creator_id}/pricing",
            get(pricing::list_pricing).put(pricing::set_pricing),
        )
        .route(
            "/sessions",
            get(sessions::list_sessions).post(sessions::create_session),
        )
        .route(
            "/sessions/{session_id}",
            get(sessions::get_session).delete(sessions::delete_session),
        )
        .route("/sessions/{session_id}/accept", post(sessions::accept_session))
        .route("/sessions/{session_id}/extend", post(sessions::extend_session))
        .route("/sessions/{session_id}/charges", post(sessions::charge_in_session))
        .route("/withdrawals/quote", get(withdrawals::quote))
        .route("/withdrawals/pending", get(withdrawals::pending_withdrawals))
        .route(
            "/withdrawals",
            get(withdrawals::list_withdrawals).post(withdrawals::request_withdrawal),
        )
        .route("/withdrawals/{withdrawal_id}", get(withdrawals::get_withdrawal))
        .route(
            "/withdrawals/{withdrawal_id}/resolve",
            post(withdrawals::resolve_withdrawal),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
}
