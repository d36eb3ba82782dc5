use axum::{
    Extension, Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use fanonym_ledger::Ledger;
use fanonym_types::api::{
    Claims, CreateSessionRequest, ExtendSessionRequest, SessionChargeRequest, SessionResponse,
};
use fanonym_types::events::LedgerEvent;
use fanonym_types::models::{ChatSession, OperationKind};

use crate::error::ApiError;
use crate::state::AppState;

pub const IDEMPOTENCY_KEY: &str = "idempotency-key";

/// The trimmed `Idempotency-Key` header, which retry-safe endpoints require.
fn idempotency_key(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(IDEMPOTENCY_KEY)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::BadRequest("Idempotency-Key header is required".into()))
}

fn view(ledger: &Ledger, session: ChatSession) -> SessionResponse {
    let state = session.state_at(ledger.now());
    SessionResponse { session, state }
}

/// Unlock a chat. The `Idempotency-Key` header identifies the request; a
/// retry returns the session it opened with 200 instead of paying twice.
pub async fn create_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Json(req): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let key = idempotency_key(&headers)?;
    let sender = claims.sub;
    let (response, replayed) = state
        .run(move |ledger| {
            let (session, replayed) =
                ledger.create_session(sender, req.creator_id, req.pricing_option_id, &key)?;
            Ok((view(ledger, session), replayed))
        })
        .await?;

    if replayed {
        return Ok((StatusCode::OK, Json(response)));
    }

    let session = &response.session;
    state.dispatcher.publish(LedgerEvent::SessionCreated {
        session_id: session.id,
        sender_id: session.sender_id,
        creator_id: session.creator_id,
        credits_paid: session.credits_paid,
    });
    state.publish_balances(&[session.sender_id]).await;

    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let account = claims.sub;
    let sessions = state
        .run(move |ledger| {
            let sessions = ledger.list_sessions(account)?;
            Ok(sessions
                .into_iter()
                .map(|s| view(ledger, s))
                .collect::<Vec<_>>())
        })
        .await?;
    Ok(Json(sessions))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = claims.sub;
    let response = state
        .run(move |ledger| {
            let session = ledger.get_session(session_id, viewer)?;
            Ok(view(ledger, session))
        })
        .await?;
    Ok(Json(response))
}

pub async fn accept_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = claims.sub;
    let response = state
        .run(move |ledger| {
            let session = ledger.accept_session(session_id, actor)?;
            Ok(view(ledger, session))
        })
        .await?;

    let session = &response.session;
    if let Some(expires_at) = session.expires_at {
        state.dispatcher.publish(LedgerEvent::SessionAccepted {
            session_id,
            sender_id: session.sender_id,
            creator_id: session.creator_id,
            expires_at,
        });
    }
    state.publish_balances(&[session.creator_id]).await;

    Ok(Json(response))
}

/// Buy more time. The `Idempotency-Key` header identifies the purchase, so a
/// retried request returns the same session without charging or notifying
/// again.
pub async fn extend_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Json(req): Json<ExtendSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let key = idempotency_key(&headers)?;
    let actor = claims.sub;
    let (response, replayed) = state
        .run(move |ledger| {
            let (session, replayed) =
                ledger.extend_session(session_id, actor, req.pricing_option_id, &key)?;
            Ok((view(ledger, session), replayed))
        })
        .await?;

    if replayed {
        return Ok(Json(response));
    }

    let session = &response.session;
    if let Some(expires_at) = session.expires_at {
        state.dispatcher.publish(LedgerEvent::SessionExtended {
            session_id,
            sender_id: session.sender_id,
            creator_id: session.creator_id,
            credits_paid: session.credits_paid,
            expires_at,
        });
    }
    state
        .publish_balances(&[session.sender_id, session.creator_id])
        .await;

    Ok(Json(response))
}

pub async fn charge_in_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SessionChargeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = claims.sub;
    let kind = OperationKind::from(req.kind);
    let charge = state
        .run(move |ledger| {
            ledger.charge_in_session(session_id, actor, kind, req.amount, req.reference.trim())
        })
        .await?;

    if !charge.replayed {
        state
            .publish_balances(&[charge.sender_id, charge.creator_id])
            .await;
    }

    let status = if charge.replayed { StatusCode::OK } else { StatusCode::CREATED };
    Ok((status, Json(charge)))
}

/// Creator deletes an active session or declines a pending one. Declining
/// refunds the sender.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = claims.sub;
    let (session, previous_state) = state
        .run(move |ledger| ledger.delete_session(session_id, actor))
        .await?;

    info!("Session {} deleted by {} (was {})", session_id, actor, previous_state);
    state.dispatcher.publish(LedgerEvent::SessionDeleted {
        session_id,
        sender_id: session.sender_id,
        creator_id: session.creator_id,
        previous_state,
    });
    state.publish_balances(&[session.sender_id]).await;

    Ok(StatusCode::NO_CONTENT)
}
