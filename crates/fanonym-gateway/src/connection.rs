use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use fanonym_types::api::Claims;
use fanonym_types::events::{GatewayCommand, LedgerEvent};
use fanonym_types::models::AccountId;

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

type Subscriptions = Arc<RwLock<HashSet<Uuid>>>;

/// Verify a bearer token and return the account it identifies.
pub fn verify_token(token: &str, jwt_secret: &str) -> Option<AccountId> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims.sub)
}

/// Whether `event` may be sent to a connection of `account_id` that is
/// subscribed to `sessions`. Session-scoped events also need a subscription,
/// except `SessionCreated`: nobody can be subscribed to a session that did not
/// exist yet, and it is how the creator learns of a new request.
pub fn should_deliver(event: &LedgerEvent, account_id: AccountId, sessions: &HashSet<Uuid>) -> bool {
    if !event.audience().contains(&account_id) {
        return false;
    }
    if matches!(event, LedgerEvent::SessionCreated { .. }) {
        return true;
    }
    event.session_id().is_none_or(|id| sessions.contains(&id))
}

/// Handle a WebSocket whose token was already checked at the upgrade request.
pub async fn handle_connection_authenticated(
    socket: WebSocket,
    dispatcher: Dispatcher,
    account_id: AccountId,
) {
    let (sender, receiver) = socket.split();
    run_connection(sender, receiver, dispatcher, account_id).await;
}

/// Handle a WebSocket that must identify itself with its first command.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, jwt_secret: String) {
    let (sender, mut receiver) = socket.split();

    let account_id = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(id) => id,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    run_connection(sender, receiver, dispatcher, account_id).await;
}

async fn run_connection(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    dispatcher: Dispatcher,
    account_id: AccountId,
) {
    info!("{} connected to gateway", account_id);

    // Subscribe before Ready so nothing committed after Ready is missed
    let mut events = dispatcher.subscribe();

    let ready = LedgerEvent::Ready { account_id };
    if !send_event(&mut sender, &ready).await {
        return;
    }

    let subscriptions: Subscriptions = Arc::new(RwLock::new(HashSet::new()));
    let send_subscriptions = subscriptions.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = events.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(RecvError::Lagged(n)) => {
                            warn!("{}: gateway receiver lagged by {} events", account_id, n);
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    };

                    let deliver = match send_subscriptions.read() {
                        Ok(subs) => should_deliver(&event, account_id, &subs),
                        Err(_) => break,
                    };
                    if deliver && !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("{}: heartbeat timeout (missed {} pongs), dropping connection", account_id, missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(account_id, cmd, &subscriptions),
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            account_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_received.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("{} disconnected from gateway", account_id);
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &LedgerEvent) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to serialize gateway event: {}", e);
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}

async fn wait_for_identify(
    receiver: &mut SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<AccountId> {
    let identify = async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    return verify_token(&token, jwt_secret);
                }
            }
        }
        None
    };

    tokio::time::timeout(IDENTIFY_TIMEOUT, identify)
        .await
        .ok()
        .flatten()
}

fn handle_command(account_id: AccountId, cmd: GatewayCommand, subscriptions: &Subscriptions) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::Subscribe { session_ids } => {
            debug!("{} subscribing to {} sessions", account_id, session_ids.len());
            if let Ok(mut subs) = subscriptions.write() {
                *subs = session_ids.into_iter().collect();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanonym_types::api::Role;
    use fanonym_types::models::Balances;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn token(sub: Uuid, secret: &str, exp_offset_secs: i64) -> String {
        let claims = Claims {
            sub,
            role: Role::Member,
            exp: (chrono::Utc::now().timestamp() + exp_offset_secs) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn verify_token_checks_signature_and_expiry() {
        let a = Uuid::new_v4();
        assert_eq!(verify_token(&token(a, "s3cret", 3600), "s3cret"), Some(a));
        assert_eq!(verify_token(&token(a, "s3cret", 3600), "other"), None);
        assert_eq!(verify_token(&token(a, "s3cret", -3600), "s3cret"), None);
        assert_eq!(verify_token("not-a-jwt", "s3cret"), None);
    }

    #[test]
    fn new_sessions_reach_participants_without_subscription() {
        let (session_id, sender_id, creator_id) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let event = LedgerEvent::SessionCreated {
            session_id,
            sender_id,
            creator_id,
            credits_paid: 10,
        };
        let none = HashSet::new();

        assert!(should_deliver(&event, creator_id, &none));
        assert!(should_deliver(&event, sender_id, &none));
        assert!(!should_deliver(&event, Uuid::new_v4(), &none));
    }

    #[test]
    fn later_session_events_need_participant_and_subscription() {
        let (session_id, sender_id, creator_id) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let event = LedgerEvent::SessionAccepted {
            session_id,
            sender_id,
            creator_id,
            expires_at: chrono::Utc::now(),
        };

        let subscribed: HashSet<Uuid> = [session_id].into_iter().collect();
        let none = HashSet::new();

        assert!(should_deliver(&event, creator_id, &subscribed));
        assert!(should_deliver(&event, sender_id, &subscribed));
        assert!(!should_deliver(&event, sender_id, &none));
        assert!(!should_deliver(&event, Uuid::new_v4(), &subscribed));
    }

    #[test]
    fn account_events_go_to_owner_only() {
        let owner = Uuid::new_v4();
        let event = LedgerEvent::BalanceChanged {
            account_id: owner,
            balances: Balances::default(),
        };
        let none = HashSet::new();

        assert!(should_deliver(&event, owner, &none));
        assert!(!should_deliver(&event, Uuid::new_v4(), &none));
    }

    #[test]
    fn subscribe_replaces_previous_set() {
        let subs: Subscriptions = Arc::new(RwLock::new(HashSet::new()));
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let me = Uuid::new_v4();

        handle_command(me, GatewayCommand::Subscribe { session_ids: vec![a] }, &subs);
        handle_command(me, GatewayCommand::Subscribe { session_ids: vec![b] }, &subs);

        let current = subs.read().unwrap();
        assert!(current.contains(&b));
        assert!(!current.contains(&a));
    }
}
