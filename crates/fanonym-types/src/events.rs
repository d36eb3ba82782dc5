use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{AccountId, Balances, SessionState, WithdrawalStatus};

/// Events pushed over the realtime gateway after a ledger operation commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum LedgerEvent {
    /// Server confirms successful identification
    Ready { account_id: AccountId },

    /// A sender unlocked a chat; credits are in escrow
    SessionCreated {
        session_id: Uuid,
        sender_id: AccountId,
        creator_id: AccountId,
        credits_paid: u64,
    },

    /// The creator accepted; escrow released and the timer is running
    SessionAccepted {
        session_id: Uuid,
        sender_id: AccountId,
        creator_id: AccountId,
        expires_at: chrono::DateTime<chrono::Utc>,
    },

    /// The sender bought more time
    SessionExtended {
        session_id: Uuid,
        sender_id: AccountId,
        creator_id: AccountId,
        credits_paid: u64,
        expires_at: chrono::DateTime<chrono::Utc>,
    },

    /// The creator deleted or declined the session
    SessionDeleted {
        session_id: Uuid,
        sender_id: AccountId,
        creator_id: AccountId,
        previous_state: SessionState,
    },

    /// An account's balances changed
    BalanceChanged {
        account_id: AccountId,
        balances: Balances,
    },

    /// An admin resolved a withdrawal request
    WithdrawalResolved {
        withdrawal_id: Uuid,
        creator_id: AccountId,
        status: WithdrawalStatus,
    },
}

impl LedgerEvent {
    /// Returns the session_id if this event is scoped to a specific session.
    /// Session-scoped events only reach connections subscribed to that session.
    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            Self::SessionCreated { session_id, .. }
            | Self::SessionAccepted { session_id, .. }
            | Self::SessionExtended { session_id, .. }
            | Self::SessionDeleted { session_id, .. } => Some(*session_id),
            _ => None,
        }
    }

    /// Accounts allowed to see this event.
    pub fn audience(&self) -> Vec<AccountId> {
        match self {
            Self::Ready { account_id } | Self::BalanceChanged { account_id, .. } => {
                vec![*account_id]
            }
            Self::SessionCreated { sender_id, creator_id, .. }
            | Self::SessionAccepted { sender_id, creator_id, .. }
            | Self::SessionExtended { sender_id, creator_id, .. }
            | Self::SessionDeleted { sender_id, creator_id, .. } => vec![*sender_id, *creator_id],
            Self::WithdrawalResolved { creator_id, .. } => vec![*creator_id],
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Replace the set of sessions this connection receives events for.
    Subscribe { session_ids: Vec<Uuid> },
}
