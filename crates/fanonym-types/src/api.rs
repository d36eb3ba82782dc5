use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    AccountId, BankDetails, ChatSession, OperationKind, SessionState, WithdrawalOutcome,
};

// -- JWT Claims --

/// Claims carried by the bearer token the external auth provider issues.
/// Shared by fanonym-api (REST middleware) and fanonym-gateway (WebSocket
/// identify handshake).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: AccountId,
    #[serde(default)]
    pub role: Role,
    pub exp: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Member,
    Admin,
}

// -- Credits --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrantCreditsRequest {
    pub account_id: AccountId,
    pub amount: u64,
    /// Payment gateway reference; grants with the same reference apply once.
    pub reference: String,
}

#[derive(Debug, Serialize)]
pub struct GrantCreditsResponse {
    pub op_id: String,
    pub balance: u64,
    pub replayed: bool,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: u32,
}

fn default_history_limit() -> u32 {
    50
}

// -- Pricing --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PricingOptionInput {
    pub duration_hours: u32,
    pub price_credits: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetPricingRequest {
    pub options: Vec<PricingOptionInput>,
}

// -- Sessions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateSessionRequest {
    pub creator_id: AccountId,
    pub pricing_option_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtendSessionRequest {
    pub pricing_option_id: Uuid,
}

/// Charge kinds a client may trigger inside an existing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionChargeKind {
    PaymentRequest,
    SpamAccept,
}

impl From<SessionChargeKind> for OperationKind {
    fn from(kind: SessionChargeKind) -> Self {
        match kind {
            SessionChargeKind::PaymentRequest => OperationKind::PaymentRequest,
            SessionChargeKind::SpamAccept => OperationKind::SpamAccept,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionChargeRequest {
    pub kind: SessionChargeKind,
    pub amount: u64,
    /// Id of the payment request or message being paid for.
    pub reference: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub session: ChatSession,
    pub state: SessionState,
}

// -- Withdrawals --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WithdrawalCreateRequest {
    pub amount: u64,
    pub bank: BankDetails,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolveWithdrawalRequest {
    pub outcome: WithdrawalOutcome,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    pub amount: u64,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}
