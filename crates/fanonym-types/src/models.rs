use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account identity as issued by the external auth provider.
pub type AccountId = Uuid;

// -- Balances --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceKind {
    /// Credits a sender has bought and not yet spent.
    SenderCredit,
    /// Credits a creator has earned and not yet withdrawn.
    CreatorEarning,
}

impl BalanceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SenderCredit => "sender_credit",
            Self::CreatorEarning => "creator_earning",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sender_credit" => Some(Self::SenderCredit),
            "creator_earning" => Some(Self::CreatorEarning),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    pub sender_credit: u64,
    pub creator_earning: u64,
}

/// One row of the append-only balance journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub op_id: String,
    pub owner_id: AccountId,
    pub kind: BalanceKind,
    pub delta: i64,
    pub balance_after: u64,
    pub created_at: DateTime<Utc>,
}

/// What a recorded ledger operation was for. Every fund movement is tagged
/// with one of these plus a unique operation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    SessionHold,
    SessionAccept,
    SessionExtend,
    SessionRefund,
    PaymentRequest,
    SpamAccept,
    CreditGrant,
    WithdrawalHold,
    WithdrawalRefund,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionHold => "session_hold",
            Self::SessionAccept => "session_accept",
            Self::SessionExtend => "session_extend",
            Self::SessionRefund => "session_refund",
            Self::PaymentRequest => "payment_request",
            Self::SpamAccept => "spam_accept",
            Self::CreditGrant => "credit_grant",
            Self::WithdrawalHold => "withdrawal_hold",
            Self::WithdrawalRefund => "withdrawal_refund",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "session_hold" => Self::SessionHold,
            "session_accept" => Self::SessionAccept,
            "session_extend" => Self::SessionExtend,
            "session_refund" => Self::SessionRefund,
            "payment_request" => Self::PaymentRequest,
            "spam_accept" => Self::SpamAccept,
            "credit_grant" => Self::CreditGrant,
            "withdrawal_hold" => Self::WithdrawalHold,
            "withdrawal_refund" => Self::WithdrawalRefund,
            _ => return None,
        })
    }
}

/// Result of moving credits from a sender to a creator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCharge {
    pub op_id: String,
    pub kind: OperationKind,
    pub sender_id: AccountId,
    pub creator_id: AccountId,
    pub amount: u64,
    /// True when the operation id had already been applied and nothing moved.
    pub replayed: bool,
    pub created_at: DateTime<Utc>,
}

// -- Pricing --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingOption {
    pub id: Uuid,
    pub creator_id: AccountId,
    pub duration_hours: u32,
    pub price_credits: u64,
}

// -- Sessions --

/// Status as persisted. Expiry is never stored; see [`ChatSession::state_at`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    PendingAccept,
    Active,
    Deleted,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingAccept => "pending_accept",
            Self::Active => "active",
            Self::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_accept" => Some(Self::PendingAccept),
            "active" => Some(Self::Active),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// Observable lifecycle state, derived from the stored status and the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    PendingAccept,
    Active,
    Expired,
    Deleted,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingAccept => "pending_accept",
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub sender_id: AccountId,
    pub creator_id: AccountId,
    /// Cumulative credits paid, including extensions.
    pub credits_paid: u64,
    /// Cumulative hours bought, including extensions.
    pub duration_hours: u32,
    pub status: SessionStatus,
    pub is_accepted: bool,
    pub credits_transferred: bool,
    pub extension_count: u32,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ChatSession {
    /// Expiry is computed lazily against wall-clock time at read time.
    pub fn state_at(&self, now: DateTime<Utc>) -> SessionState {
        match self.status {
            SessionStatus::PendingAccept => SessionState::PendingAccept,
            SessionStatus::Deleted => SessionState::Deleted,
            SessionStatus::Active => match self.expires_at {
                Some(expires_at) if expires_at <= now => SessionState::Expired,
                _ => SessionState::Active,
            },
        }
    }

    pub fn is_participant(&self, account: AccountId) -> bool {
        self.sender_id == account || self.creator_id == account
    }
}

// -- Withdrawals --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankDetails {
    pub bank_name: String,
    pub account_number: String,
    pub account_holder: String,
}

/// Conversion of a credit amount into a cash payout, in IDR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutQuote {
    pub credits: u64,
    pub gross_idr: u64,
    pub platform_fee_idr: u64,
    pub transfer_fee_idr: u64,
    pub net_idr: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Completed,
    Rejected,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalOutcome {
    Completed,
    Rejected,
}

impl From<WithdrawalOutcome> for WithdrawalStatus {
    fn from(outcome: WithdrawalOutcome) -> Self {
        match outcome {
            WithdrawalOutcome::Completed => Self::Completed,
            WithdrawalOutcome::Rejected => Self::Rejected,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: Uuid,
    pub creator_id: AccountId,
    /// Held amount in credits.
    pub amount: u64,
    pub bank: BankDetails,
    pub quote: PayoutQuote,
    pub status: WithdrawalStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(status: SessionStatus, expires_at: Option<DateTime<Utc>>) -> ChatSession {
        ChatSession {
            id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            creator_id: Uuid::new_v4(),
            credits_paid: 10,
            duration_hours: 1,
            status,
            is_accepted: status != SessionStatus::PendingAccept,
            credits_transferred: status != SessionStatus::PendingAccept,
            extension_count: 0,
            created_at: Utc::now(),
            accepted_at: None,
            expires_at,
        }
    }

    #[test]
    fn active_session_expires_lazily() {
        let now = Utc::now();
        let s = session(SessionStatus::Active, Some(now + Duration::hours(1)));
        assert_eq!(s.state_at(now), SessionState::Active);
        assert_eq!(s.state_at(now + Duration::hours(1)), SessionState::Expired);
    }

    #[test]
    fn pending_and_deleted_ignore_clock() {
        let now = Utc::now();
        let pending = session(SessionStatus::PendingAccept, None);
        assert_eq!(pending.state_at(now + Duration::days(365)), SessionState::PendingAccept);

        let deleted = session(SessionStatus::Deleted, Some(now - Duration::hours(1)));
        assert_eq!(deleted.state_at(now), SessionState::Deleted);
    }

    #[test]
    fn status_strings_parse_back() {
        for kind in [BalanceKind::SenderCredit, BalanceKind::CreatorEarning] {
            assert_eq!(BalanceKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(OperationKind::parse("spam_accept"), Some(OperationKind::SpamAccept));
        assert_eq!(WithdrawalStatus::parse("bogus"), None);
    }
}
