//! Database row types. These map directly to SQLite rows: ids and
//! timestamps stay as stored text, amounts as SQLite integers.

pub struct PricingOptionRow {
    pub id: String,
    pub creator_id: String,
    pub duration_hours: i64,
    pub price_credits: i64,
}

pub struct SessionRow {
    pub id: String,
    pub sender_id: String,
    pub creator_id: String,
    pub credits_paid: i64,
    pub duration_hours: i64,
    pub status: String,
    pub is_accepted: bool,
    pub credits_transferred: bool,
    pub extension_count: i64,
    pub created_at: String,
    pub accepted_at: Option<String>,
    pub expires_at: Option<String>,
    /// Client key the sender opened the session with, unique per sender.
    pub request_key: String,
}

pub struct WithdrawalRow {
    pub id: String,
    pub creator_id: String,
    pub amount: i64,
    pub bank_name: String,
    pub account_number: String,
    pub account_holder: String,
    pub gross_idr: i64,
    pub platform_fee_idr: i64,
    pub transfer_fee_idr: i64,
    pub net_idr: i64,
    pub status: String,
    pub note: Option<String>,
    pub created_at: String,
    pub resolved_at: Option<String>,
}

pub struct OperationRow {
    pub op_id: String,
    pub kind: String,
    pub sender_id: Option<String>,
    pub creator_id: Option<String>,
    pub amount: i64,
    pub created_at: String,
}

pub struct EntryRow {
    pub op_id: String,
    pub owner_id: String,
    pub kind: String,
    pub delta: i64,
    pub balance_after: i64,
    pub created_at: String,
}
