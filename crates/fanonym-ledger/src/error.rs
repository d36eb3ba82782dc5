use rusqlite::ErrorCode;
use thiserror::Error;

/// Every failure a ledger operation can report. All of them are local to the
/// one operation that produced them.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient funds: needed {needed}, available {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    #[error("cannot {action} {entity} in state {from}: already processed")]
    InvalidStateTransition {
        entity: &'static str,
        from: String,
        action: &'static str,
    },

    /// A concurrent writer changed the row first. Retried once internally
    /// before it reaches a caller.
    #[error("concurrent update conflict, try again")]
    ConcurrencyConflict,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("account is not a participant of this {0}")]
    NotParticipant(&'static str),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    Storage(anyhow::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

impl LedgerError {
    /// Stable machine-readable code for API consumers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::InvalidStateTransition { .. } => "invalid_state_transition",
            Self::ConcurrencyConflict => "concurrency_conflict",
            Self::NotFound(_) => "not_found",
            Self::NotParticipant(_) => "not_participant",
            Self::InvalidInput(_) => "invalid_input",
            Self::Storage(_) => "storage",
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub(crate) fn corrupt(what: &str, value: impl std::fmt::Display) -> Self {
        Self::Storage(anyhow::anyhow!("corrupt {} '{}'", what, value))
    }
}

/// Lock contention from SQLite is a lost race, not a storage failure.
impl From<anyhow::Error> for LedgerError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<rusqlite::Error>() {
            Some(rusqlite::Error::SqliteFailure(e, _))
                if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                Self::ConcurrencyConflict
            }
            _ => Self::Storage(err),
        }
    }
}
