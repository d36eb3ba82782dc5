//! Chat session lifecycle.
//!
//! ```text
//! create ──► pending_accept ──accept──► active ──(expires_at passes)──► expired
//!                 │                       │  ▲                             │
//!                 │                       └──┘ extend                      │
//!                 └──────────delete (refund)──► deleted ◄──────delete──────┘
//! ```
//!
//! The sender pays into escrow when the session is created; the creator is
//! credited when they accept. `expired` is never stored: it is derived from
//! `expires_at` whenever a session is read.

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use fanonym_db::models::SessionRow;
use fanonym_db::{pricing, sessions};
use fanonym_types::models::{
    AccountId, BalanceKind, ChatSession, OperationKind, SessionCharge, SessionState,
    SessionStatus,
};

use crate::error::{LedgerError, Result};
use crate::escrow::{self, Operation};
use crate::pricing::option_from_row;
use crate::{Ledger, fmt_ts, from_db_amount, parse_id, parse_opt_ts, parse_ts, to_db_amount};

fn session_from_row(row: SessionRow) -> Result<ChatSession> {
    Ok(ChatSession {
        id: parse_id(&row.id)?,
        sender_id: parse_id(&row.sender_id)?,
        creator_id: parse_id(&row.creator_id)?,
        credits_paid: from_db_amount(row.credits_paid)?,
        duration_hours: u32::try_from(row.duration_hours)
            .map_err(|_| LedgerError::corrupt("duration", row.duration_hours))?,
        status: SessionStatus::parse(&row.status)
            .ok_or_else(|| LedgerError::corrupt("session status", &row.status))?,
        is_accepted: row.is_accepted,
        credits_transferred: row.credits_transferred,
        extension_count: u32::try_from(row.extension_count)
            .map_err(|_| LedgerError::corrupt("extension count", row.extension_count))?,
        created_at: parse_ts(&row.created_at)?,
        accepted_at: parse_opt_ts(row.accepted_at.as_deref())?,
        expires_at: parse_opt_ts(row.expires_at.as_deref())?,
    })
}

fn load(conn: &Connection, id: Uuid) -> Result<ChatSession> {
    let row = sessions::get(conn, &id.to_string())?.ok_or(LedgerError::NotFound("session"))?;
    session_from_row(row)
}

fn invalid_transition(session: &ChatSession, now: DateTime<Utc>, action: &'static str) -> LedgerError {
    LedgerError::InvalidStateTransition {
        entity: "session",
        from: session.state_at(now).to_string(),
        action,
    }
}

/// `start` pushed forward by `h` hours, refused when the result leaves the
/// representable date range.
fn expiry_after(start: DateTime<Utc>, h: u32) -> Result<DateTime<Utc>> {
    start
        .checked_add_signed(Duration::hours(i64::from(h)))
        .ok_or_else(|| LedgerError::invalid("session expiry out of range"))
}

impl Ledger {
    /// Unlock a chat: the sender pays the option's price into escrow and the
    /// session waits for the creator in `pending_accept`. `request_key`
    /// identifies the request: retrying with the same key returns the session
    /// it opened instead of charging again. The flag is true on such a replay.
    pub fn create_session(
        &self,
        sender_id: AccountId,
        creator_id: AccountId,
        pricing_option_id: Uuid,
        request_key: &str,
    ) -> Result<(ChatSession, bool)> {
        if sender_id == creator_id {
            return Err(LedgerError::invalid("cannot open a session with yourself"));
        }
        if request_key.is_empty() {
            return Err(LedgerError::invalid("request key must not be empty"));
        }

        let session_id = Uuid::new_v4();
        let op_id = format!("session:{}:open:{}", sender_id, request_key);

        let (session, replayed) = self.retry_once("create_session", || {
            let now = self.now();
            let ts = fmt_ts(now);
            self.db.with_tx(|tx| {
                let option = pricing::get(tx, &pricing_option_id.to_string())?
                    .ok_or(LedgerError::NotFound("pricing option"))
                    .and_then(option_from_row)?;
                if option.creator_id != creator_id {
                    return Err(LedgerError::invalid("pricing option belongs to another creator"));
                }

                let op = Operation {
                    op_id: &op_id,
                    kind: OperationKind::SessionHold,
                    sender_id: Some(sender_id),
                    creator_id: Some(creator_id),
                    amount: option.price_credits,
                };

                let sender = sender_id.to_string();
                if let Some(row) = sessions::get_by_request_key(tx, &sender, request_key)? {
                    let existing = session_from_row(row)?;
                    let same_hold = escrow::find(tx, &op_id)?.is_some_and(|row| op.matches(&row));
                    if existing.creator_id != creator_id || !same_hold {
                        return Err(LedgerError::invalid(format!(
                            "request key {} was already used for a different session",
                            request_key
                        )));
                    }
                    return Ok((existing, true));
                }

                escrow::hold(tx, &op, (sender_id, BalanceKind::SenderCredit), &ts)?;

                sessions::insert(
                    tx,
                    &SessionRow {
                        id: session_id.to_string(),
                        sender_id: sender,
                        creator_id: creator_id.to_string(),
                        credits_paid: to_db_amount(option.price_credits)?,
                        duration_hours: i64::from(option.duration_hours),
                        status: SessionStatus::PendingAccept.as_str().to_string(),
                        is_accepted: false,
                        credits_transferred: false,
                        extension_count: 0,
                        created_at: ts.clone(),
                        accepted_at: None,
                        expires_at: None,
                        request_key: request_key.to_string(),
                    },
                )?;

                Ok((load(tx, session_id)?, false))
            })
        })?;

        if replayed {
            info!("Session {} already opened with key {}, replaying", session.id, request_key);
        } else {
            info!(
                "Session {} created: {} -> {} ({} credits in escrow)",
                session.id, sender_id, creator_id, session.credits_paid
            );
        }
        Ok((session, replayed))
    }

    /// Creator accepts a pending session: escrow is released to their
    /// earnings and the timer starts. Only one accept can ever succeed; any
    /// later one fails with `InvalidStateTransition` and moves nothing.
    pub fn accept_session(&self, session_id: Uuid, actor: AccountId) -> Result<ChatSession> {
        let session = self.retry_once("accept_session", || {
            let now = self.now();
            let ts = fmt_ts(now);
            self.db.with_tx(|tx| {
                let session = load(tx, session_id)?;
                if session.creator_id != actor {
                    return Err(LedgerError::NotParticipant("session"));
                }

                let expires_at = expiry_after(now, session.duration_hours)?;
                let changed =
                    sessions::mark_accepted(tx, &session_id.to_string(), &ts, &fmt_ts(expires_at))?;
                if changed == 0 {
                    return Err(invalid_transition(&session, now, "accept"));
                }

                let op_id = format!("session:{}:accept", session_id);
                let op = Operation {
                    op_id: &op_id,
                    kind: OperationKind::SessionAccept,
                    sender_id: Some(session.sender_id),
                    creator_id: Some(session.creator_id),
                    amount: session.credits_paid,
                };
                escrow::release(tx, &op, (session.creator_id, BalanceKind::CreatorEarning), &ts)?;

                load(tx, session_id)
            })
        })?;

        info!(
            "Session {} accepted, {} credits released, expires {}",
            session_id,
            session.credits_paid,
            session.expires_at.map(fmt_ts).unwrap_or_default()
        );
        Ok(session)
    }

    /// Sender buys more time on an active session. `request_key` identifies
    /// the request: retrying with the same key returns the session without
    /// charging again, and the flag is true. Reusing a key with a different
    /// option is refused.
    pub fn extend_session(
        &self,
        session_id: Uuid,
        actor: AccountId,
        pricing_option_id: Uuid,
        request_key: &str,
    ) -> Result<(ChatSession, bool)> {
        if request_key.is_empty() {
            return Err(LedgerError::invalid("request key must not be empty"));
        }
        let op_id = format!("session:{}:extend:{}", session_id, request_key);

        let (session, replayed) = self.retry_once("extend_session", || {
            let now = self.now();
            self.db.with_tx(|tx| {
                let session = load(tx, session_id)?;
                if session.sender_id != actor {
                    return Err(LedgerError::NotParticipant("session"));
                }

                let option = pricing::get(tx, &pricing_option_id.to_string())?
                    .ok_or(LedgerError::NotFound("pricing option"))
                    .and_then(option_from_row)?;
                if option.creator_id != session.creator_id {
                    return Err(LedgerError::invalid("pricing option belongs to another creator"));
                }

                if let Some(existing) = escrow::find(tx, &op_id)? {
                    let op = Operation {
                        op_id: &op_id,
                        kind: OperationKind::SessionExtend,
                        sender_id: Some(session.sender_id),
                        creator_id: Some(session.creator_id),
                        amount: option.price_credits,
                    };
                    if !op.matches(&existing) {
                        return Err(LedgerError::invalid(format!(
                            "request key {} was already used for a different extension",
                            request_key
                        )));
                    }
                    return Ok((session, true));
                }

                let Some(expires_at) = session.expires_at else {
                    return Err(invalid_transition(&session, now, "extend"));
                };
                if session.state_at(now) != SessionState::Active {
                    return Err(invalid_transition(&session, now, "extend"));
                }
                let new_expiry = expiry_after(expires_at, option.duration_hours)?;

                escrow::charge(
                    tx,
                    &op_id,
                    OperationKind::SessionExtend,
                    session.sender_id,
                    session.creator_id,
                    option.price_credits,
                    now,
                )?;

                let changed = sessions::extend(
                    tx,
                    &session_id.to_string(),
                    i64::from(session.extension_count),
                    to_db_amount(option.price_credits)?,
                    i64::from(option.duration_hours),
                    &fmt_ts(new_expiry),
                )?;
                if changed == 0 {
                    // Rolls the charge back with the rest of the transaction.
                    return Err(LedgerError::ConcurrencyConflict);
                }

                Ok((load(tx, session_id)?, false))
            })
        })?;

        if replayed {
            info!("Extension {} of session {} already applied, replaying", request_key, session_id);
        } else {
            info!(
                "Session {} extended to {} ({} credits paid in total)",
                session_id,
                session.expires_at.map(fmt_ts).unwrap_or_default(),
                session.credits_paid
            );
        }
        Ok((session, replayed))
    }

    /// Charge inside a session for a payment request (the sender pays, the
    /// session must be running) or for a paid message the creator accepts
    /// (any session that is not deleted). `reference` names the request or
    /// message so each is paid once.
    pub fn charge_in_session(
        &self,
        session_id: Uuid,
        actor: AccountId,
        kind: OperationKind,
        amount: u64,
        reference: &str,
    ) -> Result<SessionCharge> {
        if reference.is_empty() {
            return Err(LedgerError::invalid("reference must not be empty"));
        }
        let op_id = format!("session:{}:{}:{}", session_id, kind.as_str(), reference);

        self.retry_once("charge_in_session", || {
            let now = self.now();
            self.db.with_tx(|tx| {
                let session = load(tx, session_id)?;
                let state = session.state_at(now);

                match kind {
                    OperationKind::PaymentRequest => {
                        if session.sender_id != actor {
                            return Err(LedgerError::NotParticipant("session"));
                        }
                        if state != SessionState::Active {
                            return Err(invalid_transition(&session, now, "pay a request in"));
                        }
                    }
                    OperationKind::SpamAccept => {
                        if session.creator_id != actor {
                            return Err(LedgerError::NotParticipant("session"));
                        }
                        if state == SessionState::Deleted {
                            return Err(invalid_transition(&session, now, "accept a message in"));
                        }
                    }
                    other => {
                        return Err(LedgerError::invalid(format!(
                            "{} is not a session charge",
                            other.as_str()
                        )));
                    }
                }

                escrow::charge(tx, &op_id, kind, session.sender_id, session.creator_id, amount, now)
            })
        })
    }

    /// Creator removes a session. A pending session is declined and its
    /// escrow refunded to the sender; an accepted one keeps its funds where
    /// they are. Returns the deleted session and the state it was in.
    pub fn delete_session(
        &self,
        session_id: Uuid,
        actor: AccountId,
    ) -> Result<(ChatSession, SessionState)> {
        let (session, previous) = self.retry_once("delete_session", || {
            let now = self.now();
            let ts = fmt_ts(now);
            self.db.with_tx(|tx| {
                let session = load(tx, session_id)?;
                if session.creator_id != actor {
                    return Err(LedgerError::NotParticipant("session"));
                }
                let previous = session.state_at(now);
                let id = session_id.to_string();

                match session.status {
                    SessionStatus::Deleted => return Err(invalid_transition(&session, now, "delete")),
                    SessionStatus::PendingAccept => {
                        if sessions::mark_deleted(tx, &id, SessionStatus::PendingAccept.as_str())? == 0 {
                            return Err(LedgerError::ConcurrencyConflict);
                        }
                        if !session.credits_transferred {
                            let op_id = format!("session:{}:refund", session_id);
                            let op = Operation {
                                op_id: &op_id,
                                kind: OperationKind::SessionRefund,
                                sender_id: Some(session.sender_id),
                                creator_id: Some(session.creator_id),
                                amount: session.credits_paid,
                            };
                            escrow::release(tx, &op, (session.sender_id, BalanceKind::SenderCredit), &ts)?;
                        }
                    }
                    SessionStatus::Active => {
                        if sessions::mark_deleted(tx, &id, SessionStatus::Active.as_str())? == 0 {
                            return Err(LedgerError::ConcurrencyConflict);
                        }
                    }
                }

                Ok((load(tx, session_id)?, previous))
            })
        })?;

        info!("Session {} deleted from state {}", session_id, previous);
        Ok((session, previous))
    }

    /// A participant's view of a session.
    pub fn get_session(&self, session_id: Uuid, viewer: AccountId) -> Result<ChatSession> {
        let row = self
            .db
            .with_conn(|conn| sessions::get(conn, &session_id.to_string()))?
            .ok_or(LedgerError::NotFound("session"))?;
        let session = session_from_row(row)?;

        if !session.is_participant(viewer) {
            return Err(LedgerError::NotParticipant("session"));
        }
        Ok(session)
    }

    /// Sessions the account sends or receives, newest first.
    pub fn list_sessions(&self, account: AccountId) -> Result<Vec<ChatSession>> {
        let rows = self
            .db
            .with_conn(|conn| sessions::list_for_account(conn, &account.to_string()))?;
        rows.into_iter().map(session_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use fanonym_types::models::PricingOption;

    struct Fixture {
        ledger: Ledger,
        clock: std::sync::Arc<crate::ManualClock>,
        sender: Uuid,
        creator: Uuid,
        options: Vec<PricingOption>,
    }

    /// Sender holds `credits`; creator sells 1h for 20 and 24h for 100.
    fn fixture(credits: u64) -> Fixture {
        let (ledger, clock) = testutil::ledger();
        let (sender, creator) = (Uuid::new_v4(), Uuid::new_v4());
        testutil::fund(&ledger, sender, credits);
        let options = testutil::priced(&ledger, creator, &[(1, 20), (24, 100)]);
        Fixture {
            ledger,
            clock,
            sender,
            creator,
            options,
        }
    }

    /// Opens a session under a fresh request key.
    fn open(f: &Fixture, option_id: Uuid) -> ChatSession {
        let key = Uuid::new_v4().to_string();
        let (session, replayed) = f
            .ledger
            .create_session(f.sender, f.creator, option_id, &key)
            .unwrap();
        assert!(!replayed);
        session
    }

    fn credits(f: &Fixture, account: Uuid, kind: BalanceKind) -> u64 {
        f.ledger.get_balance(account, kind).unwrap()
    }

    #[test]
    fn create_holds_credits_in_escrow() {
        let f = fixture(50);
        let s = open(&f, f.options[0].id);

        assert_eq!(s.state_at(f.ledger.now()), SessionState::PendingAccept);
        assert_eq!(s.credits_paid, 20);
        assert!(!s.credits_transferred);
        assert_eq!(credits(&f, f.sender, BalanceKind::SenderCredit), 30);
        assert_eq!(credits(&f, f.creator, BalanceKind::CreatorEarning), 0);
    }

    #[test]
    fn retried_create_holds_once() {
        let f = fixture(50);

        let (first, replayed_first) = f
            .ledger
            .create_session(f.sender, f.creator, f.options[0].id, "open-1")
            .unwrap();
        let (second, replayed_second) = f
            .ledger
            .create_session(f.sender, f.creator, f.options[0].id, "open-1")
            .unwrap();

        assert!(!replayed_first && replayed_second);
        assert_eq!(first.id, second.id);
        assert_eq!(credits(&f, f.sender, BalanceKind::SenderCredit), 30);
        assert_eq!(f.ledger.list_sessions(f.sender).unwrap().len(), 1);

        // Keys are scoped to the sender.
        let other_sender = Uuid::new_v4();
        testutil::fund(&f.ledger, other_sender, 20);
        let (theirs, replayed) = f
            .ledger
            .create_session(other_sender, f.creator, f.options[0].id, "open-1")
            .unwrap();
        assert!(!replayed);
        assert_ne!(theirs.id, first.id);
    }

    #[test]
    fn reused_create_key_with_other_option_is_refused() {
        let f = fixture(200);
        f.ledger
            .create_session(f.sender, f.creator, f.options[0].id, "open-1")
            .unwrap();

        let err = f
            .ledger
            .create_session(f.sender, f.creator, f.options[1].id, "open-1")
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));

        let err = f
            .ledger
            .create_session(f.sender, f.creator, f.options[0].id, "")
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));
        assert_eq!(credits(&f, f.sender, BalanceKind::SenderCredit), 180);
    }

    #[test]
    fn create_fails_without_funds_and_leaves_nothing_behind() {
        let f = fixture(5);
        let expensive = testutil::priced(&f.ledger, f.creator, &[(2, 10)]);

        let err = f
            .ledger
            .create_session(f.sender, f.creator, expensive[0].id, "open-1")
            .unwrap_err();

        assert!(matches!(err, LedgerError::InsufficientFunds { needed: 10, available: 5 }));
        assert_eq!(credits(&f, f.sender, BalanceKind::SenderCredit), 5);
        assert!(f.ledger.list_sessions(f.sender).unwrap().is_empty());
    }

    #[test]
    fn create_rejects_foreign_pricing_option() {
        let f = fixture(50);
        let other = Uuid::new_v4();
        let err = f
            .ledger
            .create_session(f.sender, other, f.options[0].id, "open-1")
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));
        assert_eq!(credits(&f, f.sender, BalanceKind::SenderCredit), 50);
    }

    #[test]
    fn accept_releases_escrow_and_starts_timer() {
        let f = fixture(50);
        let s = open(&f, f.options[0].id);

        f.clock.advance(Duration::minutes(10));
        let accepted = f.ledger.accept_session(s.id, f.creator).unwrap();

        let now = f.ledger.now();
        assert_eq!(accepted.state_at(now), SessionState::Active);
        assert!(accepted.is_accepted && accepted.credits_transferred);
        assert_eq!(accepted.accepted_at, Some(now));
        assert_eq!(accepted.expires_at, Some(now + Duration::hours(1)));
        assert_eq!(credits(&f, f.creator, BalanceKind::CreatorEarning), 20);
        assert_eq!(credits(&f, f.sender, BalanceKind::SenderCredit), 30);
    }

    #[test]
    fn second_accept_is_rejected_and_moves_nothing() {
        let f = fixture(50);
        let s = open(&f, f.options[0].id);

        let first = f.ledger.accept_session(s.id, f.creator).unwrap();
        f.clock.advance(Duration::minutes(5));
        let err = f.ledger.accept_session(s.id, f.creator).unwrap_err();

        assert!(matches!(err, LedgerError::InvalidStateTransition { action: "accept", .. }));
        let after = f.ledger.get_session(s.id, f.sender).unwrap();
        assert_eq!(after.expires_at, first.expires_at);
        assert_eq!(credits(&f, f.creator, BalanceKind::CreatorEarning), 20);
        assert_eq!(credits(&f, f.sender, BalanceKind::SenderCredit), 30);
    }

    #[test]
    fn concurrent_accepts_transfer_exactly_once() {
        let f = fixture(50);
        let s = open(&f, f.options[0].id);

        let results: Vec<Result<ChatSession>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let ledger = &f.ledger;
                    let (id, creator) = (s.id, f.creator);
                    scope.spawn(move || ledger.accept_session(id, creator))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(
            r,
            Err(LedgerError::InvalidStateTransition { .. })
        )));
        assert_eq!(credits(&f, f.creator, BalanceKind::CreatorEarning), 20);
    }

    #[test]
    fn only_the_creator_accepts() {
        let f = fixture(50);
        let s = open(&f, f.options[0].id);
        let err = f.ledger.accept_session(s.id, f.sender).unwrap_err();
        assert!(matches!(err, LedgerError::NotParticipant(_)));
    }

    #[test]
    fn extensions_accumulate_and_push_expiry_forward() {
        let f = fixture(300);
        let s = open(&f, f.options[0].id);
        let accepted = f.ledger.accept_session(s.id, f.creator).unwrap();

        let once = f
            .ledger
            .extend_session(s.id, f.sender, f.options[0].id, "req-1")
            .unwrap()
            .0;
        let twice = f
            .ledger
            .extend_session(s.id, f.sender, f.options[1].id, "req-2")
            .unwrap()
            .0;

        assert_eq!(once.credits_paid, 40);
        assert_eq!(twice.credits_paid, 140);
        assert_eq!(twice.duration_hours, 26);
        assert_eq!(twice.extension_count, 2);
        assert!(once.expires_at > accepted.expires_at);
        assert!(twice.expires_at > once.expires_at);
        assert_eq!(
            twice.expires_at,
            accepted.expires_at.map(|e| e + Duration::hours(25))
        );
        assert_eq!(credits(&f, f.sender, BalanceKind::SenderCredit), 160);
        assert_eq!(credits(&f, f.creator, BalanceKind::CreatorEarning), 140);
    }

    #[test]
    fn retried_extend_charges_once() {
        let f = fixture(100);
        let s = open(&f, f.options[0].id);
        f.ledger.accept_session(s.id, f.creator).unwrap();

        let (a, a_replayed) = f.ledger.extend_session(s.id, f.sender, f.options[0].id, "req-1").unwrap();
        let (b, b_replayed) = f.ledger.extend_session(s.id, f.sender, f.options[0].id, "req-1").unwrap();

        assert!(!a_replayed && b_replayed);
        assert_eq!(a.expires_at, b.expires_at);
        assert_eq!(b.credits_paid, 40);
        assert_eq!(credits(&f, f.sender, BalanceKind::SenderCredit), 60);

        // Replays still answer once the session has run out.
        f.clock.advance(Duration::hours(3));
        let (_, replayed) = f.ledger.extend_session(s.id, f.sender, f.options[0].id, "req-1").unwrap();
        assert!(replayed);
    }

    #[test]
    fn reused_extend_key_with_other_option_is_refused() {
        let f = fixture(300);
        let s = open(&f, f.options[0].id);
        f.ledger.accept_session(s.id, f.creator).unwrap();
        let (extended, _) = f.ledger.extend_session(s.id, f.sender, f.options[0].id, "req-1").unwrap();

        let err = f
            .ledger
            .extend_session(s.id, f.sender, f.options[1].id, "req-1")
            .unwrap_err();

        assert!(matches!(err, LedgerError::InvalidInput(_)));
        let after = f.ledger.get_session(s.id, f.sender).unwrap();
        assert_eq!(after.expires_at, extended.expires_at);
        assert_eq!(after.credits_paid, 40);
        assert_eq!(credits(&f, f.sender, BalanceKind::SenderCredit), 260);
    }

    #[test]
    fn expiry_past_the_calendar_is_refused() {
        let edge = DateTime::<Utc>::MAX_UTC - Duration::hours(1);
        assert!(matches!(expiry_after(edge, 2), Err(LedgerError::InvalidInput(_))));
        assert_eq!(expiry_after(edge, 1).unwrap(), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn extend_requires_a_running_session() {
        let f = fixture(100);
        let s = open(&f, f.options[0].id);

        let err = f
            .ledger
            .extend_session(s.id, f.sender, f.options[0].id, "early")
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidStateTransition { .. }));

        f.ledger.accept_session(s.id, f.creator).unwrap();
        f.clock.advance(Duration::hours(2));
        let err = f
            .ledger
            .extend_session(s.id, f.sender, f.options[0].id, "late")
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidStateTransition { ref from, .. } if from == "expired"
        ));
        assert_eq!(credits(&f, f.sender, BalanceKind::SenderCredit), 80);
    }

    #[test]
    fn extend_without_funds_keeps_session_unchanged() {
        let f = fixture(20);
        let s = open(&f, f.options[0].id);
        let accepted = f.ledger.accept_session(s.id, f.creator).unwrap();

        let err = f
            .ledger
            .extend_session(s.id, f.sender, f.options[0].id, "req-1")
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));

        let after = f.ledger.get_session(s.id, f.creator).unwrap();
        assert_eq!(after.expires_at, accepted.expires_at);
        assert_eq!(after.credits_paid, 20);
    }

    #[test]
    fn session_expires_lazily() {
        let f = fixture(50);
        let s = open(&f, f.options[0].id);
        f.ledger.accept_session(s.id, f.creator).unwrap();

        f.clock.advance(Duration::minutes(59));
        let s1 = f.ledger.get_session(s.id, f.sender).unwrap();
        assert_eq!(s1.state_at(f.ledger.now()), SessionState::Active);

        f.clock.advance(Duration::minutes(1));
        let s2 = f.ledger.get_session(s.id, f.sender).unwrap();
        assert_eq!(s2.state_at(f.ledger.now()), SessionState::Expired);
    }

    #[test]
    fn declining_a_pending_session_refunds_the_sender() {
        let f = fixture(50);
        let s = open(&f, f.options[0].id);

        let (deleted, previous) = f.ledger.delete_session(s.id, f.creator).unwrap();

        assert_eq!(previous, SessionState::PendingAccept);
        assert_eq!(deleted.status, SessionStatus::Deleted);
        assert_eq!(credits(&f, f.sender, BalanceKind::SenderCredit), 50);
        assert!(matches!(
            f.ledger.accept_session(s.id, f.creator),
            Err(LedgerError::InvalidStateTransition { .. })
        ));
        assert!(matches!(
            f.ledger.delete_session(s.id, f.creator),
            Err(LedgerError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn deleting_an_accepted_session_keeps_earnings() {
        let f = fixture(50);
        let s = open(&f, f.options[0].id);
        f.ledger.accept_session(s.id, f.creator).unwrap();
        f.clock.advance(Duration::hours(3));

        let (_, previous) = f.ledger.delete_session(s.id, f.creator).unwrap();
        assert_eq!(previous, SessionState::Expired);
        assert_eq!(credits(&f, f.creator, BalanceKind::CreatorEarning), 20);
        assert_eq!(credits(&f, f.sender, BalanceKind::SenderCredit), 30);
    }

    #[test]
    fn payment_requests_need_an_active_session() {
        let f = fixture(100);
        let s = open(&f, f.options[0].id);

        let err = f
            .ledger
            .charge_in_session(s.id, f.sender, OperationKind::PaymentRequest, 15, "pr-1")
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidStateTransition { .. }));

        f.ledger.accept_session(s.id, f.creator).unwrap();
        let charge = f
            .ledger
            .charge_in_session(s.id, f.sender, OperationKind::PaymentRequest, 15, "pr-1")
            .unwrap();
        let replay = f
            .ledger
            .charge_in_session(s.id, f.sender, OperationKind::PaymentRequest, 15, "pr-1")
            .unwrap();

        assert!(!charge.replayed && replay.replayed);
        assert_eq!(credits(&f, f.sender, BalanceKind::SenderCredit), 65);
        assert_eq!(credits(&f, f.creator, BalanceKind::CreatorEarning), 35);
    }

    #[test]
    fn spam_accept_is_the_creators_call() {
        let f = fixture(100);
        let s = open(&f, f.options[0].id);

        let err = f
            .ledger
            .charge_in_session(s.id, f.sender, OperationKind::SpamAccept, 5, "msg-1")
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotParticipant(_)));

        f.ledger
            .charge_in_session(s.id, f.creator, OperationKind::SpamAccept, 5, "msg-1")
            .unwrap();
        assert_eq!(credits(&f, f.creator, BalanceKind::CreatorEarning), 5);

        let err = f
            .ledger
            .charge_in_session(s.id, f.creator, OperationKind::CreditGrant, 5, "msg-2")
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));
    }

    #[test]
    fn outsiders_cannot_view_sessions() {
        let f = fixture(50);
        let s = open(&f, f.options[0].id);

        assert!(matches!(
            f.ledger.get_session(s.id, Uuid::new_v4()),
            Err(LedgerError::NotParticipant(_))
        ));
        assert!(matches!(
            f.ledger.get_session(Uuid::new_v4(), f.sender),
            Err(LedgerError::NotFound(_))
        ));
        assert_eq!(f.ledger.list_sessions(f.creator).unwrap().len(), 1);
    }
}
