//! Realtime delivery of committed ledger events over WebSocket.

pub mod connection;
pub mod dispatcher;
