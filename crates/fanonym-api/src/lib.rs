//! HTTP surface over the credit ledger. Handlers authenticate the caller,
//! run the ledger operation off the async runtime and publish realtime
//! events once it has committed.

pub mod balances;
pub mod credits;
pub mod error;
pub mod middleware;
pub mod pricing;
pub mod routes;
pub mod sessions;
pub mod state;
pub mod withdrawals;

pub use error::ApiError;
pub use routes::router;
pub use state::{AppState, AppStateInner};
