use std::sync::Arc;

use tracing::{error, warn};

use fanonym_gateway::dispatcher::Dispatcher;
use fanonym_ledger::Ledger;
use fanonym_types::events::LedgerEvent;
use fanonym_types::models::AccountId;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub ledger: Ledger,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
}

impl AppStateInner {
    /// Run a blocking ledger operation off the async runtime.
    pub async fn run<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Ledger) -> fanonym_ledger::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let ledger = self.ledger.clone();
        tokio::task::spawn_blocking(move || f(&ledger))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal
            })?
            .map_err(ApiError::from)
    }

    /// Push fresh balances for each account to its realtime connections.
    /// A failed read only costs the notification; the operation has committed.
    pub async fn publish_balances(&self, accounts: &[AccountId]) {
        for &account_id in accounts {
            match self.run(move |ledger| ledger.balances(account_id)).await {
                Ok(balances) => self.dispatcher.publish(LedgerEvent::BalanceChanged {
                    account_id,
                    balances,
                }),
                Err(e) => warn!("Could not publish balances of {}: {}", account_id, e),
            }
        }
    }
}
