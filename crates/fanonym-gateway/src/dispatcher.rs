use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use fanonym_types::events::LedgerEvent;

/// Fans committed ledger events out to every connected client. Each
/// connection filters the stream down to what its account may see.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    broadcast_tx: broadcast::Sender<LedgerEvent>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner { broadcast_tx }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Publish an event. Only call this after the operation that produced it
    /// has committed; a send with no listeners is not an error.
    pub fn publish(&self, event: LedgerEvent) {
        if self.inner.broadcast_tx.send(event).is_err() {
            debug!("No gateway listeners, event dropped");
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanonym_types::models::Balances;
    use uuid::Uuid;

    #[tokio::test]
    async fn published_events_reach_subscribers() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        let account_id = Uuid::new_v4();

        dispatcher.publish(LedgerEvent::BalanceChanged {
            account_id,
            balances: Balances::default(),
        });

        match rx.recv().await.unwrap() {
            LedgerEvent::BalanceChanged { account_id: got, .. } => assert_eq!(got, account_id),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn publish_without_listeners_is_harmless() {
        let dispatcher = Dispatcher::new();
        dispatcher.publish(LedgerEvent::Ready {
            account_id: Uuid::new_v4(),
        });
    }
}
