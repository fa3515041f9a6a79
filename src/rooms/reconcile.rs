//! Periodic sweep for messages stuck before `delivered`.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tracing::{info, warn};

use super::relay::Relay;

/// Run [`Relay::reconcile`] every `every`, forever.
///
/// `grace` keeps the sweep away from sends that are still in flight.
pub async fn run(relay: Arc<Relay>, every: Duration, grace: Duration) {
    info!(?every, ?grace, "delivery reconciliation enabled");
    let mut ticker = time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if let Err(e) = relay.reconcile(grace).await {
            warn!(error = %e, "reconciliation sweep failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::message::NewMessage;
    use crate::rooms::broadcast::Broadcaster;
    use crate::rooms::registry::RoomRegistry;
    use crate::store::{MemoryStore, MessageStore};

    #[tokio::test(start_paused = true)]
    async fn sweep_redelivers_on_tick() {
        let store = Arc::new(MemoryStore::new());
        let relay = Arc::new(Relay::new(
            store.clone(),
            Broadcaster::new(Arc::new(RoomRegistry::new())),
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = relay.connect(tx).await;
        relay.join(&conn, "R1").await.unwrap();
        rx.recv().await.unwrap();

        store
            .append(
                "R1",
                NewMessage {
                    sender_id: conn.to_string(),
                    message: "late".to_owned(),
                },
            )
            .await
            .unwrap();

        let sweep = tokio::spawn(run(relay, Duration::from_secs(5), Duration::ZERO));

        let broadcast = rx.recv().await.unwrap();
        assert!(broadcast.contains("\"late\""));
        let delivered = rx.recv().await.unwrap();
        assert!(delivered.contains("messageDelivered"));
        assert!(store.list_by_room("R1").await.unwrap()[0].delivered);
        sweep.abort();
    }
}
