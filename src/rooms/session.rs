//! Per-connection event handling.

use std::sync::Arc;

use tracing::{debug, warn};

use super::protocol::{InboundEvent, OutboundEvent, peek_event_name};
use super::registry::{ConnectionId, Outbox};
use super::relay::{Presence, Relay};
use crate::error::RelayResult;

/// One live connection. Frames are handled one at a time, in the order the
/// connection sent them.
pub struct Session {
    id: ConnectionId,
    relay: Arc<Relay>,
}

impl Session {
    pub async fn open(relay: Arc<Relay>, outbox: Outbox) -> Self {
        let id = relay.connect(outbox).await;
        Self { id, relay }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Parse and run one text frame. Anything that goes wrong is reported
    /// back to this connection as an `error` event.
    pub async fn handle_frame(&self, frame: &str) {
        let event = match InboundEvent::parse(frame) {
            Ok(event) => event,
            Err(e) => {
                let name = peek_event_name(frame);
                warn!(conn_id = %self.id, event = name.as_deref(), error = %e, "rejected frame");
                self.report(name.as_deref(), &e).await;
                return;
            }
        };

        let name = event.name();
        if let Err(e) = self.handle(event).await {
            warn!(conn_id = %self.id, event = name, error = %e, "event failed");
            self.report(Some(name), &e).await;
        }
    }

    pub async fn handle(&self, event: InboundEvent) -> RelayResult<()> {
        debug!(conn_id = %self.id, event = event.name(), room_id = event.room_id(), "inbound event");
        match event {
            InboundEvent::JoinRoom { room_id } => {
                self.relay.join(&self.id, &room_id).await?;
            }
            InboundEvent::Message { room_id, body } => {
                self.relay.send(&self.id, &room_id, &body).await?;
            }
            InboundEvent::Typing { room_id } => {
                self.relay
                    .presence(&self.id, &room_id, Presence::Typing)
                    .await;
            }
            InboundEvent::StopTyping { room_id } => {
                self.relay
                    .presence(&self.id, &room_id, Presence::StopTyping)
                    .await;
            }
            InboundEvent::MarkAsRead {
                room_id,
                message_id,
            } => {
                self.relay.mark_as_read(&room_id, message_id).await?;
            }
        }
        Ok(())
    }

    pub async fn close(self) {
        self.relay.disconnect(&self.id).await;
    }

    async fn report(&self, event: Option<&str>, reason: &(dyn std::fmt::Display + Sync)) {
        self.relay
            .broadcaster()
            .to_connection(&self.id, &OutboundEvent::error(event, reason))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    use super::*;
    use crate::rooms::broadcast::Broadcaster;
    use crate::rooms::registry::RoomRegistry;
    use crate::store::{MemoryStore, MessageStore};

    async fn session(
        relay: &Arc<Relay>,
    ) -> (Session, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Session::open(relay.clone(), tx).await, rx)
    }

    fn relay(store: Arc<MemoryStore>) -> Arc<Relay> {
        Arc::new(Relay::new(
            store,
            Broadcaster::new(Arc::new(RoomRegistry::new())),
        ))
    }

    fn next(rx: &mut mpsc::UnboundedReceiver<String>) -> Value {
        serde_json::from_str(&rx.try_recv().unwrap()).unwrap()
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn frame_handling_can_run_on_any_thread() {
        let relay = relay(Arc::new(MemoryStore::new()));
        let (session, _rx) = session(&relay).await;

        // the upgrade handler spawns this future onto the multi-threaded runtime
        let frame = session.handle_frame("{{{");
        assert_send(&frame);
        frame.await;

        let spawned = tokio::spawn(async move { session.handle_frame("{{{").await });
        spawned.await.unwrap();
    }

    #[tokio::test]
    async fn malformed_frame_gets_error_event() {
        let relay = relay(Arc::new(MemoryStore::new()));
        let (session, mut rx) = session(&relay).await;

        session
            .handle_frame(&json!({"event": "message", "data": {"message": "hi"}}).to_string())
            .await;

        let reply = next(&mut rx);
        assert_eq!(reply["event"], "error");
        assert_eq!(reply["data"]["event"], "message");
        assert_eq!(reply["data"]["reason"], "expected roomId");
    }

    #[tokio::test]
    async fn garbage_gets_error_without_event_name() {
        let relay = relay(Arc::new(MemoryStore::new()));
        let (session, mut rx) = session(&relay).await;

        session.handle_frame("{{{").await;

        let reply = next(&mut rx);
        assert_eq!(reply["event"], "error");
        assert!(reply["data"].get("event").is_none());
    }

    #[tokio::test]
    async fn store_failure_is_reported() {
        let relay = relay(Arc::new(MemoryStore::new()));
        let (session, mut rx) = session(&relay).await;
        let id = uuid::Uuid::now_v7();

        session
            .handle_frame(&json!({"event": "markAsRead", "data": ["R1", id.to_string()]}).to_string())
            .await;

        let reply = next(&mut rx);
        assert_eq!(reply["event"], "error");
        assert_eq!(reply["data"]["event"], "markAsRead");
    }

    #[tokio::test]
    async fn empty_message_produces_nothing() {
        let store = Arc::new(MemoryStore::new());
        let relay = relay(store.clone());
        let (session, mut rx) = session(&relay).await;
        session
            .handle_frame(&json!({"event": "join-room", "data": "R1"}).to_string())
            .await;
        assert_eq!(next(&mut rx)["event"], "previousMessages");

        session
            .handle_frame(&json!({"event": "message", "data": {"roomId": "R1", "message": ""}}).to_string())
            .await;
        session
            .handle_frame(&json!({"event": "message", "data": {"roomId": "R1"}}).to_string())
            .await;

        assert!(rx.try_recv().is_err());
        assert!(store.list_by_room("R1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn close_leaves_rooms() {
        let relay = relay(Arc::new(MemoryStore::new()));
        let (session, _rx) = session(&relay).await;
        session
            .handle(InboundEvent::JoinRoom {
                room_id: "R1".to_owned(),
            })
            .await
            .unwrap();
        assert_eq!(relay.broadcaster().registry().members("R1").await.len(), 1);

        session.close().await;
        assert!(relay.broadcaster().registry().members("R1").await.is_empty());
    }
}
