//! Message lifecycle: persist, acknowledge, broadcast, mark delivered, mark read.
//!
//! No transaction spans the steps of [`Relay::send`]. A failure between the
//! append and the delivered update leaves the record with `delivered=false`;
//! [`Relay::reconcile`] is the recovery path for those records.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::broadcast::Broadcaster;
use super::protocol::OutboundEvent;
use super::registry::{ConnectionId, Outbox};
use crate::error::RelayResult;
use crate::message::{MessageFlag, MessageState, NewMessage};
use crate::store::{MessageStore, StoreError};

/// Ephemeral presence signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Typing,
    StopTyping,
}

/// Outcome of [`Relay::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered(Uuid),
    /// Empty body; nothing was stored and nothing was sent.
    Dropped,
}

/// Sweeps that may rebroadcast one message before it is left alone.
pub const MAX_REDELIVERY_ATTEMPTS: u32 = 3;

pub struct Relay {
    store: Arc<dyn MessageStore>,
    broadcaster: Broadcaster,
    /// Failed sweep attempts per message id.
    redelivery_failures: Mutex<HashMap<Uuid, u32>>,
}

impl Relay {
    pub fn new(store: Arc<dyn MessageStore>, broadcaster: Broadcaster) -> Self {
        Self {
            store,
            broadcaster,
            redelivery_failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub async fn connect(&self, outbox: Outbox) -> ConnectionId {
        let id = ConnectionId::generate();
        self.broadcaster.registry().connect(id.clone(), outbox).await;
        info!(conn_id = %id, "connected");
        id
    }

    pub async fn disconnect(&self, conn: &ConnectionId) {
        let registry = self.broadcaster.registry();
        let rooms = registry.disconnect(conn).await;
        let rooms_open = registry.room_count().await;
        info!(
            conn_id = %conn,
            rooms = rooms.len(),
            rooms_open,
            "disconnected"
        );
    }

    /// Put `conn` in the room and hand it the room's whole backlog.
    ///
    /// Joining twice keeps one membership but resends the backlog.
    pub async fn join(&self, conn: &ConnectionId, room_id: &str) -> RelayResult<usize> {
        let newly_joined = self.broadcaster.registry().join(conn, room_id).await;
        info!(conn_id = %conn, room_id, newly_joined, "joined room");

        let backlog = self.store.list_by_room(room_id).await?;
        let count = backlog.len();
        self.broadcaster
            .to_connection(conn, &OutboundEvent::PreviousMessages(backlog))
            .await;

        debug!(conn_id = %conn, room_id, count, "sent backlog");
        Ok(count)
    }

    /// Store a message and run it through to `delivered`.
    ///
    /// The sender hears `messageSent` as soon as the record exists, then the
    /// room (sender included) gets the message, then the sender hears
    /// `messageDelivered` once the flag is stored.
    pub async fn send(
        &self,
        conn: &ConnectionId,
        room_id: &str,
        body: &str,
    ) -> RelayResult<SendOutcome> {
        if body.is_empty() {
            info!(conn_id = %conn, room_id, "message body missing, dropped");
            return Ok(SendOutcome::Dropped);
        }

        let id = self
            .store
            .append(
                room_id,
                NewMessage {
                    sender_id: conn.to_string(),
                    message: body.to_owned(),
                },
            )
            .await?;
        info!(conn_id = %conn, room_id, message_id = %id, state = %MessageState::Created, "message stored");

        self.broadcaster
            .to_connection(conn, &OutboundEvent::MessageSent { id })
            .await;
        debug!(message_id = %id, state = %MessageState::Sent, "sender acknowledged");

        self.deliver(room_id, id, conn, body).await?;
        Ok(SendOutcome::Delivered(id))
    }

    /// Broadcast a stored message, flag it delivered, tell its sender.
    ///
    /// Safe to repeat for the same id: the flag is monotonic and clients
    /// dedupe broadcasts by id.
    pub async fn deliver(
        &self,
        room_id: &str,
        id: Uuid,
        sender: &ConnectionId,
        body: &str,
    ) -> Result<(), StoreError> {
        let recipients = self
            .broadcaster
            .to_room(
                room_id,
                &OutboundEvent::Message {
                    id,
                    sender_id: sender.to_string(),
                    message: body.to_owned(),
                },
            )
            .await;
        debug!(room_id, message_id = %id, recipients, state = %MessageState::Broadcast, "message broadcast");

        self.store
            .update_field(room_id, id, MessageFlag::Delivered, true)
            .await?;

        self.broadcaster
            .to_connection(sender, &OutboundEvent::MessageDelivered { id })
            .await;
        debug!(room_id, message_id = %id, state = %MessageState::Delivered, "message delivered");
        Ok(())
    }

    /// Set the read flag and tell the whole room. Repeated calls produce the
    /// same event.
    pub async fn mark_as_read(&self, room_id: &str, id: Uuid) -> RelayResult<()> {
        self.store
            .update_field(room_id, id, MessageFlag::Read, true)
            .await?;
        info!(room_id, message_id = %id, state = %MessageState::Read, "message read");

        self.broadcaster
            .to_room(room_id, &OutboundEvent::MessageRead(id))
            .await;
        Ok(())
    }

    /// Forward a presence signal to everyone in the room except `conn`.
    pub async fn presence(&self, conn: &ConnectionId, room_id: &str, presence: Presence) {
        let user_id = conn.to_string();
        let event = match presence {
            Presence::Typing => OutboundEvent::Typing { user_id },
            Presence::StopTyping => OutboundEvent::StopTyping { user_id },
        };
        let recipients = self.broadcaster.to_room_except(room_id, conn, &event).await;
        debug!(conn_id = %conn, room_id, ?presence, recipients, "presence forwarded");
    }

    /// Replay [`Relay::deliver`] for every record older than `grace` that
    /// never got its delivered flag. Returns how many were recovered.
    ///
    /// A record whose delivered update failed [`MAX_REDELIVERY_ATTEMPTS`]
    /// times is skipped by later sweeps.
    pub async fn reconcile(&self, grace: Duration) -> RelayResult<usize> {
        let cutoff = OffsetDateTime::now_utc() - grace;
        let stuck = self.store.list_undelivered(cutoff).await?;

        let mut failures = self.redelivery_failures.lock().await;
        let mut recovered = 0;
        for record in stuck {
            let attempts = failures.get(&record.id).copied().unwrap_or(0);
            if attempts >= MAX_REDELIVERY_ATTEMPTS {
                debug!(message_id = %record.id, attempts, "redelivery abandoned, skipped");
                continue;
            }

            let sender = ConnectionId::from(record.sender_id.as_str());
            match self
                .deliver(&record.room_id, record.id, &sender, &record.message)
                .await
            {
                Ok(()) => {
                    failures.remove(&record.id);
                    recovered += 1;
                }
                Err(e) => {
                    let attempts = attempts + 1;
                    failures.insert(record.id, attempts);
                    warn!(
                        room_id = %record.room_id,
                        message_id = %record.id,
                        state = %record.state(),
                        attempts,
                        error = %e,
                        "redelivery failed"
                    );
                }
            }
        }

        if recovered > 0 {
            info!(recovered, "redelivered stuck messages");
        }
        Ok(recovered)
    }
}
