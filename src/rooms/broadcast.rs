//! Routing of outbound events to room members.

use std::sync::Arc;

use tracing::{debug, warn};

use super::protocol::OutboundEvent;
use super::registry::{ConnectionId, Outbox, RoomRegistry};

/// Decides who receives an event: the whole room, the room minus the
/// origin, or the origin alone.
///
/// Recipients are whoever is in the room when the call takes its snapshot.
/// Connections joining or leaving mid-call may or may not get the event.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<RoomRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Every member of the room, origin included.
    pub async fn to_room(&self, room_id: &str, event: &OutboundEvent) -> usize {
        let outboxes = self.registry.outboxes(room_id, None).await;
        fan_out(outboxes, event, room_id)
    }

    /// Every member of the room but `origin`.
    pub async fn to_room_except(
        &self,
        room_id: &str,
        origin: &ConnectionId,
        event: &OutboundEvent,
    ) -> usize {
        let outboxes = self.registry.outboxes(room_id, Some(origin)).await;
        fan_out(outboxes, event, room_id)
    }

    /// Only `id`. Returns `false` when it is no longer connected.
    pub async fn to_connection(&self, id: &ConnectionId, event: &OutboundEvent) -> bool {
        let Some(outbox) = self.registry.outbox(id).await else {
            debug!(conn_id = %id, "connection gone, event dropped");
            return false;
        };
        fan_out(vec![(id.clone(), outbox)], event, id.as_str()) == 1
    }
}

/// Serialize once, push to every outbox.
fn fan_out(outboxes: Vec<(ConnectionId, Outbox)>, event: &OutboundEvent, label: &str) -> usize {
    let frame = match event.to_frame() {
        Ok(frame) => frame,
        Err(e) => {
            warn!(label, error = %e, "failed to serialize event");
            return 0;
        }
    };

    let mut recipients = 0;
    for (id, outbox) in outboxes {
        if outbox.send(frame.clone()).is_ok() {
            recipients += 1;
        } else {
            debug!(conn_id = %id, label, "outbox closed");
        }
    }
    debug!(label, recipients, "broadcast event");
    recipients
}
