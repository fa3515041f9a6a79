//! Which live connection sits in which room.
//!
//! Rooms are not managed entities: one exists while it has at least one
//! member and disappears with its last one.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

/// Outgoing frames of one connection, already serialized.
pub type Outbox = mpsc::UnboundedSender<String>;

/// Opaque id of a live connection. Also serves as the sender id of the
/// messages it sends.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct Member {
    outbox: Outbox,
    rooms: HashSet<String>,
}

#[derive(Default)]
struct Tables {
    connections: HashMap<ConnectionId, Member>,
    rooms: HashMap<String, HashSet<ConnectionId>>,
}

#[derive(Default)]
pub struct RoomRegistry {
    tables: RwLock<Tables>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn connect(&self, id: ConnectionId, outbox: Outbox) {
        self.tables.write().await.connections.insert(
            id,
            Member {
                outbox,
                rooms: HashSet::new(),
            },
        );
    }

    /// Returns `false` if the connection was already in the room or is not
    /// connected at all.
    pub async fn join(&self, id: &ConnectionId, room_id: &str) -> bool {
        let mut tables = self.tables.write().await;
        let Some(member) = tables.connections.get_mut(id) else {
            return false;
        };
        if !member.rooms.insert(room_id.to_owned()) {
            return false;
        }
        tables
            .rooms
            .entry(room_id.to_owned())
            .or_default()
            .insert(id.clone());
        true
    }

    /// Forget the connection and every membership it held. Returns the rooms
    /// it was in.
    pub async fn disconnect(&self, id: &ConnectionId) -> Vec<String> {
        let mut tables = self.tables.write().await;
        let Some(member) = tables.connections.remove(id) else {
            return Vec::new();
        };
        let rooms: Vec<String> = member.rooms.into_iter().collect();
        for room_id in &rooms {
            tables.remove_from_room(id, room_id);
        }
        rooms
    }

    pub async fn members(&self, room_id: &str) -> Vec<ConnectionId> {
        self.tables
            .read()
            .await
            .rooms
            .get(room_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Outboxes of every member of the room except `except`.
    pub async fn outboxes(
        &self,
        room_id: &str,
        except: Option<&ConnectionId>,
    ) -> Vec<(ConnectionId, Outbox)> {
        let tables = self.tables.read().await;
        let Some(members) = tables.rooms.get(room_id) else {
            return Vec::new();
        };
        members
            .iter()
            .filter(|id| Some(*id) != except)
            .filter_map(|id| {
                tables
                    .connections
                    .get(id)
                    .map(|member| (id.clone(), member.outbox.clone()))
            })
            .collect()
    }

    pub async fn outbox(&self, id: &ConnectionId) -> Option<Outbox> {
        self.tables
            .read()
            .await
            .connections
            .get(id)
            .map(|member| member.outbox.clone())
    }

    pub async fn room_count(&self) -> usize {
        self.tables.read().await.rooms.len()
    }
}

impl Tables {
    fn remove_from_room(&mut self, id: &ConnectionId, room_id: &str) {
        if let Some(members) = self.rooms.get_mut(room_id) {
            members.remove(id);
            if members.is_empty() {
                self.rooms.remove(room_id);
            }
        }
    }
}
