use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{MessageStore, StoreError};
use crate::message::{MessageFlag, MessageRecord, NewMessage};

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rooms: RwLock<HashMap<String, Vec<MessageRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append(&self, room_id: &str, message: NewMessage) -> Result<Uuid, StoreError> {
        let id = Uuid::now_v7();
        let record = MessageRecord {
            id,
            room_id: room_id.to_owned(),
            sender_id: message.sender_id,
            message: message.message,
            timestamp: OffsetDateTime::now_utc(),
            read: false,
            delivered: false,
        };

        self.rooms
            .write()
            .await
            .entry(room_id.to_owned())
            .or_default()
            .push(record);

        Ok(id)
    }

    async fn list_by_room(&self, room_id: &str) -> Result<Vec<MessageRecord>, StoreError> {
        Ok(self
            .rooms
            .read()
            .await
            .get(room_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_field(
        &self,
        room_id: &str,
        id: Uuid,
        field: MessageFlag,
        value: bool,
    ) -> Result<(), StoreError> {
        let mut rooms = self.rooms.write().await;
        let record = rooms
            .get_mut(room_id)
            .and_then(|records| records.iter_mut().find(|r| r.id == id))
            .ok_or_else(|| StoreError::NotFound {
                room_id: room_id.to_owned(),
                id,
            })?;

        match field {
            MessageFlag::Delivered => record.delivered |= value,
            MessageFlag::Read => record.read |= value,
        }
        Ok(())
    }

    async fn list_undelivered(
        &self,
        older_than: OffsetDateTime,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let rooms = self.rooms.read().await;
        let mut stuck: Vec<MessageRecord> = rooms
            .values()
            .flatten()
            .filter(|r| !r.delivered && r.timestamp <= older_than)
            .cloned()
            .collect();
        stuck.sort_by_key(|r| r.timestamp);
        Ok(stuck)
    }
}
