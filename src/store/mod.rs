//! Persistence boundary for chat messages.
//!
//! The relay only ever talks to a [`MessageStore`]; it does not know whether
//! records end up in sqlite or in process memory.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::message::{MessageFlag, MessageRecord, NewMessage};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("message {id} not found in room {room_id}")]
    NotFound { room_id: String, id: Uuid },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Room-scoped message log.
///
/// Flags are monotonic: `update_field` with `false` never clears a flag that
/// is already set.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a record with both flags cleared and a store-assigned id and
    /// timestamp.
    async fn append(&self, room_id: &str, message: NewMessage) -> Result<Uuid, StoreError>;

    /// Every record of the room, in insertion order.
    async fn list_by_room(&self, room_id: &str) -> Result<Vec<MessageRecord>, StoreError>;

    async fn update_field(
        &self,
        room_id: &str,
        id: Uuid,
        field: MessageFlag,
        value: bool,
    ) -> Result<(), StoreError>;

    /// Records across all rooms still waiting for `delivered`, created at or
    /// before `older_than`.
    async fn list_undelivered(
        &self,
        older_than: OffsetDateTime,
    ) -> Result<Vec<MessageRecord>, StoreError>;
}
