use async_trait::async_trait;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{MessageStore, StoreError};
use crate::message::{MessageFlag, MessageRecord, NewMessage};

type MessageRow = (String, String, String, String, OffsetDateTime, bool, bool);

const SELECT_MESSAGES: &str =
    "SELECT id,room_id,sender_id,message,timestamp,read,delivered FROM messages";

/// Message log backed by a sqlite database.
///
/// `seq` is the insertion order; listing never sorts by the timestamp.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db_pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    /// Create the schema if it is not there yet.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                room_id TEXT NOT NULL,
                sender_id TEXT NOT NULL,
                message TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                read BOOLEAN NOT NULL DEFAULT 0,
                delivered BOOLEAN NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.db_pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS messages_by_room ON messages (room_id, seq)")
            .execute(&self.db_pool)
            .await?;

        Ok(())
    }
}

fn row_to_record(
    (id, room_id, sender_id, message, timestamp, read, delivered): MessageRow,
) -> Result<MessageRecord, StoreError> {
    let id = Uuid::parse_str(&id).map_err(|e| StoreError::Corrupt(format!("id {id}: {e}")))?;
    Ok(MessageRecord {
        id,
        room_id,
        sender_id,
        message,
        timestamp,
        read,
        delivered,
    })
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn append(&self, room_id: &str, message: NewMessage) -> Result<Uuid, StoreError> {
        let id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO messages (id,room_id,sender_id,message,timestamp,read,delivered) values (?,?,?,?,?,0,0)",
        )
        .bind(id.to_string())
        .bind(room_id)
        .bind(&message.sender_id)
        .bind(&message.message)
        .bind(OffsetDateTime::now_utc())
        .execute(&self.db_pool)
        .await?;

        Ok(id)
    }

    async fn list_by_room(&self, room_id: &str) -> Result<Vec<MessageRecord>, StoreError> {
        let rows: Vec<MessageRow> =
            sqlx::query_as(&format!("{SELECT_MESSAGES} WHERE room_id=? ORDER BY seq"))
                .bind(room_id)
                .fetch_all(&self.db_pool)
                .await?;

        rows.into_iter().map(row_to_record).collect()
    }

    async fn update_field(
        &self,
        room_id: &str,
        id: Uuid,
        field: MessageFlag,
        value: bool,
    ) -> Result<(), StoreError> {
        let column = field.column();
        let result = sqlx::query(&format!(
            "UPDATE messages SET {column}=({column} OR ?) WHERE room_id=? AND id=?"
        ))
        .bind(value)
        .bind(room_id)
        .bind(id.to_string())
        .execute(&self.db_pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                room_id: room_id.to_owned(),
                id,
            });
        }
        Ok(())
    }

    async fn list_undelivered(
        &self,
        older_than: OffsetDateTime,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let rows: Vec<MessageRow> =
            sqlx::query_as(&format!("{SELECT_MESSAGES} WHERE delivered=0 ORDER BY seq"))
                .fetch_all(&self.db_pool)
                .await?;

        let mut stuck = Vec::new();
        for row in rows {
            let record = row_to_record(row)?;
            if record.timestamp <= older_than {
                stuck.push(record);
            }
        }
        Ok(stuck)
    }
}
