use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A message as the store holds it.
///
/// `id`, `room_id` and `timestamp` are assigned by the store on append and
/// never change afterwards. Only the two flags are mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: Uuid,
    pub room_id: String,
    pub sender_id: String,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub read: bool,
    pub delivered: bool,
}

impl MessageRecord {
    /// Lifecycle position as far as the stored flags can tell.
    pub fn state(&self) -> MessageState {
        match (self.delivered, self.read) {
            (_, true) => MessageState::Read,
            (true, false) => MessageState::Delivered,
            (false, false) => MessageState::Created,
        }
    }
}

/// What a sender hands to the store. Everything else is assigned on append.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender_id: String,
    pub message: String,
}

/// The boolean fields of a record that the relay is allowed to update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFlag {
    Delivered,
    Read,
}

impl MessageFlag {
    pub fn column(self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Read => "read",
        }
    }
}

impl fmt::Display for MessageFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Lifecycle of a single message.
///
/// `Sent` and `Broadcast` are transient and only exist while a send is in
/// flight; the store can only distinguish `Created`, `Delivered` and `Read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageState {
    Created,
    Sent,
    Broadcast,
    Delivered,
    Read,
}

impl fmt::Display for MessageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Sent => "sent",
            Self::Broadcast => "broadcast",
            Self::Delivered => "delivered",
            Self::Read => "read",
        };
        f.write_str(name)
    }
}
