//! Wire format of the `/ws` endpoint.
//!
//! Every frame is a JSON text frame `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::message::MessageRecord;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame is not valid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("expected {0}")]
    MissingField(&'static str),
    #[error("expected {field} to be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("unknown event {0:?}")]
    UnknownEvent(String),
    #[error("{0:?} is not a message id")]
    InvalidMessageId(String),
}

/// Events a client may send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    JoinRoom { room_id: String },
    /// `body` is empty when the client left it out; the relay drops those.
    Message { room_id: String, body: String },
    Typing { room_id: String },
    StopTyping { room_id: String },
    MarkAsRead { room_id: String, message_id: Uuid },
}

/// Events the relay sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum OutboundEvent {
    PreviousMessages(Vec<MessageRecord>),
    MessageSent {
        id: Uuid,
    },
    Message {
        id: Uuid,
        sender_id: String,
        message: String,
    },
    MessageDelivered {
        id: Uuid,
    },
    Typing {
        user_id: String,
    },
    StopTyping {
        user_id: String,
    },
    MessageRead(Uuid),
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event: Option<String>,
        reason: String,
    },
}

trait GetField {
    fn get_str_field(&self, field: &'static str) -> Result<&str, ProtocolError>;
    fn get_opt_str_field(&self, field: &'static str) -> Result<Option<&str>, ProtocolError>;
}

impl GetField for Value {
    fn get_str_field(&self, field: &'static str) -> Result<&str, ProtocolError> {
        self.get_opt_str_field(field)?
            .ok_or(ProtocolError::MissingField(field))
    }

    fn get_opt_str_field(&self, field: &'static str) -> Result<Option<&str>, ProtocolError> {
        match self.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(ProtocolError::WrongType {
                field,
                expected: "a string",
            }),
        }
    }
}

fn room_id(raw: &str) -> Result<String, ProtocolError> {
    if raw.is_empty() {
        return Err(ProtocolError::Empty("roomId"));
    }
    Ok(raw.to_owned())
}

fn message_id(raw: &str) -> Result<Uuid, ProtocolError> {
    Uuid::parse_str(raw).map_err(|_| ProtocolError::InvalidMessageId(raw.to_owned()))
}

fn as_str<'a>(value: &'a Value, field: &'static str) -> Result<&'a str, ProtocolError> {
    value.as_str().ok_or(ProtocolError::WrongType {
        field,
        expected: "a string",
    })
}

impl InboundEvent {
    /// Name of the event on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "join-room",
            Self::Message { .. } => "message",
            Self::Typing { .. } => "typing",
            Self::StopTyping { .. } => "stopTyping",
            Self::MarkAsRead { .. } => "markAsRead",
        }
    }

    pub fn room_id(&self) -> &str {
        match self {
            Self::JoinRoom { room_id }
            | Self::Message { room_id, .. }
            | Self::Typing { room_id }
            | Self::StopTyping { room_id }
            | Self::MarkAsRead { room_id, .. } => room_id,
        }
    }

    pub fn parse(frame: &str) -> Result<Self, ProtocolError> {
        let frame: Value = serde_json::from_str(frame)?;
        let event = frame.get_str_field("event")?;
        let null = Value::Null;
        let data = frame.get("data").unwrap_or(&null);

        match event {
            "join-room" => {
                let raw = match data {
                    Value::Object(_) => data.get_str_field("roomId")?,
                    Value::Null => return Err(ProtocolError::MissingField("roomId")),
                    other => as_str(other, "roomId")?,
                };
                Ok(Self::JoinRoom {
                    room_id: room_id(raw)?,
                })
            }
            "message" => Ok(Self::Message {
                room_id: room_id(data.get_str_field("roomId")?)?,
                body: data
                    .get_opt_str_field("message")?
                    .unwrap_or_default()
                    .to_owned(),
            }),
            "typing" => Ok(Self::Typing {
                room_id: room_id(data.get_str_field("roomId")?)?,
            }),
            "stopTyping" => Ok(Self::StopTyping {
                room_id: room_id(data.get_str_field("roomId")?)?,
            }),
            "markAsRead" => {
                let (raw_room, raw_id) = match data {
                    Value::Array(args) => (
                        as_str(args.first().ok_or(ProtocolError::MissingField("roomId"))?, "roomId")?,
                        as_str(
                            args.get(1).ok_or(ProtocolError::MissingField("messageId"))?,
                            "messageId",
                        )?,
                    ),
                    _ => (
                        data.get_str_field("roomId")?,
                        data.get_str_field("messageId")?,
                    ),
                };
                Ok(Self::MarkAsRead {
                    room_id: room_id(raw_room)?,
                    message_id: message_id(raw_id)?,
                })
            }
            other => Err(ProtocolError::UnknownEvent(other.to_owned())),
        }
    }
}

impl OutboundEvent {
    pub fn error(event: Option<&str>, reason: impl ToString) -> Self {
        Self::Error {
            event: event.map(str::to_owned),
            reason: reason.to_string(),
        }
    }

    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Best-effort event name of a frame that failed to parse.
pub fn peek_event_name(frame: &str) -> Option<String> {
    serde_json::from_str::<Value>(frame)
        .ok()?
        .get("event")?
        .as_str()
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parse(frame: Value) -> Result<InboundEvent, ProtocolError> {
        InboundEvent::parse(&frame.to_string())
    }

    #[test]
    fn join_room_accepts_bare_string_and_object() {
        let expected = InboundEvent::JoinRoom {
            room_id: "R1".to_owned(),
        };
        assert_eq!(parse(json!({"event": "join-room", "data": "R1"})).unwrap(), expected);
        assert_eq!(
            parse(json!({"event": "join-room", "data": {"roomId": "R1"}})).unwrap(),
            expected
        );
    }

    #[test]
    fn join_room_without_room_is_rejected() {
        assert!(matches!(
            parse(json!({"event": "join-room"})),
            Err(ProtocolError::MissingField("roomId"))
        ));
        assert!(matches!(
            parse(json!({"event": "join-room", "data": ""})),
            Err(ProtocolError::Empty("roomId"))
        ));
        assert!(matches!(
            parse(json!({"event": "join-room", "data": 7})),
            Err(ProtocolError::WrongType { .. })
        ));
    }

    #[test]
    fn missing_body_parses_as_empty() {
        let event = parse(json!({"event": "message", "data": {"roomId": "R1"}})).unwrap();
        assert_eq!(
            event,
            InboundEvent::Message {
                room_id: "R1".to_owned(),
                body: String::new(),
            }
        );

        let event =
            parse(json!({"event": "message", "data": {"roomId": "R1", "message": null}})).unwrap();
        assert!(matches!(event, InboundEvent::Message { body, .. } if body.is_empty()));
    }

    #[test]
    fn non_string_body_is_rejected() {
        let err = parse(json!({"event": "message", "data": {"roomId": "R1", "message": 42}}))
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::WrongType {
                field: "message",
                ..
            }
        ));
    }

    #[test]
    fn mark_as_read_positional_and_named() {
        let id = Uuid::now_v7();
        let expected = InboundEvent::MarkAsRead {
            room_id: "R1".to_owned(),
            message_id: id,
        };
        assert_eq!(
            parse(json!({"event": "markAsRead", "data": ["R1", id.to_string()]})).unwrap(),
            expected
        );
        assert_eq!(
            parse(json!({"event": "markAsRead", "data": {"roomId": "R1", "messageId": id.to_string()}}))
                .unwrap(),
            expected
        );
    }

    #[test]
    fn mark_as_read_rejects_bad_id() {
        assert!(matches!(
            parse(json!({"event": "markAsRead", "data": ["R1", "nope"]})),
            Err(ProtocolError::InvalidMessageId(_))
        ));
        assert!(matches!(
            parse(json!({"event": "markAsRead", "data": ["R1"]})),
            Err(ProtocolError::MissingField("messageId"))
        ));
    }

    #[test]
    fn unknown_and_garbage_frames() {
        assert!(matches!(
            parse(json!({"event": "shout", "data": {}})),
            Err(ProtocolError::UnknownEvent(name)) if name == "shout"
        ));
        assert!(matches!(
            InboundEvent::parse("not json"),
            Err(ProtocolError::InvalidJson(_))
        ));
        assert!(matches!(
            parse(json!({"data": {}})),
            Err(ProtocolError::MissingField("event"))
        ));
    }

    #[test]
    fn outbound_envelope_shape() {
        let id = Uuid::now_v7();
        let frame: Value = serde_json::from_str(
            &OutboundEvent::Message {
                id,
                sender_id: "a".to_owned(),
                message: "hi".to_owned(),
            }
            .to_frame()
            .unwrap(),
        )
        .unwrap();
        assert_eq!(
            frame,
            json!({"event": "message", "data": {"id": id, "senderId": "a", "message": "hi"}})
        );

        let frame: Value =
            serde_json::from_str(&OutboundEvent::MessageRead(id).to_frame().unwrap()).unwrap();
        assert_eq!(frame, json!({"event": "messageRead", "data": id}));

        let frame: Value = serde_json::from_str(
            &OutboundEvent::Typing {
                user_id: "a".to_owned(),
            }
            .to_frame()
            .unwrap(),
        )
        .unwrap();
        assert_eq!(frame, json!({"event": "typing", "data": {"userId": "a"}}));
    }

    #[test]
    fn peek_finds_event_name() {
        assert_eq!(
            peek_event_name(r#"{"event":"message","data":1}"#).as_deref(),
            Some("message")
        );
        assert_eq!(peek_event_name("}{"), None);
    }
}
