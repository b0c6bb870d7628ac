//! Socket frames, and the mapping from loosely-shaped client payloads to
//! canonical [`Message`]s.
//!
//! Client -> Server:
//! ```json
//! {"event": "join_room", "data": {"roomId": "t1_s1", "teacherId": "t1", "studentId": "s1"}}
//! {"event": "send_message", "data": {"id": "...", "teacher": "t1", "student": "s1", "sender": "student", "content": "hi", "timestamp": "...", "roomId": "t1_s1"}}
//! {"event": "join_user_room", "data": {"userId": "t1"}}
//! ```
//!
//! Server -> Client:
//! ```json
//! {"event": "new_message", "data": {"id": "...", "teacherId": "t1", "studentId": "s1", ...}}
//! {"event": "notification:new", "data": {...}}
//! {"event": "notification:count", "data": {"count": 3}}
//! {"event": "resync", "data": {"skipped": 12}}
//! ```

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    error::ChatError,
    model::{Conversation, Message, Notification, Role, is_blank},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "new_message")]
    NewMessage(Message),
    #[serde(rename = "notification:new")]
    NotificationNew(Notification),
    #[serde(rename = "notification:count")]
    NotificationCount { count: u64 },
    /// This socket fell behind and `skipped` events were dropped.
    #[serde(rename = "resync")]
    Resync { skipped: u64 },
    #[serde(rename = "error")]
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientFrame {
    JoinRoom(RoomRef),
    LeaveRoom(RoomRef),
    SendMessage(WireMessage),
    JoinUserRoom {
        #[serde(alias = "userId")]
        user_id: String,
    },
}

/// Names a room by its parties, optionally with the precomputed key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomRef {
    #[serde(default, rename = "roomId", alias = "room_id", skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(rename = "teacherId", alias = "teacher", alias = "teacher_id")]
    pub teacher_id: String,
    #[serde(rename = "studentId", alias = "student", alias = "student_id")]
    pub student_id: String,
}

impl RoomRef {
    pub fn of(conversation: &Conversation) -> Self {
        RoomRef {
            room_id: Some(conversation.room_id().to_string()),
            teacher_id: conversation.teacher_id.clone(),
            student_id: conversation.student_id.clone(),
        }
    }

    pub fn conversation(&self) -> Result<Conversation, ChatError> {
        let conversation = Conversation::new(self.teacher_id.clone(), self.student_id.clone());
        check_room(&conversation, self.room_id.as_deref())?;
        Ok(conversation)
    }
}

/// A message payload as clients send it. Accepts every field spelling seen
/// in the wild and is turned into a [`Message`] before anything else sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub id: Uuid,
    #[serde(rename = "teacherId", alias = "teacher", alias = "teacher_id")]
    pub teacher_id: String,
    #[serde(rename = "studentId", alias = "student", alias = "student_id")]
    pub student_id: String,
    pub sender: Role,
    pub content: String,
    #[serde(
        default,
        rename = "createdAt",
        alias = "timestamp",
        alias = "created_at",
        with = "time::serde::rfc3339::option"
    )]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, rename = "roomId", alias = "room_id", skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        WireMessage {
            id: message.id,
            teacher_id: message.teacher_id.clone(),
            student_id: message.student_id.clone(),
            sender: message.sender,
            content: message.content.clone(),
            created_at: Some(message.created_at),
            room_id: Some(message.room_id().to_string()),
        }
    }
}

impl TryFrom<WireMessage> for Message {
    type Error = ChatError;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        if wire.teacher_id.is_empty() || wire.student_id.is_empty() {
            return Err(ChatError::Malformed("message without teacher or student".to_owned()));
        }
        if is_blank(&wire.content) {
            return Err(ChatError::EmptyMessage);
        }

        let message = Message {
            id: wire.id,
            teacher_id: wire.teacher_id,
            student_id: wire.student_id,
            sender: wire.sender,
            content: wire.content,
            created_at: wire.created_at.unwrap_or_else(OffsetDateTime::now_utc),
        };
        check_room(&message.conversation(), wire.room_id.as_deref())?;
        Ok(message)
    }
}

fn check_room(conversation: &Conversation, claimed: Option<&str>) -> Result<(), ChatError> {
    let room_id = conversation.room_id();
    match claimed {
        Some(claimed) if claimed != room_id.as_str() => Err(ChatError::Malformed(format!(
            "room {claimed} does not match parties of {room_id}"
        ))),
        _ => Ok(()),
    }
}
