use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "teacher" => Ok(Role::Teacher),
            "student" => Ok(Role::Student),
            other => Err(ChatError::Malformed(format!("unknown role {other:?}"))),
        }
    }
}

/// Who is acting, as vouched for by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Identity {
            user_id: user_id.into(),
            role,
        }
    }

    /// Fails unless this identity is the party of its role in `conversation`.
    pub fn authorize(&self, conversation: &Conversation) -> Result<(), ChatError> {
        if conversation.includes(&self.user_id, self.role) {
            Ok(())
        } else {
            Err(ChatError::forbidden(
                &self.user_id,
                format!("room {}", conversation.room_id()),
            ))
        }
    }

    /// Like [`Identity::authorize`], and the message must be sent as this role.
    pub fn authorize_sender(&self, conversation: &Conversation, sender: Role) -> Result<(), ChatError> {
        self.authorize(conversation)?;
        if sender != self.role {
            return Err(ChatError::forbidden(
                &self.user_id,
                format!("sending as {sender} in room {}", conversation.room_id()),
            ));
        }
        Ok(())
    }
}

/// Deterministic room key, `"{teacherId}_{studentId}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The (teacher, student) pair a message belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Conversation {
    pub teacher_id: String,
    pub student_id: String,
}

impl Conversation {
    pub fn new(teacher_id: impl Into<String>, student_id: impl Into<String>) -> Self {
        Conversation {
            teacher_id: teacher_id.into(),
            student_id: student_id.into(),
        }
    }

    /// Places `self_id` and `peer_id` on the right sides for `role`.
    pub fn resolve(self_id: &str, peer_id: &str, role: Role) -> Self {
        match role {
            Role::Teacher => Conversation::new(self_id, peer_id),
            Role::Student => Conversation::new(peer_id, self_id),
        }
    }

    pub fn room_id(&self) -> RoomId {
        RoomId(format!("{}_{}", self.teacher_id, self.student_id))
    }

    pub fn party(&self, role: Role) -> &str {
        match role {
            Role::Teacher => &self.teacher_id,
            Role::Student => &self.student_id,
        }
    }

    /// The other side from `role`'s point of view.
    pub fn peer_of(&self, role: Role) -> &str {
        match role {
            Role::Teacher => &self.student_id,
            Role::Student => &self.teacher_id,
        }
    }

    pub fn includes(&self, user_id: &str, role: Role) -> bool {
        self.party(role) == user_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub teacher_id: String,
    pub student_id: String,
    pub sender: Role,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Message {
    pub fn conversation(&self) -> Conversation {
        Conversation::new(self.teacher_id.clone(), self.student_id.clone())
    }

    pub fn room_id(&self) -> RoomId {
        self.conversation().room_id()
    }

    pub fn sender_id(&self) -> &str {
        match self.sender {
            Role::Teacher => &self.teacher_id,
            Role::Student => &self.student_id,
        }
    }

    pub fn recipient_id(&self) -> &str {
        match self.sender {
            Role::Teacher => &self.student_id,
            Role::Student => &self.teacher_id,
        }
    }
}

/// Body of `POST /send`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub content: String,
    pub sender: Role,
    #[serde(alias = "teacherId")]
    pub teacher: String,
    #[serde(alias = "studentId")]
    pub student: String,
}

impl NewMessage {
    pub fn new(conversation: &Conversation, sender: Role, content: impl Into<String>) -> Self {
        NewMessage {
            content: content.into(),
            sender,
            teacher: conversation.teacher_id.clone(),
            student: conversation.student_id.clone(),
        }
    }

    pub fn conversation(&self) -> Conversation {
        Conversation::new(self.teacher.clone(), self.student.clone())
    }

    pub fn validate(&self) -> Result<(), ChatError> {
        if is_blank(&self.content) {
            return Err(ChatError::EmptyMessage);
        }
        if self.teacher.is_empty() || self.student.is_empty() {
            return Err(ChatError::Malformed("teacher and student are required".to_owned()));
        }
        Ok(())
    }
}

pub fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub owner_id: String,
    pub payload: serde_json::Value,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadCount {
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_id_is_teacher_then_student() {
        let conversation = Conversation::new("t1", "s7");
        assert_eq!(conversation.room_id().as_str(), "t1_s7");
    }

    #[test]
    fn resolve_is_symmetric_across_roles() {
        let from_teacher = Conversation::resolve("t1", "s7", Role::Teacher);
        let from_student = Conversation::resolve("s7", "t1", Role::Student);
        assert_eq!(from_teacher, from_student);
        assert_eq!(from_teacher.peer_of(Role::Teacher), "s7");
        assert_eq!(from_student.peer_of(Role::Student), "t1");
    }

    #[test]
    fn message_serializes_camel_case() {
        let message = Message {
            id: Uuid::nil(),
            teacher_id: "t1".into(),
            student_id: "s1".into(),
            sender: Role::Student,
            content: "hi".into(),
            created_at: OffsetDateTime::UNIX_EPOCH,
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["teacherId"], "t1");
        assert_eq!(json["sender"], "student");
        assert_eq!(json["createdAt"], "1970-01-01T00:00:00Z");
        assert_eq!(message.sender_id(), "s1");
        assert_eq!(message.recipient_id(), "t1");
    }

    #[test]
    fn new_message_accepts_either_field_name() {
        let a: NewMessage =
            serde_json::from_str(r#"{"content":"x","sender":"teacher","teacher":"t","student":"s"}"#).unwrap();
        let b: NewMessage =
            serde_json::from_str(r#"{"content":"x","sender":"teacher","teacherId":"t","studentId":"s"}"#).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn only_parties_are_authorized() {
        let conversation = Conversation::new("t1", "s1");
        assert!(Identity::new("t1", Role::Teacher).authorize(&conversation).is_ok());
        assert!(Identity::new("s1", Role::Student).authorize(&conversation).is_ok());
        assert!(Identity::new("s1", Role::Teacher).authorize(&conversation).is_err());
        assert!(Identity::new("s2", Role::Student).authorize(&conversation).is_err());
        assert!(
            Identity::new("s1", Role::Student)
                .authorize_sender(&conversation, Role::Teacher)
                .is_err()
        );
    }

    #[test]
    fn whitespace_content_fails_validation() {
        let message = NewMessage::new(&Conversation::new("t", "s"), Role::Teacher, " \n\t ");
        assert!(matches!(message.validate(), Err(ChatError::EmptyMessage)));
    }
}
