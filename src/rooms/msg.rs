use async_trait::async_trait;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    error::ChatError,
    model::{Conversation, Message, NewMessage},
    store::MessageStore,
};

type MessageRow = (String, String, String, String, String, OffsetDateTime);

pub(crate) async fn insert_msg(db_pool: &SqlitePool, new: NewMessage) -> Result<Message, ChatError> {
    new.validate()?;

    let message = Message {
        id: Uuid::now_v7(),
        teacher_id: new.teacher,
        student_id: new.student,
        sender: new.sender,
        content: new.content,
        created_at: OffsetDateTime::now_utc(),
    };

    sqlx::query("INSERT INTO messages (id,teacher_id,student_id,sender,content,created_at) VALUES (?,?,?,?,?,?)")
        .bind(message.id.to_string())
        .bind(&message.teacher_id)
        .bind(&message.student_id)
        .bind(message.sender.as_str())
        .bind(&message.content)
        .bind(message.created_at)
        .execute(db_pool)
        .await?;

    tracing::debug!(id = %message.id, room = %message.room_id(), "message stored");
    Ok(message)
}

pub(crate) async fn fetch_history(
    db_pool: &SqlitePool,
    conversation: &Conversation,
    before: Option<Uuid>,
    limit: u32,
) -> Result<Vec<Message>, ChatError> {
    let cursor = match before {
        None => i64::MAX,
        Some(before) => {
            let row: Option<(i64,)> =
                sqlx::query_as("SELECT rowid FROM messages WHERE id=? AND teacher_id=? AND student_id=?")
                    .bind(before.to_string())
                    .bind(&conversation.teacher_id)
                    .bind(&conversation.student_id)
                    .fetch_optional(db_pool)
                    .await?;
            let Some((rowid,)) = row else {
                return Err(ChatError::NotFound(format!("message {before}")));
            };
            rowid
        }
    };

    let rows: Vec<MessageRow> = sqlx::query_as(
        "SELECT id,teacher_id,student_id,sender,content,created_at FROM messages \
         WHERE teacher_id=? AND student_id=? AND rowid<? ORDER BY rowid DESC LIMIT ?",
    )
    .bind(&conversation.teacher_id)
    .bind(&conversation.student_id)
    .bind(cursor)
    .bind(i64::from(limit))
    .fetch_all(db_pool)
    .await?;

    rows.into_iter().map(row_to_msg).collect()
}

pub(crate) async fn fetch_msg(db_pool: &SqlitePool, id: Uuid) -> Result<Option<Message>, ChatError> {
    let row: Option<MessageRow> =
        sqlx::query_as("SELECT id,teacher_id,student_id,sender,content,created_at FROM messages WHERE id=?")
            .bind(id.to_string())
            .fetch_optional(db_pool)
            .await?;
    row.map(row_to_msg).transpose()
}

fn row_to_msg((id, teacher_id, student_id, sender, content, created_at): MessageRow) -> Result<Message, ChatError> {
    Ok(Message {
        id: Uuid::parse_str(&id).map_err(|e| ChatError::Malformed(format!("stored id {id}: {e}")))?,
        teacher_id,
        student_id,
        sender: sender.parse()?,
        content,
        created_at,
    })
}

/// [`MessageStore`] over the relay's own SQLite database.
#[derive(Clone)]
pub struct SqliteMessageStore {
    db_pool: SqlitePool,
}

impl SqliteMessageStore {
    pub fn new(db_pool: SqlitePool) -> Self {
        SqliteMessageStore { db_pool }
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn history(
        &self,
        conversation: &Conversation,
        before: Option<Uuid>,
        limit: u32,
    ) -> Result<Vec<Message>, ChatError> {
        fetch_history(&self.db_pool, conversation, before, limit).await
    }

    async fn append(&self, message: NewMessage) -> Result<Message, ChatError> {
        insert_msg(&self.db_pool, message).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::{db, model::Role};

    async fn seeded(count: usize) -> (SqliteMessageStore, Conversation) {
        let store = SqliteMessageStore::new(db::memory().await.unwrap());
        let conversation = Conversation::new("t1", "s1");
        for i in 0..count {
            let sender = if i % 2 == 0 { Role::Student } else { Role::Teacher };
            store
                .append(NewMessage::new(&conversation, sender, format!("msg {i}")))
                .await
                .unwrap();
        }
        (store, conversation)
    }

    #[tokio::test]
    async fn append_assigns_id_and_keeps_fields() {
        let (store, conversation) = seeded(0).await;
        let message = store
            .append(NewMessage::new(&conversation, Role::Student, "hello"))
            .await
            .unwrap();
        assert_eq!(message.content, "hello");
        assert_eq!(message.room_id().as_str(), "t1_s1");

        let history = store.history(&conversation, None, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, message.id);
        assert_eq!(history[0].sender, Role::Student);
    }

    #[tokio::test]
    async fn append_rejects_blank_content() {
        let (store, conversation) = seeded(0).await;
        let err = store
            .append(NewMessage::new(&conversation, Role::Student, "   "))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::EmptyMessage));
        assert!(store.history(&conversation, None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pages_cover_history_without_gaps_or_duplicates() {
        let (store, conversation) = seeded(23).await;

        let mut all = Vec::new();
        let mut before = None;
        loop {
            let page = store.history(&conversation, before, 5).await.unwrap();
            if page.is_empty() {
                break;
            }
            before = page.last().map(|m| m.id);
            all.extend(page);
        }
        all.reverse();

        let contents: Vec<String> = all.iter().map(|m| m.content.clone()).collect();
        let expected: Vec<String> = (0..23).map(|i| format!("msg {i}")).collect();
        assert_eq!(contents, expected);

        let ids: HashSet<Uuid> = all.iter().map(|m| m.id).collect();
        assert_eq!(ids.len(), 23);
    }

    #[tokio::test]
    async fn history_is_scoped_to_the_conversation() {
        let (store, conversation) = seeded(3).await;
        let other = Conversation::new("t1", "s2");
        store
            .append(NewMessage::new(&other, Role::Teacher, "elsewhere"))
            .await
            .unwrap();

        assert_eq!(store.history(&conversation, None, 10).await.unwrap().len(), 3);
        assert_eq!(store.history(&other, None, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fetch_by_id_finds_only_stored_messages() {
        let (store, conversation) = seeded(0).await;
        let stored = store
            .append(NewMessage::new(&conversation, Role::Teacher, "kept"))
            .await
            .unwrap();

        let found = fetch_msg(&store.db_pool, stored.id).await.unwrap().unwrap();
        assert_eq!(found.content, "kept");
        assert!(fetch_msg(&store.db_pool, Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_cursor_is_not_found() {
        let (store, conversation) = seeded(2).await;
        let err = store
            .history(&conversation, Some(Uuid::now_v7()), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::NotFound(_)));
    }
}
