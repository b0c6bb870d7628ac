use async_trait::async_trait;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{error::ChatError, model::Notification, store::NotificationApi};

type NotificationRow = (String, String, String, bool, OffsetDateTime);

pub(crate) async fn create(
    db_pool: &SqlitePool,
    owner_id: &str,
    payload: serde_json::Value,
) -> Result<Notification, ChatError> {
    let notification = Notification {
        id: Uuid::now_v7(),
        owner_id: owner_id.to_owned(),
        payload,
        is_read: false,
        created_at: OffsetDateTime::now_utc(),
    };

    sqlx::query("INSERT INTO notifications (id,owner_id,payload,is_read,created_at) VALUES (?,?,?,0,?)")
        .bind(notification.id.to_string())
        .bind(&notification.owner_id)
        .bind(notification.payload.to_string())
        .bind(notification.created_at)
        .execute(db_pool)
        .await?;

    Ok(notification)
}

pub(crate) async fn list(
    db_pool: &SqlitePool,
    owner_id: &str,
    limit: u32,
    skip: u32,
) -> Result<Vec<Notification>, ChatError> {
    let rows: Vec<NotificationRow> = sqlx::query_as(
        "SELECT id,owner_id,payload,is_read,created_at FROM notifications \
         WHERE owner_id=? ORDER BY rowid DESC LIMIT ? OFFSET ?",
    )
    .bind(owner_id)
    .bind(i64::from(limit))
    .bind(i64::from(skip))
    .fetch_all(db_pool)
    .await?;

    rows.into_iter().map(row_to_notification).collect()
}

pub(crate) async fn unread_count(db_pool: &SqlitePool, owner_id: &str) -> Result<u64, ChatError> {
    let (count,): (i64,) = sqlx::query_as("SELECT count(*) FROM notifications WHERE owner_id=? AND is_read=0")
        .bind(owner_id)
        .fetch_one(db_pool)
        .await?;
    Ok(count.max(0) as u64)
}

/// Idempotent. Someone else's notification is `Forbidden`, an unknown id `NotFound`.
pub(crate) async fn mark_read(db_pool: &SqlitePool, owner_id: &str, id: Uuid) -> Result<(), ChatError> {
    let result = sqlx::query("UPDATE notifications SET is_read=1 WHERE id=? AND owner_id=?")
        .bind(id.to_string())
        .bind(owner_id)
        .execute(db_pool)
        .await?;
    if result.rows_affected() > 0 {
        return Ok(());
    }

    let exists = sqlx::query("SELECT 1 FROM notifications WHERE id=?")
        .bind(id.to_string())
        .fetch_optional(db_pool)
        .await?
        .is_some();
    if exists {
        Err(ChatError::forbidden(owner_id, format!("notification {id}")))
    } else {
        Err(ChatError::NotFound(format!("notification {id}")))
    }
}

pub(crate) async fn mark_all_read(db_pool: &SqlitePool, owner_id: &str) -> Result<u64, ChatError> {
    let result = sqlx::query("UPDATE notifications SET is_read=1 WHERE owner_id=? AND is_read=0")
        .bind(owner_id)
        .execute(db_pool)
        .await?;
    Ok(result.rows_affected())
}

fn row_to_notification((id, owner_id, payload, is_read, created_at): NotificationRow) -> Result<Notification, ChatError> {
    Ok(Notification {
        id: Uuid::parse_str(&id).map_err(|e| ChatError::Malformed(format!("stored id {id}: {e}")))?,
        owner_id,
        payload: serde_json::from_str(&payload)?,
        is_read,
        created_at,
    })
}

/// One owner's notifications straight from the database.
#[derive(Clone)]
pub struct SqliteNotifications {
    db_pool: SqlitePool,
    owner_id: String,
}

impl SqliteNotifications {
    pub fn new(db_pool: SqlitePool, owner_id: impl Into<String>) -> Self {
        SqliteNotifications {
            db_pool,
            owner_id: owner_id.into(),
        }
    }
}

#[async_trait]
impl NotificationApi for SqliteNotifications {
    async fn list(&self, limit: u32, skip: u32) -> Result<Vec<Notification>, ChatError> {
        list(&self.db_pool, &self.owner_id, limit, skip).await
    }

    async fn unread_count(&self) -> Result<u64, ChatError> {
        unread_count(&self.db_pool, &self.owner_id).await
    }

    async fn mark_read(&self, id: Uuid) -> Result<(), ChatError> {
        mark_read(&self.db_pool, &self.owner_id, id).await
    }

    async fn mark_all_read(&self) -> Result<(), ChatError> {
        mark_all_read(&self.db_pool, &self.owner_id).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::db;

    #[tokio::test]
    async fn list_is_newest_first_and_paged() {
        let db_pool = db::memory().await.unwrap();
        for i in 0..5 {
            create(&db_pool, "u1", json!({ "n": i })).await.unwrap();
        }
        create(&db_pool, "u2", json!({ "n": 99 })).await.unwrap();

        let first = list(&db_pool, "u1", 2, 0).await.unwrap();
        let rest = list(&db_pool, "u1", 10, 2).await.unwrap();
        let ns: Vec<i64> = first
            .iter()
            .chain(rest.iter())
            .map(|n| n.payload["n"].as_i64().unwrap())
            .collect();
        assert_eq!(ns, vec![4, 3, 2, 1, 0]);
    }

    #[tokio::test]
    async fn mark_read_is_idempotent_and_owner_only() {
        let db_pool = db::memory().await.unwrap();
        let notification = create(&db_pool, "u1", json!("hi")).await.unwrap();
        assert_eq!(unread_count(&db_pool, "u1").await.unwrap(), 1);

        mark_read(&db_pool, "u1", notification.id).await.unwrap();
        mark_read(&db_pool, "u1", notification.id).await.unwrap();
        assert_eq!(unread_count(&db_pool, "u1").await.unwrap(), 0);

        assert!(matches!(
            mark_read(&db_pool, "u2", notification.id).await,
            Err(ChatError::Forbidden { .. })
        ));
        assert!(matches!(
            mark_read(&db_pool, "u1", Uuid::now_v7()).await,
            Err(ChatError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn mark_all_read_only_touches_owner() {
        let db_pool = db::memory().await.unwrap();
        for _ in 0..5 {
            create(&db_pool, "u1", json!({})).await.unwrap();
        }
        create(&db_pool, "u2", json!({})).await.unwrap();

        assert_eq!(mark_all_read(&db_pool, "u1").await.unwrap(), 5);
        assert_eq!(mark_all_read(&db_pool, "u1").await.unwrap(), 0);

        assert_eq!(unread_count(&db_pool, "u1").await.unwrap(), 0);
        assert_eq!(unread_count(&db_pool, "u2").await.unwrap(), 1);
        assert!(list(&db_pool, "u1", 10, 0).await.unwrap().iter().all(|n| n.is_read));
    }
}
