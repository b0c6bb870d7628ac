use std::str::FromStr;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id TEXT NOT NULL UNIQUE,
    teacher_id TEXT NOT NULL,
    student_id TEXT NOT NULL,
    sender TEXT NOT NULL CHECK (sender IN ('teacher', 'student')),
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS messages_by_conversation ON messages (teacher_id, student_id);

CREATE TABLE IF NOT EXISTS notifications (
    id TEXT NOT NULL UNIQUE,
    owner_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    is_read BOOLEAN NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS notifications_by_owner ON notifications (owner_id, is_read);
"#;

pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let db_pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    migrate(&db_pool).await?;
    Ok(db_pool)
}

pub async fn migrate(db_pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(db_pool).await?;
    Ok(())
}

/// Single-connection in-memory pool; every connection would otherwise get its own database.
/// The connection is never recycled, since closing it drops the data.
pub async fn memory() -> Result<SqlitePool, sqlx::Error> {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
        .await?;

    migrate(&db_pool).await?;
    Ok(db_pool)
}
