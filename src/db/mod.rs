//! Database module for SQLite persistence.
//!
//! Each manager call runs in its own short transaction: commit on success,
//! rollback when the transaction is dropped on any error path.

mod chats;
mod sessions;
mod tags;

pub use chats::*;
pub use sessions::*;
pub use tags::*;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Split read/write pools over one SQLite file in WAL mode.
///
/// `writer` has a single connection, so write transactions are serialized and a
/// check-then-insert sequence never interleaves with another writer in this
/// process. `reader` serves concurrent read-only transactions.
#[derive(Clone)]
pub struct DatabasePool {
    pub reader: SqlitePool,
    pub writer: SqlitePool,
}

/// Initialize the database pools and run migrations.
pub async fn init_database(db_path: &Path) -> Result<DatabasePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(sqlx::Error::Io)?;
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let base_opts = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let writer = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(base_opts.clone())
        .await?;

    // Schema must exist before read-only connections open the file
    run_migrations(&writer).await?;

    let reader = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(base_opts.read_only(true))
        .await?;

    tracing::debug!(path = %db_path.display(), "Database ready");
    Ok(DatabasePool { reader, writer })
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chats (
            id INTEGER PRIMARY KEY,
            name TEXT,
            registered_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_chats (
            user_id INTEGER NOT NULL,
            chat_id INTEGER NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
            is_main INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (user_id, chat_id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tags (
            name TEXT NOT NULL,
            chat_id INTEGER NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
            PRIMARY KEY (name, chat_id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS message_tags (
            message_id TEXT NOT NULL,
            tag_name TEXT NOT NULL,
            tag_chat_id INTEGER NOT NULL,
            PRIMARY KEY (message_id, tag_name, tag_chat_id),
            FOREIGN KEY (tag_name, tag_chat_id) REFERENCES tags(name, chat_id) ON DELETE CASCADE
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS session_messages (
            message_id TEXT NOT NULL,
            chat_id INTEGER NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
            sent_at TEXT NOT NULL,
            PRIMARY KEY (message_id, chat_id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Indexes for common queries; the partial index allows one main chat per user
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_user_chats_one_main ON user_chats(user_id) WHERE is_main = 1;
        CREATE INDEX IF NOT EXISTS idx_user_chats_chat ON user_chats(chat_id);
        CREATE INDEX IF NOT EXISTS idx_message_tags_tag ON message_tags(tag_chat_id, tag_name);
        CREATE INDEX IF NOT EXISTS idx_message_tags_message ON message_tags(tag_chat_id, message_id);
        CREATE INDEX IF NOT EXISTS idx_session_messages_chat ON session_messages(chat_id);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
