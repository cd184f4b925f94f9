//! Ephemeral per-chat sessions: bot-sent messages awaiting cleanup.

use chrono::Utc;

use super::chats::{chat_exists, ensure_member};
use super::DatabasePool;
use crate::errors::AppError;

/// Manager for session messages.
#[derive(Clone)]
pub struct SessionManager {
    pool: DatabasePool,
}

impl SessionManager {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Append bot-sent messages to the chat's current session.
    ///
    /// An id already pending in this chat's session is kept once.
    pub async fn update_session(
        &self,
        user_id: i64,
        chat_id: i64,
        message_ids: &[String],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.writer.begin().await?;

        if !chat_exists(&mut tx, chat_id).await? {
            return Err(AppError::NotFound(format!("Chat {} not found", chat_id)));
        }
        ensure_member(&mut tx, user_id, chat_id).await?;

        let sent_at = Utc::now().to_rfc3339();
        for message_id in message_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO session_messages (message_id, chat_id, sent_at) VALUES (?, ?, ?)",
            )
            .bind(message_id)
            .bind(chat_id)
            .bind(&sent_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(user_id, chat_id, added = message_ids.len(), "Session updated");
        Ok(())
    }

    /// Drain the chat's session, returning its message ids in insertion order.
    pub async fn end_session(&self, chat_id: i64) -> Result<Vec<String>, AppError> {
        let mut tx = self.pool.writer.begin().await?;

        let message_ids: Vec<String> = sqlx::query_scalar(
            "SELECT message_id FROM session_messages WHERE chat_id = ? ORDER BY rowid",
        )
        .bind(chat_id)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM session_messages WHERE chat_id = ?")
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::debug!(chat_id, drained = message_ids.len(), "Session ended");
        Ok(message_ids)
    }
}
