//! Chat identity and user/chat membership.
//!
//! The membership checks defined here are the access-control boundary for the
//! tag and session managers: they run inside the caller's transaction.

use chrono::Utc;
use sqlx::{Row, SqliteConnection};

use super::DatabasePool;
use crate::errors::AppError;
use crate::models::Chat;

/// Manager for chats and user memberships.
#[derive(Clone)]
pub struct ChatManager {
    pool: DatabasePool,
}

impl ChatManager {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Register a chat. Fails if a chat with this id is already known.
    pub async fn add_chat(&self, chat_id: i64, name: Option<&str>) -> Result<(), AppError> {
        let mut tx = self.pool.writer.begin().await?;

        if chat_exists(&mut tx, chat_id).await? {
            return Err(AppError::AlreadyExists(format!(
                "Chat {} already exists",
                chat_id
            )));
        }

        sqlx::query("INSERT INTO chats (id, name, registered_at) VALUES (?, ?, ?)")
            .bind(chat_id)
            .bind(name)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::on_conflict(e, || format!("Chat {} already exists", chat_id)))?;

        tx.commit().await?;
        tracing::info!(chat_id, "Chat registered");
        Ok(())
    }

    /// Remove a chat together with its memberships, tags, assignments and session.
    pub async fn remove_chat(&self, chat_id: i64) -> Result<(), AppError> {
        let mut tx = self.pool.writer.begin().await?;

        if !chat_exists(&mut tx, chat_id).await? {
            return Err(AppError::NotFound(format!("Chat {} not found", chat_id)));
        }

        // Children first so the cascade holds even without the foreign_keys pragma
        for statement in [
            "DELETE FROM message_tags WHERE tag_chat_id = ?",
            "DELETE FROM tags WHERE chat_id = ?",
            "DELETE FROM session_messages WHERE chat_id = ?",
            "DELETE FROM user_chats WHERE chat_id = ?",
            "DELETE FROM chats WHERE id = ?",
        ] {
            sqlx::query(statement)
                .bind(chat_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        tracing::info!(chat_id, "Chat removed");
        Ok(())
    }

    /// Get a chat by id.
    pub async fn get_chat(&self, chat_id: i64) -> Result<Chat, AppError> {
        let row = sqlx::query("SELECT id, name FROM chats WHERE id = ?")
            .bind(chat_id)
            .fetch_optional(&self.pool.reader)
            .await?;

        row.as_ref()
            .map(chat_from_row)
            .ok_or_else(|| AppError::NotFound(format!("Chat {} not found", chat_id)))
    }

    /// Associate a user with a chat.
    ///
    /// A user has at most one main chat; remembering a second one fails with
    /// `AlreadyExists`.
    pub async fn remember_user(
        &self,
        user_id: i64,
        chat_id: i64,
        is_main: bool,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.writer.begin().await?;

        if !chat_exists(&mut tx, chat_id).await? {
            return Err(AppError::NotFound(format!("Chat {} not found", chat_id)));
        }
        if is_member(&mut tx, user_id, chat_id).await? {
            return Err(AppError::AlreadyExists(format!(
                "User {} is already a member of chat {}",
                user_id, chat_id
            )));
        }
        if is_main {
            if let Some(main_chat) = main_chat_of(&mut tx, user_id).await? {
                return Err(AppError::AlreadyExists(format!(
                    "User {} already has main chat {}",
                    user_id, main_chat
                )));
            }
        }

        sqlx::query("INSERT INTO user_chats (user_id, chat_id, is_main) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(chat_id)
            .bind(is_main)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::on_conflict(e, || {
                    format!("Membership of user {} in chat {} conflicts", user_id, chat_id)
                })
            })?;

        tx.commit().await?;
        tracing::info!(user_id, chat_id, is_main, "User remembered");
        Ok(())
    }

    /// Disassociate a user from a chat.
    pub async fn forget_user(&self, user_id: i64, chat_id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM user_chats WHERE user_id = ? AND chat_id = ?")
            .bind(user_id)
            .bind(chat_id)
            .execute(&self.pool.writer)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "User {} is not a member of chat {}",
                user_id, chat_id
            )));
        }

        tracing::info!(user_id, chat_id, "User forgotten");
        Ok(())
    }

    /// All chats of a user. An empty result is reported as `NotFound`.
    pub async fn get_user_chats(&self, user_id: i64) -> Result<Vec<Chat>, AppError> {
        let rows = sqlx::query(
            "SELECT c.id, c.name FROM user_chats uc JOIN chats c ON c.id = uc.chat_id WHERE uc.user_id = ? ORDER BY c.id",
        )
        .bind(user_id)
        .fetch_all(&self.pool.reader)
        .await?;

        if rows.is_empty() {
            return Err(AppError::NotFound(format!(
                "No chats found for user {}",
                user_id
            )));
        }
        Ok(rows.iter().map(chat_from_row).collect())
    }

    /// All users of a chat. An unknown chat or an empty result is `NotFound`.
    pub async fn get_chat_users(&self, chat_id: i64) -> Result<Vec<i64>, AppError> {
        let mut tx = self.pool.reader.begin().await?;

        if !chat_exists(&mut tx, chat_id).await? {
            return Err(AppError::NotFound(format!("Chat {} not found", chat_id)));
        }

        let users: Vec<i64> =
            sqlx::query_scalar("SELECT user_id FROM user_chats WHERE chat_id = ? ORDER BY user_id")
                .bind(chat_id)
                .fetch_all(&mut *tx)
                .await?;
        tx.commit().await?;

        if users.is_empty() {
            return Err(AppError::NotFound(format!(
                "No users found for chat {}",
                chat_id
            )));
        }
        Ok(users)
    }

    /// The user's main chat id, if any.
    pub async fn get_main_chat(&self, user_id: i64) -> Result<Option<i64>, AppError> {
        let mut conn = self.pool.reader.acquire().await?;
        main_chat_of(&mut conn, user_id).await
    }

    /// Non-main chats of a user. An empty result is reported as `NotFound`.
    pub async fn get_ext_chats(&self, user_id: i64) -> Result<Vec<Chat>, AppError> {
        let rows = sqlx::query(
            "SELECT c.id, c.name FROM user_chats uc JOIN chats c ON c.id = uc.chat_id WHERE uc.user_id = ? AND uc.is_main = 0 ORDER BY c.id",
        )
        .bind(user_id)
        .fetch_all(&self.pool.reader)
        .await?;

        if rows.is_empty() {
            return Err(AppError::NotFound(format!(
                "No external chats found for user {}",
                user_id
            )));
        }
        Ok(rows.iter().map(chat_from_row).collect())
    }

    /// Whether the user is a member of the chat.
    pub async fn is_user_in_chat(&self, user_id: i64, chat_id: i64) -> Result<bool, AppError> {
        let mut conn = self.pool.reader.acquire().await?;
        is_member(&mut conn, user_id, chat_id).await
    }
}

pub(crate) async fn chat_exists(conn: &mut SqliteConnection, chat_id: i64) -> Result<bool, AppError> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM chats WHERE id = ?")
        .bind(chat_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}

pub(crate) async fn is_member(
    conn: &mut SqliteConnection,
    user_id: i64,
    chat_id: i64,
) -> Result<bool, AppError> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM user_chats WHERE user_id = ? AND chat_id = ?")
            .bind(user_id)
            .bind(chat_id)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(found.is_some())
}

/// Fail with `NotFound` unless the user is a member of the chat.
pub(crate) async fn ensure_member(
    conn: &mut SqliteConnection,
    user_id: i64,
    chat_id: i64,
) -> Result<(), AppError> {
    if is_member(conn, user_id, chat_id).await? {
        Ok(())
    } else {
        Err(AppError::NotFound(format!(
            "User {} not found in chat {}",
            user_id, chat_id
        )))
    }
}

async fn main_chat_of(conn: &mut SqliteConnection, user_id: i64) -> Result<Option<i64>, AppError> {
    let chat_id = sqlx::query_scalar(
        "SELECT chat_id FROM user_chats WHERE user_id = ? AND is_main = 1 ORDER BY rowid LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(chat_id)
}

fn chat_from_row(row: &sqlx::sqlite::SqliteRow) -> Chat {
    Chat {
        id: row.get("id"),
        name: row.get("name"),
    }
}
