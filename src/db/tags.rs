//! Chat-scoped tag vocabulary and message/tag assignments.
//!
//! Tags exist only while at least one message in the chat carries them: every
//! path that removes an assignment also drops the tag once it is orphaned.

use std::collections::HashMap;

use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use super::chats::ensure_member;
use super::DatabasePool;
use crate::errors::AppError;
use crate::models::{TagOperation, TaggedMessage};

/// Manager for tags and their assignment to messages.
#[derive(Clone)]
pub struct TagManager {
    pool: DatabasePool,
}

impl TagManager {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    // ==================== RETRIEVAL ====================

    /// Messages carrying `tag` in the chat, in tagging order.
    pub async fn get_messages(
        &self,
        user_id: i64,
        chat_id: i64,
        tag: &str,
    ) -> Result<Vec<TaggedMessage>, AppError> {
        let mut tx = self.pool.reader.begin().await?;
        ensure_member(&mut tx, user_id, chat_id).await?;

        let message_ids: Vec<String> = sqlx::query_scalar(
            "SELECT message_id FROM message_tags WHERE tag_chat_id = ? AND tag_name = ? ORDER BY rowid",
        )
        .bind(chat_id)
        .bind(tag)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(message_ids
            .into_iter()
            .map(|message_id| TaggedMessage {
                message_id,
                chat_id,
                tags: vec![tag.to_string()],
            })
            .collect())
    }

    /// Messages matching several tags combined with `op`.
    ///
    /// `Or` annotates each message with the requested tags it carries; `And`
    /// returns only messages carrying every requested tag, annotated with all of them.
    pub async fn get_messages_multitag(
        &self,
        user_id: i64,
        chat_id: i64,
        tags: &[String],
        op: TagOperation,
    ) -> Result<Vec<TaggedMessage>, AppError> {
        let wanted = dedup_tags(tags);
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.reader.begin().await?;
        ensure_member(&mut tx, user_id, chat_id).await?;

        let messages = match op {
            TagOperation::Or => {
                let mut query = QueryBuilder::<Sqlite>::new(
                    "SELECT message_id, tag_name FROM message_tags WHERE tag_chat_id = ",
                );
                query.push_bind(chat_id);
                push_name_list(&mut query, " AND tag_name IN (", &wanted);
                query.push(" ORDER BY rowid");
                let rows = query.build().fetch_all(&mut *tx).await?;

                let mut messages: Vec<TaggedMessage> = Vec::new();
                let mut positions: HashMap<String, usize> = HashMap::new();
                for row in rows {
                    let message_id: String = row.get("message_id");
                    let tag_name: String = row.get("tag_name");
                    let idx = *positions.entry(message_id.clone()).or_insert_with(|| {
                        messages.push(TaggedMessage {
                            message_id,
                            chat_id,
                            tags: Vec::new(),
                        });
                        messages.len() - 1
                    });
                    messages[idx].tags.push(tag_name);
                }
                // Annotations follow the order of the request
                for message in &mut messages {
                    message
                        .tags
                        .sort_by_key(|t| wanted.iter().position(|w| w == t));
                }
                messages
            }
            TagOperation::And => {
                let mut query = QueryBuilder::<Sqlite>::new(
                    "SELECT message_id FROM message_tags WHERE tag_chat_id = ",
                );
                query.push_bind(chat_id);
                push_name_list(&mut query, " AND tag_name IN (", &wanted);
                query.push(" GROUP BY message_id HAVING COUNT(DISTINCT tag_name) = ");
                query.push_bind(wanted.len() as i64);
                query.push(" ORDER BY MIN(rowid)");
                let rows = query.build().fetch_all(&mut *tx).await?;

                rows.iter()
                    .map(|row| TaggedMessage {
                        message_id: row.get("message_id"),
                        chat_id,
                        tags: wanted.clone(),
                    })
                    .collect()
            }
        };
        tx.commit().await?;

        tracing::debug!(user_id, chat_id, %op, found = messages.len(), "Multi-tag lookup");
        Ok(messages)
    }

    /// All tags defined in the chat.
    pub async fn get_tags(&self, user_id: i64, chat_id: i64) -> Result<Vec<String>, AppError> {
        let mut tx = self.pool.reader.begin().await?;
        ensure_member(&mut tx, user_id, chat_id).await?;

        let tags = sqlx::query_scalar("SELECT name FROM tags WHERE chat_id = ? ORDER BY name")
            .bind(chat_id)
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(tags)
    }

    /// All tags on one message, in the order they were attached.
    pub async fn get_message_tags(
        &self,
        user_id: i64,
        chat_id: i64,
        message_id: &str,
    ) -> Result<Vec<String>, AppError> {
        let mut tx = self.pool.reader.begin().await?;
        ensure_member(&mut tx, user_id, chat_id).await?;

        let tags = sqlx::query_scalar(
            "SELECT tag_name FROM message_tags WHERE tag_chat_id = ? AND message_id = ? ORDER BY rowid",
        )
        .bind(chat_id)
        .bind(message_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(tags)
    }

    // ==================== ASSIGNMENT ====================

    /// Add a tag to a message.
    pub async fn add_tag(
        &self,
        user_id: i64,
        chat_id: i64,
        tag: &str,
        message_id: &str,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.writer.begin().await?;
        ensure_member(&mut tx, user_id, chat_id).await?;

        assign_tag(&mut tx, chat_id, tag, message_id).await?;

        tx.commit().await?;
        tracing::info!(user_id, chat_id, tag, message_id, "Tag assigned");
        Ok(())
    }

    /// Add several tags to a message. Either all are assigned or none.
    pub async fn add_tags(
        &self,
        user_id: i64,
        chat_id: i64,
        tags: &[String],
        message_id: &str,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.writer.begin().await?;
        ensure_member(&mut tx, user_id, chat_id).await?;

        for tag in tags {
            assign_tag(&mut tx, chat_id, tag, message_id).await?;
        }

        tx.commit().await?;
        tracing::info!(user_id, chat_id, message_id, count = tags.len(), "Tags assigned");
        Ok(())
    }

    /// Add one tag to several messages.
    pub async fn add_tag_to_many(
        &self,
        user_id: i64,
        chat_id: i64,
        tag: &str,
        message_ids: &[String],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.writer.begin().await?;
        ensure_member(&mut tx, user_id, chat_id).await?;

        get_or_create_tag(&mut tx, chat_id, tag).await?;
        for message_id in message_ids {
            check_tag_not_assigned(&mut tx, chat_id, tag, message_id).await?;
            insert_assignment(&mut tx, chat_id, tag, message_id).await?;
        }

        tx.commit().await?;
        tracing::info!(user_id, chat_id, tag, count = message_ids.len(), "Tag assigned to messages");
        Ok(())
    }

    /// Add the same tags to several messages.
    pub async fn add_tags_to_many(
        &self,
        user_id: i64,
        chat_id: i64,
        tags: &[String],
        message_ids: &[String],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.writer.begin().await?;
        ensure_member(&mut tx, user_id, chat_id).await?;

        for message_id in message_ids {
            for tag in tags {
                assign_tag(&mut tx, chat_id, tag, message_id).await?;
            }
        }

        tx.commit().await?;
        tracing::info!(
            user_id,
            chat_id,
            tags = tags.len(),
            messages = message_ids.len(),
            "Tags assigned to messages"
        );
        Ok(())
    }

    // ==================== VOCABULARY CHANGES ====================

    /// Rename a tag, merging into `new_tag` when it already exists.
    ///
    /// On merge, messages that already carry `new_tag` simply lose `old_tag`.
    pub async fn rename_tag(
        &self,
        user_id: i64,
        chat_id: i64,
        old_tag: &str,
        new_tag: &str,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.writer.begin().await?;
        ensure_member(&mut tx, user_id, chat_id).await?;

        if !tag_exists(&mut tx, chat_id, old_tag).await? {
            return Err(AppError::NotFound(format!(
                "Tag {} not found in chat {}",
                old_tag, chat_id
            )));
        }
        if old_tag == new_tag {
            return Ok(());
        }
        let merge = tag_exists(&mut tx, chat_id, new_tag).await?;

        get_or_create_tag(&mut tx, chat_id, new_tag).await?;

        // Drop assignments that would duplicate an existing one of the target
        sqlx::query(
            r#"DELETE FROM message_tags
               WHERE tag_chat_id = ? AND tag_name = ?
                 AND message_id IN (
                     SELECT message_id FROM message_tags WHERE tag_chat_id = ? AND tag_name = ?
                 )"#,
        )
        .bind(chat_id)
        .bind(old_tag)
        .bind(chat_id)
        .bind(new_tag)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE message_tags SET tag_name = ? WHERE tag_chat_id = ? AND tag_name = ?",
        )
        .bind(new_tag)
        .bind(chat_id)
        .bind(old_tag)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM tags WHERE chat_id = ? AND name = ?")
            .bind(chat_id)
            .bind(old_tag)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(user_id, chat_id, old_tag, new_tag, merge, "Tag renamed");
        Ok(())
    }

    /// Swap `old_tag` for `new_tag` on one message.
    ///
    /// Runs as one transaction: if `new_tag` is already on the message nothing
    /// changes. `old_tag` is dropped from the chat when this was its last use.
    pub async fn reassign_tag(
        &self,
        user_id: i64,
        chat_id: i64,
        message_id: &str,
        old_tag: &str,
        new_tag: &str,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.writer.begin().await?;
        ensure_member(&mut tx, user_id, chat_id).await?;

        assign_tag(&mut tx, chat_id, new_tag, message_id).await?;

        let removed = delete_assignment(&mut tx, chat_id, old_tag, message_id).await?;
        if removed {
            drop_if_orphaned(&mut tx, chat_id, old_tag).await?;
        }

        tx.commit().await?;
        tracing::info!(user_id, chat_id, message_id, old_tag, new_tag, "Tag reassigned");
        Ok(())
    }

    /// Delete a tag and all of its assignments.
    pub async fn delete_tag(&self, user_id: i64, chat_id: i64, tag: &str) -> Result<(), AppError> {
        let mut tx = self.pool.writer.begin().await?;
        ensure_member(&mut tx, user_id, chat_id).await?;

        if !tag_exists(&mut tx, chat_id, tag).await? {
            return Err(AppError::NotFound(format!(
                "Tag {} not found in chat {}",
                tag, chat_id
            )));
        }

        sqlx::query("DELETE FROM message_tags WHERE tag_chat_id = ? AND tag_name = ?")
            .bind(chat_id)
            .bind(tag)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM tags WHERE chat_id = ? AND name = ?")
            .bind(chat_id)
            .bind(tag)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(user_id, chat_id, tag, "Tag deleted");
        Ok(())
    }

    /// Remove one tag from one message.
    pub async fn remove_tag_from_message(
        &self,
        user_id: i64,
        chat_id: i64,
        tag: &str,
        message_id: &str,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.writer.begin().await?;
        ensure_member(&mut tx, user_id, chat_id).await?;

        if !delete_assignment(&mut tx, chat_id, tag, message_id).await? {
            return Err(AppError::NotFound(format!(
                "Tag {} is not assigned to message {}",
                tag, message_id
            )));
        }
        drop_if_orphaned(&mut tx, chat_id, tag).await?;

        tx.commit().await?;
        tracing::info!(user_id, chat_id, tag, message_id, "Tag removed from message");
        Ok(())
    }

    /// Forget a message: drop all its assignments and any tags left orphaned.
    ///
    /// Unlike every other operation here, no membership check is made.
    pub async fn delete_message(
        &self,
        user_id: i64,
        chat_id: i64,
        message_id: &str,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.writer.begin().await?;

        let tag_names: Vec<String> = sqlx::query_scalar(
            "SELECT tag_name FROM message_tags WHERE tag_chat_id = ? AND message_id = ?",
        )
        .bind(chat_id)
        .bind(message_id)
        .fetch_all(&mut *tx)
        .await?;

        if tag_names.is_empty() {
            return Ok(());
        }

        sqlx::query("DELETE FROM message_tags WHERE tag_chat_id = ? AND message_id = ?")
            .bind(chat_id)
            .bind(message_id)
            .execute(&mut *tx)
            .await?;

        let mut query = QueryBuilder::<Sqlite>::new("DELETE FROM tags WHERE chat_id = ");
        query.push_bind(chat_id);
        push_name_list(&mut query, " AND name IN (", &tag_names);
        query.push(
            " AND NOT EXISTS (SELECT 1 FROM message_tags mt WHERE mt.tag_chat_id = tags.chat_id AND mt.tag_name = tags.name)",
        );
        let dropped = query.build().execute(&mut *tx).await?.rows_affected();

        tx.commit().await?;
        tracing::info!(
            user_id,
            chat_id,
            message_id,
            unassigned = tag_names.len(),
            dropped,
            "Message forgotten"
        );
        Ok(())
    }
}

/// Requested tags without duplicates, first occurrence wins.
fn dedup_tags(tags: &[String]) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        if !unique.contains(tag) {
            unique.push(tag.clone());
        }
    }
    unique
}

/// Append `prefix` followed by a bound, comma-separated name list and `)`.
fn push_name_list(query: &mut QueryBuilder<'_, Sqlite>, prefix: &str, names: &[String]) {
    query.push(prefix);
    let mut list = query.separated(", ");
    for name in names {
        list.push_bind(name.clone());
    }
    list.push_unseparated(")");
}

async fn tag_exists(conn: &mut SqliteConnection, chat_id: i64, tag: &str) -> Result<bool, AppError> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM tags WHERE chat_id = ? AND name = ?")
        .bind(chat_id)
        .bind(tag)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}

async fn get_or_create_tag(conn: &mut SqliteConnection, chat_id: i64, tag: &str) -> Result<(), AppError> {
    sqlx::query("INSERT OR IGNORE INTO tags (name, chat_id) VALUES (?, ?)")
        .bind(tag)
        .bind(chat_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn check_tag_not_assigned(
    conn: &mut SqliteConnection,
    chat_id: i64,
    tag: &str,
    message_id: &str,
) -> Result<(), AppError> {
    let found: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM message_tags WHERE tag_chat_id = ? AND tag_name = ? AND message_id = ?",
    )
    .bind(chat_id)
    .bind(tag)
    .bind(message_id)
    .fetch_optional(&mut *conn)
    .await?;

    match found {
        Some(_) => Err(already_assigned(chat_id, tag, message_id)),
        None => Ok(()),
    }
}

async fn insert_assignment(
    conn: &mut SqliteConnection,
    chat_id: i64,
    tag: &str,
    message_id: &str,
) -> Result<(), AppError> {
    sqlx::query("INSERT INTO message_tags (message_id, tag_name, tag_chat_id) VALUES (?, ?, ?)")
        .bind(message_id)
        .bind(tag)
        .bind(chat_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::on_conflict(e, || already_assigned(chat_id, tag, message_id).message()))?;
    Ok(())
}

/// Get-or-create the tag, then attach it to the message.
async fn assign_tag(
    conn: &mut SqliteConnection,
    chat_id: i64,
    tag: &str,
    message_id: &str,
) -> Result<(), AppError> {
    get_or_create_tag(conn, chat_id, tag).await?;
    check_tag_not_assigned(conn, chat_id, tag, message_id).await?;
    insert_assignment(conn, chat_id, tag, message_id).await
}

async fn delete_assignment(
    conn: &mut SqliteConnection,
    chat_id: i64,
    tag: &str,
    message_id: &str,
) -> Result<bool, AppError> {
    let result = sqlx::query(
        "DELETE FROM message_tags WHERE tag_chat_id = ? AND tag_name = ? AND message_id = ?",
    )
    .bind(chat_id)
    .bind(tag)
    .bind(message_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

async fn drop_if_orphaned(conn: &mut SqliteConnection, chat_id: i64, tag: &str) -> Result<(), AppError> {
    let result = sqlx::query(
        r#"DELETE FROM tags
           WHERE chat_id = ? AND name = ?
             AND NOT EXISTS (SELECT 1 FROM message_tags WHERE tag_chat_id = ? AND tag_name = ?)"#,
    )
    .bind(chat_id)
    .bind(tag)
    .bind(chat_id)
    .bind(tag)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() > 0 {
        tracing::debug!(chat_id, tag, "Orphaned tag dropped");
    }
    Ok(())
}

fn already_assigned(chat_id: i64, tag: &str, message_id: &str) -> AppError {
    AppError::AlreadyExists(format!(
        "Tag {} in chat {} is already assigned to message {}",
        tag, chat_id, message_id
    ))
}
