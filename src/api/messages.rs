//! Message tagging and retrieval endpoints, scoped to `/api/users/{user_id}/chats/{chat_id}`.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{require_all_non_blank, require_non_blank, success, ApiResult};
use crate::errors::AppError;
use crate::models::{
    AddTagsRequest, BulkTagRequest, MessagesQuery, RenameTagRequest, TagOperation, TaggedMessage,
};
use crate::AppState;

/// GET .../messages?tags=a&tags=b&op=AND - Find messages by one or more tags.
pub async fn get_messages(
    State(state): State<AppState>,
    Path((user_id, chat_id)): Path<(i64, i64)>,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<Vec<TaggedMessage>> {
    let query = MessagesQuery::from_params(params);
    let tags = query.tags;
    let op = match query.op.as_deref() {
        Some(raw) => raw.parse::<TagOperation>().map_err(AppError::BadRequest)?,
        None => TagOperation::Or,
    };

    let messages = match tags.as_slice() {
        [single] => state.tags.get_messages(user_id, chat_id, single).await?,
        _ => {
            state
                .tags
                .get_messages_multitag(user_id, chat_id, &tags, op)
                .await?
        }
    };
    success(messages)
}

/// POST .../messages/tags - Put the same tags on several messages.
pub async fn add_tags_to_many(
    State(state): State<AppState>,
    Path((user_id, chat_id)): Path<(i64, i64)>,
    Json(request): Json<BulkTagRequest>,
) -> ApiResult<()> {
    require_all_non_blank(&request.tags, "Tag name")?;
    require_all_non_blank(&request.message_ids, "Message id")?;
    state
        .tags
        .add_tags_to_many(user_id, chat_id, &request.tags, &request.message_ids)
        .await?;
    success(())
}

/// GET .../messages/{message_id}/tags - Tags on one message.
pub async fn get_message_tags(
    State(state): State<AppState>,
    Path((user_id, chat_id, message_id)): Path<(i64, i64, String)>,
) -> ApiResult<Vec<String>> {
    success(
        state
            .tags
            .get_message_tags(user_id, chat_id, &message_id)
            .await?,
    )
}

/// POST .../messages/{message_id}/tags - Add tags to one message.
pub async fn add_message_tags(
    State(state): State<AppState>,
    Path((user_id, chat_id, message_id)): Path<(i64, i64, String)>,
    Json(request): Json<AddTagsRequest>,
) -> ApiResult<()> {
    require_non_blank(&message_id, "Message id")?;
    require_all_non_blank(&request.tags, "Tag name")?;

    match request.tags.as_slice() {
        [] => return Err(AppError::Validation("At least one tag is required".to_string())),
        [single] => {
            state
                .tags
                .add_tag(user_id, chat_id, single, &message_id)
                .await?
        }
        many => {
            state
                .tags
                .add_tags(user_id, chat_id, many, &message_id)
                .await?
        }
    }
    success(())
}

/// PUT .../messages/{message_id}/tags/{tag} - Swap a tag on one message.
pub async fn reassign_tag(
    State(state): State<AppState>,
    Path((user_id, chat_id, message_id, tag)): Path<(i64, i64, String, String)>,
    Json(request): Json<RenameTagRequest>,
) -> ApiResult<()> {
    require_non_blank(&request.new_name, "Tag name")?;
    state
        .tags
        .reassign_tag(user_id, chat_id, &message_id, &tag, &request.new_name)
        .await?;
    success(())
}

/// DELETE .../messages/{message_id}/tags/{tag} - Remove a tag from one message.
pub async fn remove_tag_from_message(
    State(state): State<AppState>,
    Path((user_id, chat_id, message_id, tag)): Path<(i64, i64, String, String)>,
) -> ApiResult<()> {
    state
        .tags
        .remove_tag_from_message(user_id, chat_id, &tag, &message_id)
        .await?;
    success(())
}

/// DELETE .../messages/{message_id} - Forget a message and its tags.
pub async fn delete_message(
    State(state): State<AppState>,
    Path((user_id, chat_id, message_id)): Path<(i64, i64, String)>,
) -> ApiResult<()> {
    state
        .tags
        .delete_message(user_id, chat_id, &message_id)
        .await?;
    success(())
}
