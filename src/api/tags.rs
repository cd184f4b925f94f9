//! Tag vocabulary endpoints, scoped to `/api/users/{user_id}/chats/{chat_id}`.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{require_all_non_blank, require_non_blank, success, ApiResult};
use crate::models::{RenameTagRequest, TagMessagesRequest};
use crate::AppState;

/// GET .../tags - List the chat's tags.
pub async fn get_tags(
    State(state): State<AppState>,
    Path((user_id, chat_id)): Path<(i64, i64)>,
) -> ApiResult<Vec<String>> {
    success(state.tags.get_tags(user_id, chat_id).await?)
}

/// PUT .../tags/{tag} - Rename a tag, merging when the new name exists.
pub async fn rename_tag(
    State(state): State<AppState>,
    Path((user_id, chat_id, tag)): Path<(i64, i64, String)>,
    Json(request): Json<RenameTagRequest>,
) -> ApiResult<()> {
    require_non_blank(&request.new_name, "Tag name")?;
    state
        .tags
        .rename_tag(user_id, chat_id, &tag, &request.new_name)
        .await?;
    success(())
}

/// DELETE .../tags/{tag} - Delete a tag and its assignments.
pub async fn delete_tag(
    State(state): State<AppState>,
    Path((user_id, chat_id, tag)): Path<(i64, i64, String)>,
) -> ApiResult<()> {
    state.tags.delete_tag(user_id, chat_id, &tag).await?;
    success(())
}

/// POST .../tags/{tag}/messages - Put one tag on several messages.
pub async fn add_tag_to_many(
    State(state): State<AppState>,
    Path((user_id, chat_id, tag)): Path<(i64, i64, String)>,
    Json(request): Json<TagMessagesRequest>,
) -> ApiResult<()> {
    require_non_blank(&tag, "Tag name")?;
    require_all_non_blank(&request.message_ids, "Message id")?;
    state
        .tags
        .add_tag_to_many(user_id, chat_id, &tag, &request.message_ids)
        .await?;
    success(())
}
