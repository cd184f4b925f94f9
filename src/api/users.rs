//! Per-user chat listings.

use axum::extract::{Path, State};

use super::{success, ApiResult};
use crate::models::Chat;
use crate::AppState;

/// GET /api/users/{user_id}/chats - All chats of the user.
pub async fn get_user_chats(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Vec<Chat>> {
    success(state.chats.get_user_chats(user_id).await?)
}

/// GET /api/users/{user_id}/main-chat - The user's main chat id, or null.
pub async fn get_main_chat(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Option<i64>> {
    success(state.chats.get_main_chat(user_id).await?)
}

/// GET /api/users/{user_id}/ext-chats - The user's group chats.
pub async fn get_ext_chats(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Vec<Chat>> {
    success(state.chats.get_ext_chats(user_id).await?)
}

/// GET /api/users/{user_id}/chats/{chat_id}/membership - Whether the user is in the chat.
pub async fn is_user_in_chat(
    State(state): State<AppState>,
    Path((user_id, chat_id)): Path<(i64, i64)>,
) -> ApiResult<bool> {
    success(state.chats.is_user_in_chat(user_id, chat_id).await?)
}
