//! Chat and membership endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{success, ApiResult};
use crate::models::{Chat, CreateChatRequest, RememberUserRequest};
use crate::AppState;

/// POST /api/chats - Register a chat.
pub async fn add_chat(
    State(state): State<AppState>,
    Json(request): Json<CreateChatRequest>,
) -> ApiResult<Chat> {
    state
        .chats
        .add_chat(request.id, request.name.as_deref())
        .await?;
    success(Chat {
        id: request.id,
        name: request.name,
    })
}

/// GET /api/chats/{chat_id} - Get a chat.
pub async fn get_chat(State(state): State<AppState>, Path(chat_id): Path<i64>) -> ApiResult<Chat> {
    success(state.chats.get_chat(chat_id).await?)
}

/// DELETE /api/chats/{chat_id} - Remove a chat and everything attached to it.
pub async fn remove_chat(State(state): State<AppState>, Path(chat_id): Path<i64>) -> ApiResult<()> {
    state.chats.remove_chat(chat_id).await?;
    success(())
}

/// GET /api/chats/{chat_id}/users - List the chat's users.
pub async fn get_chat_users(
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
) -> ApiResult<Vec<i64>> {
    success(state.chats.get_chat_users(chat_id).await?)
}

/// POST /api/chats/{chat_id}/members - Remember a user in the chat.
pub async fn remember_user(
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
    Json(request): Json<RememberUserRequest>,
) -> ApiResult<()> {
    state
        .chats
        .remember_user(request.user_id, chat_id, request.is_main)
        .await?;
    success(())
}

/// DELETE /api/chats/{chat_id}/members/{user_id} - Forget a user in the chat.
pub async fn forget_user(
    State(state): State<AppState>,
    Path((chat_id, user_id)): Path<(i64, i64)>,
) -> ApiResult<()> {
    state.chats.forget_user(user_id, chat_id).await?;
    success(())
}
