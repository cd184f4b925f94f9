//! Session bookkeeping endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{require_all_non_blank, success, ApiResult};
use crate::models::UpdateSessionRequest;
use crate::AppState;

/// POST /api/users/{user_id}/chats/{chat_id}/session - Record bot-sent messages.
pub async fn update_session(
    State(state): State<AppState>,
    Path((user_id, chat_id)): Path<(i64, i64)>,
    Json(request): Json<UpdateSessionRequest>,
) -> ApiResult<()> {
    require_all_non_blank(&request.message_ids, "Message id")?;
    state
        .sessions
        .update_session(user_id, chat_id, &request.message_ids)
        .await?;
    success(())
}

/// DELETE /api/chats/{chat_id}/session - Drain the session, returning the stale message ids.
pub async fn end_session(
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
) -> ApiResult<Vec<String>> {
    success(state.sessions.end_session(chat_id).await?)
}
