//! Chat and membership models.

use serde::{Deserialize, Serialize};

/// A conversation on the chat platform known to the bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Request body for registering a chat.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatRequest {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
}

/// Request body for remembering a user in a chat.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RememberUserRequest {
    pub user_id: i64,
    /// Whether this is the user's private (direct) chat with the bot
    #[serde(default = "default_is_main")]
    pub is_main: bool,
}

fn default_is_main() -> bool {
    true
}
