//! Tag, tagged message and tag query models.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Boolean combinator for multi-tag retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TagOperation {
    And,
    Or,
}

impl TagOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagOperation::And => "AND",
            TagOperation::Or => "OR",
        }
    }
}

impl FromStr for TagOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AND" => Ok(TagOperation::And),
            "OR" => Ok(TagOperation::Or),
            other => Err(format!("Unknown tag operation '{}'", other)),
        }
    }
}

impl fmt::Display for TagOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message found by tag, annotated with the matching tags it carries.
///
/// The message body lives on the chat platform; only its id is stored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaggedMessage {
    pub message_id: String,
    pub chat_id: i64,
    pub tags: Vec<String>,
}

/// Query string for message retrieval: `?tags=a&tags=b&op=AND`.
///
/// Every `tags` parameter is one tag name, taken verbatim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagesQuery {
    pub tags: Vec<String>,
    pub op: Option<String>,
}

impl MessagesQuery {
    /// Collect the raw query pairs; blank names and unknown keys are ignored.
    pub fn from_params(params: Vec<(String, String)>) -> Self {
        let mut query = Self::default();
        for (key, value) in params {
            match key.as_str() {
                "tags" if !value.trim().is_empty() => query.tags.push(value),
                "op" => query.op = Some(value),
                _ => {}
            }
        }
        query
    }
}

/// Request body for adding tags to one message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddTagsRequest {
    pub tags: Vec<String>,
}

/// Request body for tagging several messages with one tag.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagMessagesRequest {
    pub message_ids: Vec<String>,
}

/// Request body for tagging several messages with several tags.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkTagRequest {
    pub message_ids: Vec<String>,
    pub tags: Vec<String>,
}

/// Request body for renaming a tag or swapping it on a message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameTagRequest {
    pub new_name: String,
}
