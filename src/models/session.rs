//! Session bookkeeping and OCR request models.

use serde::{Deserialize, Serialize};

/// Request body for appending bot-sent messages to a chat's session.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSessionRequest {
    pub message_ids: Vec<String>,
}

/// Request body for transcribing an image.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscribeRequest {
    pub image_url: String,
}

/// Transcription result.
#[derive(Debug, Clone, Serialize)]
pub struct Transcription {
    pub text: String,
}
