//! Image transcription endpoint.

use axum::{extract::State, Json};

use super::{require_non_blank, success, ApiResult};
use crate::errors::AppError;
use crate::models::{TranscribeRequest, Transcription};
use crate::AppState;

/// POST /api/ocr - Transcribe an image by URL.
pub async fn transcribe(
    State(state): State<AppState>,
    Json(request): Json<TranscribeRequest>,
) -> ApiResult<Transcription> {
    require_non_blank(&request.image_url, "Image URL")?;

    let Some(ocr) = state.ocr.as_ref() else {
        return Err(AppError::TranscriptionUnavailable(
            "Text recognition is not configured".to_string(),
        ));
    };

    let text = ocr.transcribe(&request.image_url).await?;
    success(Transcription { text })
}
