//! Client for the OCR microservice.
//!
//! The service takes an image URL and answers with the recognised text. Every
//! failure mode is reported as `AppError::TranscriptionUnavailable`.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

#[derive(Debug, Serialize)]
struct OcrRequest<'a> {
    image: &'a str,
}

#[derive(Debug, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    text: Option<String>,
}

/// HTTP client for `POST {base_url}/ocr`.
#[derive(Clone)]
pub struct OcrClient {
    client: Client,
    endpoint: String,
}

impl OcrClient {
    /// Build a client with an explicit per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build OCR client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: format!("{}/ocr", base_url.trim_end_matches('/')),
        })
    }

    /// Transcribe the image at `image_url`. An image without text yields `""`.
    pub async fn transcribe(&self, image_url: &str) -> Result<String, AppError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&OcrRequest { image: image_url })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, body = %body, "OCR service rejected request");
            return Err(AppError::TranscriptionUnavailable(format!(
                "OCR service answered with status {}",
                status
            )));
        }

        let payload: OcrResponse = response.json().await?;
        let text = payload.text.unwrap_or_default();
        tracing::debug!(chars = text.len(), "Image transcribed");
        Ok(text)
    }
}
