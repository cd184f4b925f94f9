//! REST API module.
//!
//! Thin handlers over the managers; the chat transport adapter is the only client.

mod chats;
mod messages;
mod ocr;
mod sessions;
mod tags;
mod users;

pub use chats::*;
pub use messages::*;
pub use ocr::*;
pub use sessions::*;
pub use tags::*;
pub use users::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::AppError;

/// Success response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(ApiResponse::new(data))
}

/// Reject empty or whitespace-only identifiers and names.
fn require_non_blank(value: &str, what: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} must not be blank", what)));
    }
    Ok(())
}

fn require_all_non_blank(values: &[String], what: &str) -> Result<(), AppError> {
    values.iter().try_for_each(|v| require_non_blank(v, what))
}
