//! Request extractors whose rejections use the `AppError` body format.

use axum::extract::FromRequest;

use crate::error::AppError;

/// JSON request body. Malformed JSON, a missing content type, or fields of
/// the wrong type are reported as `400 validation`.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);
