//! Helper types and traits for cleaner route handlers.
//!
//! Every handler returns [`ApiResult`]; library errors convert into an
//! [`ApiError`] carrying the HTTP status and a `{"error": msg}` JSON body.

use aurora_pdf_core::Error;
use axum::Json;
use axum::body::Body;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{error, warn};

/// Standard result type for route handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

/// HTTP status for a library error.
pub const fn status_for(err: &Error) -> StatusCode {
    if err.is_client_error() {
        return StatusCode::BAD_REQUEST;
    }
    match err {
        Error::JobNotFound(_) => StatusCode::NOT_FOUND,
        Error::JobInFlight { .. } | Error::JobTerminal { .. } => StatusCode::CONFLICT,
        Error::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            error!("Request failed: {}", err);
        } else {
            warn!("Request rejected: {}", err);
        }
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Extension trait for converting `Option<T>` to `ApiResult<T>`.
pub trait OptionExt<T> {
    /// Returns the contained value or a 404 Not Found error.
    fn or_not_found(self, msg: &str) -> ApiResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, msg: &str) -> ApiResult<T> {
        self.ok_or_else(|| ApiError::not_found(msg))
    }
}

/// Extension trait for converting `Result<T, E>` to `ApiResult<T>`.
pub trait ResultExt<T, E: std::fmt::Display> {
    /// Converts the error to 500 Internal Server Error.
    fn or_internal_error(self) -> ApiResult<T>;

    /// Converts the error to 400 Bad Request.
    fn or_bad_request(self) -> ApiResult<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T, E> for Result<T, E> {
    fn or_internal_error(self) -> ApiResult<T> {
        self.map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
    }

    fn or_bad_request(self) -> ApiResult<T> {
        self.map_err(|e| ApiError::bad_request(e.to_string()))
    }
}

/// `Content-Disposition` value for a download named `filename`.
///
/// Non-ASCII names get an RFC 5987 `filename*` next to an ASCII fallback.
pub fn content_disposition(filename: &str) -> String {
    if filename.is_ascii() && !filename.contains('"') {
        return format!("attachment; filename=\"{filename}\"");
    }
    let fallback: String = filename
        .chars()
        .map(|c| if c.is_ascii() && c != '"' { c } else { '_' })
        .collect();
    format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    )
}

/// Build a file download response.
pub fn attachment(
    body: impl Into<Body>,
    filename: &str,
    media_type: &str,
    extra_headers: &[(&'static str, String)],
) -> ApiResult<Response> {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, media_type)
        .header(header::CONTENT_DISPOSITION, content_disposition(filename));

    for (name, value) in extra_headers {
        builder = builder.header(*name, HeaderValue::from_str(value).or_internal_error()?);
    }

    builder.body(body.into()).or_internal_error()
}
