//! HTTP-facing error type.
//!
//! Errors map to HTTP status codes via the `IntoResponse` impl. Messages
//! returned to clients are generic; the reason a token was rejected is only
//! ever logged.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Value of the `WWW-Authenticate` header on 401 responses.
const WWW_AUTHENTICATE_BEARER: &str = "Bearer realm=\"pki-api\", error=\"invalid_token\"";

/// PKI API error type.
///
/// - Unauthenticated: 401 Unauthorized, with `WWW-Authenticate`
#[derive(Debug, Error)]
pub enum ApiError {
    /// No verified claims are attached to the request.
    #[error("The access token is invalid or expired")]
    Unauthenticated,
}

impl ApiError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (code, message) = match &self {
            ApiError::Unauthenticated => ("INVALID_TOKEN", self.to_string()),
        };

        let mut response = (
            status,
            Json(ErrorResponse {
                error: ErrorDetail { code, message },
            }),
        )
            .into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(WWW_AUTHENTICATE_BEARER),
            );
        }

        response
    }
}
