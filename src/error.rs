// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::lifecycle::SecretError;

/// Body returned for every reveal failure, so callers cannot tell a missing
/// secret from a consumed, expired or undecryptable one.
pub const SECRET_NOT_FOUND: &str = "secret not found";

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<SecretError> for ApiError {
    fn from(e: SecretError) -> Self {
        match e {
            SecretError::NotFound | SecretError::Corrupt | SecretError::InvalidAddress => {
                ApiError::not_found(SECRET_NOT_FOUND)
            }
            SecretError::SecretTooLarge { .. } => ApiError::payload_too_large(e.to_string()),
            SecretError::StoreUnreachable => ApiError::unavailable("secret store unavailable"),
            SecretError::RandomnessUnavailable
            | SecretError::EncryptionFailed
            | SecretError::StoreWriteFailed => ApiError::internal("failed to store secret"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn constructors_set_status_and_message() {
        let nf = ApiError::not_found("missing");
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.message, "missing");

        let bad = ApiError::bad_request("bad");
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
        assert_eq!(bad.message, "bad");

        assert_eq!(
            ApiError::payload_too_large("big").status,
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::unavailable("down").status,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::internal("oops").status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn reveal_failures_are_indistinguishable() {
        for e in [
            SecretError::NotFound,
            SecretError::Corrupt,
            SecretError::InvalidAddress,
        ] {
            let api = ApiError::from(e);
            assert_eq!(api.status, StatusCode::NOT_FOUND);
            assert_eq!(api.message, SECRET_NOT_FOUND);
        }
    }

    #[test]
    fn deposit_failures_map_to_status_codes() {
        let too_large = ApiError::from(SecretError::SecretTooLarge { limit: 16 });
        assert_eq!(too_large.status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(too_large.message, "secret exceeds 16 bytes");

        assert_eq!(
            ApiError::from(SecretError::StoreUnreachable).status,
            StatusCode::SERVICE_UNAVAILABLE
        );
        for e in [
            SecretError::RandomnessUnavailable,
            SecretError::EncryptionFailed,
            SecretError::StoreWriteFailed,
        ] {
            assert_eq!(ApiError::from(e).status, StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::from(SecretError::Corrupt).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"secret not found"}"#);
    }
}
