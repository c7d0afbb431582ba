// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::onboarding::OnboardingError;
use crate::transfer::TransferError;

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

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
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

pub fn transfer_status(err: &TransferError) -> StatusCode {
    match err {
        TransferError::UserNotFound(_)
        | TransferError::WalletNotFound(_)
        | TransferError::ChallengeNotFound(_) => StatusCode::NOT_FOUND,
        TransferError::UserInactive(_) => StatusCode::FORBIDDEN,
        TransferError::ChallengeExpired(_) => StatusCode::GONE,
        TransferError::Validation(_) | TransferError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        TransferError::Gateway(_) => StatusCode::BAD_GATEWAY,
        TransferError::Persistence(_) | TransferError::Encoding(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<TransferError> for ApiError {
    fn from(err: TransferError) -> Self {
        let status = transfer_status(&err);
        if status.is_server_error() {
            tracing::error!(error = %err, "Transfer request failed");
        }
        Self::new(status, err.to_string())
    }
}

impl From<OnboardingError> for ApiError {
    fn from(err: OnboardingError) -> Self {
        let status = match &err {
            OnboardingError::UserNotFound(_) => StatusCode::NOT_FOUND,
            OnboardingError::AlreadyActive(_) | OnboardingError::UsernameTaken(_) => {
                StatusCode::CONFLICT
            }
            OnboardingError::UserInactive(_) => StatusCode::FORBIDDEN,
            OnboardingError::MissingCredential(_) | OnboardingError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            OnboardingError::Gateway(_) => StatusCode::BAD_GATEWAY,
            OnboardingError::InvalidMetadata(_) | OnboardingError::Persistence(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "Onboarding request failed");
        }
        Self::new(status, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::AmountError;
    use crate::providers::GatewayError;
    use axum::body::to_bytes;

    #[test]
    fn constructors_set_status_and_message() {
        let nf = ApiError::not_found("missing");
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.message, "missing");

        let unauthorized = ApiError::unauthorized("bad signature");
        assert_eq!(unauthorized.status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn transfer_errors_map_to_http_status() {
        let cases = [
            (TransferError::UserNotFound("u".into()), StatusCode::NOT_FOUND),
            (TransferError::ChallengeNotFound("c".into()), StatusCode::NOT_FOUND),
            (TransferError::UserInactive("u".into()), StatusCode::FORBIDDEN),
            (TransferError::ChallengeExpired("c".into()), StatusCode::GONE),
            (
                TransferError::Validation(AmountError::UnsupportedAsset("XYZ".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                TransferError::Validation(AmountError::NonPositive("0".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                TransferError::Gateway(GatewayError::Request("down".into())),
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn onboarding_conflict_is_409() {
        let err = ApiError::from(OnboardingError::AlreadyActive("us-1".into()));
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.message, "user us-1 is already active");

        let taken = ApiError::from(OnboardingError::UsernameTaken("alice".into()));
        assert_eq!(taken.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data"}"#);
    }
}
