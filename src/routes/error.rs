use actix_web::{error, http::StatusCode, HttpRequest, HttpResponse, ResponseError};
use thiserror::Error;

use crate::core::MatchmakingError;
use crate::models::ErrorResponse;
use crate::services::{AssetError, StoreError};

/// Every failure a handler can return
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Matchmaking(#[from] MatchmakingError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),
}

impl ApiError {
    /// Short machine-readable code for the `error` field
    fn code(&self) -> &'static str {
        match self {
            ApiError::Matchmaking(e) => match e {
                MatchmakingError::InsufficientRoster { .. } => "insufficient_roster",
                MatchmakingError::NonceMismatch => "nonce_mismatch",
                MatchmakingError::PairMismatch => "pair_mismatch",
                MatchmakingError::AlreadyVoted(_) => "already_voted",
                MatchmakingError::InvalidVote(_) => "invalid_vote",
                MatchmakingError::StoreUnavailable(_) => "store_unavailable",
                MatchmakingError::PartialUpdateFailure { .. } => "partial_update_failure",
            },
            ApiError::Store(StoreError::NotFound(_)) => "not_found",
            ApiError::Store(e) if e.is_transient() => "store_unavailable",
            ApiError::Store(_) => "store_error",
            ApiError::Asset(AssetError::NotFound(_)) => "not_found",
            ApiError::Asset(_) => "asset_error",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Matchmaking(e) => match e {
                MatchmakingError::InvalidVote(_) => StatusCode::BAD_REQUEST,
                MatchmakingError::NonceMismatch | MatchmakingError::PairMismatch => {
                    StatusCode::FORBIDDEN
                }
                MatchmakingError::AlreadyVoted(_) => StatusCode::CONFLICT,
                MatchmakingError::PartialUpdateFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                MatchmakingError::InsufficientRoster { .. }
                | MatchmakingError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
            ApiError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Store(e) if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Asset(AssetError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Asset(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{} failed: {}", self.code(), self);
        }

        HttpResponse::build(status).json(ErrorResponse {
            error: self.code().to_string(),
            message: self.to_string(),
            status_code: status.as_u16(),
        })
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    ApiError::BadRequest(format!("Invalid JSON: {}", err)).into()
}

/// Handle query payload errors
pub fn handle_query_payload_error(err: error::QueryPayloadError, req: &HttpRequest) -> actix_web::Error {
    tracing::info!("Query payload error on {}: {}", req.path(), err);
    ApiError::BadRequest(format!("Invalid query: {}", err)).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matchmaking_status_mapping() {
        let cases = [
            (MatchmakingError::InvalidVote("same".into()), 400),
            (MatchmakingError::NonceMismatch, 403),
            (MatchmakingError::PairMismatch, 403),
            (MatchmakingError::AlreadyVoted("7".into()), 409),
            (MatchmakingError::PartialUpdateFailure { failed: vec!["7".into()] }, 500),
            (MatchmakingError::InsufficientRoster { available: 1 }, 503),
            (MatchmakingError::StoreUnavailable("down".into()), 503),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code().as_u16(), status);
        }
    }

    #[test]
    fn test_collaborator_status_mapping() {
        assert_eq!(
            ApiError::from(StoreError::NotFound("9".into())).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(StoreError::Unavailable("pool".into())).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(AssetError::NotFound("x.jpg".into())).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(AssetError::Unauthorized).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_body_shape() {
        let response = ApiError::Forbidden("Invalid secret code".into()).error_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
