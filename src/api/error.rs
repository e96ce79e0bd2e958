// Copyright 2023 Remi Bernotavicius

use crate::store;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] store::Error),
    #[error("authentication credentials were not provided")]
    AuthenticationRequired,
    #[error("invalid token")]
    InvalidToken,
    #[error("{0}")]
    BadRequest(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<store::ValidationErrors> for ApiError {
    fn from(e: store::ValidationErrors) -> Self {
        Self::Store(e.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::BadRequest(e.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        Self::BadRequest(e.body_text())
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        use store::Error as E;

        match self {
            Self::Store(E::Validation(_) | E::Conflict(_) | E::InvalidOperation(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Store(E::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Store(E::PermissionDenied) => StatusCode::FORBIDDEN,
            Self::Store(E::Database(_) | E::PasswordHash(_)) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::AuthenticationRequired | Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            Self::Store(store::Error::Validation(errors)) => json!(errors),
            Self::Store(store::Error::Database(_) | store::Error::PasswordHash(_))
            | Self::Internal(_) => {
                log::error!("{self}");
                json!({ "errors": "internal server error" })
            }
            other => json!({ "errors": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
async fn body_json(response: Response) -> serde_json::Value {
    use http_body_util::BodyExt as _;

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[test]
fn status_codes() {
    use store::Error as E;

    let cases = [
        (ApiError::from(E::Conflict("dup".into())), StatusCode::BAD_REQUEST),
        (E::InvalidOperation("self".into()).into(), StatusCode::BAD_REQUEST),
        (E::NotFound("recipe").into(), StatusCode::NOT_FOUND),
        (E::PermissionDenied.into(), StatusCode::FORBIDDEN),
        (
            E::Database(diesel::result::Error::NotFound).into(),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
        (
            E::PasswordHash(argon2::password_hash::Error::Password).into(),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
        (ApiError::AuthenticationRequired, StatusCode::UNAUTHORIZED),
        (ApiError::InvalidToken, StatusCode::UNAUTHORIZED),
        (ApiError::BadRequest("bad".into()), StatusCode::BAD_REQUEST),
        (ApiError::Internal("oops".into()), StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (error, status) in cases {
        assert_eq!(error.status_code(), status, "{error}");
    }
}

#[tokio::test]
async fn bodies() {
    let validation = ApiError::from(store::ValidationErrors::single(
        "ingredients",
        "Must have at least one ingredient.",
    ));
    assert_eq!(
        body_json(validation.into_response()).await,
        json!({ "ingredients": ["Must have at least one ingredient."] })
    );

    let missing = ApiError::from(store::Error::NotFound("recipe"));
    assert_eq!(
        body_json(missing.into_response()).await,
        json!({ "errors": "recipe not found" })
    );

    let internal = ApiError::Internal("secret path /var/db".into());
    assert_eq!(
        body_json(internal.into_response()).await,
        json!({ "errors": "internal server error" })
    );
}
