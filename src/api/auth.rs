// Copyright 2023 Remi Bernotavicius

//! Token authentication. Clients send `Authorization: Token <key>`; `Bearer`
//! is accepted too.

use super::{ApiError, AppState};
use crate::database::models::User;
use crate::store::users;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use std::sync::Arc;

fn token_from_header(value: &str) -> Option<&str> {
    let (scheme, key) = value.trim().split_once(' ')?;
    let key = key.trim();
    let known = scheme.eq_ignore_ascii_case("token") || scheme.eq_ignore_ascii_case("bearer");
    (known && !key.is_empty()).then_some(key)
}

/// The token a request carries, if it has an `Authorization` header at all.
fn request_token(parts: &Parts) -> Result<Option<String>, ApiError> {
    let Some(value) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| ApiError::InvalidToken)?;
    let key = token_from_header(value).ok_or(ApiError::InvalidToken)?;
    Ok(Some(key.to_owned()))
}

/// The raw token the request was made with.
pub struct Token(pub String);

impl FromRequestParts<Arc<AppState>> for Token {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        request_token(parts)?
            .map(Self)
            .ok_or(ApiError::AuthenticationRequired)
    }
}

/// Whoever is looking, if anyone. A token that doesn't match a user is
/// rejected rather than treated as anonymous.
pub struct Viewer(pub Option<User>);

impl Viewer {
    pub fn id(&self) -> Option<crate::database::models::UserId> {
        self.0.as_ref().map(|u| u.id)
    }
}

impl FromRequestParts<Arc<AppState>> for Viewer {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(key) = request_token(parts)? else {
            return Ok(Self(None));
        };
        let user = state
            .with_conn(move |conn| users::user_for_token(conn, &key))
            .await?
            .ok_or(ApiError::InvalidToken)?;
        Ok(Self(Some(user)))
    }
}

/// A signed-in user; requests without one get a 401.
pub struct Authenticated(pub User);

impl FromRequestParts<Arc<AppState>> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Viewer(user) = Viewer::from_request_parts(parts, state).await?;
        user.map(Self).ok_or(ApiError::AuthenticationRequired)
    }
}

#[test]
fn header_parsing() {
    assert_eq!(token_from_header("Token abc123"), Some("abc123"));
    assert_eq!(token_from_header("Bearer abc123"), Some("abc123"));
    assert_eq!(token_from_header("token  abc123 "), Some("abc123"));
    assert_eq!(token_from_header("Basic abc123"), None);
    assert_eq!(token_from_header("Token"), None);
    assert_eq!(token_from_header("Token "), None);
}
