// Copyright 2023 Remi Bernotavicius

use super::auth::{Authenticated, Token, Viewer};
use super::error::Result;
use super::pagination::{PageView, Pagination};
use super::views::{
    parse_register_request, LoginRequest, RegisterRequest, SetPasswordRequest, TokenView,
    UserView, UserWithRecipesView,
};
use super::AppState;
use crate::database::models::UserId;
use crate::store::relations::{self, Follow};
use crate::store::{users as store, ValidationErrors};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

type JsonBody<T> = std::result::Result<Json<T>, JsonRejection>;

pub async fn register(
    State(state): State<Arc<AppState>>,
    body: JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<UserView>)> {
    let Json(request) = body?;
    let new_user = parse_register_request(request)?;
    let user = state
        .with_conn(move |conn| store::create_user(conn, new_user))
        .await?;
    Ok((StatusCode::CREATED, Json(UserView::registered(user))))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    viewer: Viewer,
    pagination: Pagination,
) -> Result<Json<PageView<UserView>>> {
    let viewer = viewer.id();
    let page = pagination.page;
    let (users, followed) = state
        .with_conn(move |conn| {
            let users = store::list_users(conn, page)?;
            let followed = match viewer {
                Some(viewer) => {
                    let ids = users.items.iter().map(|u| u.id).collect();
                    relations::followed_among(conn, viewer, ids)?
                }
                None => Default::default(),
            };
            Ok((users, followed))
        })
        .await?;
    Ok(Json(pagination.respond(users, |user| {
        let is_subscribed = followed.contains(&user.id);
        UserView::new(user, is_subscribed)
    })))
}

pub async fn show(
    State(state): State<Arc<AppState>>,
    viewer: Viewer,
    Path(id): Path<UserId>,
) -> Result<Json<UserView>> {
    let viewer = viewer.id();
    let (user, is_subscribed) = state
        .with_conn(move |conn| {
            let user = store::find_user(conn, id)?;
            let is_subscribed = match viewer {
                Some(viewer) => relations::is_paired(conn, &Follow, viewer, id)?,
                None => false,
            };
            Ok((user, is_subscribed))
        })
        .await?;
    Ok(Json(UserView::new(user, is_subscribed)))
}

pub async fn me(Authenticated(user): Authenticated) -> Json<UserView> {
    Json(UserView::new(user, false))
}

pub async fn set_password(
    State(state): State<Arc<AppState>>,
    Authenticated(user): Authenticated,
    body: JsonBody<SetPasswordRequest>,
) -> Result<StatusCode> {
    let Json(request) = body?;
    state
        .with_conn(move |conn| {
            store::set_password(conn, &user, &request.current_password, &request.new_password)
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct RecipesLimit {
    recipes_limit: Option<String>,
}

impl RecipesLimit {
    fn parse(&self) -> std::result::Result<Option<i64>, ValidationErrors> {
        let Some(raw) = &self.recipes_limit else {
            return Ok(None);
        };
        match raw.parse::<i64>() {
            Ok(limit) if limit >= 0 => Ok(Some(limit)),
            _ => Err(ValidationErrors::single(
                "recipes_limit",
                "Enter a non-negative whole number.",
            )),
        }
    }
}

type LimitQuery = std::result::Result<Query<RecipesLimit>, QueryRejection>;

pub async fn subscriptions(
    State(state): State<Arc<AppState>>,
    Authenticated(user): Authenticated,
    pagination: Pagination,
    limit: LimitQuery,
) -> Result<Json<PageView<UserWithRecipesView>>> {
    let Query(limit) = limit?;
    let recipes_limit = limit.parse()?;
    let page = pagination.page;
    let authors = state
        .with_conn(move |conn| relations::list_subscriptions(conn, user.id, page, recipes_limit))
        .await?;
    Ok(Json(pagination.respond(authors, |author| {
        UserWithRecipesView::new(author, true)
    })))
}

pub async fn subscribe(
    State(state): State<Arc<AppState>>,
    Authenticated(user): Authenticated,
    Path(id): Path<UserId>,
    limit: LimitQuery,
) -> Result<(StatusCode, Json<UserWithRecipesView>)> {
    let Query(limit) = limit?;
    let recipes_limit = limit.parse()?;
    let author = state
        .with_conn(move |conn| {
            relations::toggle_add(conn, &Follow, user.id, id)?;
            let author = store::find_user(conn, id)?;
            relations::author_with_recipes(conn, author, recipes_limit)
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(UserWithRecipesView::new(author, true)),
    ))
}

pub async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    Authenticated(user): Authenticated,
    Path(id): Path<UserId>,
) -> Result<StatusCode> {
    state
        .with_conn(move |conn| relations::toggle_remove(conn, &Follow, user.id, id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    body: JsonBody<LoginRequest>,
) -> Result<Json<TokenView>> {
    let Json(request) = body?;
    let auth_token = state
        .with_conn(move |conn| {
            let user = store::authenticate(conn, &request.email, &request.password)?;
            store::issue_token(conn, user.id)
        })
        .await?;
    Ok(Json(TokenView { auth_token }))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    _user: Authenticated,
    Token(key): Token,
) -> Result<StatusCode> {
    state
        .with_conn(move |conn| store::revoke_token(conn, &key))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
use super::test_util::{self, send};
#[cfg(test)]
use crate::store::test_util as fixtures;
#[cfg(test)]
use serde_json::json;

#[test]
fn recipes_limit_parsing() {
    let limit = |raw: Option<&str>| {
        RecipesLimit {
            recipes_limit: raw.map(Into::into),
        }
        .parse()
    };
    assert_eq!(limit(None).unwrap(), None);
    assert_eq!(limit(Some("3")).unwrap(), Some(3));
    assert_eq!(limit(Some("0")).unwrap(), Some(0));
    assert!(limit(Some("-1")).unwrap_err().has("recipes_limit"));
    assert!(limit(Some("lots")).unwrap_err().has("recipes_limit"));
}

#[tokio::test]
async fn register_login_logout() {
    let state = test_util::state();
    let registration = json!({
        "email": "Alice@Example.com",
        "username": "alice",
        "first_name": "Alice",
        "last_name": "Liddell",
        "password": "looking-glass",
    });

    let response = send(&state, "POST", "/api/users", None, Some(registration.clone())).await;
    assert_eq!(response.status, StatusCode::CREATED);
    let created = response.json();
    assert_eq!(created["email"], "alice@example.com");
    assert!(created.get("is_subscribed").is_none());
    assert!(created.get("password").is_none());

    let response = send(&state, "POST", "/api/users", None, Some(registration)).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.json().get("username").is_some());

    let response = send(&state, "POST", "/api/users", None, Some(json!({"email": "x@y.z"}))).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["password"], json!(["This field is required."]));

    let login = json!({"email": "alice@example.com", "password": "wrong"});
    let response = send(&state, "POST", "/api/auth/token/login", None, Some(login)).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let login = json!({"email": "alice@example.com", "password": "looking-glass"});
    let response = send(&state, "POST", "/api/auth/token/login", None, Some(login)).await;
    assert_eq!(response.status, StatusCode::OK);
    let token = response.json()["auth_token"].as_str().unwrap().to_owned();

    let response = send(&state, "GET", "/api/users/me", Some(&token), None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["username"], "alice");
    assert_eq!(response.json()["is_subscribed"], false);

    let response = send(&state, "POST", "/api/auth/token/logout", Some(&token), None).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    let response = send(&state, "GET", "/api/users/me", Some(&token), None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    let response = send(&state, "GET", "/api/users/me", None, None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn change_password() {
    let state = test_util::state();
    let alice = fixtures::user(&mut test_util::conn(&state), "alice");
    let token = test_util::token(&state, &alice);

    let response = send(
        &state,
        "POST",
        "/api/users/set_password",
        Some(&token),
        Some(json!({"current_password": "nope", "new_password": "new-secret"})),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.json().get("current_password").is_some());

    let response = send(
        &state,
        "POST",
        "/api/users/set_password",
        Some(&token),
        Some(json!({"current_password": "hunter2-hunter2", "new_password": "new-secret"})),
    )
    .await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    let login = json!({"email": "alice@example.com", "password": "new-secret"});
    let response = send(&state, "POST", "/api/auth/token/login", None, Some(login)).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn subscriptions_flow() {
    let state = test_util::state();
    let (alice, bob, carol) = {
        let mut conn = test_util::conn(&state);
        let alice = fixtures::user(&mut conn, "alice");
        let bob = fixtures::user(&mut conn, "bob");
        let carol = fixtures::user(&mut conn, "carol");
        let flour = fixtures::ingredient(&mut conn, "flour", "g");
        let lunch = fixtures::tag(&mut conn, "Lunch", "#00FF00");
        for name in ["Bread", "Rolls", "Buns"] {
            fixtures::recipe(&mut conn, &bob, name, &[(&flour, 1)], &[&lunch]);
        }
        (alice, bob, carol)
    };
    let token = test_util::token(&state, &alice);

    let subscribe = format!("/api/users/{}/subscribe?recipes_limit=1", bob.id);
    let response = send(&state, "POST", &subscribe, Some(&token), None).await;
    assert_eq!(response.status, StatusCode::CREATED);
    let body = response.json();
    assert_eq!(body["username"], "bob");
    assert_eq!(body["is_subscribed"], true);
    assert_eq!(body["recipes_count"], 3);
    assert_eq!(body["recipes"].as_array().unwrap().len(), 1);

    let response = send(&state, "POST", &subscribe, Some(&token), None).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let own = format!("/api/users/{}/subscribe", alice.id);
    let response = send(&state, "POST", &own, Some(&token), None).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = send(&state, "POST", "/api/users/99/subscribe", Some(&token), None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = send(&state, "GET", &format!("/api/users/{}", bob.id), Some(&token), None).await;
    assert_eq!(response.json()["is_subscribed"], true);
    let response = send(&state, "GET", &format!("/api/users/{}", bob.id), None, None).await;
    assert_eq!(response.json()["is_subscribed"], false);

    let response = send(&state, "GET", "/api/users", Some(&token), None).await;
    let body = response.json();
    assert_eq!(body["count"], 3);
    let subscribed: Vec<_> = body["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["is_subscribed"].as_bool().unwrap())
        .collect();
    assert_eq!(subscribed, [false, true, false]);

    let response = send(
        &state,
        "GET",
        "/api/users/subscriptions?recipes_limit=2",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["id"], json!(bob.id));
    assert_eq!(body["results"][0]["recipes"].as_array().unwrap().len(), 2);

    let response = send(
        &state,
        "GET",
        "/api/users/subscriptions?recipes_limit=-3",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let unsubscribe = format!("/api/users/{}/subscribe", bob.id);
    let response = send(&state, "DELETE", &unsubscribe, Some(&token), None).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    let response = send(&state, "DELETE", &unsubscribe, Some(&token), None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    let carol_unsubscribe = format!("/api/users/{}/subscribe", carol.id);
    let response = send(&state, "DELETE", &carol_unsubscribe, Some(&token), None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}
