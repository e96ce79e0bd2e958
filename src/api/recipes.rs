// Copyright 2023 Remi Bernotavicius

use super::auth::{Authenticated, Viewer};
use super::error::Result;
use super::pagination::{PageView, Pagination};
use super::views::{
    parse_write_request, render_recipe_view, RecipeShortView, RecipeView, RecipeWriteRequest,
};
use super::{ApiError, AppState};
use crate::database::models::{RecipeId, RecipeRelation, UserId};
use crate::shopping_list::{self, Format};
use crate::store::recipes::{self as store, RecipeFilter};
use crate::store::relations::{toggle_add, toggle_remove};
use crate::store::ValidationErrors;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

type QueryPairs = std::result::Result<Query<Vec<(String, String)>>, QueryRejection>;

fn parse_flag(errors: &mut ValidationErrors, field: &'static str, value: &str) -> bool {
    match value {
        "1" | "true" | "True" => true,
        "0" | "false" | "False" => false,
        _ => {
            errors.add(field, "Enter a valid boolean.");
            false
        }
    }
}

fn parse_filter(pairs: &[(String, String)]) -> std::result::Result<RecipeFilter, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let mut filter = RecipeFilter::default();
    for (key, value) in pairs {
        match key.as_str() {
            "tags" => filter.tags.push(value.clone()),
            "author" => match value.parse() {
                Ok(id) => filter.author = Some(UserId(id)),
                Err(_) => errors.add("author", "Enter a number."),
            },
            "is_favorited" => filter.is_favorited = parse_flag(&mut errors, "is_favorited", value),
            "is_in_shopping_cart" => {
                filter.is_in_shopping_cart = parse_flag(&mut errors, "is_in_shopping_cart", value)
            }
            _ => {}
        }
    }
    errors.into_result()?;
    Ok(filter)
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    viewer: Viewer,
    pagination: Pagination,
    query: QueryPairs,
) -> Result<Json<PageView<RecipeView>>> {
    let Query(pairs) = query?;
    let filter = parse_filter(&pairs)?;
    let viewer = viewer.id();
    let page = pagination.page;

    let recipes = state
        .with_conn(move |conn| store::list_recipes(conn, &filter, viewer, page))
        .await?;
    Ok(Json(pagination.respond(recipes, render_recipe_view)))
}

pub async fn show(
    State(state): State<Arc<AppState>>,
    viewer: Viewer,
    Path(id): Path<RecipeId>,
) -> Result<Json<RecipeView>> {
    let viewer = viewer.id();
    let details = state
        .with_conn(move |conn| store::recipe_details(conn, id, viewer))
        .await?;
    Ok(Json(render_recipe_view(details)))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Authenticated(user): Authenticated,
    body: std::result::Result<Json<RecipeWriteRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RecipeView>)> {
    let Json(request) = body?;
    let draft = parse_write_request(request)?;

    let details = state
        .with_conn(move |conn| {
            let recipe = store::create_recipe(conn, user.id, draft)?;
            store::recipe_details(conn, recipe.id, Some(user.id))
        })
        .await?;
    Ok((StatusCode::CREATED, Json(render_recipe_view(details))))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Authenticated(user): Authenticated,
    Path(id): Path<RecipeId>,
    body: std::result::Result<Json<RecipeWriteRequest>, JsonRejection>,
) -> Result<Json<RecipeView>> {
    let Json(request) = body?;
    let draft = parse_write_request(request);

    let details = state
        .with_conn(move |conn| {
            store::update_recipe(conn, &user, id, draft)?;
            store::recipe_details(conn, id, Some(user.id))
        })
        .await?;
    Ok(Json(render_recipe_view(details)))
}

pub async fn destroy(
    State(state): State<Arc<AppState>>,
    Authenticated(user): Authenticated,
    Path(id): Path<RecipeId>,
) -> Result<StatusCode> {
    state
        .with_conn(move |conn| store::delete_recipe(conn, &user, id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn mark(
    state: Arc<AppState>,
    user: UserId,
    id: RecipeId,
    relation: RecipeRelation,
) -> Result<(StatusCode, Json<RecipeShortView>)> {
    let recipe = state
        .with_conn(move |conn| {
            toggle_add(conn, &relation, user, id)?;
            store::find_recipe(conn, id)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(recipe.into())))
}

async fn unmark(
    state: Arc<AppState>,
    user: UserId,
    id: RecipeId,
    relation: RecipeRelation,
) -> Result<StatusCode> {
    state
        .with_conn(move |conn| toggle_remove(conn, &relation, user, id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_favorite(
    State(state): State<Arc<AppState>>,
    Authenticated(user): Authenticated,
    Path(id): Path<RecipeId>,
) -> Result<(StatusCode, Json<RecipeShortView>)> {
    mark(state, user.id, id, RecipeRelation::Favorite).await
}

pub async fn remove_favorite(
    State(state): State<Arc<AppState>>,
    Authenticated(user): Authenticated,
    Path(id): Path<RecipeId>,
) -> Result<StatusCode> {
    unmark(state, user.id, id, RecipeRelation::Favorite).await
}

pub async fn add_to_cart(
    State(state): State<Arc<AppState>>,
    Authenticated(user): Authenticated,
    Path(id): Path<RecipeId>,
) -> Result<(StatusCode, Json<RecipeShortView>)> {
    mark(state, user.id, id, RecipeRelation::ShoppingCart).await
}

pub async fn remove_from_cart(
    State(state): State<Arc<AppState>>,
    Authenticated(user): Authenticated,
    Path(id): Path<RecipeId>,
) -> Result<StatusCode> {
    unmark(state, user.id, id, RecipeRelation::ShoppingCart).await
}

#[derive(serde::Deserialize)]
pub struct DownloadParams {
    format: Option<String>,
}

pub async fn download_shopping_cart(
    State(state): State<Arc<AppState>>,
    Authenticated(user): Authenticated,
    params: std::result::Result<Query<DownloadParams>, QueryRejection>,
) -> Result<impl IntoResponse> {
    let Query(params) = params?;
    let format = match params.format.as_deref() {
        None => Format::default(),
        Some(raw) => raw
            .parse::<Format>()
            .map_err(|_| ApiError::BadRequest(format!("unknown format {raw:?}")))?,
    };

    let user_id = user.id;
    let items = state
        .with_conn(move |conn| shopping_list::build_shopping_list(conn, user_id))
        .await?;
    let today = chrono::Local::now().date_naive();
    let document = format.render(&user.username, today, &items);

    Ok((
        [
            (CONTENT_TYPE, format.content_type().to_owned()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", format.file_name()),
            ),
        ],
        document,
    ))
}

#[cfg(test)]
use super::test_util::{self, send};
#[cfg(test)]
use crate::store::test_util as fixtures;
#[cfg(test)]
use serde_json::json;

#[test]
fn filter_parameters() {
    let pairs = |raw: &[(&str, &str)]| {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<Vec<_>>()
    };

    let filter = parse_filter(&pairs(&[
        ("tags", "lunch"),
        ("tags", "dinner"),
        ("author", "3"),
        ("is_favorited", "1"),
        ("is_in_shopping_cart", "0"),
        ("page", "2"),
    ]))
    .unwrap();
    assert_eq!(
        filter,
        RecipeFilter {
            tags: vec!["lunch".into(), "dinner".into()],
            author: Some(UserId(3)),
            is_favorited: true,
            is_in_shopping_cart: false,
        }
    );

    let errors = parse_filter(&pairs(&[("author", "bob"), ("is_favorited", "maybe")]))
        .unwrap_err();
    assert!(errors.has("author"));
    assert!(errors.has("is_favorited"));
}

#[tokio::test]
async fn anonymous_listing_has_no_marks() {
    let state = test_util::state();
    {
        let mut conn = test_util::conn(&state);
        let alice = fixtures::user(&mut conn, "alice");
        let flour = fixtures::ingredient(&mut conn, "flour", "g");
        let lunch = fixtures::tag(&mut conn, "Lunch", "#00FF00");
        for name in ["Bread", "Rolls"] {
            let recipe = fixtures::recipe(&mut conn, &alice, name, &[(&flour, 100)], &[&lunch]);
            toggle_add(&mut conn, &RecipeRelation::Favorite, alice.id, recipe.id).unwrap();
            toggle_add(&mut conn, &RecipeRelation::ShoppingCart, alice.id, recipe.id).unwrap();
        }
    }

    let response = send(&state, "GET", "/api/recipes", None, None).await;
    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["count"], 2);
    assert_eq!(body["next"], serde_json::Value::Null);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    for recipe in results {
        assert_eq!(recipe["is_favorited"], false);
        assert_eq!(recipe["is_in_shopping_cart"], false);
        assert_eq!(recipe["author"]["is_subscribed"], false);
    }
    assert_eq!(results[0]["name"], "Rolls");
    assert_eq!(
        results[0]["ingredients"],
        json!([{"id": 1, "name": "flour", "measurement_unit": "g", "amount": 100}])
    );
}

#[tokio::test]
async fn create_update_and_delete() {
    let state = test_util::state();
    let (alice, bob, flour, eggs, lunch) = {
        let mut conn = test_util::conn(&state);
        (
            fixtures::user(&mut conn, "alice"),
            fixtures::user(&mut conn, "bob"),
            fixtures::ingredient(&mut conn, "flour", "g"),
            fixtures::ingredient(&mut conn, "eggs", "unit"),
            fixtures::tag(&mut conn, "Lunch", "#00FF00"),
        )
    };
    let alice_token = test_util::token(&state, &alice);
    let bob_token = test_util::token(&state, &bob);

    let body = json!({
        "name": "Bread",
        "text": "Bake it",
        "image": "bread.png",
        "cooking_time": 45,
        "ingredients": [{"id": flour.id, "amount": 500}],
        "tags": [lunch.id],
    });
    let response = send(&state, "POST", "/api/recipes", None, Some(body.clone())).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = send(&state, "POST", "/api/recipes", Some(&alice_token), Some(body)).await;
    assert_eq!(response.status, StatusCode::CREATED);
    let created = response.json();
    assert_eq!(created["author"]["username"], "alice");
    assert_eq!(created["image"], "bread.png");
    assert_eq!(created["tags"][0]["slug"], "lunch");
    let uri = format!("/api/recipes/{}", created["id"]);

    let response = send(
        &state,
        "POST",
        "/api/recipes",
        Some(&alice_token),
        Some(json!({"name": "Air", "text": "Nothing", "cooking_time": 1, "ingredients": [], "tags": [lunch.id]})),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.json().get("ingredients").is_some());

    let update = json!({
        "name": "Egg bread",
        "text": "Bake it longer",
        "cooking_time": 60,
        "ingredients": [{"id": flour.id, "amount": 400}, {"id": eggs.id, "amount": 2}],
        "tags": [lunch.id],
    });
    let response = send(&state, "PATCH", &uri, Some(&bob_token), Some(update.clone())).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    let response = send(&state, "PATCH", &uri, Some(&bob_token), Some(json!({}))).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = send(&state, "PATCH", &uri, Some(&alice_token), Some(update)).await;
    assert_eq!(response.status, StatusCode::OK);
    let updated = response.json();
    assert_eq!(updated["name"], "Egg bread");
    assert_eq!(updated["image"], "bread.png");
    assert_eq!(updated["ingredients"].as_array().unwrap().len(), 2);

    let response = send(&state, "PATCH", &uri, Some(&alice_token), Some(json!({"name": "x"}))).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["tags"], json!(["This field is required."]));

    let response = send(&state, "DELETE", &uri, Some(&bob_token), None).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    let response = send(&state, "DELETE", &uri, Some(&alice_token), None).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    let response = send(&state, "GET", &uri, None, None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json(), json!({"errors": "recipe not found"}));
}

#[tokio::test]
async fn favorites_and_cart() {
    let state = test_util::state();
    let (alice, bread) = {
        let mut conn = test_util::conn(&state);
        let alice = fixtures::user(&mut conn, "alice");
        let flour = fixtures::ingredient(&mut conn, "flour", "g");
        let eggs = fixtures::ingredient(&mut conn, "eggs", "unit");
        let lunch = fixtures::tag(&mut conn, "Lunch", "#00FF00");
        let bread = fixtures::recipe(&mut conn, &alice, "Bread", &[(&flour, 200), (&eggs, 2)], &[&lunch]);
        fixtures::recipe(&mut conn, &alice, "Cake", &[(&flour, 300), (&eggs, 1)], &[&lunch]);
        (alice, bread)
    };
    let token = test_util::token(&state, &alice);
    let favorite = format!("/api/recipes/{}/favorite", bread.id);
    let cart = format!("/api/recipes/{}/shopping_cart", bread.id);

    let response = send(&state, "POST", &favorite, Some(&token), None).await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(
        response.json(),
        json!({"id": bread.id, "name": "Bread", "image": "", "cooking_time": 10})
    );
    let response = send(&state, "POST", &favorite, Some(&token), None).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = send(&state, "GET", "/api/recipes?is_favorited=1", Some(&token), None).await;
    let body = response.json();
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["is_favorited"], true);
    assert_eq!(body["results"][0]["is_in_shopping_cart"], false);

    let response = send(&state, "DELETE", &favorite, Some(&token), None).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    let response = send(&state, "DELETE", &favorite, Some(&token), None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = send(&state, "POST", "/api/recipes/999/shopping_cart", Some(&token), None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = send(&state, "POST", &cart, Some(&token), None).await;
    assert_eq!(response.status, StatusCode::CREATED);

    let response = send(
        &state,
        "GET",
        "/api/recipes/shopping_cart/download",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.headers[CONTENT_DISPOSITION],
        "attachment; filename=\"foodgram_shopping_cart.txt\""
    );
    let text = response.text();
    assert!(text.starts_with("Shopping list for alice"));
    assert!(text.contains("- flour (g) - 200\n- eggs (unit) - 2"));

    let response = send(
        &state,
        "GET",
        "/api/recipes/shopping_cart/download?format=rtf",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers[CONTENT_TYPE], "application/rtf");
    assert!(response.text().starts_with("{\\rtf1"));

    let response = send(
        &state,
        "GET",
        "/api/recipes/shopping_cart/download?format=pdf",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = send(&state, "GET", "/api/recipes/shopping_cart/download", None, None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn tag_filter_and_pages() {
    let state = test_util::state();
    {
        let mut conn = test_util::conn(&state);
        let alice = fixtures::user(&mut conn, "alice");
        let flour = fixtures::ingredient(&mut conn, "flour", "g");
        let lunch = fixtures::tag(&mut conn, "Lunch", "#00FF00");
        let dinner = fixtures::tag(&mut conn, "Dinner", "#0000FF");
        let breakfast = fixtures::tag(&mut conn, "Breakfast", "#FF0000");
        fixtures::recipe(&mut conn, &alice, "Soup", &[(&flour, 1)], &[&lunch]);
        fixtures::recipe(&mut conn, &alice, "Stew", &[(&flour, 1)], &[&dinner]);
        fixtures::recipe(&mut conn, &alice, "Eggs", &[(&flour, 1)], &[&breakfast]);
    }

    let response = send(&state, "GET", "/api/recipes?tags=lunch&tags=dinner", None, None).await;
    let body = response.json();
    assert_eq!(body["count"], 2);
    let names: Vec<_> = body["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(names, ["Stew", "Soup"]);

    let response = send(&state, "GET", "/api/recipes?limit=2", None, None).await;
    let body = response.json();
    assert_eq!(body["results"].as_array().unwrap().len(), 2);
    assert_eq!(body["next"], "/api/recipes?limit=2&page=2");
    assert_eq!(body["previous"], serde_json::Value::Null);

    let response = send(&state, "GET", "/api/recipes?limit=2&page=3", None, None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = send(&state, "GET", "/api/recipes?limit=1&page=%32", None, None).await;
    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["results"][0]["name"], "Stew");
    assert_eq!(body["next"], "/api/recipes?limit=1&page=3");
    assert_eq!(body["previous"], "/api/recipes?limit=1&page=1");

    let response = send(
        &state,
        "GET",
        "/api/recipes?page=9223372036854775807",
        None,
        None,
    )
    .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json(), json!({"errors": "page not found"}));

    let response = send(&state, "GET", "/api/recipes?author=abc", None, None).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = send(&state, "GET", "/api/recipes", Some("not-a-token"), None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}
