// Copyright 2023 Remi Bernotavicius

use super::error::Result;
use super::views::{IngredientView, TagView};
use super::AppState;
use crate::database::models::{IngredientId, TagId};
use crate::store::catalog;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

pub async fn list_tags(State(state): State<Arc<AppState>>) -> Result<Json<Vec<TagView>>> {
    let tags = state.with_conn(catalog::list_tags).await?;
    Ok(Json(tags.into_iter().map(TagView::from).collect()))
}

pub async fn show_tag(
    State(state): State<Arc<AppState>>,
    Path(id): Path<TagId>,
) -> Result<Json<TagView>> {
    let tag = state
        .with_conn(move |conn| catalog::find_tag(conn, id))
        .await?;
    Ok(Json(tag.into()))
}

#[derive(Deserialize)]
pub struct IngredientSearch {
    name: Option<String>,
}

pub async fn list_ingredients(
    State(state): State<Arc<AppState>>,
    search: std::result::Result<Query<IngredientSearch>, QueryRejection>,
) -> Result<Json<Vec<IngredientView>>> {
    let Query(IngredientSearch { name }) = search?;
    let ingredients = state
        .with_conn(move |conn| catalog::search_ingredients(conn, name.as_deref()))
        .await?;
    Ok(Json(
        ingredients.into_iter().map(IngredientView::from).collect(),
    ))
}

pub async fn show_ingredient(
    State(state): State<Arc<AppState>>,
    Path(id): Path<IngredientId>,
) -> Result<Json<IngredientView>> {
    let ingredient = state
        .with_conn(move |conn| catalog::find_ingredient(conn, id))
        .await?;
    Ok(Json(ingredient.into()))
}

#[cfg(test)]
use super::test_util::{self, send};
#[cfg(test)]
use axum::http::StatusCode;
#[cfg(test)]
use serde_json::json;

#[tokio::test]
async fn catalog_endpoints() {
    let state = test_util::state();
    let (flour, lunch) = {
        let mut conn = test_util::conn(&state);
        let flour = catalog::create_ingredient(&mut conn, "flour", "g").unwrap();
        catalog::create_ingredient(&mut conn, "fennel", "g").unwrap();
        catalog::create_ingredient(&mut conn, "eggs", "unit").unwrap();
        let lunch = catalog::create_tag(&mut conn, "Lunch", "#00FF00", "lunch").unwrap();
        (flour, lunch)
    };

    let response = send(&state, "GET", "/api/tags", None, None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.json(),
        json!([{"id": lunch.id, "name": "Lunch", "color": "#00FF00", "slug": "lunch"}])
    );

    let response = send(&state, "GET", &format!("/api/tags/{}", lunch.id), None, None).await;
    assert_eq!(response.json()["slug"], "lunch");
    let response = send(&state, "GET", "/api/tags/77", None, None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = send(&state, "GET", "/api/ingredients?name=F", None, None).await;
    let names: Vec<_> = response
        .json()
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["name"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(names, ["fennel", "flour"]);

    let response = send(&state, "GET", "/api/ingredients", None, None).await;
    assert_eq!(response.json().as_array().unwrap().len(), 3);

    let response = send(
        &state,
        "GET",
        &format!("/api/ingredients/{}", flour.id),
        None,
        None,
    )
    .await;
    assert_eq!(
        response.json(),
        json!({"id": flour.id, "name": "flour", "measurement_unit": "g"})
    );
}
