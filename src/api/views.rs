// Copyright 2023 Remi Bernotavicius

//! JSON shapes going in and out of the API.

use crate::database::models::{Ingredient, IngredientId, Recipe, RecipeId, Tag, TagId, User, UserId};
use crate::store::recipes::{IngredientAmount, RecipeDetails, RecipeDraft};
use crate::store::relations::AuthorWithRecipes;
use crate::store::ValidationErrors;
use serde::{Deserialize, Serialize};

const REQUIRED: &str = "This field is required.";

#[derive(Serialize, Debug, PartialEq)]
pub struct TagView {
    pub id: TagId,
    pub name: String,
    pub color: String,
    pub slug: String,
}

impl From<Tag> for TagView {
    fn from(tag: Tag) -> Self {
        Self {
            id: tag.id,
            name: tag.name,
            color: tag.color,
            slug: tag.slug,
        }
    }
}

#[derive(Serialize, Debug, PartialEq)]
pub struct IngredientView {
    pub id: IngredientId,
    pub name: String,
    pub measurement_unit: String,
}

impl From<Ingredient> for IngredientView {
    fn from(ingredient: Ingredient) -> Self {
        Self {
            id: ingredient.id,
            name: ingredient.name,
            measurement_unit: ingredient.measurement_unit,
        }
    }
}

#[derive(Serialize, Debug, PartialEq)]
pub struct IngredientAmountView {
    pub id: IngredientId,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct UserView {
    pub email: String,
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    /// Left out of the registration response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_subscribed: Option<bool>,
}

impl UserView {
    pub fn new(user: User, is_subscribed: bool) -> Self {
        Self {
            is_subscribed: Some(is_subscribed),
            ..Self::registered(user)
        }
    }

    pub fn registered(user: User) -> Self {
        Self {
            email: user.email,
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            is_subscribed: None,
        }
    }
}

#[derive(Serialize, Debug, PartialEq)]
pub struct RecipeView {
    pub id: RecipeId,
    pub tags: Vec<TagView>,
    pub author: UserView,
    pub ingredients: Vec<IngredientAmountView>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
}

pub fn render_recipe_view(details: RecipeDetails) -> RecipeView {
    let RecipeDetails {
        recipe,
        author,
        author_is_subscribed,
        tags,
        ingredients,
        is_favorited,
        is_in_shopping_cart,
    } = details;

    RecipeView {
        id: recipe.id,
        tags: tags.into_iter().map(TagView::from).collect(),
        author: UserView::new(author, author_is_subscribed),
        ingredients: ingredients
            .into_iter()
            .map(|(usage, ingredient)| IngredientAmountView {
                id: ingredient.id,
                name: ingredient.name,
                measurement_unit: ingredient.measurement_unit,
                amount: usage.amount,
            })
            .collect(),
        is_favorited,
        is_in_shopping_cart,
        name: recipe.name,
        image: recipe.image,
        text: recipe.text,
        cooking_time: recipe.cooking_time,
    }
}

#[derive(Serialize, Debug, PartialEq)]
pub struct RecipeShortView {
    pub id: RecipeId,
    pub name: String,
    pub image: String,
    pub cooking_time: i32,
}

impl From<Recipe> for RecipeShortView {
    fn from(recipe: Recipe) -> Self {
        Self {
            id: recipe.id,
            name: recipe.name,
            image: recipe.image,
            cooking_time: recipe.cooking_time,
        }
    }
}

#[derive(Serialize, Debug, PartialEq)]
pub struct UserWithRecipesView {
    #[serde(flatten)]
    pub user: UserView,
    pub recipes: Vec<RecipeShortView>,
    pub recipes_count: i64,
}

impl UserWithRecipesView {
    pub fn new(author: AuthorWithRecipes, is_subscribed: bool) -> Self {
        Self {
            user: UserView::new(author.author, is_subscribed),
            recipes: author.recipes.into_iter().map(Into::into).collect(),
            recipes_count: author.recipes_count,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct IngredientAmountRequest {
    pub id: IngredientId,
    pub amount: i64,
}

/// The body of a recipe create or update. Everything is optional here so
/// missing fields come back as field errors instead of a parse failure.
#[derive(Deserialize, Debug, Default)]
pub struct RecipeWriteRequest {
    pub name: Option<String>,
    pub text: Option<String>,
    pub image: Option<String>,
    pub cooking_time: Option<i64>,
    pub ingredients: Option<Vec<IngredientAmountRequest>>,
    pub tags: Option<Vec<TagId>>,
}

fn required<T>(errors: &mut ValidationErrors, field: &'static str, value: Option<T>) -> Option<T> {
    if value.is_none() {
        errors.add(field, REQUIRED);
    }
    value
}

/// Out-of-range numbers are clamped to 0 so the draft rejects them like any
/// other non-positive value.
fn positive_i32(value: i64) -> i32 {
    i32::try_from(value).unwrap_or(0).max(0)
}

pub fn parse_write_request(request: RecipeWriteRequest) -> Result<RecipeDraft, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let name = required(&mut errors, "name", request.name);
    let text = required(&mut errors, "text", request.text);
    let cooking_time = required(&mut errors, "cooking_time", request.cooking_time);
    let ingredients = required(&mut errors, "ingredients", request.ingredients);
    let tags = required(&mut errors, "tags", request.tags);

    let (Some(name), Some(text), Some(cooking_time), Some(ingredients), Some(tags)) =
        (name, text, cooking_time, ingredients, tags)
    else {
        return Err(errors);
    };

    let draft = RecipeDraft {
        name,
        text,
        image: request.image,
        cooking_time: positive_i32(cooking_time),
        ingredients: ingredients
            .into_iter()
            .map(|i| IngredientAmount {
                ingredient_id: i.id,
                amount: positive_i32(i.amount),
            })
            .collect(),
        tags,
    };
    draft.validate().into_result()?;
    Ok(draft)
}

#[derive(Deserialize, Debug, Default)]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
}

pub fn parse_register_request(
    request: RegisterRequest,
) -> Result<crate::store::users::NewUser, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let email = required(&mut errors, "email", request.email);
    let username = required(&mut errors, "username", request.username);
    let first_name = required(&mut errors, "first_name", request.first_name);
    let last_name = required(&mut errors, "last_name", request.last_name);
    let password = required(&mut errors, "password", request.password);

    let (Some(email), Some(username), Some(first_name), Some(last_name), Some(password)) =
        (email, username, first_name, last_name, password)
    else {
        return Err(errors);
    };
    Ok(crate::store::users::NewUser {
        email,
        username,
        first_name,
        last_name,
        password,
        is_admin: false,
    })
}

#[derive(Deserialize, Debug)]
pub struct SetPasswordRequest {
    pub new_password: String,
    pub current_password: String,
}

#[derive(Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Debug)]
pub struct TokenView {
    pub auth_token: String,
}

#[test]
fn write_request_reports_missing_fields() {
    let errors = parse_write_request(RecipeWriteRequest {
        name: Some("Bread".into()),
        ..Default::default()
    })
    .unwrap_err();

    assert!(!errors.has("name"));
    assert!(!errors.has("image"));
    for field in ["text", "cooking_time", "ingredients", "tags"] {
        assert!(errors.has(field), "{field}");
    }
}

#[test]
fn write_request_builds_draft() {
    let request: RecipeWriteRequest = serde_json::from_value(serde_json::json!({
        "name": "Bread",
        "text": "Bake it",
        "cooking_time": 45,
        "ingredients": [{"id": 1, "amount": 200}, {"id": 2, "amount": 3}],
        "tags": [7],
    }))
    .unwrap();
    let draft = parse_write_request(request).unwrap();

    assert_eq!(draft.cooking_time, 45);
    assert_eq!(draft.image, None);
    assert_eq!(
        draft.ingredients,
        vec![
            IngredientAmount {
                ingredient_id: IngredientId(1),
                amount: 200
            },
            IngredientAmount {
                ingredient_id: IngredientId(2),
                amount: 3
            },
        ]
    );
    assert_eq!(draft.tags, vec![TagId(7)]);
}

#[test]
fn write_request_rejects_bad_numbers() {
    let request: RecipeWriteRequest = serde_json::from_value(serde_json::json!({
        "name": "Bread",
        "text": "Bake it",
        "cooking_time": 0,
        "ingredients": [{"id": 1, "amount": 10_000_000_000i64}],
        "tags": [],
    }))
    .unwrap();
    let errors = parse_write_request(request).unwrap_err();

    assert!(errors.has("cooking_time"));
    assert!(errors.has("ingredients"));
    assert!(errors.has("tags"));
}

#[test]
fn registration_view_hides_subscription() {
    let user = User {
        id: UserId(3),
        email: "alice@example.com".into(),
        username: "alice".into(),
        first_name: "Alice".into(),
        last_name: "Liddell".into(),
        password: String::new(),
        is_admin: false,
    };
    let registered = serde_json::to_value(UserView::registered(user.clone())).unwrap();
    assert!(registered.get("is_subscribed").is_none());
    assert_eq!(registered["id"], 3);

    let viewed = serde_json::to_value(UserView::new(user, true)).unwrap();
    assert_eq!(viewed["is_subscribed"], true);
}
