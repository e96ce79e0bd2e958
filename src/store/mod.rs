// Copyright 2023 Remi Bernotavicius

//! Repository functions over the diesel schema.
//!
//! Every function takes the connection explicitly and returns plain records
//! from [`crate::database::models`]. Multi-step writes run inside a single
//! transaction so a failure partway leaves nothing behind.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub mod catalog;
pub mod recipes;
pub mod relations;
pub mod users;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    Validation(ValidationErrors),
    #[error("{0}")]
    Conflict(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    InvalidOperation(String),
    #[error("you do not have permission to perform this action")]
    PermissionDenied,
    #[error("database error: {0}")]
    Database(#[from] DieselError),
    #[error("password hashing failed: {0}")]
    PasswordHash(#[from] argon2::password_hash::Error),
}

impl From<ValidationErrors> for Error {
    fn from(e: ValidationErrors) -> Self {
        Self::Validation(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Field name to messages, the shape clients get back on a 400.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<&'static str, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn into_result(self) -> std::result::Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

pub(crate) trait QueryResultExt<T> {
    /// Turns a uniqueness violation into [`Error::Conflict`].
    fn or_conflict(self, message: impl FnOnce() -> String) -> Result<T>;
}

impl<T> QueryResultExt<T> for diesel::QueryResult<T> {
    fn or_conflict(self, message: impl FnOnce() -> String) -> Result<T> {
        match self {
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                Err(Error::Conflict(message()))
            }
            other => other.map_err(Error::from),
        }
    }
}

/// A 1-based page request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Page {
    pub number: i64,
    pub size: i64,
}

impl Page {
    pub const MAX_SIZE: i64 = 100;

    pub fn new(number: i64, size: i64) -> Self {
        Self {
            number: number.max(1),
            size: size.clamp(1, Self::MAX_SIZE),
        }
    }

    /// Saturates, so absurd page numbers land past the end.
    pub fn offset(&self) -> i64 {
        self.number.saturating_sub(1).saturating_mul(self.size)
    }

    /// Pages past the end are missing, except the first page of an empty set.
    fn check(&self, count: i64) -> Result<()> {
        if self.number > 1 && self.offset() >= count {
            return Err(Error::NotFound("page"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Paginated<T> {
    pub count: i64,
    pub items: Vec<T>,
}

impl<T> Paginated<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            count: self.count,
            items: self.items.into_iter().map(f).collect(),
        }
    }
}

/// Fixtures shared by the store and API tests.
#[cfg(test)]
pub mod test_util {
    use super::catalog;
    use super::recipes::{self, IngredientAmount, RecipeDraft};
    use super::users::{self, NewUser};
    use crate::database::{
        self,
        models::{Ingredient, Recipe, Tag, User},
    };

    pub fn user(conn: &mut database::Connection, username: &str) -> User {
        users::create_user(
            conn,
            NewUser {
                email: format!("{username}@example.com"),
                username: username.into(),
                first_name: "Test".into(),
                last_name: "User".into(),
                password: "hunter2-hunter2".into(),
                is_admin: false,
            },
        )
        .unwrap()
    }

    pub fn admin(conn: &mut database::Connection, username: &str) -> User {
        users::create_user(
            conn,
            NewUser {
                email: format!("{username}@example.com"),
                username: username.into(),
                first_name: "Admin".into(),
                last_name: "User".into(),
                password: "hunter2-hunter2".into(),
                is_admin: true,
            },
        )
        .unwrap()
    }

    pub fn tag(conn: &mut database::Connection, name: &str, color: &str) -> Tag {
        catalog::create_tag(conn, name, color, &name.to_lowercase()).unwrap()
    }

    pub fn ingredient(conn: &mut database::Connection, name: &str, unit: &str) -> Ingredient {
        catalog::create_ingredient(conn, name, unit).unwrap()
    }

    pub fn draft(name: &str, ingredients: &[(&Ingredient, i32)], tags: &[&Tag]) -> RecipeDraft {
        RecipeDraft {
            name: name.into(),
            text: format!("How to make {name}"),
            image: None,
            cooking_time: 10,
            ingredients: ingredients
                .iter()
                .map(|(i, amount)| IngredientAmount {
                    ingredient_id: i.id,
                    amount: *amount,
                })
                .collect(),
            tags: tags.iter().map(|t| t.id).collect(),
        }
    }

    pub fn recipe(
        conn: &mut database::Connection,
        author: &User,
        name: &str,
        ingredients: &[(&Ingredient, i32)],
        tags: &[&Tag],
    ) -> Recipe {
        recipes::create_recipe(conn, author.id, draft(name, ingredients, tags)).unwrap()
    }
}

#[test]
fn validation_errors_collect_per_field() {
    let mut errors = ValidationErrors::new();
    assert!(errors.clone().into_result().is_ok());

    errors.add("ingredients", "This list may not be empty.");
    errors.add("ingredients", "Ingredients must be unique.");
    errors.merge(ValidationErrors::single("tags", "This list may not be empty."));

    assert!(errors.has("ingredients"));
    assert!(errors.has("tags"));
    assert!(!errors.has("name"));
    assert_eq!(
        serde_json::to_value(&errors).unwrap(),
        serde_json::json!({
            "ingredients": ["This list may not be empty.", "Ingredients must be unique."],
            "tags": ["This list may not be empty."],
        })
    );
    assert_eq!(
        errors.to_string(),
        "ingredients: This list may not be empty.; \
         ingredients: Ingredients must be unique.; \
         tags: This list may not be empty."
    );
}

#[test]
fn page_bounds() {
    assert_eq!(Page::new(0, 6), Page { number: 1, size: 6 });
    assert_eq!(Page::new(3, 1_000).size, Page::MAX_SIZE);
    assert_eq!(Page::new(3, 6).offset(), 12);

    assert!(Page::new(1, 6).check(0).is_ok());
    assert!(Page::new(2, 6).check(7).is_ok());
    assert!(matches!(
        Page::new(3, 6).check(12),
        Err(Error::NotFound("page"))
    ));

    let huge = Page::new(i64::MAX, 6);
    assert_eq!(huge.offset(), i64::MAX);
    assert!(matches!(huge.check(12), Err(Error::NotFound("page"))));
}
