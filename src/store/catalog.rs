// Copyright 2023 Remi Bernotavicius

use super::{Error, QueryResultExt as _, Result, ValidationErrors};
use crate::database;
use crate::database::models::{Ingredient, IngredientId, Tag, TagId};
use diesel::prelude::OptionalExtension as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;

const MAX_NAME_LENGTH: usize = 200;

pub fn list_tags(conn: &mut database::Connection) -> Result<Vec<Tag>> {
    use database::schema::tags::dsl::*;

    Ok(tags.select(Tag::as_select()).order(name.asc()).load(conn)?)
}

pub fn find_tag(conn: &mut database::Connection, tag_id: TagId) -> Result<Tag> {
    use database::schema::tags::dsl::*;

    tags.select(Tag::as_select())
        .filter(id.eq(tag_id))
        .get_result(conn)
        .optional()?
        .ok_or(Error::NotFound("tag"))
}

fn is_hex_color(s: &str) -> bool {
    s.len() == 7 && s.starts_with('#') && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}

fn is_slug(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub fn create_tag(
    conn: &mut database::Connection,
    new_name: &str,
    new_color: &str,
    new_slug: &str,
) -> Result<Tag> {
    use database::schema::tags::dsl::*;
    use diesel::insert_into;

    let mut errors = ValidationErrors::new();
    if new_name.trim().is_empty() {
        errors.add("name", "This field may not be blank.");
    } else if new_name.chars().count() > MAX_NAME_LENGTH {
        errors.add("name", "Ensure this field has no more than 200 characters.");
    }
    if !is_hex_color(new_color) {
        errors.add("color", "Enter a color in #RRGGBB format.");
    }
    if !is_slug(new_slug) {
        errors.add(
            "slug",
            "Enter a valid slug of letters, numbers, underscores or hyphens.",
        );
    }
    errors.into_result()?;

    let tag = insert_into(tags)
        .values((
            name.eq(new_name.trim()),
            color.eq(new_color.to_uppercase()),
            slug.eq(new_slug),
        ))
        .returning(Tag::as_returning())
        .get_result(conn)
        .or_conflict(|| {
            format!("a tag with name {new_name:?}, color {new_color} or slug {new_slug:?} exists")
        })?;
    log::info!("created tag {:?} ({})", tag.slug, tag.id);
    Ok(tag)
}

pub fn find_ingredient(
    conn: &mut database::Connection,
    ingredient_id: IngredientId,
) -> Result<Ingredient> {
    use database::schema::ingredients::dsl::*;

    ingredients
        .select(Ingredient::as_select())
        .filter(id.eq(ingredient_id))
        .get_result(conn)
        .optional()?
        .ok_or(Error::NotFound("ingredient"))
}

/// Escapes the LIKE wildcards so the user's text matches literally.
fn escape_like(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Lists ingredients, optionally only those whose name starts with `prefix`.
pub fn search_ingredients(
    conn: &mut database::Connection,
    prefix: Option<&str>,
) -> Result<Vec<Ingredient>> {
    use database::schema::ingredients::dsl::*;
    use diesel::expression_methods::EscapeExpressionMethods as _;
    use diesel::expression_methods::TextExpressionMethods as _;

    let mut query = ingredients.select(Ingredient::as_select()).into_boxed();
    if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
        query = query.filter(name.like(format!("{}%", escape_like(prefix))).escape('\\'));
    }
    Ok(query.order((name.asc(), measurement_unit.asc())).load(conn)?)
}

pub fn create_ingredient(
    conn: &mut database::Connection,
    new_name: &str,
    new_unit: &str,
) -> Result<Ingredient> {
    use database::schema::ingredients::dsl::*;
    use diesel::insert_into;

    let mut errors = ValidationErrors::new();
    if new_name.trim().is_empty() {
        errors.add("name", "This field may not be blank.");
    } else if new_name.chars().count() > MAX_NAME_LENGTH {
        errors.add("name", "Ensure this field has no more than 200 characters.");
    }
    if new_unit.trim().is_empty() {
        errors.add("measurement_unit", "This field may not be blank.");
    }
    errors.into_result()?;

    let ingredient = insert_into(ingredients)
        .values((name.eq(new_name.trim()), measurement_unit.eq(new_unit.trim())))
        .returning(Ingredient::as_returning())
        .get_result(conn)
        .or_conflict(|| format!("ingredient {new_name:?} measured in {new_unit:?} exists"))?;
    log::info!("created ingredient {:?} ({})", ingredient.name, ingredient.id);
    Ok(ingredient)
}

#[test]
fn tags_are_listed_by_name() {
    let mut conn = database::in_memory();
    let lunch = create_tag(&mut conn, "Lunch", "#00ff00", "lunch").unwrap();
    let breakfast = create_tag(&mut conn, "Breakfast", "#FF0000", "breakfast").unwrap();

    assert_eq!(lunch.color, "#00FF00");
    assert_eq!(list_tags(&mut conn).unwrap(), vec![breakfast.clone(), lunch]);
    assert_eq!(find_tag(&mut conn, breakfast.id).unwrap(), breakfast);
    assert!(matches!(
        find_tag(&mut conn, TagId(404)),
        Err(Error::NotFound("tag"))
    ));
}

#[test]
fn tag_validation_and_uniqueness() {
    let mut conn = database::in_memory();

    let Err(Error::Validation(errors)) = create_tag(&mut conn, "", "red", "not a slug") else {
        panic!("expected validation error");
    };
    assert!(errors.has("name"));
    assert!(errors.has("color"));
    assert!(errors.has("slug"));

    create_tag(&mut conn, "Lunch", "#00FF00", "lunch").unwrap();
    assert!(matches!(
        create_tag(&mut conn, "Dinner", "#00ff00", "dinner"),
        Err(Error::Conflict(_))
    ));
}

#[test]
fn ingredient_prefix_search() {
    let mut conn = database::in_memory();
    let flour = create_ingredient(&mut conn, "flour", "g").unwrap();
    let flax = create_ingredient(&mut conn, "flax seeds", "g").unwrap();
    let eggs = create_ingredient(&mut conn, "eggs", "unit").unwrap();
    create_ingredient(&mut conn, "100%_juice", "ml").unwrap();

    let names = |found: Vec<Ingredient>| found.into_iter().map(|i| i.name).collect::<Vec<_>>();

    assert_eq!(
        names(search_ingredients(&mut conn, Some("fl")).unwrap()),
        vec![flax.name.clone(), flour.name.clone()]
    );
    assert_eq!(
        names(search_ingredients(&mut conn, Some("FLO")).unwrap()),
        vec![flour.name.clone()]
    );
    assert_eq!(
        names(search_ingredients(&mut conn, Some("lour")).unwrap()),
        Vec::<String>::new()
    );
    // wildcards are literal
    assert_eq!(
        names(search_ingredients(&mut conn, Some("%")).unwrap()),
        Vec::<String>::new()
    );
    assert_eq!(
        names(search_ingredients(&mut conn, Some("100%_")).unwrap()),
        vec!["100%_juice".to_string()]
    );
    assert_eq!(search_ingredients(&mut conn, None).unwrap().len(), 4);
    assert_eq!(find_ingredient(&mut conn, eggs.id).unwrap(), eggs);
}

#[test]
fn ingredient_name_and_unit_are_unique_together() {
    let mut conn = database::in_memory();
    create_ingredient(&mut conn, "sugar", "g").unwrap();
    create_ingredient(&mut conn, "sugar", "tbsp").unwrap();
    assert!(matches!(
        create_ingredient(&mut conn, "sugar", "g"),
        Err(Error::Conflict(_))
    ));
}
