// Copyright 2023 Remi Bernotavicius

use super::relations;
use super::{Error, Page, Paginated, Result, ValidationErrors};
use crate::database;
use crate::database::models::{
    Ingredient, IngredientId, IngredientInRecipe, NewIngredientInRecipe, NewTagInRecipe, Recipe,
    RecipeId, RecipeRelation, Tag, TagId, TagInRecipe, User, UserId,
};
use crate::database::schema::{
    ingredients, recipe_ingredients, recipe_relations, recipe_tags, recipes, tags, users,
};
use diesel::associations::GroupedBy as _;
use diesel::prelude::Connection as _;
use diesel::prelude::OptionalExtension as _;
use diesel::sqlite::Sqlite;
use diesel::BelongingToDsl as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use std::collections::{HashMap, HashSet};

const MAX_NAME_LENGTH: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngredientAmount {
    pub ingredient_id: IngredientId,
    pub amount: i32,
}

/// Everything needed to write a recipe. Creation and update both take the
/// full ingredient and tag sets.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeDraft {
    pub name: String,
    pub text: String,
    /// `None` keeps the current image on update and stores no image on create.
    pub image: Option<String>,
    pub cooking_time: i32,
    pub ingredients: Vec<IngredientAmount>,
    pub tags: Vec<TagId>,
}

impl RecipeDraft {
    /// Checks that don't need the database.
    pub fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();

        if self.name.trim().is_empty() {
            errors.add("name", "This field may not be blank.");
        } else if self.name.chars().count() > MAX_NAME_LENGTH {
            errors.add("name", "Ensure this field has no more than 200 characters.");
        }
        if self.text.trim().is_empty() {
            errors.add("text", "This field may not be blank.");
        }
        if self.cooking_time < 1 {
            errors.add(
                "cooking_time",
                "Ensure this value is greater than or equal to 1.",
            );
        }

        if self.ingredients.is_empty() {
            errors.add("ingredients", "Must have at least one ingredient.");
        }
        let mut seen = HashSet::new();
        if !self.ingredients.iter().all(|i| seen.insert(i.ingredient_id)) {
            errors.add("ingredients", "Ingredients must be unique.");
        }
        if self.ingredients.iter().any(|i| i.amount < 1) {
            errors.add("ingredients", "Amount must be at least 1.");
        }

        if self.tags.is_empty() {
            errors.add("tags", "Must have at least one tag.");
        }
        let mut seen = HashSet::new();
        if !self.tags.iter().all(|t| seen.insert(*t)) {
            errors.add("tags", "Tags must be unique.");
        }

        errors
    }
}

/// Reports ingredient and tag ids in the draft that don't exist.
fn check_references(
    conn: &mut database::Connection,
    draft: &RecipeDraft,
) -> Result<ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let wanted: Vec<IngredientId> = draft.ingredients.iter().map(|i| i.ingredient_id).collect();
    let found: HashSet<IngredientId> = ingredients::table
        .filter(ingredients::id.eq_any(wanted.clone()))
        .select(ingredients::id)
        .load(conn)?
        .into_iter()
        .collect();
    for missing in wanted.iter().filter(|i| !found.contains(*i)) {
        errors.add(
            "ingredients",
            format!("Ingredient with id {missing} does not exist."),
        );
    }

    let found: HashSet<TagId> = tags::table
        .filter(tags::id.eq_any(draft.tags.clone()))
        .select(tags::id)
        .load(conn)?
        .into_iter()
        .collect();
    for missing in draft.tags.iter().filter(|t| !found.contains(*t)) {
        errors.add("tags", format!("Tag with id {missing} does not exist."));
    }

    Ok(errors)
}

fn validate_draft(conn: &mut database::Connection, draft: &RecipeDraft) -> Result<()> {
    let mut errors = draft.validate();
    errors.merge(check_references(conn, draft)?);
    Ok(errors.into_result()?)
}

fn insert_associations(
    conn: &mut database::Connection,
    recipe_id: RecipeId,
    draft: &RecipeDraft,
) -> Result<()> {
    use diesel::insert_into;

    let ingredient_rows: Vec<_> = draft
        .ingredients
        .iter()
        .map(|i| NewIngredientInRecipe {
            recipe_id,
            ingredient_id: i.ingredient_id,
            amount: i.amount,
        })
        .collect();
    insert_into(recipe_ingredients::table)
        .values(&ingredient_rows)
        .execute(conn)?;

    let tag_rows: Vec<_> = draft
        .tags
        .iter()
        .map(|&tag_id| NewTagInRecipe { recipe_id, tag_id })
        .collect();
    insert_into(recipe_tags::table)
        .values(&tag_rows)
        .execute(conn)?;
    Ok(())
}

pub fn create_recipe(
    conn: &mut database::Connection,
    author: UserId,
    draft: RecipeDraft,
) -> Result<Recipe> {
    use diesel::insert_into;

    let recipe = conn.transaction::<_, Error, _>(|conn| {
        validate_draft(conn, &draft)?;

        let recipe = insert_into(recipes::table)
            .values((
                recipes::author_id.eq(author),
                recipes::name.eq(draft.name.trim()),
                recipes::image.eq(draft.image.as_deref().unwrap_or_default()),
                recipes::text.eq(&draft.text),
                recipes::cooking_time.eq(draft.cooking_time),
                recipes::created_at.eq(chrono::Utc::now().naive_utc()),
            ))
            .returning(Recipe::as_returning())
            .get_result(conn)?;
        insert_associations(conn, recipe.id, &draft)?;
        Ok(recipe)
    })?;
    log::info!(
        "user {author} created recipe {:?} ({})",
        recipe.name,
        recipe.id
    );
    Ok(recipe)
}

pub fn find_recipe(conn: &mut database::Connection, recipe_id: RecipeId) -> Result<Recipe> {
    recipes::table
        .select(Recipe::as_select())
        .filter(recipes::id.eq(recipe_id))
        .get_result(conn)
        .optional()?
        .ok_or(Error::NotFound("recipe"))
}

/// The recipe, if `actor` is allowed to change it.
fn find_editable_recipe(
    conn: &mut database::Connection,
    actor: &User,
    recipe_id: RecipeId,
) -> Result<Recipe> {
    let recipe = find_recipe(conn, recipe_id)?;
    if !actor.can_modify(recipe.author_id) {
        return Err(Error::PermissionDenied);
    }
    Ok(recipe)
}

/// Replaces the recipe's fields and its whole ingredient and tag sets.
///
/// `draft` may be an already failed parse; its errors are only reported once
/// `actor` is known to be allowed to edit the recipe.
pub fn update_recipe(
    conn: &mut database::Connection,
    actor: &User,
    recipe_id: RecipeId,
    draft: std::result::Result<RecipeDraft, ValidationErrors>,
) -> Result<Recipe> {
    use diesel::{delete, update};

    let recipe = conn.transaction::<_, Error, _>(|conn| {
        let existing = find_editable_recipe(conn, actor, recipe_id)?;
        let draft = draft?;
        validate_draft(conn, &draft)?;

        let recipe = update(recipes::table.filter(recipes::id.eq(recipe_id)))
            .set((
                recipes::name.eq(draft.name.trim()),
                recipes::image.eq(draft.image.as_deref().unwrap_or(&existing.image)),
                recipes::text.eq(&draft.text),
                recipes::cooking_time.eq(draft.cooking_time),
            ))
            .returning(Recipe::as_returning())
            .get_result(conn)?;

        delete(recipe_ingredients::table.filter(recipe_ingredients::recipe_id.eq(recipe_id)))
            .execute(conn)?;
        delete(recipe_tags::table.filter(recipe_tags::recipe_id.eq(recipe_id))).execute(conn)?;
        insert_associations(conn, recipe_id, &draft)?;
        Ok(recipe)
    })?;
    log::info!("user {} updated recipe {}", actor.id, recipe.id);
    Ok(recipe)
}

pub fn delete_recipe(
    conn: &mut database::Connection,
    actor: &User,
    recipe_id: RecipeId,
) -> Result<()> {
    use diesel::delete;

    conn.transaction::<_, Error, _>(|conn| {
        find_editable_recipe(conn, actor, recipe_id)?;
        delete(recipes::table.filter(recipes::id.eq(recipe_id))).execute(conn)?;
        Ok(())
    })?;
    log::info!("user {} deleted recipe {recipe_id}", actor.id);
    Ok(())
}

/// A recipe with everything needed to show it to a particular viewer.
#[derive(Clone, Debug)]
pub struct RecipeDetails {
    pub recipe: Recipe,
    pub author: User,
    pub author_is_subscribed: bool,
    pub tags: Vec<Tag>,
    pub ingredients: Vec<(IngredientInRecipe, Ingredient)>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

fn load_details(
    conn: &mut database::Connection,
    found: Vec<Recipe>,
    viewer: Option<UserId>,
) -> Result<Vec<RecipeDetails>> {
    let ingredients_per_recipe = IngredientInRecipe::belonging_to(&found)
        .inner_join(ingredients::table)
        .select((IngredientInRecipe::as_select(), Ingredient::as_select()))
        .order(recipe_ingredients::id.asc())
        .load::<(IngredientInRecipe, Ingredient)>(conn)?
        .grouped_by(&found);
    let tags_per_recipe = TagInRecipe::belonging_to(&found)
        .inner_join(tags::table)
        .select((TagInRecipe::as_select(), Tag::as_select()))
        .order(tags::name.asc())
        .load::<(TagInRecipe, Tag)>(conn)?
        .grouped_by(&found);

    let author_ids: Vec<UserId> = found.iter().map(|r| r.author_id).collect();
    let authors: HashMap<UserId, User> = users::table
        .filter(users::id.eq_any(author_ids.clone()))
        .select(User::as_select())
        .load(conn)?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    let (marks, followed) = match viewer {
        Some(viewer) => {
            let recipe_ids: Vec<RecipeId> = found.iter().map(|r| r.id).collect();
            (
                relations::marks_among(conn, viewer, recipe_ids)?,
                relations::followed_among(conn, viewer, author_ids)?,
            )
        }
        None => (HashSet::new(), HashSet::new()),
    };

    found
        .into_iter()
        .zip(ingredients_per_recipe)
        .zip(tags_per_recipe)
        .map(|((recipe, ingredients), tags)| {
            let author = authors
                .get(&recipe.author_id)
                .cloned()
                .ok_or(Error::NotFound("author"))?;
            Ok(RecipeDetails {
                author_is_subscribed: followed.contains(&author.id),
                author,
                tags: tags.into_iter().map(|(_, tag)| tag).collect(),
                ingredients,
                is_favorited: marks.contains(&(recipe.id, RecipeRelation::Favorite)),
                is_in_shopping_cart: marks.contains(&(recipe.id, RecipeRelation::ShoppingCart)),
                recipe,
            })
        })
        .collect()
}

pub fn recipe_details(
    conn: &mut database::Connection,
    recipe_id: RecipeId,
    viewer: Option<UserId>,
) -> Result<RecipeDetails> {
    let recipe = find_recipe(conn, recipe_id)?;
    load_details(conn, vec![recipe], viewer)?
        .pop()
        .ok_or(Error::NotFound("recipe"))
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecipeFilter {
    /// Tag slugs; a recipe matches if it has any of them.
    pub tags: Vec<String>,
    pub author: Option<UserId>,
    /// Only applies to a signed-in viewer.
    pub is_favorited: bool,
    /// Only applies to a signed-in viewer.
    pub is_in_shopping_cart: bool,
}

fn filtered_recipes(
    filter: &RecipeFilter,
    viewer: Option<UserId>,
) -> recipes::BoxedQuery<'static, Sqlite> {
    let mut query = recipes::table.into_boxed();

    if !filter.tags.is_empty() {
        query = query.filter(
            recipes::id.eq_any(
                recipe_tags::table
                    .inner_join(tags::table)
                    .filter(tags::slug.eq_any(filter.tags.clone()))
                    .select(recipe_tags::recipe_id),
            ),
        );
    }
    if let Some(author) = filter.author {
        query = query.filter(recipes::author_id.eq(author));
    }
    if let Some(viewer) = viewer {
        for (wanted, relation) in [
            (filter.is_favorited, RecipeRelation::Favorite),
            (filter.is_in_shopping_cart, RecipeRelation::ShoppingCart),
        ] {
            if wanted {
                query = query.filter(
                    recipes::id.eq_any(
                        recipe_relations::table
                            .filter(recipe_relations::user_id.eq(viewer))
                            .filter(recipe_relations::kind.eq(relation))
                            .select(recipe_relations::recipe_id),
                    ),
                );
            }
        }
    }
    query
}

/// Lists recipes newest first.
pub fn list_recipes(
    conn: &mut database::Connection,
    filter: &RecipeFilter,
    viewer: Option<UserId>,
    page: Page,
) -> Result<Paginated<RecipeDetails>> {
    let count: i64 = filtered_recipes(filter, viewer).count().get_result(conn)?;
    page.check(count)?;

    let found = filtered_recipes(filter, viewer)
        .select(Recipe::as_select())
        .order((recipes::created_at.desc(), recipes::id.desc()))
        .limit(page.size)
        .offset(page.offset())
        .load(conn)?;
    Ok(Paginated {
        count,
        items: load_details(conn, found, viewer)?,
    })
}

/// The author's newest recipes, up to `limit`, along with how many they have in total.
pub fn recipes_by_author(
    conn: &mut database::Connection,
    author: UserId,
    limit: Option<i64>,
) -> Result<(i64, Vec<Recipe>)> {
    let count: i64 = recipes::table
        .filter(recipes::author_id.eq(author))
        .count()
        .get_result(conn)?;

    let mut query = recipes::table
        .select(Recipe::as_select())
        .filter(recipes::author_id.eq(author))
        .order((recipes::created_at.desc(), recipes::id.desc()))
        .into_boxed();
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    Ok((count, query.load(conn)?))
}

#[cfg(test)]
use super::test_util;

#[cfg(test)]
fn recipe_count(conn: &mut database::Connection) -> i64 {
    recipes::table.count().get_result(conn).unwrap()
}

#[test]
fn draft_validation() {
    let draft = RecipeDraft {
        name: " ".into(),
        text: "".into(),
        image: None,
        cooking_time: 0,
        ingredients: vec![
            IngredientAmount {
                ingredient_id: IngredientId(1),
                amount: 0,
            },
            IngredientAmount {
                ingredient_id: IngredientId(1),
                amount: 2,
            },
        ],
        tags: vec![TagId(1), TagId(1)],
    };
    let errors = draft.validate();
    for field in ["name", "text", "cooking_time", "ingredients", "tags"] {
        assert!(errors.has(field), "missing error for {field}");
    }

    let draft = RecipeDraft {
        ingredients: vec![],
        tags: vec![],
        ..draft
    };
    let errors = draft.validate();
    assert!(errors.has("ingredients"));
    assert!(errors.has("tags"));
}

#[test]
fn create_with_associations() {
    let mut conn = database::in_memory();
    let author = test_util::user(&mut conn, "chef");
    let flour = test_util::ingredient(&mut conn, "flour", "g");
    let eggs = test_util::ingredient(&mut conn, "eggs", "unit");
    let lunch = test_util::tag(&mut conn, "Lunch", "#00FF00");
    let breakfast = test_util::tag(&mut conn, "Breakfast", "#FF0000");

    let recipe = test_util::recipe(
        &mut conn,
        &author,
        "Pancakes",
        &[(&flour, 200), (&eggs, 2)],
        &[&lunch, &breakfast],
    );
    assert_eq!(recipe.author_id, author.id);
    assert_eq!(recipe.image, "");

    let details = recipe_details(&mut conn, recipe.id, None).unwrap();
    assert_eq!(details.author.id, author.id);
    assert_eq!(
        details.tags.iter().map(|t| t.slug.as_str()).collect::<Vec<_>>(),
        ["breakfast", "lunch"]
    );
    assert_eq!(
        details
            .ingredients
            .iter()
            .map(|(usage, i)| (i.name.as_str(), usage.amount))
            .collect::<Vec<_>>(),
        [("flour", 200), ("eggs", 2)]
    );
    assert!(!details.is_favorited);
    assert!(!details.is_in_shopping_cart);
    assert!(!details.author_is_subscribed);
}

#[test]
fn create_without_ingredients_writes_nothing() {
    let mut conn = database::in_memory();
    let author = test_util::user(&mut conn, "chef");
    let lunch = test_util::tag(&mut conn, "Lunch", "#00FF00");

    let before = recipe_count(&mut conn);
    let result = create_recipe(
        &mut conn,
        author.id,
        test_util::draft("Air", &[], &[&lunch]),
    );
    let Err(Error::Validation(errors)) = result else {
        panic!("expected validation error");
    };
    assert!(errors.has("ingredients"));
    assert_eq!(recipe_count(&mut conn), before);
}

#[test]
fn unknown_references_write_nothing() {
    let mut conn = database::in_memory();
    let author = test_util::user(&mut conn, "chef");
    let flour = test_util::ingredient(&mut conn, "flour", "g");
    let lunch = test_util::tag(&mut conn, "Lunch", "#00FF00");

    let mut draft = test_util::draft("Bread", &[(&flour, 500)], &[&lunch]);
    draft.ingredients.push(IngredientAmount {
        ingredient_id: IngredientId(999),
        amount: 1,
    });
    draft.tags.push(TagId(999));

    let Err(Error::Validation(errors)) = create_recipe(&mut conn, author.id, draft) else {
        panic!("expected validation error");
    };
    assert!(errors.has("ingredients"));
    assert!(errors.has("tags"));
    assert_eq!(recipe_count(&mut conn), 0);

    let rows: i64 = recipe_ingredients::table
        .count()
        .get_result(&mut conn)
        .unwrap();
    assert_eq!(rows, 0);
}

#[test]
fn update_replaces_associations() {
    let mut conn = database::in_memory();
    let author = test_util::user(&mut conn, "chef");
    let flour = test_util::ingredient(&mut conn, "flour", "g");
    let eggs = test_util::ingredient(&mut conn, "eggs", "unit");
    let milk = test_util::ingredient(&mut conn, "milk", "ml");
    let lunch = test_util::tag(&mut conn, "Lunch", "#00FF00");
    let dinner = test_util::tag(&mut conn, "Dinner", "#0000FF");

    let recipe = test_util::recipe(
        &mut conn,
        &author,
        "Pancakes",
        &[(&flour, 200), (&eggs, 2)],
        &[&lunch],
    );

    let mut draft = test_util::draft("Crepes", &[(&milk, 300), (&eggs, 3)], &[&dinner]);
    draft.image = Some("data:image/png;base64,AAAA".into());
    let updated = update_recipe(&mut conn, &author, recipe.id, Ok(draft)).unwrap();
    assert_eq!(updated.id, recipe.id);
    assert_eq!(updated.name, "Crepes");
    assert_eq!(updated.author_id, author.id);

    let details = recipe_details(&mut conn, recipe.id, None).unwrap();
    assert_eq!(details.recipe.image, "data:image/png;base64,AAAA");
    assert_eq!(
        details
            .ingredients
            .iter()
            .map(|(usage, i)| (i.name.as_str(), usage.amount))
            .collect::<Vec<_>>(),
        [("milk", 300), ("eggs", 3)]
    );
    assert_eq!(details.tags, vec![dinner.clone()]);

    // without an image the old one stays
    update_recipe(
        &mut conn,
        &author,
        recipe.id,
        Ok(test_util::draft("Crepes", &[(&milk, 300)], &[&dinner])),
    )
    .unwrap();
    let details = recipe_details(&mut conn, recipe.id, None).unwrap();
    assert_eq!(details.recipe.image, "data:image/png;base64,AAAA");
}

#[test]
fn failed_update_keeps_previous_sets() {
    let mut conn = database::in_memory();
    let author = test_util::user(&mut conn, "chef");
    let flour = test_util::ingredient(&mut conn, "flour", "g");
    let lunch = test_util::tag(&mut conn, "Lunch", "#00FF00");
    let recipe = test_util::recipe(&mut conn, &author, "Bread", &[(&flour, 500)], &[&lunch]);

    let mut draft = test_util::draft("Bread", &[(&flour, 500)], &[&lunch]);
    draft.ingredients[0].ingredient_id = IngredientId(999);
    assert!(matches!(
        update_recipe(&mut conn, &author, recipe.id, Ok(draft)),
        Err(Error::Validation(_))
    ));

    let details = recipe_details(&mut conn, recipe.id, None).unwrap();
    assert_eq!(details.ingredients.len(), 1);
    assert_eq!(details.ingredients[0].1, flour);
    assert_eq!(details.tags, vec![lunch]);
}

#[test]
fn only_author_or_admin_may_write() {
    let mut conn = database::in_memory();
    let author = test_util::user(&mut conn, "chef");
    let stranger = test_util::user(&mut conn, "stranger");
    let admin = test_util::admin(&mut conn, "boss");
    let flour = test_util::ingredient(&mut conn, "flour", "g");
    let lunch = test_util::tag(&mut conn, "Lunch", "#00FF00");
    let recipe = test_util::recipe(&mut conn, &author, "Bread", &[(&flour, 500)], &[&lunch]);

    let draft = test_util::draft("Stolen", &[(&flour, 1)], &[&lunch]);
    assert!(matches!(
        update_recipe(&mut conn, &stranger, recipe.id, Ok(draft.clone())),
        Err(Error::PermissionDenied)
    ));
    let unparsed = || Err(ValidationErrors::single("name", "This field is required."));
    assert!(matches!(
        update_recipe(&mut conn, &stranger, recipe.id, unparsed()),
        Err(Error::PermissionDenied)
    ));
    assert!(matches!(
        update_recipe(&mut conn, &author, recipe.id, unparsed()),
        Err(Error::Validation(errors)) if errors.has("name")
    ));
    assert!(matches!(
        delete_recipe(&mut conn, &stranger, recipe.id),
        Err(Error::PermissionDenied)
    ));

    let updated = update_recipe(&mut conn, &admin, recipe.id, Ok(draft)).unwrap();
    assert_eq!(updated.author_id, author.id);

    delete_recipe(&mut conn, &admin, recipe.id).unwrap();
    assert!(matches!(
        find_recipe(&mut conn, recipe.id),
        Err(Error::NotFound("recipe"))
    ));
    assert!(matches!(
        delete_recipe(&mut conn, &admin, recipe.id),
        Err(Error::NotFound("recipe"))
    ));
}

#[test]
fn delete_cascades_to_join_rows() {
    let mut conn = database::in_memory();
    let author = test_util::user(&mut conn, "chef");
    let flour = test_util::ingredient(&mut conn, "flour", "g");
    let lunch = test_util::tag(&mut conn, "Lunch", "#00FF00");
    let recipe = test_util::recipe(&mut conn, &author, "Bread", &[(&flour, 500)], &[&lunch]);
    relations::toggle_add(&mut conn, &RecipeRelation::Favorite, author.id, recipe.id).unwrap();

    delete_recipe(&mut conn, &author, recipe.id).unwrap();

    let ingredient_rows: i64 = recipe_ingredients::table
        .count()
        .get_result(&mut conn)
        .unwrap();
    let tag_rows: i64 = recipe_tags::table.count().get_result(&mut conn).unwrap();
    let relation_rows: i64 = recipe_relations::table
        .count()
        .get_result(&mut conn)
        .unwrap();
    assert_eq!((ingredient_rows, tag_rows, relation_rows), (0, 0, 0));
}

#[test]
fn deleting_author_deletes_recipes() {
    let mut conn = database::in_memory();
    let author = test_util::user(&mut conn, "chef");
    let flour = test_util::ingredient(&mut conn, "flour", "g");
    let lunch = test_util::tag(&mut conn, "Lunch", "#00FF00");
    test_util::recipe(&mut conn, &author, "Bread", &[(&flour, 500)], &[&lunch]);

    diesel::delete(users::table.filter(users::id.eq(author.id)))
        .execute(&mut conn)
        .unwrap();
    assert_eq!(recipe_count(&mut conn), 0);
}

#[test]
fn filters_compose() {
    let mut conn = database::in_memory();
    let alice = test_util::user(&mut conn, "alice");
    let bob = test_util::user(&mut conn, "bob");
    let flour = test_util::ingredient(&mut conn, "flour", "g");
    let lunch = test_util::tag(&mut conn, "Lunch", "#00FF00");
    let dinner = test_util::tag(&mut conn, "Dinner", "#0000FF");
    let snack = test_util::tag(&mut conn, "Snack", "#FFFF00");

    test_util::recipe(&mut conn, &alice, "Soup", &[(&flour, 1)], &[&lunch, &dinner]);
    let stew = test_util::recipe(&mut conn, &bob, "Stew", &[(&flour, 1)], &[&dinner]);
    let chips = test_util::recipe(&mut conn, &bob, "Chips", &[(&flour, 1)], &[&snack]);
    relations::toggle_add(&mut conn, &RecipeRelation::Favorite, alice.id, stew.id).unwrap();
    relations::toggle_add(&mut conn, &RecipeRelation::ShoppingCart, alice.id, chips.id).unwrap();

    let mut names = |filter: RecipeFilter, viewer: Option<UserId>| {
        list_recipes(&mut conn, &filter, viewer, Page::new(1, 10))
            .unwrap()
            .items
            .into_iter()
            .map(|d| d.recipe.name)
            .collect::<Vec<_>>()
    };

    assert_eq!(
        names(RecipeFilter::default(), None),
        ["Chips", "Stew", "Soup"]
    );
    assert_eq!(
        names(
            RecipeFilter {
                tags: vec!["lunch".into(), "snack".into()],
                ..Default::default()
            },
            None
        ),
        ["Chips", "Soup"]
    );
    assert_eq!(
        names(
            RecipeFilter {
                tags: vec!["dinner".into()],
                author: Some(bob.id),
                ..Default::default()
            },
            None
        ),
        ["Stew"]
    );
    assert_eq!(
        names(
            RecipeFilter {
                is_favorited: true,
                ..Default::default()
            },
            Some(alice.id)
        ),
        ["Stew"]
    );
    assert_eq!(
        names(
            RecipeFilter {
                is_in_shopping_cart: true,
                ..Default::default()
            },
            Some(alice.id)
        ),
        ["Chips"]
    );
    // anonymous viewers can't filter on their own marks
    assert_eq!(
        names(
            RecipeFilter {
                is_favorited: true,
                is_in_shopping_cart: true,
                ..Default::default()
            },
            None
        ),
        ["Chips", "Stew", "Soup"]
    );
}

#[test]
fn details_reflect_viewer() {
    let mut conn = database::in_memory();
    let alice = test_util::user(&mut conn, "alice");
    let bob = test_util::user(&mut conn, "bob");
    let flour = test_util::ingredient(&mut conn, "flour", "g");
    let lunch = test_util::tag(&mut conn, "Lunch", "#00FF00");
    let stew = test_util::recipe(&mut conn, &bob, "Stew", &[(&flour, 1)], &[&lunch]);

    relations::toggle_add(&mut conn, &RecipeRelation::Favorite, alice.id, stew.id).unwrap();
    relations::toggle_add(&mut conn, &relations::Follow, alice.id, bob.id).unwrap();

    let seen_by_alice = recipe_details(&mut conn, stew.id, Some(alice.id)).unwrap();
    assert!(seen_by_alice.is_favorited);
    assert!(!seen_by_alice.is_in_shopping_cart);
    assert!(seen_by_alice.author_is_subscribed);

    let seen_by_bob = recipe_details(&mut conn, stew.id, Some(bob.id)).unwrap();
    assert!(!seen_by_bob.is_favorited);
    assert!(!seen_by_bob.author_is_subscribed);
}

#[test]
fn recipe_pages() {
    let mut conn = database::in_memory();
    let alice = test_util::user(&mut conn, "alice");
    let flour = test_util::ingredient(&mut conn, "flour", "g");
    let lunch = test_util::tag(&mut conn, "Lunch", "#00FF00");
    for n in 0..5 {
        test_util::recipe(&mut conn, &alice, &format!("Bread {n}"), &[(&flour, 1)], &[&lunch]);
    }

    let page = list_recipes(&mut conn, &RecipeFilter::default(), None, Page::new(2, 2)).unwrap();
    assert_eq!(page.count, 5);
    assert_eq!(
        page.items
            .iter()
            .map(|d| d.recipe.name.as_str())
            .collect::<Vec<_>>(),
        ["Bread 2", "Bread 1"]
    );
    assert!(matches!(
        list_recipes(&mut conn, &RecipeFilter::default(), None, Page::new(4, 2)),
        Err(Error::NotFound("page"))
    ));

    let (count, newest) = recipes_by_author(&mut conn, alice.id, Some(2)).unwrap();
    assert_eq!(count, 5);
    assert_eq!(
        newest.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
        ["Bread 4", "Bread 3"]
    );
    let (_, all) = recipes_by_author(&mut conn, alice.id, None).unwrap();
    assert_eq!(all.len(), 5);
}
