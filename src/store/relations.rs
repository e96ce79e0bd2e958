// Copyright 2023 Remi Bernotavicius

//! Favorites, shopping carts and follows.
//!
//! All three are uniqueness-constrained (user, target) pairings with the same
//! add/remove rules, so the rules live in [`toggle_add`] and [`toggle_remove`]
//! and each pairing only says how to reach its table through [`Toggle`].
//! Adding twice is a [`Error::Conflict`] and removing a missing pairing is
//! [`Error::NotFound`]; neither is silently ignored.

use super::recipes::recipes_by_author;
use super::{Error, Page, Paginated, QueryResultExt as _, Result};
use crate::database;
use crate::database::models::{Recipe, RecipeId, RecipeRelation, User, UserId};
use crate::database::schema::{follows, recipes, users};
use diesel::dsl::exists;
use diesel::prelude::Connection as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::QueryResult;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use std::collections::HashSet;
use std::fmt;

pub trait Toggle {
    type Target: Copy + fmt::Display;

    /// What the target is called when it is missing.
    const TARGET: &'static str;

    /// What a single pairing is called when it is missing.
    fn pairing(&self) -> &'static str;

    fn conflict_message(&self, target: Self::Target) -> String;

    /// Rules beyond uniqueness.
    fn check(&self, _user: UserId, _target: Self::Target) -> Result<()> {
        Ok(())
    }

    fn target_exists(&self, conn: &mut database::Connection, target: Self::Target)
        -> QueryResult<bool>;

    fn is_paired(
        &self,
        conn: &mut database::Connection,
        user: UserId,
        target: Self::Target,
    ) -> QueryResult<bool>;

    fn insert(
        &self,
        conn: &mut database::Connection,
        user: UserId,
        target: Self::Target,
    ) -> QueryResult<usize>;

    fn remove(
        &self,
        conn: &mut database::Connection,
        user: UserId,
        target: Self::Target,
    ) -> QueryResult<usize>;
}

impl Toggle for RecipeRelation {
    type Target = RecipeId;

    const TARGET: &'static str = "recipe";

    fn pairing(&self) -> &'static str {
        match self {
            Self::Favorite => "favorite",
            Self::ShoppingCart => "shopping cart entry",
        }
    }

    fn conflict_message(&self, target: RecipeId) -> String {
        format!("recipe {target} is already in {self}")
    }

    fn target_exists(&self, conn: &mut database::Connection, target: RecipeId) -> QueryResult<bool> {
        diesel::select(exists(recipes::table.filter(recipes::id.eq(target)))).get_result(conn)
    }

    fn is_paired(
        &self,
        conn: &mut database::Connection,
        user: UserId,
        target: RecipeId,
    ) -> QueryResult<bool> {
        use database::schema::recipe_relations::dsl::*;

        diesel::select(exists(
            recipe_relations
                .filter(user_id.eq(user))
                .filter(recipe_id.eq(target))
                .filter(kind.eq(*self)),
        ))
        .get_result(conn)
    }

    fn insert(
        &self,
        conn: &mut database::Connection,
        user: UserId,
        target: RecipeId,
    ) -> QueryResult<usize> {
        use database::schema::recipe_relations::dsl::*;
        use diesel::insert_into;

        insert_into(recipe_relations)
            .values((user_id.eq(user), recipe_id.eq(target), kind.eq(*self)))
            .execute(conn)
    }

    fn remove(
        &self,
        conn: &mut database::Connection,
        user: UserId,
        target: RecipeId,
    ) -> QueryResult<usize> {
        use database::schema::recipe_relations::dsl::*;
        use diesel::delete;

        delete(
            recipe_relations
                .filter(user_id.eq(user))
                .filter(recipe_id.eq(target))
                .filter(kind.eq(*self)),
        )
        .execute(conn)
    }
}

/// A user subscribing to an author's recipes.
#[derive(Debug, Copy, Clone)]
pub struct Follow;

impl Toggle for Follow {
    type Target = UserId;

    const TARGET: &'static str = "user";

    fn pairing(&self) -> &'static str {
        "subscription"
    }

    fn conflict_message(&self, target: UserId) -> String {
        format!("already subscribed to user {target}")
    }

    fn check(&self, user: UserId, target: UserId) -> Result<()> {
        if user == target {
            return Err(Error::InvalidOperation(
                "you cannot subscribe to yourself".into(),
            ));
        }
        Ok(())
    }

    fn target_exists(&self, conn: &mut database::Connection, target: UserId) -> QueryResult<bool> {
        diesel::select(exists(users::table.filter(users::id.eq(target)))).get_result(conn)
    }

    fn is_paired(
        &self,
        conn: &mut database::Connection,
        user: UserId,
        target: UserId,
    ) -> QueryResult<bool> {
        use database::schema::follows::dsl::*;

        diesel::select(exists(
            follows
                .filter(follower_id.eq(user))
                .filter(author_id.eq(target)),
        ))
        .get_result(conn)
    }

    fn insert(
        &self,
        conn: &mut database::Connection,
        user: UserId,
        target: UserId,
    ) -> QueryResult<usize> {
        use database::schema::follows::dsl::*;
        use diesel::insert_into;

        insert_into(follows)
            .values((follower_id.eq(user), author_id.eq(target)))
            .execute(conn)
    }

    fn remove(
        &self,
        conn: &mut database::Connection,
        user: UserId,
        target: UserId,
    ) -> QueryResult<usize> {
        use database::schema::follows::dsl::*;
        use diesel::delete;

        delete(
            follows
                .filter(follower_id.eq(user))
                .filter(author_id.eq(target)),
        )
        .execute(conn)
    }
}

/// Creates the pairing. The insert itself detects duplicates, so two racing
/// adds end in one success and one conflict.
pub fn toggle_add<T: Toggle>(
    conn: &mut database::Connection,
    toggle: &T,
    user: UserId,
    target: T::Target,
) -> Result<()> {
    conn.transaction::<_, Error, _>(|conn| {
        if !toggle.target_exists(conn, target)? {
            return Err(Error::NotFound(T::TARGET));
        }
        toggle.check(user, target)?;
        toggle
            .insert(conn, user, target)
            .or_conflict(|| toggle.conflict_message(target))?;
        Ok(())
    })?;
    log::debug!("user {user} added {} {target}", toggle.pairing());
    Ok(())
}

pub fn toggle_remove<T: Toggle>(
    conn: &mut database::Connection,
    toggle: &T,
    user: UserId,
    target: T::Target,
) -> Result<()> {
    conn.transaction::<_, Error, _>(|conn| {
        if !toggle.target_exists(conn, target)? {
            return Err(Error::NotFound(T::TARGET));
        }
        if toggle.remove(conn, user, target)? == 0 {
            return Err(Error::NotFound(toggle.pairing()));
        }
        Ok(())
    })?;
    log::debug!("user {user} removed {} {target}", toggle.pairing());
    Ok(())
}

pub fn is_paired<T: Toggle>(
    conn: &mut database::Connection,
    toggle: &T,
    user: UserId,
    target: T::Target,
) -> Result<bool> {
    Ok(toggle.is_paired(conn, user, target)?)
}

/// Which of `recipe_ids` the user has marked, and how.
pub fn marks_among(
    conn: &mut database::Connection,
    user: UserId,
    recipe_ids: Vec<RecipeId>,
) -> Result<HashSet<(RecipeId, RecipeRelation)>> {
    use database::schema::recipe_relations::dsl::*;

    Ok(recipe_relations
        .filter(user_id.eq(user))
        .filter(recipe_id.eq_any(recipe_ids))
        .select((recipe_id, kind))
        .load::<(RecipeId, RecipeRelation)>(conn)?
        .into_iter()
        .collect())
}

/// Which of `authors` the follower is subscribed to.
pub fn followed_among(
    conn: &mut database::Connection,
    follower: UserId,
    authors: Vec<UserId>,
) -> Result<HashSet<UserId>> {
    use database::schema::follows::dsl::*;

    Ok(follows
        .filter(follower_id.eq(follower))
        .filter(author_id.eq_any(authors))
        .select(author_id)
        .load::<UserId>(conn)?
        .into_iter()
        .collect())
}

#[derive(Clone, Debug)]
pub struct AuthorWithRecipes {
    pub author: User,
    pub recipes: Vec<Recipe>,
    pub recipes_count: i64,
}

pub fn author_with_recipes(
    conn: &mut database::Connection,
    author: User,
    recipes_limit: Option<i64>,
) -> Result<AuthorWithRecipes> {
    let (recipes_count, recipes) = recipes_by_author(conn, author.id, recipes_limit)?;
    Ok(AuthorWithRecipes {
        author,
        recipes,
        recipes_count,
    })
}

/// The authors `follower` is subscribed to, ordered by id.
pub fn list_subscriptions(
    conn: &mut database::Connection,
    follower: UserId,
    page: Page,
    recipes_limit: Option<i64>,
) -> Result<Paginated<AuthorWithRecipes>> {
    let count: i64 = follows::table
        .filter(follows::follower_id.eq(follower))
        .count()
        .get_result(conn)?;
    page.check(count)?;

    let authors: Vec<User> = users::table
        .filter(
            users::id.eq_any(
                follows::table
                    .filter(follows::follower_id.eq(follower))
                    .select(follows::author_id),
            ),
        )
        .select(User::as_select())
        .order(users::id.asc())
        .limit(page.size)
        .offset(page.offset())
        .load(conn)?;

    let items = authors
        .into_iter()
        .map(|author| author_with_recipes(conn, author, recipes_limit))
        .collect::<Result<_>>()?;
    Ok(Paginated { count, items })
}

#[cfg(test)]
use super::test_util;

#[cfg(test)]
fn relation_count(conn: &mut database::Connection) -> i64 {
    database::schema::recipe_relations::table
        .count()
        .get_result(conn)
        .unwrap()
}

#[test]
fn add_twice_conflicts() {
    use strum::IntoEnumIterator as _;

    let mut conn = database::in_memory();
    let alice = test_util::user(&mut conn, "alice");
    let flour = test_util::ingredient(&mut conn, "flour", "g");
    let lunch = test_util::tag(&mut conn, "Lunch", "#00FF00");
    let bread = test_util::recipe(&mut conn, &alice, "Bread", &[(&flour, 1)], &[&lunch]);

    for relation in RecipeRelation::iter() {
        toggle_add(&mut conn, &relation, alice.id, bread.id).unwrap();
        assert!(matches!(
            toggle_add(&mut conn, &relation, alice.id, bread.id),
            Err(Error::Conflict(_))
        ));
        assert!(is_paired(&mut conn, &relation, alice.id, bread.id).unwrap());
    }
    // one per kind
    assert_eq!(relation_count(&mut conn), 2);
}

#[test]
fn remove_missing_is_not_found() {
    let mut conn = database::in_memory();
    let alice = test_util::user(&mut conn, "alice");
    let bob = test_util::user(&mut conn, "bob");
    let flour = test_util::ingredient(&mut conn, "flour", "g");
    let lunch = test_util::tag(&mut conn, "Lunch", "#00FF00");
    let bread = test_util::recipe(&mut conn, &alice, "Bread", &[(&flour, 1)], &[&lunch]);

    assert!(matches!(
        toggle_remove(&mut conn, &RecipeRelation::Favorite, alice.id, bread.id),
        Err(Error::NotFound("favorite"))
    ));
    assert!(matches!(
        toggle_remove(&mut conn, &RecipeRelation::ShoppingCart, alice.id, bread.id),
        Err(Error::NotFound("shopping cart entry"))
    ));
    assert!(matches!(
        toggle_remove(&mut conn, &Follow, alice.id, bob.id),
        Err(Error::NotFound("subscription"))
    ));

    // a favorite doesn't count as a cart entry
    toggle_add(&mut conn, &RecipeRelation::Favorite, alice.id, bread.id).unwrap();
    assert!(matches!(
        toggle_remove(&mut conn, &RecipeRelation::ShoppingCart, alice.id, bread.id),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn missing_target_is_not_found() {
    let mut conn = database::in_memory();
    let alice = test_util::user(&mut conn, "alice");

    assert!(matches!(
        toggle_add(&mut conn, &RecipeRelation::Favorite, alice.id, RecipeId(42)),
        Err(Error::NotFound("recipe"))
    ));
    assert!(matches!(
        toggle_add(&mut conn, &Follow, alice.id, UserId(42)),
        Err(Error::NotFound("user"))
    ));
    assert!(matches!(
        toggle_remove(&mut conn, &Follow, alice.id, UserId(42)),
        Err(Error::NotFound("user"))
    ));
}

#[test]
fn add_remove_add() {
    let mut conn = database::in_memory();
    let alice = test_util::user(&mut conn, "alice");
    let flour = test_util::ingredient(&mut conn, "flour", "g");
    let lunch = test_util::tag(&mut conn, "Lunch", "#00FF00");
    let bread = test_util::recipe(&mut conn, &alice, "Bread", &[(&flour, 1)], &[&lunch]);

    let cart = RecipeRelation::ShoppingCart;
    toggle_add(&mut conn, &cart, alice.id, bread.id).unwrap();
    toggle_remove(&mut conn, &cart, alice.id, bread.id).unwrap();
    assert!(!is_paired(&mut conn, &cart, alice.id, bread.id).unwrap());
    toggle_add(&mut conn, &cart, alice.id, bread.id).unwrap();

    assert_eq!(relation_count(&mut conn), 1);
    assert!(is_paired(&mut conn, &cart, alice.id, bread.id).unwrap());
    assert!(!is_paired(&mut conn, &RecipeRelation::Favorite, alice.id, bread.id).unwrap());
}

#[test]
fn cannot_follow_self() {
    let mut conn = database::in_memory();
    let alice = test_util::user(&mut conn, "alice");

    assert!(matches!(
        toggle_add(&mut conn, &Follow, alice.id, alice.id),
        Err(Error::InvalidOperation(_))
    ));
    let rows: i64 = follows::table.count().get_result(&mut conn).unwrap();
    assert_eq!(rows, 0);
}

#[test]
fn follow_and_list_subscriptions() {
    let mut conn = database::in_memory();
    let alice = test_util::user(&mut conn, "alice");
    let bob = test_util::user(&mut conn, "bob");
    let carol = test_util::user(&mut conn, "carol");
    let flour = test_util::ingredient(&mut conn, "flour", "g");
    let lunch = test_util::tag(&mut conn, "Lunch", "#00FF00");
    for name in ["Bread", "Rolls", "Buns"] {
        test_util::recipe(&mut conn, &bob, name, &[(&flour, 1)], &[&lunch]);
    }

    toggle_add(&mut conn, &Follow, alice.id, carol.id).unwrap();
    toggle_add(&mut conn, &Follow, alice.id, bob.id).unwrap();
    assert!(matches!(
        toggle_add(&mut conn, &Follow, alice.id, bob.id),
        Err(Error::Conflict(_))
    ));

    let subscriptions = list_subscriptions(&mut conn, alice.id, Page::new(1, 10), Some(2)).unwrap();
    assert_eq!(subscriptions.count, 2);
    let [first, second] = &subscriptions.items[..] else {
        panic!("expected two subscriptions");
    };
    assert_eq!(first.author.id, bob.id);
    assert_eq!(first.recipes_count, 3);
    assert_eq!(
        first.recipes.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
        ["Buns", "Rolls"]
    );
    assert_eq!(second.author.id, carol.id);
    assert_eq!(second.recipes_count, 0);

    assert_eq!(
        followed_among(&mut conn, alice.id, vec![bob.id, carol.id, alice.id]).unwrap(),
        HashSet::from([bob.id, carol.id])
    );

    toggle_remove(&mut conn, &Follow, alice.id, carol.id).unwrap();
    let subscriptions = list_subscriptions(&mut conn, alice.id, Page::new(1, 10), None).unwrap();
    assert_eq!(subscriptions.count, 1);
    assert_eq!(subscriptions.items[0].recipes.len(), 3);

    let nobody = list_subscriptions(&mut conn, bob.id, Page::new(1, 10), None).unwrap();
    assert_eq!(nobody.count, 0);
    assert!(nobody.items.is_empty());
}
