// Copyright 2023 Remi Bernotavicius

use super::{Error, Page, Paginated, QueryResultExt as _, Result, ValidationErrors};
use crate::database;
use crate::database::models::{User, UserId};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{
    PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString,
};
use argon2::Argon2;
use diesel::prelude::OptionalExtension as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;

const MAX_FIELD_LENGTH: usize = 150;
const MAX_EMAIL_LENGTH: usize = 254;

pub struct NewUser {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    pub is_admin: bool,
}

/// PHC string, argon2id with a random salt.
fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

fn verify_password(encoded: &str, password: &str) -> bool {
    PasswordHash::new(encoded).is_ok_and(|hash| {
        Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok()
    })
}

fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '@' | '+' | '-'))
}

fn validate_password(errors: &mut ValidationErrors, field: &'static str, password: &str) {
    if password.is_empty() {
        errors.add(field, "This field may not be blank.");
    } else if password.chars().count() > MAX_FIELD_LENGTH {
        errors.add(field, "Ensure this field has no more than 150 characters.");
    }
}

fn validate_new_user(user: &NewUser) -> ValidationErrors {
    let mut errors = ValidationErrors::new();

    if user.email.chars().count() > MAX_EMAIL_LENGTH {
        errors.add("email", "Ensure this field has no more than 254 characters.");
    } else if !user
        .email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty())
    {
        errors.add("email", "Enter a valid email address.");
    }

    if user.username.chars().count() > MAX_FIELD_LENGTH {
        errors.add("username", "Ensure this field has no more than 150 characters.");
    } else if user.username.eq_ignore_ascii_case("me") {
        errors.add("username", "You cannot use \"me\" as a username.");
    } else if !is_valid_username(&user.username) {
        errors.add(
            "username",
            "Enter a valid username of letters, numbers and @/./+/-/_ characters.",
        );
    }

    for (field, value) in [
        ("first_name", &user.first_name),
        ("last_name", &user.last_name),
    ] {
        if value.trim().is_empty() {
            errors.add(field, "This field may not be blank.");
        } else if value.chars().count() > MAX_FIELD_LENGTH {
            errors.add(field, "Ensure this field has no more than 150 characters.");
        }
    }

    validate_password(&mut errors, "password", &user.password);
    errors
}

pub fn create_user(conn: &mut database::Connection, new_user: NewUser) -> Result<User> {
    use database::schema::users::dsl::*;
    use diesel::dsl::exists;
    use diesel::insert_into;

    let new_user = NewUser {
        email: new_user.email.trim().to_lowercase(),
        ..new_user
    };
    let mut errors = validate_new_user(&new_user);

    if !errors.has("email")
        && diesel::select(exists(users.filter(email.eq(&new_user.email)))).get_result(conn)?
    {
        errors.add("email", "A user with that email already exists.");
    }
    if !errors.has("username")
        && diesel::select(exists(users.filter(username.eq(&new_user.username))))
            .get_result(conn)?
    {
        errors.add("username", "A user with that username already exists.");
    }
    errors.into_result()?;

    let user = insert_into(users)
        .values((
            email.eq(&new_user.email),
            username.eq(&new_user.username),
            first_name.eq(new_user.first_name.trim()),
            last_name.eq(new_user.last_name.trim()),
            password.eq(hash_password(&new_user.password)?),
            is_admin.eq(new_user.is_admin),
        ))
        .returning(User::as_returning())
        .get_result(conn)
        .or_conflict(|| "a user with that email or username already exists".into())?;
    log::info!("created user {:?} ({})", user.username, user.id);
    Ok(user)
}

pub fn find_user(conn: &mut database::Connection, user_id: UserId) -> Result<User> {
    use database::schema::users::dsl::*;

    users
        .select(User::as_select())
        .filter(id.eq(user_id))
        .get_result(conn)
        .optional()?
        .ok_or(Error::NotFound("user"))
}

pub fn list_users(conn: &mut database::Connection, page: Page) -> Result<Paginated<User>> {
    use database::schema::users::dsl::*;

    let count: i64 = users.count().get_result(conn)?;
    page.check(count)?;
    let items = users
        .select(User::as_select())
        .order(id.asc())
        .limit(page.size)
        .offset(page.offset())
        .load(conn)?;
    Ok(Paginated { count, items })
}

pub fn authenticate(
    conn: &mut database::Connection,
    login_email: &str,
    login_password: &str,
) -> Result<User> {
    use database::schema::users::dsl::*;

    let user = users
        .select(User::as_select())
        .filter(email.eq(login_email.trim().to_lowercase()))
        .get_result(conn)
        .optional()?;
    match user {
        Some(user) if verify_password(&user.password, login_password) => Ok(user),
        _ => Err(Error::InvalidOperation(
            "unable to log in with provided credentials".into(),
        )),
    }
}

pub fn set_password(
    conn: &mut database::Connection,
    user: &User,
    current_password: &str,
    new_password: &str,
) -> Result<()> {
    use database::schema::users::dsl::*;
    use diesel::update;

    let mut errors = ValidationErrors::new();
    if !verify_password(&user.password, current_password) {
        errors.add("current_password", "Invalid password.");
    }
    validate_password(&mut errors, "new_password", new_password);
    errors.into_result()?;

    update(users.filter(id.eq(user.id)))
        .set(password.eq(hash_password(new_password)?))
        .execute(conn)?;
    log::info!("changed password of user {}", user.id);
    Ok(())
}

pub fn issue_token(conn: &mut database::Connection, owner: UserId) -> Result<String> {
    use database::schema::auth_tokens::dsl::*;
    use diesel::insert_into;

    let new_key = uuid::Uuid::new_v4().simple().to_string();
    insert_into(auth_tokens)
        .values((
            key.eq(&new_key),
            user_id.eq(owner),
            created_at.eq(chrono::Utc::now().naive_utc()),
        ))
        .execute(conn)?;
    log::debug!("issued token for user {owner}");
    Ok(new_key)
}

pub fn user_for_token(conn: &mut database::Connection, token: &str) -> Result<Option<User>> {
    use database::schema::{auth_tokens, users};

    Ok(auth_tokens::table
        .inner_join(users::table)
        .filter(auth_tokens::key.eq(token))
        .select(User::as_select())
        .get_result(conn)
        .optional()?)
}

pub fn revoke_token(conn: &mut database::Connection, token: &str) -> Result<()> {
    use database::schema::auth_tokens::dsl::*;
    use diesel::delete;

    delete(auth_tokens.filter(key.eq(token))).execute(conn)?;
    Ok(())
}

#[cfg(test)]
fn new_user(name: &str) -> NewUser {
    NewUser {
        email: format!("{name}@Example.com"),
        username: name.into(),
        first_name: "First".into(),
        last_name: "Last".into(),
        password: "correct horse".into(),
        is_admin: false,
    }
}

#[test]
fn password_hashing() {
    let encoded = hash_password("correct horse").unwrap();
    assert!(encoded.starts_with("$argon2id$"));
    assert!(verify_password(&encoded, "correct horse"));
    assert!(!verify_password(&encoded, "battery staple"));
    assert_ne!(encoded, hash_password("correct horse").unwrap());

    assert!(!verify_password("", "correct horse"));
    assert!(!verify_password("$md5$salt$digest", "correct horse"));
    let legacy = "sha256$10000$salt$0123456789abcdef";
    assert!(!verify_password(legacy, "correct horse"));
}

#[test]
fn create_and_authenticate() {
    let mut conn = database::in_memory();
    let user = create_user(&mut conn, new_user("alice")).unwrap();
    assert_eq!(user.email, "alice@example.com");
    assert!(!user.is_admin);
    assert_ne!(user.password, "correct horse");

    let found = authenticate(&mut conn, "ALICE@example.com", "correct horse").unwrap();
    assert_eq!(found.id, user.id);
    assert!(matches!(
        authenticate(&mut conn, "alice@example.com", "wrong"),
        Err(Error::InvalidOperation(_))
    ));
    assert!(matches!(
        authenticate(&mut conn, "bob@example.com", "correct horse"),
        Err(Error::InvalidOperation(_))
    ));
}

#[test]
fn create_user_validation() {
    let mut conn = database::in_memory();
    create_user(&mut conn, new_user("alice")).unwrap();

    let Err(Error::Validation(errors)) = create_user(&mut conn, new_user("alice")) else {
        panic!("expected validation error");
    };
    assert!(errors.has("email"));
    assert!(errors.has("username"));

    let Err(Error::Validation(errors)) = create_user(
        &mut conn,
        NewUser {
            email: "not-an-email".into(),
            username: "me".into(),
            first_name: " ".into(),
            password: "".into(),
            ..new_user("x")
        },
    ) else {
        panic!("expected validation error");
    };
    assert!(errors.has("email"));
    assert!(errors.has("username"));
    assert!(errors.has("first_name"));
    assert!(errors.has("password"));
    assert!(!errors.has("last_name"));

    let Err(Error::Validation(errors)) = create_user(&mut conn, new_user("no spaces allowed"))
    else {
        panic!("expected validation error");
    };
    assert!(errors.has("username"));
}

#[test]
fn tokens() {
    let mut conn = database::in_memory();
    let user = create_user(&mut conn, new_user("alice")).unwrap();

    let token = issue_token(&mut conn, user.id).unwrap();
    let other = issue_token(&mut conn, user.id).unwrap();
    assert_ne!(token, other);

    let found = user_for_token(&mut conn, &token).unwrap().unwrap();
    assert_eq!(found.id, user.id);
    assert!(user_for_token(&mut conn, "bogus").unwrap().is_none());

    revoke_token(&mut conn, &token).unwrap();
    assert!(user_for_token(&mut conn, &token).unwrap().is_none());
    assert!(user_for_token(&mut conn, &other).unwrap().is_some());
}

#[test]
fn change_password() {
    let mut conn = database::in_memory();
    let user = create_user(&mut conn, new_user("alice")).unwrap();

    let Err(Error::Validation(errors)) = set_password(&mut conn, &user, "wrong", "new secret")
    else {
        panic!("expected validation error");
    };
    assert!(errors.has("current_password"));

    set_password(&mut conn, &user, "correct horse", "new secret").unwrap();
    assert!(authenticate(&mut conn, "alice@example.com", "correct horse").is_err());
    assert!(authenticate(&mut conn, "alice@example.com", "new secret").is_ok());
}

#[test]
fn user_pages() {
    let mut conn = database::in_memory();
    for name in ["a", "b", "c"] {
        create_user(&mut conn, new_user(name)).unwrap();
    }

    let first = list_users(&mut conn, Page::new(1, 2)).unwrap();
    assert_eq!(first.count, 3);
    assert_eq!(
        first.items.iter().map(|u| u.username.as_str()).collect::<Vec<_>>(),
        ["a", "b"]
    );
    let second = list_users(&mut conn, Page::new(2, 2)).unwrap();
    assert_eq!(second.items.len(), 1);
    assert!(matches!(
        list_users(&mut conn, Page::new(3, 2)),
        Err(Error::NotFound("page"))
    ));
    assert!(matches!(
        find_user(&mut conn, UserId(99)),
        Err(Error::NotFound("user"))
    ));
}
