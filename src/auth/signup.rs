use axum::{debug_handler, extract::{rejection::JsonRejection, State}, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::{models::User, AppError, AppResult};

use super::hash_password;

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Deserialize)]
pub struct SignupForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

fn duplicate_email() -> AppError {
    AppError::Conflict("User with this email already exists.".to_owned())
}

/// Creates an account. The email is the identity, compared case-insensitively.
pub async fn signup(db_pool: &SqlitePool, SignupForm { name, email, password }: SignupForm) -> AppResult<User> {
    let name = name.trim().to_owned();
    let email = email.trim().to_lowercase();
    if name.is_empty() || email.is_empty() || password.is_empty() {
        return Err(AppError::invalid("All fields are required."));
    }
    if !email.contains('@') {
        return Err(AppError::invalid("Email address is not valid."));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::invalid(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters."
        )));
    }

    if sqlx::query("SELECT 1 FROM users WHERE email=?")
        .bind(&email)
        .fetch_optional(db_pool)
        .await?
        .is_some()
    {
        return Err(duplicate_email());
    }

    let user = User {
        id: Uuid::now_v7(),
        name,
        email,
        password_hash: hash_password(password).await?,
        created_at: OffsetDateTime::now_utc(),
    };

    // a concurrent signup can still win the race; the unique index decides
    sqlx::query("INSERT INTO users (id,name,email,password_hash,created_at) VALUES (?,?,?,?,?)")
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(db_pool)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db_err) if db_err.is_unique_violation() => duplicate_email(),
            _ => AppError::from(e),
        })?;

    info!("signed up {} as {}", user.email, user.id);
    Ok(user)
}

#[debug_handler]
pub(crate) async fn signup_handler(
    State(db_pool): State<SqlitePool>,
    form: Result<Json<SignupForm>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let Json(form) = form?;
    signup(&db_pool, form).await?;
    Ok(Json(json!({ "message": "User created successfully!" })))
}
