use axum::{debug_handler, extract::{rejection::JsonRejection, State}, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower_sessions::Session;
use tracing::info;

use crate::{models::User, session::USER_ID, AppError, AppResult};

use super::verify_password;

#[derive(Deserialize)]
pub(crate) struct LoginForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

fn bad_credentials() -> AppError {
    AppError::Unauthorized("Invalid email or password".to_owned())
}

pub(crate) async fn authenticate(db_pool: &SqlitePool, email: &str, password: String) -> AppResult<User> {
    let email = email.trim().to_lowercase();
    let Some(user) = sqlx::query_as::<_, User>("SELECT id,name,email,password_hash,created_at FROM users WHERE email=?")
        .bind(&email)
        .fetch_optional(db_pool)
        .await?
    else {
        return Err(bad_credentials());
    };

    if !verify_password(password, user.password_hash.clone()).await? {
        return Err(bad_credentials());
    }

    Ok(user)
}

#[debug_handler]
pub(crate) async fn login(
    State(db_pool): State<SqlitePool>,
    session: Session,
    form: Result<Json<LoginForm>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let Json(LoginForm { email, password }) = form?;
    let user = authenticate(&db_pool, &email, password).await?;

    session.cycle_id().await?;
    session.insert(USER_ID, user.id).await?;

    info!("welcome u/{}", user.id);
    Ok(Json(json!({ "user": user })))
}
