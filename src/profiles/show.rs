use axum::{debug_handler, extract::State, Json};
use serde_json::{json, Value};
use sqlx::SqlitePool;

use crate::{session::CurrentUser, AppResult};

use super::get_profile;

#[debug_handler]
pub(crate) async fn show(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user_id): CurrentUser,
) -> AppResult<Json<Value>> {
    let profile = get_profile(&db_pool, user_id).await?;
    Ok(Json(json!({ "profile": profile })))
}
