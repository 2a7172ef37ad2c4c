use axum::{
    debug_handler,
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{models::Message, session::CurrentUser, AppError, AppResult};

use super::{participant_match, SELECT_MESSAGES};

/// The whole conversation of a match, oldest first.
pub async fn list_messages(db_pool: &SqlitePool, match_id: Uuid, requester: Uuid) -> AppResult<Vec<Message>> {
    participant_match(db_pool, match_id, requester).await?;

    Ok(
        sqlx::query_as(&format!("{SELECT_MESSAGES} WHERE m.match_id=? ORDER BY m.rowid"))
            .bind(match_id)
            .fetch_all(db_pool)
            .await?
    )
}

#[derive(Deserialize)]
pub(crate) struct ListQuery {
    #[serde(rename = "matchId")]
    match_id: Option<Uuid>,
}

#[debug_handler]
pub(crate) async fn list(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user_id): CurrentUser,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> AppResult<Json<Value>> {
    let Query(ListQuery { match_id }) = query?;
    let match_id = match_id.ok_or_else(|| AppError::invalid("Match ID is required."))?;

    let messages = list_messages(&db_pool, match_id, user_id).await?;
    Ok(Json(json!({ "messages": messages })))
}
