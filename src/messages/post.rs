use axum::{
    debug_handler,
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::{models::Message, session::CurrentUser, AppError, AppResult};

use super::{participant_match, SELECT_MESSAGES};

/// Appends a message from `requester` to the match's conversation.
pub async fn post_message(db_pool: &SqlitePool, match_id: Uuid, requester: Uuid, content: &str) -> AppResult<Message> {
    if content.trim().is_empty() {
        return Err(AppError::invalid("Message content cannot be empty."));
    }
    participant_match(db_pool, match_id, requester).await?;

    let id = Uuid::now_v7();
    sqlx::query("INSERT INTO messages (id,match_id,sender_id,content,is_system,created_at) VALUES (?,?,?,?,FALSE,?)")
        .bind(id)
        .bind(match_id)
        .bind(requester)
        .bind(content)
        .bind(OffsetDateTime::now_utc())
        .execute(db_pool)
        .await?;

    debug!("u/{requester} posted to m/{match_id}");
    Ok(
        sqlx::query_as(&format!("{SELECT_MESSAGES} WHERE m.id=?"))
            .bind(id)
            .fetch_one(db_pool)
            .await?
    )
}

#[derive(Deserialize)]
pub(crate) struct PostForm {
    #[serde(rename = "matchId")]
    match_id: Option<Uuid>,
    content: Option<String>,
}

#[debug_handler]
pub(crate) async fn post(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user_id): CurrentUser,
    form: Result<Json<PostForm>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let Json(PostForm { match_id, content }) = form?;
    let (Some(match_id), Some(content)) = (match_id, content) else {
        return Err(AppError::invalid("Match ID and content are required."));
    };

    let message = post_message(&db_pool, match_id, user_id, &content).await?;
    Ok(Json(json!({ "message": message })))
}
