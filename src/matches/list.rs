use axum::{debug_handler, extract::State, Json};
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    messages::SELECT_MESSAGES,
    models::{Match, Message, Participant},
    session::CurrentUser,
    AppError, AppResult,
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    pub id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub participants: Vec<Participant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<Message>,
}

/// Every match `user_id` is part of, newest first. Both participants get the
/// same summary for a given match.
pub async fn list_matches(db_pool: &SqlitePool, user_id: Uuid) -> AppResult<Vec<MatchSummary>> {
    let known: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE id=?")
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?;
    if known.is_none() {
        return Err(AppError::not_found("User"));
    }

    let matches: Vec<Match> = sqlx::query_as(
        "SELECT id,user_low,user_high,created_at FROM matches
         WHERE user_low=? OR user_high=?
         ORDER BY rowid DESC",
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_all(db_pool)
    .await?;

    let mut summaries = Vec::with_capacity(matches.len());
    for m in matches {
        let participants: Vec<Participant> = sqlx::query_as("SELECT id,name FROM users WHERE id IN (?,?) ORDER BY id")
            .bind(m.user_low)
            .bind(m.user_high)
            .fetch_all(db_pool)
            .await?;

        let last_message: Option<Message> = sqlx::query_as(&format!(
            "{SELECT_MESSAGES} WHERE m.match_id=? ORDER BY m.rowid DESC LIMIT 1"
        ))
        .bind(m.id)
        .fetch_optional(db_pool)
        .await?;

        summaries.push(MatchSummary { id: m.id, created_at: m.created_at, participants, last_message });
    }

    Ok(summaries)
}

#[debug_handler]
pub(crate) async fn list(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user_id): CurrentUser,
) -> AppResult<Json<Value>> {
    let matches = list_matches(&db_pool, user_id).await?;
    Ok(Json(json!({ "matches": matches })))
}
