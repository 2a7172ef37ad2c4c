mod list;
mod post;

use axum::{routing::get, Router};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{models::Match, AppError, AppResult, AppState};

pub use list::list_messages;
pub use post::post_message;

/// Message rows joined with the sender's display name.
pub(crate) const SELECT_MESSAGES: &str = "SELECT m.id,m.match_id,m.sender_id,u.name AS sender_name,m.content,m.is_system,m.created_at
     FROM messages m JOIN users u ON u.id = m.sender_id";

pub fn router() -> Router<AppState> {
    Router::new().route("/messages", get(list::list).post(post::post))
}

/// The match, provided `requester` is one of its two participants.
async fn participant_match(db_pool: &SqlitePool, match_id: Uuid, requester: Uuid) -> AppResult<Match> {
    let Some(m): Option<Match> = sqlx::query_as("SELECT id,user_low,user_high,created_at FROM matches WHERE id=?")
        .bind(match_id)
        .fetch_optional(db_pool)
        .await?
    else {
        return Err(AppError::not_found("Match"));
    };

    if !m.has_participant(requester) {
        return Err(AppError::Forbidden("You are not part of this match.".to_owned()));
    }
    Ok(m)
}
