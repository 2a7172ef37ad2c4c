use axum::{
    debug_handler,
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::{
    models::{canonical_pair, Disposition, WELCOME_MESSAGE},
    session::CurrentUser,
    AppError, AppResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwipeOutcome {
    pub matched: bool,
    pub match_id: Option<Uuid>,
    /// What is on record for this pair, which is the first disposition given.
    pub disposition: Disposition,
}

impl SwipeOutcome {
    fn message(&self) -> &'static str {
        match (self.matched, self.disposition) {
            (true, _) => "It's a match!",
            (false, Disposition::Like) => "Liked the profile!",
            (false, Disposition::Dislike) => "Disliked the profile.",
        }
    }
}

/// Records how `actor` feels about the owner of `target_profile_id`.
///
/// The first disposition per ordered pair sticks; later calls write nothing and
/// report the pair's current state. A like that meets an earlier like from the
/// other side creates the pair's match together with its welcome message.
pub async fn record_interest(
    db_pool: &SqlitePool,
    actor: Uuid,
    target_profile_id: Uuid,
    disposition: Disposition,
) -> AppResult<SwipeOutcome> {
    let Some((target,)): Option<(Uuid,)> = sqlx::query_as("SELECT user_id FROM profiles WHERE id=?")
        .bind(target_profile_id)
        .fetch_optional(db_pool)
        .await?
    else {
        return Err(AppError::not_found("Profile"));
    };

    if target == actor {
        return Err(AppError::invalid("You cannot swipe on your own profile."));
    }

    let (user_low, user_high) = canonical_pair(actor, target);
    let now = OffsetDateTime::now_utc();

    // lead with the write so the transaction holds the write lock from its first statement
    let mut tx = db_pool.begin().await?;

    let recorded = sqlx::query(
        "INSERT INTO interests (from_user,to_user,disposition,created_at) VALUES (?,?,?,?)
         ON CONFLICT (from_user,to_user) DO NOTHING",
    )
    .bind(actor)
    .bind(target)
    .bind(disposition)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .rows_affected()
        == 1;

    if !recorded {
        let (prior,): (Disposition,) = sqlx::query_as("SELECT disposition FROM interests WHERE from_user=? AND to_user=?")
            .bind(actor)
            .bind(target)
            .fetch_one(&mut *tx)
            .await?;
        let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM matches WHERE user_low=? AND user_high=?")
            .bind(user_low)
            .bind(user_high)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;

        return Ok(SwipeOutcome {
            matched: existing.is_some(),
            match_id: existing.map(|(id,)| id),
            disposition: prior,
        });
    }

    let mut outcome = SwipeOutcome { matched: false, match_id: None, disposition };

    if disposition == Disposition::Like {
        let reciprocal: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM interests WHERE from_user=? AND to_user=? AND disposition=?")
                .bind(target)
                .bind(actor)
                .bind(Disposition::Like)
                .fetch_optional(&mut *tx)
                .await?;

        if reciprocal.is_some() {
            let match_id = Uuid::now_v7();
            let created = sqlx::query(
                "INSERT INTO matches (id,user_low,user_high,created_at) VALUES (?,?,?,?)
                 ON CONFLICT (user_low,user_high) DO NOTHING",
            )
            .bind(match_id)
            .bind(user_low)
            .bind(user_high)
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected()
                == 1;

            let match_id = if created {
                sqlx::query("INSERT INTO messages (id,match_id,sender_id,content,is_system,created_at) VALUES (?,?,?,?,TRUE,?)")
                    .bind(Uuid::now_v7())
                    .bind(match_id)
                    .bind(actor)
                    .bind(WELCOME_MESSAGE)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                match_id
            } else {
                let (id,): (Uuid,) = sqlx::query_as("SELECT id FROM matches WHERE user_low=? AND user_high=?")
                    .bind(user_low)
                    .bind(user_high)
                    .fetch_one(&mut *tx)
                    .await?;
                id
            };

            outcome.matched = true;
            outcome.match_id = Some(match_id);
        }
    }

    tx.commit().await?;

    match outcome.match_id {
        Some(match_id) => info!("u/{actor} and u/{target} matched in m/{match_id}"),
        None => info!("u/{actor} {disposition}d u/{target}"),
    }
    Ok(outcome)
}

#[derive(Deserialize)]
pub(crate) struct SwipeForm {
    #[serde(rename = "profileId")]
    profile_id: Option<Uuid>,
    action: Option<String>,
}

#[debug_handler]
pub(crate) async fn swipe(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user_id): CurrentUser,
    form: Result<Json<SwipeForm>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let Json(SwipeForm { profile_id, action }) = form?;
    let (Some(profile_id), Some(action)) = (profile_id, action) else {
        return Err(AppError::invalid("Profile ID and action are required."));
    };
    let disposition = action.parse::<Disposition>().map_err(AppError::InvalidArgument)?;

    let outcome = record_interest(&db_pool, user_id, profile_id, disposition).await?;
    Ok(Json(json!({
        "matched": outcome.matched,
        "matchId": outcome.match_id,
        "message": outcome.message(),
    })))
}
