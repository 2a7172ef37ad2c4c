mod save;
mod show;

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use sqlx::{SqliteExecutor, SqlitePool};
use uuid::Uuid;

use crate::{models::{Image, Profile}, AppResult, AppState};

pub use save::{save_profile, ProfileChanges, ProfileFields, Upload, MAX_IMAGES_PER_SAVE};

pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/profile", get(show::show).post(save::save))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

pub(crate) async fn load_images<'e>(executor: impl SqliteExecutor<'e>, profile_id: Uuid) -> AppResult<Vec<Image>> {
    Ok(
        sqlx::query_as("SELECT id,profile_id,url,created_at FROM images WHERE profile_id=? ORDER BY rowid")
            .bind(profile_id)
            .fetch_all(executor)
            .await?
    )
}

/// The caller's own profile with its gallery, if they have saved one yet.
pub async fn get_profile(db_pool: &SqlitePool, user_id: Uuid) -> AppResult<Option<Profile>> {
    let Some(mut profile): Option<Profile> = sqlx::query_as(
        "SELECT id,user_id,name,age,bio,avatar_url,created_at,updated_at FROM profiles WHERE user_id=?",
    )
    .bind(user_id)
    .fetch_optional(db_pool)
    .await?
    else {
        return Ok(None);
    };

    profile.images = load_images(db_pool, profile.id).await?;
    Ok(Some(profile))
}
