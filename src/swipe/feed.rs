use axum::{
    debug_handler,
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::{
    models::{Profile, ProfileSummary},
    profiles::load_images,
    session::CurrentUser,
    AppError, AppResult,
};

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct FeedFilter {
    #[serde(rename = "ageMin")]
    pub age_min: Option<i64>,
    #[serde(rename = "ageMax")]
    pub age_max: Option<i64>,
}

/// Profiles the requester has not acted on yet, newest profile first.
///
/// A candidate needs at least one gallery image, must not belong to the
/// requester, and must fall inside the (inclusive) age range when one is given.
pub async fn list_candidates(
    db_pool: &SqlitePool,
    requester: Uuid,
    FeedFilter { age_min, age_max }: FeedFilter,
) -> AppResult<Vec<ProfileSummary>> {
    if let (Some(min), Some(max)) = (age_min, age_max) {
        if min > max {
            return Err(AppError::invalid("ageMin cannot be greater than ageMax."));
        }
    }

    let profiles: Vec<Profile> = sqlx::query_as(
        "SELECT p.id,p.user_id,p.name,p.age,p.bio,p.avatar_url,p.created_at,p.updated_at
         FROM profiles p
         WHERE p.user_id <> ?
           AND EXISTS (SELECT 1 FROM images i WHERE i.profile_id = p.id)
           AND NOT EXISTS (SELECT 1 FROM interests t WHERE t.from_user = ? AND t.to_user = p.user_id)
           AND (? IS NULL OR p.age >= ?)
           AND (? IS NULL OR p.age <= ?)
         ORDER BY p.rowid DESC",
    )
    .bind(requester)
    .bind(requester)
    .bind(age_min)
    .bind(age_min)
    .bind(age_max)
    .bind(age_max)
    .fetch_all(db_pool)
    .await?;

    let mut candidates = Vec::with_capacity(profiles.len());
    for mut profile in profiles {
        profile.images = load_images(db_pool, profile.id).await?;
        candidates.push(ProfileSummary::from(profile));
    }

    debug!("feed for u/{requester}: {} candidates", candidates.len());
    Ok(candidates)
}

#[debug_handler]
pub(crate) async fn feed(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user_id): CurrentUser,
    filter: Result<Query<FeedFilter>, QueryRejection>,
) -> AppResult<Json<Value>> {
    let Query(filter) = filter?;
    let profiles = list_candidates(&db_pool, user_id, filter).await?;
    Ok(Json(json!({ "profiles": profiles })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{test_member, test_pool},
        models::Disposition,
        swipe::record_interest,
    };

    fn names(feed: &[ProfileSummary]) -> Vec<&str> {
        feed.iter().map(|p| p.name.as_str()).collect()
    }

    #[tokio::test]
    async fn excludes_self_imageless_and_already_seen() {
        let db_pool = test_pool().await;
        let (ada, _) = test_member(&db_pool, "ada", 25, 2).await;
        let (_, bob_profile) = test_member(&db_pool, "bob", 30, 1).await;
        test_member(&db_pool, "cyd", 28, 0).await;
        let (_, dee_profile) = test_member(&db_pool, "dee", 40, 3).await;
        test_member(&db_pool, "eve", 22, 1).await;

        let feed = list_candidates(&db_pool, ada, FeedFilter::default()).await.unwrap();
        assert_eq!(names(&feed), ["eve", "dee", "bob"]);

        record_interest(&db_pool, ada, bob_profile, Disposition::Like).await.unwrap();
        record_interest(&db_pool, ada, dee_profile, Disposition::Dislike).await.unwrap();

        let feed = list_candidates(&db_pool, ada, FeedFilter::default()).await.unwrap();
        assert_eq!(names(&feed), ["eve"]);
    }

    #[tokio::test]
    async fn newest_profile_first_even_within_one_second() {
        let db_pool = test_pool().await;
        let (ada, _) = test_member(&db_pool, "ada", 25, 1).await;
        let (_, bob_profile) = test_member(&db_pool, "bob", 30, 1).await;
        let (_, cyd_profile) = test_member(&db_pool, "cyd", 31, 1).await;

        let base = time::OffsetDateTime::from_unix_timestamp(1_767_268_805).unwrap();
        for (profile_id, created_at) in [
            (bob_profile, base + time::Duration::milliseconds(100)),
            (cyd_profile, base + time::Duration::milliseconds(120)),
        ] {
            sqlx::query("UPDATE profiles SET created_at=? WHERE id=?")
                .bind(created_at)
                .bind(profile_id)
                .execute(&db_pool)
                .await
                .unwrap();
        }

        let feed = list_candidates(&db_pool, ada, FeedFilter::default()).await.unwrap();
        assert_eq!(names(&feed), ["cyd", "bob"]);
    }

    #[tokio::test]
    async fn being_liked_does_not_hide_the_liker() {
        let db_pool = test_pool().await;
        let (ada, ada_profile) = test_member(&db_pool, "ada", 25, 1).await;
        let (bob, _) = test_member(&db_pool, "bob", 30, 1).await;

        record_interest(&db_pool, bob, ada_profile, Disposition::Dislike).await.unwrap();

        let feed = list_candidates(&db_pool, ada, FeedFilter::default()).await.unwrap();
        assert_eq!(names(&feed), ["bob"]);
        assert!(list_candidates(&db_pool, bob, FeedFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn filters_by_inclusive_age_range() {
        let db_pool = test_pool().await;
        let (ada, _) = test_member(&db_pool, "ada", 25, 1).await;
        test_member(&db_pool, "bob", 18, 1).await;
        test_member(&db_pool, "cyd", 30, 1).await;
        test_member(&db_pool, "dee", 45, 1).await;

        let only = |age_min, age_max| FeedFilter { age_min, age_max };
        let feed = list_candidates(&db_pool, ada, only(Some(18), Some(30))).await.unwrap();
        assert_eq!(names(&feed), ["cyd", "bob"]);

        let feed = list_candidates(&db_pool, ada, only(Some(31), None)).await.unwrap();
        assert_eq!(names(&feed), ["dee"]);

        let feed = list_candidates(&db_pool, ada, only(None, Some(18))).await.unwrap();
        assert_eq!(names(&feed), ["bob"]);

        let err = list_candidates(&db_pool, ada, only(Some(40), Some(20))).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn summaries_carry_gallery_and_defaults() {
        let db_pool = test_pool().await;
        let (ada, _) = test_member(&db_pool, "ada", 25, 1).await;
        test_member(&db_pool, "bob", 30, 2).await;

        let feed = list_candidates(&db_pool, ada, FeedFilter::default()).await.unwrap();
        let bob = &feed[0];
        assert_eq!(bob.bio, crate::models::DEFAULT_BIO);
        assert_eq!(bob.avatar_url, crate::models::DEFAULT_AVATAR);
        assert_eq!(bob.first_image, "/uploads/bob-0.png");
        assert_eq!(bob.images.len(), 2);
    }
}
