use std::sync::Arc;

use axum::{
    body::Bytes,
    debug_handler,
    extract::{multipart::Field, Multipart, State},
    Json,
};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{models::Profile, objects::ObjectStore, session::CurrentUser, AppError, AppResult, AppState};

use super::get_profile;

pub const MIN_AGE: i64 = 18;
pub const MAX_IMAGES_PER_SAVE: usize = 6;

#[derive(Debug, Clone, Default)]
pub struct ProfileFields {
    pub name: String,
    pub bio: Option<String>,
    pub age: i64,
}

#[derive(Debug, Clone)]
pub struct Upload {
    pub data: Bytes,
    pub content_type: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub fields: ProfileFields,
    pub new_images: Vec<Upload>,
    pub avatar: Option<Upload>,
    pub delete_image_ids: Vec<Uuid>,
}

fn validate(fields: &mut ProfileFields) -> AppResult<()> {
    if fields.age < MIN_AGE {
        return Err(AppError::invalid("Age must be a number and at least 18."));
    }

    fields.name = fields.name.trim().to_owned();
    if fields.name.is_empty() {
        return Err(AppError::invalid("Name cannot be empty."));
    }

    fields.bio = fields
        .bio
        .take()
        .map(|bio| bio.trim().to_owned())
        .filter(|bio| !bio.is_empty());
    Ok(())
}

fn validate_upload(upload: &Upload) -> AppResult<()> {
    if !upload.content_type.starts_with("image/") {
        return Err(AppError::invalid(format!(
            "Only images can be uploaded, got {}.",
            upload.content_type
        )));
    }
    Ok(())
}

/// Best effort; a leftover object is harmless once no record points at it.
async fn release_all(objects: &dyn ObjectStore, urls: &[String]) {
    for url in urls {
        if let Err(e) = objects.delete(url).await {
            warn!("failed to release object {url}: {e:#}");
        }
    }
}

async fn put_all(objects: &dyn ObjectStore, uploads: Vec<Upload>) -> AppResult<Vec<String>> {
    let mut urls = Vec::with_capacity(uploads.len());
    for Upload { data, content_type } in uploads {
        match objects.put(data, &content_type).await {
            Ok(url) => urls.push(url),
            Err(e) => {
                release_all(objects, &urls).await;
                return Err(e.context("storing uploaded image").into());
            }
        }
    }
    Ok(urls)
}

/// Creates or updates the caller's profile together with its gallery.
///
/// Everything is validated before the first write. New objects are stored
/// before the records that reference them are committed, and objects that
/// lose their record are only released after the commit.
pub async fn save_profile(
    db_pool: &SqlitePool,
    objects: &dyn ObjectStore,
    user_id: Uuid,
    ProfileChanges { mut fields, new_images, avatar, delete_image_ids }: ProfileChanges,
) -> AppResult<Profile> {
    validate(&mut fields)?;
    if new_images.len() > MAX_IMAGES_PER_SAVE {
        return Err(AppError::invalid(format!(
            "At most {MAX_IMAGES_PER_SAVE} images can be uploaded at once."
        )));
    }
    new_images.iter().chain(avatar.as_ref()).try_for_each(validate_upload)?;

    if sqlx::query("SELECT 1 FROM users WHERE id=?")
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?
        .is_none()
    {
        return Err(AppError::not_found("User"));
    }

    let existing = get_profile(db_pool, user_id).await?;
    let mut released = Vec::new();
    for image_id in &delete_image_ids {
        let image = existing
            .as_ref()
            .and_then(|profile| profile.images.iter().find(|image| image.id == *image_id))
            .ok_or_else(|| AppError::not_found(format!("Image {image_id}")))?;
        released.push(image.url.clone());
    }

    let new_avatar_url = match avatar {
        Some(avatar) => put_all(objects, vec![avatar]).await?.pop(),
        None => None,
    };
    let new_image_urls = match put_all(objects, new_images).await {
        Ok(urls) => urls,
        Err(e) => {
            release_all(objects, new_avatar_url.as_slice()).await;
            return Err(e);
        }
    };

    let avatar_url = match (&new_avatar_url, &existing) {
        (Some(url), Some(profile)) => {
            released.extend(profile.avatar_url.clone());
            Some(url.clone())
        }
        (Some(url), None) => Some(url.clone()),
        (None, Some(profile)) => profile.avatar_url.clone(),
        (None, None) => None,
    };

    let committed = async {
        let now = OffsetDateTime::now_utc();
        let mut tx = db_pool.begin().await?;

        let (profile_id,): (Uuid,) = sqlx::query_as(
            "INSERT INTO profiles (id,user_id,name,age,bio,avatar_url,created_at,updated_at) VALUES (?,?,?,?,?,?,?,?)
             ON CONFLICT(user_id) DO UPDATE SET
                name=excluded.name, age=excluded.age, bio=excluded.bio,
                avatar_url=excluded.avatar_url, updated_at=excluded.updated_at
             RETURNING id",
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(&fields.name)
        .bind(fields.age)
        .bind(&fields.bio)
        .bind(&avatar_url)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        for image_id in &delete_image_ids {
            sqlx::query("DELETE FROM images WHERE id=? AND profile_id=?")
                .bind(image_id)
                .bind(profile_id)
                .execute(&mut *tx)
                .await?;
        }

        for url in &new_image_urls {
            sqlx::query("INSERT INTO images (id,profile_id,url,created_at) VALUES (?,?,?,?)")
                .bind(Uuid::now_v7())
                .bind(profile_id)
                .bind(url)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok::<_, sqlx::Error>(())
    }
    .await;

    if let Err(e) = committed {
        let mut orphans = new_image_urls;
        orphans.extend(new_avatar_url);
        release_all(objects, &orphans).await;
        return Err(e.into());
    }

    release_all(objects, &released).await;

    info!(
        "saved profile of u/{user_id}: +{} images, -{} images",
        new_image_urls.len(),
        delete_image_ids.len()
    );

    get_profile(db_pool, user_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("profile of {user_id} vanished after save").into())
}

fn is_image_field(name: &str) -> bool {
    name == "images"
        || name
            .strip_prefix("image")
            .is_some_and(|n| n.parse::<u8>().is_ok_and(|n| (1..=MAX_IMAGES_PER_SAVE as u8).contains(&n)))
}

async fn read_upload(field: Field<'_>) -> AppResult<Option<Upload>> {
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_owned();
    let data = field.bytes().await?;

    // browsers send an empty part for an untouched file input
    if data.is_empty() {
        return Ok(None);
    }
    Ok(Some(Upload { data, content_type }))
}

async fn read_changes(mut multipart: Multipart) -> AppResult<ProfileChanges> {
    let mut changes = ProfileChanges::default();
    let mut age = None;

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };

        match name.as_str() {
            "name" => changes.fields.name = field.text().await?,
            "bio" => changes.fields.bio = Some(field.text().await?),
            "age" => age = Some(field.text().await?),
            "imagesToDelete" => {
                let raw = field.text().await?;
                let id = Uuid::parse_str(raw.trim())
                    .map_err(|_| AppError::invalid(format!("{raw:?} is not an image id.")))?;
                changes.delete_image_ids.push(id);
            }
            "avatar" => changes.avatar = read_upload(field).await?,
            other if is_image_field(other) => changes.new_images.extend(read_upload(field).await?),
            other => warn!("ignoring unknown profile field {other}"),
        }
    }

    changes.fields.age = age
        .and_then(|age| age.trim().parse().ok())
        .ok_or_else(|| AppError::invalid("Age must be a number and at least 18."))?;

    Ok(changes)
}

#[debug_handler(state = AppState)]
pub(crate) async fn save(
    State(db_pool): State<SqlitePool>,
    State(objects): State<Arc<dyn ObjectStore>>,
    CurrentUser(user_id): CurrentUser,
    multipart: Multipart,
) -> AppResult<Json<Value>> {
    let changes = read_changes(multipart).await?;
    let profile = save_profile(&db_pool, objects.as_ref(), user_id, changes).await?;
    Ok(Json(json!({ "profile": profile })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{test_pool, test_user},
        objects::{LocalObjectStore, MockObjectStore},
    };

    fn png(byte: u8) -> Upload {
        Upload { data: Bytes::from(vec![0x89, b'P', b'N', b'G', byte]), content_type: "image/png".into() }
    }

    fn fields(name: &str, age: i64) -> ProfileFields {
        ProfileFields { name: name.into(), bio: Some("  likes rust  ".into()), age }
    }

    async fn local_store() -> (tempfile::TempDir, LocalObjectStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "/uploads").await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn creates_then_updates_in_place() {
        let db_pool = test_pool().await;
        let (_dir, objects) = local_store().await;
        let user_id = test_user(&db_pool, "ada").await;

        let created = save_profile(&db_pool, &objects, user_id, ProfileChanges {
            fields: fields("Ada", 25),
            new_images: vec![png(1), png(2)],
            ..Default::default()
        })
        .await
        .unwrap();
        assert_eq!(created.name, "Ada");
        assert_eq!(created.bio.as_deref(), Some("likes rust"));
        assert_eq!(created.images.len(), 2);

        let doomed = created.images[0].clone();
        let updated = save_profile(&db_pool, &objects, user_id, ProfileChanges {
            fields: ProfileFields { name: "Ada L.".into(), bio: None, age: 26 },
            new_images: vec![png(3)],
            delete_image_ids: vec![doomed.id],
            ..Default::default()
        })
        .await
        .unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.age, 26);
        assert_eq!(updated.bio, None);
        let urls: Vec<_> = updated.images.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(urls, [created.images[1].url.as_str(), updated.images[1].url.as_str()]);
        assert!(!urls.contains(&doomed.url.as_str()));
    }

    #[tokio::test]
    async fn underage_save_changes_nothing() {
        let db_pool = test_pool().await;
        let (_dir, objects) = local_store().await;
        let user_id = test_user(&db_pool, "ada").await;

        save_profile(&db_pool, &objects, user_id, ProfileChanges { fields: fields("Ada", 25), ..Default::default() })
            .await
            .unwrap();

        let err = save_profile(&db_pool, &objects, user_id, ProfileChanges {
            fields: fields("Ada", 17),
            new_images: vec![png(1)],
            ..Default::default()
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));

        let profile = get_profile(&db_pool, user_id).await.unwrap().unwrap();
        assert_eq!(profile.age, 25);
        assert!(profile.images.is_empty());
    }

    #[tokio::test]
    async fn blank_name_is_rejected_before_storage() {
        let db_pool = test_pool().await;
        let user_id = test_user(&db_pool, "ada").await;
        // no expectations: touching the store would panic
        let objects = MockObjectStore::new();

        let err = save_profile(&db_pool, &objects, user_id, ProfileChanges {
            fields: fields("   ", 30),
            new_images: vec![png(1)],
            ..Default::default()
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Name cannot be empty.");
        assert!(get_profile(&db_pool, user_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_non_images_and_oversized_batches() {
        let db_pool = test_pool().await;
        let user_id = test_user(&db_pool, "ada").await;
        let objects = MockObjectStore::new();

        let text = Upload { data: Bytes::from_static(b"hello"), content_type: "text/plain".into() };
        let err = save_profile(&db_pool, &objects, user_id, ProfileChanges {
            fields: fields("Ada", 30),
            new_images: vec![text],
            ..Default::default()
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));

        let err = save_profile(&db_pool, &objects, user_id, ProfileChanges {
            fields: fields("Ada", 30),
            new_images: (0..7).map(png).collect(),
            ..Default::default()
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn object_store_failure_persists_nothing_and_cleans_up() {
        let db_pool = test_pool().await;
        let user_id = test_user(&db_pool, "ada").await;

        let mut objects = MockObjectStore::new();
        let mut seq = mockall::Sequence::new();
        objects
            .expect_put()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok("/uploads/first.png".to_owned()));
        objects
            .expect_put()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(anyhow::anyhow!("bucket unavailable")));
        objects
            .expect_delete()
            .withf(|url| url == "/uploads/first.png")
            .times(1)
            .returning(|_| Ok(()));

        let err = save_profile(&db_pool, &objects, user_id, ProfileChanges {
            fields: fields("Ada", 30),
            new_images: vec![png(1), png(2)],
            ..Default::default()
        })
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Internal(_)));
        assert!(get_profile(&db_pool, user_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_commit_releases_new_objects_and_keeps_old_profile() {
        let db_pool = test_pool().await;
        let user_id = test_user(&db_pool, "ada").await;

        let before = save_profile(&db_pool, &MockObjectStore::new(), user_id, ProfileChanges {
            fields: fields("Ada", 25),
            ..Default::default()
        })
        .await
        .unwrap();

        sqlx::query("CREATE TRIGGER images_full BEFORE INSERT ON images BEGIN SELECT RAISE(ABORT, 'disk full'); END")
            .execute(&db_pool)
            .await
            .unwrap();

        let mut objects = MockObjectStore::new();
        let mut seq = mockall::Sequence::new();
        for url in ["/uploads/one.png", "/uploads/two.png"] {
            objects
                .expect_put()
                .times(1)
                .in_sequence(&mut seq)
                .returning(move |_, _| Ok(url.to_owned()));
        }
        for url in ["/uploads/one.png", "/uploads/two.png"] {
            objects
                .expect_delete()
                .withf(move |released| released == url)
                .times(1)
                .returning(|_| Ok(()));
        }

        let err = save_profile(&db_pool, &objects, user_id, ProfileChanges {
            fields: fields("Ada Lovelace", 40),
            new_images: vec![png(1), png(2)],
            ..Default::default()
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));

        let after = get_profile(&db_pool, user_id).await.unwrap().unwrap();
        assert_eq!(after.name, before.name);
        assert_eq!(after.age, 25);
        assert_eq!(after.updated_at, before.updated_at);
        assert!(after.images.is_empty());
    }

    #[tokio::test]
    async fn cannot_delete_someone_elses_image() {
        let db_pool = test_pool().await;
        let (_dir, objects) = local_store().await;
        let ada = test_user(&db_pool, "ada").await;
        let bob = test_user(&db_pool, "bob").await;

        let bobs = save_profile(&db_pool, &objects, bob, ProfileChanges {
            fields: fields("Bob", 30),
            new_images: vec![png(1)],
            ..Default::default()
        })
        .await
        .unwrap();

        let err = save_profile(&db_pool, &objects, ada, ProfileChanges {
            fields: fields("Ada", 25),
            delete_image_ids: vec![bobs.images[0].id],
            ..Default::default()
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        assert_eq!(get_profile(&db_pool, bob).await.unwrap().unwrap().images.len(), 1);
        assert!(get_profile(&db_pool, ada).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn replacing_avatar_releases_the_old_one() {
        let db_pool = test_pool().await;
        let (dir, objects) = local_store().await;
        let user_id = test_user(&db_pool, "ada").await;

        let first = save_profile(&db_pool, &objects, user_id, ProfileChanges {
            fields: fields("Ada", 25),
            avatar: Some(png(1)),
            ..Default::default()
        })
        .await
        .unwrap();
        let old_avatar = first.avatar_url.clone().unwrap();

        let second = save_profile(&db_pool, &objects, user_id, ProfileChanges {
            fields: fields("Ada", 25),
            avatar: Some(png(2)),
            ..Default::default()
        })
        .await
        .unwrap();
        assert_ne!(second.avatar_url.as_deref(), Some(old_avatar.as_str()));

        let old_file = dir.path().join(old_avatar.trim_start_matches("/uploads/"));
        assert!(!old_file.exists());

        // keeping the avatar when none is uploaded
        let third = save_profile(&db_pool, &objects, user_id, ProfileChanges {
            fields: fields("Ada", 25),
            ..Default::default()
        })
        .await
        .unwrap();
        assert_eq!(third.avatar_url, second.avatar_url);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let db_pool = test_pool().await;
        let objects = MockObjectStore::new();
        let err = save_profile(&db_pool, &objects, Uuid::now_v7(), ProfileChanges {
            fields: fields("Ghost", 30),
            ..Default::default()
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn recognises_gallery_fields() {
        assert!(is_image_field("images"));
        assert!(is_image_field("image1"));
        assert!(is_image_field("image6"));
        assert!(!is_image_field("image7"));
        assert!(!is_image_field("imagesToDelete"));
        assert!(!is_image_field("avatar"));
    }
}
