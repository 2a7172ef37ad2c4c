use std::{str::FromStr, time::Duration};

use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tracing::info;

/// Opens the pool and brings the schema up to date.
///
/// An in-memory database lives and dies with its connection, so those URLs
/// get exactly one connection that is never recycled.
pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(max_connections)
    };

    let db_pool = pool_options.connect_with(options).await?;
    sqlx::migrate!().run(&db_pool).await?;

    info!("database ready at {database_url}");
    Ok(db_pool)
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    connect("sqlite::memory:", 1).await.unwrap()
}

/// Inserts a user directly, skipping password hashing.
#[cfg(test)]
pub(crate) async fn test_user(db_pool: &SqlitePool, name: &str) -> uuid::Uuid {
    let id = uuid::Uuid::now_v7();
    sqlx::query("INSERT INTO users (id,name,email,password_hash,created_at) VALUES (?,?,?,'x',?)")
        .bind(id)
        .bind(name)
        .bind(format!("{name}-{}@example.com", id.simple()))
        .bind(time::OffsetDateTime::now_utc())
        .execute(db_pool)
        .await
        .unwrap();
    id
}

/// A user with a saved profile of the given age and number of gallery images.
/// Returns `(user_id, profile_id)`.
#[cfg(test)]
pub(crate) async fn test_member(db_pool: &SqlitePool, name: &str, age: i64, images: usize) -> (uuid::Uuid, uuid::Uuid) {
    let user_id = test_user(db_pool, name).await;
    let profile_id = uuid::Uuid::now_v7();
    let now = time::OffsetDateTime::now_utc();

    sqlx::query("INSERT INTO profiles (id,user_id,name,age,bio,avatar_url,created_at,updated_at) VALUES (?,?,?,?,NULL,NULL,?,?)")
        .bind(profile_id)
        .bind(user_id)
        .bind(name)
        .bind(age)
        .bind(now)
        .bind(now)
        .execute(db_pool)
        .await
        .unwrap();

    for n in 0..images {
        sqlx::query("INSERT INTO images (id,profile_id,url,created_at) VALUES (?,?,?,?)")
            .bind(uuid::Uuid::now_v7())
            .bind(profile_id)
            .bind(format!("/uploads/{name}-{n}.png"))
            .bind(now)
            .execute(db_pool)
            .await
            .unwrap();
    }

    (user_id, profile_id)
}
