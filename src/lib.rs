pub mod appresult;
pub mod auth;
pub mod config;
pub mod db;
pub mod matches;
pub mod messages;
pub mod models;
pub mod objects;
pub mod profiles;
pub mod session;
pub mod swipe;

use std::sync::Arc;

use axum::{
    extract::FromRef,
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    Router,
};
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};

pub use appresult::{AppError, AppResult};

use config::Config;
use objects::ObjectStore;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub objects: Arc<dyn ObjectStore>,
    pub config: Arc<Config>,
}

/// Every route, with sessions, request tracing and the upload directory mounted.
pub fn app(state: AppState) -> anyhow::Result<Router> {
    let config = state.config.clone();

    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(config.secure_cookies)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(config.session_inactivity_minutes)));

    let mut app = Router::new()
        .merge(auth::router())
        .merge(profiles::router(config.max_upload_bytes))
        .merge(swipe::router())
        .merge(matches::router())
        .merge(messages::router())
        .nest_service(&config.upload_url_prefix, ServeDir::new(&config.upload_dir))
        .with_state(state)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http());

    if let Some(origin) = &config.cors_origin {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(origin.parse::<HeaderValue>()?)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([CONTENT_TYPE])
                .allow_credentials(true),
        );
    }

    Ok(app)
}
