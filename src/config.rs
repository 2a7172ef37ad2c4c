use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use anyhow::{anyhow, Context};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_url: String,
    pub database_max_connections: u32,

    pub upload_dir: PathBuf,
    pub upload_url_prefix: String,
    pub max_upload_bytes: usize,

    pub session_inactivity_minutes: i64,
    pub secure_cookies: bool,
    pub cors_origin: Option<String>,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Ok(Self {
            bind_addr: try_load("BIND_ADDR", "0.0.0.0:8080")?,
            database_url: try_load("DATABASE_URL", "sqlite://tinderbox.db")?,
            database_max_connections: try_load("DATABASE_MAX_CONNECTIONS", "16")?,

            upload_dir: try_load("UPLOAD_DIR", "./uploads")?,
            upload_url_prefix: try_load::<String>("UPLOAD_URL_PREFIX", "/uploads")?
                .trim_end_matches('/')
                .to_owned(),
            max_upload_bytes: try_load("MAX_UPLOAD_BYTES", "26214400")?,

            session_inactivity_minutes: try_load("SESSION_INACTIVITY_MINUTES", "60")?,
            secure_cookies: try_load("SECURE_COOKIES", "false")?,
            cors_origin: env::var("CORS_ORIGIN").ok().filter(|origin| !origin.is_empty()),
        })
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_owned()
    });

    raw.parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
            anyhow!("{e}")
        })
        .with_context(|| format!("environment variable {key} is misconfigured"))
}
