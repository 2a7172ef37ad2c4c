use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{routing::post, Router};

use crate::{AppResult, AppState};

mod login;
mod logout;
mod signup;

pub use signup::{signup, SignupForm};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup::signup_handler))
        .route("/login", post(login::login))
        .route("/logout", post(logout::logout))
}

pub(crate) async fn hash_password(password: String) -> AppResult<String> {
    let hash = tokio::task::spawn_blocking(move || {
        let salt = SaltString::encode_b64(&rand::random::<[u8; 16]>())
            .map_err(|e| anyhow::anyhow!("salt: {e}"))?;
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| anyhow::anyhow!("hashing password: {e}"))
    })
    .await??;

    Ok(hash)
}

pub(crate) async fn verify_password(password: String, hash: String) -> AppResult<bool> {
    let valid = tokio::task::spawn_blocking(move || {
        let Ok(parsed) = PasswordHash::new(&hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
    .await?;

    Ok(valid)
}
