use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;
use uuid::Uuid;

use crate::AppError;

pub const USER_ID: &str = "user_id";

/// The logged-in user, resolved from the session cookie.
///
/// Handlers hand the inner id to the operations they call; nothing below the
/// handler layer touches the session.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub Uuid);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| anyhow::anyhow!(msg))?;

        match session.get::<Uuid>(USER_ID).await? {
            Some(user_id) => Ok(CurrentUser(user_id)),
            None => Err(AppError::unauthorized()),
        }
    }
}
