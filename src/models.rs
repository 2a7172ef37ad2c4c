use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub const DEFAULT_NAME: &str = "Anonymous";
pub const DEFAULT_BIO: &str = "No bio available.";
pub const DEFAULT_AVATAR: &str = "/default-avatar.png";

pub const WELCOME_MESSAGE: &str = "You have a new match! Start chatting!";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub age: i64,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    /// Gallery in upload order.
    #[sqlx(skip)]
    pub images: Vec<Image>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub profile_id: Uuid,
    pub url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Disposition {
    Like,
    Dislike,
}

impl FromStr for Disposition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(Disposition::Like),
            "dislike" => Ok(Disposition::Dislike),
            other => Err(format!("unknown action {other:?}, expected \"like\" or \"dislike\"")),
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Disposition::Like => "like",
            Disposition::Dislike => "dislike",
        })
    }
}

/// Mutual like between two users. The pair is stored low id first so both
/// participants see the same row.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Match {
    pub id: Uuid,
    pub user_low: Uuid,
    pub user_high: Uuid,
    pub created_at: OffsetDateTime,
}

impl Match {
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.user_low == user_id || self.user_high == user_id
    }
}

pub fn canonical_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a < b { (a, b) } else { (b, a) }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub match_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub content: String,
    pub is_system: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Participant {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRef {
    pub id: Uuid,
    pub url: String,
}

/// What the discovery feed shows for a candidate. Never carries an empty field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSummary {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub age: i64,
    pub bio: String,
    pub avatar_url: String,
    pub first_image: String,
    pub images: Vec<ImageRef>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl From<Profile> for ProfileSummary {
    fn from(profile: Profile) -> Self {
        let first_image = profile
            .images
            .first()
            .map(|image| image.url.clone())
            .unwrap_or_else(|| DEFAULT_AVATAR.to_owned());

        ProfileSummary {
            id: profile.id,
            user_id: profile.user_id,
            name: non_blank(Some(profile.name)).unwrap_or_else(|| DEFAULT_NAME.to_owned()),
            age: profile.age,
            bio: non_blank(profile.bio).unwrap_or_else(|| DEFAULT_BIO.to_owned()),
            avatar_url: non_blank(profile.avatar_url).unwrap_or_else(|| DEFAULT_AVATAR.to_owned()),
            first_image,
            images: profile
                .images
                .into_iter()
                .map(|Image { id, url, .. }| ImageRef { id, url })
                .collect(),
        }
    }
}
