//! Where uploaded image bytes live. Records only ever hold the URL that
//! [`ObjectStore::put`] hands back.

use std::path::PathBuf;

use anyhow::{bail, Context};
use async_trait::async_trait;
use axum::body::Bytes;
use tokio::fs;
use uuid::Uuid;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Persists the bytes and returns the URL they can be fetched from.
    async fn put(&self, data: Bytes, content_type: &str) -> anyhow::Result<String>;

    /// Releases the object behind a URL previously returned by `put`.
    async fn delete(&self, url: &str) -> anyhow::Result<()>;
}

/// Files under a directory that is served statically at `url_prefix`.
pub struct LocalObjectStore {
    root: PathBuf,
    url_prefix: String,
}

impl LocalObjectStore {
    pub async fn new(root: impl Into<PathBuf>, url_prefix: impl Into<String>) -> anyhow::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .with_context(|| format!("creating upload dir {}", root.display()))?;

        Ok(Self {
            root,
            url_prefix: url_prefix.into().trim_end_matches('/').to_owned(),
        })
    }

    fn path_for(&self, url: &str) -> anyhow::Result<PathBuf> {
        let Some(name) = url
            .strip_prefix(&self.url_prefix)
            .and_then(|rest| rest.strip_prefix('/'))
        else {
            bail!("{url} is not served from {}", self.url_prefix);
        };

        // flat directory, so anything with a separator did not come from us
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            bail!("refusing object name {name:?}");
        }

        Ok(self.root.join(name))
    }
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" => "jpg",
        _ => mime_guess::get_mime_extensions_str(content_type)
            .and_then(|exts| exts.first().copied())
            .unwrap_or("bin"),
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, data: Bytes, content_type: &str) -> anyhow::Result<String> {
        let name = format!("{}.{}", Uuid::now_v7().simple(), extension_for(content_type));
        fs::write(self.root.join(&name), &data)
            .await
            .with_context(|| format!("writing object {name}"))?;

        Ok(format!("{}/{name}", self.url_prefix))
    }

    async fn delete(&self, url: &str) -> anyhow::Result<()> {
        let path = self.path_for(url)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
        }
    }
}
