//! JSON snapshots of the article store.
//!
//! The whole store is written as one JSON array to
//! `<store_dir>/articles.json`. Writes go to a temporary sibling first and
//! are renamed into place, so an interrupted save never leaves a truncated
//! snapshot behind.

use crate::error::StoreError;
use crate::models::Article;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument, warn};

pub const SNAPSHOT_FILE: &str = "articles.json";

/// `<store_dir>/articles.json`
pub fn snapshot_path(store_dir: impl AsRef<Path>) -> PathBuf {
    store_dir.as_ref().join(SNAPSHOT_FILE)
}

/// Read a snapshot. A missing file is an empty store.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn read_snapshot(path: &Path) -> Result<Vec<Article>, StoreError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("No snapshot found; starting with an empty store");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };
    let articles: Vec<Article> = serde_json::from_slice(&bytes)?;
    info!(count = articles.len(), "Loaded snapshot");
    Ok(articles)
}

/// Write `articles` as a snapshot, creating parent directories as needed.
#[instrument(level = "info", skip_all, fields(path = %path.display(), count = articles.len()))]
pub async fn write_snapshot(path: &Path, articles: &[Article]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(articles)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).await?;
    fs::rename(&tmp, path).await?;
    info!("Wrote snapshot");
    Ok(())
}
