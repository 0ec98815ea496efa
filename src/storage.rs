//! JSON document persistence shared by the stores.
//!
//! Documents are loaded once at startup and rewritten in full after every
//! mutation. A missing file means "empty"; a corrupt one is moved aside to
//! `<name>.bak` and also treated as empty, so bad state on disk never stops
//! the bot from starting.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Read `path` as JSON, falling back to `T::default()` when the file is
/// missing, unreadable or malformed.
pub async fn load_or_default<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no persisted state, starting empty");
            return T::default();
        }
        Err(e) => {
            tracing::warn!(error = ?e, path = %path.display(), "persisted state unreadable, starting empty");
            return T::default();
        }
    };

    match serde_json::from_slice(&raw) {
        Ok(v) => v,
        Err(e) => {
            let backup = backup_path(path);
            tracing::warn!(
                error = %e,
                path = %path.display(),
                backup = %backup.display(),
                "persisted state corrupt, starting empty"
            );
            if let Err(e) = tokio::fs::rename(path, &backup).await {
                tracing::warn!(error = ?e, "could not move corrupt file aside");
            }
            T::default()
        }
    }
}

/// Rewrite `path` with `value`. Goes through a sibling temp file + rename so a
/// crash mid-write leaves either the old or the new document.
pub async fn save<T>(path: &Path, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("create {}", dir.display()))?;
    }

    let body = serde_json::to_vec_pretty(value)?;
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, &body)
        .await
        .with_context(|| format!("write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

fn backup_path(path: &Path) -> PathBuf {
    path.with_extension("bak")
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
