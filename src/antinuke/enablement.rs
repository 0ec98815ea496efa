use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Result;
use tokio::sync::RwLock;

use crate::storage;

/// Guilds that opted in to antinuke detection.
///
/// The set is written back in full after every `enable`/`disable` while the
/// write lock is held; the in-memory set only changes once the write
/// succeeded, so memory and file never disagree.
/// A missing or corrupt file loads as the empty set: protection is opt-in.
#[derive(Debug)]
pub struct EnabledGuilds {
    path: PathBuf,
    guilds: RwLock<BTreeSet<u64>>,
}

impl EnabledGuilds {
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let guilds: BTreeSet<u64> = storage::load_or_default(&path).await;
        tracing::info!(count = guilds.len(), path = %path.display(), "antinuke guild set loaded");
        Self {
            path,
            guilds: RwLock::new(guilds),
        }
    }

    pub async fn is_enabled(&self, guild_id: u64) -> bool {
        self.guilds.read().await.contains(&guild_id)
    }

    /// Returns `true` if the guild was not enabled before.
    pub async fn enable(&self, guild_id: u64) -> Result<bool> {
        self.update(|set| set.insert(guild_id)).await
    }

    /// Returns `true` if the guild was enabled before.
    pub async fn disable(&self, guild_id: u64) -> Result<bool> {
        self.update(|set| set.remove(&guild_id)).await
    }

    pub async fn snapshot(&self) -> Vec<u64> {
        self.guilds.read().await.iter().copied().collect()
    }

    async fn update(&self, f: impl FnOnce(&mut BTreeSet<u64>) -> bool) -> Result<bool> {
        let mut set = self.guilds.write().await;
        let mut next = set.clone();
        let changed = f(&mut next);
        // idempotent calls still rewrite the file
        storage::save(&self.path, &next).await?;
        *set = next;
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enable_disable_roundtrip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("enabled.json");

        let store = EnabledGuilds::load(&path).await;
        assert!(store.enable(7).await.unwrap());
        assert!(!store.enable(7).await.unwrap());
        assert!(store.enable(3).await.unwrap());
        assert!(store.disable(3).await.unwrap());
        assert!(!store.disable(3).await.unwrap());

        let reloaded = EnabledGuilds::load(&path).await;
        assert!(reloaded.is_enabled(7).await);
        assert!(!reloaded.is_enabled(3).await);
        assert_eq!(reloaded.snapshot().await, vec![7]);
    }

    #[tokio::test]
    async fn file_is_a_plain_id_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("enabled.json");
        let store = EnabledGuilds::load(&path).await;
        store.enable(20).await.unwrap();
        store.enable(10).await.unwrap();

        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        let ids: Vec<u64> = serde_json::from_str(&raw).unwrap();
        assert_eq!(ids, vec![10, 20]);
    }

    #[tokio::test]
    async fn failed_persist_keeps_previous_set() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let store = EnabledGuilds::load(blocker.join("enabled.json")).await;

        assert!(store.enable(5).await.is_err());
        assert!(!store.is_enabled(5).await);
        assert!(store.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn idempotent_enable_rewrites_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("enabled.json");
        let store = EnabledGuilds::load(&path).await;

        assert!(store.enable(9).await.unwrap());
        tokio::fs::remove_file(&path).await.unwrap();

        assert!(!store.enable(9).await.unwrap());
        let reloaded = EnabledGuilds::load(&path).await;
        assert_eq!(reloaded.snapshot().await, vec![9]);
    }
}
