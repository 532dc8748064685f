use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use tracing::instrument;

use crate::persist::{mtime, read_or_default, write_atomic};
use crate::types::Fact;
use crate::Result;

/// Owns the flat fact list. Upsert is keyed on (target, key); eviction
/// drops anything past the retention window, then trims the oldest
/// remaining facts down to the configured cap.
pub struct FactStore {
    path: PathBuf,
    facts: RwLock<Vec<Fact>>,
    loaded_mtime: RwLock<Option<SystemTime>>,
    retention_days: i64,
    max_facts: usize,
}

impl FactStore {
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: PathBuf, retention_days: i64, max_facts: usize) -> Self {
        let facts: Vec<Fact> = read_or_default(&path, Vec::new());
        let loaded_mtime = mtime(&path);
        Self {
            path,
            facts: RwLock::new(facts),
            loaded_mtime: RwLock::new(loaded_mtime),
            retention_days,
            max_facts,
        }
    }

    #[instrument(skip(self, fact), fields(target = %fact.target, key = %fact.key))]
    pub async fn add(&self, fact: Fact) {
        let mut guard = self.facts.write().await;
        match guard
            .iter_mut()
            .find(|f| f.identity() == fact.identity())
        {
            Some(existing) if existing.timestamp > fact.timestamp => {}
            Some(existing) => *existing = fact,
            None => guard.push(fact),
        }
    }

    pub async fn get_by_target(&self, target: &str) -> Vec<Fact> {
        let guard = self.facts.read().await;
        let mut out: Vec<Fact> = guard
            .iter()
            .filter(|f| f.target == target)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        out
    }

    pub async fn get_value(&self, target: &str, key: &str) -> Option<String> {
        let guard = self.facts.read().await;
        guard
            .iter()
            .find(|f| f.target == target && f.key == key)
            .map(|f| f.value.clone())
    }

    #[instrument(skip(self))]
    pub async fn evict(&self) {
        let cutoff = Utc::now() - Duration::days(self.retention_days);
        let mut guard = self.facts.write().await;
        guard.retain(|f| f.timestamp >= cutoff);
        if guard.len() > self.max_facts {
            guard.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            guard.truncate(self.max_facts);
        }
    }

    #[instrument(skip(self))]
    pub async fn save(&self) -> Result<()> {
        let guard = self.facts.read().await;
        write_atomic(&self.path, &*guard)?;
        drop(guard);
        *self.loaded_mtime.write().await = mtime(&self.path);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn sync_from_disk(&self) -> Result<()> {
        let current = mtime(&self.path);
        let loaded = *self.loaded_mtime.read().await;
        if current.is_none() || current == loaded {
            return Ok(());
        }
        let on_disk: Vec<Fact> = read_or_default(&self.path, Vec::new());
        let mut guard = self.facts.write().await;
        for disk_fact in on_disk {
            match guard.iter_mut().find(|f| f.identity() == disk_fact.identity()) {
                Some(existing) if existing.timestamp >= disk_fact.timestamp => {}
                Some(existing) => *existing = disk_fact,
                None => guard.push(disk_fact),
            }
        }
        drop(guard);
        *self.loaded_mtime.write().await = current;
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.facts.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::types::SourceType;
    use chrono::TimeZone;

    fn fact(target: &str, key: &str, value: &str, ts: i64) -> Fact {
        Fact {
            target: target.to_string(),
            target_display_name: target.to_string(),
            author: "alice".to_string(),
            key: key.to_string(),
            value: value.to_string(),
            timestamp: Utc.timestamp_opt(ts, 0).unwrap(),
            source_type: SourceType::Mention,
            source_url: None,
            post_author: None,
        }
    }

    #[tokio::test]
    async fn upsert_keeps_newer_timestamp_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = FactStore::load(dir.path().join("facts.json"), 365, 1000);
        store.add(fact("alice", "likes_coffee", "yes", 1)).await;
        store
            .add(fact("alice", "likes_coffee", "strongly yes", 3))
            .await;
        assert_eq!(store.len().await, 1);
        assert_eq!(
            store.get_value("alice", "likes_coffee").await.unwrap(),
            "strongly yes"
        );
    }

    #[tokio::test]
    async fn older_timestamp_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = FactStore::load(dir.path().join("facts.json"), 365, 1000);
        store.add(fact("alice", "k", "new", 10)).await;
        store.add(fact("alice", "k", "stale", 5)).await;
        assert_eq!(store.get_value("alice", "k").await.unwrap(), "new");
    }

    #[tokio::test]
    async fn evict_drops_old_and_over_cap() {
        let dir = tempfile::tempdir().unwrap();
        let store = FactStore::load(dir.path().join("facts.json"), 3650, 1);
        store.add(fact("a", "k1", "v", Utc::now().timestamp())).await;
        store.add(fact("b", "k2", "v", Utc::now().timestamp())).await;
        store.evict().await;
        assert_eq!(store.len().await, 1);
    }
}
