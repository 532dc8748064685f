use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use tracing::warn;

use crate::error::{ClusterError, Result};
use crate::types::{Node, Registry};

const HEARTBEAT_TTL_HOURS: i64 = 7;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(900);

fn lock_path(registry_path: &Path) -> PathBuf {
    let mut s = registry_path.as_os_str().to_owned();
    s.push(".lock");
    PathBuf::from(s)
}

/// Acquires the advisory lock beside `registry_path`, retrying once on
/// contention (total wait under the ~2s budget), released on drop.
struct RegistryLock(File);

impl RegistryLock {
    fn acquire(registry_path: &Path) -> Result<Self> {
        let path = lock_path(registry_path);
        let file = OpenOptions::new().create(true).write(true).open(&path)?;
        if file.try_lock_exclusive().is_ok() {
            return Ok(Self(file));
        }
        warn!(?path, "registry lock busy, retrying once");
        std::thread::sleep(LOCK_RETRY_DELAY);
        file.try_lock_exclusive().map_err(|_| ClusterError::LockBusy)?;
        Ok(Self(file))
    }
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.0);
    }
}

fn read_registry(path: &Path) -> Registry {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            warn!(?path, error = %e, "cluster registry corrupt, starting from empty view");
            Registry::default()
        }),
        Err(_) => Registry::default(),
    }
}

fn write_registry(path: &Path, registry: &Registry) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let body = serde_json::to_vec_pretty(registry)?;
    let tmp = path.with_extension("tmp");
    {
        let mut f = File::create(&tmp)?;
        f.write_all(&body)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Loads the registry, drops stale nodes, dedupes, upserts `username` as
/// present `now`, writes the result back atomically, and returns
/// `(index_of_self, total_nodes)` in the sorted order.
///
/// Held under the registry's advisory file lock for the full
/// read-modify-write so concurrent bots never race each other's view.
pub fn get_my_position(registry_path: &Path, username: &str, now: DateTime<Utc>) -> Result<(usize, usize)> {
    let _lock = RegistryLock::acquire(registry_path)?;

    let mut registry = read_registry(registry_path);
    let cutoff = now - chrono::Duration::hours(HEARTBEAT_TTL_HOURS);
    registry.nodes.retain(|n| n.last_updated >= cutoff);

    dedupe_keep_latest(&mut registry.nodes);

    match registry.nodes.iter_mut().find(|n| n.username == username) {
        Some(existing) => existing.last_updated = now,
        None => registry.nodes.push(Node {
            username: username.to_string(),
            last_updated: now,
            joined_at: now,
        }),
    }

    registry
        .nodes
        .sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.username.cmp(&b.username)));

    write_registry(registry_path, &registry)?;

    let total = registry.nodes.len();
    let index = registry
        .nodes
        .iter()
        .position(|n| n.username == username)
        .unwrap_or(total.saturating_sub(1));
    Ok((index, total))
}

/// Collapses duplicate usernames, keeping the greatest `last_updated` and
/// the earliest `joined_at` seen for that username.
fn dedupe_keep_latest(nodes: &mut Vec<Node>) {
    let mut by_name: std::collections::HashMap<String, Node> = std::collections::HashMap::new();
    for node in nodes.drain(..) {
        by_name
            .entry(node.username.clone())
            .and_modify(|existing| {
                if node.last_updated > existing.last_updated {
                    existing.last_updated = node.last_updated;
                }
                if node.joined_at < existing.joined_at {
                    existing.joined_at = node.joined_at;
                }
            })
            .or_insert(node);
    }
    nodes.extend(by_name.into_values());
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dt(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn scenario_s6_registry_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster_registry.json");
        let registry = Registry {
            nodes: vec![
                Node {
                    username: "alice".into(),
                    last_updated: dt(2024, 3, 1),
                    joined_at: dt(2024, 1, 1),
                },
                Node {
                    username: "bob".into(),
                    last_updated: dt(2024, 3, 1),
                    joined_at: dt(2024, 2, 1),
                },
                Node {
                    username: "carol-expired".into(),
                    last_updated: dt(2024, 3, 1) - chrono::Duration::hours(8),
                    joined_at: dt(2023, 12, 1),
                },
            ],
        };
        write_registry(&path, &registry).unwrap();

        let now = dt(2024, 3, 1);
        let (index, total) = get_my_position(&path, "dave", now).unwrap();
        assert_eq!((index, total), (2, 3));

        let on_disk = read_registry(&path);
        let usernames: Vec<&str> = on_disk.nodes.iter().map(|n| n.username.as_str()).collect();
        assert_eq!(usernames, vec!["alice", "bob", "dave"]);
        let dave = on_disk.nodes.iter().find(|n| n.username == "dave").unwrap();
        assert_eq!(dave.joined_at, now);
    }

    #[test]
    fn property_9_position_deterministic_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster_registry.json");
        let now = dt(2024, 6, 1);
        get_my_position(&path, "alice", now).unwrap();
        get_my_position(&path, "bob", now).unwrap();
        let (bob_index, total) = get_my_position(&path, "bob", now).unwrap();
        assert_eq!((bob_index, total), (1, 2));
    }

    #[test]
    fn dedupe_keeps_latest_update_and_earliest_join() {
        let mut nodes = vec![
            Node {
                username: "alice".into(),
                last_updated: dt(2024, 1, 1),
                joined_at: dt(2024, 2, 1),
            },
            Node {
                username: "alice".into(),
                last_updated: dt(2024, 3, 1),
                joined_at: dt(2024, 1, 1),
            },
        ];
        dedupe_keep_latest(&mut nodes);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].last_updated, dt(2024, 3, 1));
        assert_eq!(nodes[0].joined_at, dt(2024, 1, 1));
    }
}
