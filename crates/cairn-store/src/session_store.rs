use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;

use tokio::sync::RwLock;
use tracing::instrument;

use crate::persist::{mtime, read_or_default, write_atomic};
use crate::types::Session;
use crate::Result;

/// Owns every user's durable session state, guarded by a single async
/// `RwLock`. The backing store is a JSON file rewritten atomically on every
/// mutation.
pub struct SessionStore {
    path: PathBuf,
    sessions: RwLock<HashMap<String, Session>>,
    loaded_mtime: RwLock<Option<SystemTime>>,
}

impl SessionStore {
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: PathBuf) -> Self {
        let sessions: HashMap<String, Session> = read_or_default(&path, HashMap::new());
        let loaded_mtime = mtime(&path);
        Self {
            path,
            sessions: RwLock::new(sessions),
            loaded_mtime: RwLock::new(loaded_mtime),
        }
    }

    #[instrument(skip(self), fields(user = %user_handle))]
    pub async fn get_or_create(&self, user_handle: &str) -> Session {
        let guard = self.sessions.read().await;
        if let Some(s) = guard.get(user_handle) {
            return s.clone();
        }
        drop(guard);
        let mut guard = self.sessions.write().await;
        guard
            .entry(user_handle.to_string())
            .or_insert_with(|| Session::new(user_handle))
            .clone()
    }

    #[instrument(skip(self, session), fields(user = %session.user_handle))]
    pub async fn put(&self, mut session: Session) {
        session.last_updated = chrono::Utc::now();
        let mut guard = self.sessions.write().await;
        guard.insert(session.user_handle.clone(), session);
    }

    #[instrument(skip(self))]
    pub async fn save(&self) -> Result<()> {
        let guard = self.sessions.read().await;
        write_atomic(&self.path, &*guard)?;
        drop(guard);
        *self.loaded_mtime.write().await = mtime(&self.path);
        Ok(())
    }

    /// Re-reads the file if its mtime has advanced since the last load,
    /// merging per-user records with precedence to the newer
    /// `last_updated` timestamp. Required because several processes on the
    /// same host may share this file.
    #[instrument(skip(self))]
    pub async fn sync_from_disk(&self) -> Result<()> {
        let current = mtime(&self.path);
        let loaded = *self.loaded_mtime.read().await;
        if current.is_none() || current == loaded {
            return Ok(());
        }
        let on_disk: HashMap<String, Session> = read_or_default(&self.path, HashMap::new());
        let mut guard = self.sessions.write().await;
        for (user, disk_session) in on_disk {
            match guard.get(&user) {
                Some(existing) if existing.last_updated >= disk_session.last_updated => {}
                _ => {
                    guard.insert(user, disk_session);
                }
            }
        }
        drop(guard);
        *self.loaded_mtime.write().await = current;
        Ok(())
    }
}
