use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::time::SystemTime;

use serde::Serialize;
use tracing::warn;

use crate::error::{Result, StoreError};

/// Serializes `value` and atomically replaces the contents of `path`:
/// marshal, write to `<path>.tmp`, fsync, then rename over the target.
/// A reader can never observe a torn write.
pub fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let body = serde_json::to_vec_pretty(value)?;
    let tmp_path = path.with_extension("tmp");
    {
        let mut f = File::create(&tmp_path)?;
        f.write_all(&body)?;
        f.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Reads and parses `path`. Missing file returns `default`; a parse failure
/// is logged and also returns `default` rather than propagating, per the
/// "proceed with empty state, leave the bad file alone" read protocol.
pub fn read_or_default<T>(path: &Path, default: T) -> T
where
    T: for<'de> serde::Deserialize<'de>,
{
    match fs::read(path) {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(v) => v,
            Err(e) => {
                warn!(?path, error = %e, "failed to parse store file, starting from empty state");
                default
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => default,
        Err(e) => {
            warn!(?path, error = %e, "failed to read store file, starting from empty state");
            default
        }
    }
}

pub fn mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(StoreError::from)?;
    }
    Ok(())
}
