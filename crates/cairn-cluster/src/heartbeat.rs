use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::registry::get_my_position;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Calls `get_my_position` immediately, then on every tick of
/// `HEARTBEAT_INTERVAL` until `cancel` fires. A 5-minute cadence is plenty
/// — the heartbeat period only needs to stay well under the registry's
/// liveness TTL.
pub async fn run_heartbeat(registry_path: PathBuf, username: String, cancel: CancellationToken) {
    let tick = |username: &str| {
        match get_my_position(&registry_path, username, Utc::now()) {
            Ok((index, total)) => info!(index, total, "cluster heartbeat"),
            Err(e) => error!(error = %e, "cluster heartbeat failed"),
        }
    };

    tick(&username);

    let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
    interval.tick().await; // first tick fires immediately; already handled above
    loop {
        tokio::select! {
            _ = interval.tick() => tick(&username),
            _ = cancel.cancelled() => {
                info!("cluster heartbeat stopped");
                break;
            }
        }
    }
}
