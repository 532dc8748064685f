use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One member of the cluster, as persisted in `cluster_registry.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub username: String,
    pub last_updated: DateTime<Utc>,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    pub nodes: Vec<Node>,
}
