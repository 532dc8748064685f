use std::time::Duration;

use serde::Deserialize;

/// Tunables for `FactCollector`, named after the `FACT_COLLECTION_*` config
/// keys they're built from.
#[derive(Debug, Clone)]
pub struct FactCollectionConfig {
    pub max_per_hour: usize,
    pub max_workers: usize,
    pub from_post_content: bool,
    pub max_fact_tokens: u32,
    pub dedup_cache_ttl: Duration,
}

/// One item of the JSON array the extraction prompt is required to return.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedFact {
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub target_user_name: Option<String>,
    pub key: String,
    pub value: String,
}

/// A verified peer's profile, used to synthesize a `colleague_profile` fact.
#[derive(Debug, Clone)]
pub struct PeerProfile {
    pub name: String,
    pub bio: String,
}
