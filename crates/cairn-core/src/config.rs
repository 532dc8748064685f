use std::path::{Path, PathBuf};

use figment::{providers::Env, Figment};
use serde::{Deserialize, Serialize};

use crate::error::{CairnError, Result};

/// Process-wide configuration, loaded from a shared `.env` and an optional
/// per-instance `.env.<name>` file (per-instance keys win), then mapped onto
/// this struct through `figment::providers::Env`. Every field here is a
/// required key per the external interface contract: there are no implicit
/// defaults for operator-facing settings, only for the few knobs marked
/// optional below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CairnConfig {
    pub mastodon_server: String,
    pub mastodon_access_token: String,
    pub bot_username: String,

    pub llm_provider: LlmProviderKind,
    pub anthropic_auth_token: Option<String>,
    pub anthropic_base_url: Option<String>,
    pub anthropic_default_model: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: Option<String>,

    pub character_prompt: String,
    #[serde(default = "default_temperature")]
    pub llm_temperature: f32,

    #[serde(default)]
    pub allow_remote_users: bool,
    #[serde(default = "bool_true")]
    pub enable_fact_store: bool,
    #[serde(default)]
    pub enable_image_recognition: bool,
    #[serde(default)]
    pub enable_image_generation: bool,

    pub broadcast_command: String,

    pub conversation_message_compress_threshold: usize,
    pub conversation_message_keep_count: usize,
    pub conversation_min_keep_count: usize,
    pub conversation_idle_hours: i64,
    pub conversation_retention_hours: i64,

    pub max_response_tokens: u32,
    pub max_summary_tokens: u32,
    pub max_fact_tokens: u32,
    pub max_image_tokens: u32,
    #[serde(default = "default_max_post_chars")]
    pub max_post_chars: usize,

    #[serde(default)]
    pub auto_post_interval_hours: i64,
    #[serde(default = "default_visibility")]
    pub auto_post_visibility: String,

    pub fact_retention_days: i64,
    pub max_facts: usize,

    #[serde(default = "bool_true")]
    pub fact_collection_enabled: bool,
    #[serde(default = "bool_true")]
    pub fact_collection_federated: bool,
    #[serde(default = "bool_true")]
    pub fact_collection_home: bool,
    #[serde(default)]
    pub fact_collection_from_post_content: bool,
    #[serde(default)]
    pub url_blacklist: String,
    pub fact_collection_max_workers: usize,
    pub fact_collection_max_per_hour: usize,

    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,
    #[serde(default = "default_fact_store_file")]
    pub fact_store_file: PathBuf,
    #[serde(default = "default_bot_profile_file")]
    pub bot_profile_file: PathBuf,
    #[serde(default = "default_timezone")]
    pub timezone: String,

    pub slack_bot_token: Option<String>,
    pub slack_channel_id: Option<String>,
    pub slack_error_channel_id: Option<String>,

    pub metrics_log_file: Option<PathBuf>,
    #[serde(default = "default_metrics_interval")]
    pub metrics_log_interval_minutes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    Claude,
    Gemini,
}

fn bool_true() -> bool {
    true
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_post_chars() -> usize {
    480
}
fn default_visibility() -> String {
    "public".to_string()
}
fn default_session_file() -> PathBuf {
    PathBuf::from("data/session.json")
}
fn default_fact_store_file() -> PathBuf {
    PathBuf::from("data/facts.json")
}
fn default_bot_profile_file() -> PathBuf {
    PathBuf::from("data/Profile.txt")
}
fn default_timezone() -> String {
    "UTC".to_string()
}
fn default_metrics_interval() -> u64 {
    60
}

impl CairnConfig {
    /// Loads the shared env file, then the per-instance override (if it
    /// exists), then reads the resulting process environment into this
    /// struct. Missing required keys are a fatal startup error, never a
    /// silent default, matching the "fatal at startup" failure class.
    pub fn load(shared_env: &Path, instance_env: Option<&Path>) -> Result<Self> {
        if shared_env.exists() {
            dotenvy::from_path(shared_env)
                .map_err(|e| CairnError::Config(format!("reading {shared_env:?}: {e}")))?;
        }
        if let Some(path) = instance_env {
            if path.exists() {
                dotenvy::from_path_override(path)
                    .map_err(|e| CairnError::Config(format!("reading {path:?}: {e}")))?;
            }
        }

        Figment::new()
            .merge(Env::raw().lowercase(true))
            .extract()
            .map_err(|e| CairnError::Config(e.to_string()))
    }

    pub fn data_dir(&self) -> PathBuf {
        self.session_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("data"))
    }
}
