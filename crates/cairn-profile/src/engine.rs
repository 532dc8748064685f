use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use cairn_llm::{LlmProvider, Message as LlmMessage, Role as LlmRole};
use cairn_mastodon::{rebuild_managed_fields, truncate_profile_body, MicroblogGateway};
use cairn_store::FactStore;

use crate::error::Result;
use crate::types::{AutoPostConfig, Metrics, MetricsConfig, ProfileConfig};

const SYNTHESIS_SYSTEM_PROMPT: &str =
    "Write a short self-introduction in character, drawing only on the facts listed below. \
No preamble, no markdown, just the introduction text.";

const AUTO_POST_SYSTEM_PROMPT: &str =
    "Write a short, in-character post about the fact below. No preamble, no markdown.";

/// Drives three independent timers: profile refresh, optional auto-post,
/// and metrics emission. Each is a standalone `tokio::select!` tick loop;
/// all three share one `CancellationToken`.
pub struct ProfileEngine {
    gateway: Arc<dyn MicroblogGateway>,
    llm: Arc<dyn LlmProvider>,
    fact_store: Arc<FactStore>,
    metrics: Arc<Metrics>,
    own_username: String,
    own_target: String,
    character_prompt: String,
    profile: ProfileConfig,
    auto_post: AutoPostConfig,
    metrics_config: MetricsConfig,
}

impl ProfileEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gateway: Arc<dyn MicroblogGateway>,
        llm: Arc<dyn LlmProvider>,
        fact_store: Arc<FactStore>,
        metrics: Arc<Metrics>,
        own_username: String,
        own_target: String,
        character_prompt: String,
        profile: ProfileConfig,
        auto_post: AutoPostConfig,
        metrics_config: MetricsConfig,
    ) -> Self {
        Self {
            gateway,
            llm,
            fact_store,
            metrics,
            own_username,
            own_target,
            character_prompt,
            profile,
            auto_post,
            metrics_config,
        }
    }

    pub async fn run_profile_refresh(&self, cancel: CancellationToken) {
        let period = StdDuration::from_secs((self.profile.refresh_interval_hours.max(1) as u64) * 3600);
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.synthesize_and_update_profile().await {
                        warn!(error = %e, "profile refresh failed");
                        self.metrics.record_error();
                    }
                }
                _ = cancel.cancelled() => {
                    info!("profile refresh loop stopped");
                    break;
                }
            }
        }
    }

    async fn synthesize_and_update_profile(&self) -> Result<()> {
        let facts = self.fact_store.get_by_target(&self.own_target).await;
        let transcript = facts
            .iter()
            .map(|f| format!("{}: {}", f.key, f.value))
            .collect::<Vec<_>>()
            .join("\n");

        let system_prompt = format!("{SYNTHESIS_SYSTEM_PROMPT}\n\n{}", self.character_prompt);
        let messages = [LlmMessage {
            role: LlmRole::User,
            content: transcript,
            images: Vec::new(),
        }];
        self.metrics.record_llm_call();
        let body = self
            .llm
            .generate_text(&messages, &system_prompt, self.profile.max_response_tokens)
            .await?;

        let truncated = truncate_profile_body(&body, &self.profile.disclaimer, self.profile.profile_budget_chars);
        let note = format!("{truncated}{}", self.profile.disclaimer);
        self.gateway.update_profile(&note).await?;

        let account = self.gateway.get_account_by_username(&self.own_username).await?;
        let fields = rebuild_managed_fields(
            &account.fields,
            &self.profile.system_id,
            true,
            &self.profile.model_identifier,
            &self.profile.timezone,
            Utc::now(),
        );
        self.gateway.update_profile_fields(fields).await?;

        info!("profile refreshed");
        Ok(())
    }

    pub async fn run_auto_post(&self, cancel: CancellationToken) {
        if self.auto_post.interval_hours <= 0 {
            info!("auto-post disabled");
            return;
        }
        let period = StdDuration::from_secs((self.auto_post.interval_hours as u64) * 3600);
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.auto_post_once().await {
                        warn!(error = %e, "auto-post failed");
                        self.metrics.record_error();
                    }
                }
                _ = cancel.cancelled() => {
                    info!("auto-post loop stopped");
                    break;
                }
            }
        }
    }

    async fn auto_post_once(&self) -> Result<()> {
        let facts = self.fact_store.get_by_target(&self.own_target).await;
        let Some(fact) = facts.into_iter().next() else {
            info!("auto-post skipped: no facts on file yet");
            return Ok(());
        };

        let system_prompt = format!("{AUTO_POST_SYSTEM_PROMPT}\n\n{}", self.character_prompt);
        let messages = [LlmMessage {
            role: LlmRole::User,
            content: format!("{}: {}", fact.key, fact.value),
            images: Vec::new(),
        }];
        self.metrics.record_llm_call();
        let body = self.llm.generate_text(&messages, &system_prompt, 300).await?;

        let text = format!("{body}\n\n{}", self.auto_post.bot_tag);
        self.gateway.post_status(&text, &self.auto_post.visibility, None).await?;
        info!("auto-post published");
        Ok(())
    }

    pub async fn run_metrics(&self, cancel: CancellationToken) {
        let period = StdDuration::from_secs((self.metrics_config.interval_minutes.max(1) as u64) * 60);
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = interval.tick() => self.emit_metrics().await,
                _ = cancel.cancelled() => {
                    info!("metrics loop stopped");
                    break;
                }
            }
        }
    }

    async fn emit_metrics(&self) {
        let snapshot = self.metrics.snapshot();
        info!(
            mentions_handled = snapshot.mentions_handled,
            facts_collected = snapshot.facts_collected,
            llm_calls = snapshot.llm_calls,
            errors = snapshot.errors,
            "metrics tick"
        );
        let line = match serde_json::to_string(&snapshot) {
            Ok(l) => l,
            Err(e) => {
                error!(error = %e, "failed to serialize metrics snapshot");
                return;
            }
        };
        let path: PathBuf = self.metrics_config.log_file.clone();
        if let Err(e) = append_line(&path, &line).await {
            error!(error = %e, "failed to write metrics log line");
        }
    }
}

async fn append_line(path: &std::path::Path, line: &str) -> std::io::Result<()> {
    use tokio::fs::OpenOptions;
    use tokio::io::AsyncWriteExt;

    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cairn_mastodon::{Account, EventStream, ProfileField, Status};
    use cairn_store::Fact;
    use cairn_core::types::SourceType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeLlm {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for FakeLlm {
        fn name(&self) -> &str {
            "fake"
        }
        async fn generate_text(
            &self,
            _messages: &[LlmMessage],
            _system_prompt: &str,
            _max_tokens: u32,
        ) -> std::result::Result<String, cairn_llm::ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("A short introduction.".to_string())
        }
    }

    struct FakeGateway {
        profile_updates: AtomicUsize,
        posts: AtomicUsize,
    }

    #[async_trait]
    impl MicroblogGateway for FakeGateway {
        async fn connect_user_stream(&self) -> cairn_mastodon::Result<EventStream> {
            unimplemented!()
        }
        async fn connect_public_stream(&self) -> cairn_mastodon::Result<EventStream> {
            unimplemented!()
        }
        async fn get_status(&self, _id: &str) -> cairn_mastodon::Result<Status> {
            unimplemented!()
        }
        async fn get_statuses_by_range(&self, _account_id: &str, _since_id: Option<&str>) -> cairn_mastodon::Result<Vec<Status>> {
            unimplemented!()
        }
        async fn get_statuses_by_date(&self, _account_id: &str, _since: chrono::DateTime<Utc>) -> cairn_mastodon::Result<Vec<Status>> {
            unimplemented!()
        }
        async fn post_status(&self, _text: &str, _visibility: &str, _in_reply_to_id: Option<&str>) -> cairn_mastodon::Result<Status> {
            self.posts.fetch_add(1, Ordering::SeqCst);
            Ok(Status {
                id: "1".into(),
                uri: "uri".into(),
                content: "posted".into(),
                visibility: cairn_core::types::Visibility::Public,
                account: Account {
                    id: "1".into(),
                    username: "bot".into(),
                    acct: "bot".into(),
                    display_name: "Bot".into(),
                    bot: true,
                    note: String::new(),
                    fields: vec![],
                },
                in_reply_to_id: None,
                created_at: "now".into(),
            })
        }
        async fn post_reply_with_split(&self, _reply_text: &str, _mention_prefix: &str, _in_reply_to_id: &str, _visibility: &str, _max_post_chars: usize) -> cairn_mastodon::Result<Vec<String>> {
            unimplemented!()
        }
        async fn post_reply_with_media(&self, _text: &str, _in_reply_to_id: &str, _visibility: &str, _media_bytes: &[u8], _media_mime: &str) -> cairn_mastodon::Result<Status> {
            unimplemented!()
        }
        async fn update_profile(&self, _note: &str) -> cairn_mastodon::Result<()> {
            self.profile_updates.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn update_profile_fields(&self, _fields: Vec<ProfileField>) -> cairn_mastodon::Result<()> {
            Ok(())
        }
        async fn get_account_by_username(&self, username: &str) -> cairn_mastodon::Result<Account> {
            Ok(Account {
                id: "1".into(),
                username: username.into(),
                acct: username.into(),
                display_name: "Bot".into(),
                bot: true,
                note: String::new(),
                fields: vec![],
            })
        }
        async fn follow(&self, _account_id: &str) -> cairn_mastodon::Result<()> {
            unimplemented!()
        }
        async fn is_following(&self, _account_id: &str) -> cairn_mastodon::Result<bool> {
            unimplemented!()
        }
    }

    fn engine(gateway: Arc<FakeGateway>, llm: Arc<FakeLlm>, store: Arc<FactStore>) -> ProfileEngine {
        ProfileEngine::new(
            gateway,
            llm,
            store,
            Arc::new(Metrics::default()),
            "bot".to_string(),
            "bot".to_string(),
            "You are a friendly bot.".to_string(),
            ProfileConfig {
                refresh_interval_hours: 24,
                disclaimer: "\n[AI]".to_string(),
                profile_budget_chars: 500,
                system_id: "abc".to_string(),
                model_identifier: "claude".to_string(),
                timezone: chrono_tz::UTC,
                max_response_tokens: 1024,
            },
            AutoPostConfig {
                interval_hours: 6,
                visibility: "public".to_string(),
                bot_tag: "#bot".to_string(),
            },
            MetricsConfig {
                interval_minutes: 30,
                log_file: PathBuf::from("/tmp/does-not-matter.jsonl"),
            },
        )
    }

    #[tokio::test]
    async fn synthesize_and_update_profile_calls_gateway() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FactStore::load(dir.path().join("facts.json"), 365, 100));
        store
            .add(Fact {
                target: "bot".into(),
                target_display_name: "bot".into(),
                author: "bot".into(),
                key: "likes".into(),
                value: "astronomy".into(),
                timestamp: Utc::now(),
                source_type: SourceType::SelfIntro,
                source_url: None,
                post_author: None,
            })
            .await;

        let gateway = Arc::new(FakeGateway {
            profile_updates: AtomicUsize::new(0),
            posts: AtomicUsize::new(0),
        });
        let llm = Arc::new(FakeLlm { calls: AtomicUsize::new(0) });
        let eng = engine(gateway.clone(), llm.clone(), store);

        eng.synthesize_and_update_profile().await.unwrap();
        assert_eq!(gateway.profile_updates.load(Ordering::SeqCst), 1);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn auto_post_skips_when_no_facts() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FactStore::load(dir.path().join("facts.json"), 365, 100));
        let gateway = Arc::new(FakeGateway {
            profile_updates: AtomicUsize::new(0),
            posts: AtomicUsize::new(0),
        });
        let llm = Arc::new(FakeLlm { calls: AtomicUsize::new(0) });
        let eng = engine(gateway.clone(), llm, store);

        eng.auto_post_once().await.unwrap();
        assert_eq!(gateway.posts.load(Ordering::SeqCst), 0);
    }
}
