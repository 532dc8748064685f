//! Central shared-state struct and top-level supervisor loop: one
//! `Arc`-shared struct wiring every collaborator, built once at startup,
//! and a `run` that spawns its auxiliary tasks first and then waits on all
//! of them, each polling the same `CancellationToken`.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use cairn_cluster::compute_auth_key;
use cairn_conversation::ConversationEngine;
use cairn_core::sink::{ErrorSink, NoopErrorSink};
use cairn_core::{CairnConfig, LlmProviderKind};
use cairn_dispatch::{DispatchConfig, Dispatcher};
use cairn_facts::FactCollector;
use cairn_fetch::{build_client, parse_blacklist};
use cairn_llm::{ClaudeProvider, GeminiProvider, LlmProvider};
use cairn_mastodon::{MastodonClient, MicroblogGateway, TimelineEvent};
use cairn_profile::{AutoPostConfig, BroadcastConfig, BroadcastTracker, Metrics, MetricsConfig, ProfileConfig, ProfileEngine};
use cairn_store::{FactStore, SessionStore};

use crate::handlers::{AgentMentionHandler, AgentUpdateHandler};

/// Fixed retry delay for both stream reconnect loops. A flat delay is
/// enough — the streaming endpoints don't need exponential backoff.
const STREAM_RECONNECT_DELAY: Duration = Duration::from_secs(5);
const PEER_DISCOVERY_INTERVAL: Duration = Duration::from_secs(30 * 60);
const STORE_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Everything every long-running task needs, built once at startup and
/// shared by `Arc`. This system has no inbound HTTP surface, so there are
/// no WS/HTTP-specific fields here.
pub struct BotContext {
    pub config: CairnConfig,
    pub gateway: Arc<dyn MicroblogGateway>,
    pub sessions: Arc<SessionStore>,
    pub facts: Arc<FactStore>,
    pub conversation: ConversationEngine,
    pub collector: Arc<FactCollector>,
    pub profile: ProfileEngine,
    pub broadcast: BroadcastTracker,
    pub broadcast_config: BroadcastConfig,
    pub metrics: Arc<Metrics>,
    pub sink: Arc<dyn ErrorSink>,
    pub own_auth_key: String,
    pub other_usernames: Vec<String>,
}

impl BotContext {
    pub fn build(config: CairnConfig) -> anyhow::Result<Arc<Self>> {
        let gateway: Arc<dyn MicroblogGateway> =
            Arc::new(MastodonClient::new(config.mastodon_server.clone(), config.mastodon_access_token.clone()));

        let llm: Arc<dyn LlmProvider> = match config.llm_provider {
            LlmProviderKind::Claude => {
                let api_key = config
                    .anthropic_auth_token
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("ANTHROPIC_AUTH_TOKEN is required for llm_provider=claude"))?;
                let model = config
                    .anthropic_default_model
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("ANTHROPIC_DEFAULT_MODEL is required for llm_provider=claude"))?;
                Arc::new(ClaudeProvider::new(api_key, config.anthropic_base_url.clone(), model))
            }
            LlmProviderKind::Gemini => {
                let api_key = config
                    .gemini_api_key
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("GEMINI_API_KEY is required for llm_provider=gemini"))?;
                let model = config
                    .gemini_model
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("GEMINI_MODEL is required for llm_provider=gemini"))?;
                Arc::new(GeminiProvider::new(api_key, model))
            }
        };

        // No Slack-backed sink is wired up yet; the trait is the pluggable
        // seam, and the no-op default is the only implementation installed.
        let sink: Arc<dyn ErrorSink> = Arc::new(NoopErrorSink);

        let sessions = Arc::new(SessionStore::load(config.session_file.clone()));
        let facts = Arc::new(FactStore::load(
            config.fact_store_file.clone(),
            config.fact_retention_days,
            config.max_facts,
        ));

        let conversation = ConversationEngine::new(
            sessions.clone(),
            llm.clone(),
            cairn_conversation::CompressionConfig {
                message_compress_threshold: config.conversation_message_compress_threshold,
                message_keep_count: config.conversation_message_keep_count,
                min_keep_count: config.conversation_min_keep_count,
                idle_hours: config.conversation_idle_hours,
                retention_hours: config.conversation_retention_hours,
                max_summary_tokens: config.max_summary_tokens,
            },
        );

        let blacklist = Arc::new(parse_blacklist(&config.url_blacklist));
        let http = build_client(blacklist.clone());
        let collector = FactCollector::new(
            facts.clone(),
            llm.clone(),
            http,
            blacklist,
            cairn_facts::FactCollectionConfig {
                max_per_hour: config.fact_collection_max_per_hour,
                max_workers: config.fact_collection_max_workers,
                from_post_content: config.fact_collection_from_post_content,
                max_fact_tokens: config.max_fact_tokens,
                dedup_cache_ttl: Duration::from_secs(24 * 3600),
            },
            sink.clone(),
        );

        let timezone: chrono_tz::Tz = config
            .timezone
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid TIMEZONE {:?}", config.timezone))?;

        let own_auth_key = compute_auth_key();
        let metrics = Arc::new(Metrics::default());

        let profile = ProfileEngine::new(
            gateway.clone(),
            llm.clone(),
            facts.clone(),
            metrics.clone(),
            config.bot_username.clone(),
            config.bot_username.clone(),
            config.character_prompt.clone(),
            ProfileConfig {
                refresh_interval_hours: 24,
                disclaimer: "\n[This account is run by an AI.]".to_string(),
                profile_budget_chars: 500,
                system_id: own_auth_key.clone(),
                model_identifier: llm.name().to_string(),
                timezone,
                max_response_tokens: config.max_response_tokens,
            },
            AutoPostConfig {
                interval_hours: config.auto_post_interval_hours,
                visibility: config.auto_post_visibility.clone(),
                bot_tag: "#bot".to_string(),
            },
            MetricsConfig {
                interval_minutes: config.metrics_log_interval_minutes as i64,
                log_file: config
                    .metrics_log_file
                    .clone()
                    .unwrap_or_else(|| config.data_dir().join("metrics.jsonl")),
            },
        );

        let other_usernames: Vec<String> = cairn_cluster::get_known_bot_usernames(&config.data_dir())
            .into_iter()
            .filter(|u| u != &config.bot_username)
            .collect();

        Ok(Arc::new(Self {
            broadcast_config: BroadcastConfig {
                trigger: config.broadcast_command.clone(),
                thread_window_minutes: 10,
            },
            config,
            gateway,
            sessions,
            facts,
            conversation,
            collector,
            profile,
            broadcast: BroadcastTracker::new(),
            metrics,
            sink,
            own_auth_key,
            other_usernames,
        }))
    }

    /// Spawns every long-lived subsystem and blocks until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let registry_path = self.config.data_dir().join("cluster_registry.json");

        let dispatcher = Arc::new(Dispatcher::new(
            DispatchConfig {
                own_username: self.config.bot_username.clone(),
                allow_remote_users: self.config.allow_remote_users,
            },
            Arc::new(AgentMentionHandler { ctx: self.clone() }),
            Arc::new(AgentUpdateHandler { ctx: self.clone() }),
        ));

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(run_user_stream(self.clone(), dispatcher, cancel.clone())));
        tasks.push(tokio::spawn(run_public_stream(self.clone(), cancel.clone())));
        tasks.push(tokio::spawn(cairn_cluster::run_heartbeat(
            registry_path,
            self.config.bot_username.clone(),
            cancel.clone(),
        )));
        {
            let ctx = self.clone();
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move { ctx.profile.run_profile_refresh(cancel).await }));
        }
        {
            let ctx = self.clone();
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move { ctx.profile.run_auto_post(cancel).await }));
        }
        {
            let ctx = self.clone();
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move { ctx.profile.run_metrics(cancel).await }));
        }
        tasks.push(tokio::spawn(run_peer_discovery(self.clone(), cancel.clone())));
        tasks.push(tokio::spawn(run_store_sweep(self.clone(), cancel.clone())));

        for task in tasks {
            let _ = task.await;
        }
        info!("bot context shut down");
    }
}

async fn run_user_stream(ctx: Arc<BotContext>, dispatcher: Arc<Dispatcher>, cancel: CancellationToken) {
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let mut stream = match ctx.gateway.connect_user_stream().await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "user stream connect failed, retrying");
                sleep(STREAM_RECONNECT_DELAY).await;
                continue;
            }
        };
        info!("user stream connected");
        loop {
            tokio::select! {
                event = stream.next() => {
                    match event {
                        Some(event) => dispatcher.handle_event(event).await,
                        None => {
                            warn!("user stream ended, reconnecting");
                            break;
                        }
                    }
                }
                _ = cancel.cancelled() => return,
            }
        }
        sleep(STREAM_RECONNECT_DELAY).await;
    }
}

async fn run_public_stream(ctx: Arc<BotContext>, cancel: CancellationToken) {
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let mut stream = match ctx.gateway.connect_public_stream().await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "public stream connect failed, retrying");
                sleep(STREAM_RECONNECT_DELAY).await;
                continue;
            }
        };
        info!("public stream connected");
        loop {
            tokio::select! {
                event = stream.next() => {
                    match event {
                        Some(TimelineEvent::Update(status)) => {
                            if ctx.config.fact_collection_enabled && ctx.config.fact_collection_federated {
                                ctx.collector.process_status(&status, &ctx.config.bot_username, false, None).await;
                                ctx.metrics.record_fact();
                            }
                        }
                        Some(_) => {}
                        None => {
                            warn!("public stream ended, reconnecting");
                            break;
                        }
                    }
                }
                _ = cancel.cancelled() => return,
            }
        }
        sleep(STREAM_RECONNECT_DELAY).await;
    }
}

async fn run_peer_discovery(ctx: Arc<BotContext>, cancel: CancellationToken) {
    if ctx.other_usernames.is_empty() {
        info!("peer discovery disabled: no other known bots configured");
        return;
    }
    let mut interval = tokio::time::interval(PEER_DISCOVERY_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                ctx.collector
                    .peer_discovery_tick(ctx.gateway.as_ref(), &ctx.other_usernames, &ctx.own_auth_key)
                    .await;
            }
            _ = cancel.cancelled() => {
                info!("peer discovery loop stopped");
                return;
            }
        }
    }
}

async fn run_store_sweep(ctx: Arc<BotContext>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(STORE_SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = ctx.sessions.sync_from_disk().await {
                    error!(error = %e, "session store sync failed");
                }
                if let Err(e) = ctx.facts.sync_from_disk().await {
                    error!(error = %e, "fact store sync failed");
                }
                ctx.facts.evict().await;
            }
            _ = cancel.cancelled() => {
                info!("store sweep loop stopped");
                return;
            }
        }
    }
}
