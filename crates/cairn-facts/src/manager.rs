use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, instrument, warn};
use url::Url;

use cairn_core::sink::ErrorSink;
use cairn_core::types::SourceType;
use cairn_fetch::{fetch_page_content, is_fediverse_server, is_noise_url, validate_url};
use cairn_llm::{build_system_prompt, extract_json, unmarshal_with_repair, LlmProvider, Message as LlmMessage, Role as LlmRole};
use cairn_mastodon::{should_collect, Account, MicroblogGateway, Status};
use cairn_store::{Fact, FactStore};

use crate::types::{ExtractedFact, FactCollectionConfig, PeerProfile};

const EXTRACTION_SYSTEM_PROMPT: &str = "You extract durable, attributable facts from web page \
content fetched from a link shared on a federated microblog. Return ONLY a JSON array; each \
element must be {\"target\":\"<handle or empty>\",\"target_user_name\":\"<display name or empty>\",\
\"key\":\"short_label\",\"value\":\"concise fact\"}. If nothing is worth keeping, return [].";

const POST_CONTENT_SYSTEM_PROMPT: &str = "You extract durable, attributable facts stated directly \
in a federated microblog post. Return ONLY a JSON array in the same shape as for URL extraction. \
If nothing is worth keeping, return [].";

/// Owns the rate limiter, the two dedup caches, and the bounded worker pool
/// for URL-based fact extraction. The two dedup caches are independent
/// `DashMap`s with their own TTLs; concurrent extraction workers are bounded
/// by an `Arc<Semaphore>` acquired before each spawn.
pub struct FactCollector {
    fact_store: Arc<FactStore>,
    llm: Arc<dyn LlmProvider>,
    http: reqwest::Client,
    blacklist: Arc<Vec<String>>,
    config: FactCollectionConfig,
    sink: Arc<dyn ErrorSink>,
    recent_attempts: Mutex<VecDeque<chrono::DateTime<Utc>>>,
    processed_urls: DashMap<String, Instant>,
    fediverse_domains: DashMap<String, bool>,
    worker_semaphore: Arc<Semaphore>,
}

impl FactCollector {
    pub fn new(
        fact_store: Arc<FactStore>,
        llm: Arc<dyn LlmProvider>,
        http: reqwest::Client,
        blacklist: Arc<Vec<String>>,
        config: FactCollectionConfig,
        sink: Arc<dyn ErrorSink>,
    ) -> Arc<Self> {
        let max_workers = config.max_workers.max(1);
        Arc::new(Self {
            fact_store,
            llm,
            http,
            blacklist,
            config,
            sink,
            recent_attempts: Mutex::new(VecDeque::new()),
            processed_urls: DashMap::new(),
            fediverse_domains: DashMap::new(),
            worker_semaphore: Arc::new(Semaphore::new(max_workers)),
        })
    }

    /// Atomic sliding-window rate check: drops entries older than one hour,
    /// rejects at capacity, otherwise records `now` and admits the call.
    pub async fn can_process(&self) -> bool {
        let cutoff = Utc::now() - chrono::Duration::hours(1);
        let mut guard = self.recent_attempts.lock().await;
        while matches!(guard.front(), Some(t) if *t < cutoff) {
            guard.pop_front();
        }
        if guard.len() >= self.config.max_per_hour {
            return false;
        }
        guard.push_back(Utc::now());
        true
    }

    /// Returns `true` the first time `url` is seen, or once its prior entry
    /// has aged past the dedup TTL; `false` for a repeat within the window.
    fn mark_processed_if_new(&self, url: &str) -> bool {
        match self.processed_urls.entry(url.to_string()) {
            Entry::Occupied(mut e) => {
                if e.get().elapsed() > self.config.dedup_cache_ttl {
                    e.insert(Instant::now());
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(v) => {
                v.insert(Instant::now());
                true
            }
        }
    }

    async fn is_fediverse(&self, host: &str) -> bool {
        if let Some(cached) = self.fediverse_domains.get(host) {
            return *cached;
        }
        let result = is_fediverse_server(&self.http, host).await;
        self.fediverse_domains.insert(host.to_string(), result);
        result
    }

    #[instrument(skip(self, status, peer_profile), fields(status_id = %status.id))]
    pub async fn process_status(
        self: &Arc<Self>,
        status: &Status,
        own_target: &str,
        ignore_url_requirement: bool,
        peer_profile: Option<PeerProfile>,
    ) {
        if !should_collect(status.visibility, &status.account, &status.content, ignore_url_requirement) {
            return;
        }
        if !self.can_process().await {
            debug!("fact collection rate limit reached, dropping status");
            return;
        }

        if self.config.from_post_content {
            self.extract_from_post_content(status).await;
        }

        if let Some(profile) = peer_profile {
            self.record_colleague_profile(own_target, &status.account.username, &profile).await;
        }

        self.dispatch_url_extraction(status).await;
    }

    async fn extract_from_post_content(&self, status: &Status) {
        let messages = [LlmMessage {
            role: LlmRole::User,
            content: status.content.clone(),
            images: Vec::new(),
        }];
        let raw = match self
            .llm
            .generate_text(&messages, POST_CONTENT_SYSTEM_PROMPT, self.config.max_fact_tokens)
            .await
        {
            Ok(t) => t,
            Err(e) => {
                debug!(error = %e, "post-content extraction call failed");
                return;
            }
        };
        let Some(json) = extract_json(&raw) else {
            return;
        };
        let Some(items): Option<Vec<ExtractedFact>> =
            unmarshal_with_repair(json, self.sink.as_ref(), "fact_extraction_post_content").await
        else {
            return;
        };
        self.persist_facts(items, &status.account.username, None).await;
    }

    async fn record_colleague_profile(&self, own_target: &str, peer: &str, profile: &PeerProfile) {
        let key = format!("system:colleague_profile:{peer}");
        let value = format!("Name:{}\nBio:{}", profile.name, profile.bio);
        if self.fact_store.get_value(own_target, &key).await.as_deref() == Some(value.as_str()) {
            return;
        }
        self.fact_store
            .add(Fact {
                target: own_target.to_string(),
                target_display_name: own_target.to_string(),
                author: peer.to_string(),
                key,
                value,
                timestamp: Utc::now(),
                source_type: SourceType::System,
                source_url: None,
                post_author: Some(peer.to_string()),
            })
            .await;
        let _ = self.fact_store.save().await;
    }

    async fn dispatch_url_extraction(self: &Arc<Self>, status: &Status) {
        let author_host = status.account.acct.split('@').nth(1).map(str::to_string);
        let post_author = status.account.username.clone();

        for raw_url in extract_urls(&status.content) {
            if !self.mark_processed_if_new(&raw_url) {
                continue;
            }
            let Ok(parsed) = Url::parse(&raw_url) else {
                continue;
            };
            if validate_url(&parsed, &self.blacklist).is_err() {
                continue;
            }
            let Some(host) = parsed.host_str().map(str::to_string) else {
                continue;
            };
            if Some(host.as_str()) == author_host.as_deref() {
                continue;
            }
            if self.is_fediverse(&host).await {
                continue;
            }
            if is_noise_url(&raw_url) {
                continue;
            }

            let permit = match self.worker_semaphore.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => return,
            };
            let this = Arc::clone(self);
            let url = raw_url.clone();
            let author = post_author.clone();
            tokio::spawn(async move {
                this.extract_from_url(&url, &author).await;
                drop(permit);
            });
        }
    }

    async fn extract_from_url(&self, url: &str, post_author: &str) {
        let page = match fetch_page_content(&self.http, url, &self.blacklist).await {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, url, "fact extraction: page fetch failed");
                return;
            }
        };

        let block = format!(
            "[参照URL情報]\nURL: {}\nTitle: {}\n\n{}",
            page.final_url,
            page.title.clone().unwrap_or_default(),
            page.content
        );
        let system_prompt = build_system_prompt(EXTRACTION_SYSTEM_PROMPT, "", "", false, usize::MAX);
        let messages = [LlmMessage {
            role: LlmRole::User,
            content: block,
            images: Vec::new(),
        }];
        let raw = match self
            .llm
            .generate_text(&messages, &system_prompt, self.config.max_fact_tokens)
            .await
        {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, url, "fact extraction: LLM call failed");
                return;
            }
        };
        let Some(json) = extract_json(&raw) else {
            return;
        };
        let Some(items): Option<Vec<ExtractedFact>> =
            unmarshal_with_repair(json, self.sink.as_ref(), "fact_extraction_url").await
        else {
            return;
        };

        let host = Url::parse(&page.final_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();
        self.persist_facts(items, post_author, Some((page.final_url.clone(), host))).await;
    }

    async fn persist_facts(
        &self,
        items: Vec<ExtractedFact>,
        post_author: &str,
        source: Option<(String, String)>,
    ) {
        if items.is_empty() {
            return;
        }
        let (source_url, host) = match source {
            Some((url, host)) => (Some(url), host),
            None => (None, String::new()),
        };
        let count = items.len();
        for item in items {
            let target = item
                .target
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "__general__".to_string());
            let display_name = if target == "__general__" {
                host.clone()
            } else {
                item.target_user_name
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| target.clone())
            };
            self.fact_store
                .add(Fact {
                    target,
                    target_display_name: display_name,
                    author: post_author.to_string(),
                    key: item.key,
                    value: item.value,
                    timestamp: Utc::now(),
                    source_type: SourceType::Federated,
                    source_url: source_url.clone(),
                    post_author: Some(post_author.to_string()),
                })
                .await;
        }
        if let Err(e) = self.fact_store.save().await {
            warn!(error = %e, "failed to persist facts after extraction batch");
        } else {
            info!(facts = count, "persisted extracted facts");
        }
    }

    /// One pass of the peer discovery loop: for each candidate username,
    /// verifies the account's `SystemID` profile field against this host's
    /// auth key and follows it if not already followed.
    pub async fn peer_discovery_tick(
        &self,
        gateway: &dyn MicroblogGateway,
        other_usernames: &[String],
        own_auth_key: &str,
    ) {
        for username in other_usernames {
            let account = match gateway.get_account_by_username(username).await {
                Ok(a) => a,
                Err(e) => {
                    debug!(error = %e, username, "peer discovery: account lookup failed");
                    continue;
                }
            };
            if !is_verified_peer(&account, own_auth_key) {
                continue;
            }
            match gateway.is_following(&account.id).await {
                Ok(true) => {}
                Ok(false) => {
                    if let Err(e) = gateway.follow(&account.id).await {
                        warn!(error = %e, username, "peer discovery: follow failed");
                    } else {
                        info!(username, "followed verified peer");
                    }
                }
                Err(e) => warn!(error = %e, username, "peer discovery: relationship check failed"),
            }
        }
    }
}

/// An account is a verified peer when its `SystemID` profile field matches
/// this host's computed auth key.
pub fn is_verified_peer(account: &Account, own_auth_key: &str) -> bool {
    account
        .fields
        .iter()
        .any(|f| f.name == "SystemID" && f.value == own_auth_key)
}

/// Scans raw HTML/text for `http(s)://` tokens and keeps the ones that
/// parse as valid URLs, trimming trailing punctuation a sentence might
/// have attached. Simpler than a regex crate: Mastodon status bodies are
/// short enough that a linear scan is plenty.
fn extract_urls(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut search_from = 0usize;
    while let Some(rel) = text[search_from..].find("http") {
        let start = search_from + rel;
        let end = text[start..]
            .find(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '<' | '>' | '('))
            .map(|e| start + e)
            .unwrap_or(text.len());
        let candidate = text[start..end].trim_end_matches(['.', ',', ';', ')']);
        if (candidate.starts_with("http://") || candidate.starts_with("https://"))
            && Url::parse(candidate).is_ok()
        {
            out.push(candidate.to_string());
        }
        search_from = end.max(start + 1);
        if search_from >= text.len() {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use cairn_core::sink::NoopErrorSink;
    use cairn_core::types::Visibility;
    use cairn_mastodon::ProfileField;

    struct FakeLlm;

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
            Ok("[]".to_string())
        }
    }

    fn config() -> FactCollectionConfig {
        FactCollectionConfig {
            max_per_hour: 2,
            max_workers: 2,
            from_post_content: false,
            max_fact_tokens: 256,
            dedup_cache_ttl: Duration::from_secs(60 * 60 * 24),
        }
    }

    fn collector() -> Arc<FactCollector> {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FactStore::load(dir.path().join("facts.json"), 365, 10_000));
        FactCollector::new(
            store,
            Arc::new(FakeLlm),
            reqwest::Client::new(),
            Arc::new(Vec::new()),
            config(),
            Arc::new(NoopErrorSink),
        )
    }

    #[tokio::test]
    async fn property_5_rate_limit_caps_per_hour() {
        let collector = collector();
        assert!(collector.can_process().await);
        assert!(collector.can_process().await);
        assert!(!collector.can_process().await);
    }

    #[tokio::test]
    async fn property_6_dedup_admits_once_within_ttl() {
        let collector = collector();
        assert!(collector.mark_processed_if_new("https://example.com/a"));
        assert!(!collector.mark_processed_if_new("https://example.com/a"));
        assert!(collector.mark_processed_if_new("https://example.com/b"));
    }

    #[test]
    fn extract_urls_finds_bare_and_punctuated_links() {
        let text = "see https://example.com/a and also (https://example.org/b).";
        let urls = extract_urls(text);
        assert_eq!(urls, vec!["https://example.com/a", "https://example.org/b"]);
    }

    #[test]
    fn verified_peer_matches_system_id_field() {
        let account = Account {
            id: "1".into(),
            username: "peer".into(),
            acct: "peer@example.com".into(),
            display_name: "Peer".into(),
            bot: true,
            note: String::new(),
            fields: vec![ProfileField {
                name: "SystemID".into(),
                value: "abc123".into(),
            }],
        };
        assert!(is_verified_peer(&account, "abc123"));
        assert!(!is_verified_peer(&account, "other"));
    }

    #[test]
    fn eligibility_gates_processing_before_rate_limit() {
        let account = Account {
            id: "1".into(),
            username: "u".into(),
            acct: "u".into(),
            display_name: "U".into(),
            bot: false,
            note: String::new(),
            fields: vec![],
        };
        assert!(!should_collect(Visibility::Private, &account, "https://x.com", false));
    }
}
