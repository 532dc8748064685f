use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use cairn_llm::{LlmProvider, Message as LlmMessage, Role as LlmRole};
use cairn_mastodon::{resolve_root_status_id, MicroblogGateway};
use cairn_store::{ImageRef, Message as StoreMessage, Role as StoreRole, Session, SessionStore};

use crate::error::Result;
use crate::types::{CompressionConfig, DispatchOutcome};

const APOLOGY_SYSTEM_PROMPT: &str =
    "Write a brief, in-character apology to the user explaining that you were \
     unable to produce a reply, and invite them to try again. Keep it under 200 characters.";

const SUMMARIZE_SYSTEM_PROMPT: &str =
    "Merge the existing summary with the new conversation excerpt into one \
     concise paragraph capturing everything worth remembering long-term.";

/// Drives one mention end to end: finds or creates the session, resolves
/// the reply thread, calls the LLM, posts (splitting as needed), and rolls
/// back to the pre-exchange state on any failure. Summarization runs
/// synchronously above a threshold rather than as a detached task, so the
/// dispatcher never returns with half-settled state.
pub struct ConversationEngine {
    store: Arc<SessionStore>,
    llm: Arc<dyn LlmProvider>,
    compression: CompressionConfig,
}

impl ConversationEngine {
    pub fn new(store: Arc<SessionStore>, llm: Arc<dyn LlmProvider>, compression: CompressionConfig) -> Self {
        Self {
            store,
            llm,
            compression,
        }
    }

    #[instrument(skip(self, gateway, character_prompt, user_text, images), fields(user = %user_handle))]
    #[allow(clippy::too_many_arguments)]
    pub async fn dispatch_mention(
        &self,
        gateway: &dyn MicroblogGateway,
        notification_status_id: &str,
        user_handle: &str,
        character_prompt: &str,
        user_text: &str,
        images: Vec<ImageRef>,
        mention_prefix: &str,
        max_post_chars: usize,
        max_response_tokens: u32,
        respond_japanese: bool,
        visibility: &str,
    ) -> Result<DispatchOutcome> {
        let root = resolve_root_status_id(gateway, notification_status_id).await;
        let base_session = self.store.get_or_create(user_handle).await;

        let mut working = base_session.clone();
        {
            let conv = working.get_or_create_conversation(&root);
            conv.messages.push(StoreMessage {
                role: StoreRole::User,
                content: user_text.to_string(),
                images,
            });
            conv.last_updated = Utc::now();
        }

        let system_prompt = cairn_llm::build_system_prompt(
            character_prompt,
            &working.summary,
            "",
            respond_japanese,
            max_post_chars,
        );

        let conv_messages = to_llm_messages(&working.find_conversation(&root).unwrap().messages);
        let reply = self
            .llm
            .generate_text(&conv_messages, &system_prompt, max_response_tokens)
            .await;

        let reply_text = match reply {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                debug!("LLM returned empty reply, rolling back pending turn");
                return self.apologize(gateway, &root, mention_prefix, visibility, max_post_chars).await;
            }
            Err(e) => {
                warn!(error = %e, "LLM call failed, rolling back pending turn");
                return self.apologize(gateway, &root, mention_prefix, visibility, max_post_chars).await;
            }
        };

        {
            let conv = working.get_or_create_conversation(&root);
            conv.messages.push(StoreMessage {
                role: StoreRole::Assistant,
                content: reply_text.clone(),
                images: Vec::new(),
            });
            conv.last_updated = Utc::now();
        }

        match gateway
            .post_reply_with_split(&reply_text, mention_prefix, &root, visibility, max_post_chars)
            .await
        {
            Ok(ids) => {
                self.compress_if_needed(&mut working).await;
                self.store.put(working).await;
                self.store.save().await?;
                Ok(DispatchOutcome::Replied(ids))
            }
            Err(e) => {
                warn!(error = %e, "posting reply failed, rolling back both turns");
                self.apologize(gateway, &root, mention_prefix, visibility, max_post_chars).await
            }
        }
    }

    async fn apologize(
        &self,
        gateway: &dyn MicroblogGateway,
        root: &str,
        mention_prefix: &str,
        visibility: &str,
        max_post_chars: usize,
    ) -> Result<DispatchOutcome> {
        let apology = self
            .llm
            .generate_text(&[], APOLOGY_SYSTEM_PROMPT, 200)
            .await
            .unwrap_or_else(|_| "Sorry, I couldn't come up with a reply just now — please try again.".to_string());

        let ids = gateway
            .post_reply_with_split(&apology, mention_prefix, root, visibility, max_post_chars)
            .await?;
        Ok(DispatchOutcome::Apologized(ids))
    }

    /// Evaluates both compression triggers against every conversation in
    /// `session`, mutating it in place. Aborts an individual conversation's
    /// compression if the LLM returns an empty summary.
    #[instrument(skip(self, session), fields(user = %session.user_handle))]
    async fn compress_if_needed(&self, session: &mut Session) {
        self.compress_oversized_conversations(session).await;
        self.sweep_idle_conversations(session).await;
    }

    async fn compress_oversized_conversations(&self, session: &mut Session) {
        let threshold = self.compression.message_compress_threshold;
        let keep = self.compression.message_keep_count;

        for idx in 0..session.conversations.len() {
            let len = session.conversations[idx].messages.len();
            if len <= threshold {
                continue;
            }
            let batch_size = len - keep;
            let transcript = transcript_of(&session.conversations[idx].messages[..batch_size]);
            let existing_summary = session.summary.clone();
            let summary = self.summarize(&existing_summary, &transcript).await;
            match summary {
                Some(text) => {
                    session.append_summary(&text);
                    let conv = &mut session.conversations[idx];
                    conv.messages.drain(..batch_size);
                    info!(
                        root = %conv.root_status_id,
                        dropped = batch_size,
                        "compressed conversation"
                    );
                }
                None => {
                    debug!("compression summary was empty, leaving conversation untouched");
                }
            }
        }
    }

    async fn sweep_idle_conversations(&self, session: &mut Session) {
        let min_keep = self.compression.min_keep_count;
        if session.conversations.len() <= min_keep {
            return;
        }

        let now = Utc::now();
        let mut order: Vec<usize> = (0..session.conversations.len()).collect();
        order.sort_by_key(|&i| session.conversations[i].last_updated);

        let mut to_remove: Vec<usize> = Vec::new();
        for idx in order {
            if session.conversations.len() - to_remove.len() <= min_keep {
                break;
            }
            let conv = &session.conversations[idx];
            let age_hours = (now - conv.last_updated).num_hours();
            let is_idle = age_hours > self.compression.idle_hours;
            let is_expired = age_hours > self.compression.retention_hours;
            if !is_idle && !is_expired {
                continue;
            }
            let transcript = transcript_of(&conv.messages);
            if let Some(text) = self.summarize(&session.summary, &transcript).await {
                session.append_summary(&text);
            }
            to_remove.push(idx);
        }

        to_remove.sort_unstable();
        for idx in to_remove.into_iter().rev() {
            session.conversations.remove(idx);
        }
    }

    async fn summarize(&self, existing_summary: &str, transcript: &str) -> Option<String> {
        let prompt = format!(
            "Existing summary:\n{existing_summary}\n\nConversation excerpt:\n{transcript}"
        );
        let messages = [LlmMessage {
            role: LlmRole::User,
            content: prompt,
            images: Vec::new(),
        }];
        match self
            .llm
            .generate_text(&messages, SUMMARIZE_SYSTEM_PROMPT, self.compression.max_summary_tokens)
            .await
        {
            Ok(text) if !text.trim().is_empty() => Some(text),
            _ => None,
        }
    }
}

fn to_llm_messages(messages: &[StoreMessage]) -> Vec<LlmMessage> {
    messages
        .iter()
        .map(|m| LlmMessage {
            role: match m.role {
                StoreRole::User => LlmRole::User,
                StoreRole::Assistant => LlmRole::Assistant,
            },
            content: m.content.clone(),
            images: m
                .images
                .iter()
                .map(|img| (img.mime_type.clone(), img.base64_data.clone()))
                .collect(),
        })
        .collect()
}

fn transcript_of(messages: &[StoreMessage]) -> String {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                StoreRole::User => "USER",
                StoreRole::Assistant => "ASSISTANT",
            };
            format!("{role}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use cairn_mastodon::{Account, EventStream, GatewayError, ProfileField, Status};

    struct FakeLlm {
        reply: Mutex<Option<String>>,
        fail: bool,
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
            if self.fail {
                return Err(cairn_llm::ProviderError::Empty);
            }
            Ok(self
                .reply
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| "ok".to_string()))
        }
    }

    struct FakeGateway {
        statuses: HashMap<&'static str, Status>,
        post_attempts: AtomicUsize,
        fail_first_post: bool,
    }

    fn account() -> Account {
        Account {
            id: "1".into(),
            username: "u".into(),
            acct: "u".into(),
            display_name: "U".into(),
            bot: false,
            note: String::new(),
            fields: vec![],
        }
    }

    fn status(id: &'static str) -> Status {
        Status {
            id: id.into(),
            uri: format!("https://example.com/{id}"),
            content: String::new(),
            visibility: cairn_core::types::Visibility::Public,
            account: account(),
            in_reply_to_id: None,
            created_at: "2024-01-01T00:00:00Z".into(),
        }
    }

    #[async_trait]
    impl MicroblogGateway for FakeGateway {
        async fn connect_user_stream(&self) -> cairn_mastodon::Result<EventStream> {
            unimplemented!()
        }
        async fn connect_public_stream(&self) -> cairn_mastodon::Result<EventStream> {
            unimplemented!()
        }
        async fn get_status(&self, id: &str) -> cairn_mastodon::Result<Status> {
            self.statuses
                .get(id)
                .cloned()
                .ok_or_else(|| GatewayError::NotFound(id.to_string()))
        }
        async fn get_statuses_by_range(
            &self,
            _: &str,
            _: Option<&str>,
        ) -> cairn_mastodon::Result<Vec<Status>> {
            unimplemented!()
        }
        async fn get_statuses_by_date(
            &self,
            _: &str,
            _: chrono::DateTime<chrono::Utc>,
        ) -> cairn_mastodon::Result<Vec<Status>> {
            unimplemented!()
        }
        async fn post_status(&self, _: &str, _: &str, _: Option<&str>) -> cairn_mastodon::Result<Status> {
            unimplemented!()
        }
        async fn post_reply_with_split(
            &self,
            _text: &str,
            _mention_prefix: &str,
            _in_reply_to_id: &str,
            _visibility: &str,
            _max_post_chars: usize,
        ) -> cairn_mastodon::Result<Vec<String>> {
            let attempt = self.post_attempts.fetch_add(1, Ordering::SeqCst);
            if attempt == 0 && self.fail_first_post {
                return Err(GatewayError::Api {
                    status: 422,
                    message: "too long".into(),
                });
            }
            Ok(vec!["posted-1".to_string()])
        }
        async fn post_reply_with_media(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: &[u8],
            _: &str,
        ) -> cairn_mastodon::Result<Status> {
            unimplemented!()
        }
        async fn update_profile(&self, _: &str) -> cairn_mastodon::Result<()> {
            unimplemented!()
        }
        async fn update_profile_fields(&self, _: Vec<ProfileField>) -> cairn_mastodon::Result<()> {
            unimplemented!()
        }
        async fn get_account_by_username(&self, _: &str) -> cairn_mastodon::Result<Account> {
            unimplemented!()
        }
        async fn follow(&self, _: &str) -> cairn_mastodon::Result<()> {
            unimplemented!()
        }
        async fn is_following(&self, _: &str) -> cairn_mastodon::Result<bool> {
            unimplemented!()
        }
    }

    fn test_config() -> CompressionConfig {
        CompressionConfig {
            message_compress_threshold: 20,
            message_keep_count: 10,
            min_keep_count: 2,
            idle_hours: 24 * 7,
            retention_hours: 24 * 30,
            max_summary_tokens: 200,
        }
    }

    #[tokio::test]
    async fn scenario_s5_compresses_oversized_conversation() {
        let store = Arc::new(SessionStore::load(std::env::temp_dir().join(format!(
            "cairn-test-s5-{}.json",
            uuid::Uuid::new_v4()
        ))));
        let llm: Arc<dyn LlmProvider> = Arc::new(FakeLlm {
            reply: Mutex::new(Some("merged summary".to_string())),
            fail: false,
        });
        let engine = ConversationEngine::new(store, llm, test_config());

        let mut session = Session::new("alice");
        {
            let conv = session.get_or_create_conversation("root-1");
            for i in 0..21 {
                let role = if i % 2 == 0 { StoreRole::User } else { StoreRole::Assistant };
                conv.messages.push(StoreMessage {
                    role,
                    content: format!("message {i}"),
                    images: Vec::new(),
                });
            }
        }

        engine.compress_oversized_conversations(&mut session).await;

        let conv = session.find_conversation("root-1").unwrap();
        assert_eq!(conv.messages.len(), 10);
        assert!(session.summary.contains("merged summary"));
    }

    #[tokio::test]
    async fn dispatch_success_keeps_conversation_alternating() {
        let mut statuses = HashMap::new();
        statuses.insert("S1", status("S1"));
        let gateway = FakeGateway {
            statuses,
            post_attempts: AtomicUsize::new(0),
            fail_first_post: false,
        };
        let store = Arc::new(SessionStore::load(std::env::temp_dir().join(format!(
            "cairn-test-alt-{}.json",
            uuid::Uuid::new_v4()
        ))));
        let llm: Arc<dyn LlmProvider> = Arc::new(FakeLlm {
            reply: Mutex::new(Some("hi there".to_string())),
            fail: false,
        });
        let engine = ConversationEngine::new(store.clone(), llm, test_config());

        let outcome = engine
            .dispatch_mention(
                &gateway,
                "S1",
                "alice",
                "You are Cairn.",
                "hello",
                Vec::new(),
                "@alice ",
                450,
                500,
                false,
                "public",
            )
            .await
            .unwrap();

        assert!(matches!(outcome, DispatchOutcome::Replied(_)));
        let session = store.get_or_create("alice").await;
        let conv = session.find_conversation("S1").unwrap();
        assert!(conv.alternates());
        assert_eq!(conv.messages.len(), 2);
    }

    #[tokio::test]
    async fn dispatch_rolls_back_when_post_fails() {
        let mut statuses = HashMap::new();
        statuses.insert("S1", status("S1"));
        let gateway = FakeGateway {
            statuses,
            post_attempts: AtomicUsize::new(0),
            fail_first_post: true,
        };
        let store = Arc::new(SessionStore::load(std::env::temp_dir().join(format!(
            "cairn-test-rollback-{}.json",
            uuid::Uuid::new_v4()
        ))));
        let llm: Arc<dyn LlmProvider> = Arc::new(FakeLlm {
            reply: Mutex::new(Some("hi there".to_string())),
            fail: false,
        });
        let engine = ConversationEngine::new(store.clone(), llm, test_config());

        let outcome = engine
            .dispatch_mention(
                &gateway,
                "S1",
                "alice",
                "You are Cairn.",
                "hello",
                Vec::new(),
                "@alice ",
                450,
                500,
                false,
                "public",
            )
            .await
            .unwrap();

        assert!(matches!(outcome, DispatchOutcome::Apologized(_)));
        let session = store.get_or_create("alice").await;
        // The pending user/assistant turns were never persisted.
        assert!(session.find_conversation("S1").is_none());
    }
}
