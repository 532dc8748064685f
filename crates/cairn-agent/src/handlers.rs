//! Bridges the decoupled `cairn-dispatch` routing seam to the conversation
//! and fact-collection engines, plus the broadcast-command and follow-back
//! behaviors that have no home in any lower crate.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use cairn_dispatch::{MentionHandler, UpdateHandler};
use cairn_facts::{is_verified_peer, PeerProfile};
use cairn_mastodon::{resolve_root_status_id, strip_html, Status};
use cairn_profile::BroadcastTracker;

use crate::app::BotContext;

pub struct AgentMentionHandler {
    pub ctx: Arc<BotContext>,
}

pub struct AgentUpdateHandler {
    pub ctx: Arc<BotContext>,
}

#[async_trait]
impl MentionHandler for AgentMentionHandler {
    async fn handle_mention(&self, status: Status) {
        let ctx = &self.ctx;
        let plain = strip_html(&status.content);
        let user_text = strip_own_mentions(&plain);
        if user_text.trim().is_empty() {
            return;
        }
        let user = status.account.username.clone();

        maybe_follow_back(ctx, &status, user_text).await;

        let mention_prefix = format!("@{} ", status.account.acct);
        let visibility = status.visibility.to_string();
        let outcome = ctx
            .conversation
            .dispatch_mention(
                ctx.gateway.as_ref(),
                &status.id,
                &user,
                &ctx.config.character_prompt,
                user_text,
                Vec::new(),
                &mention_prefix,
                ctx.config.max_post_chars,
                ctx.config.max_response_tokens,
                false,
                &visibility,
            )
            .await;

        match outcome {
            Ok(_) => ctx.metrics.record_mention(),
            Err(e) => {
                warn!(error = %e, user = %user, "mention dispatch failed");
                ctx.metrics.record_error();
                ctx.sink.notify("mention dispatch failed", &e.to_string()).await;
            }
        }
    }
}

#[async_trait]
impl UpdateHandler for AgentUpdateHandler {
    async fn handle_update(&self, status: Status) {
        let ctx = &self.ctx;
        if !ctx.config.fact_collection_home {
            return;
        }
        let plain = strip_html(&status.content);

        if BroadcastTracker::is_trigger(&plain, &ctx.broadcast_config.trigger) {
            match ctx.gateway.is_following(&status.account.id).await {
                Ok(true) => {
                    handle_broadcast(ctx, &status, &plain).await;
                    return;
                }
                Ok(false) => {}
                Err(e) => warn!(error = %e, "broadcast follow-check failed"),
            }
        }

        if !ctx.config.fact_collection_enabled {
            return;
        }

        let is_peer = is_verified_peer(&status.account, &ctx.own_auth_key);
        let peer_profile = is_peer.then(|| PeerProfile {
            name: status.account.display_name.clone(),
            bio: strip_html(&status.account.note),
        });

        ctx.collector
            .process_status(&status, &ctx.config.bot_username, is_peer, peer_profile)
            .await;
        ctx.metrics.record_fact();
    }
}

/// An unfollowed user mentioning the bot and asking to be followed triggers
/// a follow-back before the mention is answered normally.
async fn maybe_follow_back(ctx: &BotContext, status: &Status, user_text: &str) {
    if !user_text.to_lowercase().contains("follow me") {
        return;
    }
    match ctx.gateway.is_following(&status.account.id).await {
        Ok(false) => match ctx.gateway.follow(&status.account.id).await {
            Ok(()) => info!(user = %status.account.username, "followed back after mention request"),
            Err(e) => warn!(error = %e, user = %status.account.username, "follow-back failed"),
        },
        Ok(true) => {}
        Err(e) => warn!(error = %e, user = %status.account.username, "follow-back relationship check failed"),
    }
}

/// A followed user's status opening with the broadcast trigger is answered
/// as a mention, threaded with any of that user's recent broadcast commands,
/// but never fed to the fact pipeline.
async fn handle_broadcast(ctx: &BotContext, status: &Status, plain: &str) {
    let user = status.account.username.clone();
    let command_text = BroadcastTracker::strip_trigger(plain, &ctx.broadcast_config.trigger);
    if command_text.trim().is_empty() {
        return;
    }

    let now = Utc::now();
    let window = ctx.broadcast_config.thread_window_minutes;
    let target_id = ctx.broadcast.thread_for(&user, now, window).unwrap_or_else(|| status.id.clone());
    let root = resolve_root_status_id(ctx.gateway.as_ref(), &target_id).await;
    ctx.broadcast.record(&user, &root, now);

    let mention_prefix = format!("@{} ", status.account.acct);
    let visibility = status.visibility.to_string();
    let outcome = ctx
        .conversation
        .dispatch_mention(
            ctx.gateway.as_ref(),
            &root,
            &user,
            &ctx.config.character_prompt,
            command_text,
            Vec::new(),
            &mention_prefix,
            ctx.config.max_post_chars,
            ctx.config.max_response_tokens,
            false,
            &visibility,
        )
        .await;

    match outcome {
        Ok(_) => ctx.metrics.record_mention(),
        Err(e) => {
            warn!(error = %e, user = %user, "broadcast dispatch failed");
            ctx.metrics.record_error();
        }
    }
}

/// Strips every leading `@handle` mention token (the bot's own mention, plus
/// any other accounts CC'd ahead of it) so the LLM only sees the human text
/// that follows. No dedicated helper for this exists anywhere in the
/// lower crates — mention stripping is dispatch-layer policy, not gateway
/// plumbing.
fn strip_own_mentions(text: &str) -> &str {
    let mut rest = text.trim_start();
    while let Some(stripped) = rest.strip_prefix('@') {
        match stripped.find(char::is_whitespace) {
            Some(idx) => rest = stripped[idx..].trim_start(),
            None => {
                rest = "";
                break;
            }
        }
    }
    rest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_leading_mention_and_keeps_rest() {
        assert_eq!(strip_own_mentions("@bot hello \nworld"), "hello \nworld");
    }

    #[test]
    fn strips_multiple_leading_mentions() {
        assert_eq!(strip_own_mentions("@bot @other hi there"), "hi there");
    }

    #[test]
    fn leaves_text_with_no_leading_mention_untouched() {
        assert_eq!(strip_own_mentions("hello @bot"), "hello @bot");
    }

    #[test]
    fn mention_only_text_strips_to_empty() {
        assert_eq!(strip_own_mentions("@bot"), "");
    }
}
