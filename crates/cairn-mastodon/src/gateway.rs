use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::error::Result;
use crate::types::{Account, ProfileField, Status, TimelineEvent};

pub type EventStream = Pin<Box<dyn Stream<Item = TimelineEvent> + Send>>;

/// The microblog client surface the rest of the system depends on. A thin
/// `reqwest`-backed implementation (`MastodonClient`) is the only
/// implementation shipped; the trait exists so the conversation engine,
/// fact pipeline, and dispatcher can be exercised against a fake in tests.
#[async_trait]
pub trait MicroblogGateway: Send + Sync {
    async fn connect_user_stream(&self) -> Result<EventStream>;
    async fn connect_public_stream(&self) -> Result<EventStream>;

    async fn get_status(&self, id: &str) -> Result<Status>;
    async fn get_statuses_by_range(&self, account_id: &str, since_id: Option<&str>) -> Result<Vec<Status>>;
    async fn get_statuses_by_date(&self, account_id: &str, since: chrono::DateTime<chrono::Utc>) -> Result<Vec<Status>>;

    async fn post_status(&self, text: &str, visibility: &str, in_reply_to_id: Option<&str>) -> Result<Status>;

    /// Posts `text` (already including the mention prefix for the first
    /// part), splitting across multiple statuses if it exceeds
    /// `max_post_chars`, threading each continuation off the previously
    /// posted part. Returns the ids of every status posted, in order.
    async fn post_reply_with_split(
        &self,
        reply_text: &str,
        mention_prefix: &str,
        in_reply_to_id: &str,
        visibility: &str,
        max_post_chars: usize,
    ) -> Result<Vec<String>>;

    async fn post_reply_with_media(
        &self,
        text: &str,
        in_reply_to_id: &str,
        visibility: &str,
        media_bytes: &[u8],
        media_mime: &str,
    ) -> Result<Status>;

    async fn update_profile(&self, note: &str) -> Result<()>;
    async fn update_profile_fields(&self, fields: Vec<ProfileField>) -> Result<()>;

    async fn get_account_by_username(&self, username: &str) -> Result<Account>;
    async fn follow(&self, account_id: &str) -> Result<()>;
    async fn is_following(&self, account_id: &str) -> Result<bool>;
}
