use async_trait::async_trait;

use cairn_mastodon::Status;

/// Collaborator invoked for each eligible mention, on its own task. Kept as
/// a trait rather than a direct `cairn-conversation` dependency so this
/// crate only knows about routing, not about character prompts, summaries,
/// or any other wiring `cairn-agent` owns.
#[async_trait]
pub trait MentionHandler: Send + Sync {
    async fn handle_mention(&self, status: Status);
}

/// Collaborator invoked for each home-timeline update, for fact collection.
#[async_trait]
pub trait UpdateHandler: Send + Sync {
    async fn handle_update(&self, status: Status);
}
