use std::sync::Arc;

use tracing::debug;

use cairn_mastodon::TimelineEvent;

use crate::handlers::{MentionHandler, UpdateHandler};
use crate::types::DispatchConfig;

/// Routes `TimelineEvent`s off the user stream to the right subsystem: a
/// bot-sender guard, then an allowlist guard, then an exhaustive match over
/// the tagged `TimelineEvent` union. Guard order matters — a self-reply
/// must never reach a handler.
pub struct Dispatcher {
    config: DispatchConfig,
    mentions: Arc<dyn MentionHandler>,
    updates: Arc<dyn UpdateHandler>,
}

impl Dispatcher {
    pub fn new(config: DispatchConfig, mentions: Arc<dyn MentionHandler>, updates: Arc<dyn UpdateHandler>) -> Self {
        Self {
            config,
            mentions,
            updates,
        }
    }

    pub async fn handle_event(self: &Arc<Self>, event: TimelineEvent) {
        match event {
            TimelineEvent::Notification(notification) => {
                if notification.kind != "mention" {
                    return;
                }
                let Some(status) = notification.status else {
                    return;
                };
                if status.account.username == self.config.own_username {
                    debug!(status_id = %status.id, "dropping self-mention");
                    return;
                }
                if !self.config.allow_remote_users && status.account.acct.contains('@') {
                    debug!(status_id = %status.id, "dropping remote-user mention");
                    return;
                }

                let this = Arc::clone(self);
                tokio::spawn(async move {
                    this.mentions.handle_mention(status).await;
                });
            }
            TimelineEvent::Update(status) => {
                let this = Arc::clone(self);
                tokio::spawn(async move {
                    this.updates.handle_update(status).await;
                });
            }
            TimelineEvent::Delete(id) => {
                debug!(status_id = %id, "ignoring delete event");
            }
            TimelineEvent::Other { event, .. } => {
                debug!(event, "ignoring unrecognized stream event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use cairn_mastodon::{Account, Notification, Status};

    struct CountingMentions(Arc<AtomicUsize>);
    #[async_trait::async_trait]
    impl MentionHandler for CountingMentions {
        async fn handle_mention(&self, _status: Status) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct CountingUpdates(Arc<AtomicUsize>);
    #[async_trait::async_trait]
    impl UpdateHandler for CountingUpdates {
        async fn handle_update(&self, _status: Status) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn account(username: &str, acct: &str) -> Account {
        Account {
            id: "1".into(),
            username: username.into(),
            acct: acct.into(),
            display_name: username.into(),
            bot: false,
            note: String::new(),
            fields: vec![],
        }
    }

    fn status(account: Account) -> Status {
        Status {
            id: "s1".into(),
            uri: "uri".into(),
            content: "@bot hi".into(),
            visibility: cairn_core::types::Visibility::Public,
            account,
            in_reply_to_id: None,
            created_at: "now".into(),
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    fn dispatcher(own_username: &str, allow_remote: bool, mention_count: Arc<AtomicUsize>, update_count: Arc<AtomicUsize>) -> Arc<Dispatcher> {
        Arc::new(Dispatcher::new(
            DispatchConfig {
                own_username: own_username.to_string(),
                allow_remote_users: allow_remote,
            },
            Arc::new(CountingMentions(mention_count)),
            Arc::new(CountingUpdates(update_count)),
        ))
    }

    #[tokio::test]
    async fn drops_self_mention() {
        let mentions = Arc::new(AtomicUsize::new(0));
        let updates = Arc::new(AtomicUsize::new(0));
        let d = dispatcher("bot", true, mentions.clone(), updates);

        let n = Notification {
            id: "n1".into(),
            kind: "mention".into(),
            account: account("bot", "bot"),
            status: Some(status(account("bot", "bot"))),
        };
        d.handle_event(TimelineEvent::Notification(n)).await;
        settle().await;
        assert_eq!(mentions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn drops_remote_mention_when_disallowed() {
        let mentions = Arc::new(AtomicUsize::new(0));
        let updates = Arc::new(AtomicUsize::new(0));
        let d = dispatcher("bot", false, mentions.clone(), updates);

        let n = Notification {
            id: "n1".into(),
            kind: "mention".into(),
            account: account("alice", "alice@remote.example"),
            status: Some(status(account("alice", "alice@remote.example"))),
        };
        d.handle_event(TimelineEvent::Notification(n)).await;
        settle().await;
        assert_eq!(mentions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dispatches_eligible_mention() {
        let mentions = Arc::new(AtomicUsize::new(0));
        let updates = Arc::new(AtomicUsize::new(0));
        let d = dispatcher("bot", false, mentions.clone(), updates);

        let n = Notification {
            id: "n1".into(),
            kind: "mention".into(),
            account: account("alice", "alice"),
            status: Some(status(account("alice", "alice"))),
        };
        d.handle_event(TimelineEvent::Notification(n)).await;
        settle().await;
        assert_eq!(mentions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn routes_update_events_for_fact_collection() {
        let mentions = Arc::new(AtomicUsize::new(0));
        let updates = Arc::new(AtomicUsize::new(0));
        let d = dispatcher("bot", false, mentions, updates.clone());

        d.handle_event(TimelineEvent::Update(status(account("alice", "alice")))).await;
        settle().await;
        assert_eq!(updates.load(Ordering::SeqCst), 1);
    }
}
