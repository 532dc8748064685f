use tracing::warn;

use crate::gateway::MicroblogGateway;
use crate::types::Status;

/// Walks `in_reply_to_id` pointers until a status with no parent is
/// reached, returning that status's id as the conversation's root. Any
/// fetch failure along the chain falls back to `notification_status_id`
/// rather than propagating — a thread root is a best-effort grouping key,
/// not something worth failing the whole dispatch cycle over.
pub async fn resolve_root_status_id(
    gateway: &dyn MicroblogGateway,
    notification_status_id: &str,
) -> String {
    let mut current_id = notification_status_id.to_string();
    loop {
        let status: Status = match gateway.get_status(&current_id).await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, status_id = %current_id, "failed to resolve root status, falling back to notification status");
                return notification_status_id.to_string();
            }
        };
        match status.in_reply_to_id {
            Some(parent_id) if parent_id != current_id => current_id = parent_id,
            _ => return current_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GatewayError, Result};
    use crate::gateway::EventStream;
    use crate::types::{Account, ProfileField};
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct FakeGateway {
        statuses: HashMap<&'static str, Status>,
        fail_on: Option<&'static str>,
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

    fn status(id: &'static str, parent: Option<&'static str>) -> Status {
        Status {
            id: id.into(),
            uri: format!("https://example.com/{id}"),
            content: String::new(),
            visibility: cairn_core::types::Visibility::Public,
            account: account(),
            in_reply_to_id: parent.map(str::to_string),
            created_at: "2024-01-01T00:00:00Z".into(),
        }
    }

    #[async_trait]
    impl MicroblogGateway for FakeGateway {
        async fn connect_user_stream(&self) -> Result<EventStream> {
            unimplemented!()
        }
        async fn connect_public_stream(&self) -> Result<EventStream> {
            unimplemented!()
        }
        async fn get_status(&self, id: &str) -> Result<Status> {
            if self.fail_on == Some(id) {
                return Err(GatewayError::NotFound(id.to_string()));
            }
            self.statuses
                .get(id)
                .cloned()
                .ok_or_else(|| GatewayError::NotFound(id.to_string()))
        }
        async fn get_statuses_by_range(&self, _: &str, _: Option<&str>) -> Result<Vec<Status>> {
            unimplemented!()
        }
        async fn get_statuses_by_date(
            &self,
            _: &str,
            _: chrono::DateTime<chrono::Utc>,
        ) -> Result<Vec<Status>> {
            unimplemented!()
        }
        async fn post_status(&self, _: &str, _: &str, _: Option<&str>) -> Result<Status> {
            unimplemented!()
        }
        async fn post_reply_with_split(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: &str,
            _: usize,
        ) -> Result<Vec<String>> {
            unimplemented!()
        }
        async fn post_reply_with_media(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: &[u8],
            _: &str,
        ) -> Result<Status> {
            unimplemented!()
        }
        async fn update_profile(&self, _: &str) -> Result<()> {
            unimplemented!()
        }
        async fn update_profile_fields(&self, _: Vec<ProfileField>) -> Result<()> {
            unimplemented!()
        }
        async fn get_account_by_username(&self, _: &str) -> Result<Account> {
            unimplemented!()
        }
        async fn follow(&self, _: &str) -> Result<()> {
            unimplemented!()
        }
        async fn is_following(&self, _: &str) -> Result<bool> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn scenario_s3_resolves_chain_root() {
        let mut statuses = HashMap::new();
        statuses.insert("S1", status("S1", None));
        statuses.insert("S2", status("S2", Some("S1")));
        statuses.insert("S3", status("S3", Some("S2")));
        let gateway = FakeGateway {
            statuses,
            fail_on: None,
        };
        let root = resolve_root_status_id(&gateway, "S3").await;
        assert_eq!(root, "S1");
    }

    #[tokio::test]
    async fn scenario_s3_falls_back_on_fetch_error() {
        let mut statuses = HashMap::new();
        statuses.insert("S1", status("S1", None));
        statuses.insert("S3", status("S3", Some("S2")));
        let gateway = FakeGateway {
            statuses,
            fail_on: Some("S2"),
        };
        let root = resolve_root_status_id(&gateway, "S3").await;
        assert_eq!(root, "S3");
    }
}
