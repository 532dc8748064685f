use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde_json::json;
use tokio::time::sleep;
use tracing::{instrument, warn};

use crate::error::{GatewayError, Result};
use crate::gateway::{EventStream, MicroblogGateway};
use crate::split::{split_reply, REPLY_POST_DELAY_MS};
use crate::stream::parse_sse_stream;
use crate::types::{Account, ProfileField, Status, TimelineEvent};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct MastodonClient {
    client: Client,
    server: String,
    access_token: String,
}

impl MastodonClient {
    pub fn new(server: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            client: Client::builder().build().expect("mastodon client must build"),
            server: server.into(),
            access_token: access_token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.server.trim_end_matches('/'), path)
    }

    async fn check_status(&self, resp: reqwest::Response) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let message = resp.text().await.unwrap_or_default();
        warn!(status, message, "mastodon api returned an error");
        Err(GatewayError::Api { status, message })
    }
}

#[async_trait]
impl MicroblogGateway for MastodonClient {
    #[instrument(skip(self))]
    async fn connect_user_stream(&self) -> Result<EventStream> {
        self.open_stream("/api/v1/streaming/user").await
    }

    #[instrument(skip(self))]
    async fn connect_public_stream(&self) -> Result<EventStream> {
        self.open_stream("/api/v1/streaming/public").await
    }

    #[instrument(skip(self))]
    async fn get_status(&self, id: &str) -> Result<Status> {
        let resp = self
            .client
            .get(self.url(&format!("/api/v1/statuses/{id}")))
            .bearer_auth(&self.access_token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let resp = self.check_status(resp).await?;
        Ok(resp.json().await?)
    }

    #[instrument(skip(self))]
    async fn get_statuses_by_range(
        &self,
        account_id: &str,
        since_id: Option<&str>,
    ) -> Result<Vec<Status>> {
        let mut req = self
            .client
            .get(self.url(&format!("/api/v1/accounts/{account_id}/statuses")))
            .bearer_auth(&self.access_token)
            .timeout(REQUEST_TIMEOUT);
        if let Some(since) = since_id {
            req = req.query(&[("since_id", since)]);
        }
        let resp = self.check_status(req.send().await?).await?;
        Ok(resp.json().await?)
    }

    #[instrument(skip(self))]
    async fn get_statuses_by_date(
        &self,
        account_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Status>> {
        let statuses = self.get_statuses_by_range(account_id, None).await?;
        Ok(statuses
            .into_iter()
            .filter(|s| {
                DateTime::parse_from_rfc3339(&s.created_at)
                    .map(|d| d.with_timezone(&Utc) >= since)
                    .unwrap_or(false)
            })
            .collect())
    }

    #[instrument(skip(self, text))]
    async fn post_status(
        &self,
        text: &str,
        visibility: &str,
        in_reply_to_id: Option<&str>,
    ) -> Result<Status> {
        let mut body = json!({ "status": text, "visibility": visibility });
        if let Some(id) = in_reply_to_id {
            body["in_reply_to_id"] = json!(id);
        }
        let resp = self
            .client
            .post(self.url("/api/v1/statuses"))
            .bearer_auth(&self.access_token)
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await?;
        let resp = self.check_status(resp).await?;
        Ok(resp.json().await?)
    }

    #[instrument(skip(self, reply_text, mention_prefix))]
    async fn post_reply_with_split(
        &self,
        reply_text: &str,
        mention_prefix: &str,
        in_reply_to_id: &str,
        visibility: &str,
        max_post_chars: usize,
    ) -> Result<Vec<String>> {
        let parts = split_reply(reply_text, mention_prefix, max_post_chars);
        let mut posted_ids = Vec::with_capacity(parts.len());
        let mut parent_id = in_reply_to_id.to_string();

        for (i, part) in parts.iter().enumerate() {
            let full_text = format!("{mention_prefix}{part}");
            let status = self
                .post_status(&full_text, visibility, Some(&parent_id))
                .await?;
            parent_id = status.id.clone();
            posted_ids.push(status.id);
            if i + 1 < parts.len() {
                sleep(Duration::from_millis(REPLY_POST_DELAY_MS)).await;
            }
        }
        Ok(posted_ids)
    }

    #[instrument(skip(self, text, media_bytes))]
    async fn post_reply_with_media(
        &self,
        text: &str,
        in_reply_to_id: &str,
        visibility: &str,
        media_bytes: &[u8],
        media_mime: &str,
    ) -> Result<Status> {
        let part = reqwest::multipart::Part::bytes(media_bytes.to_vec())
            .mime_str(media_mime)
            .map_err(GatewayError::Http)?;
        let form = reqwest::multipart::Form::new().part("file", part);
        let resp = self
            .client
            .post(self.url("/api/v2/media"))
            .bearer_auth(&self.access_token)
            .timeout(REQUEST_TIMEOUT)
            .multipart(form)
            .send()
            .await?;
        let media: serde_json::Value = self.check_status(resp).await?.json().await?;
        let media_id = media["id"].as_str().unwrap_or_default().to_string();

        let body = json!({
            "status": text,
            "visibility": visibility,
            "in_reply_to_id": in_reply_to_id,
            "media_ids": [media_id],
        });
        let resp = self
            .client
            .post(self.url("/api/v1/statuses"))
            .bearer_auth(&self.access_token)
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await?;
        let resp = self.check_status(resp).await?;
        Ok(resp.json().await?)
    }

    #[instrument(skip(self, note))]
    async fn update_profile(&self, note: &str) -> Result<()> {
        let body = json!({ "note": note });
        let resp = self
            .client
            .patch(self.url("/api/v1/accounts/update_credentials"))
            .bearer_auth(&self.access_token)
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await?;
        self.check_status(resp).await?;
        Ok(())
    }

    #[instrument(skip(self, fields))]
    async fn update_profile_fields(&self, fields: Vec<ProfileField>) -> Result<()> {
        let mut form: Vec<(String, String)> = Vec::new();
        for (i, field) in fields.iter().enumerate() {
            form.push((format!("fields_attributes[{i}][name]"), field.name.clone()));
            form.push((format!("fields_attributes[{i}][value]"), field.value.clone()));
        }
        let resp = self
            .client
            .patch(self.url("/api/v1/accounts/update_credentials"))
            .bearer_auth(&self.access_token)
            .timeout(REQUEST_TIMEOUT)
            .form(&form)
            .send()
            .await?;
        self.check_status(resp).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_account_by_username(&self, username: &str) -> Result<Account> {
        let resp = self
            .client
            .get(self.url("/api/v1/accounts/lookup"))
            .bearer_auth(&self.access_token)
            .timeout(REQUEST_TIMEOUT)
            .query(&[("acct", username)])
            .send()
            .await?;
        let resp = self.check_status(resp).await?;
        Ok(resp.json().await?)
    }

    #[instrument(skip(self))]
    async fn follow(&self, account_id: &str) -> Result<()> {
        let resp = self
            .client
            .post(self.url(&format!("/api/v1/accounts/{account_id}/follow")))
            .bearer_auth(&self.access_token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        self.check_status(resp).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn is_following(&self, account_id: &str) -> Result<bool> {
        let resp = self
            .client
            .get(self.url("/api/v1/accounts/relationships"))
            .bearer_auth(&self.access_token)
            .timeout(REQUEST_TIMEOUT)
            .query(&[("id[]", account_id)])
            .send()
            .await?;
        let resp = self.check_status(resp).await?;
        let relationships: Vec<serde_json::Value> = resp.json().await?;
        Ok(relationships
            .first()
            .and_then(|r| r["following"].as_bool())
            .unwrap_or(false))
    }
}

impl MastodonClient {
    async fn open_stream(&self, path: &str) -> Result<EventStream> {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let resp = self.check_status(resp).await?;
        let byte_stream = resp.bytes_stream();
        let events = parse_sse_stream(byte_stream);
        let pinned: Pin<Box<dyn Stream<Item = TimelineEvent> + Send>> = Box::pin(events);
        Ok(pinned)
    }
}
