use cairn_core::types::Visibility;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub id: String,
    pub username: String,
    pub acct: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub bot: bool,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub fields: Vec<ProfileField>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Status {
    pub id: String,
    pub uri: String,
    pub content: String,
    pub visibility: Visibility,
    pub account: Account,
    #[serde(default)]
    pub in_reply_to_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub account: Account,
    #[serde(default)]
    pub status: Option<Status>,
}

/// Tagged sum over the streaming feed's event shapes, per the design note
/// that calls for exhaustive matching over a discriminated union rather
/// than ad hoc `serde_json::Value` inspection.
#[derive(Debug, Clone)]
pub enum TimelineEvent {
    Notification(Notification),
    Update(Status),
    Delete(String),
    Other { event: String, raw: String },
}

pub struct ReplyPlan {
    pub parts: Vec<String>,
}
