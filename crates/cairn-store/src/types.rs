use cairn_core::types::SourceType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One turn in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub mime_type: String,
    pub base64_data: String,
}

/// One reply thread, identified by the id of its root status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub root_status_id: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new(root_status_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            root_status_id: root_status_id.into(),
            created_at: now,
            last_updated: now,
            messages: Vec::new(),
        }
    }

    /// Roles must alternate user/assistant after any successful dispatch cycle.
    pub fn alternates(&self) -> bool {
        self.messages
            .windows(2)
            .all(|w| w[0].role != w[1].role)
    }
}

/// Per-user durable memory: an ordered set of reply threads plus a running
/// long-term summary of everything compressed out of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user_handle: String,
    #[serde(default)]
    pub summary: String,
    pub last_updated: DateTime<Utc>,
    pub conversations: Vec<Conversation>,
}

impl Session {
    pub fn new(user_handle: impl Into<String>) -> Self {
        Self {
            user_handle: user_handle.into(),
            summary: String::new(),
            last_updated: Utc::now(),
            conversations: Vec::new(),
        }
    }

    pub fn find_conversation(&self, root_status_id: &str) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|c| c.root_status_id == root_status_id)
    }

    pub fn find_conversation_mut(&mut self, root_status_id: &str) -> Option<&mut Conversation> {
        self.conversations
            .iter_mut()
            .find(|c| c.root_status_id == root_status_id)
    }

    pub fn get_or_create_conversation(&mut self, root_status_id: &str) -> &mut Conversation {
        if self.find_conversation(root_status_id).is_none() {
            self.conversations.push(Conversation::new(root_status_id));
        }
        self.find_conversation_mut(root_status_id).unwrap()
    }

    pub fn append_summary(&mut self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        if !self.summary.is_empty() {
            self.summary.push('\n');
        }
        self.summary.push_str(text.trim());
    }
}

/// A single (target, key) attribution, upserted by timestamp precedence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub target: String,
    pub target_display_name: String,
    pub author: String,
    pub key: String,
    pub value: String,
    pub timestamp: DateTime<Utc>,
    pub source_type: SourceType,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub post_author: Option<String>,
}

impl Fact {
    pub fn identity(&self) -> (&str, &str) {
        (&self.target, &self.key)
    }
}
