use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A microblog account handle, e.g. `alice` or `alice@remote.example`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserHandle(pub String);

impl UserHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the handle carries an explicit remote host part.
    pub fn is_remote(&self) -> bool {
        self.0.contains('@')
    }

    /// The reserved bucket for facts not about any particular user.
    pub fn general() -> Self {
        Self("__general__".to_string())
    }
}

impl fmt::Display for UserHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserHandle {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserHandle {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A correlation id for one dispatch cycle (time-sortable, useful in logs).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a fact was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Mention,
    Home,
    Federated,
    System,
    #[serde(rename = "self")]
    SelfIntro,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceType::Mention => "mention",
            SourceType::Home => "home",
            SourceType::Federated => "federated",
            SourceType::System => "system",
            SourceType::SelfIntro => "self",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "mention" => Ok(SourceType::Mention),
            "home" => Ok(SourceType::Home),
            "federated" => Ok(SourceType::Federated),
            "system" => Ok(SourceType::System),
            "self" => Ok(SourceType::SelfIntro),
            other => Err(format!("unknown source type: {other}")),
        }
    }
}

/// Visibility level of a status, as reported by the microblog gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Unlisted,
    Private,
    Direct,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Visibility::Public => "public",
            Visibility::Unlisted => "unlisted",
            Visibility::Private => "private",
            Visibility::Direct => "direct",
        };
        write!(f, "{s}")
    }
}
