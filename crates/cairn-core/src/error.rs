use thiserror::Error;

#[derive(Debug, Error)]
pub enum CairnError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("gateway error: {0}")]
    Gateway(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CairnError {
    /// Short machine-readable code, used when formatting error-sink notifications.
    pub fn code(&self) -> &'static str {
        match self {
            CairnError::Config(_) => "CONFIG_ERROR",
            CairnError::Validation(_) => "VALIDATION_ERROR",
            CairnError::Parse(_) => "PARSE_ERROR",
            CairnError::Persistence(_) => "PERSISTENCE_ERROR",
            CairnError::Network(_) => "NETWORK_ERROR",
            CairnError::LlmProvider(_) => "LLM_PROVIDER_ERROR",
            CairnError::Gateway(_) => "GATEWAY_ERROR",
            CairnError::RateLimited(_) => "RATE_LIMITED",
            CairnError::Serialization(_) => "SERIALIZATION_ERROR",
            CairnError::Io(_) => "IO_ERROR",
            CairnError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, CairnError>;
