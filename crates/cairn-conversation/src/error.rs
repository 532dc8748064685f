use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("LLM provider error: {0}")]
    Llm(#[from] cairn_llm::ProviderError),

    #[error("gateway error: {0}")]
    Gateway(#[from] cairn_mastodon::GatewayError),

    #[error("store error: {0}")]
    Store(#[from] cairn_store::StoreError),
}

pub type Result<T> = std::result::Result<T, ConversationError>;
