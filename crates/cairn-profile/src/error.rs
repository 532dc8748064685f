use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("LLM provider error: {0}")]
    Llm(#[from] cairn_llm::ProviderError),

    #[error("gateway error: {0}")]
    Gateway(#[from] cairn_mastodon::GatewayError),
}

pub type Result<T> = std::result::Result<T, ProfileError>;
