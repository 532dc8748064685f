use async_trait::async_trait;

/// A single message in the conversation history handed to the LLM.
#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[allow(clippy::type_complexity)]
    pub images: Vec<(String, String)>, // (mime_type, base64_data)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// Common interface for the two providers this system speaks: Claude and
/// Gemini. No tool calling, no extended-thinking blocks, no streaming, no
/// token introspection/refresh — this system sends one request and waits
/// for one response.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate_text(
        &self,
        messages: &[Message],
        system_prompt: &str,
        max_tokens: u32,
    ) -> Result<String, ProviderError>;

    /// Generates an SVG image as a text completion (`<svg>…</svg>` bytes).
    /// Rasterization to PNG is a separate out-of-scope collaborator.
    async fn generate_image(&self, prompt: &str, max_tokens: u32) -> Result<Vec<u8>, ProviderError> {
        let svg = self
            .generate_text(
                &[Message {
                    role: Role::User,
                    content: prompt.to_string(),
                    images: Vec::new(),
                }],
                "Respond with a single well-formed <svg>...</svg> document and nothing else.",
                max_tokens,
            )
            .await?;
        Ok(svg.into_bytes())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("empty response")]
    Empty,
}
