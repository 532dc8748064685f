pub mod anthropic;
pub mod gemini;
pub mod prompt;
pub mod provider;

pub use anthropic::ClaudeProvider;
pub use gemini::GeminiProvider;
pub use prompt::{build_system_prompt, extract_json, unmarshal_with_repair};
pub use provider::{LlmProvider, Message, ProviderError, Role};
