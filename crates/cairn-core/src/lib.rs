pub mod config;
pub mod error;
pub mod sink;
pub mod types;

pub use config::{CairnConfig, LlmProviderKind};
pub use error::{CairnError, Result};
pub use sink::{ErrorSink, NoopErrorSink};
pub use types::{RequestId, SourceType, UserHandle, Visibility};

/// Initializes the global `tracing` subscriber from `RUST_LOG`, falling
/// back to a sensible default filter. Call once, at process start.
pub fn init_logging(default_filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
