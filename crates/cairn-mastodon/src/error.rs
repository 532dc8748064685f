use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("stream ended")]
    StreamEnded,

    #[error("not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
