use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("blocked: {0}")]
    Blocked(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("response too large (> {0} bytes)")]
    TooLarge(usize),

    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),
}

pub type Result<T> = std::result::Result<T, FetchError>;
