use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("registry JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("could not acquire registry lock after retrying")]
    LockBusy,
}

pub type Result<T> = std::result::Result<T, ClusterError>;
