use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("backend call failed: {0:#}")]
    Transport(#[from] anyhow::Error),
    #[error("invalid payload: {0}")]
    Validation(String),
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("no active chat")]
    NoActiveChat,
}

impl SyncError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
