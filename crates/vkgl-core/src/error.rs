use crate::handle::Handle;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("handle not found: {0:?}")]
    HandleNotFound(Handle),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
