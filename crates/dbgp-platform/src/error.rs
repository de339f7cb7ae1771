use thiserror::Error;

/// Errors that can occur during platform operations.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("path error: {0}")]
    Path(String),

    #[error("log setup failed: {0}")]
    Log(#[from] std::io::Error),
}
