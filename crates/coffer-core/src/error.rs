use thiserror::Error;

pub type CofferResult<T> = Result<T, CofferError>;

#[derive(Debug, Error)]
pub enum CofferError {
    /// Missing or invalid key material, or a box that could not be fully resolved.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Authentication failed, wrong key, or malformed ciphertext header.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Padding stripped from decrypted plaintext is structurally invalid.
    #[error("invalid padding: {0}")]
    Padding(String),

    /// Attachment shape recognized but not handled.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("migration already running for {0}")]
    MigrationInProgress(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CofferError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn decryption(msg: impl Into<String>) -> Self {
        Self::Decryption(msg.into())
    }

    /// Failures that end a whole migration run rather than a single record.
    pub fn is_systemic(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::MigrationInProgress(_) | Self::Io(_)
        )
    }
}
