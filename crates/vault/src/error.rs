use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    /// Blob is not `iv:tag:ciphertext` hex, or a segment has the wrong size.
    #[error("malformed encrypted blob: {0}")]
    Format(String),

    /// Tag did not verify: tampered ciphertext or wrong key.
    #[error("authentication tag mismatch")]
    Authentication,

    #[error("vault misconfigured: {0}")]
    Configuration(String),

    #[error("encoding error: {0}")]
    Encoding(String),
}
