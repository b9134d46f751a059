use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("key size mismatch: expected {expected} bytes, got {actual}")]
    KeySizeMismatch { expected: usize, actual: usize },

    #[error("malformed ciphertext: {0} bytes is not a whole number of 16-byte blocks")]
    MalformedCiphertext(usize),

    #[error("padding check failed: wrong key or corrupted data")]
    PaddingError,

    #[error("container too short: {len} bytes (header needs {needed})")]
    ContainerTooShort { len: usize, needed: usize },

    #[error("cipher engine already finalized")]
    EngineFinalized,

    #[error("key derivation failed: {0}")]
    Kdf(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
