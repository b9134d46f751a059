use filecrypt_crypto::CryptoError;
use thiserror::Error;

pub type FilecryptResult<T> = Result<T, FilecryptError>;

#[derive(Debug, Error)]
pub enum FilecryptError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("config error: {0}")]
    Config(String),

    /// Best-effort temp/partial file removal failed. Logged, never returned
    /// in place of the operation's own outcome.
    #[error("resource cleanup failed: {0}")]
    ResourceCleanupFailure(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FilecryptError {
    /// True for errors caused by the caller's input rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            FilecryptError::Crypto(
                CryptoError::InvalidInput(_)
                    | CryptoError::InvalidKeyFormat(_)
                    | CryptoError::MalformedCiphertext(_)
                    | CryptoError::PaddingError
                    | CryptoError::ContainerTooShort { .. }
            )
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crypto_errors_pass_through_verbatim() {
        let err: FilecryptError = CryptoError::PaddingError.into();
        assert_eq!(err.to_string(), CryptoError::PaddingError.to_string());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_io_is_server_side() {
        let err: FilecryptError = std::io::Error::other("disk full").into();
        assert!(!err.is_client_error());
        assert!(err.to_string().contains("disk full"));
    }
}
