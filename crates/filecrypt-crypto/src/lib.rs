//! filecrypt-crypto: streaming AES-CBC file encryption
//!
//! Architecture: fixed-window chunking over a single CBC chain
//!
//! Pipeline: plaintext → 1 MiB windows → CBC (carry block threaded across windows) → PKCS#7 on the last window
//!
//! Key sources:
//! ```text
//! Client path: random 128-bit key (shown as 32 hex chars)
//!   └── AES-128-CBC, artifact = iv(16) || ciphertext
//! Server path: Argon2id(password, salt) → 256-bit key
//!   └── AES-256-CBC, artifact = salt(16) || iv(16) || ciphertext
//! ```
//!
//! There is no integrity tag. A wrong key is normally detected by the
//! padding check on the final block, but not always.

pub mod channel;
pub mod container;
pub mod engine;
pub mod error;
pub mod kdf;
pub mod keys;
pub mod pipeline;
pub mod processor;

pub use channel::{ChannelEvent, ChannelRequest, Operation, StreamChannel};
pub use container::{unwrap, wrap, ClientEnvelope, Header, HEADER_SIZE};
pub use engine::{CipherEngine, CipherState, CipherSuite, Mode, Phase};
pub use error::{CryptoError, CryptoResult};
pub use kdf::{derive_key, KdfParams};
pub use keys::{generate_iv, generate_random_key, generate_salt, parse_key_hex, Key};
pub use pipeline::{decrypt_with_key, decrypt_with_password, encrypt_with_key, encrypt_with_password};
pub use processor::{ChunkProcessor, ProcessorOptions};

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// Size of a CBC initialization vector
pub const IV_SIZE: usize = 16;

/// Size of the random KDF salt stored in server containers
pub const SALT_SIZE: usize = 16;

/// Client-path key size (AES-128)
pub const CLIENT_KEY_SIZE: usize = 16;

/// Server-path key size (AES-256)
pub const SERVER_KEY_SIZE: usize = 32;

/// Default processing window (1 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;
