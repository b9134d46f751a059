//! End-to-end operations for both key paths
//!
//! - Client path (`*_with_key`): AES-128-CBC, in memory, random IV prepended.
//! - Server path (`*_with_password`): Argon2id + AES-256-CBC, streamed, with a
//!   `salt || iv` header.
//!
//! The streaming functions write plaintext/ciphertext as they go. If they
//! return an error, whatever reached the writer must be discarded by the
//! caller.

use std::io::{Read, Write};

use secrecy::SecretString;
use tracing::debug;

use crate::container::{ClientEnvelope, Header, HEADER_SIZE};
use crate::engine::{CipherEngine, CipherSuite, Mode};
use crate::error::{CryptoError, CryptoResult};
use crate::kdf::{derive_key, KdfParams};
use crate::keys::{generate_iv, generate_salt, Key};
use crate::processor::{ChunkProcessor, ProcessorOptions};
use crate::IV_SIZE;

/// Encrypt `plaintext` with a 16-byte client key. Output: `iv || ciphertext`.
pub fn encrypt_with_key<F>(
    plaintext: &[u8],
    key: &Key,
    options: ProcessorOptions,
    on_progress: F,
) -> CryptoResult<Vec<u8>>
where
    F: FnMut(u8),
{
    let processor = ChunkProcessor::new(options)?;
    let iv = generate_iv();
    let mut engine = CipherEngine::init(CipherSuite::Aes128Cbc, Mode::Encrypt, key, &iv)?;

    let mut out = Vec::with_capacity(IV_SIZE + plaintext.len() + 16);
    out.extend_from_slice(&iv);
    processor.run_stream(plaintext, &mut out, plaintext.len() as u64, &mut engine, on_progress)?;
    Ok(out)
}

/// Decrypt an `iv || ciphertext` envelope produced by [`encrypt_with_key`].
pub fn decrypt_with_key<F>(
    envelope: &[u8],
    key: &Key,
    options: ProcessorOptions,
    on_progress: F,
) -> CryptoResult<Vec<u8>>
where
    F: FnMut(u8),
{
    let processor = ChunkProcessor::new(options)?;
    let env = ClientEnvelope::unwrap(envelope)?;
    let mut engine = CipherEngine::init(CipherSuite::Aes128Cbc, Mode::Decrypt, key, &env.iv)?;
    processor.run(env.ciphertext, &mut engine, on_progress)
}

/// Encrypt a stream under a password-derived key.
///
/// Writes `salt || iv` followed by the ciphertext and returns the total
/// number of bytes written. `total_len` is the plaintext length, used for
/// progress only.
pub fn encrypt_with_password<R, W, F>(
    reader: R,
    mut writer: W,
    total_len: u64,
    password: &SecretString,
    kdf: &KdfParams,
    options: ProcessorOptions,
    on_progress: F,
) -> CryptoResult<u64>
where
    R: Read,
    W: Write,
    F: FnMut(u8),
{
    let processor = ChunkProcessor::new(options)?;
    let header = Header {
        salt: generate_salt(),
        iv: generate_iv(),
    };
    let key = derive_key(password, &header.salt, kdf)?;
    let mut engine = CipherEngine::init(CipherSuite::Aes256Cbc, Mode::Encrypt, &key, &header.iv)?;

    header.write_to(&mut writer)?;
    let body = processor.run_stream(reader, &mut writer, total_len, &mut engine, on_progress)?;
    debug!(bytes = HEADER_SIZE as u64 + body, "container written");
    Ok(HEADER_SIZE as u64 + body)
}

/// Decrypt a `salt || iv || ciphertext` stream with a password.
///
/// `total_len` is the full container length (header included), used for
/// progress only. A wrong password is normally reported as
/// [`CryptoError::PaddingError`].
pub fn decrypt_with_password<R, W, F>(
    mut reader: R,
    writer: W,
    total_len: u64,
    password: &SecretString,
    kdf: &KdfParams,
    options: ProcessorOptions,
    on_progress: F,
) -> CryptoResult<u64>
where
    R: Read,
    W: Write,
    F: FnMut(u8),
{
    let processor = ChunkProcessor::new(options)?;
    let header = Header::read_from(&mut reader)?;
    let key = derive_key(password, &header.salt, kdf)?;
    let mut engine = CipherEngine::init(CipherSuite::Aes256Cbc, Mode::Decrypt, &key, &header.iv)?;

    let body_len = total_len.saturating_sub(HEADER_SIZE as u64);
    processor
        .run_stream(reader, writer, body_len, &mut engine, on_progress)
        .inspect_err(|e| {
            if matches!(e, CryptoError::PaddingError) {
                debug!("container padding check failed (wrong password?)");
            }
        })
}
