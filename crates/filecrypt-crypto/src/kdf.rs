//! Key derivation: Argon2id password → 256-bit server key

use argon2::{Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::keys::Key;
use crate::{SALT_SIZE, SERVER_KEY_SIZE};

/// Cost settings for the server-path password KDF.
///
/// Decryption must use the same parameters that were used to encrypt;
/// they are not recorded in the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfParams {
    /// KiB of memory per derivation; 64 MiB by default
    pub mem_cost_kib: u32,
    /// Argon2 passes over memory
    pub time_cost: u32,
    /// Lanes
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_cost_kib: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

impl KdfParams {
    /// Check the costs against Argon2's limits without deriving anything.
    pub fn validate(&self) -> CryptoResult<()> {
        self.argon2_params().map(|_| ())
    }

    fn argon2_params(&self) -> CryptoResult<Params> {
        Params::new(
            self.mem_cost_kib,
            self.time_cost,
            self.parallelism,
            Some(SERVER_KEY_SIZE),
        )
        .map_err(|e| CryptoError::Kdf(format!("invalid Argon2id params: {e}")))
    }
}

/// Derive a 256-bit key from a password and salt using Argon2id.
///
/// The salt is 16 random bytes stored in plaintext at the start of the
/// container; it does not need to be secret.
pub fn derive_key(
    password: &SecretString,
    salt: &[u8; SALT_SIZE],
    params: &KdfParams,
) -> CryptoResult<Key> {
    if password.expose_secret().is_empty() {
        return Err(CryptoError::InvalidInput("password is empty".into()));
    }

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.argon2_params()?);

    let mut key = [0u8; SERVER_KEY_SIZE];
    argon2
        .hash_password_into(password.expose_secret().as_bytes(), salt, &mut key)
        .map_err(|e| CryptoError::Kdf(format!("Argon2id failed: {e}")))?;

    let derived = Key::from_bytes(&key);
    key.zeroize();
    Ok(derived)
}

#[cfg(test)]
pub(crate) fn fast_params() -> KdfParams {
    KdfParams {
        mem_cost_kib: 1024,
        time_cost: 1,
        parallelism: 1,
    }
}
