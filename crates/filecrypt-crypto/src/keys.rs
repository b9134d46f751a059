//! Key material: random client keys, hex key parsing, salt and IV generation

use rand::RngCore;
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::{CLIENT_KEY_SIZE, IV_SIZE, SALT_SIZE};

/// A symmetric AES key (16 bytes on the client path, 32 on the server path).
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct Key {
    bytes: Vec<u8>,
}

impl Key {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lowercase hex form, as displayed to the user on the client path.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

impl Drop for Key {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Key")
            .field("len", &self.bytes.len())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random 128-bit client key from the thread-local CSPRNG.
pub fn generate_random_key() -> Key {
    let mut bytes = [0u8; CLIENT_KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    let key = Key::from_bytes(&bytes);
    bytes.zeroize();
    key
}

/// Generate a fresh random KDF salt.
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Generate a fresh random CBC initialization vector.
pub fn generate_iv() -> [u8; IV_SIZE] {
    let mut iv = [0u8; IV_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);
    iv
}

/// Parse a client key given as exactly 32 hex digits (either case).
///
/// This is the gate every user-supplied key passes before reaching the engine.
pub fn parse_key_hex(hex_str: &str) -> CryptoResult<Key> {
    if hex_str.len() != CLIENT_KEY_SIZE * 2 {
        return Err(CryptoError::InvalidKeyFormat(format!(
            "expected {} hex characters, got {}",
            CLIENT_KEY_SIZE * 2,
            hex_str.chars().count()
        )));
    }
    if let Some(bad) = hex_str.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(CryptoError::InvalidKeyFormat(format!(
            "non-hex character {bad:?}"
        )));
    }

    let mut bytes =
        hex::decode(hex_str).map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))?;
    let key = Key::from_bytes(&bytes);
    bytes.zeroize();
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_random_key_generation() {
        let k1 = generate_random_key();
        let k2 = generate_random_key();
        assert_eq!(k1.len(), CLIENT_KEY_SIZE);
        assert_ne!(k1.as_bytes(), k2.as_bytes(), "random keys must differ");
    }

    #[test]
    fn test_parse_known_key() {
        let key = parse_key_hex("00112233445566778899aabbccddeeff").unwrap();
        assert_eq!(
            key.as_bytes(),
            &[
                0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc,
                0xdd, 0xee, 0xff
            ]
        );
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let lower = parse_key_hex("00112233445566778899aabbccddeeff").unwrap();
        let upper = parse_key_hex("00112233445566778899AABBCCDDEEFF").unwrap();
        assert_eq!(lower.as_bytes(), upper.as_bytes());
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        for bad in [
            "",
            "0011",
            "00112233445566778899aabbccddeef",
            "00112233445566778899aabbccddeeff0",
            "00112233445566778899aabbccddeefg",
            " 0112233445566778899aabbccddeeff",
            "0x112233445566778899aabbccddeeff",
        ] {
            assert!(
                matches!(parse_key_hex(bad), Err(CryptoError::InvalidKeyFormat(_))),
                "{bad:?} must be rejected"
            );
        }
    }

    #[test]
    fn test_parse_rejects_multibyte_chars() {
        // 32 bytes long but not 32 hex digits
        let s = "é0112233445566778899aabbccddeef";
        assert_eq!(s.len(), 32);
        assert!(parse_key_hex(s).is_err());
    }

    #[test]
    fn test_hex_roundtrip() {
        let key = generate_random_key();
        let parsed = parse_key_hex(&key.to_hex()).unwrap();
        assert_eq!(key.as_bytes(), parsed.as_bytes());
    }

    #[test]
    fn test_debug_redacts_bytes() {
        let key = parse_key_hex("00112233445566778899aabbccddeeff").unwrap();
        let dbg = format!("{key:?}");
        assert!(dbg.contains("REDACTED"));
        assert!(!dbg.contains("aabb"));
    }

    proptest! {
        #[test]
        fn accepts_any_32_hex_digits(s in "[0-9a-fA-F]{32}") {
            let key = parse_key_hex(&s).unwrap();
            prop_assert_eq!(key.to_hex(), s.to_ascii_lowercase());
        }

        #[test]
        fn rejects_other_lengths(s in "[0-9a-fA-F]{0,64}") {
            prop_assume!(s.len() != 32);
            prop_assert!(parse_key_hex(&s).is_err());
        }

        #[test]
        fn rejects_any_non_hex_char(pos in 0usize..32, c in "[g-zG-Z_ .:-]") {
            let mut s: Vec<char> = "00112233445566778899aabbccddeeff".chars().collect();
            s[pos] = c.chars().next().unwrap();
            let s: String = s.into_iter().collect();
            prop_assert!(parse_key_hex(&s).is_err());
        }
    }
}
