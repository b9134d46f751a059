//! On-disk artifact framing
//!
//! Server (password) artifacts:
//! ```text
//! [16 bytes: Argon2id salt][16 bytes: CBC IV][N bytes: AES-256-CBC ciphertext]
//! ```
//!
//! Client (raw key) artifacts:
//! ```text
//! [16 bytes: CBC IV][N bytes: AES-128-CBC ciphertext]
//! ```
//!
//! Both headers are plaintext and neither is authenticated.

use std::io::{Read, Write};

use crate::error::{CryptoError, CryptoResult};
use crate::{IV_SIZE, SALT_SIZE};

/// Length of the server container header (salt + IV)
pub const HEADER_SIZE: usize = SALT_SIZE + IV_SIZE;

/// Plaintext header of a server container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub salt: [u8; SALT_SIZE],
    pub iv: [u8; IV_SIZE],
}

impl Header {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[..SALT_SIZE].copy_from_slice(&self.salt);
        out[SALT_SIZE..].copy_from_slice(&self.iv);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(CryptoError::ContainerTooShort {
                len: bytes.len(),
                needed: HEADER_SIZE,
            });
        }
        let mut salt = [0u8; SALT_SIZE];
        let mut iv = [0u8; IV_SIZE];
        salt.copy_from_slice(&bytes[..SALT_SIZE]);
        iv.copy_from_slice(&bytes[SALT_SIZE..HEADER_SIZE]);
        Ok(Self { salt, iv })
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> CryptoResult<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Read exactly the 32 header bytes; a shorter stream is `ContainerTooShort`.
    pub fn read_from<R: Read>(reader: R) -> CryptoResult<Self> {
        let mut buf = Vec::with_capacity(HEADER_SIZE);
        reader.take(HEADER_SIZE as u64).read_to_end(&mut buf)?;
        Self::from_bytes(&buf)
    }
}

/// Build a server container: `salt || iv || ciphertext`.
pub fn wrap(salt: &[u8; SALT_SIZE], iv: &[u8; IV_SIZE], ciphertext: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
    out.extend_from_slice(salt);
    out.extend_from_slice(iv);
    out.extend_from_slice(ciphertext);
    out
}

/// Split a server container into salt, IV and ciphertext.
pub fn unwrap(bytes: &[u8]) -> CryptoResult<([u8; SALT_SIZE], [u8; IV_SIZE], &[u8])> {
    let header = Header::from_bytes(bytes)?;
    Ok((header.salt, header.iv, &bytes[HEADER_SIZE..]))
}

/// Client-path artifact: `iv || ciphertext`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientEnvelope<'a> {
    pub iv: [u8; IV_SIZE],
    pub ciphertext: &'a [u8],
}

impl<'a> ClientEnvelope<'a> {
    pub fn wrap(iv: &[u8; IV_SIZE], ciphertext: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(IV_SIZE + ciphertext.len());
        out.extend_from_slice(iv);
        out.extend_from_slice(ciphertext);
        out
    }

    pub fn unwrap(bytes: &'a [u8]) -> CryptoResult<Self> {
        if bytes.len() < IV_SIZE {
            return Err(CryptoError::ContainerTooShort {
                len: bytes.len(),
                needed: IV_SIZE,
            });
        }
        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(&bytes[..IV_SIZE]);
        Ok(Self {
            iv,
            ciphertext: &bytes[IV_SIZE..],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_layout() {
        let out = wrap(&[1u8; 16], &[2u8; 16], b"body");
        assert_eq!(out.len(), 36);
        assert_eq!(&out[..16], &[1u8; 16]);
        assert_eq!(&out[16..32], &[2u8; 16]);
        assert_eq!(&out[32..], b"body");
    }

    #[test]
    fn test_header_only_is_valid() {
        let out = wrap(&[1u8; 16], &[2u8; 16], b"");
        let (salt, iv, body) = unwrap(&out).unwrap();
        assert_eq!(salt, [1u8; 16]);
        assert_eq!(iv, [2u8; 16]);
        assert!(body.is_empty());
    }

    #[test]
    fn test_too_short() {
        for len in [0usize, 1, 16, 31] {
            let bytes = vec![0u8; len];
            let result = unwrap(&bytes);
            assert!(
                matches!(result, Err(CryptoError::ContainerTooShort { len: l, needed: 32 }) if l == len),
                "len {len}"
            );
        }
    }

    #[test]
    fn test_header_stream_roundtrip() {
        let header = Header {
            salt: [0xAA; 16],
            iv: [0xBB; 16],
        };
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        buf.extend_from_slice(b"rest");

        let mut reader = &buf[..];
        let parsed = Header::read_from(&mut reader).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(reader, b"rest", "only the header is consumed");
    }

    #[test]
    fn test_header_stream_too_short() {
        let result = Header::read_from(&[0u8; 20][..]);
        assert!(matches!(result, Err(CryptoError::ContainerTooShort { len: 20, .. })));
    }

    #[test]
    fn test_client_envelope() {
        let bytes = ClientEnvelope::wrap(&[5u8; 16], b"ciphertext");
        let env = ClientEnvelope::unwrap(&bytes).unwrap();
        assert_eq!(env.iv, [5u8; 16]);
        assert_eq!(env.ciphertext, b"ciphertext");

        assert!(matches!(
            ClientEnvelope::unwrap(&[0u8; 15]),
            Err(CryptoError::ContainerTooShort { len: 15, needed: 16 })
        ));
    }

    proptest! {
        #[test]
        fn wrap_unwrap_roundtrip(
            salt in any::<[u8; 16]>(),
            iv in any::<[u8; 16]>(),
            body in proptest::collection::vec(any::<u8>(), 0..512),
        ) {
            let bytes = wrap(&salt, &iv, &body);
            let (s, i, b) = unwrap(&bytes).unwrap();
            prop_assert_eq!(s, salt);
            prop_assert_eq!(i, iv);
            prop_assert_eq!(b, &body[..]);
        }
    }
}
