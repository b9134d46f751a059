//! Chunked AES-CBC engine
//!
//! One engine instance covers one encrypt or decrypt operation. The CBC chain
//! is carried across `process_chunk` calls in an explicit [`CipherState`], so
//! a file can be fed through in bounded windows and still produce exactly the
//! ciphertext a one-shot CBC pass would:
//!
//! ```text
//! encrypt: C[i] = E(K, P[i] ^ carry); carry = C[i]
//! decrypt: P[i] = D(K, C[i]) ^ carry; carry = C[i]
//! carry starts as the IV
//! ```
//!
//! PKCS#7 padding is applied (or checked and stripped) only on the chunk
//! flagged final. Every non-final chunk must be a whole number of blocks.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes256, Block};
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::keys::Key;
use crate::{BLOCK_SIZE, CLIENT_KEY_SIZE, IV_SIZE, SERVER_KEY_SIZE};

/// Which AES variant drives the CBC chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherSuite {
    /// Client path: 128-bit key
    Aes128Cbc,
    /// Server path: 256-bit key
    Aes256Cbc,
}

impl CipherSuite {
    pub fn key_len(self) -> usize {
        match self {
            CipherSuite::Aes128Cbc => CLIENT_KEY_SIZE,
            CipherSuite::Aes256Cbc => SERVER_KEY_SIZE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CipherSuite::Aes128Cbc => "aes-128-cbc",
            CipherSuite::Aes256Cbc => "aes-256-cbc",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Encrypt,
    Decrypt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Accepting chunks; the carry block is live
    Chaining,
    /// The final chunk has been processed; the carry block is wiped
    Finalized,
}

/// Chaining state threaded between chunk calls.
///
/// Encrypt: the previous ciphertext block produced.
/// Decrypt: the previous ciphertext block consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherState {
    carry: [u8; BLOCK_SIZE],
    phase: Phase,
}

impl CipherState {
    /// Fresh state for a new chain, seeded with the IV.
    pub fn new(iv: &[u8; IV_SIZE]) -> Self {
        Self {
            carry: *iv,
            phase: Phase::Chaining,
        }
    }

    pub fn carry(&self) -> &[u8; BLOCK_SIZE] {
        &self.carry
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn finalize(&mut self) {
        self.carry.zeroize();
        self.phase = Phase::Finalized;
    }
}

enum BlockCipher {
    Aes128(Box<Aes128>),
    Aes256(Box<Aes256>),
}

impl BlockCipher {
    fn new(suite: CipherSuite, key: &Key) -> CryptoResult<Self> {
        if key.len() != suite.key_len() {
            return Err(CryptoError::KeySizeMismatch {
                expected: suite.key_len(),
                actual: key.len(),
            });
        }
        let mismatch = |_| CryptoError::KeySizeMismatch {
            expected: suite.key_len(),
            actual: key.len(),
        };
        Ok(match suite {
            CipherSuite::Aes128Cbc => {
                BlockCipher::Aes128(Box::new(Aes128::new_from_slice(key.as_bytes()).map_err(mismatch)?))
            }
            CipherSuite::Aes256Cbc => {
                BlockCipher::Aes256(Box::new(Aes256::new_from_slice(key.as_bytes()).map_err(mismatch)?))
            }
        })
    }

    fn encrypt_block(&self, block: &mut Block) {
        match self {
            BlockCipher::Aes128(c) => c.encrypt_block(block),
            BlockCipher::Aes256(c) => c.encrypt_block(block),
        }
    }

    fn decrypt_block(&self, block: &mut Block) {
        match self {
            BlockCipher::Aes128(c) => c.decrypt_block(block),
            BlockCipher::Aes256(c) => c.decrypt_block(block),
        }
    }
}

/// Stateful CBC context for one operation.
pub struct CipherEngine {
    suite: CipherSuite,
    mode: Mode,
    cipher: BlockCipher,
    state: CipherState,
    chunks: u64,
}

impl std::fmt::Debug for CipherEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherEngine")
            .field("suite", &self.suite)
            .field("mode", &self.mode)
            .field("phase", &self.state.phase)
            .field("chunks", &self.chunks)
            .finish()
    }
}

impl CipherEngine {
    /// Bind `key` and start a new chain from `iv`.
    ///
    /// Fails with `KeySizeMismatch` unless the key length matches the suite.
    pub fn init(suite: CipherSuite, mode: Mode, key: &Key, iv: &[u8; IV_SIZE]) -> CryptoResult<Self> {
        Self::resume(suite, mode, key, CipherState::new(iv))
    }

    /// Continue a chain from a previously captured [`CipherState`].
    pub fn resume(suite: CipherSuite, mode: Mode, key: &Key, state: CipherState) -> CryptoResult<Self> {
        let cipher = BlockCipher::new(suite, key)?;
        Ok(Self {
            suite,
            mode,
            cipher,
            state,
            chunks: 0,
        })
    }

    pub fn suite(&self) -> CipherSuite {
        self.suite
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn state(&self) -> &CipherState {
        &self.state
    }

    pub fn is_finalized(&self) -> bool {
        self.state.phase == Phase::Finalized
    }

    /// Transform one chunk, carrying the chain into the next call.
    ///
    /// `is_final` must be set on the last chunk of the stream and only there:
    /// it triggers padding (encrypt) or padding removal (decrypt) and moves
    /// the engine to [`Phase::Finalized`].
    pub fn process_chunk(&mut self, chunk: &[u8], is_final: bool) -> CryptoResult<Vec<u8>> {
        if self.is_finalized() {
            return Err(CryptoError::EngineFinalized);
        }

        let out = match self.mode {
            Mode::Encrypt => self.encrypt_chunk(chunk, is_final)?,
            Mode::Decrypt => self.decrypt_chunk(chunk, is_final)?,
        };

        self.chunks += 1;
        if is_final {
            self.state.finalize();
            tracing::trace!(suite = self.suite.name(), chunks = self.chunks, "engine finalized");
        }
        Ok(out)
    }

    fn encrypt_chunk(&mut self, chunk: &[u8], is_final: bool) -> CryptoResult<Vec<u8>> {
        if !is_final && chunk.len() % BLOCK_SIZE != 0 {
            return Err(CryptoError::InvalidInput(format!(
                "non-final chunk of {} bytes is not block-aligned",
                chunk.len()
            )));
        }

        let pad = if is_final {
            BLOCK_SIZE - chunk.len() % BLOCK_SIZE
        } else {
            0
        };

        let mut out = Vec::with_capacity(chunk.len() + pad);
        out.extend_from_slice(chunk);
        out.resize(chunk.len() + pad, pad as u8);

        for block in out.chunks_exact_mut(BLOCK_SIZE) {
            xor_in_place(block, &self.state.carry);
            self.cipher.encrypt_block(Block::from_mut_slice(block));
            self.state.carry.copy_from_slice(block);
        }
        Ok(out)
    }

    fn decrypt_chunk(&mut self, chunk: &[u8], is_final: bool) -> CryptoResult<Vec<u8>> {
        if chunk.len() % BLOCK_SIZE != 0 || (is_final && chunk.is_empty()) {
            return Err(CryptoError::MalformedCiphertext(chunk.len()));
        }

        let mut out = chunk.to_vec();
        let mut input = [0u8; BLOCK_SIZE];
        for block in out.chunks_exact_mut(BLOCK_SIZE) {
            input.copy_from_slice(block);
            self.cipher.decrypt_block(Block::from_mut_slice(block));
            xor_in_place(block, &self.state.carry);
            self.state.carry = input;
        }

        if is_final {
            let unpadded = match padded_len(&out) {
                Some(n) => n,
                None => {
                    out.zeroize();
                    return Err(CryptoError::PaddingError);
                }
            };
            out.truncate(unpadded);
        }
        Ok(out)
    }
}

/// Validate PKCS#7 padding and return the unpadded length.
fn padded_len(data: &[u8]) -> Option<usize> {
    let p = *data.last()? as usize;
    if p == 0 || p > BLOCK_SIZE || p > data.len() {
        return None;
    }
    // No early exit on the first mismatching byte
    let diff = data[data.len() - p..]
        .iter()
        .fold(0u8, |acc, &b| acc | (b ^ p as u8));
    (diff == 0).then(|| data.len() - p)
}

fn xor_in_place(block: &mut [u8], carry: &[u8; BLOCK_SIZE]) {
    for (b, c) in block.iter_mut().zip(carry) {
        *b ^= c;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{generate_random_key, parse_key_hex};
    use proptest::prelude::*;

    fn engine(mode: Mode, key: &Key, iv: &[u8; 16]) -> CipherEngine {
        CipherEngine::init(CipherSuite::Aes128Cbc, mode, key, iv).unwrap()
    }

    fn from_hex(s: &str) -> Vec<u8> {
        hex::decode(s).unwrap()
    }

    /// Encrypt `data` split at the given block-aligned window size.
    fn encrypt_split(key: &Key, iv: &[u8; 16], data: &[u8], window: usize) -> Vec<u8> {
        let mut e = engine(Mode::Encrypt, key, iv);
        let mut out = Vec::new();
        let mut chunks = data.chunks(window).peekable();
        if chunks.peek().is_none() {
            return e.process_chunk(&[], true).unwrap();
        }
        while let Some(c) = chunks.next() {
            out.extend(e.process_chunk(c, chunks.peek().is_none()).unwrap());
        }
        out
    }

    fn decrypt_all(key: &Key, iv: &[u8; 16], data: &[u8]) -> CryptoResult<Vec<u8>> {
        engine(Mode::Decrypt, key, iv).process_chunk(data, true)
    }

    // NIST SP 800-38A F.2.1 (CBC-AES128.Encrypt), first two blocks
    #[test]
    fn test_nist_aes128_cbc_vector() {
        let key = parse_key_hex("2b7e151628aed2a6abf7158809cf4f3c").unwrap();
        let iv: [u8; 16] = from_hex("000102030405060708090a0b0c0d0e0f").try_into().unwrap();
        let plaintext = from_hex(
            "6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e51",
        );

        let mut e = engine(Mode::Encrypt, &key, &iv);
        let out = e.process_chunk(&plaintext, false).unwrap();
        assert_eq!(
            hex::encode(out),
            "7649abac8119b246cee98e9b12e9197d5086cb9b507219ee95db113a917678b2"
        );
    }

    // NIST SP 800-38A F.2.5 (CBC-AES256.Encrypt), first block
    #[test]
    fn test_nist_aes256_cbc_vector() {
        let key = Key::from_bytes(&from_hex(
            "603deb1015ca71be2b73aef0857d77811f352c073b6108d72d9810a30914dff4",
        ));
        let iv: [u8; 16] = from_hex("000102030405060708090a0b0c0d0e0f").try_into().unwrap();
        let plaintext = from_hex("6bc1bee22e409f96e93d7e117393172a");

        let mut e = CipherEngine::init(CipherSuite::Aes256Cbc, Mode::Encrypt, &key, &iv).unwrap();
        let out = e.process_chunk(&plaintext, false).unwrap();
        assert_eq!(hex::encode(out), "f58c4c04d6e5f1ba779eabfb5f7bfbd6");
    }

    #[test]
    fn test_key_size_mismatch() {
        let short = generate_random_key();
        let result = CipherEngine::init(CipherSuite::Aes256Cbc, Mode::Encrypt, &short, &[0u8; 16]);
        assert!(matches!(
            result,
            Err(CryptoError::KeySizeMismatch {
                expected: 32,
                actual: 16
            })
        ));

        let long = Key::from_bytes(&[0u8; 32]);
        let result = CipherEngine::init(CipherSuite::Aes128Cbc, Mode::Decrypt, &long, &[0u8; 16]);
        assert!(matches!(result, Err(CryptoError::KeySizeMismatch { .. })));
    }

    #[test]
    fn test_padding_always_added() {
        let key = generate_random_key();
        let iv = [9u8; 16];
        for len in [0usize, 1, 15, 16, 17, 31, 32, 100] {
            let out = encrypt_split(&key, &iv, &vec![0xAB; len], 64);
            assert_eq!(out.len(), (len / 16 + 1) * 16, "len {len}");
        }
    }

    #[test]
    fn test_roundtrip_single_chunk() {
        let key = generate_random_key();
        let iv = [3u8; 16];
        let plaintext = b"hello, chained world!";

        let ct = encrypt_split(&key, &iv, plaintext, 1024);
        assert_eq!(decrypt_all(&key, &iv, &ct).unwrap(), plaintext);
    }

    #[test]
    fn test_roundtrip_empty_plaintext() {
        let key = generate_random_key();
        let iv = [0u8; 16];
        let ct = encrypt_split(&key, &iv, b"", 16);
        assert_eq!(ct.len(), 16);
        assert_eq!(decrypt_all(&key, &iv, &ct).unwrap(), b"");
    }

    #[test]
    fn test_non_final_unaligned_encrypt_rejected() {
        let key = generate_random_key();
        let mut e = engine(Mode::Encrypt, &key, &[0u8; 16]);
        let result = e.process_chunk(&[0u8; 17], false);
        assert!(matches!(result, Err(CryptoError::InvalidInput(_))));
    }

    #[test]
    fn test_decrypt_unaligned_rejected() {
        let key = generate_random_key();
        let mut e = engine(Mode::Decrypt, &key, &[0u8; 16]);
        assert!(matches!(
            e.process_chunk(&[0u8; 20], false),
            Err(CryptoError::MalformedCiphertext(20))
        ));
        assert!(matches!(
            e.process_chunk(&[], true),
            Err(CryptoError::MalformedCiphertext(0))
        ));
    }

    #[test]
    fn test_engine_finalized() {
        let key = generate_random_key();
        let mut e = engine(Mode::Encrypt, &key, &[0u8; 16]);
        e.process_chunk(b"last", true).unwrap();
        assert!(e.is_finalized());
        assert_eq!(e.state().carry(), &[0u8; 16], "carry wiped on finalize");
        assert!(matches!(
            e.process_chunk(b"more", true),
            Err(CryptoError::EngineFinalized)
        ));
        assert!(matches!(
            e.process_chunk(&[0u8; 16], false),
            Err(CryptoError::EngineFinalized)
        ));
    }

    #[test]
    fn test_failed_chunk_does_not_finalize() {
        let key = generate_random_key();
        let mut e = engine(Mode::Decrypt, &key, &[0u8; 16]);
        assert!(e.process_chunk(&[0u8; 5], true).is_err());
        assert!(!e.is_finalized());
    }

    #[test]
    fn test_carry_tracks_last_ciphertext_block() {
        let key = generate_random_key();
        let iv = [1u8; 16];
        let mut enc = engine(Mode::Encrypt, &key, &iv);
        let ct = enc.process_chunk(&[5u8; 48], false).unwrap();
        assert_eq!(enc.state().carry(), &ct[32..48]);

        let mut dec = engine(Mode::Decrypt, &key, &iv);
        dec.process_chunk(&ct, false).unwrap();
        assert_eq!(dec.state().carry(), &ct[32..48]);
    }

    #[test]
    fn test_resume_from_captured_state() {
        let key = generate_random_key();
        let iv = [4u8; 16];
        let data: Vec<u8> = (0..200u8).collect();

        let one_shot = encrypt_split(&key, &iv, &data, data.len());

        let mut first = engine(Mode::Encrypt, &key, &iv);
        let mut out = first.process_chunk(&data[..96], false).unwrap();
        let captured = first.state().clone();
        drop(first);

        let mut second =
            CipherEngine::resume(CipherSuite::Aes128Cbc, Mode::Encrypt, &key, captured).unwrap();
        out.extend(second.process_chunk(&data[96..], true).unwrap());
        assert_eq!(out, one_shot);
    }

    #[test]
    fn test_wrong_key_fails_padding_in_most_trials() {
        let iv = [0x42u8; 16];
        let plaintext = b"ten bytes!";
        let trials = 200;
        let mut padding_failures = 0;

        for _ in 0..trials {
            let right = generate_random_key();
            let wrong = generate_random_key();
            let ct = encrypt_split(&right, &iv, plaintext, 16);
            match decrypt_all(&wrong, &iv, &ct) {
                Err(CryptoError::PaddingError) => padding_failures += 1,
                Err(e) => panic!("unexpected error: {e}"),
                Ok(pt) => assert_ne!(pt, plaintext, "wrong key must not recover the plaintext"),
            }
        }

        // A random final block passes the padding check with probability about 1/256
        assert!(
            padding_failures >= trials * 9 / 10,
            "only {padding_failures}/{trials} wrong-key decryptions failed"
        );
    }

    #[test]
    fn test_tampered_last_byte_detected() {
        let key = generate_random_key();
        let iv = [0u8; 16];
        let mut ct = encrypt_split(&key, &iv, b"exactly sixteen!", 16);
        // Last block is pure padding (16 x 0x10); flipping the last byte of
        // the previous ciphertext block turns the final pad byte into 0x11
        let n = ct.len();
        ct[n - 17] ^= 0x01;
        assert!(matches!(decrypt_all(&key, &iv, &ct), Err(CryptoError::PaddingError)));
    }

    #[test]
    fn test_padded_len_rules() {
        assert_eq!(padded_len(&[1, 2, 3, 1]), Some(3));
        assert_eq!(padded_len(&[16; 16]), Some(0));
        assert_eq!(padded_len(&[0, 3, 3, 3]), Some(1));
        assert_eq!(padded_len(&[9, 9, 2, 3]), None);
        assert_eq!(padded_len(&[5, 0]), None);
        assert_eq!(padded_len(&[17; 32]), None);
        assert_eq!(padded_len(&[4, 4, 4]), None);
        assert_eq!(padded_len(&[]), None);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn roundtrip_any_plaintext(data in proptest::collection::vec(any::<u8>(), 0..2048), iv in any::<[u8; 16]>()) {
            let key = generate_random_key();
            let ct = encrypt_split(&key, &iv, &data, 256);
            prop_assert_eq!(decrypt_all(&key, &iv, &ct).unwrap(), data);
        }

        #[test]
        fn ciphertext_independent_of_chunking(
            data in proptest::collection::vec(any::<u8>(), 0..4096),
            a in 1usize..32,
            b in 1usize..32,
        ) {
            let key = generate_random_key();
            let iv = [0x5Au8; 16];
            let ct_a = encrypt_split(&key, &iv, &data, a * BLOCK_SIZE);
            let ct_b = encrypt_split(&key, &iv, &data, b * BLOCK_SIZE);
            prop_assert_eq!(ct_a, ct_b);
        }

        #[test]
        fn chunked_decrypt_matches_one_shot(data in proptest::collection::vec(any::<u8>(), 1..2048), w in 1usize..16) {
            let key = generate_random_key();
            let iv = [0x11u8; 16];
            let ct = encrypt_split(&key, &iv, &data, 4096);

            let mut dec = engine(Mode::Decrypt, &key, &iv);
            let mut out = Vec::new();
            let mut chunks = ct.chunks(w * BLOCK_SIZE).peekable();
            while let Some(c) = chunks.next() {
                out.extend(dec.process_chunk(c, chunks.peek().is_none()).unwrap());
            }
            prop_assert_eq!(out, data);
        }
    }
}
