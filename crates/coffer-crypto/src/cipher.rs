//! Symmetric AEAD and the self-describing ciphertext header
//!
//! Encrypted value format (binary):
//! ```text
//! [1 byte: algorithm tag][nonce][ciphertext][16 bytes: tag]
//! AES-256-GCM:        tag 0x01, 12-byte nonce
//! XChaCha20-Poly1305: tag 0x02, 24-byte nonce
//! hybrid (X25519 + XSalsa20-Poly1305): tag 0x03, 24-byte nonce
//! ```

use aes_gcm::Aes256Gcm;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use coffer_core::{CofferError, CofferResult};
use rand::RngCore;
use std::fmt;
use std::str::FromStr;

use crate::{KEY_SIZE, TAG_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    AesGcm,
    XChaCha20,
    Hybrid,
}

impl Algorithm {
    pub fn tag(self) -> u8 {
        match self {
            Algorithm::AesGcm => 0x01,
            Algorithm::XChaCha20 => 0x02,
            Algorithm::Hybrid => 0x03,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(Algorithm::AesGcm),
            0x02 => Some(Algorithm::XChaCha20),
            0x03 => Some(Algorithm::Hybrid),
            _ => None,
        }
    }

    pub fn nonce_size(self) -> usize {
        match self {
            Algorithm::AesGcm => 12,
            Algorithm::XChaCha20 | Algorithm::Hybrid => 24,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::AesGcm => "aes-gcm",
            Algorithm::XChaCha20 => "xchacha20",
            Algorithm::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = CofferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aes-gcm" => Ok(Algorithm::AesGcm),
            "xchacha20" => Ok(Algorithm::XChaCha20),
            "hybrid" => Ok(Algorithm::Hybrid),
            other => Err(CofferError::config(format!("unknown algorithm: {other}"))),
        }
    }
}

/// Header plus body of a ciphertext produced by any box.
pub(crate) struct Envelope<'a> {
    pub nonce: &'a [u8],
    pub body: &'a [u8],
}

/// Split `ciphertext` after checking it was produced by `expected`.
pub(crate) fn open_envelope(ciphertext: &[u8], expected: Algorithm) -> CofferResult<Envelope<'_>> {
    let (&tag, rest) = ciphertext
        .split_first()
        .ok_or_else(|| CofferError::decryption("ciphertext is empty"))?;
    let found = Algorithm::from_tag(tag)
        .ok_or_else(|| CofferError::decryption(format!("unknown algorithm tag 0x{tag:02x}")))?;
    if found != expected {
        return Err(CofferError::decryption(format!(
            "ciphertext algorithm {found} does not match box algorithm {expected}"
        )));
    }
    let nonce_size = expected.nonce_size();
    if rest.len() < nonce_size + TAG_SIZE {
        return Err(CofferError::decryption(format!(
            "ciphertext too short: {} bytes (minimum {})",
            ciphertext.len(),
            1 + nonce_size + TAG_SIZE
        )));
    }
    let (nonce, body) = rest.split_at(nonce_size);
    Ok(Envelope { nonce, body })
}

/// Assemble `[tag][nonce][body]`.
pub(crate) fn seal_envelope(algorithm: Algorithm, nonce: &[u8], body: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + nonce.len() + body.len());
    out.push(algorithm.tag());
    out.extend_from_slice(nonce);
    out.extend_from_slice(&body);
    out
}

pub(crate) fn random_nonce(algorithm: Algorithm) -> Vec<u8> {
    let mut nonce = vec![0u8; algorithm.nonce_size()];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// A keyed symmetric AEAD.
pub(crate) enum SymmetricCipher {
    AesGcm(Box<Aes256Gcm>),
    XChaCha20(Box<XChaCha20Poly1305>),
}

impl SymmetricCipher {
    pub fn new(algorithm: Algorithm, key: &[u8]) -> CofferResult<Self> {
        if key.len() != KEY_SIZE {
            return Err(CofferError::config(format!(
                "key must be {KEY_SIZE} bytes ({} hex digits)",
                KEY_SIZE * 2
            )));
        }
        match algorithm {
            Algorithm::AesGcm => Aes256Gcm::new_from_slice(key)
                .map(|c| SymmetricCipher::AesGcm(Box::new(c)))
                .map_err(|_| CofferError::config("invalid AES-256-GCM key")),
            Algorithm::XChaCha20 => XChaCha20Poly1305::new_from_slice(key)
                .map(|c| SymmetricCipher::XChaCha20(Box::new(c)))
                .map_err(|_| CofferError::config("invalid XChaCha20-Poly1305 key")),
            Algorithm::Hybrid => Err(CofferError::config(
                "hybrid algorithm requires encryption_key or decryption_key",
            )),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            SymmetricCipher::AesGcm(_) => Algorithm::AesGcm,
            SymmetricCipher::XChaCha20(_) => Algorithm::XChaCha20,
        }
    }

    pub fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> CofferResult<Vec<u8>> {
        let algorithm = self.algorithm();
        let nonce = random_nonce(algorithm);
        let payload = Payload { msg: plaintext, aad };
        let body = match self {
            SymmetricCipher::AesGcm(c) => c.encrypt(aes_gcm::Nonce::from_slice(&nonce), payload),
            SymmetricCipher::XChaCha20(c) => c.encrypt(XNonce::from_slice(&nonce), payload),
        }
        .map_err(|_| CofferError::config(format!("{algorithm} encryption failed")))?;
        Ok(seal_envelope(algorithm, &nonce, body))
    }

    pub fn decrypt(&self, ciphertext: &[u8], aad: &[u8]) -> CofferResult<Vec<u8>> {
        let algorithm = self.algorithm();
        let envelope = open_envelope(ciphertext, algorithm)?;
        let payload = Payload {
            msg: envelope.body,
            aad,
        };
        match self {
            SymmetricCipher::AesGcm(c) => {
                c.decrypt(aes_gcm::Nonce::from_slice(envelope.nonce), payload)
            }
            SymmetricCipher::XChaCha20(c) => c.decrypt(XNonce::from_slice(envelope.nonce), payload),
        }
        .map_err(|_| {
            CofferError::decryption("authentication failed: wrong key, tampered data, or wrong associated data")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_names_roundtrip() {
        for alg in [Algorithm::AesGcm, Algorithm::XChaCha20, Algorithm::Hybrid] {
            assert_eq!(alg.as_str().parse::<Algorithm>().unwrap(), alg);
            assert_eq!(Algorithm::from_tag(alg.tag()), Some(alg));
        }
        assert!("xsalsa20".parse::<Algorithm>().is_err());
        assert_eq!(Algorithm::from_tag(0x00), None);
    }

    #[test]
    fn test_symmetric_encrypted_size() {
        let cipher = SymmetricCipher::new(Algorithm::AesGcm, &[7u8; KEY_SIZE]).unwrap();
        let ct = cipher.encrypt(&[0u8; 100], b"").unwrap();
        // tag byte (1) + nonce (12) + plaintext (100) + tag (16)
        assert_eq!(ct.len(), 1 + 12 + 100 + TAG_SIZE);
        assert_eq!(ct[0], 0x01);

        let cipher = SymmetricCipher::new(Algorithm::XChaCha20, &[7u8; KEY_SIZE]).unwrap();
        let ct = cipher.encrypt(&[0u8; 100], b"").unwrap();
        assert_eq!(ct.len(), 1 + 24 + 100 + TAG_SIZE);
        assert_eq!(ct[0], 0x02);
    }

    #[test]
    fn test_wrong_key_length() {
        assert!(matches!(
            SymmetricCipher::new(Algorithm::AesGcm, &[0u8; 16]),
            Err(CofferError::Configuration(_))
        ));
    }

    #[test]
    fn test_header_mismatch_is_decryption_error() {
        let aes = SymmetricCipher::new(Algorithm::AesGcm, &[7u8; KEY_SIZE]).unwrap();
        let xchacha = SymmetricCipher::new(Algorithm::XChaCha20, &[7u8; KEY_SIZE]).unwrap();
        let ct = aes.encrypt(b"data", b"").unwrap();
        assert!(matches!(
            xchacha.decrypt(&ct, b""),
            Err(CofferError::Decryption(_))
        ));
    }

    #[test]
    fn test_truncated_and_unknown() {
        let aes = SymmetricCipher::new(Algorithm::AesGcm, &[7u8; KEY_SIZE]).unwrap();
        assert!(matches!(aes.decrypt(&[], b""), Err(CofferError::Decryption(_))));
        assert!(matches!(
            aes.decrypt(&[0x01, 1, 2, 3], b""),
            Err(CofferError::Decryption(_))
        ));
        assert!(matches!(
            aes.decrypt(&[0x7f; 64], b""),
            Err(CofferError::Decryption(_))
        ));
    }

    #[test]
    fn test_associated_data_bound() {
        let cipher = SymmetricCipher::new(Algorithm::XChaCha20, &[9u8; KEY_SIZE]).unwrap();
        let ct = cipher.encrypt(b"payload", b"users:1").unwrap();
        assert_eq!(cipher.decrypt(&ct, b"users:1").unwrap(), b"payload");
        assert!(cipher.decrypt(&ct, b"users:2").is_err());
    }
}
