//! Hybrid box: X25519 key agreement + XSalsa20-Poly1305 (`crypto_box::SalsaBox`)
//!
//! Keys are 64 bytes (or 128 hex digits):
//! ```text
//! encryption_key = bob.public  || alice.secret
//! decryption_key = bob.secret  || alice.public
//! ```
//! A process configured with only `encryption_key` can write but never read.

use coffer_core::encoding::decode_key_exact;
use coffer_core::{CofferError, CofferResult};
use crypto_box::aead::Aead;
use crypto_box::{PublicKey, SalsaBox, SecretKey};
use zeroize::Zeroize;

use crate::cipher::{open_envelope, random_nonce, seal_envelope, Algorithm};
use crate::COMPONENT_SIZE;

pub(crate) struct HybridCipher {
    encrypt: Option<SalsaBox>,
    decrypt: Option<SalsaBox>,
}

impl HybridCipher {
    pub fn new(encryption_key: Option<&[u8]>, decryption_key: Option<&[u8]>) -> CofferResult<Self> {
        if encryption_key.is_none() && decryption_key.is_none() {
            return Err(CofferError::config(
                "hybrid algorithm requires encryption_key or decryption_key",
            ));
        }

        let encrypt = match encryption_key {
            Some(key) => {
                let (bob_public, alice_secret) = split_key(key, "encryption key")?;
                Some(SalsaBox::new(
                    &PublicKey::from(bob_public),
                    &SecretKey::from(alice_secret),
                ))
            }
            None => None,
        };

        let decrypt = match decryption_key {
            Some(key) => {
                let (bob_secret, alice_public) = split_key(key, "decryption key")?;
                Some(SalsaBox::new(
                    &PublicKey::from(alice_public),
                    &SecretKey::from(bob_secret),
                ))
            }
            None => None,
        };

        Ok(Self { encrypt, decrypt })
    }

    pub fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> CofferResult<Vec<u8>> {
        reject_aad(aad)?;
        let salsa = self
            .encrypt
            .as_ref()
            .ok_or_else(|| CofferError::config("encryption key not set"))?;
        let nonce = random_nonce(Algorithm::Hybrid);
        let body = salsa
            .encrypt(crypto_box::Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CofferError::config("hybrid encryption failed"))?;
        Ok(seal_envelope(Algorithm::Hybrid, &nonce, body))
    }

    pub fn decrypt(&self, ciphertext: &[u8], aad: &[u8]) -> CofferResult<Vec<u8>> {
        reject_aad(aad)?;
        let salsa = self
            .decrypt
            .as_ref()
            .ok_or_else(|| CofferError::config("decryption key not set"))?;
        let envelope = open_envelope(ciphertext, Algorithm::Hybrid)?;
        salsa
            .decrypt(crypto_box::Nonce::from_slice(envelope.nonce), envelope.body)
            .map_err(|_| CofferError::decryption("authentication failed: wrong key pair or tampered data"))
    }
}

fn reject_aad(aad: &[u8]) -> CofferResult<()> {
    if aad.is_empty() {
        Ok(())
    } else {
        Err(CofferError::config(
            "associated data is not supported by the hybrid algorithm",
        ))
    }
}

/// Split a 64-byte hybrid key into its two 32-byte components.
fn split_key(key: &[u8], name: &str) -> CofferResult<([u8; COMPONENT_SIZE], [u8; COMPONENT_SIZE])> {
    let mut bytes = decode_key_exact(key, 2 * COMPONENT_SIZE, name)?;
    let mut first = [0u8; COMPONENT_SIZE];
    let mut second = [0u8; COMPONENT_SIZE];
    first.copy_from_slice(&bytes[..COMPONENT_SIZE]);
    second.copy_from_slice(&bytes[COMPONENT_SIZE..]);
    bytes.zeroize();
    Ok((first, second))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_key_pair;

    #[test]
    fn test_hybrid_roundtrip() {
        let pair = generate_key_pair();
        let writer = HybridCipher::new(Some(pair.encryption_key.as_bytes()), None).unwrap();
        let reader = HybridCipher::new(None, Some(pair.decryption_key.as_bytes())).unwrap();

        let ct = writer.encrypt(b"card number", b"").unwrap();
        assert_eq!(ct[0], Algorithm::Hybrid.tag());
        assert_eq!(reader.decrypt(&ct, b"").unwrap(), b"card number");
    }

    #[test]
    fn test_encrypt_only_cannot_decrypt() {
        let pair = generate_key_pair();
        let writer = HybridCipher::new(Some(pair.encryption_key.as_bytes()), None).unwrap();
        let ct = writer.encrypt(b"secret", b"").unwrap();

        let err = writer.decrypt(&ct, b"").unwrap_err();
        assert!(err.to_string().contains("decryption key not set"));
    }

    #[test]
    fn test_swapped_keys_fail() {
        let pair = generate_key_pair();
        let reader = HybridCipher::new(None, Some(pair.decryption_key.as_bytes())).unwrap();

        // decryption key misused as encryption key and vice versa
        let swapped_writer =
            HybridCipher::new(Some(pair.decryption_key.as_bytes()), None).unwrap();
        let swapped_reader =
            HybridCipher::new(None, Some(pair.encryption_key.as_bytes())).unwrap();

        let ct = swapped_writer.encrypt(b"secret", b"").unwrap();
        assert!(matches!(reader.decrypt(&ct, b""), Err(CofferError::Decryption(_))));

        let writer = HybridCipher::new(Some(pair.encryption_key.as_bytes()), None).unwrap();
        let ct = writer.encrypt(b"secret", b"").unwrap();
        assert!(matches!(
            swapped_reader.decrypt(&ct, b""),
            Err(CofferError::Decryption(_))
        ));
    }

    #[test]
    fn test_other_pair_fails() {
        let pair_a = generate_key_pair();
        let pair_b = generate_key_pair();
        let writer = HybridCipher::new(Some(pair_a.encryption_key.as_bytes()), None).unwrap();
        let reader = HybridCipher::new(None, Some(pair_b.decryption_key.as_bytes())).unwrap();
        let ct = writer.encrypt(b"secret", b"").unwrap();
        assert!(reader.decrypt(&ct, b"").is_err());
    }

    #[test]
    fn test_requires_a_key() {
        assert!(matches!(
            HybridCipher::new(None, None),
            Err(CofferError::Configuration(_))
        ));
        assert!(HybridCipher::new(Some(b"too short"), None).is_err());
    }

    #[test]
    fn test_associated_data_rejected() {
        let pair = generate_key_pair();
        let writer = HybridCipher::new(Some(pair.encryption_key.as_bytes()), None).unwrap();
        assert!(matches!(
            writer.encrypt(b"x", b"aad"),
            Err(CofferError::Configuration(_))
        ));
    }
}
