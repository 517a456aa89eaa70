//! [`CipherBox`]: an immutable encryption context bound to one key and algorithm.

use coffer_core::encoding::decode_key_exact;
use coffer_core::{CofferError, CofferResult};
use zeroize::{Zeroize, Zeroizing};

use crate::cipher::{Algorithm, SymmetricCipher};
use crate::hybrid::HybridCipher;
use crate::padding;
use crate::KEY_SIZE;

/// Key material as raw bytes or hex text, wiped on drop.
pub type KeyBytes = Zeroizing<Vec<u8>>;

/// Fully resolved options for one box.
///
/// Key fields hold raw bytes or hex text; either form is accepted.
#[derive(Clone, Default)]
pub struct BoxOptions {
    pub key: Option<KeyBytes>,
    pub encryption_key: Option<KeyBytes>,
    pub decryption_key: Option<KeyBytes>,
    /// Defaults to `aes-gcm`, or `hybrid` when a key-pair half is set.
    pub algorithm: Option<Algorithm>,
    /// Padding block size; `None` disables padding.
    pub padding: Option<usize>,
    /// Older configurations still accepted for decryption, newest first.
    pub previous_versions: Vec<BoxOptions>,
}

impl BoxOptions {
    pub fn with_key(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: Some(Zeroizing::new(key.into())),
            ..Self::default()
        }
    }

    pub fn has_key_material(&self) -> bool {
        self.key.is_some() || self.encryption_key.is_some() || self.decryption_key.is_some()
    }

    pub fn resolved_algorithm(&self) -> Algorithm {
        match self.algorithm {
            Some(algorithm) => algorithm,
            None if self.encryption_key.is_some() || self.decryption_key.is_some() => {
                Algorithm::Hybrid
            }
            None => Algorithm::AesGcm,
        }
    }
}

impl std::fmt::Debug for BoxOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<KeyBytes>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("BoxOptions")
            .field("key", &redact(&self.key))
            .field("encryption_key", &redact(&self.encryption_key))
            .field("decryption_key", &redact(&self.decryption_key))
            .field("algorithm", &self.algorithm)
            .field("padding", &self.padding)
            .field("previous_versions", &self.previous_versions.len())
            .finish()
    }
}

enum Inner {
    Symmetric(SymmetricCipher),
    Hybrid(HybridCipher),
}

/// Encrypts and decrypts single values with one resolved key.
///
/// Holds no state beyond its key schedule; safe to share across threads.
pub struct CipherBox {
    inner: Inner,
    algorithm: Algorithm,
    padding: Option<usize>,
}

impl CipherBox {
    /// Build a box from resolved options. `previous_versions` is ignored here.
    pub fn new(options: &BoxOptions) -> CofferResult<Self> {
        let algorithm = options.resolved_algorithm();
        if options.padding == Some(0) {
            return Err(CofferError::config("padding block size must be positive"));
        }

        let inner = match algorithm {
            Algorithm::Hybrid => {
                if options.key.is_some() {
                    return Err(CofferError::config(
                        "hybrid algorithm takes encryption_key/decryption_key, not key",
                    ));
                }
                Inner::Hybrid(HybridCipher::new(
                    options.encryption_key.as_ref().map(|k| k.as_slice()),
                    options.decryption_key.as_ref().map(|k| k.as_slice()),
                )?)
            }
            symmetric => {
                if options.encryption_key.is_some() || options.decryption_key.is_some() {
                    return Err(CofferError::config(format!(
                        "{symmetric} takes key, not encryption_key/decryption_key"
                    )));
                }
                let raw = options
                    .key
                    .as_ref()
                    .map(|k| k.as_slice())
                    .ok_or_else(|| CofferError::config("missing key"))?;
                let mut key = decode_key_exact(raw, KEY_SIZE, "Key")?;
                let cipher = SymmetricCipher::new(symmetric, &key);
                key.zeroize();
                Inner::Symmetric(cipher?)
            }
        };

        Ok(Self {
            inner,
            algorithm,
            padding: options.padding,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> CofferResult<Vec<u8>> {
        self.encrypt_with_aad(plaintext, &[])
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> CofferResult<Vec<u8>> {
        self.decrypt_with_aad(ciphertext, &[])
    }

    pub fn encrypt_with_aad(&self, plaintext: &[u8], aad: &[u8]) -> CofferResult<Vec<u8>> {
        let padded;
        let message = match self.padding {
            Some(block) => {
                padded = padding::pad(plaintext, block)?;
                padded.as_slice()
            }
            None => plaintext,
        };
        match &self.inner {
            Inner::Symmetric(cipher) => cipher.encrypt(message, aad),
            Inner::Hybrid(cipher) => cipher.encrypt(message, aad),
        }
    }

    pub fn decrypt_with_aad(&self, ciphertext: &[u8], aad: &[u8]) -> CofferResult<Vec<u8>> {
        let message = match &self.inner {
            Inner::Symmetric(cipher) => cipher.decrypt(ciphertext, aad)?,
            Inner::Hybrid(cipher) => cipher.decrypt(ciphertext, aad)?,
        };
        match self.padding {
            Some(block) => padding::unpad(&message, block),
            None => Ok(message),
        }
    }
}

impl std::fmt::Debug for CipherBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherBox")
            .field("algorithm", &self.algorithm)
            .field("padding", &self.padding)
            .finish_non_exhaustive()
    }
}
