//! [`Encryptor`]: the current box plus earlier versions kept for decryption.
//!
//! Writes always use the primary box. Reads try the primary box first and
//! then each previous version in order, so keys and algorithms can rotate
//! while old ciphertext stays readable until it is migrated.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use coffer_core::{CofferError, CofferResult};

use crate::cipher_box::{BoxOptions, CipherBox};
use crate::io::EncryptedIo;

/// Which box opened a ciphertext.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptedWith {
    Primary,
    /// Index into `previous_versions`.
    Previous(usize),
}

#[derive(Debug)]
pub struct Encryptor {
    primary: CipherBox,
    previous: Vec<CipherBox>,
}

// Boxes are shared across request threads.
const _: fn() = || {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<CipherBox>();
    assert_send_sync::<Encryptor>();
};

/// Build an [`Encryptor`] from resolved options.
pub fn encryptor(options: &BoxOptions) -> CofferResult<Encryptor> {
    Encryptor::new(options)
}

impl Encryptor {
    pub fn new(options: &BoxOptions) -> CofferResult<Self> {
        let primary = CipherBox::new(options)?;
        let previous = options
            .previous_versions
            .iter()
            .map(CipherBox::new)
            .collect::<CofferResult<Vec<_>>>()?;
        Ok(Self { primary, previous })
    }

    pub fn primary(&self) -> &CipherBox {
        &self.primary
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> CofferResult<Vec<u8>> {
        self.primary.encrypt(plaintext)
    }

    pub fn encrypt_with_aad(&self, plaintext: &[u8], aad: &[u8]) -> CofferResult<Vec<u8>> {
        self.primary.encrypt_with_aad(plaintext, aad)
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> CofferResult<Vec<u8>> {
        self.decrypt_detailed(ciphertext, &[]).map(|(plaintext, _)| plaintext)
    }

    pub fn decrypt_with_aad(&self, ciphertext: &[u8], aad: &[u8]) -> CofferResult<Vec<u8>> {
        self.decrypt_detailed(ciphertext, aad).map(|(plaintext, _)| plaintext)
    }

    /// Decrypt and report which version succeeded.
    ///
    /// When every box fails, a padding failure wins over a configuration
    /// failure, which wins over an authentication failure.
    pub fn decrypt_detailed(
        &self,
        ciphertext: &[u8],
        aad: &[u8],
    ) -> CofferResult<(Vec<u8>, DecryptedWith)> {
        let mut padding_err = None;
        let mut config_err = None;

        let boxes = std::iter::once((DecryptedWith::Primary, &self.primary)).chain(
            self.previous
                .iter()
                .enumerate()
                .map(|(i, b)| (DecryptedWith::Previous(i), b)),
        );

        for (version, cipher_box) in boxes {
            match cipher_box.decrypt_with_aad(ciphertext, aad) {
                Ok(plaintext) => {
                    if let DecryptedWith::Previous(index) = version {
                        tracing::debug!(index, "opened with a previous key version");
                    }
                    return Ok((plaintext, version));
                }
                Err(e @ CofferError::Padding(_)) => {
                    padding_err.get_or_insert(e);
                }
                Err(e @ CofferError::Configuration(_)) => {
                    config_err.get_or_insert(e);
                }
                Err(_) => {}
            }
        }

        Err(padding_err
            .or(config_err)
            .unwrap_or_else(|| CofferError::decryption("decryption failed")))
    }

    /// Decrypt and require UTF-8 plaintext.
    pub fn decrypt_str(&self, ciphertext: &[u8]) -> CofferResult<String> {
        String::from_utf8(self.decrypt(ciphertext)?)
            .map_err(|_| CofferError::decryption("plaintext is not valid UTF-8"))
    }

    /// Encrypt and encode as standard base64 for text columns.
    pub fn encrypt_base64(&self, plaintext: &[u8]) -> CofferResult<String> {
        Ok(STANDARD.encode(self.encrypt(plaintext)?))
    }

    pub fn decrypt_base64(&self, encoded: &str) -> CofferResult<Vec<u8>> {
        let ciphertext = STANDARD
            .decode(encoded)
            .map_err(|e| CofferError::decryption(format!("invalid base64 ciphertext: {e}")))?;
        self.decrypt(&ciphertext)
    }

    /// Encrypt an attachment body, keeping filename and content type.
    pub fn encrypt_io(&self, io: &EncryptedIo) -> CofferResult<EncryptedIo> {
        Ok(EncryptedIo::new(
            self.encrypt(&io.bytes)?,
            io.filename.clone(),
            io.content_type.clone(),
        ))
    }

    pub fn decrypt_io(&self, io: &EncryptedIo) -> CofferResult<EncryptedIo> {
        Ok(EncryptedIo::new(
            self.decrypt(&io.bytes)?,
            io.filename.clone(),
            io.content_type.clone(),
        ))
    }
}
