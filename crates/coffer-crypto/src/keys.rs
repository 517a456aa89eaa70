//! Random key generation: symmetric keys and hybrid key pairs

use coffer_core::encoding::to_hex;
use crypto_box::SecretKey;
use rand::RngCore;
use zeroize::Zeroize;

use crate::{COMPONENT_SIZE, KEY_SIZE};

/// Generate a random 256-bit symmetric key as 64 lowercase hex digits.
pub fn generate_key() -> String {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    let hex = to_hex(&bytes);
    bytes.zeroize();
    hex
}

/// Hex-encoded keys for hybrid attribute encryption.
///
/// The encrypting process holds only `encryption_key`; only holders of
/// `decryption_key` can read the ciphertext.
#[derive(Clone)]
pub struct KeyPair {
    pub encryption_key: String,
    pub decryption_key: String,
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        self.encryption_key.zeroize();
        self.decryption_key.zeroize();
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("encryption_key", &"[REDACTED]")
            .field("decryption_key", &"[REDACTED]")
            .finish()
    }
}

/// Generate a hybrid key pair from two fresh X25519 key pairs.
///
/// Alice is the sender, Bob the receiver. Bob's component comes first in
/// both keys, so a pair passed in swapped order builds a box whose
/// ciphertext never authenticates instead of one that quietly works.
///
/// The sender key is static rather than ephemeral per message, which keeps
/// ciphertext smaller than a sealed box. The receiver can therefore link
/// messages from the same sender.
pub fn generate_key_pair() -> KeyPair {
    let alice = SecretKey::generate(&mut rand::rngs::OsRng);
    let bob = SecretKey::generate(&mut rand::rngs::OsRng);

    let mut encryption = Vec::with_capacity(2 * COMPONENT_SIZE);
    encryption.extend_from_slice(bob.public_key().as_bytes());
    encryption.extend_from_slice(&alice.to_bytes());

    let mut decryption = Vec::with_capacity(2 * COMPONENT_SIZE);
    decryption.extend_from_slice(&bob.to_bytes());
    decryption.extend_from_slice(alice.public_key().as_bytes());

    let pair = KeyPair {
        encryption_key: to_hex(&encryption),
        decryption_key: to_hex(&decryption),
    };
    encryption.zeroize();
    decryption.zeroize();
    pair
}
