//! coffer-crypto: per-attribute encryption for coffer
//!
//! Key hierarchy:
//! ```text
//! Master Key (process-wide, supplied by the operator)
//!   └── Attribute Key (HKDF-SHA384, salt=table, info=0xB0*32 || attribute)
//!       └── Box: AES-256-GCM (default) or XChaCha20-Poly1305, random nonce
//!
//! Hybrid key pair (encrypt-only producers):
//!   encryption_key = bob.public || alice.secret
//!   decryption_key = bob.secret || alice.public
//! ```
//!
//! Ciphertext: `[1-byte algorithm tag][nonce][ciphertext + 16-byte tag]`

pub mod cipher;
pub mod cipher_box;
pub mod encryptor;
pub mod hybrid;
pub mod io;
pub mod kdf;
pub mod keys;
pub mod padding;

pub use cipher::Algorithm;
pub use cipher_box::{BoxOptions, CipherBox};
pub use encryptor::{encryptor, DecryptedWith, Encryptor};
pub use io::EncryptedIo;
pub use kdf::{attribute_key, derive_attribute_key, AttributeKey};
pub use keys::{generate_key, generate_key_pair, KeyPair};

/// Size of a symmetric attribute key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of one X25519 key component
pub const COMPONENT_SIZE: usize = 32;

/// Size of a Poly1305 / GCM authentication tag
pub const TAG_SIZE: usize = 16;
