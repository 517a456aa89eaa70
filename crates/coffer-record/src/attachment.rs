//! Attachment encryption: route an attachable's bytes through its box and
//! hand back ciphertext in the same shape.

use coffer_core::{CofferError, CofferResult};
use coffer_crypto::EncryptedIo;
use std::any::Any;
use std::io::Read;
use std::sync::Arc;

use crate::builder::BoxBuilder;
use crate::context::RecordContext;
use crate::registry::EncryptionRegistry;

/// A host upload object: a byte source with its original filename and content type.
pub trait UploadedFile: Send {
    /// Read the whole upload. Called at most once.
    fn read_all(&mut self) -> std::io::Result<Vec<u8>>;
    fn original_filename(&self) -> &str;
    fn content_type(&self) -> Option<&str>;
}

/// An explicit stream plus metadata.
pub struct IoAttachable {
    pub io: Box<dyn Read + Send>,
    pub filename: String,
    pub content_type: Option<String>,
}

impl IoAttachable {
    pub fn new(
        io: impl Read + Send + 'static,
        filename: impl Into<String>,
        content_type: Option<String>,
    ) -> Self {
        Self {
            io: Box::new(io),
            filename: filename.into(),
            content_type,
        }
    }
}

/// Reference to bytes the attachment framework has already stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRef {
    pub key: String,
    pub filename: String,
}

/// Every shape an attachment may arrive in.
pub enum Attachable {
    Io(IoAttachable),
    Uploaded(Box<dyn UploadedFile>),
    StoredBlob(BlobRef),
    /// A bare string: inline content or a reference, ambiguous.
    Raw(String),
    /// Anything the dispatcher does not recognize.
    Other(Box<dyn Any + Send>),
}

impl std::fmt::Debug for Attachable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Attachable::Io(io) => f
                .debug_struct("Io")
                .field("filename", &io.filename)
                .field("content_type", &io.content_type)
                .finish_non_exhaustive(),
            Attachable::Uploaded(u) => f
                .debug_struct("Uploaded")
                .field("filename", &u.original_filename())
                .field("content_type", &u.content_type())
                .finish_non_exhaustive(),
            Attachable::StoredBlob(blob) => f.debug_tuple("StoredBlob").field(blob).finish(),
            Attachable::Raw(s) => write!(f, "Raw(<{} bytes>)", s.len()),
            Attachable::Other(_) => f.write_str("Other(..)"),
        }
    }
}

/// Result of [`AttachmentDispatcher::encrypt_attachable`].
#[derive(Debug)]
pub enum Dispatch {
    /// Ciphertext with the original filename and content type.
    Encrypted(EncryptedIo),
    /// The attachment is not registered for encryption; returned untouched.
    NotManaged(Attachable),
    /// Unrecognized shape; the caller should store it as-is.
    Unchanged(Attachable),
}

/// Encrypts and decrypts registered attachments.
#[derive(Debug, Clone)]
pub struct AttachmentDispatcher {
    registry: Arc<EncryptionRegistry>,
    builder: BoxBuilder,
}

impl AttachmentDispatcher {
    pub fn new(registry: Arc<EncryptionRegistry>, builder: BoxBuilder) -> Self {
        Self { registry, builder }
    }

    pub fn is_encrypted(&self, record: &dyn RecordContext, name: &str) -> bool {
        self.registry
            .is_encrypted_attachment(record.model_name(), name)
    }

    /// Encrypt `attachable` for attachment `name` of `record`.
    ///
    /// The source stream is read exactly once.
    pub fn encrypt_attachable(
        &self,
        record: &dyn RecordContext,
        name: &str,
        attachable: Attachable,
    ) -> CofferResult<Dispatch> {
        let Some(config) = self.registry.attachment(record.model_name(), name) else {
            return Ok(Dispatch::NotManaged(attachable));
        };
        let encryptor = self
            .builder
            .build_box(record, config, record.table_name(), name)?;

        let source = match attachable {
            Attachable::Io(mut io) => {
                EncryptedIo::read_from(&mut io.io, io.filename, io.content_type)?
            }
            Attachable::Uploaded(mut upload) => {
                let bytes = upload.read_all()?;
                EncryptedIo::new(
                    bytes,
                    upload.original_filename(),
                    upload.content_type().map(str::to_string),
                )
            }
            Attachable::StoredBlob(blob) => {
                return Err(CofferError::UnsupportedOperation(format!(
                    "cannot encrypt stored blob {}; re-upload the file instead",
                    blob.key
                )))
            }
            Attachable::Raw(_) => {
                return Err(CofferError::UnsupportedOperation(
                    "cannot encrypt a raw string attachment".into(),
                ))
            }
            other @ Attachable::Other(_) => {
                tracing::debug!(attachment = name, "unrecognized attachable, skipping");
                return Ok(Dispatch::Unchanged(other));
            }
        };

        let encrypted = encryptor.encrypt_io(&source)?;
        tracing::debug!(
            attachment = name,
            bytes = encrypted.len(),
            "encrypted attachment"
        );
        Ok(Dispatch::Encrypted(encrypted))
    }

    /// Decrypt stored attachment bytes.
    pub fn decrypt_attachment(
        &self,
        record: &dyn RecordContext,
        name: &str,
        ciphertext: &[u8],
    ) -> CofferResult<Vec<u8>> {
        let config = self
            .registry
            .attachment(record.model_name(), name)
            .ok_or_else(|| {
                CofferError::config(format!(
                    "{}.{name} is not an encrypted attachment",
                    record.model_name()
                ))
            })?;
        self.builder
            .build_box(record, config, record.table_name(), name)?
            .decrypt(ciphertext)
    }
}
