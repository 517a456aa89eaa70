//! coffer-record: attribute encryption on top of a host record framework
//!
//! The host framework supplies records ([`RecordContext`]), a registry of
//! which attributes are encrypted ([`EncryptionRegistry`]), and storage for
//! migration ([`migrate::RecordStore`]). This crate turns declarative
//! [`BoxConfig`]s into concrete boxes and drives encryption through them.
//!
//! ```text
//! BoxConfig + RecordContext ──BoxBuilder──▶ Encryptor ──▶ encrypt / decrypt
//!                                   ▲
//!        AttachmentDispatcher ──────┤
//!        Migrator ──────────────────┘
//! ```

pub mod attachment;
pub mod builder;
pub mod context;
pub mod memory;
pub mod migrate;
pub mod options;
pub mod registry;

pub use attachment::{
    Attachable, AttachmentDispatcher, BlobRef, Dispatch, IoAttachable, UploadedFile,
};
pub use builder::{build_box, BoxBuilder};
pub use context::{FromLookup, LookupValue, RecordContext};
pub use memory::{MemoryRecord, MemoryRecordStore};
pub use migrate::{
    Checkpoint, CheckpointStore, JsonCheckpointStore, MemoryCheckpointStore, MigratableRecord,
    MigrationReport, MigrationState, MigrationTarget, Migrator, RecordFailure, RecordStore,
};
pub use options::{AttributeMeta, BoxConfig, ConfigValue};
pub use registry::EncryptionRegistry;
