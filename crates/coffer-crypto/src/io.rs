//! In-memory attachment payload: bytes plus the metadata that travels with them.

use std::io::Read;

/// An attachment body with its original filename and content type.
///
/// Encrypting replaces only `bytes`; filename and content type are preserved.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedIo {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: Option<String>,
}

impl EncryptedIo {
    pub fn new(bytes: Vec<u8>, filename: impl Into<String>, content_type: Option<String>) -> Self {
        Self {
            bytes,
            filename: filename.into(),
            content_type,
        }
    }

    /// Drain `reader` once into a new payload.
    pub fn read_from(
        reader: &mut dyn Read,
        filename: impl Into<String>,
        content_type: Option<String>,
    ) -> std::io::Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(Self::new(bytes, filename, content_type))
    }

    /// A fresh reader over the payload bytes.
    pub fn reader(&self) -> std::io::Cursor<&[u8]> {
        std::io::Cursor::new(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for EncryptedIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedIo")
            .field("len", &self.bytes.len())
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_from_drains_reader() {
        let mut src = std::io::Cursor::new(b"file body".to_vec());
        let io = EncryptedIo::read_from(&mut src, "a.txt", Some("text/plain".into())).unwrap();
        assert_eq!(io.bytes, b"file body");
        assert_eq!(io.filename, "a.txt");

        let mut rest = Vec::new();
        src.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty(), "source is consumed");
    }

    #[test]
    fn test_reader_yields_bytes() {
        let io = EncryptedIo::new(vec![1, 2, 3], "b.bin", None);
        let mut out = Vec::new();
        io.reader().read_to_end(&mut out).unwrap();
        assert_eq!(out, vec![1, 2, 3]);
        assert_eq!(io.len(), 3);
    }
}
