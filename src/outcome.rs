//! Per-URL results handed to the completion callback.

use std::collections::HashMap;
use std::io::Cursor;

use tempfile::NamedTempFile;

/// Terminal result of one URL in a batch.
///
/// Exactly one payload is ever present. File and buffer payloads are
/// positioned at offset 0 and belong to the receiver; the download center
/// never touches them after delivery. A persisted file is removed from disk
/// when the [`NamedTempFile`] is dropped unless the caller keeps or persists it.
#[derive(Debug)]
pub enum DownloadResult {
    /// Content persisted to a temporary file.
    File(NamedTempFile),
    /// Content kept in memory.
    Buffer(Cursor<Vec<u8>>),
    /// Why the download failed.
    Error(String),
}

impl DownloadResult {
    /// The downloaded file, if delivered to disk.
    #[must_use]
    pub const fn fd(&self) -> Option<&NamedTempFile> {
        match self {
            Self::File(file) => Some(file),
            _ => None,
        }
    }

    /// Mutable access to the downloaded file, e.g. to read it.
    pub const fn fd_mut(&mut self) -> Option<&mut NamedTempFile> {
        match self {
            Self::File(file) => Some(file),
            _ => None,
        }
    }

    /// The in-memory content, if delivered to memory.
    #[must_use]
    pub const fn buffer(&self) -> Option<&Cursor<Vec<u8>>> {
        match self {
            Self::Buffer(buffer) => Some(buffer),
            _ => None,
        }
    }

    /// Mutable access to the in-memory content.
    pub const fn buffer_mut(&mut self) -> Option<&mut Cursor<Vec<u8>>> {
        match self {
            Self::Buffer(buffer) => Some(buffer),
            _ => None,
        }
    }

    /// The failure message, if the download failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Error(message) => Some(message),
            _ => None,
        }
    }

    /// Returns true if content was delivered.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        !matches!(self, Self::Error(_))
    }

    /// Takes ownership of the downloaded file.
    #[must_use]
    pub fn into_file(self) -> Option<NamedTempFile> {
        match self {
            Self::File(file) => Some(file),
            _ => None,
        }
    }

    /// Takes ownership of the in-memory content.
    #[must_use]
    pub fn into_buffer(self) -> Option<Cursor<Vec<u8>>> {
        match self {
            Self::Buffer(buffer) => Some(buffer),
            _ => None,
        }
    }
}

/// Result of every distinct URL of a batch, keyed by the URL as submitted.
pub type ResultMap = HashMap<String, DownloadResult>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn error_has_no_payload() {
        let result = DownloadResult::Error("HTTP error 404: File not found".into());
        assert!(!result.is_ok());
        assert!(result.fd().is_none());
        assert!(result.buffer().is_none());
        assert_eq!(result.error(), Some("HTTP error 404: File not found"));
    }

    #[test]
    fn buffer_is_readable_from_start() {
        let mut result = DownloadResult::Buffer(Cursor::new(b"payload".to_vec()));
        assert!(result.is_ok());
        assert!(result.error().is_none());
        assert!(result.fd().is_none());

        let mut content = String::new();
        result
            .buffer_mut()
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "payload");
    }

    #[test]
    fn file_ownership_moves_to_caller() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();
        let result = DownloadResult::File(file);
        assert!(result.fd().is_some());
        assert!(result.buffer().is_none());

        let owned = result.into_file().unwrap();
        assert_eq!(owned.path(), path);
    }
}
