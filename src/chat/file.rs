//! File attachments: whole-file base64 inline encoding

use super::types::{ChatEvent, EventError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::Path;
use thiserror::Error;

/// Largest attachment accepted before encoding (5 MiB)
pub const MAX_FILE_BYTES: u64 = 5 * 1024 * 1024;

/// Media type used when none can be inferred from the file name
pub const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum FileError {
    #[error("file is {size} bytes, the limit is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },
    #[error("failed to read attachment: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Event(#[from] EventError),
}

/// Validates and encodes attachments into `File` events.
///
/// One file per event, no chunking, no compression. Base64 inflates the
/// payload by roughly a third.
#[derive(Debug, Clone)]
pub struct FileEncoder {
    limit: u64,
}

impl FileEncoder {
    pub fn new() -> Self {
        Self::with_limit(MAX_FILE_BYTES)
    }

    pub fn with_limit(limit: u64) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    fn check_size(&self, size: u64) -> Result<(), FileError> {
        if size > self.limit {
            return Err(FileError::TooLarge {
                size,
                limit: self.limit,
            });
        }
        Ok(())
    }

    /// Encode in-memory bytes
    pub fn encode(
        &self,
        sender: &str,
        bytes: &[u8],
        media_type: &str,
    ) -> Result<ChatEvent, FileError> {
        self.check_size(bytes.len() as u64)?;
        Ok(ChatEvent::file(sender, STANDARD.encode(bytes), media_type)?)
    }

    /// Read and encode a file from disk.
    ///
    /// The size is checked from metadata first so oversized files are never
    /// read into memory.
    pub async fn encode_path(&self, sender: &str, path: &Path) -> Result<ChatEvent, FileError> {
        let metadata = tokio::fs::metadata(path).await?;
        self.check_size(metadata.len())?;
        let bytes = tokio::fs::read(path).await?;
        self.encode(sender, &bytes, &media_type_for(path))
    }
}

impl Default for FileEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Guess a media type from the file extension
pub fn media_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| FALLBACK_MEDIA_TYPE.to_string())
}

/// Decode the inline data of a received attachment
pub fn decode_file_data(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::EventKind;

    #[test]
    fn test_six_mib_rejected() {
        let bytes = vec![0u8; 6 * 1024 * 1024];
        match FileEncoder::new().encode("alice", &bytes, "image/png") {
            Err(FileError::TooLarge { size, limit }) => {
                assert_eq!(size, 6 * 1024 * 1024);
                assert_eq!(limit, MAX_FILE_BYTES);
            }
            other => panic!("expected TooLarge, got {:?}", other),
        }
    }

    #[test]
    fn test_four_mib_encoded() {
        let bytes = vec![7u8; 4 * 1024 * 1024];
        let event = FileEncoder::new()
            .encode("alice", &bytes, "image/jpeg")
            .unwrap();
        assert_eq!(event.kind(), EventKind::File);
        assert_eq!(event.file_media_type(), Some("image/jpeg"));
        let data = event.file_data().unwrap();
        assert_eq!(decode_file_data(data).unwrap(), bytes);
    }

    #[test]
    fn test_exact_limit_accepted() {
        let encoder = FileEncoder::with_limit(4);
        assert!(encoder.encode("alice", b"abcd", "text/plain").is_ok());
        assert!(matches!(
            encoder.encode("alice", b"abcde", "text/plain"),
            Err(FileError::TooLarge { size: 5, limit: 4 })
        ));
    }

    #[test]
    fn test_blank_sender_propagates() {
        assert!(matches!(
            FileEncoder::new().encode(" ", b"x", "text/plain"),
            Err(FileError::Event(EventError::EmptySender))
        ));
    }

    #[test]
    fn test_media_type_guess() {
        assert_eq!(media_type_for(Path::new("cat.png")), "image/png");
        assert_eq!(media_type_for(Path::new("notes.unknownext")), FALLBACK_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_encode_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dot.gif");
        std::fs::write(&path, b"GIF89a").unwrap();

        let event = FileEncoder::new().encode_path("bob", &path).await.unwrap();
        assert_eq!(event.file_media_type(), Some("image/gif"));
        assert_eq!(decode_file_data(event.file_data().unwrap()).unwrap(), b"GIF89a");
    }

    #[tokio::test]
    async fn test_encode_path_checks_size_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        std::fs::write(&path, vec![1u8; 16]).unwrap();

        let err = FileEncoder::with_limit(8)
            .encode_path("bob", &path)
            .await
            .unwrap_err();
        assert!(matches!(err, FileError::TooLarge { size: 16, limit: 8 }));
    }

    #[tokio::test]
    async fn test_encode_path_missing_file() {
        let err = FileEncoder::new()
            .encode_path("bob", Path::new("/nonexistent/chatterbox/file.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, FileError::Io(_)));
    }
}
