//! File storage for delivery-note documentation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::errors::ServiceError;

pub const ALLOWED_CONTENT_TYPES: [&str; 4] =
    ["image/jpeg", "image/png", "image/jpg", "application/pdf"];

static UNSAFE_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid filename regex"));

/// A file received from a client, not yet stored.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn has_allowed_type(&self) -> bool {
        ALLOWED_CONTENT_TYPES.contains(&self.content_type.to_ascii_lowercase().as_str())
    }
}

/// Where a stored file ended up, relative to the storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub stored_filename: String,
    pub path: String,
}

#[async_trait]
pub trait DocumentStorage: Send + Sync {
    async fn store_delivery_document(
        &self,
        delivery_note_id: i64,
        file: &UploadedFile,
    ) -> Result<StoredDocument, ServiceError>;
}

/// Keeps letters, digits, dots, dashes and underscores; everything else collapses to `_`.
pub fn sanitize_filename(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let cleaned = UNSAFE_FILENAME_CHARS.replace_all(base, "_");
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == '_');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.chars().take(100).collect()
    }
}

/// Writes files below a local upload root.
#[derive(Debug, Clone)]
pub struct LocalDocumentStorage {
    root: PathBuf,
}

impl LocalDocumentStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl DocumentStorage for LocalDocumentStorage {
    #[instrument(skip(self, file), fields(filename = %file.filename, size = file.size()))]
    async fn store_delivery_document(
        &self,
        delivery_note_id: i64,
        file: &UploadedFile,
    ) -> Result<StoredDocument, ServiceError> {
        let relative_dir = format!("dokumentasi/surat-jalan/{}", delivery_note_id);
        let stored_filename = format!("{}-{}", Uuid::new_v4(), sanitize_filename(&file.filename));

        let dir = self.root.join(&relative_dir);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&stored_filename), &file.data).await?;

        let path = format!("{}/{}", relative_dir, stored_filename);
        debug!(%path, "stored delivery note document");
        Ok(StoredDocument {
            stored_filename,
            path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("foto gudang.jpg", "foto_gudang.jpg")]
    #[case("../../etc/passwd", "passwd")]
    #[case("surat-jalan_01.pdf", "surat-jalan_01.pdf")]
    #[case("...", "file")]
    #[case("", "file")]
    fn filenames_are_sanitized(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(sanitize_filename(input), expected);
    }

    #[test]
    fn content_type_allow_list() {
        let mut file = UploadedFile {
            filename: "a.png".into(),
            content_type: "image/PNG".into(),
            data: Bytes::from_static(b"x"),
        };
        assert!(file.has_allowed_type());
        file.content_type = "text/html".into();
        assert!(!file.has_allowed_type());
    }

    #[tokio::test]
    async fn local_storage_writes_under_note_directory() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalDocumentStorage::new(dir.path());
        let file = UploadedFile {
            filename: "bukti kirim.pdf".into(),
            content_type: "application/pdf".into(),
            data: Bytes::from_static(b"%PDF-1.4"),
        };

        let stored = storage.store_delivery_document(12, &file).await.unwrap();
        assert!(stored.path.starts_with("dokumentasi/surat-jalan/12/"));
        assert!(stored.stored_filename.ends_with("-bukti_kirim.pdf"));

        let written = tokio::fs::read(dir.path().join(&stored.path)).await.unwrap();
        assert_eq!(written, b"%PDF-1.4");
    }
}
