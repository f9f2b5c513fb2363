//! Input resolution: turn a user-selected path into an in-memory file.
//!
//! ## Why read the whole file up front?
//!
//! Every later step needs the bytes: the page count is parsed from them and
//! the storage PUT sends them. Files are capped at a few tens of MiB, so a
//! single read is simpler than streaming and lets validation run without
//! touching the disk again.

use crate::error::RemediateError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const PDF_MIME: &str = "application/pdf";
const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// A file chosen for upload.
#[derive(Clone)]
pub struct SelectedFile {
    path: PathBuf,
    name: String,
    declared_type: Option<String>,
    bytes: Vec<u8>,
}

impl std::fmt::Debug for SelectedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectedFile")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("declared_type", &self.declared_type)
            .field("size_bytes", &self.bytes.len())
            .finish()
    }
}

impl SelectedFile {
    /// Wrap bytes that did not come from disk. The declared type is guessed
    /// from `name`'s extension.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        Self {
            path: PathBuf::from(&name),
            declared_type: guess_type(Path::new(&name)),
            name,
            bytes,
        }
    }

    /// File name as chosen by the user.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// MIME type derived from the extension, if known.
    pub fn declared_type(&self) -> Option<&str> {
        self.declared_type.as_deref()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Whether the content starts with `%PDF`.
    pub fn has_pdf_magic(&self) -> bool {
        self.bytes.starts_with(PDF_MAGIC)
    }
}

fn guess_type(path: &Path) -> Option<String> {
    mime_guess::from_path(path).first().map(|m| m.essence_str().to_string())
}

/// Read a local file, mapping I/O failures to actionable errors.
pub async fn read_local(path: impl AsRef<Path>) -> Result<SelectedFile, RemediateError> {
    let path = path.as_ref().to_path_buf();

    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return Err(RemediateError::PermissionDenied { path });
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(RemediateError::FileNotFound { path });
        }
        Err(e) => {
            return Err(RemediateError::Internal(format!(
                "failed to read '{}': {e}",
                path.display()
            )))
        }
    };

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    debug!("Read {} ({} bytes)", path.display(), bytes.len());

    Ok(SelectedFile {
        declared_type: guess_type(&path),
        name,
        path,
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_type_comes_from_extension() {
        assert_eq!(
            SelectedFile::from_bytes("report.PDF", vec![]).declared_type(),
            Some(PDF_MIME)
        );
        assert_eq!(
            SelectedFile::from_bytes("notes.txt", vec![]).declared_type(),
            Some("text/plain")
        );
        assert_eq!(SelectedFile::from_bytes("README", vec![]).declared_type(), None);
    }

    #[test]
    fn magic_bytes() {
        assert!(SelectedFile::from_bytes("a.pdf", b"%PDF-1.7\n".to_vec()).has_pdf_magic());
        assert!(!SelectedFile::from_bytes("a.pdf", b"PK\x03\x04".to_vec()).has_pdf_magic());
        assert!(!SelectedFile::from_bytes("a.pdf", b"%P".to_vec()).has_pdf_magic());
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let err = read_local("/nonexistent/dir/file.pdf").await.unwrap_err();
        assert!(matches!(err, RemediateError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn reads_name_and_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Résumé 2024.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();
        let file = read_local(&path).await.unwrap();
        assert_eq!(file.name(), "Résumé 2024.pdf");
        assert_eq!(file.size_bytes(), 8);
        assert_eq!(file.declared_type(), Some(PDF_MIME));
    }
}
