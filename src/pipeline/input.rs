//! Input resolution: turn a caller-supplied path or buffer into a
//! [`PdfSource`], and a source into bytes.
//!
//! A file path that does not exist is retried as `<root>/<stem>.pdf`, so a
//! test can name a document by its bare name (`"invoice"`) and let the
//! configured baseline/actual root folder supply the location.
//!
//! Problems found here are *configuration* problems: they are reported as a
//! [`SourceError`], which the session records as a failed result instead of
//! propagating.

use crate::engine::PdfDetails;
use crate::error::PdfDiffError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Extension appended when falling back to the root folder.
pub const PDF_EXTENSION: &str = "pdf";

/// Which side of the comparison a source belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Baseline,
    Actual,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Baseline => "Baseline",
            Role::Actual => "Actual",
        })
    }
}

/// Why a source could not be accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("{role} pdf file path was not set. Please define it correctly, then try again.")]
    PathNotSet { role: Role },

    #[error("{role} pdf file path does not exist: '{path}' (also tried '{fallback}'). Please define it correctly, then try again.")]
    NotFound {
        role: Role,
        path: PathBuf,
        fallback: PathBuf,
    },

    #[error("{role} pdf buffer is empty. Please define it correctly, then try again.")]
    EmptyBuffer { role: Role },

    #[error("{role} pdf buffer has no filename. Please define it correctly, then try again.")]
    MissingFilename { role: Role },
}

/// A document to compare: exactly one of a file or an in-memory buffer.
#[derive(Debug, Clone)]
pub enum PdfSource {
    /// Resolved, existing file.
    File(PathBuf),
    /// Bytes supplied by the caller with their logical file name.
    Buffer { filename: String, bytes: Arc<[u8]> },
}

impl PdfSource {
    /// Accept a file path, falling back to `<root_folder>/<stem>.pdf`.
    pub fn from_file(role: Role, path: &Path, root_folder: &Path) -> Result<Self, SourceError> {
        if path.as_os_str().is_empty() {
            return Err(SourceError::PathNotSet { role });
        }
        if path.exists() {
            debug!("{role} pdf resolved: {}", path.display());
            return Ok(Self::File(path.to_path_buf()));
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let fallback = root_folder.join(format!("{stem}.{PDF_EXTENSION}"));
        if !stem.is_empty() && fallback.exists() {
            debug!("{role} pdf resolved via root folder: {}", fallback.display());
            return Ok(Self::File(fallback));
        }

        Err(SourceError::NotFound {
            role,
            path: path.to_path_buf(),
            fallback,
        })
    }

    /// Accept an in-memory document; both bytes and a file name are required.
    pub fn from_buffer(role: Role, bytes: Vec<u8>, filename: &str) -> Result<Self, SourceError> {
        if bytes.is_empty() {
            return Err(SourceError::EmptyBuffer { role });
        }
        if filename.trim().is_empty() {
            return Err(SourceError::MissingFilename { role });
        }
        Ok(Self::Buffer {
            filename: filename.trim().to_string(),
            bytes: bytes.into(),
        })
    }

    /// Logical file name: the path for files, the supplied name for buffers.
    pub fn filename(&self) -> String {
        match self {
            PdfSource::File(p) => p.to_string_lossy().into_owned(),
            PdfSource::Buffer { filename, .. } => filename.clone(),
        }
    }

    /// Read the document into memory.
    pub async fn load(&self) -> Result<PdfDetails, PdfDiffError> {
        let details = match self {
            PdfSource::File(path) => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| PdfDiffError::io(path, e))?;
                PdfDetails::new(self.filename(), bytes)
            }
            PdfSource::Buffer { filename, bytes } => PdfDetails::new(filename.clone(), Arc::clone(bytes)),
        };

        if !details.buffer.starts_with(b"%PDF") {
            warn!("{} does not start with a %PDF header", details.filename);
        }
        Ok(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_path_is_used_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.pdf");
        std::fs::write(&file, b"%PDF-1.4").unwrap();

        let src = PdfSource::from_file(Role::Baseline, &file, Path::new("/nowhere")).unwrap();
        assert!(matches!(src, PdfSource::File(ref p) if p == &file));
    }

    #[test]
    fn missing_path_falls_back_to_root_folder_by_stem() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("invoice.pdf"), b"%PDF-1.4").unwrap();

        let src =
            PdfSource::from_file(Role::Actual, Path::new("elsewhere/invoice.pdf"), root.path()).unwrap();
        assert_eq!(src.filename(), root.path().join("invoice.pdf").to_string_lossy());

        let src = PdfSource::from_file(Role::Actual, Path::new("invoice"), root.path()).unwrap();
        assert!(matches!(src, PdfSource::File(_)));
    }

    #[test]
    fn unresolvable_path_is_a_source_error() {
        let root = tempfile::tempdir().unwrap();
        let err = PdfSource::from_file(Role::Baseline, Path::new("ghost.pdf"), root.path()).unwrap_err();
        assert!(matches!(err, SourceError::NotFound { role: Role::Baseline, .. }));
        assert!(err.to_string().starts_with("Baseline pdf file path does not exist"));

        let err = PdfSource::from_file(Role::Actual, Path::new(""), root.path()).unwrap_err();
        assert_eq!(err, SourceError::PathNotSet { role: Role::Actual });
    }

    #[test]
    fn buffer_needs_bytes_and_name() {
        assert_eq!(
            PdfSource::from_buffer(Role::Actual, Vec::new(), "a.pdf").unwrap_err(),
            SourceError::EmptyBuffer { role: Role::Actual }
        );
        assert_eq!(
            PdfSource::from_buffer(Role::Actual, b"%PDF".to_vec(), "  ").unwrap_err(),
            SourceError::MissingFilename { role: Role::Actual }
        );
        let src = PdfSource::from_buffer(Role::Actual, b"%PDF".to_vec(), "a.pdf").unwrap();
        assert_eq!(src.filename(), "a.pdf");
    }

    #[tokio::test]
    async fn load_reads_file_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("doc.pdf");
        std::fs::write(&file, b"%PDF-1.7 body").unwrap();

        let details = PdfSource::File(file).load().await.unwrap();
        assert_eq!(&*details.buffer, b"%PDF-1.7 body");
        assert_eq!(details.stem(), "doc");
    }
}
