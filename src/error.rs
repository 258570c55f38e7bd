//! Error types for the edgequake-pdfdiff library.
//!
//! Two failure classes are kept apart:
//!
//! * **Configuration problems** (missing baseline, unreadable buffer, output
//!   folder that cannot be created) never surface as `Err`. The session turns
//!   them into a sticky [`crate::SessionState::Failed`] state and a `failed`
//!   [`crate::ComparisonResult`], so a misconfigured test reports a verdict
//!   instead of crashing.
//!
//! * [`PdfDiffError`] is **fatal**: the rasteriser could not be launched, a
//!   raster file could not be written, or the diff collaborator gave up. It is
//!   returned as `Err(PdfDiffError)` from
//!   [`crate::ComparisonSession::compare`] and every engine operation.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdfdiff library.
#[derive(Debug, Error)]
pub enum PdfDiffError {
    // ── Engine errors ─────────────────────────────────────────────────────
    /// The external rasteriser could not be started at all.
    #[error("Failed to launch '{program}': {source}\nIs ImageMagick installed and on PATH?")]
    EngineSpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The external rasteriser ran but exited unsuccessfully.
    #[error("'{program}' exited with {status}: {stderr}")]
    EngineCommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    /// pdfium could not open or render the document.
    #[error("Rasterisation failed for '{filename}': {detail}")]
    RasterisationFailed { filename: String, detail: String },

    /// Rasterisation finished but produced no page image.
    #[error("No pages were rendered for '{filename}' into {dir:?}")]
    NoPagesRendered { filename: String, dir: PathBuf },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or switch settings.imageEngine to \"graphicsMagick\"."
    )]
    PdfiumBindingFailed(String),

    /// A raster file could not be decoded or encoded.
    #[error("Image operation failed on '{path}': {detail}")]
    ImageFailed { path: PathBuf, detail: String },

    // ── Geometry errors ───────────────────────────────────────────────────
    /// A mask colour is neither a known name nor a hex literal.
    #[error("Invalid colour '{0}': expected a colour name or #rgb / #rrggbb / #rrggbbaa")]
    InvalidColor(String),

    /// A crop rectangle selects no pixels of the page it targets.
    #[error("Invalid geometry for '{path}': {detail}")]
    InvalidGeometry { path: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Reading, writing or listing a file failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A JSON configuration file could not be read or parsed.
    #[error("Failed to load configuration from '{path}': {detail}")]
    ConfigLoad { path: PathBuf, detail: String },

    // ── Collaborator errors ───────────────────────────────────────────────
    /// A diff collaborator failed; its message is passed through verbatim.
    #[error("Comparator error: {0}")]
    Comparator(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PdfDiffError {
    /// Wrap an [`std::io::Error`] together with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap an [`image::ImageError`] together with the file it concerns.
    pub fn image(path: impl Into<PathBuf>, err: image::ImageError) -> Self {
        Self::ImageFailed {
            path: path.into(),
            detail: err.to_string(),
        }
    }
}
