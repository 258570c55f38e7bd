//! # edgequake-pdfdiff
//!
//! Visual regression testing for PDF documents.
//!
//! ## Why this crate?
//!
//! Byte-comparing two PDFs is almost useless: producers embed timestamps,
//! IDs and reordered objects, so identical-looking documents differ. This
//! crate rasterises every page of a baseline and an actual document, paints
//! over known-volatile regions, optionally cuts out the regions that matter,
//! and compares the resulting images pixel by pixel.
//!
//! ## Pipeline Overview
//!
//! ```text
//! ComparisonSession
//!  │
//!  ├─ 1. Input    baseline + actual: file (with root-folder fallback) or buffer
//!  ├─ 2. Render   one PNG per page via ImageMagick or pdfium, flattened on white
//!  ├─ 3. Select   onlyPageIndexes / skipPageIndexes
//!  ├─ 4. Geometry masks (in place) and crops (new files) on both documents
//!  ├─ 5. Diff     ImageComparator (byImage) or DataComparator (byBase64)
//!  └─ 6. Flatten  post-process every PNG in both output folders (byImage)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdfdiff::{ComparisonMode, ComparisonSession, CompareConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CompareConfig::from_file("pdfdiff.json")?;
//!     let mut session = ComparisonSession::new(config)
//!         .set_baseline_from_file("baseline.pdf")
//!         .set_actual_from_file("actual.pdf");
//!     let result = session.compare(ComparisonMode::ByImage).await?;
//!     println!("{}", result.status);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfdiff` binary (clap + anyhow + tracing-subscriber) |
//!
//! ## Engines
//!
//! | `settings.imageEngine` | Needs |
//! |------------------------|-------|
//! | `graphicsMagick` (default) | `convert` (or `magick` on Windows) with a Ghostscript delegate on `PATH` |
//! | `native` | a pdfium shared library (`PDFIUM_LIB_PATH`, working directory or system path) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod output;
pub mod pipeline;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{CompareConfig, CompareConfigBuilder, GeometryOrder, ImageEngineKind, PathsConfig, Settings};
pub use diff::{Base64Comparator, DataComparator, ImageComparator, ImagePair, ImageSet, PixelComparator};
pub use engine::{PdfDetails, RenderEngine, RenderedPageSet};
pub use error::PdfDiffError;
pub use geometry::{CropRect, CropSpec, MaskColor, MaskRect, MaskSpec};
pub use output::{ComparisonResult, ComparisonStatus, PageComparison};
pub use pipeline::dispatch::ComparisonMode;
pub use pipeline::select::PageSelector;
pub use session::{CompareOptions, ComparisonSession, SessionState};
