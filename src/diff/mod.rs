//! Diff collaborators: the step that turns rendered pages (or raw buffers)
//! into a verdict.
//!
//! The pipeline only prepares inputs and stores whatever
//! [`ComparisonResult`] a collaborator returns. Two seams exist:
//!
//! - [`ImageComparator`] receives page image pairs after masks and crops.
//!   Default: [`PixelComparator`].
//! - [`DataComparator`] receives both PDF buffers untouched.
//!   Default: [`Base64Comparator`].
//!
//! Errors returned by a collaborator reach the caller unchanged.

pub mod data;
pub mod pixel;

pub use data::Base64Comparator;
pub use pixel::PixelComparator;

use crate::config::CompareConfig;
use crate::engine::PdfDetails;
use crate::error::PdfDiffError;
use crate::output::ComparisonResult;
use futures::future::BoxFuture;
use std::path::PathBuf;

/// One baseline/actual image pair: a full page, or one crop of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePair {
    pub page_index: usize,
    /// Set when the pair is a crop rather than the full page.
    pub crop_index: Option<usize>,
    pub baseline: PathBuf,
    pub actual: PathBuf,
}

/// Everything an [`ImageComparator`] needs for one comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSet {
    pub baseline_filename: String,
    pub actual_filename: String,
    /// Ordered by page, then crop.
    pub pairs: Vec<ImagePair>,
}

/// Compares rendered page images.
pub trait ImageComparator: Send + Sync {
    fn compare_images<'a>(
        &'a self,
        set: &'a ImageSet,
        config: &'a CompareConfig,
    ) -> BoxFuture<'a, Result<ComparisonResult, PdfDiffError>>;
}

/// Compares raw document buffers.
pub trait DataComparator: Send + Sync {
    fn compare_data<'a>(
        &'a self,
        baseline: &'a PdfDetails,
        actual: &'a PdfDetails,
        config: &'a CompareConfig,
    ) -> BoxFuture<'a, Result<ComparisonResult, PdfDiffError>>;
}
