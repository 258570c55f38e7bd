//! Rasterisation engines.
//!
//! A [`RenderEngine`] turns a PDF buffer into one PNG per page and performs
//! the raster-level edits the comparison needs. Two implementations exist:
//!
//! | Engine | Rasteriser | Raster edits |
//! |--------|-----------|--------------|
//! | [`magick::MagickEngine`] | `convert` / `magick` process | same process |
//! | [`native::NativeEngine`] | pdfium (in-process) | `image` crate |
//!
//! The engine is chosen once, from `settings.imageEngine`, when the session
//! is built ([`from_config`]).
//!
//! ## File contract
//!
//! Pages of a document whose logical name is `report.pdf`, rendered into
//! folder `dir`, are written to `dir/report-0.png`, `dir/report-1.png`, …
//! Masks overwrite those files in place; crops write
//! `dir/report-<page>-<crop>.png` next to them and leave the page untouched.
//! The returned [`RenderedPageSet`] lists the page files so callers never
//! have to rediscover them by scanning the folder.

pub mod magick;
pub mod native;
pub mod raster;

use crate::config::{CompareConfig, ImageEngineKind};
use crate::error::PdfDiffError;
use crate::geometry::{CropRect, MaskColor, MaskRect};
use futures::future::BoxFuture;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// A PDF held in memory together with its logical file name.
#[derive(Debug, Clone)]
pub struct PdfDetails {
    /// Logical name; only its stem is used to name rendered pages.
    pub filename: String,
    pub buffer: Arc<[u8]>,
}

impl PdfDetails {
    pub fn new(filename: impl Into<String>, buffer: impl Into<Arc<[u8]>>) -> Self {
        Self {
            filename: filename.into(),
            buffer: buffer.into(),
        }
    }

    /// File stem of the logical name: `reports/q3.pdf` → `q3`.
    pub fn stem(&self) -> String {
        Path::new(&self.filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "document".to_string())
    }
}

/// The page images produced by one rasterisation, in page order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedPageSet {
    pages: Vec<(usize, PathBuf)>,
}

impl RenderedPageSet {
    /// Build from `(page_index, path)` pairs; sorted by page index.
    pub fn new(mut pages: Vec<(usize, PathBuf)>) -> Self {
        pages.sort_by_key(|(idx, _)| *idx);
        pages.dedup_by_key(|(idx, _)| *idx);
        Self { pages }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Page indexes present, ascending.
    pub fn indexes(&self) -> Vec<usize> {
        self.pages.iter().map(|(idx, _)| *idx).collect()
    }

    /// Path of the given page, if it was rendered.
    pub fn get(&self, page_index: usize) -> Option<&Path> {
        self.pages
            .iter()
            .find(|(idx, _)| *idx == page_index)
            .map(|(_, p)| p.as_path())
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Path)> {
        self.pages.iter().map(|(idx, p)| (*idx, p.as_path()))
    }
}

/// Raster backend used by the comparison pipeline.
///
/// Every operation overwrites earlier output at the same path; none of them
/// is safe to run concurrently on the same file.
pub trait RenderEngine: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Rasterise every page of `pdf` next to `output` (`dir/<stem>.png`, or a
    /// template already containing `%d`), then flatten each page onto white.
    fn pdf_to_png<'a>(
        &'a self,
        pdf: &'a PdfDetails,
        output: &'a Path,
        config: &'a CompareConfig,
    ) -> BoxFuture<'a, Result<RenderedPageSet, PdfDiffError>>;

    /// Paint `rect` with `color` onto `png`, in place.
    fn apply_mask<'a>(
        &'a self,
        png: &'a Path,
        rect: &'a MaskRect,
        color: &'a MaskColor,
    ) -> BoxFuture<'a, Result<(), PdfDiffError>>;

    /// Copy `rect` of `png` into [`crate::geometry::derived_crop_path`]`(png, index)`.
    fn apply_crop<'a>(
        &'a self,
        png: &'a Path,
        rect: &'a CropRect,
        index: usize,
    ) -> BoxFuture<'a, Result<PathBuf, PdfDiffError>>;

    /// Flatten transparency of `png` onto a white background, in place.
    fn post_process_png<'a>(
        &'a self,
        png: &'a Path,
        config: &'a CompareConfig,
    ) -> BoxFuture<'a, Result<(), PdfDiffError>>;
}

/// Build the engine selected by `settings.imageEngine`.
pub fn from_config(config: &CompareConfig) -> Arc<dyn RenderEngine> {
    match config.settings.image_engine {
        ImageEngineKind::GraphicsMagick => Arc::new(magick::MagickEngine::new(
            config.settings.magick_command.clone(),
        )),
        ImageEngineKind::Native => {
            Arc::new(native::NativeEngine::new().with_quality(config.settings.quality))
        }
    }
}

// ── Page file naming ────────────────────────────────────────────────────────

/// Split an output path into its folder and page stem.
///
/// `dir/report.png` and `dir/report-%d.png` both yield `(dir, "report")`.
pub(crate) fn output_parts(output: &Path) -> (PathBuf, String) {
    let dir = output
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = stem.strip_suffix("-%d").unwrap_or(&stem).to_string();
    (dir, stem)
}

/// File name of page `index` for `stem`.
pub(crate) fn page_file_name(stem: &str, index: usize) -> String {
    format!("{stem}-{index}.png")
}

fn page_pattern(stem: &str) -> Result<Regex, PdfDiffError> {
    Regex::new(&format!(r"^{}-(\d+)\.png$", regex::escape(stem)))
        .map_err(|e| PdfDiffError::Internal(format!("page pattern: {e}")))
}

/// Find the page files of `stem` in `dir`. Crop outputs
/// (`<stem>-<page>-<crop>.png`) do not match.
pub(crate) async fn discover_pages(dir: &Path, stem: &str) -> Result<RenderedPageSet, PdfDiffError> {
    let pattern = page_pattern(stem)?;
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| PdfDiffError::io(dir, e))?;

    let mut pages = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| PdfDiffError::io(dir, e))?
    {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(index) = pattern
            .captures(name)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<usize>().ok())
        else {
            continue;
        };
        pages.push((index, entry.path()));
    }

    Ok(RenderedPageSet::new(pages))
}

/// Delete page files left behind by an earlier render of `stem`.
pub(crate) async fn remove_stale_pages(dir: &Path, stem: &str) -> Result<(), PdfDiffError> {
    if !dir.exists() {
        return Ok(());
    }
    let stale = discover_pages(dir, stem).await?;
    for (_, path) in stale.iter() {
        debug!("Removing stale page {}", path.display());
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| PdfDiffError::io(path, e))?;
    }
    Ok(())
}
