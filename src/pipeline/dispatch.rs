//! Comparison dispatch: run one comparison request in the selected mode.
//!
//! ```text
//! byImage:  render actual ─┐
//!           render baseline┴▶ page count ─▶ select ─▶ masks/crops ─▶ ImageComparator
//! byBase64: buffers ────────────────────────────────────────────────▶ DataComparator
//! ```
//!
//! Rendered pages stay on disk under the configured PNG folders (unless
//! `cleanPngPaths` is set) so callers can inspect them after the verdict.

use crate::config::{CompareConfig, GeometryOrder};
use crate::diff::{DataComparator, ImageComparator, ImagePair, ImageSet};
use crate::engine::{PdfDetails, RenderEngine, RenderedPageSet};
use crate::error::PdfDiffError;
use crate::geometry::{CropSpec, MaskSpec};
use crate::output::{ComparisonResult, ComparisonStatus, PageComparison};
use crate::pipeline::select::PageSelector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// How two documents are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComparisonMode {
    /// Rasterise and compare page images. (default)
    #[default]
    ByImage,
    /// Compare the raw buffers.
    ByBase64,
}

impl fmt::Display for ComparisonMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ComparisonMode::ByImage => "byImage",
            ComparisonMode::ByBase64 => "byBase64",
        })
    }
}

impl FromStr for ComparisonMode {
    type Err = PdfDiffError;

    /// Accepts `byImage` / `byBase64`, and the short forms `image` / `base64`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "byimage" | "image" => Ok(ComparisonMode::ByImage),
            "bybase64" | "base64" => Ok(ComparisonMode::ByBase64),
            other => Err(PdfDiffError::InvalidConfig(format!(
                "unknown comparison mode '{other}' (expected byImage or byBase64)"
            ))),
        }
    }
}

/// Masks, crops and page filters accumulated by a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareOptions {
    /// In insertion order.
    pub masks: Vec<MaskSpec>,
    /// In insertion order; the n-th crop of a page gets crop index n.
    pub crops: Vec<CropSpec>,
    pub pages: PageSelector,
}

/// Everything one comparison needs.
#[derive(Debug, Clone)]
pub struct ComparisonRequest<'a> {
    pub baseline: PdfDetails,
    pub actual: PdfDetails,
    pub config: &'a CompareConfig,
    pub options: &'a CompareOptions,
}

/// `byBase64`: hand both buffers to the data collaborator.
pub async fn compare_by_base64(
    request: &ComparisonRequest<'_>,
    comparator: &dyn DataComparator,
) -> Result<ComparisonResult, PdfDiffError> {
    info!(
        "Comparing {} against {} by base64",
        request.actual.filename, request.baseline.filename
    );
    comparator
        .compare_data(&request.baseline, &request.actual, request.config)
        .await
}

/// `byImage`: render both documents, prepare the selected pages and hand the
/// resulting image pairs to the image collaborator.
pub async fn compare_by_image(
    request: &ComparisonRequest<'_>,
    engine: &dyn RenderEngine,
    comparator: &dyn ImageComparator,
) -> Result<ComparisonResult, PdfDiffError> {
    let config = request.config;
    info!(
        "Comparing {} against {} by image ({} engine)",
        request.actual.filename,
        request.baseline.filename,
        engine.name()
    );

    let actual_out = page_output(&config.paths.actual_png_root_folder, &request.actual);
    let actual_pages = engine.pdf_to_png(&request.actual, &actual_out, config).await?;
    let baseline_out = page_output(&config.paths.baseline_png_root_folder, &request.baseline);
    let baseline_pages = engine.pdf_to_png(&request.baseline, &baseline_out, config).await?;

    let mut crop_files = Vec::new();
    let result = compare_rendered(
        request,
        engine,
        comparator,
        &baseline_pages,
        &actual_pages,
        &mut crop_files,
    )
    .await;

    if config.settings.clean_png_paths {
        let rendered = baseline_pages.iter().chain(actual_pages.iter()).map(|(_, p)| p);
        remove_files(rendered.chain(crop_files.iter().map(PathBuf::as_path))).await;
    }
    let result = result?;
    info!("{} vs {}: {}", request.actual.filename, request.baseline.filename, result.status);
    Ok(result)
}

async fn compare_rendered(
    request: &ComparisonRequest<'_>,
    engine: &dyn RenderEngine,
    comparator: &dyn ImageComparator,
    baseline_pages: &RenderedPageSet,
    actual_pages: &RenderedPageSet,
    crop_files: &mut Vec<PathBuf>,
) -> Result<ComparisonResult, PdfDiffError> {
    let config = request.config;
    let options = request.options;

    if config.settings.match_page_count && baseline_pages.len() != actual_pages.len() {
        return Ok(ComparisonResult::failed(format!(
            "Actual pdf page count ({}) is not the same as Baseline pdf ({}).",
            actual_pages.len(),
            baseline_pages.len()
        )));
    }

    warn_out_of_range(options, baseline_pages);

    let selected = options.pages.to_indices(&baseline_pages.indexes());
    debug!("Selected pages {:?}", selected);

    let mut pairs = Vec::new();
    let mut missing = Vec::new();
    for page in selected {
        let Some(baseline_png) = baseline_pages.get(page) else {
            continue;
        };
        let Some(actual_png) = actual_pages.get(page) else {
            missing.push(PageComparison::failed(
                page,
                None,
                format!("page {page} is missing from {}", request.actual.filename),
            ));
            continue;
        };
        pairs.extend(
            prepare_page(engine, config, options, page, baseline_png, actual_png, crop_files)
                .await?,
        );
    }

    let set = ImageSet {
        baseline_filename: request.baseline.filename.clone(),
        actual_filename: request.actual.filename.clone(),
        pairs,
    };
    let mut result = comparator.compare_images(&set, config).await?;

    if !missing.is_empty() {
        if result.status != ComparisonStatus::Failed {
            result.status = ComparisonStatus::Failed;
            result.message = Some(format!(
                "{} is not the same as {} compared by their images.",
                set.actual_filename, set.baseline_filename
            ));
        }
        result.details.extend(missing);
        result
            .details
            .sort_by_key(|d| (d.page_index, d.crop_index));
    }
    Ok(result)
}

/// `<png dir>/<stem>.png`; the engine derives `<stem>-<page>.png` from it.
fn page_output(dir: &Path, pdf: &PdfDetails) -> PathBuf {
    dir.join(format!("{}.png", pdf.stem()))
}

/// Masks and crops naming a page the baseline does not have are ignored.
fn warn_out_of_range(options: &CompareOptions, pages: &RenderedPageSet) {
    for mask in options.masks.iter().filter(|m| pages.get(m.page_index).is_none()) {
        warn!(
            "Ignoring mask for page {}: document has {} pages",
            mask.page_index,
            pages.len()
        );
    }
    for crop in options.crops.iter().filter(|c| pages.get(c.page_index).is_none()) {
        warn!(
            "Ignoring crop for page {}: document has {} pages",
            crop.page_index,
            pages.len()
        );
    }
}

/// Apply the page's masks and crops to both documents and return the pairs
/// to compare: one per crop, or the full page when it has no crops.
async fn prepare_page(
    engine: &dyn RenderEngine,
    config: &CompareConfig,
    options: &CompareOptions,
    page: usize,
    baseline_png: &Path,
    actual_png: &Path,
    crop_files: &mut Vec<PathBuf>,
) -> Result<Vec<ImagePair>, PdfDiffError> {
    let masks: Vec<&MaskSpec> = options.masks.iter().filter(|m| m.page_index == page).collect();
    let crops: Vec<&CropSpec> = options.crops.iter().filter(|c| c.page_index == page).collect();

    let (baseline_crops, actual_crops) = match config.settings.geometry_order {
        GeometryOrder::MasksThenCrops => {
            apply_masks(engine, baseline_png, &masks).await?;
            apply_masks(engine, actual_png, &masks).await?;
            let b = apply_crops(engine, baseline_png, &crops).await?;
            let a = apply_crops(engine, actual_png, &crops).await?;
            (b, a)
        }
        GeometryOrder::CropsThenMasks => {
            let b = apply_crops(engine, baseline_png, &crops).await?;
            let a = apply_crops(engine, actual_png, &crops).await?;
            apply_masks(engine, baseline_png, &masks).await?;
            apply_masks(engine, actual_png, &masks).await?;
            (b, a)
        }
    };

    if crops.is_empty() {
        return Ok(vec![ImagePair {
            page_index: page,
            crop_index: None,
            baseline: baseline_png.to_path_buf(),
            actual: actual_png.to_path_buf(),
        }]);
    }

    crop_files.extend(baseline_crops.iter().cloned());
    crop_files.extend(actual_crops.iter().cloned());
    Ok(baseline_crops
        .into_iter()
        .zip(actual_crops)
        .enumerate()
        .map(|(index, (baseline, actual))| ImagePair {
            page_index: page,
            crop_index: Some(index),
            baseline,
            actual,
        })
        .collect())
}

async fn apply_masks(
    engine: &dyn RenderEngine,
    png: &Path,
    masks: &[&MaskSpec],
) -> Result<(), PdfDiffError> {
    for mask in masks {
        debug!("Masking {:?} on {}", mask.rect, png.display());
        engine.apply_mask(png, &mask.rect, &mask.color).await?;
    }
    Ok(())
}

async fn apply_crops(
    engine: &dyn RenderEngine,
    png: &Path,
    crops: &[&CropSpec],
) -> Result<Vec<PathBuf>, PdfDiffError> {
    let mut out = Vec::with_capacity(crops.len());
    for (index, crop) in crops.iter().enumerate() {
        debug!("Cropping {:?} of {}", crop.rect, png.display());
        out.push(engine.apply_crop(png, &crop.rect, index).await?);
    }
    Ok(out)
}

/// Best-effort removal of rendered files.
async fn remove_files<'p>(paths: impl Iterator<Item = &'p Path>) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove {}: {}", path.display(), e);
            }
        }
    }
}
