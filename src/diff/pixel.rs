//! Default `byImage` collaborator: per-pixel colour distance in YIQ space.
//!
//! Both images are flattened onto white before comparing, so transparency
//! left by an engine never counts as a difference. A pixel differs when its
//! YIQ distance exceeds `threshold² × MAX_YIQ_DELTA`; a pair fails when more
//! than `tolerance` pixels differ, and a highlight image is written to the
//! diff folder:
//!
//! - differing pixels in red
//! - everything else as a faded grey copy of the actual page

use super::{ImageComparator, ImagePair, ImageSet};
use crate::config::CompareConfig;
use crate::engine::raster;
use crate::error::PdfDiffError;
use crate::output::{ComparisonResult, ComparisonStatus, PageComparison};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt, TryStreamExt};
use image::codecs::png::CompressionType;
use image::{DynamicImage, Rgb, RgbImage};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Largest YIQ delta between any two colours.
const MAX_YIQ_DELTA: f32 = 35215.0;

/// Weight of the original luma in unchanged pixels of the diff image.
const FADE: f32 = 0.1;

const DIFF_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

#[derive(Debug, Clone)]
pub struct PixelComparator {
    /// Pairs compared at the same time.
    concurrency: usize,
}

impl Default for PixelComparator {
    fn default() -> Self {
        Self::new()
    }
}

impl PixelComparator {
    pub fn new() -> Self {
        let concurrency = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self { concurrency }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }
}

fn luma(Rgb([r, g, b]): Rgb<u8>) -> f32 {
    f32::from(r) * 0.298_895_3 + f32::from(g) * 0.586_622_5 + f32::from(b) * 0.114_482_23
}

/// Squared, perceptually weighted YIQ distance between two opaque pixels.
pub fn yiq_delta(a: Rgb<u8>, b: Rgb<u8>) -> f32 {
    let Rgb([r1, g1, b1]) = a;
    let Rgb([r2, g2, b2]) = b;
    let dr = f32::from(r1) - f32::from(r2);
    let dg = f32::from(g1) - f32::from(g2);
    let db = f32::from(b1) - f32::from(b2);

    let y = dr * 0.298_895_3 + dg * 0.586_622_5 + db * 0.114_482_23;
    let i = dr * 0.595_978 - dg * 0.274_176_1 - db * 0.321_801_9;
    let q = dr * 0.211_470_17 - dg * 0.522_617_1 + db * 0.311_146_94;
    0.5053 * y * y + 0.299 * i * i + 0.1957 * q * q
}

/// `<diff_dir>/<actual stem>_diff.png`
pub fn diff_png_path(diff_dir: &Path, actual: &Path) -> PathBuf {
    let stem = actual
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "page".to_string());
    diff_dir.join(format!("{stem}_diff.png"))
}

/// Count differing pixels of two same-sized images and draw the highlight.
pub fn diff_images(baseline: &RgbImage, actual: &RgbImage, threshold: f32) -> (u64, RgbImage) {
    let max_delta = MAX_YIQ_DELTA * threshold * threshold;
    let mut count = 0u64;
    let highlight = RgbImage::from_fn(actual.width(), actual.height(), |x, y| {
        let a = *actual.get_pixel(x, y);
        if yiq_delta(*baseline.get_pixel(x, y), a) > max_delta {
            count += 1;
            DIFF_COLOR
        } else {
            let v = (255.0 + (luma(a) - 255.0) * FADE).round().clamp(0.0, 255.0) as u8;
            Rgb([v, v, v])
        }
    });
    (count, highlight)
}

fn compare_pair(
    pair: &ImagePair,
    threshold: f32,
    tolerance: u64,
    diff_dir: &Path,
    compression: CompressionType,
) -> Result<PageComparison, PdfDiffError> {
    let baseline = raster::flatten_onto_white(&raster::load(&pair.baseline)?);
    let actual = raster::flatten_onto_white(&raster::load(&pair.actual)?);

    if baseline.dimensions() != actual.dimensions() {
        let (bw, bh) = baseline.dimensions();
        let (aw, ah) = actual.dimensions();
        return Ok(PageComparison::failed(
            pair.page_index,
            pair.crop_index,
            format!("image dimensions differ: baseline {bw}x{bh}, actual {aw}x{ah}"),
        ));
    }

    let (count, highlight) = diff_images(&baseline, &actual, threshold);
    debug!(
        "{} vs {}: {} differing pixels (tolerance {})",
        pair.baseline.display(),
        pair.actual.display(),
        count,
        tolerance
    );

    if count <= tolerance {
        let mut page = PageComparison::passed(pair.page_index, pair.crop_index);
        page.diff_pixels = count;
        return Ok(page);
    }

    std::fs::create_dir_all(diff_dir).map_err(|e| PdfDiffError::io(diff_dir, e))?;
    let diff_png = diff_png_path(diff_dir, &pair.actual);
    raster::write_png(&diff_png, &DynamicImage::ImageRgb8(highlight), compression)?;

    let mut page = PageComparison::failed(
        pair.page_index,
        pair.crop_index,
        format!("{count} pixels differ (tolerance {tolerance})"),
    );
    page.diff_pixels = count;
    page.diff_png = Some(diff_png);
    Ok(page)
}

async fn compare_pair_blocking(
    pair: ImagePair,
    threshold: f32,
    tolerance: u64,
    diff_dir: PathBuf,
    compression: CompressionType,
) -> Result<PageComparison, PdfDiffError> {
    tokio::task::spawn_blocking(move || compare_pair(&pair, threshold, tolerance, &diff_dir, compression))
        .await
        .map_err(|e| PdfDiffError::Comparator(format!("pixel diff task panicked: {e}")))?
}

impl ImageComparator for PixelComparator {
    fn compare_images<'a>(
        &'a self,
        set: &'a ImageSet,
        config: &'a CompareConfig,
    ) -> BoxFuture<'a, Result<ComparisonResult, PdfDiffError>> {
        async move {
            let threshold = config.settings.threshold;
            let tolerance = config.settings.tolerance;
            let compression = raster::compression_for_quality(config.settings.quality);
            let diff_dir = config.paths.diff_png_root_folder.clone();

            let pages: Vec<PageComparison> = stream::iter(set.pairs.iter().cloned().map(|pair| {
                compare_pair_blocking(pair, threshold, tolerance, diff_dir.clone(), compression)
            }))
            .buffered(self.concurrency)
            .try_collect()
            .await?;

            let failed: Vec<PageComparison> =
                pages.into_iter().filter(|p| p.status == ComparisonStatus::Failed).collect();
            info!(
                "Compared {} image pairs of {}: {} failed",
                set.pairs.len(),
                set.actual_filename,
                failed.len()
            );

            if failed.is_empty() {
                Ok(ComparisonResult::passed())
            } else {
                Ok(ComparisonResult::failed(format!(
                    "{} is not the same as {} compared by their images.",
                    set.actual_filename, set.baseline_filename
                ))
                .with_details(failed))
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn save(path: &Path, img: RgbImage) {
        DynamicImage::ImageRgb8(img).save(path).unwrap();
    }

    fn white(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([255, 255, 255]))
    }

    fn config_in(root: &Path) -> CompareConfig {
        CompareConfig::builder().root_folder(root).build().unwrap()
    }

    #[test]
    fn identical_pixels_have_zero_delta() {
        assert_eq!(yiq_delta(Rgb([10, 20, 30]), Rgb([10, 20, 30])), 0.0);
        let black_white = yiq_delta(Rgb([0, 0, 0]), Rgb([255, 255, 255]));
        assert!(black_white > 0.9 * MAX_YIQ_DELTA && black_white <= MAX_YIQ_DELTA);
    }

    #[test]
    fn threshold_filters_faint_changes() {
        let base = white(4, 4);
        let mut act = white(4, 4);
        act.put_pixel(0, 0, Rgb([250, 250, 250]));
        act.put_pixel(3, 3, Rgb([0, 0, 0]));

        let (count, highlight) = diff_images(&base, &act, 0.05);
        assert_eq!(count, 1);
        assert_eq!(*highlight.get_pixel(3, 3), DIFF_COLOR);
        assert_ne!(*highlight.get_pixel(0, 0), DIFF_COLOR);

        let (count, _) = diff_images(&base, &act, 0.0);
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn identical_pages_pass_without_diff_files() {
        let root = tempfile::tempdir().unwrap();
        let config = config_in(root.path());
        config.ensure_paths_exist().unwrap();
        let b = root.path().join("b-0.png");
        let a = root.path().join("a-0.png");
        save(&b, white(10, 10));
        save(&a, white(10, 10));

        let set = ImageSet {
            baseline_filename: "b.pdf".into(),
            actual_filename: "a.pdf".into(),
            pairs: vec![ImagePair { page_index: 0, crop_index: None, baseline: b, actual: a }],
        };
        let result = PixelComparator::new().compare_images(&set, &config).await.unwrap();
        assert!(result.is_passed());
        assert!(result.details.is_empty());
        assert_eq!(std::fs::read_dir(&config.paths.diff_png_root_folder).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn differing_page_fails_and_writes_highlight() {
        let root = tempfile::tempdir().unwrap();
        let config = config_in(root.path());
        let b = root.path().join("b-1.png");
        let a = root.path().join("a-1.png");
        save(&b, white(10, 10));
        let mut changed = white(10, 10);
        for x in 0..5 {
            changed.put_pixel(x, 2, Rgb([0, 0, 0]));
        }
        save(&a, changed);

        let set = ImageSet {
            baseline_filename: "b.pdf".into(),
            actual_filename: "a.pdf".into(),
            pairs: vec![ImagePair { page_index: 1, crop_index: None, baseline: b, actual: a }],
        };
        let result = PixelComparator::new().compare_images(&set, &config).await.unwrap();
        assert!(result.is_failed());
        assert_eq!(
            result.message.as_deref(),
            Some("a.pdf is not the same as b.pdf compared by their images.")
        );
        let page = &result.details[0];
        assert_eq!(page.status, ComparisonStatus::Failed);
        assert_eq!(page.diff_pixels, 5);
        let diff_png = page.diff_png.as_ref().unwrap();
        assert_eq!(diff_png, &config.paths.diff_png_root_folder.join("a-1_diff.png"));
        assert!(diff_png.exists());
    }

    #[tokio::test]
    async fn tolerance_allows_a_few_pixels() {
        let root = tempfile::tempdir().unwrap();
        let config = CompareConfig::builder()
            .root_folder(root.path())
            .tolerance(3)
            .build()
            .unwrap();
        let b = root.path().join("b-0.png");
        let a = root.path().join("a-0.png");
        save(&b, white(6, 6));
        let mut changed = white(6, 6);
        changed.put_pixel(1, 1, Rgb([0, 0, 0]));
        save(&a, changed);

        let set = ImageSet {
            baseline_filename: "b.pdf".into(),
            actual_filename: "a.pdf".into(),
            pairs: vec![ImagePair { page_index: 0, crop_index: None, baseline: b, actual: a }],
        };
        assert!(PixelComparator::new().compare_images(&set, &config).await.unwrap().is_passed());
    }

    #[tokio::test]
    async fn size_mismatch_fails_the_pair() {
        let root = tempfile::tempdir().unwrap();
        let config = config_in(root.path());
        let b = root.path().join("b-0-0.png");
        let a = root.path().join("a-0-0.png");
        save(&b, white(6, 6));
        save(&a, white(6, 7));

        let set = ImageSet {
            baseline_filename: "b.pdf".into(),
            actual_filename: "a.pdf".into(),
            pairs: vec![ImagePair { page_index: 0, crop_index: Some(0), baseline: b, actual: a }],
        };
        let result = PixelComparator::new().compare_images(&set, &config).await.unwrap();
        assert!(result.is_failed());
        assert_eq!(result.details[0].crop_index, Some(0));
        assert!(result.details[0].message.as_deref().unwrap().contains("6x6"));
    }

    #[tokio::test]
    async fn unreadable_image_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let config = config_in(root.path());
        let set = ImageSet {
            baseline_filename: "b.pdf".into(),
            actual_filename: "a.pdf".into(),
            pairs: vec![ImagePair {
                page_index: 0,
                crop_index: None,
                baseline: root.path().join("missing-0.png"),
                actual: root.path().join("missing-0.png"),
            }],
        };
        let err = PixelComparator::new().compare_images(&set, &config).await.unwrap_err();
        assert!(matches!(err, PdfDiffError::ImageFailed { .. }));
    }
}
