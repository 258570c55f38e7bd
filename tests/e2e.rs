//! End-to-end tests against the real rasterisers.
//!
//! The native engine needs a pdfium library (`PDFIUM_LIB_PATH`, the working
//! directory or the system path); the ImageMagick engine needs `convert`
//! (or `magick`) with a Ghostscript delegate. Both are gated behind the
//! `E2E_ENABLED` environment variable so they do not run in CI unless
//! explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture
//!
//! To restrict to one engine:
//!   E2E_ENABLED=1 cargo test --test e2e native -- --nocapture

use edgequake_pdfdiff::engine::magick::MagickEngine;
use edgequake_pdfdiff::{
    CompareConfig, ComparisonMode, ComparisonSession, CropRect, ImageEngineKind, MaskColor,
    MaskRect, RenderEngine,
};
use image::{DynamicImage, Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip this test unless E2E_ENABLED is set.
macro_rules! e2e_skip_unless_enabled {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
    }};
}

/// A 200×200 pt PDF with one filled black rectangle (x, y, w, h) per page.
fn pdf_with_rects(rects: &[(u32, u32, u32, u32)]) -> Vec<u8> {
    let mut objects = vec!["<< /Type /Catalog /Pages 2 0 R >>".to_string()];
    let kids: Vec<String> = (0..rects.len()).map(|i| format!("{} 0 R", 3 + 2 * i)).collect();
    objects.push(format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        rects.len()
    ));
    for (i, (x, y, w, h)) in rects.iter().enumerate() {
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 200 200] /Contents {} 0 R >>",
            4 + 2 * i
        ));
        let content = format!("0 0 0 rg {x} {y} {w} {h} re f");
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            content.len(),
            content
        ));
    }

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, obj) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, obj).as_bytes());
    }
    let xref = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref
        )
        .as_bytes(),
    );
    out
}

fn config(root: &Path, engine: ImageEngineKind) -> CompareConfig {
    CompareConfig::builder()
        .root_folder(root)
        .image_engine(engine)
        .density(72)
        .build()
        .expect("valid config")
}

async fn compare_buffers(
    engine: ImageEngineKind,
    baseline: Vec<u8>,
    actual: Vec<u8>,
    setup: impl FnOnce(ComparisonSession) -> ComparisonSession,
) -> edgequake_pdfdiff::ComparisonResult {
    let root = tempfile::tempdir().unwrap();
    let session = ComparisonSession::new(config(root.path(), engine))
        .set_baseline_from_buffer(baseline, "baseline.pdf")
        .set_actual_from_buffer(actual, "actual.pdf");
    let mut session = setup(session);
    let result = session
        .compare(ComparisonMode::ByImage)
        .await
        .expect("comparison should run");

    let pages: Vec<_> = std::fs::read_dir(root.path().join("actualPngs"))
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    println!("[{engine:?}] {}, actual pages: {:?}", result.status, pages);
    result
}

// ── Native engine ────────────────────────────────────────────────────────────

#[tokio::test]
async fn native_identical_documents_pass() {
    e2e_skip_unless_enabled!();
    let pdf = pdf_with_rects(&[(20, 20, 100, 50), (50, 50, 20, 20)]);
    let result = compare_buffers(ImageEngineKind::Native, pdf.clone(), pdf, |s| s).await;
    assert!(result.is_passed(), "{result:?}");
}

#[tokio::test]
async fn native_moved_rectangle_fails_on_that_page_only() {
    e2e_skip_unless_enabled!();
    let baseline = pdf_with_rects(&[(20, 20, 100, 50), (50, 50, 20, 20)]);
    let actual = pdf_with_rects(&[(20, 20, 100, 50), (60, 50, 20, 20)]);
    let result = compare_buffers(ImageEngineKind::Native, baseline, actual, |s| s).await;

    assert!(result.is_failed(), "{result:?}");
    assert_eq!(result.details.len(), 1);
    assert_eq!(result.details[0].page_index, 1);
}

#[tokio::test]
async fn native_full_page_mask_hides_changes() {
    e2e_skip_unless_enabled!();
    let baseline = pdf_with_rects(&[(20, 20, 100, 50)]);
    let actual = pdf_with_rects(&[(90, 120, 60, 60)]);
    let result = compare_buffers(ImageEngineKind::Native, baseline, actual, |s| {
        s.add_mask(0, MaskRect::new(0, 0, 10_000, 10_000), "black")
    })
    .await;
    assert!(result.is_passed(), "{result:?}");
}

#[tokio::test]
async fn native_crop_of_unchanged_region_passes() {
    e2e_skip_unless_enabled!();
    // At 72 dpi one point is one pixel; the top 40 rows are blank in both.
    let baseline = pdf_with_rects(&[(20, 20, 100, 50)]);
    let actual = pdf_with_rects(&[(20, 30, 100, 50)]);
    let result = compare_buffers(ImageEngineKind::Native, baseline, actual, |s| {
        s.add_crop_page(0, CropRect::new(200, 40, 0, 0))
    })
    .await;
    assert!(result.is_passed(), "{result:?}");
}

// ── ImageMagick engine ───────────────────────────────────────────────────────

#[tokio::test]
async fn magick_identical_documents_pass() {
    e2e_skip_unless_enabled!();
    let pdf = pdf_with_rects(&[(20, 20, 100, 50), (50, 50, 20, 20)]);
    let result = compare_buffers(ImageEngineKind::GraphicsMagick, pdf.clone(), pdf, |s| s).await;
    assert!(result.is_passed(), "{result:?}");
}

#[tokio::test]
async fn magick_moved_rectangle_fails() {
    e2e_skip_unless_enabled!();
    let baseline = pdf_with_rects(&[(20, 20, 100, 50)]);
    let actual = pdf_with_rects(&[(40, 20, 100, 50)]);
    let result = compare_buffers(ImageEngineKind::GraphicsMagick, baseline, actual, |s| s).await;
    assert!(result.is_failed(), "{result:?}");
}

/// A 40x30 page, left half opaque, right half transparent.
fn write_page(dir: &Path) -> PathBuf {
    let path = dir.join("doc-0.png");
    let img = RgbaImage::from_fn(40, 30, |x, _| {
        if x < 20 {
            Rgba([10, 20, 30, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    });
    DynamicImage::ImageRgba8(img).save(&path).unwrap();
    path
}

fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

#[tokio::test]
async fn magick_post_process_twice_is_byte_identical() {
    e2e_skip_unless_enabled!();
    let dir = tempfile::tempdir().unwrap();
    let page = write_page(dir.path());
    let engine = MagickEngine::default();
    let config = CompareConfig::default();

    engine.post_process_png(&page, &config).await.unwrap();
    let first = std::fs::read(&page).unwrap();
    // Land the second write in a later second so any timestamp would change.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    engine.post_process_png(&page, &config).await.unwrap();

    assert_eq!(first, std::fs::read(&page).unwrap());
    let flat = image::open(&page).unwrap().to_rgba8();
    assert_eq!(flat.get_pixel(30, 5), &Rgba([255, 255, 255, 255]));
}

#[tokio::test]
async fn magick_crop_keeps_the_page_and_writes_indexed_file() {
    e2e_skip_unless_enabled!();
    let dir = tempfile::tempdir().unwrap();
    let page = write_page(dir.path());
    let before = std::fs::read(&page).unwrap();

    let out = MagickEngine::default()
        .apply_crop(&page, &CropRect::new(12, 8, 4, 2), 3)
        .await
        .unwrap();

    assert_eq!(out, dir.path().join("doc-0-3.png"));
    assert_eq!(before, std::fs::read(&page).unwrap());
    assert_eq!(image::image_dimensions(&out).unwrap(), (12, 8));
}

#[tokio::test]
async fn magick_mask_rewrites_in_place_without_new_files() {
    e2e_skip_unless_enabled!();
    let dir = tempfile::tempdir().unwrap();
    let page = write_page(dir.path());
    let before = std::fs::read(&page).unwrap();

    MagickEngine::default()
        .apply_mask(&page, &MaskRect::new(0, 0, 10, 10), &MaskColor::from("red"))
        .await
        .unwrap();

    assert_ne!(before, std::fs::read(&page).unwrap());
    assert_eq!(file_count(dir.path()), 1);
    let masked = image::open(&page).unwrap().to_rgba8();
    assert_eq!(masked.get_pixel(5, 5), &Rgba([255, 0, 0, 255]));
    assert_eq!(masked.get_pixel(15, 15), &Rgba([10, 20, 30, 255]));
}

// ── byBase64 on files ────────────────────────────────────────────────────────

#[tokio::test]
async fn base64_compares_files_from_root_folders() {
    e2e_skip_unless_enabled!();
    let root = tempfile::tempdir().unwrap();
    let config = config(root.path(), ImageEngineKind::Native);
    config.ensure_paths_exist().unwrap();
    let pdf = pdf_with_rects(&[(20, 20, 100, 50)]);
    std::fs::write(config.paths.baseline_pdf_root_folder.join("doc.pdf"), &pdf).unwrap();
    std::fs::write(config.paths.actual_pdf_root_folder.join("doc.pdf"), &pdf).unwrap();

    let mut session = ComparisonSession::new(config)
        .set_baseline_from_file("doc")
        .set_actual_from_file("doc.pdf");
    let result = session.compare(ComparisonMode::ByBase64).await.unwrap();
    assert!(result.is_passed(), "{result:?}");
}
