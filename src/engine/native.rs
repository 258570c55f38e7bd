//! Native engine: pdfium rasterisation plus `image`-crate raster edits.
//!
//! ## Why spawn_blocking?
//!
//! pdfium keeps thread-local state and PNG encoding is CPU-heavy, so every
//! operation runs on tokio's blocking pool instead of stalling a worker.
//!
//! The PDF is loaded straight from the in-memory buffer; pdfium needs no
//! transient file, so there is nothing to clean up on failure.

use super::raster::{self, compression_for_quality};
use super::{output_parts, page_file_name, remove_stale_pages, PdfDetails, RenderEngine, RenderedPageSet};
use crate::config::CompareConfig;
use crate::error::PdfDiffError;
use crate::geometry::{derived_crop_path, CropRect, MaskColor, MaskRect};
use futures::future::{BoxFuture, FutureExt};
use image::codecs::png::CompressionType;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// PDF user space unit: 1 point = 1/72 inch.
const POINTS_PER_INCH: f32 = 72.0;

/// pdfium-backed [`RenderEngine`].
#[derive(Debug, Clone)]
pub struct NativeEngine {
    /// Compression used for masks and crops, which receive no config.
    /// Set from `settings.quality` so edited files match rendered pages.
    edit_compression: CompressionType,
}

impl Default for NativeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeEngine {
    pub fn new() -> Self {
        Self {
            edit_compression: CompressionType::Default,
        }
    }

    /// Encode masked and cropped pages at the level used for `quality`.
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.edit_compression = compression_for_quality(quality);
        self
    }
}

/// Bind pdfium: `PDFIUM_LIB_PATH` (library file or folder), then the working
/// directory, then the system library search path.
fn bind_pdfium() -> Result<Pdfium, PdfDiffError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => {
            let lib = if Path::new(&path).is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                PathBuf::from(&path)
            };
            Pdfium::bind_to_library(&lib)
        }
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| PdfDiffError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// Blocking implementation of [`NativeEngine::pdf_to_png`].
fn render_blocking(
    pdf: &PdfDetails,
    dir: &Path,
    stem: &str,
    density: u32,
    compression: CompressionType,
) -> Result<RenderedPageSet, PdfDiffError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(&pdf.buffer, None)
        .map_err(|e| PdfDiffError::RasterisationFailed {
            filename: pdf.filename.clone(),
            detail: format!("{:?}", e),
        })?;

    let render_config =
        PdfRenderConfig::new().scale_page_by_factor(density as f32 / POINTS_PER_INCH);

    let mut pages = Vec::new();
    for (index, page) in document.pages().iter().enumerate() {
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            PdfDiffError::RasterisationFailed {
                filename: pdf.filename.clone(),
                detail: format!("page {index}: {:?}", e),
            }
        })?;

        // Flatten before the first write; the page never exists with alpha.
        let image = DynamicImage::ImageRgb8(raster::flatten_onto_white(&bitmap.as_image()));
        let path = dir.join(page_file_name(stem, index));
        raster::write_png(&path, &image, compression)?;
        debug!(
            "Rendered page {} → {}x{} px at {}",
            index,
            image.width(),
            image.height(),
            path.display()
        );
        pages.push((index, path));
    }

    Ok(RenderedPageSet::new(pages))
}

async fn blocking<T, F>(what: &'static str, f: F) -> Result<T, PdfDiffError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PdfDiffError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PdfDiffError::Internal(format!("{what} task panicked: {}", e)))?
}

impl RenderEngine for NativeEngine {
    fn name(&self) -> &'static str {
        "native"
    }

    fn pdf_to_png<'a>(
        &'a self,
        pdf: &'a PdfDetails,
        output: &'a Path,
        config: &'a CompareConfig,
    ) -> BoxFuture<'a, Result<RenderedPageSet, PdfDiffError>> {
        async move {
            let (dir, stem) = output_parts(output);
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| PdfDiffError::io(&dir, e))?;
            remove_stale_pages(&dir, &stem).await?;

            let density = config.settings.density;
            let compression = compression_for_quality(config.settings.quality);
            let pdf_owned = pdf.clone();
            let dir_owned = dir.clone();
            let pages = blocking("Render", move || {
                render_blocking(&pdf_owned, &dir_owned, &stem, density, compression)
            })
            .await?;

            if pages.is_empty() {
                return Err(PdfDiffError::NoPagesRendered {
                    filename: pdf.filename.clone(),
                    dir,
                });
            }
            info!("Rendered {} pages of {} with pdfium", pages.len(), pdf.filename);
            Ok(pages)
        }
        .boxed()
    }

    fn apply_mask<'a>(
        &'a self,
        png: &'a Path,
        rect: &'a MaskRect,
        color: &'a MaskColor,
    ) -> BoxFuture<'a, Result<(), PdfDiffError>> {
        async move {
            let rgba = color.to_rgba()?;
            let path = png.to_path_buf();
            let rect = *rect;
            let compression = self.edit_compression;
            blocking("Mask", move || {
                let img = raster::load(&path)?;
                let masked = raster::paint_rect(&img, &rect, rgba);
                raster::write_png(&path, &masked, compression)
            })
            .await
        }
        .boxed()
    }

    fn apply_crop<'a>(
        &'a self,
        png: &'a Path,
        rect: &'a CropRect,
        index: usize,
    ) -> BoxFuture<'a, Result<PathBuf, PdfDiffError>> {
        async move {
            let path = png.to_path_buf();
            let rect = *rect;
            let compression = self.edit_compression;
            blocking("Crop", move || {
                let img = raster::load(&path)?;
                let cropped = raster::crop(&img, &rect, &path)?;
                let target = derived_crop_path(&path, index);
                raster::write_png(&target, &cropped, compression)?;
                Ok(target)
            })
            .await
        }
        .boxed()
    }

    fn post_process_png<'a>(
        &'a self,
        png: &'a Path,
        config: &'a CompareConfig,
    ) -> BoxFuture<'a, Result<(), PdfDiffError>> {
        async move {
            let path = png.to_path_buf();
            let compression = compression_for_quality(config.settings.quality);
            blocking("Flatten", move || {
                let img = raster::load(&path)?;
                let flat = DynamicImage::ImageRgb8(raster::flatten_onto_white(&img));
                raster::write_png(&path, &flat, compression)
            })
            .await
        }
        .boxed()
    }
}
