//! ImageMagick / GraphicsMagick engine: every operation is one external
//! `convert` (or `magick` on Windows) invocation.
//!
//! ## Why two passes when rasterising?
//!
//! Asking the rasteriser to set density/quality *and* flatten transparency in
//! the same command produces artefacts with some Ghostscript delegates. So
//! `pdf_to_png` first renders every page in one call, then runs the flatten
//! step ([`RenderEngine::post_process_png`]) on each produced page.
//!
//! The PDF buffer is written into a [`TempDir`] for the rasteriser to read;
//! the directory is removed when the guard drops, on success and failure alike.
//!
//! Every PNG write excludes the date tEXt and `tIME` chunks ImageMagick
//! stamps by default, so rewriting unchanged pixels yields identical bytes.

use super::raster;
use super::{discover_pages, output_parts, remove_stale_pages, PdfDetails, RenderEngine, RenderedPageSet};
use crate::config::CompareConfig;
use crate::error::PdfDiffError;
use crate::geometry::{derived_crop_path, CropRect, MaskColor, MaskRect};
use futures::future::{BoxFuture, FutureExt};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Platform default: ImageMagick 7 ships `magick` on Windows, where
/// `convert` collides with the system disk tool.
pub fn default_program() -> &'static str {
    if cfg!(windows) {
        "magick"
    } else {
        "convert"
    }
}

/// [`RenderEngine`] that shells out to ImageMagick.
#[derive(Debug, Clone)]
pub struct MagickEngine {
    program: String,
}

impl Default for MagickEngine {
    fn default() -> Self {
        Self::new(None)
    }
}

impl MagickEngine {
    /// Use `program`, or the platform default when `None`.
    pub fn new(program: Option<String>) -> Self {
        Self {
            program: program.unwrap_or_else(|| default_program().to_string()),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run the program once; a non-zero exit becomes
    /// [`PdfDiffError::EngineCommandFailed`] carrying stderr.
    async fn run(&self, args: Vec<OsString>) -> Result<(), PdfDiffError> {
        debug!("{} {:?}", self.program, args);
        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .map_err(|e| PdfDiffError::EngineSpawnFailed {
                program: self.program.clone(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(PdfDiffError::EngineCommandFailed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if !output.stderr.is_empty() {
            warn!("{}: {}", self.program, String::from_utf8_lossy(&output.stderr).trim());
        }
        Ok(())
    }
}

// ── Argument builders ───────────────────────────────────────────────────────

/// Write setting that keeps timestamps out of the PNG.
const PNG_EXCLUDE_TIMESTAMPS: &str = "png:exclude-chunks=date,time";

/// `-define png:exclude-chunks=date,time <target>`: the tail of every PNG write.
fn png_output(target: &Path) -> [OsString; 3] {
    ["-define".into(), PNG_EXCLUDE_TIMESTAMPS.into(), target.into()]
}

/// Output template with a page placeholder: `dir/x.png` → `dir/x-%d.png`.
pub(crate) fn output_template(output: &Path) -> PathBuf {
    if output.to_string_lossy().contains("%d") {
        return output.to_path_buf();
    }
    let (dir, stem) = output_parts(output);
    dir.join(format!("{stem}-%d.png"))
}

/// Density must precede the input so the PDF delegate rasterises at it.
pub(crate) fn render_args(input: &Path, template: &Path, density: u32, quality: u8) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-density".into(),
        format!("{density}x{density}").into(),
        input.into(),
        "-quality".into(),
        quality.to_string().into(),
    ];
    args.extend(png_output(template));
    args
}

pub(crate) fn flatten_args(png: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        png.into(),
        "-background".into(),
        "white".into(),
        "-alpha".into(),
        "remove".into(),
        "-flatten".into(),
    ];
    args.extend(png_output(png));
    args
}

/// ImageMagick rectangles are inclusive; masks are half-open, hence `- 1`.
/// Callers filter degenerate rectangles first.
pub(crate) fn mask_args(png: &Path, rect: &MaskRect, color: &MaskColor) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        png.into(),
        "-fill".into(),
        color.as_str().into(),
        "-stroke".into(),
        "none".into(),
        "-draw".into(),
        format!(
            "rectangle {},{} {},{}",
            rect.x0,
            rect.y0,
            rect.x1 - 1,
            rect.y1 - 1
        )
        .into(),
    ];
    args.extend(png_output(png));
    args
}

pub(crate) fn crop_args(png: &Path, rect: &CropRect, target: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        png.into(),
        "-crop".into(),
        format!("{}x{}+{}+{}", rect.width, rect.height, rect.x, rect.y).into(),
        "+repage".into(),
    ];
    args.extend(png_output(target));
    args
}

/// Transient copy of the PDF handed to the rasteriser.
async fn temp_input(pdf: &PdfDetails) -> Result<(TempDir, PathBuf), PdfDiffError> {
    let dir = tempfile::Builder::new()
        .prefix("pdfdiff-")
        .tempdir()
        .map_err(|e| PdfDiffError::io(std::env::temp_dir(), e))?;
    let name = Path::new(&pdf.filename)
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "document.pdf".into());
    let path = dir.path().join(name);
    tokio::fs::write(&path, &pdf.buffer)
        .await
        .map_err(|e| PdfDiffError::io(&path, e))?;
    Ok((dir, path))
}

impl RenderEngine for MagickEngine {
    fn name(&self) -> &'static str {
        "graphicsMagick"
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

            // `_guard` deletes the transient PDF on every return path below.
            let (_guard, input) = temp_input(pdf).await?;
            let template = output_template(output);
            self.run(render_args(
                &input,
                &template,
                config.settings.density,
                config.settings.quality,
            ))
            .await?;

            let pages = discover_pages(&dir, &stem).await?;
            if pages.is_empty() {
                return Err(PdfDiffError::NoPagesRendered {
                    filename: pdf.filename.clone(),
                    dir,
                });
            }

            for (_, page) in pages.iter() {
                self.post_process_png(page, config).await?;
            }

            info!("Rendered {} pages of {} with {}", pages.len(), pdf.filename, self.program);
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
            if rect.is_degenerate() {
                debug!("Skipping zero-area mask {:?} on {}", rect, png.display());
                return Ok(());
            }
            self.run(mask_args(png, rect, color)).await
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
            // ImageMagick turns an empty selection into a 1x1 image, or the
            // whole page for 0x0.
            let dims = image::image_dimensions(png).map_err(|e| PdfDiffError::image(png, e))?;
            raster::check_crop(rect, dims, png)?;
            let target = derived_crop_path(png, index);
            self.run(crop_args(png, rect, &target)).await?;
            Ok(target)
        }
        .boxed()
    }

    fn post_process_png<'a>(
        &'a self,
        png: &'a Path,
        _config: &'a CompareConfig,
    ) -> BoxFuture<'a, Result<(), PdfDiffError>> {
        async move { self.run(flatten_args(png)).await }.boxed()
    }
}
