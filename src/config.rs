//! Configuration types for PDF visual comparison.
//!
//! All folder locations and rendering knobs live in [`CompareConfig`]. It is
//! the "opaque configuration object" handed to every pipeline stage: the
//! session passes it along unchanged, and only the stage that owns a setting
//! reads it (the engines read `density`/`quality`, the pixel comparator reads
//! `tolerance`/`threshold`, the dispatcher reads the folder layout).
//!
//! The JSON shape mirrors the keys test suites already use:
//!
//! ```json
//! {
//!   "paths": {
//!     "baselinePdfRootFolder": "data/baselinePdfs",
//!     "actualPdfRootFolder": "data/actualPdfs",
//!     "baselinePngRootFolder": "data/baselinePngs",
//!     "actualPngRootFolder": "data/actualPngs",
//!     "diffPngRootFolder": "data/diffPngs"
//!   },
//!   "settings": { "imageEngine": "graphicsMagick", "density": 100, "quality": 70 }
//! }
//! ```
//!
//! Missing keys fall back to [`CompareConfig::default()`].

use crate::error::PdfDiffError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const MIN_DENSITY: u32 = 36;
const MAX_DENSITY: u32 = 600;

/// Configuration for a PDF comparison.
///
/// Built via [`CompareConfig::builder()`], loaded with
/// [`CompareConfig::from_file`], or taken from [`CompareConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdfdiff::{CompareConfig, ImageEngineKind};
///
/// let config = CompareConfig::builder()
///     .root_folder("target/pdfdiff")
///     .image_engine(ImageEngineKind::Native)
///     .density(150)
///     .build()
///     .unwrap();
/// assert_eq!(config.settings.density, 150);
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompareConfig {
    /// Where documents are looked up and where rasters are written.
    pub paths: PathsConfig,
    /// Rendering and comparison settings.
    pub settings: Settings,
}

/// Folder layout shared by the session, the engines and the diff step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PathsConfig {
    /// Fallback folder for baseline documents given by bare name.
    pub baseline_pdf_root_folder: PathBuf,
    /// Fallback folder for actual documents given by bare name.
    pub actual_pdf_root_folder: PathBuf,
    /// Rendered baseline pages land here.
    pub baseline_png_root_folder: PathBuf,
    /// Rendered actual pages land here.
    pub actual_png_root_folder: PathBuf,
    /// Diff images written by the pixel comparator.
    pub diff_png_root_folder: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self::under(Path::new("data"))
    }
}

impl PathsConfig {
    /// Conventional layout with every folder below `root`.
    pub fn under(root: &Path) -> Self {
        Self {
            baseline_pdf_root_folder: root.join("baselinePdfs"),
            actual_pdf_root_folder: root.join("actualPdfs"),
            baseline_png_root_folder: root.join("baselinePngs"),
            actual_png_root_folder: root.join("actualPngs"),
            diff_png_root_folder: root.join("diffPngs"),
        }
    }

    /// Every configured folder, in a stable order.
    pub fn folders(&self) -> [&Path; 5] {
        [
            &self.baseline_pdf_root_folder,
            &self.actual_pdf_root_folder,
            &self.baseline_png_root_folder,
            &self.actual_png_root_folder,
            &self.diff_png_root_folder,
        ]
    }
}

/// Rendering and comparison settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Which [`crate::engine::RenderEngine`] the session is built with. Default: GraphicsMagick.
    pub image_engine: ImageEngineKind,

    /// Rasterisation density in DPI. Default: 100.
    ///
    /// 100 DPI keeps a letter page around 850 × 1100 px, enough to catch a
    /// one-pixel layout shift without making every test suite slow.
    pub density: u32,

    /// Output quality passed to the rasteriser (1–100). Default: 70.
    ///
    /// For PNG output ImageMagick reads the tens digit as the zlib level; the
    /// native engine maps it onto fast / default / best compression.
    pub quality: u8,

    /// Number of differing pixels tolerated per compared image. Default: 0.
    pub tolerance: u64,

    /// Per-pixel colour sensitivity, 0.0 (exact) to 1.0 (anything goes). Default: 0.05.
    pub threshold: f32,

    /// Delete the rendered pages of a comparison once the verdict is known. Default: false.
    pub clean_png_paths: bool,

    /// Fail immediately when the documents have different page counts. Default: true.
    pub match_page_count: bool,

    /// Whether masks or crops are applied first on a page carrying both. Default: masks first.
    pub geometry_order: GeometryOrder,

    /// Program used by the ImageMagick engine. Default: `magick` on Windows, `convert` elsewhere.
    pub magick_command: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            image_engine: ImageEngineKind::default(),
            density: 100,
            quality: 70,
            tolerance: 0,
            threshold: 0.05,
            clean_png_paths: false,
            match_page_count: true,
            geometry_order: GeometryOrder::default(),
            magick_command: None,
        }
    }
}

impl CompareConfig {
    /// Create a new builder for `CompareConfig`.
    pub fn builder() -> CompareConfigBuilder {
        CompareConfigBuilder {
            config: Self::default(),
        }
    }

    /// Continue building from an existing configuration (e.g. one loaded
    /// from a file, before command-line overrides).
    pub fn into_builder(self) -> CompareConfigBuilder {
        CompareConfigBuilder { config: self }
    }

    /// Load a JSON configuration file and validate it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PdfDiffError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| PdfDiffError::ConfigLoad {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| PdfDiffError::ConfigLoad {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), PdfDiffError> {
        let s = &self.settings;
        if !(MIN_DENSITY..=MAX_DENSITY).contains(&s.density) {
            return Err(PdfDiffError::InvalidConfig(format!(
                "density must be {MIN_DENSITY}–{MAX_DENSITY}, got {}",
                s.density
            )));
        }
        if !(1..=100).contains(&s.quality) {
            return Err(PdfDiffError::InvalidConfig(format!(
                "quality must be 1–100, got {}",
                s.quality
            )));
        }
        if !s.threshold.is_finite() || !(0.0..=1.0).contains(&s.threshold) {
            return Err(PdfDiffError::InvalidConfig(format!(
                "threshold must be 0.0–1.0, got {}",
                s.threshold
            )));
        }
        if self.paths.folders().iter().any(|p| p.as_os_str().is_empty()) {
            return Err(PdfDiffError::InvalidConfig(
                "every paths.* folder must be set".into(),
            ));
        }
        Ok(())
    }

    /// Create every configured folder that does not exist yet.
    pub fn ensure_paths_exist(&self) -> Result<(), PdfDiffError> {
        for dir in self.paths.folders() {
            std::fs::create_dir_all(dir).map_err(|e| PdfDiffError::io(dir, e))?;
        }
        Ok(())
    }
}

/// Builder for [`CompareConfig`].
#[derive(Debug)]
pub struct CompareConfigBuilder {
    config: CompareConfig,
}

impl CompareConfigBuilder {
    /// Place all five folders below `root` using the conventional names.
    pub fn root_folder(mut self, root: impl AsRef<Path>) -> Self {
        self.config.paths = PathsConfig::under(root.as_ref());
        self
    }

    pub fn baseline_pdf_root_folder(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.paths.baseline_pdf_root_folder = dir.into();
        self
    }

    pub fn actual_pdf_root_folder(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.paths.actual_pdf_root_folder = dir.into();
        self
    }

    pub fn baseline_png_root_folder(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.paths.baseline_png_root_folder = dir.into();
        self
    }

    pub fn actual_png_root_folder(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.paths.actual_png_root_folder = dir.into();
        self
    }

    pub fn diff_png_root_folder(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.paths.diff_png_root_folder = dir.into();
        self
    }

    pub fn image_engine(mut self, engine: ImageEngineKind) -> Self {
        self.config.settings.image_engine = engine;
        self
    }

    pub fn density(mut self, dpi: u32) -> Self {
        self.config.settings.density = dpi.clamp(MIN_DENSITY, MAX_DENSITY);
        self
    }

    pub fn quality(mut self, quality: u8) -> Self {
        self.config.settings.quality = quality.clamp(1, 100);
        self
    }

    pub fn tolerance(mut self, pixels: u64) -> Self {
        self.config.settings.tolerance = pixels;
        self
    }

    pub fn threshold(mut self, t: f32) -> Self {
        self.config.settings.threshold = t;
        self
    }

    pub fn clean_png_paths(mut self, v: bool) -> Self {
        self.config.settings.clean_png_paths = v;
        self
    }

    pub fn match_page_count(mut self, v: bool) -> Self {
        self.config.settings.match_page_count = v;
        self
    }

    pub fn geometry_order(mut self, order: GeometryOrder) -> Self {
        self.config.settings.geometry_order = order;
        self
    }

    pub fn magick_command(mut self, program: impl Into<String>) -> Self {
        self.config.settings.magick_command = Some(program.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<CompareConfig, PdfDiffError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Rasterisation backend selected at session construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageEngineKind {
    /// External ImageMagick / GraphicsMagick process (`convert` / `magick`). (default)
    #[default]
    GraphicsMagick,
    /// In-process pdfium rasteriser with `image`-crate raster edits.
    Native,
}

/// Order in which masks and crops touch a page that has both.
///
/// With [`GeometryOrder::MasksThenCrops`] crops inherit the redactions; with
/// [`GeometryOrder::CropsThenMasks`] crops are cut from the unmasked render
/// and only the full page is redacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GeometryOrder {
    /// Paint masks, then cut crops. (default)
    #[default]
    MasksThenCrops,
    /// Cut crops, then paint masks.
    CropsThenMasks,
}
