//! [`ComparisonSession`]: the fluent entry point.
//!
//! A session collects two documents, masks, crops and page filters, then runs
//! one comparison:
//!
//! ```rust,no_run
//! use edgequake_pdfdiff::{ComparisonMode, ComparisonSession, CompareConfig, MaskRect};
//!
//! # async fn run() -> Result<(), edgequake_pdfdiff::PdfDiffError> {
//! let config = CompareConfig::builder().root_folder("data").build()?;
//! let mut session = ComparisonSession::new(config)
//!     .set_baseline_from_file("baseline/invoice.pdf")
//!     .set_actual_from_file("actual/invoice.pdf")
//!     .add_mask(0, MaskRect::new(10, 10, 200, 40), "black")
//!     .skip_page_indexes([3]);
//! let result = session.compare(ComparisonMode::ByImage).await?;
//! println!("{}", result.status);
//! # Ok(())
//! # }
//! ```
//!
//! ## Two kinds of failure
//!
//! *Configuration* problems (a source that does not resolve, an empty buffer,
//! folders that cannot be created) put the session into
//! [`SessionState::Failed`]. That state is sticky: later mutators are
//! ignored and [`ComparisonSession::compare`] returns the stored failed
//! result without rendering anything. A failed verdict is sticky for
//! `compare` too: running it again returns the same result.
//!
//! *Execution* problems (the rasteriser fails, a file cannot be written, a
//! diff collaborator errors) are returned as `Err(PdfDiffError)` from
//! `compare` / `post_process_pngs`.

use crate::config::CompareConfig;
use crate::diff::{Base64Comparator, DataComparator, ImageComparator, PixelComparator};
use crate::engine::{self, RenderEngine};
use crate::error::PdfDiffError;
use crate::geometry::{CropRect, CropSpec, MaskColor, MaskRect, MaskSpec};
use crate::output::ComparisonResult;
use crate::pipeline::dispatch::{self, ComparisonMode, ComparisonRequest};
use crate::pipeline::input::{PdfSource, Role, SourceError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use crate::pipeline::dispatch::CompareOptions;

/// Extension of the files touched by [`ComparisonSession::post_process_pngs`].
const PNG_EXTENSION: &str = "png";

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// At least one document is still missing.
    Pending,
    /// Both documents are set.
    Configured,
    /// A configuration error occurred; the reason is kept verbatim.
    Failed(String),
}

/// Mutable builder and orchestrator for one comparison.
pub struct ComparisonSession {
    config: CompareConfig,
    engine: Arc<dyn RenderEngine>,
    image_comparator: Arc<dyn ImageComparator>,
    data_comparator: Arc<dyn DataComparator>,
    baseline: Option<PdfSource>,
    actual: Option<PdfSource>,
    options: CompareOptions,
    state: SessionState,
    result: ComparisonResult,
}

impl std::fmt::Debug for ComparisonSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComparisonSession")
            .field("engine", &self.engine.name())
            .field("baseline", &self.baseline)
            .field("actual", &self.actual)
            .field("options", &self.options)
            .field("state", &self.state)
            .field("result", &self.result)
            .finish()
    }
}

impl Default for ComparisonSession {
    fn default() -> Self {
        Self::new(CompareConfig::default())
    }
}

impl ComparisonSession {
    /// Session using the engine selected by `settings.imageEngine`.
    ///
    /// Every configured folder is created; failing to do so fails the session.
    pub fn new(config: CompareConfig) -> Self {
        let engine = engine::from_config(&config);
        Self::with_engine(config, engine)
    }

    /// Session with an explicit render engine.
    pub fn with_engine(config: CompareConfig, engine: Arc<dyn RenderEngine>) -> Self {
        let mut session = Self {
            config,
            engine,
            image_comparator: Arc::new(PixelComparator::new()),
            data_comparator: Arc::new(Base64Comparator),
            baseline: None,
            actual: None,
            options: CompareOptions::default(),
            state: SessionState::Pending,
            result: ComparisonResult::not_executed(),
        };

        if let Err(e) = session
            .config
            .validate()
            .and_then(|_| session.config.ensure_paths_exist())
        {
            session.fail(e.to_string());
        }
        session
    }

    /// Replace the `byImage` diff collaborator.
    pub fn with_image_comparator(mut self, comparator: Arc<dyn ImageComparator>) -> Self {
        self.image_comparator = comparator;
        self
    }

    /// Replace the `byBase64` diff collaborator.
    pub fn with_data_comparator(mut self, comparator: Arc<dyn DataComparator>) -> Self {
        self.data_comparator = comparator;
        self
    }

    // ── Accessors ──────────────────────────────────────────────────────────

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Last terminal result (`not executed` until something happens).
    pub fn result(&self) -> &ComparisonResult {
        &self.result
    }

    pub fn options(&self) -> &CompareOptions {
        &self.options
    }

    pub fn config(&self) -> &CompareConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn RenderEngine> {
        &self.engine
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, SessionState::Failed(_))
    }

    fn fail(&mut self, reason: String) {
        if self.is_failed() {
            return;
        }
        warn!("Comparison session failed: {}", reason);
        self.result = ComparisonResult::failed(reason.clone());
        self.state = SessionState::Failed(reason);
    }

    fn refresh_state(&mut self) {
        if !self.is_failed() {
            self.state = if self.baseline.is_some() && self.actual.is_some() {
                SessionState::Configured
            } else {
                SessionState::Pending
            };
        }
    }

    fn accept(&mut self, role: Role, source: Result<PdfSource, SourceError>) {
        match source {
            Ok(src) => {
                debug!("{role} source: {}", src.filename());
                match role {
                    Role::Baseline => self.baseline = Some(src),
                    Role::Actual => self.actual = Some(src),
                }
                self.refresh_state();
            }
            Err(e) => self.fail(e.to_string()),
        }
    }

    // ── Sources ────────────────────────────────────────────────────────────

    /// Use a file as the baseline; falls back to
    /// `<baselinePdfRootFolder>/<stem>.pdf` when `path` does not exist.
    pub fn set_baseline_from_file(mut self, path: impl AsRef<Path>) -> Self {
        if !self.is_failed() {
            let root = self.config.paths.baseline_pdf_root_folder.clone();
            let source = PdfSource::from_file(Role::Baseline, path.as_ref(), &root);
            self.accept(Role::Baseline, source);
        }
        self
    }

    /// Use an in-memory document as the baseline.
    pub fn set_baseline_from_buffer(mut self, buffer: impl Into<Vec<u8>>, filename: &str) -> Self {
        if !self.is_failed() {
            let source = PdfSource::from_buffer(Role::Baseline, buffer.into(), filename);
            self.accept(Role::Baseline, source);
        }
        self
    }

    /// Use a file as the actual document; falls back to
    /// `<actualPdfRootFolder>/<stem>.pdf` when `path` does not exist.
    pub fn set_actual_from_file(mut self, path: impl AsRef<Path>) -> Self {
        if !self.is_failed() {
            let root = self.config.paths.actual_pdf_root_folder.clone();
            let source = PdfSource::from_file(Role::Actual, path.as_ref(), &root);
            self.accept(Role::Actual, source);
        }
        self
    }

    /// Use an in-memory document as the actual document.
    pub fn set_actual_from_buffer(mut self, buffer: impl Into<Vec<u8>>, filename: &str) -> Self {
        if !self.is_failed() {
            let source = PdfSource::from_buffer(Role::Actual, buffer.into(), filename);
            self.accept(Role::Actual, source);
        }
        self
    }

    // ── Options ────────────────────────────────────────────────────────────

    /// Paint `rect` with `color` on page `page_index` of both documents.
    /// Rectangles are not validated; an empty one paints nothing.
    pub fn add_mask(mut self, page_index: usize, rect: MaskRect, color: impl Into<MaskColor>) -> Self {
        if !self.is_failed() {
            self.options.masks.push(MaskSpec::new(page_index, rect, color));
        }
        self
    }

    pub fn add_masks(mut self, masks: impl IntoIterator<Item = MaskSpec>) -> Self {
        if !self.is_failed() {
            self.options.masks.extend(masks);
        }
        self
    }

    /// Compare `rect` of page `page_index` instead of the full page.
    pub fn add_crop_page(mut self, page_index: usize, rect: CropRect) -> Self {
        if !self.is_failed() {
            self.options.crops.push(CropSpec::new(page_index, rect));
        }
        self
    }

    pub fn add_crop_pages(mut self, crops: impl IntoIterator<Item = CropSpec>) -> Self {
        if !self.is_failed() {
            self.options.crops.extend(crops);
        }
        self
    }

    pub fn only_page_indexes(mut self, pages: impl IntoIterator<Item = usize>) -> Self {
        if !self.is_failed() {
            self.options.pages.only(pages);
        }
        self
    }

    pub fn skip_page_indexes(mut self, pages: impl IntoIterator<Item = usize>) -> Self {
        if !self.is_failed() {
            self.options.pages.skip(pages);
        }
        self
    }

    // ── Execution ──────────────────────────────────────────────────────────

    /// Run the comparison and store its result.
    ///
    /// Once the stored result is `failed` (a configuration error or an
    /// earlier failed verdict) it is returned unchanged without doing any
    /// work. For [`ComparisonMode::ByImage`] every PNG in both output folders
    /// is flattened afterwards (see [`post_process_pngs`](Self::post_process_pngs)).
    pub async fn compare(&mut self, mode: ComparisonMode) -> Result<ComparisonResult, PdfDiffError> {
        if self.is_failed() || self.result.is_failed() {
            debug!("Result already failed; skipping comparison");
            return Ok(self.result.clone());
        }

        let (Some(baseline), Some(actual)) = (self.baseline.clone(), self.actual.clone()) else {
            let role = if self.baseline.is_none() {
                Role::Baseline
            } else {
                Role::Actual
            };
            self.fail(SourceError::PathNotSet { role }.to_string());
            return Ok(self.result.clone());
        };

        let request = ComparisonRequest {
            baseline: baseline.load().await?,
            actual: actual.load().await?,
            config: &self.config,
            options: &self.options,
        };

        let result = match mode {
            ComparisonMode::ByBase64 => {
                dispatch::compare_by_base64(&request, self.data_comparator.as_ref()).await?
            }
            ComparisonMode::ByImage => {
                dispatch::compare_by_image(
                    &request,
                    self.engine.as_ref(),
                    self.image_comparator.as_ref(),
                )
                .await?
            }
        };
        self.result = result;

        if mode == ComparisonMode::ByImage {
            self.post_process_pngs().await?;
        }
        Ok(self.result.clone())
    }

    /// Synchronous wrapper around [`compare`](Self::compare).
    ///
    /// Creates a temporary tokio runtime internally; do not call it from
    /// inside an async context.
    pub fn compare_blocking(&mut self, mode: ComparisonMode) -> Result<ComparisonResult, PdfDiffError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| PdfDiffError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.compare(mode))
    }

    /// Flatten every `*.png` in the actual, then the baseline, PNG folder
    /// onto white, one at a time. The first failure aborts the pass.
    ///
    /// Returns the number of files processed.
    pub async fn post_process_pngs(&self) -> Result<usize, PdfDiffError> {
        let mut processed = 0;
        for dir in [
            &self.config.paths.actual_png_root_folder,
            &self.config.paths.baseline_png_root_folder,
        ] {
            for png in list_pngs(dir).await? {
                self.engine.post_process_png(&png, &self.config).await?;
                processed += 1;
            }
        }
        info!("Post-processed {} PNG files", processed);
        Ok(processed)
    }
}

/// `*.png` files directly inside `dir`, sorted by name.
async fn list_pngs(dir: &Path) -> Result<Vec<PathBuf>, PdfDiffError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| PdfDiffError::io(dir, e))?;
    let mut pngs = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| PdfDiffError::io(dir, e))?
    {
        let path = entry.path();
        let is_png = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(PNG_EXTENSION));
        if is_png && path.is_file() {
            pngs.push(path);
        }
    }
    pngs.sort();
    Ok(pngs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ComparisonStatus;

    fn config_in(root: &Path) -> CompareConfig {
        CompareConfig::builder().root_folder(root).build().unwrap()
    }

    #[test]
    fn new_session_creates_folders_and_is_pending() {
        let root = tempfile::tempdir().unwrap();
        let session = ComparisonSession::new(config_in(root.path()));
        assert_eq!(session.state(), &SessionState::Pending);
        assert_eq!(session.result().status, ComparisonStatus::NotExecuted);
        for dir in session.config().paths.folders() {
            assert!(dir.is_dir(), "{} missing", dir.display());
        }
    }

    #[test]
    fn both_buffers_configure_the_session() {
        let root = tempfile::tempdir().unwrap();
        let session = ComparisonSession::new(config_in(root.path()))
            .set_baseline_from_buffer(b"%PDF-1.4".to_vec(), "b.pdf")
            .set_actual_from_buffer(b"%PDF-1.4".to_vec(), "a.pdf");
        assert_eq!(session.state(), &SessionState::Configured);
    }

    #[test]
    fn first_configuration_error_is_kept() {
        let root = tempfile::tempdir().unwrap();
        let session = ComparisonSession::new(config_in(root.path()))
            .set_baseline_from_file("nope.pdf")
            .set_actual_from_buffer(Vec::new(), "a.pdf")
            .add_mask(0, MaskRect::new(0, 0, 1, 1), "black");

        let SessionState::Failed(reason) = session.state() else {
            panic!("expected failed state, got {:?}", session.state());
        };
        assert!(reason.starts_with("Baseline pdf file path does not exist"));
        assert_eq!(session.result().message.as_deref(), Some(reason.as_str()));
        assert!(session.options().masks.is_empty());
    }

    #[test]
    fn options_accumulate_in_order() {
        let root = tempfile::tempdir().unwrap();
        let session = ComparisonSession::new(config_in(root.path()))
            .add_mask(1, MaskRect::new(0, 0, 5, 5), "red")
            .add_masks([
                MaskSpec::new(0, MaskRect::new(1, 1, 2, 2), "black"),
                MaskSpec::new(1, MaskRect::new(0, 0, 5, 5), "red"),
            ])
            .add_crop_page(2, CropRect::new(10, 10, 0, 0))
            .add_crop_pages([CropSpec::new(2, CropRect::new(5, 5, 1, 1))])
            .only_page_indexes([1, 2])
            .only_page_indexes([2, 0])
            .skip_page_indexes([0]);

        let opts = session.options();
        assert_eq!(opts.masks.len(), 3);
        assert_eq!(opts.masks[0].page_index, 1);
        assert_eq!(opts.masks[1].page_index, 0);
        assert_eq!(opts.crops.len(), 2);
        assert_eq!(opts.pages.only.len(), 3);
        assert_eq!(opts.pages.to_indices(&[0, 1, 2, 3]), vec![1, 2]);
    }

    #[tokio::test]
    async fn compare_without_documents_fails_softly() {
        let root = tempfile::tempdir().unwrap();
        let mut session = ComparisonSession::new(config_in(root.path()));
        let result = session.compare(ComparisonMode::ByBase64).await.unwrap();
        assert!(result.is_failed());
        assert!(session.is_failed());
    }

    #[tokio::test]
    async fn base64_mode_compares_buffers() {
        let root = tempfile::tempdir().unwrap();
        let mut session = ComparisonSession::new(config_in(root.path()))
            .set_baseline_from_buffer(b"%PDF-1.4 x".to_vec(), "b.pdf")
            .set_actual_from_buffer(b"%PDF-1.4 x".to_vec(), "a.pdf");
        let result = session.compare(ComparisonMode::ByBase64).await.unwrap();
        assert!(result.is_passed());
        assert_eq!(session.result(), &result);
    }

    #[test]
    fn compare_blocking_runs_outside_a_runtime() {
        let root = tempfile::tempdir().unwrap();
        let mut session = ComparisonSession::new(config_in(root.path()))
            .set_baseline_from_buffer(b"%PDF-1.4 x".to_vec(), "b.pdf")
            .set_actual_from_buffer(b"%PDF-1.4 y".to_vec(), "a.pdf");
        let result = session.compare_blocking(ComparisonMode::ByBase64).unwrap();
        assert!(result.is_failed());
    }

    #[tokio::test]
    async fn list_pngs_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b-1.png", "a-0.png", "notes.txt", "c-0.PNG"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();
        let names: Vec<String> = list_pngs(dir.path())
            .await
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a-0.png", "b-1.png", "c-0.PNG"]);
    }
}
