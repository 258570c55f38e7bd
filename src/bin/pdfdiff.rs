//! CLI binary for edgequake-pdfdiff.
//!
//! A thin shim over the library crate that maps CLI flags to a
//! `CompareConfig` plus a `ComparisonSession` and prints the verdict.
//!
//! Exit status: 0 passed, 1 failed, 2 error.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdfdiff::{
    CompareConfig, ComparisonMode, ComparisonResult, ComparisonSession, CropSpec, GeometryOrder,
    ImageEngineKind, MaskSpec,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Compare two files page by page
  pdfdiff baseline.pdf actual.pdf

  # Names resolve against the configured PDF folders
  pdfdiff --config pdfdiff.json invoice invoice

  # Hide a timestamp on the first page, compare only pages 0 and 2
  pdfdiff --mask 0:20,700,300,730:white --only 0,2 a.pdf b.pdf

  # Compare two regions of page 1 instead of the whole page
  pdfdiff --crop 1:400,200,0,0 --crop 1:400,200,0,600 a.pdf b.pdf

  # Byte-level comparison, JSON verdict
  pdfdiff --mode base64 --json a.pdf b.pdf

MASKS AND CROPS:
  --mask PAGE:X0,Y0,X1,Y1[:COLOR]   rectangle corners in rendered pixels,
                                    COLOR is a name or #rrggbb (default black)
  --crop PAGE:WIDTH,HEIGHT,X,Y      region compared instead of the full page

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH   pdfium shared library (file or folder) for --engine native
  RUST_LOG          overrides the log filter
"#;

/// Compare two PDF documents visually.
#[derive(Parser, Debug)]
#[command(
    name = "pdfdiff",
    version,
    about = "Visual regression comparison of PDF documents",
    long_about = "Rasterise a baseline and an actual PDF, mask volatile regions, crop the \
regions that matter and compare the pages pixel by pixel (or compare the raw bytes).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Baseline PDF: a path, or a name under paths.baselinePdfRootFolder.
    baseline: PathBuf,

    /// Actual PDF: a path, or a name under paths.actualPdfRootFolder.
    actual: PathBuf,

    /// Comparison mode.
    #[arg(short, long, env = "PDFDIFF_MODE", value_enum, default_value = "image")]
    mode: ModeArg,

    /// JSON configuration file (paths + settings).
    #[arg(short, long, env = "PDFDIFF_CONFIG")]
    config: Option<PathBuf>,

    /// Put all five folders below this directory.
    #[arg(long, env = "PDFDIFF_ROOT")]
    root: Option<PathBuf>,

    /// Rasterisation engine.
    #[arg(long, env = "PDFDIFF_ENGINE", value_enum)]
    engine: Option<EngineArg>,

    /// ImageMagick program to run (default: convert, or magick on Windows).
    #[arg(long, env = "PDFDIFF_MAGICK")]
    magick: Option<String>,

    /// Rendering density in DPI (36–600).
    #[arg(long, env = "PDFDIFF_DENSITY", value_parser = clap::value_parser!(u32).range(36..=600))]
    density: Option<u32>,

    /// Rendering quality (1–100).
    #[arg(long, env = "PDFDIFF_QUALITY", value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: Option<u8>,

    /// Differing pixels allowed per page.
    #[arg(long, env = "PDFDIFF_TOLERANCE")]
    tolerance: Option<u64>,

    /// Per-pixel colour sensitivity (0.0–1.0, lower is stricter).
    #[arg(long, env = "PDFDIFF_THRESHOLD")]
    threshold: Option<f32>,

    /// Apply crops before masks instead of after.
    #[arg(long)]
    crops_first: bool,

    /// Compare pages even when the page counts differ.
    #[arg(long)]
    allow_page_count_mismatch: bool,

    /// Delete rendered pages after comparing.
    #[arg(long, env = "PDFDIFF_CLEAN")]
    clean: bool,

    /// Compare only these 0-based page indexes.
    #[arg(long, value_delimiter = ',')]
    only: Vec<usize>,

    /// Skip these 0-based page indexes.
    #[arg(long, value_delimiter = ',')]
    skip: Vec<usize>,

    /// Mask PAGE:X0,Y0,X1,Y1[:COLOR]; repeatable.
    #[arg(long = "mask", value_name = "SPEC")]
    masks: Vec<MaskSpec>,

    /// Crop PAGE:WIDTH,HEIGHT,X,Y; repeatable.
    #[arg(long = "crop", value_name = "SPEC")]
    crops: Vec<CropSpec>,

    /// Print the result as JSON.
    #[arg(long, env = "PDFDIFF_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFDIFF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the exit status.
    #[arg(short, long, env = "PDFDIFF_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Image,
    Base64,
}

impl From<ModeArg> for ComparisonMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Image => ComparisonMode::ByImage,
            ModeArg::Base64 => ComparisonMode::ByBase64,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum EngineArg {
    Magick,
    Native,
}

impl From<EngineArg> for ImageEngineKind {
    fn from(v: EngineArg) -> Self {
        match v {
            EngineArg::Magick => ImageEngineKind::GraphicsMagick,
            EngineArg::Native => ImageEngineKind::Native,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO logs would tear the spinner; keep them for non-interactive runs.
    let show_progress = !cli.quiet && !cli.json && !cli.verbose;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    match run(&cli, show_progress).await {
        Ok(result) if result.is_passed() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(e) => {
            eprintln!("{} {:#}", red("error:"), e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: &Cli, show_progress: bool) -> Result<ComparisonResult> {
    let config = build_config(cli)?;
    let mode = ComparisonMode::from(cli.mode);

    let mut session = ComparisonSession::new(config)
        .set_baseline_from_file(&cli.baseline)
        .set_actual_from_file(&cli.actual)
        .add_masks(cli.masks.iter().cloned())
        .add_crop_pages(cli.crops.iter().cloned())
        .only_page_indexes(cli.only.iter().copied())
        .skip_page_indexes(cli.skip.iter().copied());

    let spinner = show_progress.then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Comparing");
        bar.set_message(format!("{} ({})", cli.actual.display(), mode));
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    });

    let started = Instant::now();
    let outcome = session.compare(mode).await;
    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }
    let result = outcome.context("Comparison failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialise result")?
        );
    } else if !cli.quiet {
        print_summary(&result, started.elapsed());
    }
    Ok(result)
}

/// Map CLI args onto the loaded (or default) configuration.
fn build_config(cli: &Cli) -> Result<CompareConfig> {
    let base = match cli.config {
        Some(ref path) => CompareConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path))?,
        None => CompareConfig::default(),
    };

    let mut builder = base.into_builder();
    if let Some(ref root) = cli.root {
        builder = builder.root_folder(root);
    }
    if let Some(engine) = cli.engine {
        builder = builder.image_engine(engine.into());
    }
    if let Some(ref program) = cli.magick {
        builder = builder.magick_command(program.clone());
    }
    if let Some(density) = cli.density {
        builder = builder.density(density);
    }
    if let Some(quality) = cli.quality {
        builder = builder.quality(quality);
    }
    if let Some(tolerance) = cli.tolerance {
        builder = builder.tolerance(tolerance);
    }
    if let Some(threshold) = cli.threshold {
        builder = builder.threshold(threshold);
    }
    if cli.crops_first {
        builder = builder.geometry_order(GeometryOrder::CropsThenMasks);
    }
    if cli.allow_page_count_mismatch {
        builder = builder.match_page_count(false);
    }
    if cli.clean {
        builder = builder.clean_png_paths(true);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(result: &ComparisonResult, elapsed: Duration) {
    let took = dim(&format!("{:.1}s", elapsed.as_secs_f64()));
    if result.is_passed() {
        eprintln!("{} {}  {}", green("✔"), bold("passed"), took);
        return;
    }

    eprintln!("{} {}  {}", red("✘"), bold(&result.status.to_string()), took);
    if let Some(ref message) = result.message {
        eprintln!("  {}", message);
    }
    for page in &result.details {
        let target = match page.crop_index {
            Some(crop) => format!("page {} crop {}", page.page_index, crop),
            None => format!("page {}", page.page_index),
        };
        let diff = page
            .diff_png
            .as_ref()
            .map(|p| format!("  →  {}", p.display()))
            .unwrap_or_default();
        eprintln!(
            "  {} {:<16} {}{}",
            red("✗"),
            target,
            page.message.as_deref().unwrap_or(""),
            dim(&diff)
        );
    }
}
