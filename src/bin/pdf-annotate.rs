//! CLI binary for pdf-annotate.
//!
//! A thin shim over the library crate: each recipe is a subcommand, flags
//! map to `AnnotationConfig`, and the task stream is written as JSON Lines
//! to stdout or `--output`.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use pdf_annotate::recipes::{Components, Recipe};
use pdf_annotate::{
    image_manual, layout_fetch, ocr_correct, spans_manual, write_jsonl, write_jsonl_file,
    AnnotationConfig, AnnotationConfigBuilder, LabelSet, LayoutModel, LayoutRole, PatternEntities,
    PdfiumBackend, ProgressCallback, SidecarLayout, StreamProgressCallback, TaskError,
    TesseractCli, TextLayerLayout, WriteSummary,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar over the files of a stream, with one log line per file.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(spinner_style);
        bar.set_prefix("Working");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl StreamProgressCallback for CliProgressCallback {
    fn on_stream_start(&self, total_files: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len}  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        self.bar.set_length(total_files as u64);
        self.bar.set_style(style);
    }

    fn on_file_start(&self, path: &Path, _index: usize, _total_files: usize) {
        self.bar.set_message(path.display().to_string());
    }

    fn on_file_complete(&self, path: &Path, tasks: usize) {
        self.bar.println(format!(
            "  {} {}  {}",
            green("✓"),
            path.display(),
            dim(&format!("{tasks} task(s)")),
        ));
        self.bar.inc(1);
    }

    fn on_task_error(&self, error: &TaskError) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = error.to_string();
        let msg = msg.lines().next().unwrap_or_default();
        self.bar.println(format!("  {} {}", red("✗"), red(msg)));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Draw boxes on page images
  pdf-annotate image-manual boxes pdfs/ --label TITLE,TEXT -o pages.jsonl

  # OCR the TEXT boxes at 4x zoom and fold hyphenated line breaks
  pdf-annotate ocr-correct transcripts boxes.jsonl --label TEXT --scale 4 --fold-dashes

  # Pre-compute layout tasks, then annotate spans from the file
  pdf-annotate layout-fetch fetched.jsonl pdfs/ --layout text-layer
  pdf-annotate spans-manual spans fetched.jsonl --label PERSON,ORG --disable footnote

  # Suggest ORG spans from a phrase list
  pdf-annotate spans-manual spans pdfs/ --label ORG --add-ents orgs.jsonl

  # Focus on one text block at a time
  pdf-annotate spans-manual spans pdfs/ --focus text --label PERSON

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH             Path to libpdfium (default: system library)
  PDF_ANNOTATE_LABELS         Default for --label
  PDF_ANNOTATE_SCALE          Default for --scale
  PDF_ANNOTATE_TESSERACT      Tesseract executable
  PDF_ANNOTATE_OUTPUT         Default for --output
  RUST_LOG                    Log filter, e.g. pdf_annotate=debug
"#;

/// Build annotation task streams from PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "pdf-annotate",
    version,
    about = "Build annotation task streams from PDF pages, OCR regions and layout spans",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF_ANNOTATE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDF_ANNOTATE_QUIET")]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "PDF_ANNOTATE_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Page images for drawing labelled boxes.
    ImageManual(ImageManualArgs),
    /// OCR transcripts of drawn boxes, for correction.
    OcrCorrect(OcrCorrectArgs),
    /// Layout-aware page text for span annotation.
    SpansManual(SpansManualArgs),
    /// Pre-compute layout tasks into a JSONL file.
    LayoutFetch(LayoutFetchArgs),
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Write tasks to this file instead of stdout.
    #[arg(short, long, env = "PDF_ANNOTATE_OUTPUT")]
    output: Option<PathBuf>,

    /// Also write the recipe's dataset, view and UI config as JSON.
    #[arg(long)]
    components: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ImageManualArgs {
    /// Dataset the annotations are saved to.
    dataset: String,

    /// Folder with PDFs to annotate.
    source: PathBuf,

    /// Comma-separated labels.
    #[arg(short, long, env = "PDF_ANNOTATE_LABELS")]
    label: String,

    /// Remove base64-encoded image data before storing answers.
    #[arg(short = 'R', long)]
    remove_base64: bool,

    /// File extensions to pick up.
    #[arg(long, value_delimiter = ',', default_value = "pdf")]
    ext: Vec<String>,

    #[command(flatten)]
    out: OutputArgs,
}

#[derive(Args, Debug)]
struct OcrCorrectArgs {
    /// Dataset the corrections are saved to.
    dataset: String,

    /// JSONL file with annotations from image-manual.
    source: PathBuf,

    /// Comma-separated labels of the regions to transcribe.
    #[arg(short, long, env = "PDF_ANNOTATE_LABELS")]
    label: String,

    /// Zoom scale. Increase above 3 to upscale the image for OCR.
    #[arg(short, long, env = "PDF_ANNOTATE_SCALE", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..))]
    scale: u32,

    /// Remove base64-encoded image data before storing answers.
    #[arg(short = 'R', long)]
    remove_base64: bool,

    /// Fold dashes at the end of a text line into the next word.
    #[arg(short, long)]
    fold_dashes: bool,

    /// Autofocus the transcript field.
    #[arg(long)]
    autofocus: bool,

    /// Tesseract executable.
    #[arg(long, env = "PDF_ANNOTATE_TESSERACT", default_value = "tesseract")]
    tesseract: String,

    /// Tesseract language(s), e.g. eng or deu+eng.
    #[arg(long)]
    lang: Option<String>,

    #[command(flatten)]
    out: OutputArgs,
}

#[derive(ValueEnum, Clone, Debug)]
enum LayoutArg {
    /// `<stem>.layout.json` files from an external analyser.
    Sidecar,
    /// Paragraphs from the PDF's embedded text layer.
    TextLayer,
}

#[derive(Args, Debug)]
struct LayoutArgs {
    /// Where document layout comes from.
    #[arg(long, value_enum, default_value = "sidecar")]
    layout: LayoutArg,

    /// Directory holding layout sidecars (default: next to each PDF).
    #[arg(long)]
    layout_dir: Option<PathBuf>,

    /// Focus mode: one task per span of these roles, e.g. text.
    #[arg(short, long, value_delimiter = ',')]
    focus: Vec<LayoutRole>,

    /// One task per page instead of per document.
    #[arg(short = 'S', long)]
    split_pages: bool,

    /// File extensions to pick up.
    #[arg(long, value_delimiter = ',', default_value = "pdf")]
    ext: Vec<String>,
}

#[derive(Args, Debug)]
struct SpansManualArgs {
    /// Dataset the annotations are saved to.
    dataset: String,

    /// Folder with PDFs, or a JSONL file from layout-fetch.
    source: String,

    /// Comma-separated labels.
    #[arg(short, long, env = "PDF_ANNOTATE_LABELS", default_value = "")]
    label: String,

    /// Layout roles whose tokens are disabled, e.g. footnote.
    #[arg(short, long, value_delimiter = ',')]
    disable: Vec<LayoutRole>,

    /// Pre-populate spans from a JSONL file of {"label", "pattern"} phrases.
    #[arg(short = 'E', long, value_name = "PATTERNS")]
    add_ents: Option<PathBuf>,

    /// Hide the side-by-side page preview.
    #[arg(long)]
    hide_preview: bool,

    #[command(flatten)]
    layout: LayoutArgs,

    #[command(flatten)]
    out: OutputArgs,
}

#[derive(Args, Debug)]
struct LayoutFetchArgs {
    /// Output JSONL file.
    output: String,

    /// Folder with PDFs.
    source: PathBuf,

    #[command(flatten)]
    layout: LayoutArgs,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO-level library logs are suppressed while the progress bar is
    // active, unless --verbose is set.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress = show_progress.then(CliProgressCallback::new);
    let progress_cb: Option<ProgressCallback> = progress
        .clone()
        .map(|cb| cb as Arc<dyn StreamProgressCallback>);

    let backend = PdfiumBackend::bind().context("PDF engine unavailable")?;

    let summary = match &cli.command {
        Command::ImageManual(args) => {
            let config = builder(progress_cb)
                .labels(parse_labels(&args.label))
                .remove_base64(args.remove_base64)
                .file_extensions(&args.ext)
                .build()
                .context("Invalid configuration")?;
            let recipe = image_manual(&args.dataset, &args.source, &backend, &config)
                .context("Cannot start image-manual")?;
            emit(recipe, &args.out)?
        }
        Command::OcrCorrect(args) => {
            let config = builder(progress_cb)
                .labels(parse_labels(&args.label))
                .scale(args.scale)
                .remove_base64(args.remove_base64)
                .fold_dashes(args.fold_dashes)
                .autofocus(args.autofocus)
                .build()
                .context("Invalid configuration")?;
            let mut engine = TesseractCli::new().binary(&args.tesseract);
            if let Some(lang) = &args.lang {
                engine = engine.language(lang);
            }
            if !engine.is_available() {
                anyhow::bail!(
                    "Cannot run '{}'. Install tesseract or pass --tesseract /path/to/tesseract.",
                    args.tesseract
                );
            }
            let recipe = ocr_correct(&args.dataset, &args.source, &backend, &engine, &config)
                .context("Cannot start ocr-correct")?;
            emit(recipe, &args.out)?
        }
        Command::SpansManual(args) => {
            let config = layout_builder(progress_cb, &args.layout)
                .labels(parse_labels(&args.label))
                .disable(args.disable.iter().cloned())
                .hide_preview(args.hide_preview)
                .build()
                .context("Invalid configuration")?;
            let layout = layout_model(&args.layout, &backend);
            let entities = args
                .add_ents
                .as_deref()
                .map(PatternEntities::from_file)
                .transpose()
                .context("Cannot load entity patterns")?;
            let mut recipe =
                spans_manual(&args.dataset, &args.source, &*layout, &backend, &config)
                    .context("Cannot start spans-manual")?;
            if let Some(model) = &entities {
                recipe = recipe.with_entities(model, &config.labels);
            }
            emit(recipe, &args.out)?
        }
        Command::LayoutFetch(args) => {
            let config = layout_builder(progress_cb, &args.layout)
                .build()
                .context("Invalid configuration")?;
            let layout = layout_model(&args.layout, &backend);
            layout_fetch(&args.output, &args.source, &*layout, &backend, &config)
                .context("layout-fetch failed")?
        }
    };

    if let Some(p) = &progress {
        p.finish();
    }
    if !cli.quiet {
        let failed = summary.errors.len();
        eprintln!(
            "{} {} task(s) written{}",
            if failed == 0 { green("✔") } else { red("⚠") },
            bold(&summary.written.to_string()),
            if failed == 0 {
                String::new()
            } else {
                format!("  ({} skipped)", red(&failed.to_string()))
            }
        );
    }
    Ok(())
}

fn builder(progress: Option<ProgressCallback>) -> AnnotationConfigBuilder {
    let mut builder = AnnotationConfig::builder();
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder
}

fn layout_builder(progress: Option<ProgressCallback>, args: &LayoutArgs) -> AnnotationConfigBuilder {
    builder(progress)
        .focus(args.focus.iter().cloned())
        .split_pages(args.split_pages)
        .file_extensions(&args.ext)
}

fn layout_model<'b>(args: &LayoutArgs, backend: &'b PdfiumBackend) -> Box<dyn LayoutModel + 'b> {
    match (&args.layout, &args.layout_dir) {
        (LayoutArg::TextLayer, _) => Box::new(TextLayerLayout::new(backend)),
        (LayoutArg::Sidecar, Some(dir)) => Box::new(SidecarLayout::in_dir(dir)),
        (LayoutArg::Sidecar, None) => Box::new(SidecarLayout::new()),
    }
}

fn parse_labels(s: &str) -> LabelSet {
    match s.parse() {
        Ok(labels) => labels,
        Err(never) => match never {},
    }
}

/// Write the recipe's components (if asked) and its task stream.
fn emit(recipe: Recipe<'_>, out: &OutputArgs) -> Result<WriteSummary> {
    if let Some(path) = &out.components {
        let components: Components<'_> = recipe.components();
        let json = serde_json::to_string_pretty(&components)
            .context("Failed to serialise recipe components")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write components to {}", path.display()))?;
    }

    match &out.output {
        Some(path) => write_jsonl_file(path, recipe.stream).context("Failed to write tasks"),
        None => write_jsonl(io::stdout().lock(), recipe.stream).context("Failed to write to stdout"),
    }
}
