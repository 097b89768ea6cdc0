//! End-to-end tests against the real pdfium library.
//!
//! Each test writes its own six-page fixture PDF with pdfium into a temp
//! directory, then runs the recipes over it. A test is skipped only when
//! pdfium cannot be bound (and, for OCR, when tesseract is not installed).
//!
//! Run with:
//!   PDFIUM_LIB_PATH=/path/to/libpdfium.so cargo test --test e2e -- --nocapture

use pdf_annotate::{
    image_manual, layout_fetch, ocr_correct, spans_manual, write_jsonl_file, AnnotationConfig,
    DocumentBackend, LabelSet, PdfiumBackend, Scale, TaskPayload, TesseractCli, TextLayerLayout,
};
use pdfium_render::prelude::*;
use serde_json::json;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

const FIXTURE_PAGES: usize = 6;
const LETTER: (f32, f32) = (612.0, 792.0);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Write `report.pdf`: US-letter pages, each with a large title near the top
/// and a `Page N` line in the body.
fn write_fixture(backend: &PdfiumBackend, dir: &Path) -> PathBuf {
    let mut document = backend
        .pdfium()
        .create_new_pdf()
        .expect("pdfium should create a document");
    let font = document.fonts_mut().helvetica();

    for n in 1..=FIXTURE_PAGES {
        let mut page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::new_custom(
                PdfPoints::new(LETTER.0),
                PdfPoints::new(LETTER.1),
            ))
            .expect("page should be added");
        page.objects_mut()
            .create_text_object(
                PdfPoints::new(72.0),
                PdfPoints::new(700.0),
                "QUARTERLY REPORT",
                font,
                PdfPoints::new(36.0),
            )
            .expect("title should be placed");
        page.objects_mut()
            .create_text_object(
                PdfPoints::new(72.0),
                PdfPoints::new(600.0),
                format!("Page {n}"),
                font,
                PdfPoints::new(12.0),
            )
            .expect("body should be placed");
    }

    let path = dir.join("report.pdf");
    document
        .save_to_file(&path)
        .expect("fixture should be saved");
    path
}

/// Bind pdfium and write the fixture, or skip this test when pdfium is not
/// available.
macro_rules! e2e_skip_unless_pdfium {
    () => {{
        init_tracing();
        match PdfiumBackend::bind() {
            Ok(backend) => {
                let dir = TempDir::new().unwrap();
                write_fixture(&backend, dir.path());
                (dir, backend)
            }
            Err(e) => {
                println!("SKIP — {e}");
                return;
            }
        }
    }};
}

// ── image.manual ─────────────────────────────────────────────────────────────

#[test]
fn test_image_manual_one_task_per_page() {
    let (dir, backend) = e2e_skip_unless_pdfium!();
    let config = AnnotationConfig::default();

    let tasks: Vec<_> = image_manual("e2e", dir.path(), &backend, &config)
        .expect("recipe should start")
        .stream
        .map(|t| t.expect("every page should render"))
        .collect();

    assert_eq!(tasks.len(), FIXTURE_PAGES);
    for (index, task) in tasks.iter().enumerate() {
        let TaskPayload::PageImage(page) = &task.payload else {
            panic!("expected page_image, got {}", task.mode());
        };
        assert!(page.image.as_deref().unwrap().starts_with("data:image/jpeg"));
        assert_eq!((page.width, page.height), (612, 792));
        assert_eq!(task.meta.page, Some(index));
        assert!(task.meta.path.as_deref().unwrap().ends_with("report.pdf"));
    }
}

#[test]
fn test_page_image_matches_scale_one_size() {
    let (dir, backend) = e2e_skip_unless_pdfium!();
    let config = AnnotationConfig::default();

    let mut recipe = image_manual("e2e", dir.path(), &backend, &config).unwrap();
    let task = recipe.stream.next().unwrap().unwrap();
    let TaskPayload::PageImage(page) = &task.payload else {
        panic!("expected page_image");
    };
    let source = backend
        .open(task.meta.path.as_deref().unwrap().as_ref())
        .unwrap();
    assert_eq!(source.page_count(), FIXTURE_PAGES);
    let size = source.page_size(0).unwrap();
    assert_eq!((page.width, page.height), size.pixels(Scale::ONE));

    let large = source.render(0, Scale::OCR_DEFAULT).unwrap();
    assert_eq!(
        (large.width(), large.height()),
        size.pixels(Scale::OCR_DEFAULT)
    );
}

// ── ocr.correct ──────────────────────────────────────────────────────────────

#[test]
fn test_ocr_correct_top_of_first_page() {
    let (dir, backend) = e2e_skip_unless_pdfium!();
    let ocr = TesseractCli::new();
    if !ocr.is_available() {
        println!("SKIP — tesseract not installed");
        return;
    }

    // Annotate the top band of the first page, as image.manual would.
    // One pixel short of the edge so rounding at scale 3 stays inside.
    let config = AnnotationConfig::default();
    let first = image_manual("e2e", dir.path(), &backend, &config)
        .unwrap()
        .stream
        .flatten()
        .find(|t| t.meta.page == Some(0))
        .expect("first page should render");
    let TaskPayload::PageImage(page) = &first.payload else {
        panic!("expected page_image");
    };

    let source = dir.path().join("boxes.jsonl");
    let mut file = std::fs::File::create(&source).unwrap();
    let record = json!({
        "meta": first.meta,
        "spans": [{"id": 1, "label": "TEXT", "x": 0, "y": 0,
                   "width": page.width - 1, "height": page.height / 4}],
        "answer": "accept"
    });
    writeln!(file, "{record}").unwrap();
    drop(file);

    let config = AnnotationConfig::builder()
        .labels("TEXT".parse::<LabelSet>().unwrap())
        .fold_dashes(true)
        .build()
        .unwrap();
    let tasks: Vec<_> = ocr_correct("e2e", &source, &backend, &ocr, &config)
        .unwrap()
        .stream
        .map(|t| t.expect("region should OCR"))
        .collect();

    assert_eq!(tasks.len(), 1);
    let TaskPayload::RegionCorrection(region) = &tasks[0].payload else {
        panic!("expected region_correction");
    };
    assert_eq!(region.text, region.transcription);
    assert!(!region.text.ends_with('\n'));
    assert!(
        region.text.to_uppercase().contains("REPORT"),
        "unexpected OCR text {:?}",
        region.text
    );
}

// ── layout ───────────────────────────────────────────────────────────────────

#[test]
fn test_text_layer_spans_and_fetch_round_trip() {
    let (dir, backend) = e2e_skip_unless_pdfium!();
    let layout = TextLayerLayout::new(&backend);
    let config = AnnotationConfig::builder().split_pages(true).build().unwrap();
    let source = dir.path().to_string_lossy().into_owned();

    let live: Vec<_> = spans_manual("e2e", &source, &layout, &backend, &config)
        .unwrap()
        .stream
        .map(|t| t.expect("text layer should lay out"))
        .collect();
    assert_eq!(live.len(), FIXTURE_PAGES);

    for (index, task) in live.iter().enumerate() {
        let TaskPayload::Page(page) = &task.payload else {
            panic!("expected page, got {}", task.mode());
        };
        assert_eq!(task.meta.page, Some(index + 1));
        assert!(page.text.contains(&format!("Page {}", index + 1)), "{:?}", page.text);
        for token in &page.tokens {
            let slice: String = page
                .text
                .chars()
                .skip(token.start)
                .take(token.end - token.start)
                .collect();
            assert_eq!(slice, token.text);
        }
    }

    let out = TempDir::new().unwrap();
    let output = out.path().join("layout.jsonl");
    let summary = layout_fetch(&output.to_string_lossy(), dir.path(), &layout, &backend, &config)
        .expect("fetch should write");
    assert_eq!(summary.written, FIXTURE_PAGES);

    let reloaded = spans_manual("e2e", &output.to_string_lossy(), &layout, &backend, &config)
        .unwrap()
        .stream;
    let copy = out.path().join("copy.jsonl");
    let again = write_jsonl_file(&copy, reloaded).unwrap();
    assert_eq!(again.written, summary.written);
    assert!(again.errors.is_empty());
}
