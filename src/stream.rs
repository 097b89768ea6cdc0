//! Lazy task streams.
//!
//! Every stream is a plain [`Iterator`] of `Result<Task, TaskError>`: the
//! consumer pulls, the stream does just enough work to produce the next
//! item. An `Err` item reports one failed file, page, record or region and
//! the stream carries on with the next one.
//!
//! Documents are opened through the [`DocumentBackend`] and owned by the
//! stream only while their tasks are being produced. Dropping a stream
//! part-way drops the open document with it.

use crate::config::{AnnotationConfig, LabelSet, Scale};
use crate::error::TaskError;
use crate::pipeline::encode::encode_data_uri;
use crate::pipeline::input::{JsonlSource, Record};
use crate::pipeline::layout::{LayoutModel, LayoutPage, LayoutRole};
use crate::pipeline::ocr::OcrEngine;
use crate::pipeline::postprocess::{clean_ocr_text, fold_ocr_dashes};
use crate::pipeline::region::{crop, Region};
use crate::pipeline::render::{DocumentBackend, PageSource};
use crate::pipeline::tokens::{build_page_text, PageText, TokenHints};
use crate::progress::ProgressCallback;
use crate::task::{
    Block, BlocksConfig, CorrectedRegion, FocusedSpan, ImageSpan, PageContent, PageImage, Task,
    TaskMeta, TaskPayload, TextSpan, ViewId,
};
use crate::theme::{
    FOCUS_HIGHLIGHT_COLOR, TRANSCRIPT_FIELD_ID, TRANSCRIPT_FIELD_LABEL, TRANSCRIPT_FIELD_ROWS,
};
use image::DynamicImage;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A boxed stream of tasks.
pub type TaskStream<'a> = Box<dyn Iterator<Item = Result<Task, TaskError>> + 'a>;

// ── Progress plumbing ────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct Progress(Option<ProgressCallback>);

impl Progress {
    fn stream_start(&self, total: usize) {
        if let Some(cb) = &self.0 {
            cb.on_stream_start(total);
        }
    }

    fn file_start(&self, path: &Path, index: usize, total: usize) {
        if let Some(cb) = &self.0 {
            cb.on_file_start(path, index, total);
        }
    }

    fn file_complete(&self, path: &Path, tasks: usize) {
        if let Some(cb) = &self.0 {
            cb.on_file_complete(path, tasks);
        }
    }

    fn error(&self, err: TaskError) -> TaskError {
        warn!("{}", err);
        if let Some(cb) = &self.0 {
            cb.on_task_error(&err);
        }
        err
    }
}

/// Ordered file list with a cursor.
struct FileQueue {
    paths: Vec<PathBuf>,
    next: usize,
    started: bool,
    progress: Progress,
}

impl FileQueue {
    fn new(paths: Vec<PathBuf>, progress: Progress) -> Self {
        Self {
            paths,
            next: 0,
            started: false,
            progress,
        }
    }

    fn pop(&mut self) -> Option<PathBuf> {
        if !self.started {
            self.started = true;
            self.progress.stream_start(self.paths.len());
        }
        let path = self.paths.get(self.next)?.clone();
        self.progress.file_start(&path, self.next, self.paths.len());
        info!("[{}/{}] {}", self.next + 1, self.paths.len(), path.display());
        self.next += 1;
        Some(path)
    }
}

// ── Page images (image.manual) ───────────────────────────────────────────

struct OpenDocument<'a> {
    source: Box<dyn PageSource + 'a>,
    next_page: usize,
    tasks: usize,
}

/// One `page_image` task per page of every document, pages in order.
///
/// Pages are rendered at scale 1, the coordinate space regions are drawn
/// in.
pub struct PageImageStream<'a> {
    backend: &'a dyn DocumentBackend,
    files: FileQueue,
    current: Option<OpenDocument<'a>>,
}

impl<'a> PageImageStream<'a> {
    pub fn new(
        backend: &'a dyn DocumentBackend,
        paths: Vec<PathBuf>,
        progress: Option<ProgressCallback>,
    ) -> Self {
        Self {
            backend,
            files: FileQueue::new(paths, Progress(progress)),
            current: None,
        }
    }

    fn close_current(&mut self) {
        if let Some(doc) = self.current.take() {
            let path = doc.source.path().to_path_buf();
            let tasks = doc.tasks;
            drop(doc);
            self.files.progress.file_complete(&path, tasks);
        }
    }
}

impl Iterator for PageImageStream<'_> {
    type Item = Result<Task, TaskError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(doc) = self.current.as_mut() {
                if doc.next_page < doc.source.page_count() {
                    let page = doc.next_page;
                    doc.next_page += 1;
                    return Some(match page_image_task(doc.source.as_ref(), page) {
                        Ok(task) => {
                            doc.tasks += 1;
                            Ok(task)
                        }
                        Err(e) => Err(self.files.progress.error(e)),
                    });
                }
                self.close_current();
                continue;
            }

            let path = self.files.pop()?;
            match self.backend.open(&path) {
                Ok(source) => {
                    self.current = Some(OpenDocument {
                        source,
                        next_page: 0,
                        tasks: 0,
                    })
                }
                Err(e) => {
                    self.files.progress.file_complete(&path, 0);
                    return Some(Err(self.files.progress.error(e)));
                }
            }
        }
    }
}

fn page_image_task(source: &dyn PageSource, page: usize) -> Result<Task, TaskError> {
    let image = source.render(page, Scale::ONE)?;
    let uri = encode_image(source.path(), page, &image)?;
    debug!("Page {} of {} → {}x{}", page, source.path().display(), image.width(), image.height());
    Ok(Task::new(
        TaskPayload::PageImage(PageImage {
            image: Some(uri),
            width: image.width(),
            height: image.height(),
        }),
        TaskMeta::page(source.path(), page),
    ))
}

fn encode_image(path: &Path, page: usize, image: &DynamicImage) -> Result<String, TaskError> {
    encode_data_uri(image).map_err(|e| TaskError::EncodeFailed {
        path: path.to_path_buf(),
        page,
        detail: e.to_string(),
    })
}

// ── Layout (spans.manual, layout.fetch) ──────────────────────────────────

/// Presentation options for [`LayoutStream`].
#[derive(Debug, Clone)]
pub struct LayoutOptions {
    /// The text view each task's first block shows.
    pub view_id: ViewId,
    pub split_pages: bool,
    pub hide_preview: bool,
    pub focus: Vec<LayoutRole>,
    pub disable: Vec<LayoutRole>,
    pub separator: String,
}

impl LayoutOptions {
    pub fn from_config(config: &AnnotationConfig, view_id: ViewId) -> Self {
        Self {
            view_id,
            split_pages: config.split_pages,
            hide_preview: config.hide_preview,
            focus: config.focus.clone(),
            disable: config.disable.clone(),
            separator: config.separator.clone(),
        }
    }

    fn hints(&self) -> TokenHints<'_> {
        TokenHints {
            separator: &self.separator,
            disable: &self.disable,
        }
    }
}

/// Layout tasks for every document: whole documents, single pages, or
/// (in focus mode) single spans of the focused roles.
///
/// A document's tasks are built together, after its layout is analysed and
/// its previews rendered; the document is closed before the first of them
/// is yielded.
pub struct LayoutStream<'a> {
    layout: &'a dyn LayoutModel,
    backend: &'a dyn DocumentBackend,
    options: LayoutOptions,
    files: FileQueue,
    pending: VecDeque<Task>,
}

impl<'a> LayoutStream<'a> {
    pub fn new(
        layout: &'a dyn LayoutModel,
        backend: &'a dyn DocumentBackend,
        paths: Vec<PathBuf>,
        options: LayoutOptions,
        progress: Option<ProgressCallback>,
    ) -> Self {
        Self {
            layout,
            backend,
            options,
            files: FileQueue::new(paths, Progress(progress)),
            pending: VecDeque::new(),
        }
    }

    fn file_tasks(&self, path: &Path) -> Result<Vec<Task>, TaskError> {
        let doc = self.layout.analyze(path)?;
        // Layout page numbers are 1-based; previews are indexed from 0.
        let images = if self.options.hide_preview {
            Vec::new()
        } else {
            let images = self.render_previews(path)?;
            if let Some(page) = doc
                .pages
                .iter()
                .find(|p| p.page_no == 0 || p.page_no > images.len())
            {
                return Err(TaskError::PageOutOfRange {
                    path: path.to_path_buf(),
                    page: page.page_no,
                    total: images.len(),
                });
            }
            images
        };
        let image_for = |page: &LayoutPage| {
            page.page_no
                .checked_sub(1)
                .and_then(|i| images.get(i))
                .cloned()
        };

        let mut tasks = Vec::new();
        if !self.options.focus.is_empty() {
            for page in &doc.pages {
                tasks.extend(self.focus_tasks(path, page, image_for(page)));
            }
        } else if self.options.split_pages {
            for page in &doc.pages {
                let content = self.page_content(page, image_for(page));
                tasks.push(Task::new(
                    TaskPayload::Page(content),
                    TaskMeta::document(path).with_page(page.page_no),
                ));
            }
        } else {
            let pages = doc
                .pages
                .iter()
                .map(|page| self.page_content(page, image_for(page)))
                .collect();
            tasks.push(Task::new(
                TaskPayload::Document { pages },
                TaskMeta::document(path),
            ));
        }
        Ok(tasks)
    }

    fn render_previews(&self, path: &Path) -> Result<Vec<String>, TaskError> {
        let source = self.backend.open(path)?;
        (0..source.page_count())
            .map(|page| {
                let image = source.render(page, Scale::ONE)?;
                encode_image(path, page, &image)
            })
            .collect()
    }

    fn blocks(&self, highlight: Option<Vec<ImageSpan>>) -> BlocksConfig {
        let mut blocks = vec![Block::view(self.options.view_id)];
        if !self.options.hide_preview {
            blocks.push(Block::image(highlight.unwrap_or_default()));
        }
        BlocksConfig { blocks }
    }

    fn page_content(&self, page: &LayoutPage, image: Option<String>) -> PageContent {
        let PageText { text, tokens, .. } = build_page_text(&page.spans, &self.options.hints());
        PageContent {
            text,
            tokens,
            width: page.width,
            height: page.height,
            view_id: ViewId::Blocks,
            config: self.blocks(None),
            image,
            spans: Vec::new(),
        }
    }

    fn focus_tasks(&self, path: &Path, page: &LayoutPage, image: Option<String>) -> Vec<Task> {
        let hints = self.options.hints();
        let page_text = build_page_text(&page.spans, &hints);

        page_text
            .spans
            .iter()
            .filter(|range| self.options.focus.contains(&range.label))
            .map(|range| {
                let span = &page.spans[range.index];
                let own = build_page_text(std::slice::from_ref(span), &hints);
                let highlight = span.bbox.map(|b| {
                    vec![ImageSpan {
                        x: b.x,
                        y: b.y,
                        width: b.width,
                        height: b.height,
                        color: FOCUS_HIGHLIGHT_COLOR.to_string(),
                        id: range.index,
                    }]
                });
                let text_span = TextSpan {
                    token_start: range.token_start,
                    token_end: range.token_end,
                    start: range.start,
                    end: range.end,
                    text: own.text.clone(),
                    label: range.label.clone(),
                };
                let content = PageContent {
                    text: own.text,
                    tokens: own.tokens,
                    width: page.width,
                    height: page.height,
                    view_id: ViewId::Blocks,
                    config: self.blocks(highlight),
                    image: image.clone(),
                    spans: Vec::new(),
                };
                Task::new(
                    TaskPayload::FocusedSpan(FocusedSpan { content, text_span }),
                    TaskMeta::document(path).with_page(page.page_no),
                )
            })
            .collect()
    }
}

impl Iterator for LayoutStream<'_> {
    type Item = Result<Task, TaskError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(task) = self.pending.pop_front() {
                return Some(Ok(task));
            }
            let path = self.files.pop()?;
            match self.file_tasks(&path) {
                Ok(tasks) => {
                    debug!("{} → {} task(s)", path.display(), tasks.len());
                    self.files.progress.file_complete(&path, tasks.len());
                    self.pending.extend(tasks);
                }
                Err(e) => {
                    self.files.progress.file_complete(&path, 0);
                    return Some(Err(self.files.progress.error(e)));
                }
            }
        }
    }
}

// ── OCR correction (ocr.correct) ─────────────────────────────────────────

/// Settings for [`OcrCorrectionStream`].
#[derive(Debug, Clone)]
pub struct OcrOptions {
    /// Only regions with one of these labels are transcribed.
    pub labels: LabelSet,
    pub scale: Scale,
    pub fold_dashes: bool,
    pub autofocus: bool,
}

impl OcrOptions {
    pub fn from_config(config: &AnnotationConfig) -> Self {
        Self {
            labels: config.labels.clone(),
            scale: config.scale,
            fold_dashes: config.fold_dashes,
            autofocus: config.autofocus,
        }
    }
}

/// One `region_correction` task per matching region of each annotated page
/// image.
///
/// Each record's document is opened once, its page rendered once at the
/// configured scale, and closed again before the record's first task is
/// yielded.
///
/// Progress is reported per record: `on_stream_start` receives the number
/// of records, and every record completes once whether or not it produced
/// tasks, under its document path or the source path when it has none.
pub struct OcrCorrectionStream<'a> {
    records: Box<dyn Iterator<Item = Result<Record, TaskError>> + 'a>,
    source: PathBuf,
    total_records: usize,
    started: bool,
    backend: &'a dyn DocumentBackend,
    ocr: &'a dyn OcrEngine,
    options: OcrOptions,
    progress: Progress,
    pending: VecDeque<Result<Task, TaskError>>,
}

impl<'a> OcrCorrectionStream<'a> {
    /// `total_records` is what `records` will yield, as counted by
    /// [`JsonlSource::count_records`].
    pub fn new(
        records: JsonlSource,
        total_records: usize,
        backend: &'a dyn DocumentBackend,
        ocr: &'a dyn OcrEngine,
        options: OcrOptions,
        progress: Option<ProgressCallback>,
    ) -> Self {
        Self {
            source: records.path().to_path_buf(),
            records: Box::new(records),
            total_records,
            started: false,
            backend,
            ocr,
            options,
            progress: Progress(progress),
            pending: VecDeque::new(),
        }
    }

    fn record_tasks(&self, record: &Record) -> Vec<Result<Task, TaskError>> {
        let regions = match matching_regions(record, &self.options.labels) {
            Ok(regions) if regions.is_empty() => {
                debug!("Line {}: no region to transcribe", record.line);
                return Vec::new();
            }
            Ok(regions) => regions,
            Err(e) => return vec![Err(e)],
        };
        let (path, page, meta) = match page_provenance(record) {
            Ok(p) => p,
            Err(e) => return vec![Err(e)],
        };

        let rendered = self
            .backend
            .open(&path)
            .and_then(|source| source.render(page, self.options.scale));
        let image = match rendered {
            Ok(image) => image,
            Err(e) => return vec![Err(e)],
        };
        debug!(
            "Line {}: {} region(s) on page {} of {} at {}",
            record.line,
            regions.len(),
            page,
            path.display(),
            self.options.scale
        );

        regions
            .into_iter()
            .map(|region| self.transcribe(&path, page, &image, region, &meta))
            .collect()
    }

    fn transcribe(
        &self,
        path: &Path,
        page: usize,
        image: &DynamicImage,
        mut region: Region,
        meta: &TaskMeta,
    ) -> Result<Task, TaskError> {
        let region_id = region.display_id();
        let cropped =
            crop(image, &region, self.options.scale).map_err(|e| TaskError::Coordinate {
                path: path.to_path_buf(),
                page,
                region: region_id.clone(),
                detail: e.to_string(),
            })?;
        let uri = encode_image(path, page, &cropped)?;
        let raw = self.ocr.recognize(&cropped).map_err(|e| TaskError::OcrFailed {
            path: path.to_path_buf(),
            page,
            region: region_id,
            detail: e.to_string(),
        })?;

        let mut text = clean_ocr_text(&raw);
        if self.options.fold_dashes {
            text = fold_ocr_dashes(&text);
        }
        region.id = None;

        Ok(Task::new(
            TaskPayload::RegionCorrection(CorrectedRegion {
                region,
                image: Some(uri),
                transcription: text.clone(),
                text,
                field_rows: TRANSCRIPT_FIELD_ROWS,
                field_label: TRANSCRIPT_FIELD_LABEL.to_string(),
                field_id: TRANSCRIPT_FIELD_ID.to_string(),
                field_autofocus: self.options.autofocus,
            }),
            meta.clone(),
        ))
    }
}

impl Iterator for OcrCorrectionStream<'_> {
    type Item = Result<Task, TaskError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item.map_err(|e| self.progress.error(e)));
            }
            if !self.started {
                self.started = true;
                self.progress.stream_start(self.total_records);
            }
            let record = match self.records.next()? {
                Ok(record) => record,
                Err(e) => {
                    self.progress.file_complete(&self.source, 0);
                    return Some(Err(self.progress.error(e)));
                }
            };
            let items = self.record_tasks(&record);
            let done = items.iter().filter(|i| i.is_ok()).count();
            match record.value.pointer("/meta/path").and_then(Value::as_str) {
                Some(path) => self.progress.file_complete(Path::new(path), done),
                None => self.progress.file_complete(&self.source, done),
            }
            self.pending.extend(items);
        }
    }
}

/// Regions of `record` whose label is in `labels`.
fn matching_regions(record: &Record, labels: &LabelSet) -> Result<Vec<Region>, TaskError> {
    let Some(spans) = record.value.get("spans").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    spans
        .iter()
        .filter(|span| {
            span.get("label")
                .and_then(Value::as_str)
                .is_some_and(|label| labels.contains(label))
        })
        .map(|span| {
            serde_json::from_value::<Region>(span.clone()).map_err(|e| TaskError::Schema {
                line: record.line,
                field: "spans",
                detail: e.to_string(),
            })
        })
        .collect()
}

/// Document path, 0-based page and the full meta object of an annotated
/// page image.
fn page_provenance(record: &Record) -> Result<(PathBuf, usize, TaskMeta), TaskError> {
    let schema = |field: &'static str, detail: &str| TaskError::Schema {
        line: record.line,
        field,
        detail: detail.to_string(),
    };

    let meta = record
        .value
        .get("meta")
        .filter(|m| m.is_object())
        .ok_or_else(|| schema("meta", "no `meta` object on the record"))?;
    let path = meta
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| schema("meta.path", "expected the document path as a string"))?;
    let page = meta
        .get("page")
        .and_then(Value::as_u64)
        .ok_or_else(|| schema("meta.page", "expected a non-negative page index"))?;
    let page = usize::try_from(page).map_err(|e| schema("meta.page", &e.to_string()))?;

    let meta: TaskMeta =
        serde_json::from_value(meta.clone()).map_err(|e| schema("meta", &e.to_string()))?;
    Ok((PathBuf::from(path), page, meta))
}
