//! Recipe entry points.
//!
//! A recipe validates its inputs, builds a lazy task stream and describes
//! how the annotation UI should present the tasks. All fatal problems
//! (missing source, no files, bad target) are returned before any stream
//! exists; everything after that is a per-task [`TaskError`] inside the
//! stream.
//!
//! | Recipe | Source | Tasks |
//! |--------|--------|-------|
//! | [`image_manual`] | directory of PDFs | one page image per page |
//! | [`ocr_correct`]  | JSONL from `image_manual` | one transcript per region |
//! | [`spans_manual`] | directory of PDFs, or JSONL from `layout_fetch` | layout text |
//! | [`layout_fetch`] | directory of PDFs | writes layout tasks to JSONL |

use crate::config::{AnnotationConfig, LabelSet};
use crate::error::{AnnotateError, TaskError};
use crate::pipeline::entities::EntityModel;
use crate::pipeline::input::{discover_files, is_dataset_target, is_jsonl_source, JsonlSource};
use crate::pipeline::layout::LayoutModel;
use crate::pipeline::ocr::OcrEngine;
use crate::pipeline::render::DocumentBackend;
use crate::stream::{
    LayoutOptions, LayoutStream, OcrCorrectionStream, OcrOptions, PageImageStream, TaskStream,
};
use crate::task::{Answer, Block, Task, ViewId};
use crate::theme::{preview_css, CSS, FONT_SIZE_TEXT, IMAGE_MANUAL_STROKE_WIDTH};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// UI settings handed to the annotation tool alongside the stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UiConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_manual_stroke_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<Block>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_css: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shade_bounding_boxes: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_theme: Option<CustomTheme>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomTheme {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_max_width: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub small_text: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_height: Option<u32>,
}

/// Everything the annotation tool needs to run a recipe.
pub struct Recipe<'a> {
    pub dataset: String,
    pub view_id: ViewId,
    pub config: UiConfig,
    pub stream: TaskStream<'a>,
    /// Whether [`Recipe::before_db`] strips embedded images.
    pub strip_images: bool,
}

impl<'a> Recipe<'a> {
    /// Pre-populate every text task's `spans` with `model`'s predictions.
    ///
    /// Only `labels` are suggested; when it is empty, every label the model
    /// knows is, and those labels become the recipe's labels. Task hashes
    /// are recomputed with the suggestions.
    pub fn with_entities(mut self, model: &'a dyn EntityModel, labels: &LabelSet) -> Self {
        let labels = if labels.is_empty() {
            LabelSet::new(model.labels())
        } else {
            labels.clone()
        };
        info!("Suggesting entities: {:?}", labels.as_slice());
        self.config.labels = Some(labels.as_slice().to_vec());

        let stream = std::mem::replace(&mut self.stream, Box::new(std::iter::empty()));
        self.stream = Box::new(stream.map(move |item| -> Result<Task, TaskError> {
            let mut task = item?;
            let path = task.meta.path.clone().unwrap_or_default();
            let suggested = task
                .suggest_entities(model, &labels)
                .map_err(|e| TaskError::EntitiesFailed {
                    path: path.into(),
                    detail: e.to_string(),
                })?;
            debug!("{} entity suggestion(s)", suggested);
            task.rehash();
            Ok(task)
        }));
        self
    }

    /// Prepare an answered task for storage.
    pub fn before_db(&self, mut task: Task) -> Task {
        if self.strip_images {
            task.strip_images();
        }
        task
    }

    /// The serialisable part of the recipe.
    pub fn components(&self) -> Components<'_> {
        Components {
            dataset: &self.dataset,
            view_id: self.view_id,
            config: &self.config,
            before_db: self.strip_images,
        }
    }
}

/// Recipe settings without the stream, for writing next to the tasks.
#[derive(Debug, Serialize)]
pub struct Components<'r> {
    pub dataset: &'r str,
    pub view_id: ViewId,
    pub config: &'r UiConfig,
    pub before_db: bool,
}

/// Draw labelled boxes on page images.
///
/// Pages are rendered at scale 1; the boxes' coordinates are in that space.
pub fn image_manual<'a>(
    dataset: &str,
    dir: &Path,
    backend: &'a dyn DocumentBackend,
    config: &AnnotationConfig,
) -> Result<Recipe<'a>, AnnotateError> {
    info!("Recipe image.manual: {}", dir.display());
    let paths = discover_files(dir, &config.file_extensions)?;
    let stream = PageImageStream::new(backend, paths, config.progress_callback.clone());

    Ok(Recipe {
        dataset: dataset.to_string(),
        view_id: ViewId::ImageManual,
        config: UiConfig {
            labels: Some(config.labels.as_slice().to_vec()),
            image_manual_stroke_width: Some(IMAGE_MANUAL_STROKE_WIDTH),
            custom_theme: Some(CustomTheme {
                labels: Some(config.label_colors()),
                ..CustomTheme::default()
            }),
            ..UiConfig::default()
        },
        stream: Box::new(stream),
        strip_images: config.remove_base64,
    })
}

/// OCR the boxes drawn with [`image_manual`] and offer the transcripts for
/// correction.
pub fn ocr_correct<'a>(
    dataset: &str,
    source: &Path,
    backend: &'a dyn DocumentBackend,
    ocr: &'a dyn OcrEngine,
    config: &AnnotationConfig,
) -> Result<Recipe<'a>, AnnotateError> {
    info!(
        "Recipe ocr.correct: {} (labels {:?}, scale {})",
        source.display(),
        config.labels.as_slice(),
        config.scale
    );
    let records = JsonlSource::open(source)?;
    let total = records.count_records()?;
    let stream = OcrCorrectionStream::new(
        records,
        total,
        backend,
        ocr,
        OcrOptions::from_config(config),
        config.progress_callback.clone(),
    );

    Ok(Recipe {
        dataset: dataset.to_string(),
        view_id: ViewId::Blocks,
        config: UiConfig {
            blocks: Some(vec![
                Block::view(ViewId::Classification),
                Block::view(ViewId::TextInput),
            ]),
            ..UiConfig::default()
        },
        stream: Box::new(stream),
        strip_images: config.remove_base64,
    })
}

/// Annotate spans in the text of PDFs, next to a preview of the page.
///
/// `source` is a directory of PDFs, or a `.jsonl` file written by
/// [`layout_fetch`].
pub fn spans_manual<'a>(
    dataset: &str,
    source: &str,
    layout: &'a dyn LayoutModel,
    backend: &'a dyn DocumentBackend,
    config: &AnnotationConfig,
) -> Result<Recipe<'a>, AnnotateError> {
    info!("Recipe spans.manual: {}", source);
    let stream: TaskStream<'a> = if is_jsonl_source(source) {
        if is_dataset_target(source) {
            return Err(AnnotateError::UnsupportedTarget {
                target: source.to_string(),
            });
        }
        let disable = config.disable.clone();
        let hide_preview = config.hide_preview;
        let loaded = JsonlSource::open(Path::new(source))?.map(move |record| {
            let record = record?;
            let mut task: Task =
                serde_json::from_value(record.value).map_err(|e| TaskError::MalformedRecord {
                    line: record.line,
                    detail: format!("not a layout task: {e}"),
                })?;
            task.disable_roles(&disable);
            if hide_preview {
                task.hide_preview();
            }
            task.rehash();
            Ok(task)
        });
        Box::new(loaded)
    } else {
        let paths = discover_files(Path::new(source), &config.file_extensions)?;
        Box::new(LayoutStream::new(
            layout,
            backend,
            paths,
            LayoutOptions::from_config(config, ViewId::SpansManual),
            config.progress_callback.clone(),
        ))
    };

    let view_id = if config.split_pages || !config.focus.is_empty() {
        ViewId::Blocks
    } else {
        ViewId::Pages
    };
    let mut css = CSS.to_string();
    if !config.hide_preview {
        css.push_str(&preview_css());
    }

    Ok(Recipe {
        dataset: dataset.to_string(),
        view_id,
        config: UiConfig {
            labels: Some(config.labels.as_slice().to_vec()),
            global_css: Some(css),
            shade_bounding_boxes: Some(true),
            custom_theme: Some(CustomTheme {
                card_max_width: Some("95%".to_string()),
                small_text: Some(FONT_SIZE_TEXT),
                token_height: Some(25),
                ..CustomTheme::default()
            }),
            ..UiConfig::default()
        },
        stream,
        strip_images: config.remove_base64,
    })
}

/// Outcome of writing a task stream.
#[derive(Debug, Default)]
pub struct WriteSummary {
    pub written: usize,
    pub errors: Vec<TaskError>,
}

/// Analyse every PDF in `source` and write its layout tasks, pre-accepted,
/// to `output` for a later [`spans_manual`] run.
///
/// Previews are always rendered; `hide_preview` can still be applied when
/// the file is loaded.
pub fn layout_fetch(
    output: &str,
    source: &Path,
    layout: &dyn LayoutModel,
    backend: &dyn DocumentBackend,
    config: &AnnotationConfig,
) -> Result<WriteSummary, AnnotateError> {
    if is_dataset_target(output) {
        return Err(AnnotateError::UnsupportedTarget {
            target: output.to_string(),
        });
    }
    info!("Recipe layout.fetch: {} → {}", source.display(), output);

    let paths = discover_files(source, &config.file_extensions)?;
    let mut options = LayoutOptions::from_config(config, ViewId::SpansManual);
    options.hide_preview = false;
    let stream = LayoutStream::new(
        layout,
        backend,
        paths,
        options,
        config.progress_callback.clone(),
    )
    .map(|task| task.map(|t| t.with_answer(Answer::Accept)));

    let summary = write_jsonl_file(Path::new(output), stream)?;
    info!("Saved {} task(s) to {}", summary.written, output);
    Ok(summary)
}

/// Write tasks as JSON Lines. Failed items are collected, not written.
pub fn write_jsonl<W: Write>(
    writer: W,
    tasks: impl Iterator<Item = Result<Task, TaskError>>,
) -> std::io::Result<WriteSummary> {
    let mut writer = BufWriter::new(writer);
    let mut summary = WriteSummary::default();
    for item in tasks {
        match item {
            Ok(task) => {
                serde_json::to_writer(&mut writer, &task)?;
                writer.write_all(b"\n")?;
                summary.written += 1;
            }
            Err(e) => {
                warn!("Skipping: {}", e);
                summary.errors.push(e);
            }
        }
    }
    writer.flush()?;
    Ok(summary)
}

/// [`write_jsonl`] to a file, atomically (temp file + rename).
pub fn write_jsonl_file(
    path: &Path,
    tasks: impl Iterator<Item = Result<Task, TaskError>>,
) -> Result<WriteSummary, AnnotateError> {
    let failed = |source: std::io::Error| AnnotateError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(failed)?;
    }

    let tmp_path = path.with_extension("jsonl.tmp");
    let file = File::create(&tmp_path).map_err(failed)?;
    let summary = match write_jsonl(file, tasks) {
        Ok(summary) => summary,
        Err(e) => {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(failed(e));
        }
    };
    std::fs::rename(&tmp_path, path).map_err(failed)?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{PageImage, TaskMeta, TaskPayload};

    fn page_task(image: &str) -> Task {
        Task::new(
            TaskPayload::PageImage(PageImage {
                image: Some(image.to_string()),
                width: 10,
                height: 10,
            }),
            TaskMeta::page(Path::new("a.pdf"), 0),
        )
    }

    #[test]
    fn ui_config_skips_unset_fields() {
        let config = UiConfig {
            labels: Some(vec!["foo".into()]),
            custom_theme: Some(CustomTheme {
                card_max_width: Some("95%".into()),
                ..CustomTheme::default()
            }),
            ..UiConfig::default()
        };
        assert_eq!(
            serde_json::to_value(&config).unwrap(),
            serde_json::json!({"labels": ["foo"], "custom_theme": {"cardMaxWidth": "95%"}})
        );
    }

    #[test]
    fn before_db_strips_only_when_asked() {
        let mut recipe = Recipe {
            dataset: "d".into(),
            view_id: ViewId::ImageManual,
            config: UiConfig::default(),
            stream: Box::new(std::iter::empty()),
            strip_images: false,
        };
        let kept = recipe.before_db(page_task("data:image/jpeg;base64,AA"));
        assert!(kept.image().is_some());

        recipe.strip_images = true;
        let stripped = recipe.before_db(page_task("data:image/jpeg;base64,AA"));
        assert!(stripped.image().is_none());
        assert_eq!(stripped.input_hash, kept.input_hash);
    }

    #[test]
    fn write_jsonl_counts_and_collects_errors() {
        let items = vec![
            Ok(page_task("data:a")),
            Err(TaskError::MalformedRecord {
                line: 2,
                detail: "eof".into(),
            }),
            Ok(page_task("data:b")),
        ];
        let mut buf = Vec::new();
        let summary = write_jsonl(&mut buf, items.into_iter()).unwrap();
        assert_eq!(summary.written, 2);
        assert_eq!(summary.errors.len(), 1);
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested/out.jsonl");
        let summary = write_jsonl_file(&path, vec![Ok(page_task("data:a"))].into_iter()).unwrap();
        assert_eq!(summary.written, 1);
        assert!(path.exists());
        assert!(!path.with_extension("jsonl.tmp").exists());
    }
}
