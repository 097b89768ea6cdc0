//! The annotation task: what every recipe stream yields.
//!
//! A [`Task`] is a [`TaskPayload`] variant plus provenance ([`TaskMeta`]),
//! two content hashes and an optional answer. On the wire the payload is
//! flattened into the task object with a `"mode"` discriminant:
//!
//! ```json
//! {"mode": "page_image", "image": "data:image/jpeg;base64,…", "width": 612,
//!  "height": 792, "meta": {"path": "docs/a.pdf", "page": 0},
//!  "_input_hash": -1093467412, "_task_hash": 20583561}
//! ```
//!
//! Hashes are computed by [`Task::new`] from the finished payload, and again
//! by [`Task::rehash`] when a loaded task's presentation changes.
//! `_input_hash` covers the content shown to the annotator (text, image);
//! `_task_hash` adds what is being asked about it (region, focused span).

use crate::config::LabelSet;
use crate::pipeline::encode::is_data_uri;
use crate::pipeline::entities::{align_entities, EntityError, EntityModel, SuggestedSpan};
use crate::pipeline::layout::LayoutRole;
use crate::pipeline::region::Region;
use crate::pipeline::tokens::{disable_roles, Token};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::path::Path;

/// UI views referenced by tasks and recipe configs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewId {
    ImageManual,
    SpansManual,
    Blocks,
    Pages,
    Image,
    Classification,
    TextInput,
}

/// A box drawn on the page preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSpan {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub color: String,
    pub id: usize,
}

/// One view inside a `blocks` layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub view_id: ViewId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spans: Option<Vec<ImageSpan>>,
}

impl Block {
    pub fn view(view_id: ViewId) -> Self {
        Self {
            view_id,
            spans: None,
        }
    }

    /// The page preview, with optional highlight boxes.
    pub fn image(spans: Vec<ImageSpan>) -> Self {
        Self {
            view_id: ViewId::Image,
            spans: Some(spans),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlocksConfig {
    pub blocks: Vec<Block>,
}

/// A rendered page for box drawing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageImage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub width: u32,
    pub height: u32,
}

/// The text of one page (or one span, in focus mode) with its tokens and
/// optional preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageContent {
    pub text: String,
    pub tokens: Vec<Token>,
    pub width: f64,
    pub height: f64,
    pub view_id: ViewId,
    pub config: BlocksConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Pre-populated span suggestions over `tokens`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spans: Vec<SuggestedSpan>,
}

impl PageContent {
    fn hide_preview(&mut self) {
        self.image = None;
        self.config.blocks.truncate(1);
    }

    fn strip_images(&mut self) {
        strip_data_uri(&mut self.image);
    }
}

/// Page-level range and label of a focused span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSpan {
    pub token_start: usize,
    pub token_end: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub label: LayoutRole,
}

/// A single layout span presented on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusedSpan {
    #[serde(flatten)]
    pub content: PageContent,
    pub text_span: TextSpan,
}

/// An annotated region with its crop and OCR transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectedRegion {
    #[serde(flatten)]
    pub region: Region,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// OCR output after cleanup and optional folding.
    pub text: String,
    /// Editable copy of `text`; the annotator's correction lands here.
    pub transcription: String,
    pub field_rows: u32,
    pub field_label: String,
    pub field_id: String,
    pub field_autofocus: bool,
}

/// The content of a task, tagged by `mode`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TaskPayload {
    PageImage(PageImage),
    Page(PageContent),
    Document { pages: Vec<PageContent> },
    FocusedSpan(FocusedSpan),
    RegionCorrection(CorrectedRegion),
}

impl TaskPayload {
    pub fn mode(&self) -> &'static str {
        match self {
            Self::PageImage(_) => "page_image",
            Self::Page(_) => "page",
            Self::Document { .. } => "document",
            Self::FocusedSpan(_) => "focused_span",
            Self::RegionCorrection(_) => "region_correction",
        }
    }

    fn input_value(&self) -> Value {
        fn content(c: &PageContent) -> Value {
            json!({ "text": c.text, "image": c.image })
        }
        match self {
            Self::PageImage(p) => json!({ "image": p.image }),
            Self::Page(c) => content(c),
            Self::Document { pages } => {
                json!({ "pages": pages.iter().map(content).collect::<Vec<_>>() })
            }
            Self::FocusedSpan(f) => content(&f.content),
            Self::RegionCorrection(r) => json!({ "text": r.text, "image": r.image }),
        }
    }

    fn task_value(&self) -> Value {
        fn suggested(c: &PageContent) -> Value {
            c.spans
                .iter()
                .map(|s| json!([s.token_start, s.token_end, s.label]))
                .collect()
        }
        match self {
            Self::Page(c) if !c.spans.is_empty() => json!({ "spans": suggested(c) }),
            Self::Document { pages } if pages.iter().any(|p| !p.spans.is_empty()) => {
                json!({ "spans": pages.iter().map(suggested).collect::<Vec<_>>() })
            }
            Self::FocusedSpan(f) => {
                let mut value = json!({ "text_span": {
                    "token_start": f.text_span.token_start,
                    "token_end": f.text_span.token_end,
                    "label": f.text_span.label,
                }});
                if !f.content.spans.is_empty() {
                    value["spans"] = suggested(&f.content);
                }
                value
            }
            Self::RegionCorrection(r) => json!({
                "label": r.region.label,
                "region": [r.region.x, r.region.y, r.region.width, r.region.height],
            }),
            _ => Value::Null,
        }
    }
}

/// Provenance linking a task back to its document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// 0-based for page images and OCR regions; the layout model's 1-based
    /// page number for layout tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    /// File stem of the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Any other keys, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskMeta {
    pub fn page(path: &Path, page: usize) -> Self {
        Self {
            path: Some(path.to_string_lossy().into_owned()),
            page: Some(page),
            ..Self::default()
        }
    }

    pub fn document(path: &Path) -> Self {
        Self {
            path: Some(path.to_string_lossy().into_owned()),
            title: path.file_stem().map(|s| s.to_string_lossy().into_owned()),
            ..Self::default()
        }
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Answer {
    Accept,
    Reject,
    Ignore,
}

/// One unit of annotation work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(flatten)]
    pub payload: TaskPayload,
    pub meta: TaskMeta,
    #[serde(rename = "_input_hash")]
    pub input_hash: i32,
    #[serde(rename = "_task_hash")]
    pub task_hash: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<Answer>,
}

impl Task {
    pub fn new(payload: TaskPayload, meta: TaskMeta) -> Self {
        let mut task = Self {
            payload,
            meta,
            input_hash: 0,
            task_hash: 0,
            answer: None,
        };
        task.rehash();
        task
    }

    /// Recompute both hashes from the current payload.
    pub fn rehash(&mut self) {
        self.input_hash = hash_value(&self.payload.input_value());
        self.task_hash = hash_value(&json!({
            "input": self.input_hash,
            "task": self.payload.task_value(),
        }));
    }

    pub fn with_answer(mut self, answer: Answer) -> Self {
        self.answer = Some(answer);
        self
    }

    pub fn mode(&self) -> &'static str {
        self.payload.mode()
    }

    /// The task's own image, if it has one. Documents have one per page.
    pub fn image(&self) -> Option<&str> {
        match &self.payload {
            TaskPayload::PageImage(p) => p.image.as_deref(),
            TaskPayload::Page(c) => c.image.as_deref(),
            TaskPayload::FocusedSpan(f) => f.content.image.as_deref(),
            TaskPayload::RegionCorrection(r) => r.image.as_deref(),
            TaskPayload::Document { .. } => None,
        }
    }

    /// Drop every embedded data-URI image. Image URLs are kept.
    pub fn strip_images(&mut self) {
        match &mut self.payload {
            TaskPayload::PageImage(p) => strip_data_uri(&mut p.image),
            TaskPayload::Page(c) => c.strip_images(),
            TaskPayload::Document { pages } => pages.iter_mut().for_each(PageContent::strip_images),
            TaskPayload::FocusedSpan(f) => f.content.strip_images(),
            TaskPayload::RegionCorrection(r) => strip_data_uri(&mut r.image),
        }
    }

    /// Remove the page preview and reduce blocks to the main view.
    pub fn hide_preview(&mut self) {
        match &mut self.payload {
            TaskPayload::Page(c) => c.hide_preview(),
            TaskPayload::Document { pages } => pages.iter_mut().for_each(PageContent::hide_preview),
            TaskPayload::FocusedSpan(f) => f.content.hide_preview(),
            TaskPayload::PageImage(_) | TaskPayload::RegionCorrection(_) => {}
        }
    }

    /// Replace the span suggestions of every text view with `model`'s
    /// predictions for `labels`. Returns how many spans were suggested.
    ///
    /// Hashes are left alone; call [`Task::rehash`] afterwards.
    pub fn suggest_entities(
        &mut self,
        model: &dyn EntityModel,
        labels: &LabelSet,
    ) -> Result<usize, EntityError> {
        let views: Vec<&mut PageContent> = match &mut self.payload {
            TaskPayload::Page(c) => vec![c],
            TaskPayload::Document { pages } => pages.iter_mut().collect(),
            TaskPayload::FocusedSpan(f) => vec![&mut f.content],
            TaskPayload::PageImage(_) | TaskPayload::RegionCorrection(_) => Vec::new(),
        };
        let mut suggested = 0;
        for view in views {
            let predictions = model.predict(&view.text)?;
            view.spans = align_entities(&predictions, &view.tokens, labels);
            suggested += view.spans.len();
        }
        Ok(suggested)
    }

    /// Mark tokens of the given roles as non-interactive.
    pub fn disable_roles(&mut self, roles: &[LayoutRole]) {
        match &mut self.payload {
            TaskPayload::Page(c) => disable_roles(&mut c.tokens, roles),
            TaskPayload::Document { pages } => {
                for page in pages {
                    disable_roles(&mut page.tokens, roles);
                }
            }
            TaskPayload::FocusedSpan(f) => disable_roles(&mut f.content.tokens, roles),
            TaskPayload::PageImage(_) | TaskPayload::RegionCorrection(_) => {}
        }
    }
}

fn strip_data_uri(image: &mut Option<String>) {
    if image.as_deref().is_some_and(is_data_uri) {
        *image = None;
    }
}

/// SHA-256 over the value's JSON text, first four bytes as a signed integer.
fn hash_value(value: &Value) -> i32 {
    let digest = Sha256::digest(value.to_string().as_bytes());
    i32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::entities::EntityPrediction;
    use crate::pipeline::layout::LayoutSpan;
    use crate::pipeline::tokens::{build_page_text, TokenHints};

    fn content(text: &str, image: Option<&str>) -> PageContent {
        let page = build_page_text(
            &[LayoutSpan::from_words(LayoutRole::Text, text)],
            &TokenHints::default(),
        );
        PageContent {
            text: page.text,
            tokens: page.tokens,
            width: 612.0,
            height: 792.0,
            view_id: ViewId::Blocks,
            config: BlocksConfig {
                blocks: vec![Block::view(ViewId::SpansManual), Block::image(vec![])],
            },
            image: image.map(str::to_string),
            spans: Vec::new(),
        }
    }

    fn region_task(label: &str, x: f64) -> Task {
        Task::new(
            TaskPayload::RegionCorrection(CorrectedRegion {
                region: Region::rect(label, x, 10.0, 50.0, 20.0),
                image: Some("data:image/jpeg;base64,AAAA".into()),
                text: "hello".into(),
                transcription: "hello".into(),
                field_rows: 12,
                field_label: "Transcript".into(),
                field_id: "transcription".into(),
                field_autofocus: false,
            }),
            TaskMeta::page(Path::new("a.pdf"), 0),
        )
    }

    #[test]
    fn page_image_wire_shape() {
        let task = Task::new(
            TaskPayload::PageImage(PageImage {
                image: Some("data:image/jpeg;base64,AAAA".into()),
                width: 612,
                height: 792,
            }),
            TaskMeta::page(Path::new("docs/a.pdf"), 2),
        );
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["mode"], "page_image");
        assert_eq!(json["meta"], json!({"path": "docs/a.pdf", "page": 2}));
        assert!(json["_input_hash"].is_i64());
        assert!(json.get("answer").is_none());
    }

    #[test]
    fn hashes_are_deterministic_and_content_sensitive() {
        let a = Task::new(TaskPayload::Page(content("one two", None)), TaskMeta::default());
        let b = Task::new(TaskPayload::Page(content("one two", None)), TaskMeta::default());
        let c = Task::new(TaskPayload::Page(content("one three", None)), TaskMeta::default());
        assert_eq!(a.input_hash, b.input_hash);
        assert_eq!(a.task_hash, b.task_hash);
        assert_ne!(a.input_hash, c.input_hash);
    }

    #[test]
    fn meta_does_not_affect_hashes() {
        let a = Task::new(TaskPayload::Page(content("x", None)), TaskMeta::default());
        let b = Task::new(
            TaskPayload::Page(content("x", None)),
            TaskMeta::document(Path::new("other.pdf")),
        );
        assert_eq!(a.task_hash, b.task_hash);
    }

    #[test]
    fn rehash_follows_the_payload() {
        let mut task = Task::new(
            TaskPayload::Page(content("x", Some("data:image/jpeg;base64,AA"))),
            TaskMeta::default(),
        );
        let shown = task.input_hash;
        task.hide_preview();
        task.rehash();
        let fresh = Task::new(task.payload.clone(), TaskMeta::default());
        assert_ne!(task.input_hash, shown);
        assert_eq!((task.input_hash, task.task_hash), (fresh.input_hash, fresh.task_hash));
    }

    struct Names;

    impl EntityModel for Names {
        fn labels(&self) -> Vec<String> {
            vec!["PERSON".into()]
        }

        fn predict(&self, text: &str) -> Result<Vec<EntityPrediction>, EntityError> {
            Ok(text
                .find("Ada")
                .map(|at| EntityPrediction {
                    start: text[..at].chars().count(),
                    end: text[..at].chars().count() + 3,
                    label: "PERSON".into(),
                })
                .into_iter()
                .collect())
        }
    }

    #[test]
    fn suggested_entities_reach_every_page_and_the_task_hash() {
        let mut task = Task::new(
            TaskPayload::Document {
                pages: vec![content("ask Ada", None), content("nobody here", None)],
            },
            TaskMeta::default(),
        );
        let before = (task.input_hash, task.task_hash);

        let n = task
            .suggest_entities(&Names, &LabelSet::new(["PERSON"]))
            .unwrap();
        task.rehash();

        assert_eq!(n, 1);
        let TaskPayload::Document { pages } = &task.payload else {
            unreachable!()
        };
        assert_eq!((pages[0].spans[0].token_start, pages[0].spans[0].token_end), (1, 1));
        assert!(pages[1].spans.is_empty());
        assert_eq!(task.input_hash, before.0);
        assert_ne!(task.task_hash, before.1);

        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["pages"][0]["spans"][0]["label"], "PERSON");
        assert!(json["pages"][1].get("spans").is_none());
    }

    #[test]
    fn region_geometry_changes_task_hash_only() {
        let a = region_task("TEXT", 10.0);
        let b = region_task("TEXT", 11.0);
        assert_eq!(a.input_hash, b.input_hash);
        assert_ne!(a.task_hash, b.task_hash);
    }

    #[test]
    fn region_correction_is_flat() {
        let json = serde_json::to_value(region_task("TEXT", 10.0)).unwrap();
        assert_eq!(json["mode"], "region_correction");
        assert_eq!(json["label"], "TEXT");
        assert_eq!(json["x"], 10.0);
        assert_eq!(json["field_id"], "transcription");
        assert!(json.get("id").is_none());
    }

    #[test]
    fn round_trips_through_json() {
        let task = Task::new(
            TaskPayload::Document {
                pages: vec![content("a b", Some("data:image/jpeg;base64,AA")), content("c", None)],
            },
            TaskMeta::document(Path::new("dir/report.pdf")),
        )
        .with_answer(Answer::Accept);
        let line = serde_json::to_string(&task).unwrap();
        let back: Task = serde_json::from_str(&line).unwrap();
        assert_eq!(back, task);
        assert_eq!(back.meta.title.as_deref(), Some("report"));
    }

    #[test]
    fn strip_images_keeps_urls() {
        let mut task = Task::new(
            TaskPayload::Document {
                pages: vec![
                    content("a", Some("data:image/jpeg;base64,AA")),
                    content("b", Some("https://example.com/p2.jpg")),
                ],
            },
            TaskMeta::default(),
        );
        task.strip_images();
        let TaskPayload::Document { pages } = &task.payload else {
            panic!("expected document");
        };
        assert_eq!(pages[0].image, None);
        assert_eq!(pages[1].image.as_deref(), Some("https://example.com/p2.jpg"));
    }

    #[test]
    fn hide_preview_reaches_nested_pages() {
        let mut task = Task::new(
            TaskPayload::Document {
                pages: vec![content("a", Some("data:x")), content("b", Some("data:y"))],
            },
            TaskMeta::default(),
        );
        task.hide_preview();
        let TaskPayload::Document { pages } = &task.payload else {
            panic!("expected document");
        };
        for page in pages {
            assert_eq!(page.image, None);
            assert_eq!(page.config.blocks, vec![Block::view(ViewId::SpansManual)]);
        }
    }

    #[test]
    fn disable_roles_reaches_tokens() {
        let mut task = Task::new(TaskPayload::Page(content("a b", None)), TaskMeta::default());
        task.disable_roles(&[LayoutRole::Text]);
        let TaskPayload::Page(page) = &task.payload else {
            panic!("expected page");
        };
        assert!(page.tokens.iter().all(|t| t.disabled));
    }

    #[test]
    fn meta_extra_keys_pass_through() {
        let meta: TaskMeta =
            serde_json::from_value(json!({"path": "a.pdf", "page": 1, "source": "scan"})).unwrap();
        assert_eq!(meta.extra["source"], "scan");
        assert_eq!(serde_json::to_value(&meta).unwrap()["source"], "scan");
    }
}
