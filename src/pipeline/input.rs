//! Input resolution: directories of documents and JSONL task sources.
//!
//! Both are checked up front so a missing source is a fatal
//! [`AnnotateError`] before any stream exists. Records inside a JSONL source
//! are read lazily; a bad line is a non-fatal [`TaskError`] for that line
//! only.

use crate::error::{AnnotateError, TaskError};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Prefix marking a datastore collection rather than a file.
pub const DATASET_PREFIX: &str = "dataset:";

/// True when `target` names a datastore collection (`dataset:name`).
pub fn is_dataset_target(target: &str) -> bool {
    target.starts_with(DATASET_PREFIX)
}

/// True when `source` should be read as a JSONL task file.
pub fn is_jsonl_source(source: &str) -> bool {
    source.to_lowercase().ends_with(".jsonl") || is_dataset_target(source)
}

/// List the files in `dir` whose extension is in `extensions`.
///
/// Hidden files (leading `.`) and subdirectories are skipped, extensions
/// match case-insensitively, and the result is sorted by path.
pub fn discover_files(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>, AnnotateError> {
    if !dir.exists() {
        return Err(AnnotateError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }
    if !dir.is_dir() {
        return Err(AnnotateError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(dir).map_err(|e| AnnotateError::SourceReadFailed {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            let hidden = path
                .file_name()
                .map(|n| n.to_string_lossy().starts_with('.'))
                .unwrap_or(true);
            !hidden && has_extension(path, extensions)
        })
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(AnnotateError::NoFilesFound {
            path: dir.to_path_buf(),
            extensions: extensions
                .iter()
                .map(|e| format!(".{e}"))
                .collect::<Vec<_>>()
                .join(", "),
        });
    }

    info!("Found {} file(s) in {}", paths.len(), dir.display());
    Ok(paths)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|ext| extensions.iter().any(|want| *want == ext))
}

/// A record read from a JSONL source, with its 1-based line number.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub line: usize,
    pub value: Value,
}

/// Lazy reader over a JSON Lines file.
///
/// Blank lines are skipped. Lines that are not JSON objects yield
/// [`TaskError::MalformedRecord`] and reading continues.
pub struct JsonlSource {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line: usize,
}

impl JsonlSource {
    pub fn open(path: &Path) -> Result<Self, AnnotateError> {
        if is_dataset_target(&path.to_string_lossy()) {
            return Err(AnnotateError::UnsupportedTarget {
                target: path.to_string_lossy().into_owned(),
            });
        }
        if !path.exists() {
            return Err(AnnotateError::SourceNotFound {
                path: path.to_path_buf(),
            });
        }
        let file = File::open(path).map_err(|e| AnnotateError::SourceReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        debug!("Reading tasks from {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            lines: BufReader::new(file).lines(),
            line: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of items this source yields, counted in a separate pass over
    /// the file. Blank lines are not counted; bad lines are.
    pub fn count_records(&self) -> Result<usize, AnnotateError> {
        let file = File::open(&self.path).map_err(|e| AnnotateError::SourceReadFailed {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(BufReader::new(file)
            .lines()
            .filter(|line| line.as_ref().map_or(true, |l| !l.trim().is_empty()))
            .count())
    }
}

impl Iterator for JsonlSource {
    type Item = Result<Record, TaskError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let raw = self.lines.next()?;
            self.line += 1;
            let line = self.line;

            let raw = match raw {
                Ok(raw) => raw,
                Err(e) => {
                    return Some(Err(TaskError::MalformedRecord {
                        line,
                        detail: e.to_string(),
                    }))
                }
            };
            if raw.trim().is_empty() {
                continue;
            }

            return Some(match serde_json::from_str::<Value>(&raw) {
                Ok(value @ Value::Object(_)) => Ok(Record { line, value }),
                Ok(other) => Err(TaskError::MalformedRecord {
                    line,
                    detail: format!("expected a JSON object, found {}", json_kind(&other)),
                }),
                Err(e) => Err(TaskError::MalformedRecord {
                    line,
                    detail: e.to_string(),
                }),
            });
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn pdf() -> Vec<String> {
        vec!["pdf".to_string()]
    }

    #[test]
    fn missing_and_empty_directories_differ() {
        let tmp = TempDir::new().unwrap();
        let missing = discover_files(&tmp.path().join("nope"), &pdf()).unwrap_err();
        let empty = discover_files(tmp.path(), &pdf()).unwrap_err();
        assert!(matches!(missing, AnnotateError::DirectoryNotFound { .. }));
        assert!(matches!(empty, AnnotateError::NoFilesFound { .. }));
        assert_ne!(missing.to_string(), empty.to_string());
        assert!(empty.to_string().contains(".pdf"));
    }

    #[test]
    fn file_is_not_a_directory() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.pdf");
        std::fs::write(&file, b"%PDF").unwrap();
        assert!(matches!(
            discover_files(&file, &pdf()),
            Err(AnnotateError::NotADirectory { .. })
        ));
    }

    #[test]
    fn discovery_filters_and_sorts() {
        let tmp = TempDir::new().unwrap();
        for name in ["b.pdf", "A.PDF", ".hidden.pdf", "notes.txt", "c.pdf.bak"] {
            std::fs::write(tmp.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(tmp.path().join("sub.pdf")).unwrap();

        let found = discover_files(tmp.path(), &pdf()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["A.PDF", "b.pdf"]);
    }

    #[test]
    fn jsonl_skips_blanks_and_reports_bad_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tasks.jsonl");
        std::fs::write(&path, "{\"a\":1}\n\n   \nnot json\n[1,2]\n{\"b\":2}\n").unwrap();

        let source = JsonlSource::open(&path).unwrap();
        assert_eq!(source.count_records().unwrap(), 4);
        let items: Vec<_> = source.collect();
        assert_eq!(items.len(), 4);
        assert_eq!(items[0].as_ref().unwrap().line, 1);
        assert!(matches!(items[1], Err(TaskError::MalformedRecord { line: 4, .. })));
        assert!(matches!(items[2], Err(TaskError::MalformedRecord { line: 5, .. })));
        assert_eq!(items[3].as_ref().unwrap().value["b"], 2);
    }

    #[test]
    fn jsonl_missing_file_and_dataset_targets() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            JsonlSource::open(&tmp.path().join("none.jsonl")),
            Err(AnnotateError::SourceNotFound { .. })
        ));
        assert!(matches!(
            JsonlSource::open(Path::new("dataset:boxes")),
            Err(AnnotateError::UnsupportedTarget { .. })
        ));
    }

    #[test]
    fn source_kind_detection() {
        assert!(is_jsonl_source("fetched.JSONL"));
        assert!(is_jsonl_source("dataset:pages"));
        assert!(!is_jsonl_source("pdfs/"));
    }
}
