use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tokio::sync::RwLock;

/// Kind of a store entry, as reported by directory listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Notebook,
}

/// One entry in a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    /// Full path within the store, relative to the root.
    pub path: String,
    pub kind: EntryKind,
}

/// Content returned by a read: raw text for plain files, a decoded cell
/// structure for notebooks.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Text(String),
    Notebook(Notebook),
}

/// The `source` field of a notebook cell, decoded once at the store
/// boundary. Clients serialize it as a plain string, a line array, or
/// leave it out entirely; downstream code only ever sees `normalized()`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellSource {
    SingleString(String),
    LineArray(Vec<String>),
    #[default]
    Missing,
}

impl CellSource {
    /// Canonical text regardless of origin shape. Line arrays carry their
    /// own trailing newlines, so they concatenate without a separator.
    pub fn normalized(&self) -> String {
        match self {
            CellSource::SingleString(text) => text.clone(),
            CellSource::LineArray(lines) => lines.concat(),
            CellSource::Missing => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotebookCell {
    pub cell_type: String,
    #[serde(default)]
    pub source: CellSource,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    #[serde(default)]
    pub cells: Vec<NotebookCell>,
}

impl Notebook {
    /// Concatenation of every markdown cell's text, in cell order, joined
    /// by newline. Non-markdown cells are ignored entirely.
    pub fn markdown_text(&self) -> String {
        self.cells
            .iter()
            .filter(|cell| cell.cell_type == "markdown")
            .map(|cell| cell.source.normalized())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// What happened to a tracked file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Saved,
    Created,
    Deleted,
}

/// A change notification from the host's file watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: String,
    pub kind: ChangeKind,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("malformed content at {path}: {reason}")]
    Malformed { path: String, reason: String },
    #[error("io failure at {path}: {reason}")]
    Io { path: String, reason: String },
}

/// The hierarchical file store the engine reads and writes through.
///
/// The host application owns the real implementation; the engine never
/// touches a filesystem directly. Paths are store-relative, `""` is the
/// root, and path segments are separated by `/`.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn list(&self, path: &str) -> Result<Vec<Entry>, StoreError>;
    async fn read(&self, path: &str) -> Result<Content, StoreError>;
    async fn write(&self, path: &str, text: &str) -> Result<(), StoreError>;
}

/// In-memory `ContentStore` over a path -> text map, with directories
/// inferred from path prefixes. `.ipynb` files are decoded as notebook
/// JSON on read. Backs the crate's tests and embedding hosts that have no
/// real filesystem.
#[derive(Default)]
pub struct MemoryStore {
    files: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, path: &str, text: &str) {
        self.files
            .write()
            .await
            .insert(path.to_string(), text.to_string());
    }

    pub async fn remove(&self, path: &str) {
        self.files.write().await.remove(path);
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn list(&self, path: &str) -> Result<Vec<Entry>, StoreError> {
        let files = self.files.read().await;
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path.trim_end_matches('/'))
        };

        let mut entries = Vec::new();
        let mut seen_dirs = BTreeSet::new();
        for key in files.keys() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            match rest.split_once('/') {
                Some((dir, _)) => {
                    if seen_dirs.insert(dir.to_string()) {
                        entries.push(Entry {
                            name: dir.to_string(),
                            path: format!("{}{}", prefix, dir),
                            kind: EntryKind::Directory,
                        });
                    }
                }
                None => {
                    let kind = if rest.ends_with(".ipynb") {
                        EntryKind::Notebook
                    } else {
                        EntryKind::File
                    };
                    entries.push(Entry {
                        name: rest.to_string(),
                        path: key.clone(),
                        kind,
                    });
                }
            }
        }
        Ok(entries)
    }

    async fn read(&self, path: &str) -> Result<Content, StoreError> {
        let files = self.files.read().await;
        let Some(text) = files.get(path) else {
            return Err(StoreError::NotFound(path.to_string()));
        };
        if path.ends_with(".ipynb") {
            let notebook =
                serde_json::from_str(text).map_err(|err| StoreError::Malformed {
                    path: path.to_string(),
                    reason: err.to_string(),
                })?;
            Ok(Content::Notebook(notebook))
        } else {
            Ok(Content::Text(text.clone()))
        }
    }

    async fn write(&self, path: &str, text: &str) -> Result<(), StoreError> {
        self.insert(path, text).await;
        Ok(())
    }
}
