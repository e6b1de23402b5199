use crate::config::EngineConfig;
use crate::content_extractor::document_text;
use crate::content_store::{ChangeEvent, ChangeKind, Content, ContentStore};
use crate::file_resolver::collect_documents;
use crate::link_parser::parse_wikilinks;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{Duration, Instant};
use tracing::{error, info, warn};

/// One answer to "who links to this target": constructed on demand from
/// index entries or a live scan, never persisted itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Backlink {
    pub source_file: String,
    pub target_file: String,
    pub context: String,
    pub line_number: usize,
}

/// Stored snippet for one (source, target) pair: the last-seen
/// occurrence's surrounding lines and its 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkContext {
    pub context: String,
    pub line: usize,
}

/// The persisted forward/backward link structure.
///
/// - `links`: source path -> target names it references, in document order.
/// - `backlinks`: target name -> source paths, one entry per occurrence
///   (a file linking to the same target twice contributes two entries).
/// - `contexts`: source path -> target name -> snippet of the last
///   occurrence.
///
/// Invariant: `target` appears in `links[source]` iff `source` appears in
/// `backlinks[target]`, with matching multiplicity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikilinkIndex {
    pub links: HashMap<String, Vec<String>>,
    pub backlinks: HashMap<String, Vec<String>>,
    pub contexts: HashMap<String, HashMap<String, LinkContext>>,
    #[serde(rename = "lastUpdated")]
    pub last_updated: DateTime<Utc>,
}

/// Lookup key for a document path: bare name (no directory, no extension)
/// for markdown, the full filename for notebooks. The asymmetry reflects
/// how authors write links -- `[[Note]]` vs `[[analysis.ipynb]]`.
pub fn index_key(path: &str) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    if name.ends_with(".ipynb") {
        name.to_string()
    } else {
        match name.rfind('.') {
            Some(dot) => name[..dot].to_string(),
            None => name.to_string(),
        }
    }
}

/// 1-based line number of a byte offset.
pub(crate) fn line_number_at(text: &str, offset: usize) -> usize {
    text[..offset].matches('\n').count() + 1
}

/// Context window around the line holding `offset`: `radius` lines either
/// side, clipped at document bounds, joined and trimmed.
pub(crate) fn context_window(text: &str, offset: usize, radius: usize) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let position = line_number_at(text, offset) - 1;
    let start = position.saturating_sub(radius);
    let end = (position + radius).min(lines.len().saturating_sub(1));
    lines[start..=end].join("\n").trim().to_string()
}

impl WikilinkIndex {
    pub fn new() -> Self {
        WikilinkIndex {
            links: HashMap::new(),
            backlinks: HashMap::new(),
            contexts: HashMap::new(),
            last_updated: Utc::now(),
        }
    }

    /// Full corpus walk. Single-file failures are logged and skipped;
    /// the build never aborts on one bad file.
    pub async fn build(store: &dyn ContentStore, config: &EngineConfig) -> Self {
        let mut index = WikilinkIndex::new();
        let documents = collect_documents(store).await;
        info!("building wikilink index over {} documents", documents.len());
        for entry in &documents {
            index
                .insert_file_links(store, &entry.path, config.context_radius)
                .await;
        }
        index.last_updated = Utc::now();
        index
    }

    /// Index one file's wikilinks into all three maps.
    async fn insert_file_links(&mut self, store: &dyn ContentStore, path: &str, radius: usize) {
        let Some(text) = document_text(store, path).await else {
            return;
        };
        for link in parse_wikilinks(&text) {
            self.links
                .entry(path.to_string())
                .or_default()
                .push(link.target.clone());
            self.backlinks
                .entry(link.target.clone())
                .or_default()
                .push(path.to_string());
            let line = line_number_at(&text, link.start);
            let context = context_window(&text, link.start, radius);
            self.contexts
                .entry(path.to_string())
                .or_default()
                .insert(link.target, LinkContext { context, line });
        }
    }

    /// Purge every contribution a file made: its `links` entry, each of
    /// its occurrences in `backlinks` (pruning targets left with no
    /// sources), and its `contexts` entries.
    pub fn remove_file(&mut self, path: &str) {
        if let Some(targets) = self.links.remove(path) {
            for target in targets {
                if let Some(sources) = self.backlinks.get_mut(&target) {
                    sources.retain(|source| source != path);
                    if sources.is_empty() {
                        self.backlinks.remove(&target);
                    }
                }
            }
        }
        self.contexts.remove(path);
        self.last_updated = Utc::now();
    }

    /// Incremental update for one saved file: remove its prior
    /// contributions, then re-index its current content. Equivalent to
    /// what a fresh build would record for it.
    pub async fn update(&mut self, store: &dyn ContentStore, config: &EngineConfig, path: &str) {
        self.remove_file(path);
        self.insert_file_links(store, path, config.context_radius).await;
        self.last_updated = Utc::now();
    }

    /// Serialize to the well-known side file.
    pub async fn persist(
        &self,
        store: &dyn ContentStore,
        config: &EngineConfig,
    ) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        store.write(&config.index_path, &json).await?;
        Ok(())
    }

    /// Load the persisted index. `None` -- missing side file, or one that
    /// fails to parse -- means the caller should rebuild from scratch.
    pub async fn load(store: &dyn ContentStore, config: &EngineConfig) -> Option<Self> {
        match store.read(&config.index_path).await {
            Ok(Content::Text(json)) => match serde_json::from_str(&json) {
                Ok(index) => Some(index),
                Err(err) => {
                    warn!("malformed wikilink index, rebuilding: {}", err);
                    None
                }
            },
            Ok(Content::Notebook(_)) => {
                warn!("wikilink index file has unexpected content, rebuilding");
                None
            }
            Err(err) => {
                info!("no persisted wikilink index ({}), building fresh", err);
                None
            }
        }
    }

    /// Backlinks for a lookup key, joined with their stored contexts.
    /// A missing context entry yields an empty snippet at line 1 rather
    /// than failing.
    pub fn backlinks_of(&self, target: &str) -> Vec<Backlink> {
        let Some(sources) = self.backlinks.get(target) else {
            return Vec::new();
        };
        sources
            .iter()
            .map(|source| {
                let context = self
                    .contexts
                    .get(source)
                    .and_then(|targets| targets.get(target));
                Backlink {
                    source_file: source.clone(),
                    target_file: target.to_string(),
                    context: context.map(|c| c.context.clone()).unwrap_or_default(),
                    line_number: context.map(|c| c.line).unwrap_or(1),
                }
            })
            .collect()
    }

    /// Ordered outgoing targets recorded for a source file.
    pub fn links_from(&self, path: &str) -> Vec<String> {
        self.links.get(path).cloned().unwrap_or_default()
    }
}

impl Default for WikilinkIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// The single serialized writer for the index.
///
/// File-change notifications enter through `on_file_change`, coalesce in
/// a pending set while bursts settle, and are applied one at a time by
/// `run_worker`. The index lives behind a mutex and every mutation runs
/// to completion -- and is persisted -- before the next one starts.
pub struct IndexService {
    store: Arc<dyn ContentStore>,
    config: EngineConfig,
    index: Arc<Mutex<Option<WikilinkIndex>>>,
    pending: Arc<DashMap<String, Instant>>,
    change_tx: mpsc::Sender<ChangeEvent>,
}

impl IndexService {
    pub fn new(
        store: Arc<dyn ContentStore>,
        config: EngineConfig,
    ) -> (Self, mpsc::Receiver<ChangeEvent>) {
        let (change_tx, change_rx) = mpsc::channel(1000);
        (
            Self {
                store,
                config,
                index: Arc::new(Mutex::new(None)),
                pending: Arc::new(DashMap::new()),
                change_tx,
            },
            change_rx,
        )
    }

    /// Whether a path participates in the index at all. The side file
    /// itself is excluded, otherwise persisting would feed the queue
    /// forever.
    fn is_tracked(&self, path: &str) -> bool {
        path != self.config.index_path
            && (path.ends_with(".md") || path.ends_with(".ipynb"))
    }

    /// Queue a change for indexing. Repeat notifications for a path that
    /// is already pending only refresh its debounce timestamp; the
    /// entry-based check-and-insert avoids double-sending on concurrent
    /// calls.
    pub async fn on_file_change(&self, path: &str, kind: ChangeKind) {
        use dashmap::mapref::entry::Entry;

        if !self.is_tracked(path) {
            return;
        }
        let is_new = match self.pending.entry(path.to_string()) {
            Entry::Occupied(mut entry) => {
                entry.insert(Instant::now());
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(Instant::now());
                true
            }
        };
        if is_new {
            let event = ChangeEvent {
                path: path.to_string(),
                kind,
            };
            if let Err(err) = self.change_tx.send(event).await {
                error!(
                    "index service channel send failed (receiver dropped -- worker dead?): {}",
                    err
                );
            }
        }
    }

    fn is_ready(&self, path: &str, debounce: Duration) -> bool {
        match self.pending.get(path) {
            Some(entry) => entry.elapsed() >= debounce,
            None => false,
        }
    }

    fn mark_indexed(&self, path: &str) {
        self.pending.remove(path);
    }

    /// Load the persisted index, or build (and persist) a fresh one.
    /// Idempotent; cheap after the first call.
    pub async fn ensure_loaded(&self) {
        let mut guard = self.index.lock().await;
        if guard.is_some() {
            return;
        }
        let index = match WikilinkIndex::load(self.store.as_ref(), &self.config).await {
            Some(index) => index,
            None => {
                let index = WikilinkIndex::build(self.store.as_ref(), &self.config).await;
                if let Err(err) = index.persist(self.store.as_ref(), &self.config).await {
                    error!("failed to persist freshly built index: {}", err);
                }
                index
            }
        };
        *guard = Some(index);
    }

    /// Backlinks for a lookup key, from the in-memory index.
    pub async fn backlinks_of(&self, target: &str) -> Vec<Backlink> {
        let guard = self.index.lock().await;
        match guard.as_ref() {
            Some(index) => index.backlinks_of(target),
            None => Vec::new(),
        }
    }

    /// A point-in-time copy of the index, if one is loaded.
    pub async fn snapshot(&self) -> Option<WikilinkIndex> {
        self.index.lock().await.clone()
    }

    /// Apply one change and persist. Saves and creates re-index the file;
    /// deletes purge it. An update on a file that turns out to be
    /// unreadable degrades to a purge, which is what a deletion coalesced
    /// into an earlier save also needs.
    async fn apply(&self, event: &ChangeEvent) {
        let mut guard = self.index.lock().await;
        let Some(index) = guard.as_mut() else {
            return;
        };
        match event.kind {
            ChangeKind::Saved | ChangeKind::Created => {
                index.update(self.store.as_ref(), &self.config, &event.path).await;
            }
            ChangeKind::Deleted => index.remove_file(&event.path),
        }
        if let Err(err) = index.persist(self.store.as_ref(), &self.config).await {
            error!("failed to persist wikilink index: {}", err);
        }
    }

    /// Background worker that drains the change queue.
    ///
    /// Each event waits until no further notification for its path has
    /// arrived for a full debounce interval (typing produces rapid save
    /// bursts), then is applied. Events are processed strictly one at a
    /// time.
    pub async fn run_worker(self: Arc<Self>, mut rx: mpsc::Receiver<ChangeEvent>) {
        info!("wikilink index worker started");
        self.ensure_loaded().await;
        let debounce = Duration::from_millis(self.config.debounce_ms);

        while let Some(event) = rx.recv().await {
            loop {
                tokio::time::sleep(debounce).await;
                if self.is_ready(&event.path, debounce) {
                    break;
                }
                if !self.pending.contains_key(&event.path) {
                    break;
                }
            }
            if !self.pending.contains_key(&event.path) {
                continue;
            }
            self.apply(&event).await;
            self.mark_indexed(&event.path);
        }
    }
}
