use crate::content_store::{ContentStore, Entry, EntryKind};
use std::collections::VecDeque;
use tracing::warn;

/// External targets are never resolved against the store; callers check
/// this before resolving and render a plain external link instead.
pub fn is_external_link(target: &str) -> bool {
    target.starts_with("http://") || target.starts_with("https://")
}

/// True for the document kinds the engine tracks: markdown files and
/// notebooks.
pub(crate) fn is_document(entry: &Entry) -> bool {
    matches!(entry.kind, EntryKind::File | EntryKind::Notebook)
        && (entry.name.ends_with(".md") || entry.name.ends_with(".ipynb"))
}

/// Resolve a link target name to a store path.
///
/// A name that already contains a `.` is matched as a full filename;
/// otherwise `.md` is appended. The store tree is walked breadth-first
/// from the root and the first file or notebook entry with the target
/// name wins. Duplicate filenames in different directories therefore
/// resolve to whichever the traversal visits first -- a known limitation,
/// not something to rely on.
///
/// A directory that fails to list is logged and treated as empty; the
/// walk continues.
pub async fn resolve(store: &dyn ContentStore, name: &str) -> Option<String> {
    let target_name = if name.contains('.') {
        name.to_string()
    } else {
        format!("{}.md", name)
    };

    let mut queue = VecDeque::from([String::new()]);
    while let Some(dir) = queue.pop_front() {
        let entries = match store.list(&dir).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!("failed to list {:?} while resolving {:?}: {}", dir, name, err);
                continue;
            }
        };
        for entry in entries {
            match entry.kind {
                EntryKind::File | EntryKind::Notebook => {
                    if entry.name == target_name {
                        return Some(entry.path);
                    }
                }
                EntryKind::Directory => queue.push_back(entry.path),
            }
        }
    }
    None
}

/// Every markdown/notebook entry reachable from the root, in traversal
/// order. Shared by the index build and the backlink scan fallback; uses
/// the same treat-failures-as-empty policy as `resolve`.
pub async fn collect_documents(store: &dyn ContentStore) -> Vec<Entry> {
    let mut documents = Vec::new();
    let mut queue = VecDeque::from([String::new()]);
    while let Some(dir) = queue.pop_front() {
        let entries = match store.list(&dir).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!("failed to list {:?} while collecting documents: {}", dir, err);
                continue;
            }
        };
        for entry in entries {
            if entry.kind == EntryKind::Directory {
                queue.push_back(entry.path);
            } else if is_document(&entry) {
                documents.push(entry);
            }
        }
    }
    documents
}

/// Completion candidates for a partially typed wikilink target.
///
/// Bare markdown names (no extension) containing `prefix`
/// case-insensitively, prefix matches first, then lexicographic, at most
/// ten.
pub async fn completion_candidates(store: &dyn ContentStore, prefix: &str) -> Vec<String> {
    let prefix_lower = prefix.to_lowercase();
    let mut names: Vec<String> = collect_documents(store)
        .await
        .into_iter()
        .filter(|entry| entry.name.ends_with(".md"))
        .map(|entry| entry.name[..entry.name.len() - 3].to_string())
        .filter(|name| name.to_lowercase().contains(&prefix_lower))
        .collect();

    names.sort_by(|a, b| {
        let a_starts = a.to_lowercase().starts_with(&prefix_lower);
        let b_starts = b.to_lowercase().starts_with(&prefix_lower);
        b_starts.cmp(&a_starts).then_with(|| a.cmp(b))
    });
    names.truncate(10);
    names
}
