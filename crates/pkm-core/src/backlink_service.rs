use crate::config::EngineConfig;
use crate::content_extractor::document_text;
use crate::content_store::ContentStore;
use crate::file_resolver::collect_documents;
use crate::link_parser::parse_wikilinks;
use crate::wikilink_index::{context_window, index_key, line_number_at, Backlink, WikilinkIndex};
use tracing::debug;

/// Answer "who links to this file".
///
/// The lookup key is derived from the path (bare name for markdown, full
/// filename for notebooks). With an index the answer comes straight from
/// its backlink map; without one, `scan_backlinks` walks the corpus. An
/// empty corpus or a target nobody links to yields an empty vector.
pub async fn backlinks_to(
    store: &dyn ContentStore,
    index: Option<&WikilinkIndex>,
    config: &EngineConfig,
    path: &str,
) -> Vec<Backlink> {
    let key = index_key(path);
    match index {
        Some(index) => index
            .backlinks_of(&key)
            .into_iter()
            .map(|backlink| Backlink {
                target_file: path.to_string(),
                ..backlink
            })
            .collect(),
        None => scan_backlinks(store, config, path).await,
    }
}

/// Full-corpus fallback: parse every markdown/notebook document and
/// collect wikilinks whose target equals the lookup key, computing line
/// numbers and context with the same window rule the index uses.
/// Equivalent to an up-to-date index, modulo ordering.
pub async fn scan_backlinks(
    store: &dyn ContentStore,
    config: &EngineConfig,
    path: &str,
) -> Vec<Backlink> {
    let key = index_key(path);
    debug!("scanning corpus for backlinks to {:?}", key);

    let mut backlinks = Vec::new();
    for entry in collect_documents(store).await {
        let Some(text) = document_text(store, &entry.path).await else {
            continue;
        };
        for link in parse_wikilinks(&text) {
            if link.target == key {
                backlinks.push(Backlink {
                    source_file: entry.path.clone(),
                    target_file: path.to_string(),
                    context: context_window(&text, link.start, config.context_radius),
                    line_number: line_number_at(&text, link.start),
                });
            }
        }
    }
    backlinks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_store::MemoryStore;

    async fn store_with(files: &[(&str, &str)]) -> MemoryStore {
        let store = MemoryStore::new();
        for (path, text) in files {
            store.insert(path, text).await;
        }
        store
    }

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    #[tokio::test]
    async fn scan_finds_backlinks_with_context_and_line() {
        let store = store_with(&[
            ("Target.md", "the note everyone links to"),
            ("A.md", "intro\npoints at [[Target]]\noutro"),
            ("B.md", "unrelated [[Other]]"),
        ])
        .await;

        let backlinks = scan_backlinks(&store, &config(), "Target.md").await;
        assert_eq!(backlinks.len(), 1);
        assert_eq!(backlinks[0].source_file, "A.md");
        assert_eq!(backlinks[0].target_file, "Target.md");
        assert_eq!(backlinks[0].line_number, 2);
        assert_eq!(backlinks[0].context, "intro\npoints at [[Target]]\noutro");
    }

    #[tokio::test]
    async fn index_and_scan_agree_on_a_cross_linked_corpus() {
        let store = store_with(&[
            ("A.md", "[[B]] and [[C]]"),
            ("dir/B.md", "[[C]]\nplus [[A]]"),
            ("C.md", "[[A]] [[A]]"),
        ])
        .await;
        let cfg = config();
        let index = WikilinkIndex::build(&store, &cfg).await;

        for path in ["A.md", "dir/B.md", "C.md"] {
            let mut from_index: Vec<(String, String)> =
                backlinks_to(&store, Some(&index), &cfg, path)
                    .await
                    .into_iter()
                    .map(|b| (b.source_file, b.target_file))
                    .collect();
            let mut from_scan: Vec<(String, String)> =
                backlinks_to(&store, None, &cfg, path)
                    .await
                    .into_iter()
                    .map(|b| (b.source_file, b.target_file))
                    .collect();
            from_index.sort();
            from_scan.sort();
            assert_eq!(from_index, from_scan, "mismatch for {}", path);
        }
    }

    #[tokio::test]
    async fn index_path_fills_in_the_real_target_path() {
        let store = store_with(&[("A.md", "[[Target]]"), ("notes/Target.md", "")]).await;
        let cfg = config();
        let index = WikilinkIndex::build(&store, &cfg).await;

        let backlinks = backlinks_to(&store, Some(&index), &cfg, "notes/Target.md").await;
        assert_eq!(backlinks.len(), 1);
        assert_eq!(backlinks[0].target_file, "notes/Target.md");
    }

    #[tokio::test]
    async fn notebook_targets_are_looked_up_by_full_filename() {
        let store = store_with(&[
            ("A.md", "results in ![[analysis.ipynb#Results]] and [[analysis.ipynb]]"),
            ("analysis.ipynb", r#"{"cells": []}"#),
        ])
        .await;

        let backlinks = scan_backlinks(&store, &config(), "analysis.ipynb").await;
        assert_eq!(backlinks.len(), 1);
        assert_eq!(backlinks[0].source_file, "A.md");
    }

    #[tokio::test]
    async fn empty_corpus_returns_empty() {
        let store = MemoryStore::new();
        assert!(backlinks_to(&store, None, &config(), "orphan").await.is_empty());
    }

    #[tokio::test]
    async fn target_with_no_backlinks_returns_empty() {
        let store = store_with(&[("A.md", "[[B]]"), ("Lonely.md", "nobody links here")]).await;
        let cfg = config();
        let index = WikilinkIndex::build(&store, &cfg).await;
        assert!(backlinks_to(&store, Some(&index), &cfg, "Lonely.md")
            .await
            .is_empty());
    }
}
