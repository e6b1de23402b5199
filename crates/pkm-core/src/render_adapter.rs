use crate::content_extractor::{extract_block, ExtractedBlock};
use crate::content_store::ContentStore;
use crate::file_resolver::{is_external_link, resolve};
use crate::link_parser::{apply_edits, parse_block_embeds, parse_wikilinks, TextEdit};

/// Replace every wikilink with an anchor marker the host renderer can
/// attach click behavior to.
///
/// Resolved links carry the target path in `data-path`; broken links are
/// visually distinct and carry the raw target in `data-target` so the
/// host can offer click-to-create. `http(s)://` targets bypass resolution
/// and render as plain external links. Resolution failure is never an
/// error here -- it degrades to the broken marker.
pub async fn rewrite_wikilinks(store: &dyn ContentStore, text: &str) -> String {
    let mut edits = Vec::new();

    for link in parse_wikilinks(text) {
        let display = link.display.clone().unwrap_or_else(|| link.target.clone());
        let replacement = if is_external_link(&link.target) {
            format!(r#"<a href="{}">{}</a>"#, link.target, display)
        } else {
            match resolve(store, &link.target).await {
                Some(path) => format!(
                    r##"<a href="#" class="pkm-wikilink" data-path="{}">{}</a>"##,
                    path, display
                ),
                None => format!(
                    r##"<a href="#" class="pkm-wikilink pkm-wikilink-broken" data-target="{}">{}</a>"##,
                    link.target, display
                ),
            }
        };
        edits.push(TextEdit {
            start: link.start,
            end: link.end,
            replacement,
        });
    }

    apply_edits(text, &edits)
}

/// Replace every block embed with its extracted content, wrapped in a
/// visual container that shows where it came from and when it was pulled.
pub async fn rewrite_block_embeds(store: &dyn ContentStore, text: &str) -> String {
    let mut edits = Vec::new();

    for embed in parse_block_embeds(text) {
        let block = extract_block(store, &embed.source_file, &embed.block_ref).await;
        edits.push(TextEdit {
            start: embed.start,
            end: embed.end,
            replacement: render_embed_block(&block, embed.display_title.as_deref()),
        });
    }

    apply_edits(text, &edits)
}

/// Markdown container for one extracted block. Found blocks get rule
/// separators, a source header, and the extraction timestamp; missing
/// blocks degrade to a visible notice instead of failing the render.
fn render_embed_block(block: &ExtractedBlock, display_title: Option<&str>) -> String {
    if !block.found {
        return format!(
            "\n> **❌ {}#{}**\n> \n> *Block not found*\n",
            block.source_file, block.block_ref
        );
    }

    let title = display_title.unwrap_or(&block.title);
    let timestamp = block.extracted_at.format("%Y-%m-%d %H:%M:%S");
    let header = format!(
        "**📄 {}#{}** *(🕒 {})*",
        block.source_file, title, timestamp
    );
    let content = block
        .content
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("\n---\n\n{}\n\n{}\n\n---\n", header, content)
}

/// Prepare a document for display: inline block embeds first, then turn
/// the remaining wikilinks into markers -- the same order the host's
/// renderer chain applies them.
pub async fn render_document(store: &dyn ContentStore, text: &str) -> String {
    let with_embeds = rewrite_block_embeds(store, text).await;
    rewrite_wikilinks(store, &with_embeds).await
}

/// Where a note created from a broken link should live: next to the
/// document the link was clicked in.
pub fn new_note_path(current_path: &str, target: &str) -> String {
    match current_path.rfind('/') {
        Some(slash) => format!("{}/{}.md", &current_path[..slash], target),
        None => format!("{}.md", target),
    }
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

    // === rewrite_wikilinks tests ===

    #[tokio::test]
    async fn resolved_link_carries_data_path() {
        let store = store_with(&[("notes/Target.md", "")]).await;
        let out = rewrite_wikilinks(&store, "see [[Target]]").await;
        assert_eq!(
            out,
            r##"see <a href="#" class="pkm-wikilink" data-path="notes/Target.md">Target</a>"##
        );
    }

    #[tokio::test]
    async fn broken_link_carries_data_target() {
        let store = MemoryStore::new();
        let out = rewrite_wikilinks(&store, "see [[Ghost]]").await;
        assert_eq!(
            out,
            r##"see <a href="#" class="pkm-wikilink pkm-wikilink-broken" data-target="Ghost">Ghost</a>"##
        );
    }

    #[tokio::test]
    async fn display_text_overrides_target() {
        let store = store_with(&[("Target.md", "")]).await;
        let out = rewrite_wikilinks(&store, "[[Target|the note]]").await;
        assert!(out.contains(">the note</a>"));
        assert!(!out.contains(">Target</a>"));
    }

    #[tokio::test]
    async fn external_target_bypasses_resolution() {
        let store = MemoryStore::new();
        let out = rewrite_wikilinks(&store, "[[https://example.com/page|docs]]").await;
        assert_eq!(out, r#"<a href="https://example.com/page">docs</a>"#);
    }

    #[tokio::test]
    async fn two_links_of_different_lengths_splice_cleanly() {
        let store = store_with(&[("A.md", ""), ("B.md", "")]).await;
        let out = rewrite_wikilinks(&store, "x [[A]] y [[B|much longer display]] z!").await;
        assert_eq!(
            out,
            concat!(
                "x ",
                r##"<a href="#" class="pkm-wikilink" data-path="A.md">A</a>"##,
                " y ",
                r##"<a href="#" class="pkm-wikilink" data-path="B.md">much longer display</a>"##,
                " z!"
            )
        );
    }

    #[tokio::test]
    async fn code_span_links_are_left_alone() {
        let store = store_with(&[("A.md", "")]).await;
        let out = rewrite_wikilinks(&store, "`[[A]]` stays, [[A]] changes").await;
        assert!(out.starts_with("`[[A]]` stays, "));
        assert!(out.contains("data-path=\"A.md\""));
    }

    // === rewrite_block_embeds tests ===

    #[tokio::test]
    async fn found_embed_is_inlined_with_header() {
        let store = store_with(&[("Source.md", "# Intro\nkey paragraph\n# Next\n")]).await;
        let out = rewrite_block_embeds(&store, "before ![[Source#Intro]] after").await;

        assert!(out.starts_with("before \n---\n\n**📄 Source#Intro** *(🕒 "));
        assert!(out.contains("\n\nkey paragraph\n\n---\n after"));
    }

    #[tokio::test]
    async fn embed_display_title_overrides_extracted_title() {
        let store = store_with(&[("Source.md", "# Intro\nbody\n")]).await;
        let out = rewrite_block_embeds(&store, "![[Source#Intro|Shown Title]]").await;
        assert!(out.contains("**📄 Source#Shown Title**"));
    }

    #[tokio::test]
    async fn missing_embed_renders_not_found_notice() {
        let store = MemoryStore::new();
        let out = rewrite_block_embeds(&store, "![[Ghost#nothing]]").await;
        assert_eq!(out, "\n> **❌ Ghost#nothing**\n> \n> *Block not found*\n");
    }

    #[tokio::test]
    async fn embed_content_lines_are_spread_into_paragraphs() {
        let store = store_with(&[("Source.md", "# S\nline one\nline two\n")]).await;
        let out = rewrite_block_embeds(&store, "![[Source#S]]").await;
        assert!(out.contains("line one\n\nline two"));
    }

    // === render_document tests ===

    #[tokio::test]
    async fn embeds_are_processed_before_wikilinks() {
        let store = store_with(&[("Source.md", "# S\nsee [[Linked]]\n"), ("Linked.md", "")]).await;
        let out = render_document(&store, "![[Source#S]]").await;

        // The embedded content's own wikilink ends up marked too.
        assert!(out.contains(r#"data-path="Linked.md""#));
        assert!(out.contains("**📄 Source#S**"));
    }

    #[tokio::test]
    async fn plain_document_passes_through() {
        let store = MemoryStore::new();
        assert_eq!(
            render_document(&store, "just text, no links").await,
            "just text, no links"
        );
    }

    // === new_note_path tests ===

    #[test]
    fn new_note_lands_next_to_current_document() {
        assert_eq!(new_note_path("notes/Current.md", "Fresh"), "notes/Fresh.md");
    }

    #[test]
    fn new_note_at_root_has_no_directory() {
        assert_eq!(new_note_path("Current.md", "Fresh"), "Fresh.md");
    }
}
