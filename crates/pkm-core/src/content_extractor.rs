use crate::content_store::{Content, ContentStore};
use crate::file_resolver;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+)$").unwrap());

// Boundary check only needs the marker, not heading text
static HEADING_EDGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s").unwrap());

static BLOCK_ID_SHAPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9-_]+$").unwrap());

/// Outcome of extracting a named section for transclusion.
///
/// `found = false` means empty content; `extracted_at` is set either way.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedBlock {
    pub content: String,
    pub title: String,
    pub source_file: String,
    pub block_ref: String,
    pub extracted_at: DateTime<Utc>,
    pub found: bool,
}

/// Whether a block reference reads like a block id rather than a heading.
/// Block ids are typically kebab-case; headings are normal text. Used to
/// pick which extraction to try first -- both are still tried.
pub fn looks_like_block_id(block_ref: &str) -> bool {
    BLOCK_ID_SHAPE_RE.is_match(block_ref) && block_ref.contains('-')
}

/// Extract the section under a heading.
///
/// Heading comparison trims and case-folds both sides. The section runs
/// strictly from the line after the matched heading to the next heading
/// of equal or shallower depth, or the end of the document.
pub fn extract_by_heading(text: &str, heading: &str) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();
    let normalized = heading.trim().to_lowercase();

    let mut start = None;
    let mut depth = 0;
    for (i, line) in lines.iter().enumerate() {
        if let Some(cap) = HEADING_RE.captures(line.trim()) {
            if cap[2].trim().to_lowercase() == normalized {
                start = Some(i);
                depth = cap[1].len();
                break;
            }
        }
    }
    let start = start?;

    let mut end = lines.len();
    for (i, line) in lines.iter().enumerate().skip(start + 1) {
        if let Some(cap) = HEADING_EDGE_RE.captures(line.trim()) {
            if cap[1].len() <= depth {
                end = i;
                break;
            }
        }
    }

    Some(lines[start + 1..end].join("\n").trim().to_string())
}

/// Extract the paragraph carrying a `^block-id` marker.
///
/// The marker is a line suffix: `^` + the id + optional trailing
/// whitespace, anchored at end of line. The paragraph expands to the
/// nearest blank lines (or document bounds) and the marker is stripped
/// from whichever line carried it.
pub fn extract_by_block_id(text: &str, block_id: &str) -> Option<String> {
    let marker_re = Regex::new(&format!(r"\^{}\s*$", regex::escape(block_id))).ok()?;
    let lines: Vec<&str> = text.lines().collect();

    let marker_line = lines.iter().position(|line| marker_re.is_match(line))?;

    let mut start = 0;
    for i in (0..marker_line).rev() {
        if lines[i].trim().is_empty() {
            start = i + 1;
            break;
        }
    }
    let mut end = lines.len().saturating_sub(1);
    for (i, line) in lines.iter().enumerate().skip(marker_line + 1) {
        if line.trim().is_empty() {
            end = i - 1;
            break;
        }
    }

    let block = lines[start..=end]
        .iter()
        .map(|line| marker_re.replace(line, "").trim_end().to_string())
        .collect::<Vec<_>>()
        .join("\n");
    Some(block.trim().to_string())
}

/// Text of a document: raw content for markdown, the markdown cells'
/// concatenation for notebooks. `None` (with a warning) when the file
/// cannot be read -- never an error.
pub async fn document_text(store: &dyn ContentStore, path: &str) -> Option<String> {
    match store.read(path).await {
        Ok(Content::Text(text)) => Some(text),
        Ok(Content::Notebook(notebook)) => Some(notebook.markdown_text()),
        Err(err) => {
            warn!("could not read {:?}: {}", path, err);
            None
        }
    }
}

/// Resolve `source_file` and extract `block_ref` from it, trying block-id
/// or heading extraction first depending on what the reference looks
/// like, then falling back to the other.
pub async fn extract_block(
    store: &dyn ContentStore,
    source_file: &str,
    block_ref: &str,
) -> ExtractedBlock {
    let extracted_at = Utc::now();
    let missing = |reason: &str| {
        warn!(
            "block extraction failed for {}#{}: {}",
            source_file, block_ref, reason
        );
        ExtractedBlock {
            content: String::new(),
            title: block_ref.to_string(),
            source_file: source_file.to_string(),
            block_ref: block_ref.to_string(),
            extracted_at,
            found: false,
        }
    };

    let Some(path) = file_resolver::resolve(store, source_file).await else {
        return missing("file not found");
    };
    let Some(text) = document_text(store, &path).await else {
        return missing("file not readable");
    };

    let (content, via_block_id) = if looks_like_block_id(block_ref) {
        match extract_by_block_id(&text, block_ref) {
            Some(content) => (Some(content), true),
            None => (extract_by_heading(&text, block_ref), false),
        }
    } else {
        match extract_by_heading(&text, block_ref) {
            Some(content) => (Some(content), false),
            None => (extract_by_block_id(&text, block_ref), true),
        }
    };

    match content {
        Some(content) => {
            let title = if via_block_id {
                format!("Block: {}", block_ref)
            } else {
                block_ref.to_string()
            };
            ExtractedBlock {
                content,
                title,
                source_file: source_file.to_string(),
                block_ref: block_ref.to_string(),
                extracted_at,
                found: true,
            }
        }
        None => missing("heading or block id not found"),
    }
}
