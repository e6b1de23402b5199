
use regex::Regex;
use std::sync::LazyLock;

// Compile once, reuse across calls
static WIKILINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\]|]+)(?:\|([^\]]+))?\]\]").unwrap());

static BLOCK_EMBED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[\[([^#\]]+)#([^\]|]+)(?:\|([^\]]+))?\]\]").unwrap());

/// One parsed occurrence of `[[target]]` or `[[target|display]]`.
///
/// `start`/`end` are byte offsets into the original input; `raw` is the
/// full matched text. `target` is trimmed and never empty. An empty
/// display (`[[x|  ]]`) is represented as `None` so callers fall back to
/// the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiLink {
    pub raw: String,
    pub target: String,
    pub display: Option<String>,
    pub start: usize,
    pub end: usize,
}

/// One parsed occurrence of `![[sourceFile#blockRef]]` or
/// `![[sourceFile#blockRef|displayTitle]]`.
///
/// `source_file` may lack an extension; `block_ref` is either a heading
/// text or a block-id token -- disambiguation happens at extraction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEmbed {
    pub raw: String,
    pub source_file: String,
    pub block_ref: String,
    pub display_title: Option<String>,
    pub start: usize,
    pub end: usize,
}

/// Byte ranges covered by backtick code spans.
///
/// An opening run of N backticks pairs with the next run of exactly N
/// backticks; runs of other lengths in between are content. Unclosed runs
/// open nothing. Runs may span lines, so fenced blocks are covered too.
fn code_span_ranges(text: &str) -> Vec<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut ranges = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'`' {
            i += 1;
            continue;
        }
        let open_start = i;
        while i < bytes.len() && bytes[i] == b'`' {
            i += 1;
        }
        let open_len = i - open_start;

        let mut j = i;
        let mut close_end = None;
        while j < bytes.len() {
            if bytes[j] != b'`' {
                j += 1;
                continue;
            }
            let run_start = j;
            while j < bytes.len() && bytes[j] == b'`' {
                j += 1;
            }
            if j - run_start == open_len {
                close_end = Some(j);
                break;
            }
        }
        if let Some(end) = close_end {
            ranges.push((open_start, end));
            i = end;
        }
    }
    ranges
}

/// Returns true if the byte offset falls within any excluded range.
fn is_excluded(offset: usize, excluded: &[(usize, usize)]) -> bool {
    excluded
        .iter()
        .any(|&(start, end)| offset >= start && offset < end)
}

/// Parse wikilinks from text.
///
/// Global, non-overlapping, left-to-right. Links whose match starts inside
/// a code span are dropped. Offsets always reference the unmodified input.
pub fn parse_wikilinks(text: &str) -> Vec<WikiLink> {
    let excluded = code_span_ranges(text);
    let mut links = Vec::new();

    for cap in WIKILINK_RE.captures_iter(text) {
        let full = cap.get(0).unwrap();
        if is_excluded(full.start(), &excluded) {
            continue;
        }
        let target = cap[1].trim();
        if target.is_empty() {
            continue;
        }
        let display = cap
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .filter(|d| !d.is_empty());
        links.push(WikiLink {
            raw: full.as_str().to_string(),
            target: target.to_string(),
            display,
            start: full.start(),
            end: full.end(),
        });
    }

    links
}

/// Parse block embeds from text.
pub fn parse_block_embeds(text: &str) -> Vec<BlockEmbed> {
    let mut embeds = Vec::new();

    for cap in BLOCK_EMBED_RE.captures_iter(text) {
        let full = cap.get(0).unwrap();
        let source_file = cap[1].trim();
        let block_ref = cap[2].trim();
        if source_file.is_empty() || block_ref.is_empty() {
            continue;
        }
        let display_title = cap
            .get(3)
            .map(|m| m.as_str().trim().to_string())
            .filter(|t| !t.is_empty());
        embeds.push(BlockEmbed {
            raw: full.as_str().to_string(),
            source_file: source_file.to_string(),
            block_ref: block_ref.to_string(),
            display_title,
            start: full.start(),
            end: full.end(),
        });
    }

    embeds
}

/// A text edit: replace the bytes in `start..end` with `replacement`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub start: usize,
    pub end: usize,
    pub replacement: String,
}

/// Apply non-overlapping edits, ordered by ascending start offset, to text.
///
/// Edit offsets reference the original text; a running length delta keeps
/// later splice positions correct as earlier replacements grow or shrink.
/// This is the only place that offset arithmetic lives -- wikilink and
/// block-embed rewriting both go through it.
pub fn apply_edits(text: &str, edits: &[TextEdit]) -> String {
    let mut out = text.to_string();
    let mut delta: isize = 0;

    for edit in edits {
        debug_assert!(edit.start <= edit.end);
        let start = (edit.start as isize + delta) as usize;
        let end = (edit.end as isize + delta) as usize;
        out.replace_range(start..end, &edit.replacement);
        delta += edit.replacement.len() as isize - (edit.end - edit.start) as isize;
    }

    out
}
