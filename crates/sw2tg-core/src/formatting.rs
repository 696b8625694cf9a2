//! Telegram MarkdownV2 formatting: escaping, block splitting and the workout
//! message composer.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::workouts::WorkoutItem;

/// First message of every composed day.
pub const LEADING_GLYPH: &str = "📅";

const EMPTY_DAY: &str = "Nada aqui...";
const NOTES_MAX_LEN: usize = 2048;
const NOTES_TOO_LONG: &str =
    "\\(existen notas para el atleta, pero es demasiado para ingresarlo aqui\\)";

// https://core.telegram.org/bots/api#markdownv2-style
fn reserved_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([-_*\]\[()>~`#+=|{}.!])").expect("valid regex"))
}

/// Escape text for Telegram MarkdownV2.
///
/// Input and output are trimmed. Every reserved character gets its own
/// backslash, so escaping twice is not a no-op.
pub fn escape_markdown_v2(text: &str) -> String {
    reserved_chars()
        .replace_all(text.trim(), r"\${1}")
        .trim()
        .to_string()
}

/// Extract the `src` URL from an embed snippet like `<iframe ... src="https://..." ...>`.
///
/// An empty `src=""` counts as no link, so no empty video line is rendered.
pub fn extract_src_link(embed_html: &str) -> Option<&str> {
    const MARKER: &str = "src=\"";
    let start = embed_html.find(MARKER)? + MARKER.len();
    let rest = &embed_html[start..];
    let end = rest.find('"')?;
    let link = &rest[..end];
    if link.is_empty() {
        None
    } else {
        Some(link)
    }
}

/// Length as Telegram counts it (UTF-16 code units).
pub fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Accumulates text segments into blocks no longer than `max_len`.
///
/// A segment that does not fit in the current block starts a new one.
/// Segments longer than `max_len` on their own are cut across fresh blocks.
#[derive(Debug)]
pub struct BlockBuilder {
    max_len: usize,
    blocks: Vec<String>,
}

impl BlockBuilder {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len: max_len.max(2),
            blocks: vec![String::new()],
        }
    }

    /// Close the current block; the next segment starts a new one.
    pub fn break_block(&mut self) {
        if self.blocks.last().is_some_and(|b| !b.is_empty()) {
            self.blocks.push(String::new());
        }
    }

    pub fn push(&mut self, segment: &str) {
        let mut rest = segment;
        while !rest.is_empty() {
            let current_len = self.blocks.last().map(|b| utf16_len(b)).unwrap_or(0);
            if current_len + utf16_len(rest) <= self.max_len {
                self.current().push_str(rest);
                return;
            }
            if current_len > 0 {
                self.blocks.push(String::new());
                continue;
            }

            let cut = cut_index(rest, self.max_len);
            self.current().push_str(&rest[..cut]);
            rest = &rest[cut..];
        }
    }

    pub fn finish(mut self) -> Vec<String> {
        if self.blocks.len() > 1 && self.blocks.last().is_some_and(|b| b.is_empty()) {
            self.blocks.pop();
        }
        self.blocks
    }

    fn current(&mut self) -> &mut String {
        if self.blocks.is_empty() {
            self.blocks.push(String::new());
        }
        let last = self.blocks.len() - 1;
        &mut self.blocks[last]
    }
}

/// Byte index of the longest prefix that fits in `budget` UTF-16 units,
/// never separating an escape backslash from the character it escapes.
fn cut_index(text: &str, budget: usize) -> usize {
    let mut units = 0usize;
    let mut cut = 0usize;
    for (idx, ch) in text.char_indices() {
        let width = ch.len_utf16();
        if units + width > budget {
            break;
        }
        units += width;
        cut = idx + ch.len_utf8();
    }

    if cut < text.len() && cut > 1 && text[..cut].ends_with('\\') {
        cut -= 1;
    }
    if cut == 0 {
        // Budget smaller than a single char: take it anyway.
        cut = text.chars().next().map(char::len_utf8).unwrap_or(text.len());
    }
    cut
}

/// Builds the MarkdownV2 messages announcing one track's workouts for a day.
#[derive(Clone, Copy, Debug)]
pub struct MessageComposer {
    max_len: usize,
}

impl MessageComposer {
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn compose(&self, track: &str, date: NaiveDate, items: &[WorkoutItem]) -> Vec<String> {
        let mut blocks = BlockBuilder::new(self.max_len);
        blocks.push(LEADING_GLYPH);
        blocks.break_block();

        let title = format!("{} {}", track.trim(), date);
        blocks.push(&format!("*{}*", escape_markdown_v2(&title)));

        if items.is_empty() {
            blocks.push("\n");
            blocks.push(&escape_markdown_v2(EMPTY_DAY));
            return blocks.finish();
        }

        let total = items.len();
        for (idx, item) in items.iter().enumerate() {
            let count = idx + 1;
            blocks.push(&format!(
                "\n\n*\\[{count}/{total}\\] {}*",
                escape_markdown_v2(item.title.as_deref().unwrap_or_default())
            ));

            if let Some(link) = item.youtube_embed_html().and_then(extract_src_link) {
                blocks.push(&format!("\n**>Video: {}||", escape_markdown_v2(link)));
            }

            if let Some(description) = item.description.as_deref().filter(|d| has_text(d)) {
                blocks.push(&expandable_quote("", description));
            }

            if let Some(notes) = item.athletes_notes.as_deref().filter(|n| has_text(n)) {
                if utf16_len(notes) > NOTES_MAX_LEN {
                    blocks.push(&format!("\n{NOTES_TOO_LONG}"));
                } else {
                    blocks.push(&expandable_quote("Notas para el atleta:\n>", notes));
                }
            }

            tracing::info!("Building msg {track} {date} {count}/{total}");
        }

        blocks.finish()
    }
}

fn has_text(s: &str) -> bool {
    !s.trim().is_empty()
}

/// `**>` opens an expandable block quotation, `||` closes it; every inner
/// line must start with `>`.
fn expandable_quote(heading: &str, raw: &str) -> String {
    let escaped = escape_markdown_v2(raw);
    let body = escaped.trim_end_matches('\n').replace('\n', "\n>");
    format!("\n**>{heading}{body}||")
}
