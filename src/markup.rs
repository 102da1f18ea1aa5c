use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

static BOLD_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
static UNDERLINE_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
static ITALIC_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
static LIST_ITEM_REGEX: OnceLock<Option<Regex>> = OnceLock::new();

fn bold_regex() -> Option<&'static Regex> {
    BOLD_REGEX
        .get_or_init(|| Regex::new(r"^(?:\*\*(.+?)\*\*|__(.+?)__)").ok())
        .as_ref()
}

fn underline_regex() -> Option<&'static Regex> {
    UNDERLINE_REGEX
        .get_or_init(|| Regex::new(r"^~~(.+?)~~").ok())
        .as_ref()
}

fn italic_regex() -> Option<&'static Regex> {
    ITALIC_REGEX
        .get_or_init(|| Regex::new(r"^(?:\*(.+?)\*|_(.+?)_)").ok())
        .as_ref()
}

fn list_item_regex() -> Option<&'static Regex> {
    LIST_ITEM_REGEX
        .get_or_init(|| Regex::new(r"^(?:[-*+•·–—▪◦]|\d+[.)])\s").ok())
        .as_ref()
}

/// A character of a line once the inline markup has been stripped, with the emphasis it
/// inherited from the spans around it. Italic spans carry no flag, they are only unwrapped.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct StyledChar {
    pub character: char,
    pub bold: bool,
    pub underline: bool,
}

impl StyledChar {
    pub fn plain(character: char) -> Self {
        StyledChar {
            character,
            bold: false,
            underline: false,
        }
    }
}

pub fn plain_text(characters: &[StyledChar]) -> String {
    characters.iter().map(|styled| styled.character).collect()
}

/// Splits the text on blank lines and on newlines directly followed by content. A newline
/// followed by indentation stays inside its paragraph. Runs of blank lines count as a single
/// break, and the pieces are returned untrimmed.
pub fn split_paragraphs(text: &str) -> Vec<&str> {
    let mut paragraphs = Vec::new();
    let mut start = 0;
    let mut index = 0;

    while index < text.len() {
        let rest = &text[index..];
        if !rest.starts_with('\n') {
            index += rest.chars().next().map_or(1, char::len_utf8);
            continue;
        }

        let after_newline = &rest[1..];
        let whitespace_length = after_newline
            .char_indices()
            .find(|(_, character)| !character.is_whitespace())
            .map_or(after_newline.len(), |(offset, _)| offset);
        let whitespace_run = &after_newline[..whitespace_length];

        if let Some(last_newline) = whitespace_run.rfind('\n') {
            paragraphs.push(&text[start..index]);
            start = index + 1 + last_newline + 1;
            index = start;
        } else if whitespace_length == 0 && !after_newline.is_empty() {
            paragraphs.push(&text[start..index]);
            start = index + 1;
            index = start;
        } else {
            index += 1;
        }
    }
    paragraphs.push(&text[start..]);

    paragraphs
}

/// Strips `**bold**`, `__bold__`, `~~underline~~`, `*italic*` and `_italic_` delimiters.
/// Spans nest, an unmatched delimiter is kept as a literal character.
pub fn parse_inline(line: &str) -> Vec<StyledChar> {
    let mut characters = Vec::with_capacity(line.len());
    parse_into(line, false, false, &mut characters);
    characters
}

fn parse_into(text: &str, bold: bool, underline: bool, output: &mut Vec<StyledChar>) {
    let mut index = 0;
    while index < text.len() {
        let rest = &text[index..];

        if let Some(captures) = bold_regex().and_then(|regex| regex.captures(rest)) {
            let inner = captures.get(1).or_else(|| captures.get(2));
            if let (Some(whole), Some(inner)) = (captures.get(0), inner) {
                parse_into(inner.as_str(), true, underline, output);
                index += whole.end();
                continue;
            }
        }

        if let Some(captures) = underline_regex().and_then(|regex| regex.captures(rest)) {
            if let (Some(whole), Some(inner)) = (captures.get(0), captures.get(1)) {
                parse_into(inner.as_str(), bold, true, output);
                index += whole.end();
                continue;
            }
        }

        if let Some(captures) = italic_regex().and_then(|regex| regex.captures(rest)) {
            let inner = captures.get(1).or_else(|| captures.get(2));
            if let (Some(whole), Some(inner)) = (captures.get(0), inner) {
                // An unterminated bold opener must not be read as an italic span
                if !whole.as_str().starts_with("**") {
                    parse_into(inner.as_str(), bold, underline, output);
                    index += whole.end();
                    continue;
                }
            }
        }

        let Some(character) = rest.chars().next() else {
            break;
        };
        output.push(StyledChar {
            character,
            bold,
            underline,
        });
        index += character.len_utf8();
    }
}

/// Whether the paragraph starts with a bullet or a numbered marker followed by a space.
pub fn is_list_item(paragraph: &str) -> bool {
    let first_line = paragraph.trim().lines().next().unwrap_or_default();
    list_item_regex().is_some_and(|regex| regex.is_match(first_line))
}
