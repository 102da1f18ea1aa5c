use serde::Serialize;

use crate::geometry::{Margins, PageGeometry};
use crate::markup::{self, StyledChar};

/// Width of a piece of text in millimeters, as laid out with the base font.
pub trait Measure {
    fn width(&self, text: &str) -> f32;
}

impl<F> Measure for F
where
    F: Fn(&str) -> f32,
{
    fn width(&self, text: &str) -> f32 {
        self(text)
    }
}

/// A line placed on its page. The baseline is measured from the top of the page and `x` from
/// its left edge, both in millimeters.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ComposedLine {
    pub x: f32,
    pub baseline: f32,
    pub characters: Vec<StyledChar>,
}

impl ComposedLine {
    pub fn text(&self) -> String {
        markup::plain_text(&self.characters)
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ComposedPage {
    /// 1-based.
    pub number: usize,
    pub margins: Margins,
    pub lines: Vec<ComposedLine>,
}

/// The line breaks and page breaks of a text, before any font is chosen for its characters.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ComposedDocument {
    pub geometry: PageGeometry,
    pub pages: Vec<ComposedPage>,
}

impl ComposedDocument {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn line_count(&self) -> usize {
        self.pages.iter().map(|page| page.lines.len()).sum()
    }

    /// The text of every line, page by page.
    pub fn structure(&self) -> Vec<Vec<String>> {
        self.pages
            .iter()
            .map(|page| page.lines.iter().map(ComposedLine::text).collect())
            .collect()
    }
}

/// The vertical cursor and the pages filled so far.
struct Composer<'a> {
    geometry: &'a PageGeometry,
    pages: Vec<ComposedPage>,
    cursor: f32,
}

impl<'a> Composer<'a> {
    fn new(geometry: &'a PageGeometry) -> Self {
        Composer {
            geometry,
            pages: vec![ComposedPage {
                number: 1,
                margins: geometry.margins(1),
                lines: Vec::new(),
            }],
            cursor: geometry.first_baseline(),
        }
    }

    fn advance(&mut self, distance: f32) {
        self.cursor += distance;
    }

    fn emit(&mut self, characters: Vec<StyledChar>) {
        if self.cursor > self.geometry.bottom_limit() {
            let number = self.pages.len() + 1;
            log::debug!("Breaking to page {number}");
            self.pages.push(ComposedPage {
                number,
                margins: self.geometry.margins(number),
                lines: Vec::new(),
            });
            self.cursor = self.geometry.first_baseline();
        }

        let baseline = self.cursor;
        if let Some(page) = self.pages.last_mut() {
            page.lines.push(ComposedLine {
                x: page.margins.left,
                baseline,
                characters,
            });
        }
        self.advance(self.geometry.line_height);
    }

    fn finish(self) -> Vec<ComposedPage> {
        self.pages
    }
}

/// Breaks the text into lines and pages. Pure and deterministic: the same text, geometry and
/// measure always give the same document.
pub fn compose<M: Measure + ?Sized>(
    text: &str,
    geometry: &PageGeometry,
    measure: &M,
) -> ComposedDocument {
    let mut composer = Composer::new(geometry);
    let max_width = geometry.text_width();
    let paragraphs = markup::split_paragraphs(text);

    for (index, paragraph) in paragraphs.iter().enumerate() {
        if paragraph.trim().is_empty() {
            composer.advance(geometry.paragraph_spacing);
            continue;
        }

        for line in paragraph.trim().split('\n') {
            if line.trim().is_empty() {
                composer.advance(geometry.line_height);
                continue;
            }
            let characters = markup::parse_inline(line);
            for wrapped in wrap_words(&characters, max_width, measure) {
                composer.emit(wrapped);
            }
        }

        // Consecutive list items stay packed, one line height apart
        let next_is_list_item = paragraphs
            .get(index + 1)
            .is_some_and(|next| markup::is_list_item(next));
        if !(markup::is_list_item(paragraph) && next_is_list_item) {
            composer.advance(geometry.paragraph_spacing);
        }
    }

    ComposedDocument {
        geometry: geometry.clone(),
        pages: composer.finish(),
    }
}

/// Splits styled characters on whitespace, dropping the whitespace.
fn split_words(characters: &[StyledChar]) -> Vec<&[StyledChar]> {
    characters
        .split(|styled| styled.character.is_whitespace())
        .filter(|word| !word.is_empty())
        .collect()
}

/// Greedy wrap. A word is accounted with its trailing space, and a word wider than the whole
/// line is packed character by character over as many lines as it needs.
fn wrap_words<M: Measure + ?Sized>(
    characters: &[StyledChar],
    max_width: f32,
    measure: &M,
) -> Vec<Vec<StyledChar>> {
    let mut lines = Vec::new();
    let mut current_line: Vec<&[StyledChar]> = Vec::new();
    let mut current_width = 0.0;

    for word in split_words(characters) {
        let text = markup::plain_text(word);
        let word_width = measure.width(&format!("{text} "));

        if measure.width(&text) > max_width {
            if !current_line.is_empty() {
                lines.push(join_words(&current_line));
                current_line.clear();
            }
            lines.extend(pack_characters(word, max_width, measure));
            current_width = 0.0;
        } else if current_width + word_width <= max_width {
            current_line.push(word);
            current_width += word_width;
        } else {
            if !current_line.is_empty() {
                lines.push(join_words(&current_line));
            }
            current_line = vec![word];
            current_width = word_width;
        }
    }
    if !current_line.is_empty() {
        lines.push(join_words(&current_line));
    }

    lines
}

fn pack_characters<M: Measure + ?Sized>(
    word: &[StyledChar],
    max_width: f32,
    measure: &M,
) -> Vec<Vec<StyledChar>> {
    let mut lines = Vec::new();
    let mut chunk: Vec<StyledChar> = Vec::new();
    let mut chunk_text = String::new();

    for styled in word {
        chunk_text.push(styled.character);
        if measure.width(&chunk_text) <= max_width || chunk.is_empty() {
            chunk.push(*styled);
        } else {
            lines.push(std::mem::take(&mut chunk));
            chunk.push(*styled);
            chunk_text = styled.character.to_string();
        }
    }
    if !chunk.is_empty() {
        lines.push(chunk);
    }

    lines
}

/// Joins words with a single space, underlined when both neighbours are underlined so that
/// the rule stays continuous.
fn join_words(words: &[&[StyledChar]]) -> Vec<StyledChar> {
    let mut line: Vec<StyledChar> = Vec::new();
    for word in words {
        if let (Some(previous), Some(next)) = (line.last(), word.first()) {
            line.push(StyledChar {
                character: ' ',
                bold: false,
                underline: previous.underline && next.underline,
            });
        }
        line.extend_from_slice(word);
    }
    line
}
