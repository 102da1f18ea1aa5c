use std::path::{Path, PathBuf};

use rand::Rng;
use serde::Serialize;
use unicode_normalization::UnicodeNormalization as _;

use crate::analyzer::CapabilityClass;
use crate::canvas::{Canvas, Layer, Stroke};
use crate::configuration::RenderConfiguration;
use crate::error::{ContextError, ErrorKind};
use crate::font_set::FontSet;
use crate::geometry::{PageFormat, PageGeometry, PageSide};
use crate::layout::{self, ComposedDocument, ComposedLine};
use crate::markup::StyledChar;
use crate::pdf::PdfCanvas;
use crate::registry::{FontHandle, FontRegistry, POINTS_PER_MILLIMETER};
use crate::selector::{self, FontSelector, SelectableFont, WordScope};

/// What to render and how.
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    pub text: &'a str,
    pub font_set: &'a FontSet,
    pub page_format: PageFormat,
    pub grid_enabled: bool,
    pub first_page_side: PageSide,
}

/// The outcome of a successful render.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct RenderSummary {
    pub pages: usize,
    pub lines: usize,
    /// Names of the fonts the selector could choose from, the base first.
    pub fonts: Vec<String>,
    /// Non-base fonts that failed to load or register and were left out.
    pub dropped_fonts: Vec<PathBuf>,
    /// Characters drawn with a fallback font because no font of their class could draw them.
    pub degraded_characters: usize,
    /// Classes the text needs that no font of the set covers.
    pub missing_categories: Vec<CapabilityClass>,
}

/// Lays out and draws texts with the fonts of a font set. One renderer can serve any number of
/// renders, concurrent ones included: it only shares the font registry.
pub struct Renderer<'a> {
    registry: &'a FontRegistry,
    configuration: &'a RenderConfiguration,
}

impl<'a> Renderer<'a> {
    pub fn new(registry: &'a FontRegistry, configuration: &'a RenderConfiguration) -> Self {
        Renderer {
            registry,
            configuration,
        }
    }

    /// NFC-normalizes the text and checks its trimmed length.
    pub fn validate_text(&self, text: &str) -> Result<String, ContextError> {
        let normalized: String = text.nfc().collect();
        let length = normalized.trim().chars().count();

        if length == 0 {
            return Err(ContextError::with_context(
                ErrorKind::Validation,
                "The text is empty",
            ));
        }
        if length < self.configuration.minimum_text_length {
            return Err(ContextError::with_context(
                ErrorKind::Validation,
                format!(
                    "The text has {} characters, at least {} are required",
                    length, self.configuration.minimum_text_length
                ),
            ));
        }
        if length > self.configuration.maximum_text_length {
            return Err(ContextError::with_context(
                ErrorKind::Validation,
                format!(
                    "The text has {} characters, at most {} are allowed",
                    length, self.configuration.maximum_text_length
                ),
            ));
        }

        Ok(normalized)
    }

    /// Breaks the text into lines and pages, measuring with the base font.
    pub fn compose(&self, text: &str, base: &FontHandle, geometry: &PageGeometry) -> ComposedDocument {
        let font_size = self.configuration.font_size;
        let measure = |text: &str| base.measure(text, font_size) / POINTS_PER_MILLIMETER;
        layout::compose(text, geometry, &measure)
    }

    /// Renders onto the canvas and returns the finished document. Nothing is drawn unless the
    /// text is valid and the base font is usable.
    pub fn render<C, R>(
        &self,
        request: &RenderRequest<'_>,
        canvas: &mut C,
        rng: &mut R,
    ) -> Result<(Vec<u8>, RenderSummary), ContextError>
    where
        C: Canvas + ?Sized,
        R: Rng + ?Sized,
    {
        let text = self.validate_text(request.text)?;

        let missing_categories = request.font_set.missing_categories(&text);
        if !missing_categories.is_empty() {
            log::warn!(
                "No font covers {:?}, those characters will fall back to other fonts",
                missing_categories
            );
        }

        let (selector, dropped_fonts) = self.register_fonts(request.font_set, canvas)?;
        let geometry = PageGeometry::new(
            request.page_format,
            self.configuration,
            request.grid_enabled,
            request.first_page_side,
        );
        let document = self.compose(&text, selector.base(), &geometry);

        let degraded_characters = self.paint(&document, &selector, canvas, rng)?;
        if degraded_characters > 0 {
            log::warn!(
                "{} characters were drawn with a fallback font",
                degraded_characters
            );
        }
        let bytes = canvas.finish()?;

        let summary = RenderSummary {
            pages: document.page_count(),
            lines: document.line_count(),
            fonts: selector
                .handles()
                .map(|handle| handle.name().to_string())
                .collect(),
            dropped_fonts,
            degraded_characters,
            missing_categories: missing_categories.into_iter().collect(),
        };
        log::info!(
            "Rendered {} lines on {} {} pages with {} fonts",
            summary.lines,
            summary.pages,
            request.page_format,
            summary.fonts.len()
        );

        Ok((bytes, summary))
    }

    /// Renders to a PDF file, written next to its destination first and then moved into place.
    pub fn render_to_file<R: Rng + ?Sized>(
        &self,
        request: &RenderRequest<'_>,
        output_path: &Path,
        rng: &mut R,
    ) -> Result<RenderSummary, ContextError> {
        let mut canvas = PdfCanvas::new(self.configuration.compress_output);
        let (bytes, summary) = self.render(request, &mut canvas, rng)?;

        let swap_path = PathBuf::from(format!("{}.swp", output_path.display()));
        std::fs::write(&swap_path, bytes).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Backend,
                format!("Unable to write the PDF file {:?}", swap_path),
                &error,
            )
        })?;
        std::fs::rename(&swap_path, output_path).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Backend,
                format!("Unable to move the PDF file to {:?}", output_path),
                &error,
            )
        })?;

        Ok(summary)
    }

    /// Loads every font of the set and makes it known to the canvas. The base font must succeed,
    /// the others are dropped when they fail.
    fn register_fonts<C: Canvas + ?Sized>(
        &self,
        font_set: &FontSet,
        canvas: &mut C,
    ) -> Result<(FontSelector, Vec<PathBuf>), ContextError> {
        let base_record = font_set.base.clone().ok_or_else(|| {
            ContextError::with_context(ErrorKind::Asset, "The font set has no base font")
        })?;
        let base_handle = self.registry.resolve(base_record.path())?;
        canvas.register_font(&base_handle)?;

        let mut fonts = Vec::new();
        let mut dropped_fonts = Vec::new();
        for record in font_set.records() {
            if record.path() == base_record.path() {
                continue;
            }
            let registered = self
                .registry
                .resolve(record.path())
                .and_then(|handle| canvas.register_font(&handle).map(|_| handle));
            match registered {
                Ok(handle) => fonts.push(SelectableFont {
                    record: record.clone(),
                    handle,
                }),
                Err(error) => {
                    log::warn!("Leaving out the font {:?}: {}", record.path(), error);
                    dropped_fonts.push(record.path().to_path_buf());
                }
            }
        }

        let base = SelectableFont {
            record: base_record,
            handle: base_handle,
        };
        Ok((FontSelector::new(base, fonts), dropped_fonts))
    }

    /// Draws the composed pages and returns how many characters fell back to a non-ideal font.
    fn paint<C, R>(
        &self,
        document: &ComposedDocument,
        selector: &FontSelector,
        canvas: &mut C,
        rng: &mut R,
    ) -> Result<usize, ContextError>
    where
        C: Canvas + ?Sized,
        R: Rng + ?Sized,
    {
        let geometry = &document.geometry;
        let mut degraded_characters = 0;

        for page in &document.pages {
            canvas.begin_page(geometry.width, geometry.height)?;

            if geometry.grid_enabled {
                let stroke = Stroke {
                    width: self.configuration.grid_line_width,
                    gray: self.configuration.grid_line_gray,
                };
                for line in geometry.ruling() {
                    canvas.stroke_line(
                        Layer::Ruling,
                        [line.from.0, geometry.height - line.from.1],
                        [line.to.0, geometry.height - line.to.1],
                        stroke,
                    )?;
                }
            }

            for line in &page.lines {
                degraded_characters +=
                    self.paint_line(line, geometry.height, selector, canvas, rng)?;
            }
        }

        Ok(degraded_characters)
    }

    /// Draws one line as runs of characters sharing a font and an emphasis, then its underlines.
    fn paint_line<C, R>(
        &self,
        line: &ComposedLine,
        page_height: f32,
        selector: &FontSelector,
        canvas: &mut C,
        rng: &mut R,
    ) -> Result<usize, ContextError>
    where
        C: Canvas + ?Sized,
        R: Rng + ?Sized,
    {
        let font_size = self.configuration.font_size;
        let baseline = page_height - line.baseline;
        let mut scope = WordScope::new();
        let mut degraded_characters = 0;
        let mut run: Option<Run> = None;
        let mut x = line.x;

        for styled in &line.characters {
            let character = styled.character;
            if character.is_whitespace() {
                if let Some(finished) = run.take() {
                    x = self.draw_run(finished, baseline, canvas)?;
                }
                x += selector.base().measure(&character.to_string(), font_size)
                    / POINTS_PER_MILLIMETER;
                scope.clear();
                continue;
            }

            let selection = selector.select(character, &mut scope, rng);
            if selection.degraded {
                degraded_characters += 1;
            }
            if selector::is_word_boundary(character) {
                scope.clear();
            }

            let extends_run = run.as_ref().is_some_and(|current| {
                current.font == selection.handle && current.bold == styled.bold
            });
            if extends_run {
                if let Some(current) = run.as_mut() {
                    current.text.push(character);
                }
            } else {
                if let Some(finished) = run.take() {
                    x = self.draw_run(finished, baseline, canvas)?;
                }
                run = Some(Run {
                    font: selection.handle,
                    bold: styled.bold,
                    x,
                    text: character.to_string(),
                });
            }
        }
        if let Some(finished) = run.take() {
            self.draw_run(finished, baseline, canvas)?;
        }

        self.draw_underlines(line, baseline, selector.base(), canvas)?;

        Ok(degraded_characters)
    }

    /// Draws the run, twice with a small shift when bold, and returns the x where it ends.
    fn draw_run<C: Canvas + ?Sized>(
        &self,
        run: Run,
        baseline: f32,
        canvas: &mut C,
    ) -> Result<f32, ContextError> {
        let font_size = self.configuration.font_size;
        canvas.show_text(&run.font, font_size, [run.x, baseline], &run.text)?;
        if run.bold {
            let shifted = run.x + self.configuration.bold_offset / POINTS_PER_MILLIMETER;
            canvas.show_text(&run.font, font_size, [shifted, baseline], &run.text)?;
        }

        Ok(run.x + run.font.measure(&run.text, font_size) / POINTS_PER_MILLIMETER)
    }

    /// Underline rules are positioned with the base font metrics whatever fonts drew the glyphs.
    fn draw_underlines<C: Canvas + ?Sized>(
        &self,
        line: &ComposedLine,
        baseline: f32,
        base: &FontHandle,
        canvas: &mut C,
    ) -> Result<(), ContextError> {
        let font_size = self.configuration.font_size;
        let stroke = Stroke {
            width: self.configuration.underline_width,
            gray: 0.0,
        };
        let y = baseline - self.configuration.underline_offset / POINTS_PER_MILLIMETER;

        for (start, end) in underlined_spans(&line.characters) {
            let prefix: String = line.characters[..start]
                .iter()
                .map(|styled| styled.character)
                .collect();
            let span: String = line.characters[start..end]
                .iter()
                .map(|styled| styled.character)
                .collect();
            let from = line.x + base.measure(&prefix, font_size) / POINTS_PER_MILLIMETER;
            let to = from + base.measure(&span, font_size) / POINTS_PER_MILLIMETER;
            canvas.stroke_line(Layer::Ink, [from, y], [to, y], stroke)?;
        }

        Ok(())
    }
}

/// Consecutive characters drawn with one `show_text` call.
struct Run {
    font: FontHandle,
    bold: bool,
    x: f32,
    text: String,
}

/// Index ranges of the maximal underlined stretches of the line.
fn underlined_spans(characters: &[StyledChar]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (index, styled) in characters.iter().enumerate() {
        match (styled.underline, start) {
            (true, None) => start = Some(index),
            (false, Some(span_start)) => {
                spans.push((span_start, index));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(span_start) = start {
        spans.push((span_start, characters.len()));
    }
    spans
}
