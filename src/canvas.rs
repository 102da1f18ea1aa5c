use std::collections::HashSet;

use serde::Serialize;

use crate::error::{ContextError, ErrorKind};
use crate::registry::FontHandle;

/// The optional content layer a drawing operation belongs to.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    /// The notebook ruling, drawn behind everything else.
    Ruling,
    /// Glyphs and underlines.
    Ink,
}

impl Layer {
    pub fn name(self) -> &'static str {
        match self {
            Layer::Ruling => "Grid",
            Layer::Ink => "Ink",
        }
    }
}

/// Width (in points) and gray level (0 is black) of a stroked line.
#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
pub struct Stroke {
    pub width: f32,
    pub gray: f32,
}

/// A minimal page-drawing backend. Positions are in millimeters from the bottom-left corner of
/// the current page, font sizes in points.
pub trait Canvas {
    /// Makes the font usable by `show_text`. Registering the same font twice is a no-op.
    fn register_font(&mut self, font: &FontHandle) -> Result<(), ContextError>;

    /// Starts a new page, every following operation draws onto it.
    fn begin_page(&mut self, width: f32, height: f32) -> Result<(), ContextError>;

    fn stroke_line(
        &mut self,
        layer: Layer,
        from: [f32; 2],
        to: [f32; 2],
        stroke: Stroke,
    ) -> Result<(), ContextError>;

    /// Draws the text on the ink layer with its baseline starting at the position.
    fn show_text(
        &mut self,
        font: &FontHandle,
        font_size: f32,
        position: [f32; 2],
        text: &str,
    ) -> Result<(), ContextError>;

    /// Finalizes the document and returns its bytes.
    fn finish(&mut self) -> Result<Vec<u8>, ContextError>;
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum CanvasOperation {
    RegisterFont {
        font: String,
    },
    BeginPage {
        width: f32,
        height: f32,
    },
    StrokeLine {
        layer: Layer,
        from: [f32; 2],
        to: [f32; 2],
        stroke: Stroke,
    },
    ShowText {
        font: String,
        font_size: f32,
        position: [f32; 2],
        text: String,
    },
}

/// A backend that only records what it is asked to draw, `finish` returns the operations as JSON.
/// It enforces the same preconditions as a real backend: fonts are registered before use and
/// nothing is drawn before the first page.
#[derive(Debug, Default)]
pub struct RecordingCanvas {
    pub operations: Vec<CanvasOperation>,
    registered_fonts: HashSet<String>,
    rejected_fonts: HashSet<String>,
    has_page: bool,
}

impl RecordingCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the registration of the named font fail, like a backend choking on a corrupt file.
    pub fn rejecting_font(mut self, font_name: &str) -> Self {
        self.rejected_fonts.insert(font_name.to_string());
        self
    }

    pub fn page_count(&self) -> usize {
        self.operations
            .iter()
            .filter(|operation| matches!(operation, CanvasOperation::BeginPage { .. }))
            .count()
    }

    /// Every drawn piece of text with the name of its font, in drawing order.
    pub fn texts(&self) -> Vec<(String, String)> {
        self.operations
            .iter()
            .filter_map(|operation| match operation {
                CanvasOperation::ShowText { font, text, .. } => Some((font.clone(), text.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn strokes(&self, layer: Layer) -> usize {
        self.operations
            .iter()
            .filter(|operation| {
                matches!(operation, CanvasOperation::StrokeLine { layer: stroked, .. } if *stroked == layer)
            })
            .count()
    }

    fn ensure_page(&self) -> Result<(), ContextError> {
        if self.has_page {
            Ok(())
        } else {
            Err(ContextError::with_context(
                ErrorKind::Backend,
                "Cannot draw before the first page has begun",
            ))
        }
    }
}

impl Canvas for RecordingCanvas {
    fn register_font(&mut self, font: &FontHandle) -> Result<(), ContextError> {
        if self.rejected_fonts.contains(font.name()) {
            return Err(ContextError::with_context(
                ErrorKind::Backend,
                format!("The backend rejected the font {}", font.name()),
            ));
        }
        if self.registered_fonts.insert(font.name().to_string()) {
            self.operations.push(CanvasOperation::RegisterFont {
                font: font.name().to_string(),
            });
        }
        Ok(())
    }

    fn begin_page(&mut self, width: f32, height: f32) -> Result<(), ContextError> {
        self.has_page = true;
        self.operations
            .push(CanvasOperation::BeginPage { width, height });
        Ok(())
    }

    fn stroke_line(
        &mut self,
        layer: Layer,
        from: [f32; 2],
        to: [f32; 2],
        stroke: Stroke,
    ) -> Result<(), ContextError> {
        self.ensure_page()?;
        self.operations.push(CanvasOperation::StrokeLine {
            layer,
            from,
            to,
            stroke,
        });
        Ok(())
    }

    fn show_text(
        &mut self,
        font: &FontHandle,
        font_size: f32,
        position: [f32; 2],
        text: &str,
    ) -> Result<(), ContextError> {
        self.ensure_page()?;
        if !self.registered_fonts.contains(font.name()) {
            return Err(ContextError::with_context(
                ErrorKind::Backend,
                format!("The font {} was never registered", font.name()),
            ));
        }
        self.operations.push(CanvasOperation::ShowText {
            font: font.name().to_string(),
            font_size,
            position,
            text: text.to_string(),
        });
        Ok(())
    }

    fn finish(&mut self) -> Result<Vec<u8>, ContextError> {
        serde_json::to_vec(&self.operations).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Backend,
                "Failed to serialize the recorded operations",
                &error,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fonts::SyntheticFont;
    use std::path::PathBuf;

    fn handle(name: &str) -> FontHandle {
        let bytes = SyntheticFont::with_characters("abc").build();
        FontHandle::from_bytes(name.to_string(), PathBuf::from(format!("{name}.ttf")), bytes)
            .unwrap()
    }

    #[test]
    fn drawing_requires_a_page_and_a_registered_font() {
        let font = handle("hand");
        let mut canvas = RecordingCanvas::new();

        let error = canvas.show_text(&font, 32.0, [10.0, 10.0], "abc").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Backend);

        canvas.begin_page(210.0, 297.0).unwrap();
        let error = canvas.show_text(&font, 32.0, [10.0, 10.0], "abc").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Backend);

        canvas.register_font(&font).unwrap();
        canvas.register_font(&font).unwrap();
        canvas.show_text(&font, 32.0, [10.0, 10.0], "abc").unwrap();

        assert_eq!(canvas.texts(), [("hand".to_string(), "abc".to_string())]);
        assert_eq!(canvas.page_count(), 1);
        assert_eq!(canvas.operations.len(), 3);
    }

    #[test]
    fn rejected_fonts_fail_to_register() {
        let mut canvas = RecordingCanvas::new().rejecting_font("broken");
        assert!(canvas.register_font(&handle("broken")).is_err());
        assert!(canvas.register_font(&handle("fine")).is_ok());
    }

    #[test]
    fn finishing_serializes_the_operations() {
        let mut canvas = RecordingCanvas::new();
        canvas.begin_page(148.0, 210.0).unwrap();
        canvas
            .stroke_line(
                Layer::Ruling,
                [15.0, 15.0],
                [133.0, 15.0],
                Stroke { width: 0.3, gray: 0.9 },
            )
            .unwrap();

        let json: serde_json::Value = serde_json::from_slice(&canvas.finish().unwrap()).unwrap();
        assert_eq!(json[0]["operation"], "begin_page");
        assert_eq!(json[1]["layer"], "ruling");
        assert_eq!(canvas.strokes(Layer::Ruling), 1);
        assert_eq!(canvas.strokes(Layer::Ink), 0);
    }
}
