//! Scribr turns plain text into PDF notes that look handwritten. Users supply several samples
//! of their own handwriting as TTF/OTF fonts, each covering only part of the alphabet, and every
//! character of the text is drawn with one of the fonts that can actually draw it, picked at random
//! so that repeated letters do not look stamped.
//!
//! The entry point is the `Renderer` struct of the `render` module, which validates the text,
//! lays it out on ruled A4 or A5 pages and paints it onto a `Canvas`. The production canvas writes
//! a PDF document, see `PdfCanvas`. For long-running processes the `RenderService` runs renders on a
//! bounded pool of worker threads and tracks their progress.

/// This module contains the `ContextError` type which is the error type used throughout this library.
///
/// Every error carries a human readable context, the stringified error it was propagated from (if any)
/// and an `ErrorKind`, so that callers can tell an unusable font (`Asset`) from a rejected text
/// (`Validation`) or a failure of the drawing backend (`Backend`) without parsing messages.
pub mod error;

/// The tunables of the layout engine, loadable from a JSON file in which every field is optional.
pub mod configuration;

/// Classification of fonts by the reference character sets they fully cover.
///
/// A font supports a class (Cyrillic lowercase, Latin uppercase, digits, ...) only when every reference
/// character of the class maps to a glyph. From these flags the font is given a `FontType`, which decides
/// the role it plays in a user's font set.
pub mod analyzer;

/// The process-wide cache of loaded fonts.
///
/// `FontRegistry::resolve` loads a font file once and hands out cheap `FontHandle` clones afterwards,
/// also across threads. Handles answer glyph-presence and width queries straight from the font tables.
pub mod registry;

/// Font records and their grouping into the pools the selector draws from.
pub mod font_set;

/// The fonts of every user, with the upload requirements and the choice of the base font.
pub mod library;

/// Per-character font choice.
///
/// # Introduction
///
/// Each character is classified and a font is chosen at random among the fonts of its class. Within
/// a word the same character avoids the fonts it was already drawn with, until every candidate has been
/// used once. When no font of the class can draw the character a fallback is used and the selection is
/// reported as degraded.
pub mod selector;

/// Page formats, the cell grid and the margins of left and right pages.
pub mod geometry;

/// Paragraph splitting and the inline emphasis markers that are stripped from the text.
pub mod markup;

/// Word wrapping and pagination. Composition is pure: the same text, geometry and measure always
/// produce the same lines at the same positions.
pub mod layout;

/// The drawing backend abstraction the renderer paints onto.
pub mod canvas;

/// The module where the `PdfDocument` interface for writing PDF documents is presented.
///
/// # Introduction
///
/// The main component of this module is the struct `PdfDocument`, which embeds the TrueType and OpenType
/// fonts as CID fonts with a `ToUnicode` map (so that the text can be searched and copied), keeps the
/// ruling and the ink of every page on separate optional content layers and saves the whole as bytes.
/// `PdfCanvas` puts it behind the `Canvas` trait.
pub mod pdf;

/// Validation, composition and painting of a text with the fonts of a font set.
pub mod render;

/// A bounded pool of render workers and the board where the status of each job is kept.
pub mod service;

#[cfg(test)]
mod test_fonts;
