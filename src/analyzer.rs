use std::collections::HashSet;
use std::path::{Path, PathBuf};

use owned_ttf_parser::Face;
use serde::{Deserialize, Serialize};

use crate::error::{ContextError, ErrorKind};

pub const CYRILLIC_LOWER: &str = "абвгдеёжзийклмнопрстуфхцчшщъыьэюя";
pub const CYRILLIC_UPPER: &str = "АБВГДЕЁЖЗИЙКЛМНОПРСТУФХЦЧШЩЪЫЬЭЮЯ";
pub const LATIN_LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
pub const LATIN_UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const DIGITS: &str = "0123456789";
pub const COMMON_SYMBOLS: &str = ".,:;!?\"'()[]{}@#$%^&*-+=/_\\|<>`~«»—–";

/// One of the six reference character sets a font is graded against.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityClass {
    CyrillicLower,
    CyrillicUpper,
    LatinLower,
    LatinUpper,
    Digits,
    Symbols,
}

impl CapabilityClass {
    pub const ALL: [CapabilityClass; 6] = [
        CapabilityClass::CyrillicLower,
        CapabilityClass::CyrillicUpper,
        CapabilityClass::LatinLower,
        CapabilityClass::LatinUpper,
        CapabilityClass::Digits,
        CapabilityClass::Symbols,
    ];

    pub fn reference_characters(self) -> &'static str {
        match self {
            CapabilityClass::CyrillicLower => CYRILLIC_LOWER,
            CapabilityClass::CyrillicUpper => CYRILLIC_UPPER,
            CapabilityClass::LatinLower => LATIN_LOWER,
            CapabilityClass::LatinUpper => LATIN_UPPER,
            CapabilityClass::Digits => DIGITS,
            CapabilityClass::Symbols => COMMON_SYMBOLS,
        }
    }

    /// The kind of font a user has to upload to cover this class.
    pub fn satisfied_by(self) -> FontType {
        match self {
            CapabilityClass::CyrillicLower | CapabilityClass::CyrillicUpper => FontType::CyrillicFull,
            CapabilityClass::LatinLower | CapabilityClass::LatinUpper => FontType::Latin,
            CapabilityClass::Digits | CapabilityClass::Symbols => FontType::Digits,
        }
    }
}

/// The role a font plays in a user's set, derived from its capability flags.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum FontType {
    CyrillicFull,
    CyrillicPartial,
    Latin,
    Digits,
    Mixed,
    Other,
}

impl FontType {
    pub fn as_str(self) -> &'static str {
        match self {
            FontType::CyrillicFull => "cyrillic_full",
            FontType::CyrillicPartial => "cyrillic_partial",
            FontType::Latin => "latin",
            FontType::Digits => "digits",
            FontType::Mixed => "mixed",
            FontType::Other => "other",
        }
    }
}

impl std::fmt::Display for FontType {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Which reference character sets a font fully covers. A class is supported only when every
/// one of its reference characters maps to a glyph.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FontCapabilities {
    pub path: PathBuf,
    pub supports_cyrillic_lower: bool,
    pub supports_cyrillic_upper: bool,
    pub supports_latin_lower: bool,
    pub supports_latin_upper: bool,
    pub supports_digits: bool,
    pub supports_symbols: bool,
    /// Number of distinct codepoints mapped by the font, only used to rank fonts.
    pub coverage_score: u32,
}

impl FontCapabilities {
    /// Grades an already parsed font face.
    pub fn from_face(path: &Path, face: &Face<'_>) -> FontCapabilities {
        let codepoints = mapped_codepoints(face);
        let covers = |class: CapabilityClass| {
            class
                .reference_characters()
                .chars()
                .all(|character| codepoints.contains(&(character as u32)))
        };

        FontCapabilities {
            path: path.to_path_buf(),
            supports_cyrillic_lower: covers(CapabilityClass::CyrillicLower),
            supports_cyrillic_upper: covers(CapabilityClass::CyrillicUpper),
            supports_latin_lower: covers(CapabilityClass::LatinLower),
            supports_latin_upper: covers(CapabilityClass::LatinUpper),
            supports_digits: covers(CapabilityClass::Digits),
            supports_symbols: covers(CapabilityClass::Symbols),
            coverage_score: codepoints.len() as u32,
        }
    }

    pub fn supports(&self, class: CapabilityClass) -> bool {
        match class {
            CapabilityClass::CyrillicLower => self.supports_cyrillic_lower,
            CapabilityClass::CyrillicUpper => self.supports_cyrillic_upper,
            CapabilityClass::LatinLower => self.supports_latin_lower,
            CapabilityClass::LatinUpper => self.supports_latin_upper,
            CapabilityClass::Digits => self.supports_digits,
            CapabilityClass::Symbols => self.supports_symbols,
        }
    }

    pub fn is_cyrillic_full(&self) -> bool {
        self.supports_cyrillic_lower && self.supports_cyrillic_upper
    }

    pub fn has_any_letters(&self) -> bool {
        self.supports_cyrillic_lower
            || self.supports_cyrillic_upper
            || self.supports_latin_lower
            || self.supports_latin_upper
    }

    /// Always computed from the flags, never stored on its own.
    pub fn font_type(&self) -> FontType {
        let any_cyrillic = self.supports_cyrillic_lower || self.supports_cyrillic_upper;
        let any_latin = self.supports_latin_lower || self.supports_latin_upper;

        if self.is_cyrillic_full() {
            FontType::CyrillicFull
        } else if any_cyrillic {
            FontType::CyrillicPartial
        } else if any_latin {
            FontType::Latin
        } else if self.supports_digits && !self.has_any_letters() {
            FontType::Digits
        } else if self.has_any_letters() {
            // Unreachable with the current classes, kept so that new letter classes land here
            FontType::Mixed
        } else {
            FontType::Other
        }
    }
}

/// Reads and grades the font at the given path.
pub fn analyze(font_path: &Path) -> Result<FontCapabilities, ContextError> {
    let font_bytes = std::fs::read(font_path).map_err(|error| {
        ContextError::with_error(
            ErrorKind::Asset,
            format!("Failed to read the font {:?}", font_path),
            &error,
        )
    })?;
    let face = Face::parse(&font_bytes, 0).map_err(|error| {
        ContextError::with_error(
            ErrorKind::Asset,
            format!("Failed to parse the font {:?}", font_path),
            &error,
        )
    })?;
    let capabilities = FontCapabilities::from_face(font_path, &face);
    log::debug!(
        "Analyzed {:?} as {} with {} codepoints",
        font_path,
        capabilities.font_type(),
        capabilities.coverage_score
    );

    Ok(capabilities)
}

/// Collects every codepoint that the unicode subtables of the font map to a real glyph.
pub(crate) fn mapped_codepoints(face: &Face<'_>) -> HashSet<u32> {
    let mut codepoints = HashSet::new();
    let Some(cmap) = face.tables().cmap else {
        return codepoints;
    };

    for subtable in cmap.subtables.into_iter().filter(|subtable| subtable.is_unicode()) {
        subtable.codepoints(|codepoint| {
            if subtable
                .glyph_index(codepoint)
                .is_some_and(|glyph_id| glyph_id.0 > 0)
            {
                codepoints.insert(codepoint);
            }
        });
    }

    codepoints
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fonts::SyntheticFont;

    fn capabilities_of(characters: &str) -> FontCapabilities {
        let bytes = SyntheticFont::with_characters(characters).build();
        let face = Face::parse(&bytes, 0).unwrap();
        FontCapabilities::from_face(Path::new("sample.ttf"), &face)
    }

    #[test]
    fn full_cyrillic_font_is_cyrillic_full() {
        let capabilities = capabilities_of(&format!("{CYRILLIC_LOWER}{CYRILLIC_UPPER} "));
        assert!(capabilities.supports_cyrillic_lower);
        assert!(capabilities.supports_cyrillic_upper);
        assert!(!capabilities.supports_digits);
        assert_eq!(capabilities.font_type(), FontType::CyrillicFull);
        assert_eq!(capabilities.coverage_score, 67);
    }

    #[test]
    fn missing_yo_denies_the_whole_lowercase_class() {
        let lower_without_yo: String = CYRILLIC_LOWER.chars().filter(|c| *c != 'ё').collect();
        let capabilities = capabilities_of(&format!("{lower_without_yo}{CYRILLIC_UPPER}"));

        assert!(!capabilities.supports_cyrillic_lower);
        assert!(capabilities.supports_cyrillic_upper);
        assert_eq!(capabilities.font_type(), FontType::CyrillicPartial);
    }

    #[test]
    fn digit_templates_are_digits_fonts() {
        let capabilities = capabilities_of(&format!("{DIGITS}{COMMON_SYMBOLS}"));
        assert!(capabilities.supports_digits);
        assert!(capabilities.supports_symbols);
        assert!(!capabilities.has_any_letters());
        assert_eq!(capabilities.font_type(), FontType::Digits);
    }

    #[test]
    fn latin_without_cyrillic_is_latin() {
        let capabilities = capabilities_of(&format!("{LATIN_LOWER}{DIGITS}"));
        assert_eq!(capabilities.font_type(), FontType::Latin);
        assert!(capabilities.supports_digits);
    }

    #[test]
    fn font_without_any_class_is_other() {
        assert_eq!(capabilities_of("☺♥").font_type(), FontType::Other);
    }

    #[test]
    fn font_type_depends_only_on_the_flags() {
        // Every combination of the six flags, paired with two different paths and scores
        for mask in 0u8..64 {
            let flags = |bit: u8| mask & (1 << bit) != 0;
            let make = |path: &str, coverage_score| FontCapabilities {
                path: PathBuf::from(path),
                supports_cyrillic_lower: flags(0),
                supports_cyrillic_upper: flags(1),
                supports_latin_lower: flags(2),
                supports_latin_upper: flags(3),
                supports_digits: flags(4),
                supports_symbols: flags(5),
                coverage_score,
            };
            assert_eq!(make("a.ttf", 10).font_type(), make("b.otf", 900).font_type());
        }
    }

    #[test]
    fn garbage_files_are_asset_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"definitely not a font").unwrap();

        let error = analyze(file.path()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Asset);
    }

    #[test]
    fn missing_files_are_asset_errors() {
        let error = analyze(Path::new("/nonexistent/font.ttf")).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Asset);
    }
}
