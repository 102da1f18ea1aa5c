use std::collections::HashMap;

use rand::seq::SliceRandom as _;
use rand::Rng;
use unicode_general_category::{get_general_category, GeneralCategory};

use crate::analyzer::CapabilityClass;
use crate::font_set::FontRecord;
use crate::registry::FontHandle;

/// The class of a single character, computed once and then dispatched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharClass {
    Whitespace,
    Digit,
    CyrillicLower,
    CyrillicUpper,
    LatinLower,
    LatinUpper,
    PunctuationOrSymbol,
    Other,
}

impl CharClass {
    pub fn of(character: char) -> CharClass {
        if character.is_whitespace() {
            CharClass::Whitespace
        } else if character.is_ascii_digit() {
            CharClass::Digit
        } else if is_cyrillic_letter(character) {
            if character.is_uppercase() {
                CharClass::CyrillicUpper
            } else {
                CharClass::CyrillicLower
            }
        } else if is_latin_letter(character) {
            if character.is_uppercase() {
                CharClass::LatinUpper
            } else {
                CharClass::LatinLower
            }
        } else if is_punctuation_or_symbol(character) {
            CharClass::PunctuationOrSymbol
        } else {
            CharClass::Other
        }
    }

    /// The reference class a font must cover to draw characters of this class.
    pub fn capability_class(self) -> Option<CapabilityClass> {
        match self {
            CharClass::Digit => Some(CapabilityClass::Digits),
            CharClass::CyrillicLower => Some(CapabilityClass::CyrillicLower),
            CharClass::CyrillicUpper => Some(CapabilityClass::CyrillicUpper),
            CharClass::LatinLower => Some(CapabilityClass::LatinLower),
            CharClass::LatinUpper => Some(CapabilityClass::LatinUpper),
            CharClass::PunctuationOrSymbol => Some(CapabilityClass::Symbols),
            CharClass::Whitespace | CharClass::Other => None,
        }
    }
}

fn is_cyrillic_letter(character: char) -> bool {
    character.is_alphabetic()
        && matches!(character as u32,
            0x0400..=0x052F | 0x1C80..=0x1C8F | 0x2DE0..=0x2DFF | 0xA640..=0xA69F)
}

fn is_latin_letter(character: char) -> bool {
    character.is_alphabetic()
        && matches!(character as u32,
            0x0041..=0x005A
            | 0x0061..=0x007A
            | 0x00C0..=0x024F
            | 0x0250..=0x02AF
            | 0x1D00..=0x1D7F
            | 0x1E00..=0x1EFF
            | 0x2C60..=0x2C7F
            | 0xA720..=0xA7FF
            | 0xAB30..=0xAB6F
            | 0xFB00..=0xFB06
            | 0xFF21..=0xFF3A
            | 0xFF41..=0xFF5A)
}

/// Characters of the P* and S* general categories. Emoji are symbols (So), combining marks are not.
fn is_punctuation_or_symbol(character: char) -> bool {
    matches!(
        get_general_category(character),
        GeneralCategory::ConnectorPunctuation
            | GeneralCategory::DashPunctuation
            | GeneralCategory::OpenPunctuation
            | GeneralCategory::ClosePunctuation
            | GeneralCategory::InitialPunctuation
            | GeneralCategory::FinalPunctuation
            | GeneralCategory::OtherPunctuation
            | GeneralCategory::MathSymbol
            | GeneralCategory::CurrencySymbol
            | GeneralCategory::ModifierSymbol
            | GeneralCategory::OtherSymbol
    )
}

/// Whether the character separates words for the purpose of the anti-repetition memory.
pub fn is_word_boundary(character: char) -> bool {
    !(character.is_alphanumeric() || character == '_')
}

/// The fonts already used for each character of the current word.
#[derive(Debug, Default)]
pub struct WordScope {
    used: HashMap<char, Vec<FontHandle>>,
}

impl WordScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.used.clear();
    }

    pub fn used_for(&self, character: char) -> &[FontHandle] {
        self.used
            .get(&character)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// A registered font together with the record it was registered from.
#[derive(Debug, Clone)]
pub struct SelectableFont {
    pub record: FontRecord,
    pub handle: FontHandle,
}

/// The outcome of choosing a font for one character. `degraded` is set when no font of the
/// ideal class could draw it and a fallback was used.
#[derive(Debug, Clone)]
pub struct Selection {
    pub handle: FontHandle,
    pub degraded: bool,
}

/// Picks a font per character among the fonts of one render, avoiding to draw the same letter
/// twice with the same font within a word.
#[derive(Debug, Clone)]
pub struct FontSelector {
    base: SelectableFont,
    fonts: Vec<SelectableFont>,
    default: FontHandle,
}

impl FontSelector {
    /// `fonts` are the other registered fonts, in order of preference. The default font is the
    /// one with the highest coverage score, the base font on ties.
    pub fn new(base: SelectableFont, fonts: Vec<SelectableFont>) -> Self {
        let mut unique_fonts: Vec<SelectableFont> = Vec::with_capacity(fonts.len());
        for font in fonts {
            let is_known = font.handle == base.handle
                || unique_fonts.iter().any(|known| known.handle == font.handle);
            if !is_known {
                unique_fonts.push(font);
            }
        }

        let mut default = &base;
        for font in &unique_fonts {
            if font.record.capabilities.coverage_score > default.record.capabilities.coverage_score {
                default = font;
            }
        }
        let default = default.handle.clone();

        FontSelector {
            base,
            fonts: unique_fonts,
            default,
        }
    }

    pub fn base(&self) -> &FontHandle {
        &self.base.handle
    }

    pub fn default_font(&self) -> &FontHandle {
        &self.default
    }

    /// Every font the selector may return, the base first.
    pub fn handles(&self) -> impl Iterator<Item = &FontHandle> {
        std::iter::once(&self.base.handle).chain(self.fonts.iter().map(|font| &font.handle))
    }

    pub fn select<R: Rng + ?Sized>(
        &self,
        character: char,
        scope: &mut WordScope,
        rng: &mut R,
    ) -> Selection {
        let class = CharClass::of(character);
        match class {
            CharClass::Whitespace | CharClass::Other => self.exact(&self.base.handle),
            CharClass::Digit => {
                let pool = self.pool(character, CapabilityClass::Digits);
                if !pool.is_empty() {
                    self.pick(character, &pool, scope, rng)
                } else if self.base.record.supports(CapabilityClass::Digits)
                    && self.base.handle.has_glyph(character)
                {
                    self.exact(&self.base.handle)
                } else {
                    self.fallback(character)
                }
            }
            CharClass::CyrillicLower | CharClass::CyrillicUpper => {
                let capability_class = if class == CharClass::CyrillicUpper {
                    CapabilityClass::CyrillicUpper
                } else {
                    CapabilityClass::CyrillicLower
                };
                let mut pool = self.pool(character, capability_class);
                // The base covers the whole Cyrillic alphabet by construction
                if self.base.handle.has_glyph(character) {
                    pool.insert(0, &self.base.handle);
                }
                if pool.is_empty() {
                    self.fallback(character)
                } else {
                    self.pick(character, &pool, scope, rng)
                }
            }
            CharClass::LatinLower | CharClass::LatinUpper => {
                let capability_class = if class == CharClass::LatinUpper {
                    CapabilityClass::LatinUpper
                } else {
                    CapabilityClass::LatinLower
                };
                let pool = self.pool(character, capability_class);
                if pool.is_empty() {
                    self.fallback(character)
                } else {
                    self.pick(character, &pool, scope, rng)
                }
            }
            CharClass::PunctuationOrSymbol => {
                // Punctuation usually ships with the digit templates
                let pool = self.pool(character, CapabilityClass::Digits);
                if !pool.is_empty() {
                    return self.pick(character, &pool, scope, rng);
                }
                if self.base.handle.has_glyph(character) {
                    return self.exact(&self.base.handle);
                }
                if let Some(font) = self
                    .fonts
                    .iter()
                    .find(|font| font.handle.has_glyph(character))
                {
                    return self.exact(&font.handle);
                }
                Selection {
                    handle: self.default.clone(),
                    degraded: true,
                }
            }
        }
    }

    /// Fonts flagged for the class that also map this exact character.
    fn pool(&self, character: char, class: CapabilityClass) -> Vec<&FontHandle> {
        self.fonts
            .iter()
            .filter(|font| font.record.supports(class) && font.handle.has_glyph(character))
            .map(|font| &font.handle)
            .collect()
    }

    /// Random choice among the pool, skipping the fonts this character already used in the word.
    /// Once every font has been used, the memory of this character starts over.
    fn pick<R: Rng + ?Sized>(
        &self,
        character: char,
        pool: &[&FontHandle],
        scope: &mut WordScope,
        rng: &mut R,
    ) -> Selection {
        let used = scope.used.entry(character).or_default();
        let mut available: Vec<&FontHandle> = pool
            .iter()
            .copied()
            .filter(|handle| !used.contains(handle))
            .collect();
        if available.is_empty() {
            used.clear();
            available = pool.to_vec();
        }

        let handle = match available.choose(rng) {
            Some(handle) => (*handle).clone(),
            None => self.base.handle.clone(),
        };
        used.push(handle.clone());

        Selection {
            handle,
            degraded: false,
        }
    }

    fn exact(&self, handle: &FontHandle) -> Selection {
        Selection {
            handle: handle.clone(),
            degraded: false,
        }
    }

    /// Base, then default, then the base again even if it cannot draw the character.
    fn fallback(&self, character: char) -> Selection {
        let handle = if self.base.handle.has_glyph(character) {
            &self.base.handle
        } else if self.default.has_glyph(character) {
            &self.default
        } else {
            &self.base.handle
        };
        log::debug!(
            "No font of the ideal class draws {:?}, falling back to {}",
            character,
            handle.name()
        );

        Selection {
            handle: handle.clone(),
            degraded: true,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::analyzer::{COMMON_SYMBOLS, CYRILLIC_LOWER, CYRILLIC_UPPER, DIGITS, LATIN_LOWER};
    use crate::font_set::tests::{record, CYRILLIC, DIGITS as DIGIT_FLAGS, LATIN};
    use crate::test_fonts::SyntheticFont;
    use rand::rngs::StdRng;
    use rand::SeedableRng as _;
    use std::collections::HashMap;
    use std::path::PathBuf;

    pub(crate) fn selectable(
        name: &str,
        characters: &str,
        flags: [bool; 6],
        coverage_score: u32,
        is_base: bool,
    ) -> SelectableFont {
        let path = format!("{name}.ttf");
        let handle = FontHandle::from_bytes(
            name.to_string(),
            PathBuf::from(&path),
            SyntheticFont::with_characters(characters).build(),
        )
        .unwrap();
        SelectableFont {
            record: record(&path, flags, coverage_score, is_base),
            handle,
        }
    }

    pub(crate) fn cyrillic_base() -> SelectableFont {
        selectable(
            "base",
            &format!("{CYRILLIC_LOWER}{CYRILLIC_UPPER} "),
            CYRILLIC,
            67,
            true,
        )
    }

    pub(crate) fn digits_font(name: &str) -> SelectableFont {
        selectable(name, &format!("{DIGITS}{COMMON_SYMBOLS}"), DIGIT_FLAGS, 46, false)
    }

    fn cyrillic_font(name: &str) -> SelectableFont {
        selectable(name, &format!("{CYRILLIC_LOWER}{CYRILLIC_UPPER}"), CYRILLIC, 66, false)
    }

    fn select_word(selector: &FontSelector, word: &str, seed: u64) -> Vec<(char, String)> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut scope = WordScope::new();
        word.chars()
            .map(|character| {
                let selection = selector.select(character, &mut scope, &mut rng);
                (character, selection.handle.name().to_string())
            })
            .collect()
    }

    #[test]
    fn characters_are_classified() {
        let expectations = [
            (' ', CharClass::Whitespace),
            ('\t', CharClass::Whitespace),
            ('7', CharClass::Digit),
            ('ж', CharClass::CyrillicLower),
            ('Ё', CharClass::CyrillicUpper),
            ('q', CharClass::LatinLower),
            ('É', CharClass::LatinUpper),
            (',', CharClass::PunctuationOrSymbol),
            ('«', CharClass::PunctuationOrSymbol),
            ('€', CharClass::PunctuationOrSymbol),
            ('+', CharClass::PunctuationOrSymbol),
            ('^', CharClass::PunctuationOrSymbol),
            ('✓', CharClass::PunctuationOrSymbol),
            ('★', CharClass::PunctuationOrSymbol),
            ('➔', CharClass::PunctuationOrSymbol),
            ('🙂', CharClass::PunctuationOrSymbol),
            ('中', CharClass::Other),
            ('²', CharClass::Other),
            ('\u{0591}', CharClass::Other),
            ('\u{0301}', CharClass::Other),
            ('\u{200B}', CharClass::Other),
        ];
        for (character, class) in expectations {
            assert_eq!(CharClass::of(character), class, "{:?}", character);
        }
    }

    #[test]
    fn whitespace_and_unclassified_characters_use_the_base() {
        let selector = FontSelector::new(cyrillic_base(), vec![digits_font("digits")]);
        for (_, name) in select_word(&selector, " 中\u{0591}", 7) {
            assert_eq!(name, "base");
        }
    }

    #[test]
    fn repeated_letters_get_distinct_fonts_when_enough_exist() {
        let selector = FontSelector::new(
            cyrillic_base(),
            vec![cyrillic_font("second"), cyrillic_font("third")],
        );

        for seed in 0..50 {
            let selections = select_word(&selector, "молоко", seed);
            let fonts_for_o: Vec<&String> = selections
                .iter()
                .filter(|(character, _)| *character == 'о')
                .map(|(_, name)| name)
                .collect();
            assert_eq!(fonts_for_o.len(), 3);
            assert_ne!(fonts_for_o[0], fonts_for_o[1]);
            assert_ne!(fonts_for_o[0], fonts_for_o[2]);
            assert_ne!(fonts_for_o[1], fonts_for_o[2]);
        }
    }

    #[test]
    fn repeats_are_bounded_when_fonts_run_out() {
        let selector = FontSelector::new(cyrillic_base(), vec![cyrillic_font("second")]);

        for seed in 0..50 {
            let mut counts: HashMap<String, usize> = HashMap::new();
            for (_, name) in select_word(&selector, "ааааа", seed) {
                *counts.entry(name).or_default() += 1;
            }
            // Five occurrences over two fonts: at most ceil(5 / 2) each
            assert!(counts.values().all(|count| *count <= 3), "{:?}", counts);
            assert_eq!(counts.values().sum::<usize>(), 5);
        }
    }

    #[test]
    fn three_fonts_share_an_odd_number_of_repeats() {
        let selector = FontSelector::new(
            cyrillic_base(),
            vec![cyrillic_font("second"), cyrillic_font("third")],
        );

        for seed in 0..50 {
            let mut counts: HashMap<String, usize> = HashMap::new();
            for (_, name) in select_word(&selector, "ааааааа", seed) {
                *counts.entry(name).or_default() += 1;
            }
            // Seven occurrences over three fonts: every font twice, one of them a third time
            assert_eq!(counts.len(), 3, "{:?}", counts);
            assert!(counts.values().all(|count| (2..=3).contains(count)), "{:?}", counts);
            assert_eq!(counts.values().sum::<usize>(), 7);
        }
    }

    #[test]
    fn a_single_font_repeats_every_time() {
        let selector = FontSelector::new(cyrillic_base(), Vec::new());

        for seed in 0..10 {
            let selections = select_word(&selector, "ааааа", seed);
            assert_eq!(selections.len(), 5);
            assert!(selections.iter().all(|(_, name)| name == "base"));
        }
    }

    #[test]
    fn the_memory_resets_with_the_scope() {
        let selector = FontSelector::new(cyrillic_base(), vec![cyrillic_font("second")]);
        let mut rng = StdRng::seed_from_u64(3);
        let mut scope = WordScope::new();

        let first = selector.select('д', &mut scope, &mut rng);
        assert_eq!(scope.used_for('д'), [first.handle.clone()]);
        scope.clear();
        assert!(scope.used_for('д').is_empty());
    }

    #[test]
    fn digits_prefer_the_digit_pool() {
        let selector = FontSelector::new(
            cyrillic_base(),
            vec![digits_font("digits-a"), digits_font("digits-b")],
        );
        for (_, name) in select_word(&selector, "2024", 11) {
            assert!(name.starts_with("digits-"), "{name}");
        }
    }

    #[test]
    fn digits_fall_back_to_a_digit_capable_base() {
        let base = selectable(
            "base",
            &format!("{CYRILLIC_LOWER}{CYRILLIC_UPPER}{DIGITS}"),
            [true, true, false, false, true, false],
            76,
            true,
        );
        let selector = FontSelector::new(base, vec![]);
        let mut scope = WordScope::new();
        let selection = selector.select('5', &mut scope, &mut StdRng::seed_from_u64(0));
        assert_eq!(selection.handle.name(), "base");
        assert!(!selection.degraded);
    }

    #[test]
    fn latin_without_latin_fonts_degrades_to_the_default() {
        let latin_capable = selectable("wide", &format!("{LATIN_LOWER} "), LATIN, 120, false);
        let latin_selector = FontSelector::new(cyrillic_base(), vec![latin_capable]);
        let selection = latin_selector.select('k', &mut WordScope::new(), &mut StdRng::seed_from_u64(0));
        assert_eq!(selection.handle.name(), "wide");
        assert!(!selection.degraded);

        let selector = FontSelector::new(cyrillic_base(), vec![digits_font("digits")]);
        let selection = selector.select('k', &mut WordScope::new(), &mut StdRng::seed_from_u64(0));
        // Nobody maps `k`: best effort with the base
        assert_eq!(selection.handle.name(), "base");
        assert!(selection.degraded);
    }

    #[test]
    fn class_flags_do_not_replace_the_glyph_probe() {
        // Flagged as Cyrillic but missing `щ`
        let sparse: String = CYRILLIC_LOWER.chars().filter(|c| *c != 'щ').collect();
        let liar = selectable("liar", &sparse, CYRILLIC, 32, false);
        let selector = FontSelector::new(cyrillic_base(), vec![liar]);

        for (_, name) in select_word(&selector, "щщщщ", 5) {
            assert_eq!(name, "base");
        }
    }

    #[test]
    fn punctuation_follows_the_documented_order() {
        let selector = FontSelector::new(cyrillic_base(), vec![digits_font("digits")]);
        assert_eq!(select_word(&selector, "!", 1)[0].1, "digits");

        // Without digit fonts the base is next, then any other font that maps the character
        let latin = selectable("latin", &format!("{LATIN_LOWER}!?"), LATIN, 28, false);
        let selector = FontSelector::new(cyrillic_base(), vec![latin]);
        assert_eq!(select_word(&selector, "?", 1)[0].1, "latin");

        let base_with_comma = selectable(
            "base",
            &format!("{CYRILLIC_LOWER}{CYRILLIC_UPPER},"),
            CYRILLIC,
            67,
            true,
        );
        let selector = FontSelector::new(base_with_comma, vec![]);
        assert_eq!(select_word(&selector, ",", 1)[0].1, "base");
    }

    #[test]
    fn the_default_font_has_the_highest_coverage() {
        let selector = FontSelector::new(
            cyrillic_base(),
            vec![digits_font("digits"), selectable("wide", LATIN_LOWER, LATIN, 400, false)],
        );
        assert_eq!(selector.default_font().name(), "wide");
        assert_eq!(selector.handles().count(), 3);
    }

    #[test]
    fn random_text_always_gets_a_font() {
        let selector = FontSelector::new(cyrillic_base(), vec![digits_font("digits")]);
        let mut rng = StdRng::seed_from_u64(42);
        let mut scope = WordScope::new();

        for _ in 0..20 {
            let text = rand_utf8::rand_utf8(&mut rng, 200).to_string();
            for character in text.chars() {
                let selection = selector.select(character, &mut scope, &mut rng);
                assert!(selector.handles().any(|handle| *handle == selection.handle));
                if is_word_boundary(character) {
                    scope.clear();
                }
            }
        }
    }
}
