use owned_ttf_parser::{AsFaceRef as _, Face, OwnedFace};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use crate::analyzer::FontCapabilities;
use crate::error::{ContextError, ErrorKind};

/// Points per millimeter, the unit conversion used by the whole layout engine.
pub const POINTS_PER_MILLIMETER: f32 = 2.834646;

/// The (insofar) relevant vertical metrics of a font.
#[derive(Clone, Copy, Debug, Default)]
pub struct FontMetrics {
    /// The ascent of the font.
    pub ascent: i16,
    /// The descent of the font.
    pub descent: i16,
    /// The number of units per em of the font.
    pub units_per_em: u16,
}

/// The (insofar) relevant metrics associated to a single glyph of a font.
#[derive(Clone, Copy, Debug, Default)]
pub struct GlyphMetrics {
    /// The width of the glyph.
    pub width: u32,
    /// The height of the glyph.
    pub height: u32,
}

/// A font loaded once per process: its raw bytes (needed to embed it into documents), the parsed
/// face and the sanitized name it is known by.
pub struct LoadedFont {
    name: String,
    path: PathBuf,
    bytes: Vec<u8>,
    face: OwnedFace,
    units_per_em: u16,
}

impl std::fmt::Debug for LoadedFont {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("LoadedFont")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

/// A cheap, shareable reference to a registered font. Two handles are equal when they share the
/// loaded font, or carry the same name for the same file.
#[derive(Clone, Debug)]
pub struct FontHandle(Arc<LoadedFont>);

impl PartialEq for FontHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.0.name == other.0.name && self.0.path == other.0.path)
    }
}

impl Eq for FontHandle {}

impl FontHandle {
    /// Parses a font from bytes, under the given name.
    pub fn from_bytes(name: String, path: PathBuf, bytes: Vec<u8>) -> Result<Self, ContextError> {
        let face = OwnedFace::from_vec(bytes.clone(), 0).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Asset,
                format!("Failed to parse the font {:?}", path),
                &error,
            )
        })?;
        let units_per_em = face.as_face_ref().units_per_em();

        Ok(FontHandle(Arc::new(LoadedFont {
            name,
            path,
            bytes,
            face,
            units_per_em,
        })))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn path(&self) -> &Path {
        &self.0.path
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.0.bytes
    }

    /// Retrieve the underlying font face as a reference.
    pub(crate) fn face(&self) -> &Face<'_> {
        self.0.face.as_face_ref()
    }

    /// Grades the font against the reference character sets.
    pub fn capabilities(&self) -> FontCapabilities {
        FontCapabilities::from_face(self.path(), self.face())
    }

    /// Whether the font maps the character to a real glyph (not `.notdef`).
    pub fn has_glyph(&self, character: char) -> bool {
        self.glyph_id(character).is_some()
    }

    /// Width of the text in points, characters without a glyph count as `.notdef`.
    pub fn measure(&self, text: &str, font_size: f32) -> f32 {
        text.chars()
            .map(|character| {
                let advance = self
                    .glyph_id(character)
                    .and_then(|glyph_id| self.advance(glyph_id))
                    .or_else(|| self.advance(0))
                    .unwrap_or(self.0.units_per_em / 2);
                self.units_to_points(advance, font_size)
            })
            .sum()
    }

    /// Width of the text in points, or nothing when any of its characters has no glyph.
    pub fn try_measure(&self, text: &str, font_size: f32) -> Option<f32> {
        text.chars().try_fold(0.0, |width, character| {
            let advance = self.advance(self.glyph_id(character)?)?;
            Some(width + self.units_to_points(advance, font_size))
        })
    }

    fn units_to_points(&self, units: u16, font_size: f32) -> f32 {
        units as f32 * font_size / self.0.units_per_em as f32
    }

    fn advance(&self, glyph_id: u16) -> Option<u16> {
        self.face()
            .glyph_hor_advance(owned_ttf_parser::GlyphId(glyph_id))
    }

    /// Retrieve the font metrics from the associated font face.
    pub(crate) fn font_metrics(&self) -> FontMetrics {
        FontMetrics {
            ascent: self.face().ascender(),
            descent: self.face().descender(),
            units_per_em: self.0.units_per_em,
        }
    }

    /// Retrieve the glyph ID of a specific codepoint, which in our case is just a `char`.
    pub(crate) fn glyph_id(&self, codepoint: char) -> Option<u16> {
        self.face()
            .glyph_index(codepoint)
            .map(|glyph_id| glyph_id.0)
            .filter(|glyph_id| *glyph_id > 0)
    }

    /// Retrieve the mapping between the glyph IDs and the characters (codepoints), that specifically
    /// contains exactly the number of unicode glyphs present in the font.
    pub(crate) fn glyph_ids(&self) -> HashMap<u16, char> {
        let font_subtables = self.face().tables().cmap.map(|cmap| {
            cmap.subtables
                .into_iter()
                .filter(|font_subtable| font_subtable.is_unicode())
        });
        let Some(font_subtables) = font_subtables else {
            return HashMap::new();
        };

        let mut gid_to_codepoint_map =
            HashMap::with_capacity(self.face().number_of_glyphs().into());
        for font_subtable in font_subtables {
            font_subtable.codepoints(|codepoint| {
                if let Ok(character) = char::try_from(codepoint) {
                    if let Some(glyph_index) = font_subtable
                        .glyph_index(codepoint)
                        .filter(|index| index.0 > 0)
                    {
                        gid_to_codepoint_map
                            .entry(glyph_index.0)
                            .or_insert(character);
                    }
                }
            })
        }

        gid_to_codepoint_map
    }

    /// Retrieve the total number of glyphs present in the font face.
    pub(crate) fn glyph_count(&self) -> u16 {
        self.face().number_of_glyphs()
    }

    /// Attempt to calculate the metrics of a glyph from the associated glyph ID, taken as input.
    pub(crate) fn glyph_metrics(&self, glyph_id: u16) -> Option<GlyphMetrics> {
        let glyph_id = owned_ttf_parser::GlyphId(glyph_id);
        let width = self.face().glyph_hor_advance(glyph_id)? as u32;
        // The height is corrected by the descender, outline-less glyphs count as a full em
        let height = self
            .face()
            .glyph_bounding_box(glyph_id)
            .map(|bounding_box| {
                (bounding_box.y_max - bounding_box.y_min - self.face().descender()) as u32
            })
            .unwrap_or(self.0.units_per_em as u32);

        Some(GlyphMetrics { width, height })
    }

    /// Whether the outlines are stored as CFF (an OpenType font) rather than TrueType.
    pub(crate) fn has_cff_outlines(&self) -> bool {
        self.face().tables().cff.is_some()
    }
}

#[derive(Default)]
struct RegistryState {
    fonts: HashMap<PathBuf, FontHandle>,
    /// Sanitized names reserved by a path, including the ones still being loaded.
    names: HashMap<String, PathBuf>,
}

/// Process-wide memo of loaded fonts, keyed by file identity. Owned by the render service and
/// shared between its workers; tests create their own.
#[derive(Default)]
pub struct FontRegistry {
    state: Mutex<RegistryState>,
}

impl FontRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the font at the path once and returns the cached handle afterwards.
    pub fn resolve(&self, font_path: &Path) -> Result<FontHandle, ContextError> {
        validate_font_path(font_path)?;
        let key = std::fs::canonicalize(font_path).unwrap_or_else(|_| font_path.to_path_buf());

        let name = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(handle) = state.fonts.get(&key) {
                return Ok(handle.clone());
            }
            reserve_name(&mut state.names, &key)
        };

        // Parse outside of the lock, a concurrent caller may do the same work for the same file
        let loaded = std::fs::read(&key)
            .map_err(|error| {
                ContextError::with_error(
                    ErrorKind::Asset,
                    format!("Failed to read the font {:?}", font_path),
                    &error,
                )
            })
            .and_then(|font_bytes| {
                FontHandle::from_bytes(name, font_path.to_path_buf(), font_bytes)
            });
        let handle = match loaded {
            Ok(handle) => handle,
            Err(error) => {
                let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                if !state.fonts.contains_key(&key) {
                    state.names.retain(|_, reserved_by| reserved_by != &key);
                }
                return Err(error);
            }
        };

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = state.fonts.entry(key).or_insert(handle).clone();
        log::debug!("Registered the font {:?} as {}", font_path, handle.name());

        Ok(handle)
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fonts
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cached_paths(&self) -> Vec<PathBuf> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut paths: Vec<PathBuf> = state.fonts.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Forgets every loaded font. Handles already given out stay valid, and their names stay
    /// reserved so that no later font is registered under one of them.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.fonts.clear();
    }
}

/// Checks that the path points to a TTF/OTF file before anything is read.
fn validate_font_path(font_path: &Path) -> Result<(), ContextError> {
    if font_path.as_os_str().is_empty() {
        return Err(ContextError::with_context(
            ErrorKind::Asset,
            "The font path is empty",
        ));
    }
    if !font_path.is_file() {
        return Err(ContextError::with_context(
            ErrorKind::Asset,
            format!("The font {:?} does not exist or is not a file", font_path),
        ));
    }
    let has_font_extension = font_path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| {
            extension.eq_ignore_ascii_case("ttf") || extension.eq_ignore_ascii_case("otf")
        });
    if !has_font_extension {
        return Err(ContextError::with_context(
            ErrorKind::Asset,
            format!("The font {:?} is neither a TTF nor an OTF file", font_path),
        ));
    }

    Ok(())
}

/// Derives a name made of ASCII alphanumerics and underscores from the file stem, suffixed when
/// another file already holds it.
fn reserve_name(names: &mut HashMap<String, PathBuf>, key: &Path) -> String {
    if let Some((name, _)) = names.iter().find(|(_, path)| path.as_path() == key) {
        return name.clone();
    }

    let stem = key
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut base_name = sanitize_font_name(&stem);
    if base_name.is_empty() {
        base_name.push_str("font");
    }

    let mut name = base_name.clone();
    let mut suffix = 2;
    while names.contains_key(&name) {
        name = format!("{base_name}_{suffix}");
        suffix += 1;
    }
    names.insert(name.clone(), key.to_path_buf());

    name
}

pub fn sanitize_font_name(stem: &str) -> String {
    stem.chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() || character == '_' {
                character
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fonts::SyntheticFont;

    #[test]
    fn names_are_sanitized_and_unique() {
        let directory = tempfile::tempdir().unwrap();
        let nested = directory.path().join("other");
        std::fs::create_dir(&nested).unwrap();
        let first = SyntheticFont::with_characters("ab").write_to(directory.path(), "my hand-1.ttf");
        let second = SyntheticFont::with_characters("ab").write_to(&nested, "my hand-1.TTF");

        let registry = FontRegistry::new();
        let first = registry.resolve(&first).unwrap();
        let second = registry.resolve(&second).unwrap();

        assert_eq!(first.name(), "my_hand_1");
        assert_eq!(second.name(), "my_hand_1_2");
        assert_ne!(first, second);
    }

    #[test]
    fn resolving_twice_returns_the_cached_handle() {
        let directory = tempfile::tempdir().unwrap();
        let path = SyntheticFont::with_characters("abc").write_to(directory.path(), "hand.ttf");

        let registry = FontRegistry::new();
        let first = registry.resolve(&path).unwrap();
        let second = registry.resolve(&path).unwrap();

        assert!(Arc::ptr_eq(&first.0, &second.0));
        assert_eq!(registry.len(), 1);

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn names_stay_unique_across_clears_and_failures() {
        let directory = tempfile::tempdir().unwrap();
        let nested = directory.path().join("other");
        std::fs::create_dir(&nested).unwrap();
        let corrupt = directory.path().join("hand.ttf");
        std::fs::write(&corrupt, b"not a font at all").unwrap();
        let nested_hand = SyntheticFont::with_characters("ab").write_to(&nested, "hand.ttf");

        let registry = FontRegistry::new();
        assert!(registry.resolve(&corrupt).is_err());
        // The failed load gave its name back
        let first = registry.resolve(&nested_hand).unwrap();
        assert_eq!(first.name(), "hand");

        registry.clear();
        let replacement = SyntheticFont::with_characters("xyz").write_to(directory.path(), "hand.ttf");
        let second = registry.resolve(&replacement).unwrap();
        assert_eq!(second.name(), "hand_2");
        assert_ne!(first, second);

        // Reloading the same file after a clear keeps its name and compares equal
        let reloaded = registry.resolve(&nested_hand).unwrap();
        assert_eq!(reloaded.name(), "hand");
        assert_eq!(first, reloaded);
    }

    #[test]
    fn concurrent_resolution_yields_equivalent_handles() {
        let directory = tempfile::tempdir().unwrap();
        let path = SyntheticFont::with_characters("abc").write_to(directory.path(), "hand.ttf");
        let registry = Arc::new(FontRegistry::new());

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let path = path.clone();
                std::thread::spawn(move || registry.resolve(&path).unwrap())
            })
            .collect();
        let handles: Vec<FontHandle> = workers
            .into_iter()
            .map(|worker| worker.join().unwrap())
            .collect();

        assert!(handles.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn invalid_paths_are_asset_errors() {
        let directory = tempfile::tempdir().unwrap();
        let text_file = directory.path().join("hand.txt");
        std::fs::write(&text_file, b"hello").unwrap();
        let corrupt = directory.path().join("corrupt.otf");
        std::fs::write(&corrupt, b"not a font at all").unwrap();

        let registry = FontRegistry::new();
        for path in [
            PathBuf::new(),
            directory.path().join("missing.ttf"),
            directory.path().to_path_buf(),
            text_file,
            corrupt,
        ] {
            let error = registry.resolve(&path).unwrap_err();
            assert_eq!(error.kind(), ErrorKind::Asset, "{:?}", path);
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn glyph_presence_and_measurement() {
        let bytes = SyntheticFont::with_characters("ab ").build();
        let handle = FontHandle::from_bytes("hand".into(), PathBuf::from("hand.ttf"), bytes).unwrap();

        assert!(handle.has_glyph('a'));
        assert!(!handle.has_glyph('z'));
        // 500 units per glyph and 250 for the space, at 1000 units per em
        assert_eq!(handle.measure("ab a", 10.0), 17.5);
        assert_eq!(handle.try_measure("ab", 10.0), Some(10.0));
        assert_eq!(handle.try_measure("az", 10.0), None);
        // Missing glyphs are measured as `.notdef`
        assert_eq!(handle.measure("z", 10.0), 5.0);
    }
}
