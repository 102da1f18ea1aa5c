use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use serde::{Deserialize, Serialize};

use crate::analyzer::{self, FontCapabilities, FontType};
use crate::error::{ContextError, ErrorKind};
use crate::font_set::{FontRecord, FontSet};

/// How many fonts of each type a user uploads before their set is considered complete.
pub const FONT_REQUIREMENTS: [(FontType, usize); 3] = [
    (FontType::CyrillicFull, 3),
    (FontType::Digits, 2),
    (FontType::Latin, 2),
];

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct RequirementProgress {
    pub font_type: FontType,
    pub current: usize,
    pub required: usize,
}

impl RequirementProgress {
    pub fn is_met(&self) -> bool {
        self.current >= self.required
    }
}

/// What happened when a font was added to a user's library.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct RegistrationOutcome {
    pub font_type: FontType,
    pub became_base: bool,
    /// The base font this upload replaced, if any.
    pub previous_base: Option<PathBuf>,
    pub progress: Vec<RequirementProgress>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LibraryState {
    users: BTreeMap<u64, Vec<FontRecord>>,
}

impl LibraryState {
    fn fonts_mut(&mut self, user_id: u64) -> &mut Vec<FontRecord> {
        self.users.entry(user_id).or_default()
    }

    /// Makes the font at the path the only base font of the user, returning the previous one.
    fn set_base(fonts: &mut [FontRecord], font_path: &Path) -> Option<PathBuf> {
        let mut previous_base = None;
        for record in fonts.iter_mut() {
            let is_target = record.path() == font_path;
            if record.is_base && !is_target {
                previous_base = Some(record.path().to_path_buf());
            }
            record.is_base = is_target;
        }
        previous_base
    }
}

/// The fonts every user uploaded, with their capabilities and which one is their base font.
/// Kept in memory and persisted as JSON.
#[derive(Debug, Default)]
pub struct FontLibrary {
    state: Mutex<LibraryState>,
}

impl FontLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(library_path: &Path) -> Result<Self, ContextError> {
        let library_contents = std::fs::read_to_string(library_path).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Storage,
                format!("Failed to read the font library {:?}", library_path),
                &error,
            )
        })?;
        let state: LibraryState = serde_json::from_str(&library_contents).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Storage,
                format!("Failed to parse the font library {:?}", library_path),
                &error,
            )
        })?;

        Ok(FontLibrary {
            state: Mutex::new(state),
        })
    }

    /// Writes the library as JSON, through a temporary file so that readers never see half of it.
    pub fn save(&self, library_path: &Path) -> Result<(), ContextError> {
        let library_contents = {
            let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            serde_json::to_string_pretty(&*state).map_err(|error| {
                ContextError::with_error(
                    ErrorKind::Storage,
                    "Failed to serialize the font library",
                    &error,
                )
            })?
        };

        let swap_path = PathBuf::from(format!("{}.swp", library_path.display()));
        std::fs::write(&swap_path, library_contents).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Storage,
                format!("Failed to write the font library {:?}", swap_path),
                &error,
            )
        })?;
        std::fs::rename(&swap_path, library_path).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Storage,
                format!("Failed to move the font library to {:?}", library_path),
                &error,
            )
        })
    }

    /// Analyzes the font and adds it to the user's library.
    pub fn register_font(
        &self,
        user_id: u64,
        font_path: &Path,
    ) -> Result<RegistrationOutcome, ContextError> {
        let capabilities = analyzer::analyze(font_path)?;
        Ok(self.register_capabilities(user_id, capabilities))
    }

    /// Inserts or replaces the record of the font. A font covering the whole Cyrillic alphabet
    /// becomes the base font, taking the flag away from the previous one.
    pub fn register_capabilities(
        &self,
        user_id: u64,
        capabilities: FontCapabilities,
    ) -> RegistrationOutcome {
        let font_type = capabilities.font_type();
        let became_base = capabilities.is_cyrillic_full();
        let font_path = capabilities.path.clone();

        let previous_base = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let fonts = state.fonts_mut(user_id);
            let record = FontRecord::new(capabilities, false);
            match fonts.iter_mut().find(|known| known.path() == font_path) {
                Some(known) => *known = record,
                None => fonts.push(record),
            }

            if became_base {
                LibraryState::set_base(fonts, &font_path)
            } else {
                None
            }
        };

        log::info!(
            "Registered {:?} as {} for user {}{}",
            font_path,
            font_type,
            user_id,
            if became_base { " (base font)" } else { "" }
        );

        RegistrationOutcome {
            font_type,
            became_base,
            previous_base,
            progress: self.requirement_progress(user_id),
        }
    }

    /// Makes an already registered full Cyrillic font the user's base font.
    pub fn promote_to_base(
        &self,
        user_id: u64,
        font_path: &Path,
    ) -> Result<Option<PathBuf>, ContextError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let fonts = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| unknown_font(user_id, font_path))?;

        let record = fonts
            .iter()
            .find(|record| record.path() == font_path)
            .ok_or_else(|| unknown_font(user_id, font_path))?;
        if !record.capabilities.is_cyrillic_full() {
            return Err(ContextError::with_context(
                ErrorKind::Validation,
                format!(
                    "The font {:?} is {}, only cyrillic_full fonts can be a base font",
                    font_path,
                    record.font_type()
                ),
            ));
        }

        Ok(LibraryState::set_base(fonts, font_path))
    }

    /// Removes the font. When it was the base font, the remaining full Cyrillic font with the
    /// best coverage takes its place.
    pub fn remove_font(&self, user_id: u64, font_path: &Path) -> Result<FontRecord, ContextError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let fonts = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| unknown_font(user_id, font_path))?;

        let index = fonts
            .iter()
            .position(|record| record.path() == font_path)
            .ok_or_else(|| unknown_font(user_id, font_path))?;
        let removed = fonts.remove(index);

        if removed.is_base {
            let successor = fonts
                .iter()
                .filter(|record| record.capabilities.is_cyrillic_full())
                .max_by_key(|record| record.capabilities.coverage_score)
                .map(|record| record.path().to_path_buf());
            if let Some(successor) = successor {
                log::info!("{:?} replaces the removed base font of user {}", successor, user_id);
                LibraryState::set_base(fonts, &successor);
            }
        }

        Ok(removed)
    }

    /// Forgets every font of the user and returns how many there were.
    pub fn reset_user(&self, user_id: u64) -> usize {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.users.remove(&user_id).map_or(0, |fonts| fonts.len())
    }

    /// The user's fonts grouped for a render, as of now.
    pub fn fonts_for_user(&self, user_id: u64) -> FontSet {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let records = state.users.get(&user_id).cloned().unwrap_or_default();
        FontSet::from_records(records)
    }

    pub fn requirement_progress(&self, user_id: u64) -> Vec<RequirementProgress> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let fonts = state.users.get(&user_id).map(Vec::as_slice).unwrap_or_default();

        FONT_REQUIREMENTS
            .iter()
            .map(|(font_type, required)| RequirementProgress {
                font_type: *font_type,
                current: fonts
                    .iter()
                    .filter(|record| record.font_type() == *font_type)
                    .count(),
                required: *required,
            })
            .collect()
    }

    pub fn has_minimum_font_set(&self, user_id: u64) -> bool {
        self.requirement_progress(user_id)
            .iter()
            .all(RequirementProgress::is_met)
    }
}

fn unknown_font(user_id: u64, font_path: &Path) -> ContextError {
    ContextError::with_context(
        ErrorKind::Storage,
        format!("The font {:?} is not in the library of user {}", font_path, user_id),
    )
}
