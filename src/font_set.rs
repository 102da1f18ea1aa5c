use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::analyzer::{CapabilityClass, FontCapabilities, FontType};
use crate::selector::CharClass;

/// A font as persisted for a user: its capabilities and whether it is the base font.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FontRecord {
    #[serde(flatten)]
    pub capabilities: FontCapabilities,
    pub is_base: bool,
}

impl FontRecord {
    pub fn new(capabilities: FontCapabilities, is_base: bool) -> Self {
        FontRecord {
            capabilities,
            is_base,
        }
    }

    pub fn path(&self) -> &Path {
        &self.capabilities.path
    }

    pub fn font_type(&self) -> FontType {
        self.capabilities.font_type()
    }

    pub fn supports(&self, class: CapabilityClass) -> bool {
        self.capabilities.supports(class)
    }
}

/// A user's fonts grouped by the role they play during selection. Built fresh for every render.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct FontSet {
    pub base: Option<FontRecord>,
    pub cyrillic: Vec<FontRecord>,
    pub latin: Vec<FontRecord>,
    pub digits: Vec<FontRecord>,
    pub other: Vec<FontRecord>,
    pub all: Vec<FontRecord>,
}

impl FontSet {
    /// Groups the records, base first and then by decreasing coverage. The first record flagged
    /// as base becomes the base of the set.
    pub fn from_records(mut records: Vec<FontRecord>) -> Self {
        records.sort_by(|left, right| {
            right.is_base.cmp(&left.is_base).then(
                right
                    .capabilities
                    .coverage_score
                    .cmp(&left.capabilities.coverage_score),
            )
        });

        let mut font_set = FontSet {
            base: records.iter().find(|record| record.is_base).cloned(),
            ..FontSet::default()
        };
        for record in &records {
            match record.font_type() {
                FontType::CyrillicFull | FontType::CyrillicPartial | FontType::Mixed => {
                    font_set.cyrillic.push(record.clone())
                }
                FontType::Latin => font_set.latin.push(record.clone()),
                FontType::Digits => font_set.digits.push(record.clone()),
                FontType::Other => font_set.other.push(record.clone()),
            }
        }
        font_set.all = records;

        font_set
    }

    /// Every distinct record of the set, the base first.
    pub fn records(&self) -> Vec<&FontRecord> {
        let mut records: Vec<&FontRecord> = Vec::with_capacity(self.all.len() + 1);
        let candidates = self.base.iter().chain(
            self.all
                .iter()
                .chain(&self.cyrillic)
                .chain(&self.latin)
                .chain(&self.digits)
                .chain(&self.other),
        );
        for record in candidates {
            if !records.iter().any(|known| known.path() == record.path()) {
                records.push(record);
            }
        }
        records
    }

    /// Which classes at least one font of the set covers. Digit templates usually carry the
    /// punctuation too, so a digits font counts as covering symbols.
    pub fn coverage_support(&self) -> CoverageSupport {
        let records = self.records();
        let any = |class: CapabilityClass| records.iter().any(|record| record.supports(class));

        CoverageSupport {
            cyrillic_lower: any(CapabilityClass::CyrillicLower),
            cyrillic_upper: any(CapabilityClass::CyrillicUpper),
            latin_lower: any(CapabilityClass::LatinLower),
            latin_upper: any(CapabilityClass::LatinUpper),
            digits: any(CapabilityClass::Digits),
            symbols: any(CapabilityClass::Symbols) || any(CapabilityClass::Digits),
        }
    }

    /// The classes the text needs that no font of the set covers.
    pub fn missing_categories(&self, text: &str) -> BTreeSet<CapabilityClass> {
        let support = self.coverage_support();
        text.chars()
            .filter_map(|character| CharClass::of(character).capability_class())
            .filter(|class| !support.supports(*class))
            .collect()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoverageSupport {
    pub cyrillic_lower: bool,
    pub cyrillic_upper: bool,
    pub latin_lower: bool,
    pub latin_upper: bool,
    pub digits: bool,
    pub symbols: bool,
}

impl CoverageSupport {
    pub fn supports(&self, class: CapabilityClass) -> bool {
        match class {
            CapabilityClass::CyrillicLower => self.cyrillic_lower,
            CapabilityClass::CyrillicUpper => self.cyrillic_upper,
            CapabilityClass::LatinLower => self.latin_lower,
            CapabilityClass::LatinUpper => self.latin_upper,
            CapabilityClass::Digits => self.digits,
            CapabilityClass::Symbols => self.symbols,
        }
    }
}
