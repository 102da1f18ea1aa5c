//! A tiny TrueType writer for tests: just enough tables (`cmap`, `head`, `hhea`, `hmtx`, `maxp`)
//! for a face to parse, map characters and report advances. Glyphs have no outlines.
#![allow(dead_code)]

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub const UNITS_PER_EM: u16 = 1000;

pub struct SyntheticFont {
    characters: BTreeSet<char>,
    advance: u16,
    space_advance: u16,
}

impl SyntheticFont {
    pub fn with_characters(characters: &str) -> Self {
        SyntheticFont {
            characters: characters.chars().collect(),
            advance: 500,
            space_advance: 250,
        }
    }

    /// Advance of every glyph except the space, in font units.
    pub fn advance(mut self, advance: u16) -> Self {
        self.advance = advance;
        self
    }

    pub fn space_advance(mut self, space_advance: u16) -> Self {
        self.space_advance = space_advance;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let glyph_count = self.characters.len() as u16 + 1;

        let mut cmap = Vec::new();
        push_u16(&mut cmap, 0); // version
        push_u16(&mut cmap, 1); // number of encoding records
        push_u16(&mut cmap, 3); // Windows
        push_u16(&mut cmap, 10); // Unicode full repertoire
        push_u32(&mut cmap, 12); // offset of the subtable
        push_u16(&mut cmap, 12); // format
        push_u16(&mut cmap, 0); // reserved
        push_u32(&mut cmap, 16 + 12 * self.characters.len() as u32);
        push_u32(&mut cmap, 0); // language
        push_u32(&mut cmap, self.characters.len() as u32);
        for (index, character) in self.characters.iter().enumerate() {
            push_u32(&mut cmap, *character as u32);
            push_u32(&mut cmap, *character as u32);
            push_u32(&mut cmap, index as u32 + 1);
        }

        let mut head = Vec::new();
        push_u32(&mut head, 0x0001_0000); // version
        push_u32(&mut head, 0x0001_0000); // font revision
        push_u32(&mut head, 0); // checksum adjustment
        push_u32(&mut head, 0x5F0F_3CF5); // magic number
        push_u16(&mut head, 0); // flags
        push_u16(&mut head, UNITS_PER_EM);
        head.extend_from_slice(&[0; 16]); // created and modified
        for bound in [0i16, -200, self.advance as i16, 800] {
            push_u16(&mut head, bound as u16);
        }
        push_u16(&mut head, 0); // mac style
        push_u16(&mut head, 8); // lowest recommended size
        push_u16(&mut head, 2); // direction hint
        push_u16(&mut head, 0); // short offsets
        push_u16(&mut head, 0); // glyph data format

        let mut hhea = Vec::new();
        push_u32(&mut hhea, 0x0001_0000);
        push_u16(&mut hhea, 800); // ascender
        push_u16(&mut hhea, (-200i16) as u16); // descender
        push_u16(&mut hhea, 0); // line gap
        push_u16(&mut hhea, self.advance.max(self.space_advance));
        hhea.extend_from_slice(&[0; 22]); // bearings, extents, caret and reserved fields
        push_u16(&mut hhea, glyph_count); // number of horizontal metrics

        let mut hmtx = Vec::new();
        push_u16(&mut hmtx, self.advance); // .notdef
        push_u16(&mut hmtx, 0);
        for character in &self.characters {
            let advance = if *character == ' ' {
                self.space_advance
            } else {
                self.advance
            };
            push_u16(&mut hmtx, advance);
            push_u16(&mut hmtx, 0);
        }

        let mut maxp = Vec::new();
        push_u32(&mut maxp, 0x0000_5000);
        push_u16(&mut maxp, glyph_count);

        // Table records have to be sorted by tag
        let tables: [(&[u8; 4], Vec<u8>); 5] = [
            (b"cmap", cmap),
            (b"head", head),
            (b"hhea", hhea),
            (b"hmtx", hmtx),
            (b"maxp", maxp),
        ];

        let mut font = Vec::new();
        push_u32(&mut font, 0x0001_0000);
        push_u16(&mut font, tables.len() as u16);
        push_u16(&mut font, 64); // search range
        push_u16(&mut font, 2); // entry selector
        push_u16(&mut font, 16); // range shift

        let mut offset = 12 + 16 * tables.len() as u32;
        for (tag, data) in &tables {
            font.extend_from_slice(*tag);
            push_u32(&mut font, 0); // checksum
            push_u32(&mut font, offset);
            push_u32(&mut font, data.len() as u32);
            offset += padded_length(data.len()) as u32;
        }
        for (_, data) in &tables {
            font.extend_from_slice(data);
            font.resize(font.len() + padded_length(data.len()) - data.len(), 0);
        }

        font
    }

    /// Writes the font into the directory and returns its path.
    pub fn write_to(&self, directory: &Path, file_name: &str) -> PathBuf {
        let path = directory.join(file_name);
        std::fs::write(&path, self.build()).unwrap();
        path
    }
}

fn padded_length(length: usize) -> usize {
    (length + 3) & !3
}

fn push_u16(buffer: &mut Vec<u8>, value: u16) {
    buffer.extend_from_slice(&value.to_be_bytes());
}

fn push_u32(buffer: &mut Vec<u8>, value: u32) {
    buffer.extend_from_slice(&value.to_be_bytes());
}
