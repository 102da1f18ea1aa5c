use lopdf::content::Operation;
use lopdf::{Object, StringFormat};
use rand::Rng as _;
use std::{
    collections::{BTreeMap, HashMap},
    io::BufWriter,
    mem,
};
use time::OffsetDateTime;

use crate::canvas::{Canvas, Layer, Stroke};
use crate::error::{ContextError, ErrorKind};
use crate::registry::{FontHandle, GlyphMetrics, POINTS_PER_MILLIMETER};

const TO_UNICODE_HEADER: &str = "/CIDInit /ProcSet findresource begin\n\
12 dict begin\n\
begincmap\n\
/CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
/CMapName /{face_name}-UTF16 def\n\
/CMapType 2 def\n\
1 begincodespacerange\n\
<0000> <FFFF>\n\
endcodespacerange\n";

const TO_UNICODE_FOOTER: &str = "endcmap\n\
CMapName currentdict /CMap defineresource pop\n\
end\n\
end\n";

/// A font registered into the document under its resource name (`F0`, `F1`, ...).
#[derive(Debug, Clone)]
struct EmbeddedFont {
    handle: FontHandle,
    face_identifier: String,
}

impl EmbeddedFont {
    /// Inserts the font program, its descriptor and its unicode map into the document, returning
    /// the `Type0` font dictionary that references them.
    fn insert_into_document(&self, inner_document: &mut lopdf::Document) -> lopdf::Dictionary {
        use lopdf::Object::*;
        let face_metrics = self.handle.font_metrics();
        let is_cff = self.handle.has_cff_outlines();

        // CFF outlines travel as an OpenType program, TrueType ones as the raw font file
        let (font_file_key, font_stream) = if is_cff {
            (
                "FontFile3",
                lopdf::Stream::new(
                    lopdf::Dictionary::from_iter(vec![("Subtype", Name("OpenType".into()))]),
                    self.handle.bytes().to_vec(),
                ),
            )
        } else {
            (
                "FontFile2",
                lopdf::Stream::new(
                    lopdf::Dictionary::from_iter(vec![(
                        "Length1",
                        Integer(self.handle.bytes().len() as i64),
                    )]),
                    self.handle.bytes().to_vec(),
                ),
            )
        };
        let font_stream = font_stream.with_compression(false);

        let mut font_vector: Vec<(::std::string::String, lopdf::Object)> = vec![
            ("Type".into(), Name("Font".into())),
            ("Subtype".into(), Name("Type0".into())),
            (
                "BaseFont".into(),
                Name(self.face_identifier.clone().into_bytes()),
            ),
            // Glyph ids are written as two-byte codes, horizontally
            ("Encoding".into(), Name("Identity-H".into())),
        ];

        let mut font_descriptor_vector: Vec<(::std::string::String, lopdf::Object)> = vec![
            ("Type".into(), Name("FontDescriptor".into())),
            (
                "FontName".into(),
                Name(self.face_identifier.clone().into_bytes()),
            ),
            ("Ascent".into(), Integer(i64::from(face_metrics.ascent))),
            ("Descent".into(), Integer(i64::from(face_metrics.descent))),
            ("CapHeight".into(), Integer(i64::from(face_metrics.ascent))),
            ("ItalicAngle".into(), Integer(0)),
            // Non-symbolic
            ("Flags".into(), Integer(32)),
            ("StemV".into(), Integer(80)),
        ];

        let mut maximum_character_height = 0;
        let mut total_width = 0;
        let mut gid_to_character_map = BTreeMap::<u16, char>::new();
        for (glyph_id, character) in self.handle.glyph_ids() {
            if let Some(glyph_metrics) = self.handle.glyph_metrics(glyph_id) {
                maximum_character_height = maximum_character_height.max(glyph_metrics.height);
                total_width += glyph_metrics.width;
                gid_to_character_map.insert(glyph_id, character);
            }
        }

        // A `bfchar` block may hold at most 100 entries sharing the same high byte
        let mut all_gid_to_character_blocks: Vec<CmapBlock> = Vec::new();
        let mut current_block: CmapBlock = Vec::new();
        let mut current_high_byte = 0;
        for (glyph_id, character) in gid_to_character_map {
            if glyph_id >> 8 != current_high_byte || current_block.len() >= 100 {
                all_gid_to_character_blocks.push(mem::take(&mut current_block));
                current_high_byte = glyph_id >> 8;
            }
            current_block.push((glyph_id, character));
        }
        all_gid_to_character_blocks.push(current_block);

        let cid_to_unicode_map =
            generate_cid_to_unicode_map(&self.face_identifier, all_gid_to_character_blocks);
        let cid_to_unicode_map_stream_id = inner_document.add_object(lopdf::Stream::new(
            lopdf::Dictionary::new(),
            cid_to_unicode_map.into_bytes(),
        ));

        // Widths are scaled to a 1000 unit em and grouped by runs of consecutive glyph ids:
        // `20 [21 99 34]` gives the widths of the glyphs 20, 21 and 22
        let percentage_font_scaling = 1000.0 / (face_metrics.units_per_em as f32);
        let mut width_objects = Vec::<Object>::new();
        let mut run_start: Option<u16> = None;
        let mut run_widths = Vec::<Object>::new();
        for glyph_id in 0..self.handle.glyph_count() {
            match self.handle.glyph_metrics(glyph_id) {
                Some(GlyphMetrics { width, .. }) => {
                    run_start.get_or_insert(glyph_id);
                    run_widths.push(Integer((width as f32 * percentage_font_scaling) as i64));
                }
                None => {
                    log::warn!(
                        "Glyph {} of the font {} has no width, leaving it out of the width table",
                        glyph_id,
                        self.handle.name()
                    );
                    if let Some(start) = run_start.take() {
                        width_objects.push(Integer(i64::from(start)));
                        width_objects.push(Array(mem::take(&mut run_widths)));
                    }
                }
            }
        }
        if let Some(start) = run_start {
            width_objects.push(Integer(i64::from(start)));
            width_objects.push(Array(run_widths));
        }

        let mut descendant_font = lopdf::Dictionary::from_iter(vec![
            ("Type", Name("Font".into())),
            (
                "Subtype",
                Name(if is_cff { "CIDFontType0" } else { "CIDFontType2" }.into()),
            ),
            ("BaseFont", Name(self.face_identifier.clone().into())),
            (
                "CIDSystemInfo",
                Dictionary(lopdf::Dictionary::from_iter(vec![
                    ("Registry", String("Adobe".into(), StringFormat::Literal)),
                    ("Ordering", String("Identity".into(), StringFormat::Literal)),
                    ("Supplement", Integer(0)),
                ])),
            ),
            ("W", Array(width_objects)),
            ("DW", Integer(1000)),
        ]);

        let font_bounding_box = vec![
            Integer(0),
            Integer(i64::from(face_metrics.descent)),
            Integer(total_width as i64),
            Integer(maximum_character_height as i64),
        ];
        font_descriptor_vector.push((
            font_file_key.into(),
            Reference(inner_document.add_object(font_stream)),
        ));
        // Not required, but Adobe Reader wants it
        font_descriptor_vector.push(("FontBBox".into(), Array(font_bounding_box)));

        let font_descriptor_id =
            inner_document.add_object(lopdf::Dictionary::from_iter(font_descriptor_vector));
        descendant_font.set("FontDescriptor", Reference(font_descriptor_id));

        font_vector.push((
            "DescendantFonts".into(),
            Array(vec![Dictionary(descendant_font)]),
        ));
        font_vector.push(("ToUnicode".into(), Reference(cid_to_unicode_map_stream_id)));

        lopdf::Dictionary::from_iter(font_vector)
    }
}

/// The operations of one optional content layer of a page.
#[derive(Debug, Clone)]
struct PdfLayer {
    layer: Layer,
    operations: Vec<Operation>,
}

impl PdfLayer {
    /// Wraps the operations into a marked-content sequence bound to the OCG and encodes them.
    fn into_stream(mut self, ocg_reference: &str) -> Result<lopdf::Stream, ContextError> {
        use lopdf::Object::*;

        self.operations.insert(0, Operation::new("q", vec![]));
        self.operations.insert(
            0,
            Operation::new(
                "BDC",
                vec![Name("OC".into()), Name(ocg_reference.as_bytes().to_vec())],
            ),
        );
        self.operations.push(Operation::new("Q", vec![]));
        self.operations.push(Operation::new("EMC", vec![]));

        let stream_content = lopdf::content::Content {
            operations: self.operations,
        }
        .encode()
        .map_err(|error| {
            ContextError::with_error(
                ErrorKind::Backend,
                "Failed to encode the content of a PDF layer",
                &error,
            )
        })?;

        Ok(lopdf::Stream::new(lopdf::Dictionary::new(), stream_content).with_compression(false))
    }
}

/// A page and its layers, the ruling always below the ink.
#[derive(Debug, Clone)]
struct PdfPage {
    /// Page width in points.
    width: f32,
    /// Page height in points.
    height: f32,
    layers: Vec<PdfLayer>,
}

impl PdfPage {
    /// The layer of the page, created on first use.
    fn layer_mut(&mut self, layer: Layer) -> &mut PdfLayer {
        let position = match self.layers.iter().position(|existing| existing.layer == layer) {
            Some(position) => position,
            None => {
                let position = self
                    .layers
                    .iter()
                    .position(|existing| existing.layer > layer)
                    .unwrap_or(self.layers.len());
                self.layers.insert(
                    position,
                    PdfLayer {
                        layer,
                        operations: Vec::new(),
                    },
                );
                position
            }
        };
        &mut self.layers[position]
    }
}

fn millimeters_to_points(millimeters: f32) -> f32 {
    millimeters * POINTS_PER_MILLIMETER
}

/// A PDF document built page by page on top of `lopdf`. Fonts are embedded whole, text is
/// written as glyph ids through `Identity-H`, and each page groups its content into the
/// optional content layers "Grid" and "Ink".
pub struct PdfDocument {
    /// The fonts by resource name, with the object id reserved for their dictionary.
    fonts: BTreeMap<String, (lopdf::ObjectId, EmbeddedFont)>,
    pub inner_document: lopdf::Document,
    /// Used for the `ID` entry of the trailer.
    pub identifier: String,
    pub title: String,
    pages: Vec<PdfPage>,
}

impl PdfDocument {
    pub fn new(identifier: String) -> Self {
        PdfDocument {
            fonts: BTreeMap::default(),
            inner_document: lopdf::Document::with_version("1.5"),
            identifier,
            title: "Handwritten notes".into(),
            pages: Vec::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Adds a page of the given size in millimeters and returns its index.
    pub fn add_page(&mut self, page_width: f32, page_height: f32) -> usize {
        self.pages.push(PdfPage {
            width: millimeters_to_points(page_width),
            height: millimeters_to_points(page_height),
            layers: Vec::new(),
        });
        self.pages.len() - 1
    }

    /// Embeds the font and returns its resource name.
    pub fn add_font(&mut self, handle: &FontHandle) -> Result<String, ContextError> {
        if handle.glyph_ids().is_empty() {
            return Err(ContextError::with_context(
                ErrorKind::Backend,
                format!("The font {} maps no character to a glyph", handle.name()),
            ));
        }

        let face_identifier = format!("F{}", self.fonts.len());
        let font_object_id = self.inner_document.new_object_id();
        self.fonts.insert(
            face_identifier.clone(),
            (
                font_object_id,
                EmbeddedFont {
                    handle: handle.clone(),
                    face_identifier: face_identifier.clone(),
                },
            ),
        );

        Ok(face_identifier)
    }

    /// Writes the text in black with the given font at the position in millimeters. Characters
    /// the font does not map are skipped.
    pub fn write_text_to_page(
        &mut self,
        page_index: usize,
        face_identifier: &str,
        font_size: f32,
        position: [f32; 2],
        text: &str,
    ) -> Result<(), ContextError> {
        let (_, font) = self.fonts.get(face_identifier).ok_or_else(|| {
            ContextError::with_context(
                ErrorKind::Backend,
                format!("Failed to find the font {} in the document", face_identifier),
            )
        })?;

        let mut glyph_id_bytes = Vec::<u8>::with_capacity(text.len() * 2);
        for character in text.chars() {
            match font.handle.glyph_id(character) {
                Some(glyph_id) => glyph_id_bytes.extend_from_slice(&glyph_id.to_be_bytes()),
                None => log::warn!(
                    "The character {:?} is missing from the font {}",
                    character,
                    font.handle.name()
                ),
            }
        }

        let [x, y] = position;
        let operations = vec![
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![
                    Object::Name(face_identifier.as_bytes().to_vec()),
                    font_size.into(),
                ],
            ),
            Operation::new(
                "Td",
                vec![
                    millimeters_to_points(x).into(),
                    millimeters_to_points(y).into(),
                ],
            ),
            Operation::new(
                "rg",
                vec![Object::Real(0.0), Object::Real(0.0), Object::Real(0.0)],
            ),
            Operation::new(
                "Tj",
                vec![Object::String(glyph_id_bytes, StringFormat::Hexadecimal)],
            ),
            Operation::new("ET", vec![]),
        ];
        self.page_mut(page_index)?
            .layer_mut(Layer::Ink)
            .operations
            .extend(operations);

        Ok(())
    }

    /// Strokes a straight line between two points in millimeters.
    pub fn stroke_line_on_page(
        &mut self,
        page_index: usize,
        layer: Layer,
        from: [f32; 2],
        to: [f32; 2],
        stroke: Stroke,
    ) -> Result<(), ContextError> {
        let operations = vec![
            Operation::new("w", vec![stroke.width.into()]),
            Operation::new("G", vec![stroke.gray.into()]),
            Operation::new(
                "m",
                vec![
                    millimeters_to_points(from[0]).into(),
                    millimeters_to_points(from[1]).into(),
                ],
            ),
            Operation::new(
                "l",
                vec![
                    millimeters_to_points(to[0]).into(),
                    millimeters_to_points(to[1]).into(),
                ],
            ),
            Operation::new("S", vec![]),
        ];
        self.page_mut(page_index)?
            .layer_mut(layer)
            .operations
            .extend(operations);

        Ok(())
    }

    /// Assembles the catalog, the optional content groups, the fonts and the pages.
    pub fn write_all(&mut self, instance_id: String) -> Result<(), ContextError> {
        use lopdf::Object::*;
        use lopdf::StringFormat::*;

        let now = to_pdf_timestamp_format(&OffsetDateTime::now_utc());
        let document_info = lopdf::Dictionary::from_iter(vec![
            ("Trapped", "False".into()),
            ("CreationDate", String(now.clone().into_bytes(), Literal)),
            ("ModDate", String(now.into_bytes(), Literal)),
            ("Title", String(self.title.clone().into_bytes(), Literal)),
            ("Creator", String(b"scribr".to_vec(), Literal)),
            ("Producer", String(b"scribr".to_vec(), Literal)),
            (
                "Identifier",
                String(self.identifier.clone().into_bytes(), Literal),
            ),
        ]);
        let document_info_id = self.inner_document.add_object(Dictionary(document_info));

        let pages_id = self.inner_document.new_object_id();
        let mut catalog = lopdf::Dictionary::from_iter(vec![
            ("Type", "Catalog".into()),
            ("PageLayout", "OneColumn".into()),
            ("PageMode", "UseNone".into()),
            ("Pages", Reference(pages_id)),
        ]);
        let mut pages = lopdf::Dictionary::from_iter(vec![
            ("Type", "Pages".into()),
            ("Count", Integer(self.pages.len() as i64)),
        ]);

        let ocg_usage_dictionary = lopdf::Dictionary::from_iter(vec![
            ("Type", Name("OCG".into())),
            (
                "CreatorInfo",
                Dictionary(lopdf::Dictionary::from_iter(vec![
                    ("Creator", String(b"scribr".to_vec(), Literal)),
                    ("Subtype", Name("Artwork".into())),
                ])),
            ),
        ]);
        let usage_ocg_dictionary_id = self.inner_document.add_object(ocg_usage_dictionary);
        let intent_array_id = self
            .inner_document
            .add_object(Array(vec![Name("View".into()), Name("Design".into())]));

        // One OCG per layer and per page, listed in the catalog so that viewers can toggle them
        let mut page_ocgs: Vec<Vec<lopdf::ObjectId>> = Vec::with_capacity(self.pages.len());
        for page in &self.pages {
            let ocg_ids = page
                .layers
                .iter()
                .map(|layer| {
                    let ocg_dictionary = lopdf::Dictionary::from_iter(vec![
                        ("Type", Name("OCG".into())),
                        ("Name", String(layer.layer.name().into(), Literal)),
                        ("Intent", Reference(intent_array_id)),
                        ("Usage", Reference(usage_ocg_dictionary_id)),
                    ]);
                    self.inner_document.add_object(Dictionary(ocg_dictionary))
                })
                .collect();
            page_ocgs.push(ocg_ids);
        }
        let ocg_dictionary_references: Vec<lopdf::Object> = page_ocgs
            .iter()
            .flatten()
            .map(|ocg_id| Reference(*ocg_id))
            .collect();
        catalog.set(
            "OCProperties",
            Dictionary(lopdf::Dictionary::from_iter(vec![
                ("OCGs", Array(ocg_dictionary_references.clone())),
                (
                    "D",
                    Dictionary(lopdf::Dictionary::from_iter(vec![
                        ("Order", Array(ocg_dictionary_references.clone())),
                        ("RBGroups", Array(vec![])),
                        ("ON", Array(ocg_dictionary_references)),
                    ])),
                ),
            ])),
        );
        let catalog_id = self.inner_document.add_object(catalog);

        self.inner_document
            .trailer
            .set("Root", Reference(catalog_id));
        self.inner_document
            .trailer
            .set("Info", Reference(document_info_id));
        self.inner_document.trailer.set(
            "ID",
            Array(vec![
                String(self.identifier.clone().into_bytes(), Literal),
                String(instance_id.into_bytes(), Literal),
            ]),
        );

        let fonts_dictionary = self.insert_fonts_into_document();
        let fonts_dictionary_id = self.inner_document.add_object(fonts_dictionary);

        let mut page_ids = Vec::<lopdf::Object>::new();
        for (page, ocg_ids) in mem::take(&mut self.pages).into_iter().zip(page_ocgs) {
            let media_box = || {
                Array(vec![
                    Integer(0),
                    Integer(0),
                    Real(page.width),
                    Real(page.height),
                ])
            };
            let mut page_dictionary = lopdf::Dictionary::from_iter(vec![
                ("Type", "Page".into()),
                ("Rotate", Integer(0)),
                ("MediaBox", media_box()),
                ("TrimBox", media_box()),
                ("CropBox", media_box()),
                ("Parent", Reference(pages_id)),
            ]);

            let mut properties = lopdf::Dictionary::new();
            let mut merged_layer_streams = Vec::<u8>::new();
            for (index, (layer, ocg_id)) in page.layers.into_iter().zip(ocg_ids).enumerate() {
                let ocg_reference = format!("MC{index}");
                properties.set(ocg_reference.clone(), Reference(ocg_id));
                let mut stream = layer.into_stream(&ocg_reference)?;
                merged_layer_streams.append(&mut stream.content);
            }

            let mut resource_dictionary = lopdf::Dictionary::new();
            if !properties.is_empty() {
                resource_dictionary.set("Properties", Dictionary(properties));
            }
            resource_dictionary.set("Font", Reference(fonts_dictionary_id));
            let resources_page_id = self
                .inner_document
                .add_object(Dictionary(resource_dictionary));
            page_dictionary.set("Resources", Reference(resources_page_id));

            let page_content_id = self.inner_document.add_object(lopdf::Stream::new(
                lopdf::Dictionary::new(),
                merged_layer_streams,
            ));
            page_dictionary.set("Contents", Reference(page_content_id));

            page_ids.push(Reference(self.inner_document.add_object(page_dictionary)));
        }

        pages.set("Kids", Array(page_ids));
        self.inner_document
            .objects
            .insert(pages_id, Dictionary(pages));

        Ok(())
    }

    /// Drops unused objects and compresses the streams.
    pub fn optimize(&mut self) {
        self.inner_document.prune_objects();
        self.inner_document.delete_zero_length_streams();
        self.inner_document.renumber_objects();
        self.inner_document.compress();
    }

    pub fn save_to_bytes(&mut self) -> Result<Vec<u8>, ContextError> {
        let mut pdf_document_bytes = Vec::new();
        let mut writer = BufWriter::new(&mut pdf_document_bytes);
        self.inner_document.save_to(&mut writer).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Backend,
                "Error while saving the PDF document to bytes",
                &error,
            )
        })?;
        mem::drop(writer);

        Ok(pdf_document_bytes)
    }

    fn insert_fonts_into_document(&mut self) -> lopdf::Dictionary {
        let mut font_dictionary = lopdf::Dictionary::new();
        for (face_identifier, (font_object_id, font)) in &self.fonts {
            let collected_font_dictionary = font.insert_into_document(&mut self.inner_document);
            self.inner_document.objects.insert(
                *font_object_id,
                lopdf::Object::Dictionary(collected_font_dictionary),
            );
            font_dictionary.set(
                face_identifier.clone(),
                lopdf::Object::Reference(*font_object_id),
            );
        }
        font_dictionary
    }

    fn page_mut(&mut self, page_index: usize) -> Result<&mut PdfPage, ContextError> {
        self.pages.get_mut(page_index).ok_or_else(|| {
            ContextError::with_context(
                ErrorKind::Backend,
                format!("Failed to find the page with index {}", page_index),
            )
        })
    }
}

type CmapBlock = Vec<(u16, char)>;

/// Builds the `ToUnicode` CMap, characters outside of the basic plane as surrogate pairs.
fn generate_cid_to_unicode_map(face_name: &str, all_cmap_blocks: Vec<CmapBlock>) -> String {
    let mut cid_to_unicode_map = TO_UNICODE_HEADER.replace("{face_name}", face_name);

    for cmap_block in all_cmap_blocks
        .into_iter()
        .filter(|block| !block.is_empty())
    {
        cid_to_unicode_map.push_str(&format!("{} beginbfchar\n", cmap_block.len()));
        for (glyph_id, character) in cmap_block {
            let mut units = [0u16; 2];
            let utf16: String = character
                .encode_utf16(&mut units)
                .iter()
                .map(|unit| format!("{unit:04x}"))
                .collect();
            cid_to_unicode_map.push_str(&format!("<{glyph_id:04x}> <{utf16}>\n"));
        }
        cid_to_unicode_map.push_str("endbfchar\n");
    }
    cid_to_unicode_map.push_str(TO_UNICODE_FOOTER);

    cid_to_unicode_map
}

/// Formats the time as expected in PDF dates, e.g. D:20170505150224+02'00'.
fn to_pdf_timestamp_format(date: &OffsetDateTime) -> String {
    let offset = date.offset();
    let offset_sign = if offset.is_negative() { '-' } else { '+' };
    format!(
        "D:{:04}{:02}{:02}{:02}{:02}{:02}{offset_sign}{:02}'{:02}'",
        date.year(),
        u8::from(date.month()),
        date.day(),
        date.hour(),
        date.minute(),
        date.second(),
        offset.whole_hours().abs(),
        offset.minutes_past_hour().abs(),
    )
}

/// The production drawing backend: a `PdfDocument` behind the `Canvas` interface.
pub struct PdfCanvas {
    document: PdfDocument,
    /// Resource names by registered font name.
    face_identifiers: HashMap<String, String>,
    current_page: Option<usize>,
    compress_output: bool,
}

impl PdfCanvas {
    pub fn new(compress_output: bool) -> Self {
        let identifier = random_identifier();
        PdfCanvas {
            document: PdfDocument::new(identifier),
            face_identifiers: HashMap::new(),
            current_page: None,
            compress_output,
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.document.title = title.to_string();
        self
    }

    fn current_page(&self) -> Result<usize, ContextError> {
        self.current_page.ok_or_else(|| {
            ContextError::with_context(
                ErrorKind::Backend,
                "Cannot draw before the first page has begun",
            )
        })
    }
}

/// 32 hexadecimal characters, the length PDF identifiers are expected to have.
fn random_identifier() -> String {
    let mut rng = rand::thread_rng();
    (0..16).map(|_| format!("{:02X}", rng.gen::<u8>())).collect()
}

impl Canvas for PdfCanvas {
    fn register_font(&mut self, font: &FontHandle) -> Result<(), ContextError> {
        if self.face_identifiers.contains_key(font.name()) {
            return Ok(());
        }
        let face_identifier = self.document.add_font(font)?;
        self.face_identifiers
            .insert(font.name().to_string(), face_identifier);
        Ok(())
    }

    fn begin_page(&mut self, width: f32, height: f32) -> Result<(), ContextError> {
        self.current_page = Some(self.document.add_page(width, height));
        Ok(())
    }

    fn stroke_line(
        &mut self,
        layer: Layer,
        from: [f32; 2],
        to: [f32; 2],
        stroke: Stroke,
    ) -> Result<(), ContextError> {
        let page_index = self.current_page()?;
        self.document
            .stroke_line_on_page(page_index, layer, from, to, stroke)
    }

    fn show_text(
        &mut self,
        font: &FontHandle,
        font_size: f32,
        position: [f32; 2],
        text: &str,
    ) -> Result<(), ContextError> {
        let page_index = self.current_page()?;
        let face_identifier = self.face_identifiers.get(font.name()).ok_or_else(|| {
            ContextError::with_context(
                ErrorKind::Backend,
                format!("The font {} was never registered", font.name()),
            )
        })?;
        let face_identifier = face_identifier.clone();
        self.document
            .write_text_to_page(page_index, &face_identifier, font_size, position, text)
    }

    fn finish(&mut self) -> Result<Vec<u8>, ContextError> {
        self.document.write_all(random_identifier())?;
        if self.compress_output {
            self.document.optimize();
        }
        self.document.save_to_bytes()
    }
}
