//! Rendering engine boundary
//!
//! The pipeline never edits page content directly. Everything it draws goes
//! through [`RenderEngine`], which takes a complete document and hands back a
//! complete document. [`LopdfEngine`] is the production implementation; it
//! burns each overlay into the page as an extra content stream:
//!
//! ```text
//! q                       % pushed in front of the original content
//! ...original content...
//! Q q /EdGs3EB33333 gs 1 1 0 rg x y w h re f 0 0 0 rg BT /EdFHelvetica 12 Tf x y Td (text) Tj ET Q
//! ```
//!
//! Wrapping the original content in `q`/`Q` keeps any transformation it leaves
//! behind from leaking into the overlay.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use tracing::debug;

use crate::color::Rgb;
use crate::error::{PdfEditError, Result};
use crate::types::PageGeometry;

/// US Letter, used when a page tree carries no MediaBox at all.
const DEFAULT_PAGE: PageGeometry = PageGeometry {
    width: 612.0,
    height: 792.0,
};

/// Guard against cyclic `/Parent` chains in malformed page trees.
const MAX_TREE_DEPTH: usize = 32;

/// A single text overlay (the engine's watermark descriptor).
#[derive(Debug, Clone, PartialEq)]
pub struct TextOverlay {
    pub text: String,
    /// Baseline origin in document space.
    pub x: f64,
    pub y: f64,
    pub font_size: f64,
    /// Standard 14 font name.
    pub font: &'static str,
    pub fill: Rgb,
    /// Filled box behind the text: from the baseline up one em, as wide as
    /// the text advance.
    pub background: Option<Rgb>,
    /// 0.0 (invisible) to 1.0 (opaque).
    pub opacity: f32,
    /// Draw after the existing page content instead of before it.
    pub on_top: bool,
}

impl TextOverlay {
    pub fn new(text: impl Into<String>, x: f64, y: f64, font_size: f64) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            font_size,
            font: "Helvetica",
            fill: Rgb::BLACK,
            background: None,
            opacity: 1.0,
            on_top: true,
        }
    }

    pub fn font(mut self, font: &'static str) -> Self {
        self.font = font;
        self
    }

    pub fn fill(mut self, fill: Rgb) -> Self {
        self.fill = fill;
        self
    }

    pub fn background(mut self, background: Rgb) -> Self {
        self.background = Some(background);
        self
    }

    pub fn opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.font_size.is_finite() && self.font_size > 0.0) {
            return Err(PdfEditError::RenderFailed(format!(
                "font size {} is not positive",
                self.font_size
            )));
        }
        if !(self.x.is_finite() && self.y.is_finite()) {
            return Err(PdfEditError::RenderFailed(format!(
                "offset ({}, {}) is not finite",
                self.x, self.y
            )));
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(PdfEditError::RenderFailed(format!(
                "opacity {} outside 0..=1",
                self.opacity
            )));
        }
        Ok(())
    }
}

/// The document-level capabilities the pipeline depends on.
///
/// Every method takes the full document byte stream and, where it produces
/// one, returns a new full document byte stream.
pub trait RenderEngine: Send + Sync {
    /// Page sizes in page order (index 0 is page 1).
    fn page_dimensions(&self, doc: &[u8]) -> Result<Vec<PageGeometry>>;

    /// Burn `overlay` into the given 1-based page.
    fn render_text_overlay(&self, doc: &[u8], page: u32, overlay: &TextOverlay)
        -> Result<Vec<u8>>;

    /// Normalize and compact the document.
    fn reserialize(&self, doc: &[u8]) -> Result<Vec<u8>>;
}

/// [`RenderEngine`] backed by lopdf and the standard 14 fonts.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfEngine;

impl LopdfEngine {
    pub fn new() -> Self {
        Self
    }
}

impl RenderEngine for LopdfEngine {
    fn page_dimensions(&self, doc: &[u8]) -> Result<Vec<PageGeometry>> {
        let doc = Document::load_mem(doc)
            .map_err(|e| PdfEditError::GeometryUnavailable(e.to_string()))?;
        let pages = doc.get_pages();
        if pages.is_empty() {
            return Err(PdfEditError::GeometryUnavailable(
                "document has no pages".into(),
            ));
        }
        Ok(pages
            .into_iter()
            .map(|(page_num, page_id)| {
                media_box_geometry(&doc, page_id).unwrap_or_else(|| {
                    debug!("Page {} has no usable MediaBox, assuming Letter", page_num);
                    DEFAULT_PAGE
                })
            })
            .collect())
    }

    fn render_text_overlay(
        &self,
        doc: &[u8],
        page: u32,
        overlay: &TextOverlay,
    ) -> Result<Vec<u8>> {
        overlay.validate()?;
        let encoded = encode_win_ansi(&overlay.text).map_err(|ch| {
            PdfEditError::RenderFailed(format!(
                "glyph U+{:04X} is not available in {}",
                ch as u32, overlay.font
            ))
        })?;

        let mut doc = Document::load_mem(doc).map_err(render_err)?;
        let page_count = doc.get_pages().len();
        let page_id = *doc.get_pages().get(&page).ok_or_else(|| {
            PdfEditError::RenderFailed(format!(
                "page {} does not exist (document has {} pages)",
                page, page_count
            ))
        })?;

        let font_key = format!("EdF{}", overlay.font.replace('-', ""));
        let font = overlay.font;
        register_resource(&mut doc, page_id, b"Font", font_key.as_bytes(), |doc| {
            let mut dict = dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => Object::Name(font.as_bytes().to_vec()),
            };
            if !matches!(font, "Symbol" | "ZapfDingbats") {
                dict.set("Encoding", Object::Name(b"WinAnsiEncoding".to_vec()));
            }
            Object::Reference(doc.add_object(dict))
        })?;

        let gs_key = if overlay.opacity < 1.0 {
            let key = format!("EdGs{:08X}", overlay.opacity.to_bits());
            let alpha = overlay.opacity;
            register_resource(&mut doc, page_id, b"ExtGState", key.as_bytes(), |doc| {
                Object::Reference(doc.add_object(dictionary! {
                    "Type" => "ExtGState",
                    "ca" => Object::Real(alpha),
                    "CA" => Object::Real(alpha),
                }))
            })?;
            Some(key)
        } else {
            None
        };

        let operations = overlay_operations(overlay, encoded, &font_key, gs_key.as_deref());
        attach_content(&mut doc, page_id, operations, overlay.on_top)?;

        debug!(
            "Rendered overlay on page {} at ({:.2}, {:.2}) size {:.2}",
            page, overlay.x, overlay.y, overlay.font_size
        );
        save(&mut doc).map_err(PdfEditError::RenderFailed)
    }

    fn reserialize(&self, doc: &[u8]) -> Result<Vec<u8>> {
        let mut doc = Document::load_mem(doc)
            .map_err(|e| PdfEditError::SerializationFailed(e.to_string()))?;
        doc.prune_objects();
        doc.delete_zero_length_streams();
        doc.renumber_objects();
        doc.compress();
        save(&mut doc).map_err(PdfEditError::SerializationFailed)
    }
}

fn render_err(e: lopdf::Error) -> PdfEditError {
    PdfEditError::RenderFailed(e.to_string())
}

fn save(doc: &mut Document) -> std::result::Result<Vec<u8>, String> {
    let mut output = Vec::new();
    doc.save_to(&mut output).map_err(|e| e.to_string())?;
    Ok(output)
}

fn as_number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(v) => Some(*v as f64),
        Object::Real(v) => Some(f64::from(*v)),
        _ => None,
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Look `key` up on the page, then on its ancestors in the page tree.
fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = page_id;
    for _ in 0..MAX_TREE_DEPTH {
        let dict = doc.get_dictionary(current).ok()?;
        if let Ok(value) = dict.get(key) {
            return resolve(doc, value).cloned();
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok()?;
    }
    None
}

fn media_box_geometry(doc: &Document, page_id: ObjectId) -> Option<PageGeometry> {
    let Object::Array(items) = inherited_attribute(doc, page_id, b"MediaBox")? else {
        return None;
    };
    let values: Vec<f64> = items
        .iter()
        .filter_map(|item| resolve(doc, item).and_then(as_number))
        .collect();
    let &[llx, lly, urx, ury] = values.as_slice() else {
        return None;
    };
    let geometry = PageGeometry {
        width: (urx - llx).abs(),
        height: (ury - lly).abs(),
    };
    (geometry.width > 0.0 && geometry.height > 0.0).then_some(geometry)
}

fn page_dict_mut(doc: &mut Document, page_id: ObjectId) -> Result<&mut Dictionary> {
    doc.get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(render_err)
}

/// The page's own resource dictionary, materialised on the page when it was
/// inherited or absent so that the original content keeps its resources.
fn page_resources_mut(doc: &mut Document, page_id: ObjectId) -> Result<&mut Dictionary> {
    let entry = match doc.get_dictionary(page_id).map_err(render_err)?.get(b"Resources") {
        Ok(Object::Reference(id)) => Some(Some(*id)),
        Ok(Object::Dictionary(_)) => Some(None),
        _ => None,
    };
    let indirect = match entry {
        Some(indirect) => indirect,
        None => {
            let inherited = match inherited_attribute(doc, page_id, b"Resources") {
                Some(Object::Dictionary(dict)) => dict,
                _ => Dictionary::new(),
            };
            page_dict_mut(doc, page_id)?.set("Resources", inherited);
            None
        }
    };
    match indirect {
        Some(id) => doc
            .get_object_mut(id)
            .and_then(Object::as_dict_mut)
            .map_err(render_err),
        None => page_dict_mut(doc, page_id)?
            .get_mut(b"Resources")
            .and_then(Object::as_dict_mut)
            .map_err(render_err),
    }
}

fn resource_category_mut<'a>(
    doc: &'a mut Document,
    page_id: ObjectId,
    category: &[u8],
) -> Result<&'a mut Dictionary> {
    let indirect = match page_resources_mut(doc, page_id)?.get(category) {
        Ok(Object::Reference(id)) => Some(*id),
        _ => None,
    };
    if let Some(id) = indirect {
        return doc
            .get_object_mut(id)
            .and_then(Object::as_dict_mut)
            .map_err(render_err);
    }
    let resources = page_resources_mut(doc, page_id)?;
    if !matches!(resources.get(category), Ok(Object::Dictionary(_))) {
        resources.set(category, Dictionary::new());
    }
    resources
        .get_mut(category)
        .and_then(Object::as_dict_mut)
        .map_err(render_err)
}

/// Put a resource under `/Resources/<category>/<key>` unless one is already
/// registered under that name.
fn register_resource(
    doc: &mut Document,
    page_id: ObjectId,
    category: &[u8],
    key: &[u8],
    make: impl FnOnce(&mut Document) -> Object,
) -> Result<()> {
    if resource_category_mut(doc, page_id, category)?.has(key) {
        return Ok(());
    }
    let value = make(doc);
    resource_category_mut(doc, page_id, category)?.set(key, value);
    Ok(())
}

fn overlay_operations(
    overlay: &TextOverlay,
    encoded: Vec<u8>,
    font_key: &str,
    gs_key: Option<&str>,
) -> Vec<Operation> {
    let x = overlay.x as f32;
    let y = overlay.y as f32;
    let size = overlay.font_size as f32;
    let rgb = |c: Rgb| vec![Object::Real(c.r), Object::Real(c.g), Object::Real(c.b)];

    let mut ops = vec![Operation::new("q", vec![])];
    if let Some(key) = gs_key {
        ops.push(Operation::new(
            "gs",
            vec![Object::Name(key.as_bytes().to_vec())],
        ));
    }
    if let Some(background) = overlay.background {
        let width = text_advance(overlay.font, &overlay.text) * overlay.font_size;
        ops.push(Operation::new("rg", rgb(background)));
        ops.push(Operation::new(
            "re",
            vec![
                Object::Real(x),
                Object::Real(y),
                Object::Real(width as f32),
                Object::Real(size),
            ],
        ));
        ops.push(Operation::new("f", vec![]));
    }
    ops.extend([
        Operation::new("rg", rgb(overlay.fill)),
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![Object::Name(font_key.as_bytes().to_vec()), Object::Real(size)],
        ),
        Operation::new("Td", vec![Object::Real(x), Object::Real(y)]),
        Operation::new("Tj", vec![Object::String(encoded, StringFormat::Literal)]),
        Operation::new("ET", vec![]),
        Operation::new("Q", vec![]),
    ]);
    ops
}

fn add_stream(doc: &mut Document, operations: Vec<Operation>) -> Result<ObjectId> {
    let bytes = Content { operations }.encode().map_err(render_err)?;
    Ok(doc.add_object(Stream::new(Dictionary::new(), bytes)))
}

fn attach_content(
    doc: &mut Document,
    page_id: ObjectId,
    mut operations: Vec<Operation>,
    on_top: bool,
) -> Result<()> {
    let existing: Vec<Object> = match doc.get_dictionary(page_id).map_err(render_err)?.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };

    let contents = if existing.is_empty() {
        vec![Object::Reference(add_stream(doc, operations)?)]
    } else if on_top {
        let save_state = add_stream(doc, vec![Operation::new("q", vec![])])?;
        operations.insert(0, Operation::new("Q", vec![]));
        let overlay = add_stream(doc, operations)?;
        let mut contents = Vec::with_capacity(existing.len() + 2);
        contents.push(Object::Reference(save_state));
        contents.extend(existing);
        contents.push(Object::Reference(overlay));
        contents
    } else {
        let overlay = add_stream(doc, operations)?;
        std::iter::once(Object::Reference(overlay))
            .chain(existing)
            .collect()
    };

    page_dict_mut(doc, page_id)?.set("Contents", Object::Array(contents));
    Ok(())
}

/// Approximate advance width of `text` in em units for a standard 14 font.
pub fn text_advance(font: &str, text: &str) -> f64 {
    text.chars().map(|ch| advance_em(font, ch)).sum()
}

fn advance_em(font: &str, ch: char) -> f64 {
    if font.starts_with("Courier") {
        return 0.6;
    }
    let times = font.starts_with("Times");
    match ch {
        ' ' if times => 0.25,
        ' ' | 'i' | 'j' | 'l' | 'I' | '.' | ',' | '\'' | '|' => 0.278,
        'A'..='Z' => 0.667,
        _ if times => 0.5,
        _ => 0.556,
    }
}

/// Encode text in WinAnsiEncoding, returning the first character it cannot
/// represent.
pub fn encode_win_ansi(text: &str) -> std::result::Result<Vec<u8>, char> {
    text.chars()
        .map(|ch| match ch {
            '\t' => Ok(b' '),
            ' '..='~' | '\u{a0}'..='\u{ff}' => Ok(ch as u8),
            _ => win_ansi_extra(ch).ok_or(ch),
        })
        .collect()
}

fn win_ansi_extra(ch: char) -> Option<u8> {
    let byte = match ch {
        '€' => 0x80,
        '‚' => 0x82,
        'ƒ' => 0x83,
        '„' => 0x84,
        '…' => 0x85,
        '†' => 0x86,
        '‡' => 0x87,
        'ˆ' => 0x88,
        '‰' => 0x89,
        'Š' => 0x8A,
        '‹' => 0x8B,
        'Œ' => 0x8C,
        'Ž' => 0x8E,
        '‘' => 0x91,
        '’' => 0x92,
        '“' => 0x93,
        '”' => 0x94,
        '•' => 0x95,
        '–' => 0x96,
        '—' => 0x97,
        '˜' => 0x98,
        '™' => 0x99,
        'š' => 0x9A,
        '›' => 0x9B,
        'œ' => 0x9C,
        'ž' => 0x9E,
        'Ÿ' => 0x9F,
        _ => return None,
    };
    Some(byte)
}
