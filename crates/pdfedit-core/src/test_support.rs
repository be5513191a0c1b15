//! Shared fixtures for unit tests

use std::sync::Mutex;

use lopdf::{dictionary, Dictionary, Document, Object, Stream};

use crate::engine::{RenderEngine, TextOverlay};
use crate::error::{PdfEditError, Result};
use crate::types::PageGeometry;

/// Build a Letter-sized PDF with `num_pages` pages, each showing "Page-N" in F1.
pub(crate) fn create_test_pdf(num_pages: u32) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let kids: Vec<Object> = (1..=num_pages)
        .map(|page_num| {
            let content = format!("BT /F1 12 Tf 50 700 Td (Page-{}) Tj ET", page_num);
            let content_id =
                doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => Object::Reference(pages_id),
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Contents" => Object::Reference(content_id),
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => Object::Reference(font_id) },
                },
            });
            Object::Reference(page_id)
        })
        .collect();

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => num_pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// Decoded content of one page, all content streams concatenated.
pub(crate) fn page_content(pdf: &[u8], page: u32) -> Vec<u8> {
    let doc = Document::load_mem(pdf).unwrap();
    let page_id = doc.get_pages()[&page];
    doc.get_page_content(page_id).unwrap()
}

/// Count occurrences of `needle` in `haystack`.
pub(crate) fn count(haystack: &[u8], needle: &[u8]) -> usize {
    haystack
        .windows(needle.len())
        .filter(|window| *window == needle)
        .count()
}

/// In-memory engine that records every overlay and appends a marker line per
/// call, so each document state is distinguishable.
pub(crate) struct FakeEngine {
    pages: Vec<PageGeometry>,
    fail_geometry: bool,
    fail_reserialize: bool,
    fail_texts_containing: Vec<String>,
    calls: Mutex<Vec<(u32, TextOverlay)>>,
}

impl FakeEngine {
    pub(crate) fn letter(num_pages: usize) -> Self {
        Self {
            pages: vec![
                PageGeometry {
                    width: 612.0,
                    height: 792.0,
                };
                num_pages
            ],
            fail_geometry: false,
            fail_reserialize: false,
            fail_texts_containing: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing_geometry(mut self) -> Self {
        self.fail_geometry = true;
        self
    }

    pub(crate) fn failing_reserialize(mut self) -> Self {
        self.fail_reserialize = true;
        self
    }

    /// Reject any overlay whose text contains `pattern`.
    pub(crate) fn failing_text(mut self, pattern: &str) -> Self {
        self.fail_texts_containing.push(pattern.to_string());
        self
    }

    pub(crate) fn calls(&self) -> Vec<(u32, TextOverlay)> {
        self.calls.lock().unwrap().clone()
    }
}

impl RenderEngine for FakeEngine {
    fn page_dimensions(&self, _doc: &[u8]) -> Result<Vec<PageGeometry>> {
        if self.fail_geometry {
            return Err(PdfEditError::GeometryUnavailable("unreadable".into()));
        }
        Ok(self.pages.clone())
    }

    fn render_text_overlay(
        &self,
        doc: &[u8],
        page: u32,
        overlay: &TextOverlay,
    ) -> Result<Vec<u8>> {
        if page == 0 || page as usize > self.pages.len() {
            return Err(PdfEditError::RenderFailed(format!("no page {}", page)));
        }
        if self
            .fail_texts_containing
            .iter()
            .any(|pattern| overlay.text.contains(pattern.as_str()))
        {
            return Err(PdfEditError::RenderFailed("unsupported glyph".into()));
        }
        self.calls.lock().unwrap().push((page, overlay.clone()));
        let mut out = doc.to_vec();
        out.extend_from_slice(format!("\n%overlay p{} {}", page, overlay.text).as_bytes());
        Ok(out)
    }

    fn reserialize(&self, doc: &[u8]) -> Result<Vec<u8>> {
        if self.fail_reserialize {
            return Err(PdfEditError::SerializationFailed("disk full".into()));
        }
        let mut out = doc.to_vec();
        out.extend_from_slice(b"\n%reserialized");
        Ok(out)
    }
}
