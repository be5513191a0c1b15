//! Wire-level data model for edit requests and annotations
//!
//! These structures mirror what the editing client sends: every position is in
//! screen space (top-left origin, CSS pixels multiplied by the viewer zoom)
//! unless stated otherwise. Field names are camelCase on the wire.

use serde::{Deserialize, Serialize};

use crate::color::Rgb;

/// An axis-aligned box. Used for both screen-space and document-space boxes;
/// the function producing it says which.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PdfRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PdfRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// True when every component is finite and both extents are positive.
    pub fn is_drawable(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.width > 0.0
            && self.height > 0.0
    }

    /// The part of this box that lies on `page`, or `None` when nothing does.
    pub fn clip_to(&self, page: &PageGeometry) -> Option<PdfRect> {
        if !self.is_drawable() {
            return None;
        }
        let (left, bottom) = (self.x.max(0.0), self.y.max(0.0));
        let right = (self.x + self.width).min(page.width);
        let top = (self.y + self.height).min(page.height);
        let clipped = PdfRect::new(left, bottom, right - left, top - bottom);
        clipped.is_drawable().then_some(clipped)
    }
}

/// Width and height of one page, in points.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PageGeometry {
    pub width: f64,
    pub height: f64,
}

/// Drawing style for an overlay string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextStyle {
    pub font_size: f64,
    pub color: String,
    /// Client font name; mapped onto the standard 14 fonts when drawing.
    #[serde(default)]
    pub font_name: Option<String>,
    #[serde(default)]
    pub is_italic: bool,
    #[serde(default)]
    pub is_bold: bool,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size: 12.0,
            color: "#000000".to_string(),
            font_name: None,
            is_italic: false,
            is_bold: false,
        }
    }
}

impl TextStyle {
    pub fn with_size(font_size: f64) -> Self {
        Self {
            font_size,
            ..Self::default()
        }
    }

    pub fn fill(&self) -> Rgb {
        Rgb::from_hex_or_black(&self.color)
    }

    /// Resolve to one of the PDF standard 14 font names.
    ///
    /// Style words embedded in the name ("Arial-BoldMT", "Times-Italic") win
    /// over the `is_bold`/`is_italic` flags, which only refine a bare family.
    pub fn pdf_font_name(&self) -> &'static str {
        let Some(name) = self.font_name.as_deref() else {
            return standard_font(Family::Helvetica, self.is_bold, self.is_italic);
        };
        let lower = name.to_lowercase();
        let family = font_family(&lower);
        let named_bold = lower.contains("bold");
        let named_italic = lower.contains("italic") || lower.contains("oblique");
        if named_bold || named_italic {
            standard_font(family, named_bold, named_italic)
        } else {
            standard_font(family, self.is_bold, self.is_italic)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Times,
    Helvetica,
    Courier,
    Symbol,
    Dingbats,
}

fn font_family(lower: &str) -> Family {
    match lower {
        "serif" => return Family::Times,
        "monospace" => return Family::Courier,
        "sans-serif" | "cursive" | "fantasy" => return Family::Helvetica,
        _ => {}
    }
    if ["times", "georgia", "garamond"]
        .iter()
        .any(|k| lower.contains(k))
    {
        Family::Times
    } else if ["courier", "mono", "consolas", "monaco"]
        .iter()
        .any(|k| lower.contains(k))
    {
        Family::Courier
    } else if lower.contains("symbol") {
        Family::Symbol
    } else if lower.contains("zapf") || lower.contains("dingbat") {
        Family::Dingbats
    } else {
        Family::Helvetica
    }
}

fn standard_font(family: Family, bold: bool, italic: bool) -> &'static str {
    match (family, bold, italic) {
        (Family::Times, true, true) => "Times-BoldItalic",
        (Family::Times, true, false) => "Times-Bold",
        (Family::Times, false, true) => "Times-Italic",
        (Family::Times, false, false) => "Times-Roman",
        (Family::Helvetica, true, true) => "Helvetica-BoldOblique",
        (Family::Helvetica, true, false) => "Helvetica-Bold",
        (Family::Helvetica, false, true) => "Helvetica-Oblique",
        (Family::Helvetica, false, false) => "Helvetica",
        (Family::Courier, true, true) => "Courier-BoldOblique",
        (Family::Courier, true, false) => "Courier-Bold",
        (Family::Courier, false, true) => "Courier-Oblique",
        (Family::Courier, false, false) => "Courier",
        (Family::Symbol, _, _) => "Symbol",
        (Family::Dingbats, _, _) => "ZapfDingbats",
    }
}

/// One in-place text replacement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EditRequest {
    #[serde(default)]
    pub id: String,
    /// 1-based page index. Signed so that garbage from the client reaches the
    /// applicator and is skipped there instead of failing the whole payload.
    pub page: i64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Advisory only; never used for drawing.
    #[serde(default)]
    pub original_text: String,
    #[serde(default)]
    pub new_text: String,
    /// Screen-space font size of the original run.
    #[serde(default)]
    pub font_size: f64,
    /// Screen pixels per document point. Zero means "use the default".
    #[serde(default)]
    pub scale: f64,
}

impl EditRequest {
    pub fn screen_box(&self) -> PdfRect {
        PdfRect::new(self.x, self.y, self.width, self.height)
    }
}

/// Free text placed on a page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextAnnotation {
    #[serde(default)]
    pub id: String,
    pub page: i64,
    pub x: f64,
    pub y: f64,
    pub text: String,
    #[serde(default)]
    pub font_size: f64,
    #[serde(default)]
    pub font_family: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl TextAnnotation {
    pub fn style(&self, default_size: f64) -> TextStyle {
        TextStyle {
            font_size: if self.font_size == 0.0 {
                default_size
            } else {
                self.font_size
            },
            color: self.color.clone().unwrap_or_else(|| "#000000".to_string()),
            font_name: self.font_family.clone(),
            is_italic: false,
            is_bold: false,
        }
    }
}

/// Semantic kind of a rectangle annotation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum RectKind {
    Highlight,
    Underline,
    Strike,
    Box,
    #[default]
    #[serde(other)]
    Unknown,
}

/// A rectangle mark placed on a page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RectAnnotation {
    #[serde(default)]
    pub id: String,
    pub page: i64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(rename = "type", default)]
    pub kind: RectKind,
    #[serde(default)]
    pub color: Option<String>,
}

impl RectAnnotation {
    pub fn rect(&self) -> PdfRect {
        PdfRect::new(self.x, self.y, self.width, self.height)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Annotations {
    #[serde(default)]
    pub rects: Vec<RectAnnotation>,
    #[serde(default)]
    pub texts: Vec<TextAnnotation>,
}

impl Annotations {
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty() && self.texts.is_empty()
    }
}

/// What happened to one edit or annotation.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum ItemStatus {
    Applied,
    /// Some drawing happened but not all of it (cover without replacement text).
    Partial(String),
    Skipped(String),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ItemOutcome {
    pub id: String,
    #[serde(flatten)]
    pub status: ItemStatus,
}

impl ItemOutcome {
    pub fn applied(id: &str) -> Self {
        Self {
            id: id.to_string(),
            status: ItemStatus::Applied,
        }
    }

    pub fn partial(id: &str, reason: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            status: ItemStatus::Partial(reason.into()),
        }
    }

    pub fn skipped(id: &str, reason: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            status: ItemStatus::Skipped(reason.into()),
        }
    }

    pub fn is_applied(&self) -> bool {
        self.status == ItemStatus::Applied
    }
}

/// A complete serialized PDF. Replaced, never patched, after every overlay.
pub type DocumentState = Vec<u8>;

/// Document produced by one pipeline stage and what happened to each item.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput {
    pub document: DocumentState,
    pub outcomes: Vec<ItemOutcome>,
}
