//! Page compositor: the only code that calls the rendering engine
//!
//! The engine only knows how to draw text, so solid regions are faked with
//! text: first a run of full-block glyphs, and when the font cannot show
//! those, a run of spaces painted with a background fill.

use tracing::{debug, warn};

use crate::color::Rgb;
use crate::engine::{RenderEngine, TextOverlay};
use crate::error::{PdfEditError, Result};
use crate::types::{PdfRect, TextStyle};

const BLOCK_GLYPH: char = '\u{2588}';
/// Block glyph advance, in em.
const BLOCK_ADVANCE_EM: f64 = 0.55;
/// Helvetica space advance, in em.
const SPACE_ADVANCE_EM: f64 = 0.278;
const MIN_BLOCK_FONT_SIZE: f64 = 14.0;
const MIN_FILL_FONT_SIZE: f64 = 12.0;
/// Extra glyphs past the computed width.
pub(crate) const COVER_MARGIN_GLYPHS: usize = 3;
/// Upper bound on the glyphs in one generated run.
pub(crate) const MAX_RUN_GLYPHS: usize = 16_384;
/// Upper bound on the strips one fill is split into.
pub(crate) const MAX_FILL_STRIPS: usize = 64;

pub const DEFAULT_FONT_SIZE: f64 = 12.0;
pub const MIN_FONT_SIZE: f64 = 6.0;
/// Regions thinner than this, in points, are not filled.
pub const MIN_FILL_EXTENT: f64 = 0.25;

/// Number of glyphs of `advance_em` needed to span `width` at `font_size`.
fn glyphs_for(width: f64, font_size: f64, advance_em: f64) -> usize {
    (width / (font_size * advance_em) - 1e-9)
        .ceil()
        .clamp(0.0, MAX_RUN_GLYPHS as f64) as usize
}

/// Font size actually used for drawn text: anything unset or under the
/// minimum falls back to the default.
pub fn effective_font_size(requested: f64) -> f64 {
    if requested.is_finite() && requested >= MIN_FONT_SIZE {
        requested
    } else {
        DEFAULT_FONT_SIZE
    }
}

pub struct Compositor<'e> {
    engine: &'e dyn RenderEngine,
}

impl<'e> Compositor<'e> {
    pub fn new(engine: &'e dyn RenderEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &'e dyn RenderEngine {
        self.engine
    }

    /// Paint an opaque region over `rect` (document space).
    ///
    /// On error the input document is untouched; the caller keeps it.
    pub fn draw_cover(&self, doc: &[u8], page: u32, rect: &PdfRect, color: Rgb) -> Result<Vec<u8>> {
        let block_size = (rect.height * 1.5).max(MIN_BLOCK_FONT_SIZE);
        let blocks = glyphs_for(rect.width, block_size, BLOCK_ADVANCE_EM) + COVER_MARGIN_GLYPHS;
        let overlay = TextOverlay::new(
            BLOCK_GLYPH.to_string().repeat(blocks),
            rect.x,
            rect.y,
            block_size,
        )
        .fill(color);

        let block_err = match self.engine.render_text_overlay(doc, page, &overlay) {
            Ok(out) => return Ok(out),
            Err(e) => e,
        };
        debug!("Block cover failed on page {}, filling with spaces: {}", page, block_err);

        let fill_size = rect.height.max(MIN_FILL_FONT_SIZE);
        let spaces = glyphs_for(rect.width, fill_size, SPACE_ADVANCE_EM) + COVER_MARGIN_GLYPHS;
        self.space_fill(doc, page, rect.x, rect.y, spaces, fill_size, color, 1.0)
            .map_err(|fill_err| {
                warn!("Cover failed on page {}: {}; {}", page, block_err, fill_err);
                PdfEditError::CompositionFailed(format!(
                    "block glyphs: {}; space fill: {}",
                    block_err, fill_err
                ))
            })
    }

    /// Paint `rect` (document space) with `color` at `opacity`.
    ///
    /// A space is roughly a quarter em wide, so a rectangle narrower than
    /// that is filled as a stack of equal strips, each short enough that one
    /// space spans the width. The strip count is capped at
    /// [`MAX_FILL_STRIPS`]; past that the strips get wider than the region.
    /// The caller clips `rect` to the page first.
    pub fn fill_region(
        &self,
        doc: &[u8],
        page: u32,
        rect: &PdfRect,
        color: Rgb,
        opacity: f32,
    ) -> Result<Vec<u8>> {
        if !rect.is_drawable() || rect.width < MIN_FILL_EXTENT || rect.height < MIN_FILL_EXTENT {
            return Err(PdfEditError::InvalidGeometry(format!(
                "cannot fill {:?}",
                rect
            )));
        }
        let tallest = rect.height.min(rect.width / SPACE_ADVANCE_EM);
        let strips = (rect.height / tallest - 1e-9)
            .ceil()
            .clamp(1.0, MAX_FILL_STRIPS as f64) as usize;
        let strip = rect.height / strips as f64;
        let spaces = glyphs_for(rect.width, strip, SPACE_ADVANCE_EM).max(1);
        (0..strips).try_fold(doc.to_vec(), |doc, i| {
            let y = rect.y + i as f64 * strip;
            self.space_fill(&doc, page, rect.x, y, spaces, strip, color, opacity)
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn space_fill(
        &self,
        doc: &[u8],
        page: u32,
        x: f64,
        y: f64,
        spaces: usize,
        font_size: f64,
        color: Rgb,
        opacity: f32,
    ) -> Result<Vec<u8>> {
        let overlay = TextOverlay::new(" ".repeat(spaces), x, y, font_size)
            .fill(color)
            .background(color)
            .opacity(opacity);
        self.engine.render_text_overlay(doc, page, &overlay)
    }

    /// Draw `text` with its baseline at `(x, y)` above everything already on
    /// the page.
    pub fn draw_text(
        &self,
        doc: &[u8],
        page: u32,
        x: f64,
        y: f64,
        text: &str,
        style: &TextStyle,
    ) -> Result<Vec<u8>> {
        let text = if text.trim().is_empty() { " " } else { text };
        let overlay = TextOverlay::new(text, x, y, effective_font_size(style.font_size))
            .font(style.pdf_font_name())
            .fill(style.fill());
        self.engine.render_text_overlay(doc, page, &overlay)
    }
}
