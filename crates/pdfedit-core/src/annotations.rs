//! Free-text and rectangle annotations
//!
//! Annotation coordinates are used as given, in document space. Edits go
//! through the screen-to-document mapping; annotations do not.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::color::Rgb;
use crate::compositor::Compositor;
use crate::config::PipelineConfig;
use crate::edits::locate_page;
use crate::error::{PdfEditError, Result};
use crate::types::{Annotations, ItemOutcome, PdfRect, RectAnnotation, RectKind, StageOutput};

/// Opacity of highlight fills.
pub const HIGHLIGHT_OPACITY: f32 = 0.35;

/// Draws one rectangle annotation onto `page`, returning the new document.
pub type RectRenderer = fn(&Compositor<'_>, &[u8], u32, &RectAnnotation) -> Result<Vec<u8>>;

/// Rectangle renderers keyed by annotation kind.
#[derive(Clone)]
pub struct RectRegistry {
    renderers: HashMap<RectKind, RectRenderer>,
}

impl Default for RectRegistry {
    fn default() -> Self {
        Self::empty()
            .register(RectKind::Highlight, render_highlight)
            .register(RectKind::Underline, render_underline)
            .register(RectKind::Strike, render_strike)
            .register(RectKind::Box, render_box)
    }
}

impl RectRegistry {
    pub fn empty() -> Self {
        Self {
            renderers: HashMap::new(),
        }
    }

    /// Add or replace the renderer for `kind`.
    pub fn register(mut self, kind: RectKind, renderer: RectRenderer) -> Self {
        self.renderers.insert(kind, renderer);
        self
    }

    /// Renderer registered for `kind`. Kinds without one are left undrawn.
    pub fn renderer_for(&self, kind: RectKind) -> Option<RectRenderer> {
        self.renderers.get(&kind).copied()
    }
}

fn bar_color(annotation: &RectAnnotation) -> Rgb {
    annotation
        .color
        .as_deref()
        .map_or(Rgb::BLACK, Rgb::from_hex_or_black)
}

fn bar_thickness(rect: &PdfRect) -> f64 {
    (rect.height * 0.08).max(1.0)
}

fn render_highlight(
    compositor: &Compositor<'_>,
    doc: &[u8],
    page: u32,
    annotation: &RectAnnotation,
) -> Result<Vec<u8>> {
    let color = annotation
        .color
        .as_deref()
        .and_then(Rgb::from_hex)
        .unwrap_or(Rgb::YELLOW);
    compositor.fill_region(doc, page, &annotation.rect(), color, HIGHLIGHT_OPACITY)
}

fn render_underline(
    compositor: &Compositor<'_>,
    doc: &[u8],
    page: u32,
    annotation: &RectAnnotation,
) -> Result<Vec<u8>> {
    let rect = annotation.rect();
    let bar = PdfRect::new(rect.x, rect.y, rect.width, bar_thickness(&rect));
    compositor.fill_region(doc, page, &bar, bar_color(annotation), 1.0)
}

fn render_strike(
    compositor: &Compositor<'_>,
    doc: &[u8],
    page: u32,
    annotation: &RectAnnotation,
) -> Result<Vec<u8>> {
    let rect = annotation.rect();
    let t = bar_thickness(&rect);
    let bar = PdfRect::new(rect.x, rect.y + (rect.height - t) / 2.0, rect.width, t);
    compositor.fill_region(doc, page, &bar, bar_color(annotation), 1.0)
}

fn render_box(
    compositor: &Compositor<'_>,
    doc: &[u8],
    page: u32,
    annotation: &RectAnnotation,
) -> Result<Vec<u8>> {
    let r = annotation.rect();
    let t = bar_thickness(&r);
    let color = bar_color(annotation);
    if 2.0 * t >= r.width.min(r.height) {
        // No room for an outline; the bars would overlap.
        return compositor.fill_region(doc, page, &r, color, 1.0);
    }
    [
        PdfRect::new(r.x, r.y, r.width, t),
        PdfRect::new(r.x, r.y + r.height - t, r.width, t),
        PdfRect::new(r.x, r.y, t, r.height),
        PdfRect::new(r.x + r.width - t, r.y, t, r.height),
    ]
    .iter()
    .try_fold(doc.to_vec(), |doc, bar| {
        compositor.fill_region(&doc, page, bar, color, 1.0)
    })
}

/// Draw rectangle annotations, then text annotations, onto `doc`.
///
/// Rectangles are clipped to their page before the renderer sees them. Only
/// an unreadable page tree fails the stage; anything else is recorded
/// against the annotation that caused it.
pub fn apply_annotations(
    compositor: &Compositor<'_>,
    registry: &RectRegistry,
    config: &PipelineConfig,
    doc: &[u8],
    annotations: &Annotations,
) -> Result<StageOutput> {
    let geometry = compositor.engine().page_dimensions(doc)?;
    info!(
        "Applying {} rectangle and {} text annotations",
        annotations.rects.len(),
        annotations.texts.len()
    );

    let mut outcomes = Vec::with_capacity(annotations.rects.len() + annotations.texts.len());

    let document = annotations.rects.iter().fold(doc.to_vec(), |doc, rect| {
        let drawn = locate_page(rect.page, &geometry).and_then(|(page, dims)| {
            let Some(renderer) = registry.renderer_for(rect.kind) else {
                debug!("No renderer for {:?} rectangle {}, leaving it out", rect.kind, rect.id);
                return Ok(doc.clone());
            };
            let visible = rect.rect().clip_to(&dims).ok_or_else(|| {
                PdfEditError::InvalidGeometry(format!("{:?} is off page {}", rect.rect(), page))
            })?;
            let clipped = RectAnnotation {
                x: visible.x,
                y: visible.y,
                width: visible.width,
                height: visible.height,
                ..rect.clone()
            };
            renderer(compositor, &doc, page, &clipped)
        });
        match drawn {
            Ok(next) => {
                outcomes.push(ItemOutcome::applied(&rect.id));
                next
            }
            Err(e) => {
                warn!("Skipping rectangle annotation {}: {}", rect.id, e);
                outcomes.push(ItemOutcome::skipped(&rect.id, e.to_string()));
                doc
            }
        }
    });

    let document = annotations.texts.iter().fold(document, |doc, text| {
        let drawn = locate_page(text.page, &geometry).and_then(|(page, _)| {
            compositor.draw_text(
                &doc,
                page,
                text.x,
                text.y,
                &text.text,
                &text.style(config.annotation_font_size),
            )
        });
        match drawn {
            Ok(next) => {
                outcomes.push(ItemOutcome::applied(&text.id));
                next
            }
            Err(e) => {
                warn!("Skipping text annotation {}: {}", text.id, e);
                outcomes.push(ItemOutcome::skipped(&text.id, e.to_string()));
                doc
            }
        }
    });

    Ok(StageOutput {
        document,
        outcomes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::MAX_FILL_STRIPS;
    use crate::engine::LopdfEngine;
    use crate::test_support::{count, create_test_pdf, page_content, FakeEngine};
    use crate::types::{ItemStatus, TextAnnotation};
    use pretty_assertions::assert_eq;

    fn rect(id: &str, kind: RectKind) -> RectAnnotation {
        RectAnnotation {
            id: id.to_string(),
            page: 1,
            x: 50.0,
            y: 400.0,
            width: 100.0,
            height: 20.0,
            kind,
            color: None,
        }
    }

    fn text(id: &str, page: i64, body: &str) -> TextAnnotation {
        TextAnnotation {
            id: id.to_string(),
            page,
            x: 72.0,
            y: 144.0,
            text: body.to_string(),
            font_size: 0.0,
            font_family: None,
            color: None,
        }
    }

    fn run(engine: &FakeEngine, annotations: &Annotations) -> StageOutput {
        apply_annotations(
            &Compositor::new(engine),
            &RectRegistry::default(),
            &PipelineConfig::default(),
            b"%PDF",
            annotations,
        )
        .unwrap()
    }

    #[test]
    fn test_text_annotation_uses_raw_coordinates() {
        let engine = FakeEngine::letter(1);
        let out = run(
            &engine,
            &Annotations {
                texts: vec![text("t1", 1, "Note")],
                ..Annotations::default()
            },
        );

        assert_eq!(out.outcomes, vec![ItemOutcome::applied("t1")]);
        let overlay = &engine.calls()[0].1;
        assert_eq!((overlay.x, overlay.y), (72.0, 144.0));
        assert_eq!(overlay.font_size, 12.0);
        assert_eq!(overlay.text, "Note");
    }

    #[test]
    fn test_text_annotation_style_fields() {
        let engine = FakeEngine::letter(1);
        let mut styled = text("t1", 1, "Note");
        styled.font_size = 18.0;
        styled.font_family = Some("Times New Roman".to_string());
        styled.color = Some("#FF0000".to_string());
        run(
            &engine,
            &Annotations {
                texts: vec![styled],
                ..Annotations::default()
            },
        );

        let overlay = &engine.calls()[0].1;
        assert_eq!(overlay.font_size, 18.0);
        assert_eq!(overlay.font, "Times-Roman");
        assert_eq!(overlay.fill, Rgb::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_rects_draw_before_texts() {
        let engine = FakeEngine::letter(1);
        run(
            &engine,
            &Annotations {
                texts: vec![text("t1", 1, "Note")],
                rects: vec![rect("r1", RectKind::Highlight)],
            },
        );
        let calls = engine.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].1.background.is_some());
        assert_eq!(calls[1].1.text, "Note");
    }

    #[test]
    fn test_highlight_is_translucent_yellow_by_default() {
        let engine = FakeEngine::letter(1);
        run(
            &engine,
            &Annotations {
                rects: vec![rect("r1", RectKind::Highlight)],
                ..Annotations::default()
            },
        );
        let overlay = &engine.calls()[0].1;
        assert_eq!(overlay.background, Some(Rgb::YELLOW));
        assert_eq!(overlay.opacity, HIGHLIGHT_OPACITY);
        assert_eq!((overlay.x, overlay.y), (50.0, 400.0));
        assert_eq!(overlay.font_size, 20.0);
    }

    #[test]
    fn test_underline_and_strike_bars() {
        let engine = FakeEngine::letter(1);
        let mut red = rect("s", RectKind::Strike);
        red.color = Some("#F00".to_string());
        run(
            &engine,
            &Annotations {
                rects: vec![rect("u", RectKind::Underline), red],
                ..Annotations::default()
            },
        );
        let calls = engine.calls();
        assert_eq!(calls.len(), 2);

        // 20 * 0.08 = 1.6pt bar
        let underline = &calls[0].1;
        assert_eq!(underline.y, 400.0);
        assert!((underline.font_size - 1.6).abs() < 1e-9);
        assert_eq!(underline.background, Some(Rgb::BLACK));
        assert_eq!(underline.opacity, 1.0);

        let strike = &calls[1].1;
        assert!((strike.y - 409.2).abs() < 1e-9);
        assert_eq!(strike.background, Some(Rgb::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn test_box_draws_four_edges() {
        let engine = FakeEngine::letter(1);
        run(
            &engine,
            &Annotations {
                rects: vec![rect("b", RectKind::Box)],
                ..Annotations::default()
            },
        );
        let calls = engine.calls();
        // Two horizontal bars, then each 20pt side bar in strips of 1.6 / 0.278 pt.
        let strips_per_side = (20.0_f64 / (1.6 / 0.278)).ceil() as usize;
        assert_eq!(calls.len(), 2 + 2 * strips_per_side);
        assert!((calls[1].1.y - 418.4).abs() < 1e-9);
        assert!(calls
            .iter()
            .any(|(_, o)| (o.x - 148.4).abs() < 1e-9));
    }

    #[test]
    fn test_unknown_kind_draws_nothing() {
        let engine = FakeEngine::letter(1);
        let out = run(
            &engine,
            &Annotations {
                rects: vec![rect("x", RectKind::Unknown)],
                ..Annotations::default()
            },
        );
        assert_eq!(out.outcomes, vec![ItemOutcome::applied("x")]);
        assert!(engine.calls().is_empty());
        assert_eq!(out.document, b"%PDF".to_vec());
    }

    #[test]
    fn test_hairline_highlight_is_skipped_without_drawing() {
        let engine = FakeEngine::letter(1);
        let mut thin = rect("thin", RectKind::Highlight);
        thin.width = 0.001;
        thin.height = 500.0;
        let out = run(
            &engine,
            &Annotations {
                rects: vec![thin],
                ..Annotations::default()
            },
        );
        assert!(matches!(out.outcomes[0].status, ItemStatus::Skipped(_)));
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn test_thin_box_is_bounded() {
        let engine = FakeEngine::letter(1);
        let mut hairline = rect("hair", RectKind::Box);
        hairline.width = 0.02;
        hairline.height = 300.0;
        let mut narrow = rect("narrow", RectKind::Box);
        narrow.width = 2.0;
        narrow.height = 300.0;
        let out = run(
            &engine,
            &Annotations {
                rects: vec![hairline, narrow],
                ..Annotations::default()
            },
        );

        assert!(matches!(out.outcomes[0].status, ItemStatus::Skipped(_)));
        assert!(out.outcomes[1].is_applied());
        // The narrow box is too thin for an outline and is filled solid.
        let calls = engine.calls();
        assert!(!calls.is_empty() && calls.len() <= MAX_FILL_STRIPS);
        assert!(calls.iter().all(|(_, o)| o.x == 50.0));
    }

    #[test]
    fn test_rects_are_clipped_to_the_page() {
        let engine = FakeEngine::letter(1);
        let mut wide = rect("wide", RectKind::Highlight);
        wide.width = 1e8;
        let mut gone = rect("gone", RectKind::Underline);
        gone.x = -5000.0;
        let out = run(
            &engine,
            &Annotations {
                rects: vec![wide, gone],
                ..Annotations::default()
            },
        );

        assert!(out.outcomes[0].is_applied());
        assert!(matches!(out.outcomes[1].status, ItemStatus::Skipped(_)));
        let calls = engine.calls();
        assert_eq!(calls.len(), 1);
        // 562pt left on the page at 20pt: 562 / 5.56 = 101.08 -> 102 spaces.
        assert_eq!(calls[0].1.text.len(), 102);
    }

    #[test]
    fn test_thin_box_with_lopdf_finishes_quickly() {
        let pdf = create_test_pdf(1);
        let out = apply_annotations(
            &Compositor::new(&LopdfEngine),
            &RectRegistry::default(),
            &PipelineConfig::default(),
            &pdf,
            &Annotations {
                rects: vec![RectAnnotation {
                    width: 0.6,
                    height: 300.0,
                    ..rect("b", RectKind::Box)
                }],
                ..Annotations::default()
            },
        )
        .unwrap();

        assert!(out.outcomes[0].is_applied());
        let content = page_content(&out.document, 1);
        assert!(count(&content, b" re") <= MAX_FILL_STRIPS);
    }

    #[test]
    fn test_custom_renderer_replaces_default() {
        fn noop(_: &Compositor<'_>, doc: &[u8], _: u32, _: &RectAnnotation) -> Result<Vec<u8>> {
            Ok(doc.to_vec())
        }
        let registry = RectRegistry::default().register(RectKind::Highlight, noop);
        let engine = FakeEngine::letter(1);
        let out = apply_annotations(
            &Compositor::new(&engine),
            &registry,
            &PipelineConfig::default(),
            b"%PDF",
            &Annotations {
                rects: vec![rect("h", RectKind::Highlight)],
                ..Annotations::default()
            },
        )
        .unwrap();
        assert!(out.outcomes[0].is_applied());
        assert!(engine.calls().is_empty());
        assert!(RectRegistry::empty().renderer_for(RectKind::Box).is_none());
    }

    #[test]
    fn test_bad_annotations_are_isolated() {
        let engine = FakeEngine::letter(1);
        let mut flat = rect("flat", RectKind::Highlight);
        flat.height = 0.0;
        let out = run(
            &engine,
            &Annotations {
                rects: vec![flat, rect("ok", RectKind::Underline)],
                texts: vec![text("far", 9, "lost"), text("near", 1, "kept")],
            },
        );

        let statuses: Vec<(&str, bool)> = out
            .outcomes
            .iter()
            .map(|o| (o.id.as_str(), o.is_applied()))
            .collect();
        assert_eq!(
            statuses,
            vec![("flat", false), ("ok", true), ("far", false), ("near", true)]
        );
        assert_eq!(count(&out.document, b"%overlay"), 2);
    }

    #[test]
    fn test_unreadable_document_fails_stage() {
        let engine = FakeEngine::letter(1).failing_geometry();
        let err = apply_annotations(
            &Compositor::new(&engine),
            &RectRegistry::default(),
            &PipelineConfig::default(),
            b"%PDF",
            &Annotations::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PdfEditError::GeometryUnavailable(_)));
    }

    #[test]
    fn test_annotations_with_lopdf() {
        let pdf = create_test_pdf(2);
        let out = apply_annotations(
            &Compositor::new(&LopdfEngine),
            &RectRegistry::default(),
            &PipelineConfig::default(),
            &pdf,
            &Annotations {
                rects: vec![RectAnnotation {
                    page: 2,
                    ..rect("h", RectKind::Highlight)
                }],
                texts: vec![text("t", 2, "Reviewed")],
            },
        )
        .unwrap();

        assert!(out.outcomes.iter().all(|o| o.is_applied()));
        let content = page_content(&out.document, 2);
        assert_eq!(count(&content, b"(Reviewed) Tj"), 1);
        assert_eq!(count(&content, b" gs"), 1);
        assert_eq!(count(&page_content(&out.document, 1), b"Reviewed"), 0);
    }
}
