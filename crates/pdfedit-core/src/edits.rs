//! Text replacement: cover the original run, then draw the new text on top
//!
//! The document is threaded through the edits as a fold accumulator. A failed
//! edit leaves the accumulator as it was before that edit, so earlier edits
//! stay committed and later ones still run.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::compositor::Compositor;
use crate::config::PipelineConfig;
use crate::coords::{effective_scale, inflate, to_document_space};
use crate::error::{PdfEditError, Result};
use crate::types::{EditRequest, ItemOutcome, PageGeometry, StageOutput, TextStyle};

/// Resolve a 1-based page index against the document's page list.
pub(crate) fn locate_page(page: i64, geometry: &[PageGeometry]) -> Result<(u32, PageGeometry)> {
    u32::try_from(page)
        .ok()
        .filter(|p| *p >= 1)
        .and_then(|p| Some((p, *geometry.get(p as usize - 1)?)))
        .ok_or(PdfEditError::InvalidPage {
            page: page.clamp(0, u32::MAX as i64) as u32,
            page_count: geometry.len(),
        })
}

/// Apply every edit, page by page.
///
/// Only a failed page-geometry lookup is returned as an error; every other
/// failure is recorded against the edit that caused it.
pub fn apply_edits(
    compositor: &Compositor<'_>,
    config: &PipelineConfig,
    doc: &[u8],
    edits: &[EditRequest],
) -> Result<StageOutput> {
    let mut by_page: BTreeMap<i64, Vec<&EditRequest>> = BTreeMap::new();
    for edit in edits {
        by_page.entry(edit.page).or_default().push(edit);
    }

    // Overlays never resize pages, so one lookup serves every later state.
    let geometry = compositor.engine().page_dimensions(doc)?;
    info!(
        "Applying {} edits across {} pages ({} pages in document)",
        edits.len(),
        by_page.len(),
        geometry.len()
    );

    let mut outcomes = Vec::with_capacity(edits.len());
    let document = by_page
        .into_iter()
        .fold(doc.to_vec(), |doc, (page, page_edits)| {
            page_edits.into_iter().fold(doc, |doc, edit| {
                let (doc, outcome) = match locate_page(page, &geometry) {
                    Ok((page, dims)) => apply_edit(compositor, config, doc, page, &dims, edit),
                    Err(e) => {
                        warn!("Skipping edit {}: {}", edit.id, e);
                        (doc, ItemOutcome::skipped(&edit.id, e.to_string()))
                    }
                };
                outcomes.push(outcome);
                doc
            })
        });

    Ok(StageOutput {
        document,
        outcomes,
    })
}

fn apply_edit(
    compositor: &Compositor<'_>,
    config: &PipelineConfig,
    doc: Vec<u8>,
    page: u32,
    dims: &PageGeometry,
    edit: &EditRequest,
) -> (Vec<u8>, ItemOutcome) {
    let screen = edit.screen_box();
    if !screen.is_drawable() {
        let e = PdfEditError::InvalidGeometry(format!("{:?}", screen));
        warn!("Skipping edit {}: {}", edit.id, e);
        return (doc, ItemOutcome::skipped(&edit.id, e.to_string()));
    }

    let scale = effective_scale(edit.scale, config.default_scale);
    let cover = inflate(
        &to_document_space(&screen, dims.height, scale),
        config.padding,
    );

    let Some(visible) = cover.clip_to(dims) else {
        let e = PdfEditError::InvalidGeometry(format!("{:?} is off page {}", cover, page));
        warn!("Skipping edit {}: {}", edit.id, e);
        return (doc, ItemOutcome::skipped(&edit.id, e.to_string()));
    };

    let covered = match compositor.draw_cover(&doc, page, &visible, config.cover_color) {
        Ok(covered) => covered,
        Err(e) => {
            warn!("Skipping edit {}: cover failed: {}", edit.id, e);
            return (doc, ItemOutcome::skipped(&edit.id, e.to_string()));
        }
    };

    // Text sits inside the cover, inset by the padding.
    let (x, y) = (cover.x + config.padding, cover.y + config.padding);
    let style = TextStyle {
        font_size: edit.font_size / scale,
        color: config.text_color.to_hex(),
        ..TextStyle::default()
    };
    match compositor.draw_text(&covered, page, x, y, &edit.new_text, &style) {
        Ok(done) => (done, ItemOutcome::applied(&edit.id)),
        Err(e) => {
            warn!("Edit {} covered but text not drawn: {}", edit.id, e);
            (covered, ItemOutcome::partial(&edit.id, e.to_string()))
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::compositor::{COVER_MARGIN_GLYPHS, MAX_RUN_GLYPHS};
    use crate::test_support::FakeEngine;
    use proptest::prelude::*;

    fn coord() -> impl Strategy<Value = f64> {
        prop_oneof![0.0f64..1000.0, -1e12f64..1e12]
    }

    fn extent() -> impl Strategy<Value = f64> {
        prop_oneof![1e-6f64..1.0, 1.0f64..2000.0, 2000.0f64..1e13]
    }

    proptest! {
        /// Any box costs at most a cover and a text call, with bounded runs.
        #[test]
        fn edit_work_is_bounded(
            x in coord(), y in coord(), width in extent(), height in extent(),
            scale in prop_oneof![Just(0.0f64), 0.01f64..10.0],
        ) {
            let engine = FakeEngine::letter(1);
            let compositor = Compositor::new(&engine);
            let request = EditRequest {
                id: "e".to_string(),
                page: 1,
                x,
                y,
                width,
                height,
                original_text: String::new(),
                new_text: "Hi".to_string(),
                font_size: 12.0,
                scale,
            };
            let out = apply_edits(&compositor, &PipelineConfig::default(), b"%PDF", &[request])
                .unwrap();

            prop_assert_eq!(out.outcomes.len(), 1);
            let calls = engine.calls();
            prop_assert!(calls.len() <= 2);
            for (_, overlay) in &calls {
                prop_assert!(overlay.text.chars().count() <= MAX_RUN_GLYPHS + COVER_MARGIN_GLYPHS);
                prop_assert!(overlay.x.is_finite() && overlay.y.is_finite());
            }
        }
    }
}
