//! Coordinate transformation between screen space and document space
//!
//! Screen space: top-left origin, client pixels (points multiplied by the
//! viewer zoom). Document space: bottom-left origin, PDF points.

use crate::types::PdfRect;

/// Replace a missing or unusable zoom factor with `default`.
pub fn effective_scale(scale: f64, default: f64) -> f64 {
    if scale.is_finite() && scale > 0.0 {
        scale
    } else {
        default
    }
}

/// Convert a screen-space box to document space (flip Y, divide by scale).
pub fn to_document_space(screen: &PdfRect, page_height: f64, scale: f64) -> PdfRect {
    let width = screen.width / scale;
    let height = screen.height / scale;
    PdfRect {
        x: screen.x / scale,
        y: page_height - screen.y / scale - height,
        width,
        height,
    }
}

/// Inverse of [`to_document_space`].
pub fn to_screen_space(doc: &PdfRect, page_height: f64, scale: f64) -> PdfRect {
    PdfRect {
        x: doc.x * scale,
        y: (page_height - doc.y - doc.height) * scale,
        width: doc.width * scale,
        height: doc.height * scale,
    }
}

/// Grow a box by `padding` on every side.
pub fn inflate(rect: &PdfRect, padding: f64) -> PdfRect {
    PdfRect {
        x: rect.x - padding,
        y: rect.y - padding,
        width: rect.width + 2.0 * padding,
        height: rect.height + 2.0 * padding,
    }
}
