//! Pipeline tuning knobs

use serde::{Deserialize, Serialize};

use crate::color::Rgb;

/// Zoom the editing client renders at when it does not report one.
pub const DEFAULT_SCALE: f64 = 1.3;

/// Points added on every side of a cover so glyph fringes of the original
/// text do not show through.
pub const DEFAULT_COVER_PADDING: f64 = 3.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub padding: f64,
    pub default_scale: f64,
    pub cover_color: Rgb,
    pub text_color: Rgb,
    /// Size for text annotations that arrive with a zero size.
    pub annotation_font_size: f64,
    /// Run the final compaction pass.
    pub reserialize: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            padding: DEFAULT_COVER_PADDING,
            default_scale: DEFAULT_SCALE,
            cover_color: Rgb::WHITE,
            text_color: Rgb::BLACK,
            annotation_font_size: 12.0,
            reserialize: true,
        }
    }
}

impl PipelineConfig {
    pub fn with_padding(mut self, padding: f64) -> Self {
        self.padding = padding.max(0.0);
        self
    }

    pub fn with_default_scale(mut self, scale: f64) -> Self {
        if scale.is_finite() && scale > 0.0 {
            self.default_scale = scale;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"padding": 5.0}"#).unwrap();
        assert_eq!(config.padding, 5.0);
        assert_eq!(config.default_scale, DEFAULT_SCALE);
        assert_eq!(config.cover_color, Rgb::WHITE);
    }

    #[test]
    fn test_builders_ignore_invalid_values() {
        let config = PipelineConfig::default()
            .with_padding(-1.0)
            .with_default_scale(0.0);
        assert_eq!(config.padding, 0.0);
        assert_eq!(config.default_scale, DEFAULT_SCALE);
    }
}
