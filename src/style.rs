use crate::types::Color;
use serde::{Deserialize, Serialize};

pub const DEFAULT_HEADER_COLOR: &str = "#1f2a44";
pub const DEFAULT_ACCENT_COLOR: &str = "#2e6df6";
pub const DEFAULT_TEXT_COLOR: &str = "#222222";
pub const DEFAULT_BACKGROUND_OPACITY: f32 = 0.12;

/// One branding value type owned by the draft and consumed read-only by the
/// composer. Colors are stored as hex strings (the form they arrive in from
/// client settings); accessors parse with a fallback to the default so a
/// malformed value never breaks rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrandingSettings {
    pub header_color: String,
    pub accent_color: String,
    pub text_color: String,
    pub font_family: String,
    /// Logo reference: registered resource id, `data:` URI, or file path.
    pub logo: Option<String>,
    /// Full-page background image reference, drawn under the content.
    pub background_image: Option<String>,
    pub background_opacity: f32,
}

impl Default for BrandingSettings {
    fn default() -> Self {
        Self {
            header_color: DEFAULT_HEADER_COLOR.to_string(),
            accent_color: DEFAULT_ACCENT_COLOR.to_string(),
            text_color: DEFAULT_TEXT_COLOR.to_string(),
            font_family: "Helvetica".to_string(),
            logo: None,
            background_image: None,
            background_opacity: DEFAULT_BACKGROUND_OPACITY,
        }
    }
}

impl BrandingSettings {
    pub fn header_color(&self) -> Color {
        parse_or(&self.header_color, DEFAULT_HEADER_COLOR)
    }

    pub fn accent_color(&self) -> Color {
        parse_or(&self.accent_color, DEFAULT_ACCENT_COLOR)
    }

    pub fn text_color(&self) -> Color {
        parse_or(&self.text_color, DEFAULT_TEXT_COLOR)
    }

    pub fn background_opacity(&self) -> f32 {
        self.background_opacity.clamp(0.0, 1.0)
    }

    /// Whether any value differs from the defaults; feeds the progress
    /// weighting, nothing else.
    pub fn is_customized(&self) -> bool {
        *self != BrandingSettings::default()
    }
}

fn parse_or(raw: &str, fallback: &str) -> Color {
    Color::from_hex(raw)
        .or_else(|| Color::from_hex(fallback))
        .unwrap_or(Color::BLACK)
}
