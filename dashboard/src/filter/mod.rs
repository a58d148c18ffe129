mod ops;

use image::RgbaImage;
use std::fmt;
use std::str::FromStr;

/// Client-side filter applied to every rendered frame.
///
/// Exactly one is active at a time; switching takes effect on the next
/// frame, already-rendered output is never reprocessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterKind {
    #[default]
    None,
    Sketch,
    Cartoon,
    Oil,
    Emboss,
    Sepia,
}

impl FilterKind {
    pub const ALL: [FilterKind; 6] = [
        FilterKind::None,
        FilterKind::Sketch,
        FilterKind::Cartoon,
        FilterKind::Oil,
        FilterKind::Emboss,
        FilterKind::Sepia,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FilterKind::None => "none",
            FilterKind::Sketch => "sketch",
            FilterKind::Cartoon => "cartoon",
            FilterKind::Oil => "oil",
            FilterKind::Emboss => "emboss",
            FilterKind::Sepia => "sepia",
        }
    }

    fn op(self) -> Option<fn(u8, u8, u8) -> (u8, u8, u8)> {
        match self {
            FilterKind::None => None,
            FilterKind::Sketch => Some(ops::sketch),
            FilterKind::Cartoon => Some(ops::cartoon),
            FilterKind::Oil => Some(ops::oil),
            FilterKind::Emboss => Some(ops::emboss),
            FilterKind::Sepia => Some(ops::sepia),
        }
    }

    /// Transform the image in place. Dimensions never change, alpha is
    /// left untouched, and `None` (or an empty image) is a no-op.
    pub fn apply(self, img: &mut RgbaImage) {
        let Some(op) = self.op() else {
            return;
        };
        for px in img.pixels_mut() {
            let [r, g, b, a] = px.0;
            let (r, g, b) = op(r, g, b);
            px.0 = [r, g, b, a];
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FilterKind {
    type Err = UnknownFilter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(FilterKind::None),
            "sketch" => Ok(FilterKind::Sketch),
            "cartoon" => Ok(FilterKind::Cartoon),
            "oil" => Ok(FilterKind::Oil),
            "emboss" => Ok(FilterKind::Emboss),
            "sepia" => Ok(FilterKind::Sepia),
            _ => Err(UnknownFilter(s.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown filter '{0}', expected one of: none, sketch, cartoon, oil, emboss, sepia")]
pub struct UnknownFilter(pub String);
