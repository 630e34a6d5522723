//! Display-space to natural-space coordinate mapping.
//!
//! The loaded image is rendered at some on-screen size that usually differs
//! from the decoded bitmap's own dimensions. Crop selections are made in
//! display pixels and have to be translated back into the bitmap's pixel
//! grid before anything can be cropped.

use log::debug;

/// Rectangle in on-screen display pixels, relative to the drawn image's
/// top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Rectangle in the decoded bitmap's pixel grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NaturalRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl NaturalRect {
    /// The full bounds of a `width` x `height` bitmap.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    /// A zero-area rect cannot be cropped; export falls back to the full
    /// image bounds instead.
    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width over height.
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

/// Map a display-space selection into the bitmap's natural pixel space.
///
/// Each component is scaled by the per-axis ratio of natural to display size
/// and rounded to nearest independently. The rounded rect's aspect ratio can
/// therefore drift slightly from the selection's; export stretches to the
/// requested output size anyway, so the drift is accepted rather than
/// re-derived from a single scale factor.
pub fn map_to_natural(
    rect: DisplayRect,
    display_size: (f32, f32),
    natural_size: (u32, u32),
) -> NaturalRect {
    let scale_x = natural_size.0 as f32 / display_size.0;
    let scale_y = natural_size.1 as f32 / display_size.1;

    let mapped = NaturalRect {
        x: (rect.x * scale_x).round() as u32,
        y: (rect.y * scale_y).round() as u32,
        width: (rect.width * scale_x).round() as u32,
        height: (rect.height * scale_y).round() as u32,
    };

    debug!(
        "mapped {rect:?} at display {display_size:?} to {mapped:?} \
         (natural {natural_size:?}, scale {scale_x}x{scale_y})"
    );

    mapped
}

/// Dependent height for a locked width, rounded to nearest, at least 1.
pub fn height_for_width(width: u32, ratio: f32) -> u32 {
    ((width as f32 / ratio).round() as u32).max(1)
}

/// Dependent width for a locked height, rounded to nearest, at least 1.
pub fn width_for_height(height: u32, ratio: f32) -> u32 {
    ((height as f32 * ratio).round() as u32).max(1)
}
