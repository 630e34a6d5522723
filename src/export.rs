//! Export composition and encoding.
//!
//! Rendering the confirmed output: the selected source region (or the whole
//! image) is stretched onto a white canvas of exactly the requested size,
//! encoded as PNG or JPEG, and written out under a generated file name.

use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result, bail};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use log::{debug, info};

use crate::geometry::NaturalRect;

/// Quality parameter for lossy exports.
pub const JPEG_QUALITY: u8 = 95;

/// Target output size confirmed in the export dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSpec {
    pub width: u32,
    pub height: u32,
    pub aspect_locked: bool,
}

/// Which size field of the export dialog a validation message refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeField {
    Width,
    Height,
}

impl SizeField {
    fn name(self) -> &'static str {
        match self {
            SizeField::Width => "width",
            SizeField::Height => "height",
        }
    }
}

/// Parse one width/height field, mapping failures to the inline message
/// shown next to the field.
pub fn parse_size_field(text: &str, field: SizeField) -> Result<u32, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(format!("{} must not be empty", field.name()));
    }
    match trimmed.parse::<u32>() {
        Ok(0) => Err(format!("{} must be greater than 0", field.name())),
        Ok(value) => Ok(value),
        Err(_) => Err(format!("{} must be a whole number", field.name())),
    }
}

/// Output encodings the tool can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeFormat {
    Png,
    Jpeg,
}

impl EncodeFormat {
    /// Pick the encoding from an output file extension. Anything that is not
    /// a JPEG extension encodes as PNG.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => EncodeFormat::Jpeg,
            _ => EncodeFormat::Png,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(EncodeFormat::from_extension)
            .unwrap_or(EncodeFormat::Png)
    }
}

/// Render the selected region of `image` (or the whole image when the rect
/// is absent or degenerate) stretched onto a white canvas of exactly
/// `spec.width` x `spec.height`.
///
/// The stretch is bilinear and anisotropic: the output always has the
/// requested dimensions even when they do not match the source region's
/// aspect ratio.
pub fn compose(
    image: &DynamicImage,
    rect: Option<NaturalRect>,
    spec: ExportSpec,
) -> Result<RgbaImage> {
    if spec.width == 0 || spec.height == 0 {
        bail!("output size must be greater than 0");
    }

    // A degenerate selection falls back to the full image rather than a
    // zero-size draw.
    let source = match rect {
        Some(r) if !r.is_degenerate() => clamp_to_bounds(r, image.width(), image.height()),
        _ => NaturalRect::full(image.width(), image.height()),
    };

    debug!(
        "composing {}x{} from source region {source:?}",
        spec.width, spec.height
    );

    let region = image.crop_imm(source.x, source.y, source.width, source.height);
    let stretched = region.resize_exact(spec.width, spec.height, FilterType::Triangle);

    // Transparent sources land on white instead of an undefined background.
    let mut canvas = RgbaImage::from_pixel(spec.width, spec.height, Rgba([255, 255, 255, 255]));
    image::imageops::overlay(&mut canvas, &stretched.to_rgba8(), 0, 0);
    Ok(canvas)
}

/// Keep a crop region inside the image bounds.
fn clamp_to_bounds(rect: NaturalRect, img_width: u32, img_height: u32) -> NaturalRect {
    let x = rect.x.min(img_width - 1);
    let y = rect.y.min(img_height - 1);
    NaturalRect {
        x,
        y,
        width: rect.width.min(img_width - x),
        height: rect.height.min(img_height - y),
    }
}

/// Encode the composed bitmap. JPEG flattens to RGB; the canvas is already
/// opaque after composition, so no color information is lost.
pub fn encode(composed: &RgbaImage, format: EncodeFormat) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    match format {
        EncodeFormat::Png => {
            composed
                .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
                .context("PNG encoding failed")?;
        }
        EncodeFormat::Jpeg => {
            let rgb = DynamicImage::from(composed.clone()).to_rgb8();
            let mut cursor = Cursor::new(&mut bytes);
            let encoder = JpegEncoder::new_with_quality(&mut cursor, JPEG_QUALITY);
            rgb.write_with_encoder(encoder)
                .context("JPEG encoding failed")?;
        }
    }
    if bytes.is_empty() {
        bail!("encoder produced no data");
    }
    Ok(bytes)
}

/// Suggested output name: `<basename>_<w>x<h>_<timestamp>.<ext>`.
///
/// Sources without a usable name fall back to `image_<w>x<h>_<timestamp>.png`.
/// A source extension the tool cannot encode also falls back to `png`, so the
/// name always matches the bytes that get written.
pub fn export_file_name(
    source: Option<&Path>,
    width: u32,
    height: u32,
    timestamp_ms: i64,
) -> String {
    let stem = source
        .and_then(|path| path.file_stem())
        .and_then(|stem| stem.to_str());
    let ext = source
        .and_then(|path| path.extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .filter(|ext| matches!(ext.as_str(), "png" | "jpg" | "jpeg"));

    match (stem, ext) {
        (Some(stem), Some(ext)) => format!("{stem}_{width}x{height}_{timestamp_ms}.{ext}"),
        (Some(stem), None) => format!("{stem}_{width}x{height}_{timestamp_ms}.png"),
        _ => format!("image_{width}x{height}_{timestamp_ms}.png"),
    }
}

/// Compose, encode, and write one finished export to `path`.
pub fn save_export(
    image: &DynamicImage,
    rect: Option<NaturalRect>,
    spec: ExportSpec,
    path: &Path,
) -> Result<()> {
    let composed = compose(image, rect, spec)?;
    let bytes = encode(&composed, EncodeFormat::from_path(path))?;
    std::fs::write(path, &bytes)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(
        "saved {}x{} export ({} bytes) to {}",
        spec.width,
        spec.height,
        bytes.len(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn spec(width: u32, height: u32) -> ExportSpec {
        ExportSpec {
            width,
            height,
            aspect_locked: false,
        }
    }

    /// 8x8 image: left half red, right half blue.
    fn two_tone() -> DynamicImage {
        let img = RgbaImage::from_fn(8, 8, |x, _| {
            if x < 4 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        });
        DynamicImage::ImageRgba8(img)
    }

    #[test]
    fn output_has_exactly_requested_dimensions() {
        let out = compose(&two_tone(), None, spec(13, 7)).unwrap();
        assert_eq!((out.width(), out.height()), (13, 7));
    }

    #[test]
    fn anisotropic_stretch_is_allowed() {
        let rect = NaturalRect {
            x: 0,
            y: 0,
            width: 4,
            height: 4,
        };
        let out = compose(&two_tone(), Some(rect), spec(20, 2)).unwrap();
        assert_eq!((out.width(), out.height()), (20, 2));
    }

    #[test]
    fn crop_rect_selects_the_right_pixels() {
        let rect = NaturalRect {
            x: 4,
            y: 0,
            width: 4,
            height: 8,
        };
        let out = compose(&two_tone(), Some(rect), spec(4, 4)).unwrap();
        // Only the blue half was drawn.
        for pixel in out.pixels() {
            assert_eq!(pixel.0, [0, 0, 255, 255]);
        }
    }

    #[test]
    fn degenerate_rect_falls_back_to_full_bounds() {
        let degenerate = NaturalRect {
            x: 2,
            y: 2,
            width: 0,
            height: 3,
        };
        let fallback = compose(&two_tone(), Some(degenerate), spec(8, 8)).unwrap();
        let full = compose(&two_tone(), None, spec(8, 8)).unwrap();
        assert_eq!(fallback.as_raw(), full.as_raw());
    }

    #[test]
    fn out_of_bounds_rect_is_clamped() {
        let rect = NaturalRect {
            x: 6,
            y: 6,
            width: 100,
            height: 100,
        };
        let out = compose(&two_tone(), Some(rect), spec(2, 2)).unwrap();
        assert_eq!((out.width(), out.height()), (2, 2));
        for pixel in out.pixels() {
            assert_eq!(pixel.0, [0, 0, 255, 255]);
        }
    }

    #[test]
    fn transparent_source_lands_on_white() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0])));
        let out = compose(&img, None, spec(4, 4)).unwrap();
        for pixel in out.pixels() {
            assert_eq!(pixel.0, [255, 255, 255, 255]);
        }
    }

    #[test]
    fn zero_output_size_is_rejected() {
        assert!(compose(&two_tone(), None, spec(0, 10)).is_err());
        assert!(compose(&two_tone(), None, spec(10, 0)).is_err());
    }

    #[test]
    fn validation_messages_for_size_fields() {
        assert_eq!(
            parse_size_field("", SizeField::Width),
            Err("width must not be empty".to_string())
        );
        assert_eq!(
            parse_size_field("0", SizeField::Width),
            Err("width must be greater than 0".to_string())
        );
        assert_eq!(
            parse_size_field("12a", SizeField::Height),
            Err("height must be a whole number".to_string())
        );
        assert_eq!(
            parse_size_field("-3", SizeField::Height),
            Err("height must be a whole number".to_string())
        );
        assert_eq!(parse_size_field("800", SizeField::Width), Ok(800));
        assert_eq!(parse_size_field("  800 ", SizeField::Height), Ok(800));
    }

    #[test]
    fn file_name_embeds_dimensions_and_timestamp() {
        let path = PathBuf::from("/photos/holiday.jpg");
        assert_eq!(
            export_file_name(Some(&path), 800, 600, 1700000000000),
            "holiday_800x600_1700000000000.jpg"
        );
    }

    #[test]
    fn file_name_falls_back_without_a_source() {
        assert_eq!(
            export_file_name(None, 320, 240, 42),
            "image_320x240_42.png"
        );
    }

    #[test]
    fn file_name_replaces_unencodable_extensions() {
        let path = PathBuf::from("scan.bmp");
        assert_eq!(
            export_file_name(Some(&path), 100, 100, 7),
            "scan_100x100_7.png"
        );
    }

    #[test]
    fn format_follows_output_extension() {
        assert_eq!(
            EncodeFormat::from_path(Path::new("out.JPG")),
            EncodeFormat::Jpeg
        );
        assert_eq!(
            EncodeFormat::from_path(Path::new("out.png")),
            EncodeFormat::Png
        );
        assert_eq!(EncodeFormat::from_path(Path::new("out")), EncodeFormat::Png);
    }

    #[test]
    fn encode_produces_decodable_png() {
        let composed = compose(&two_tone(), None, spec(16, 12)).unwrap();
        let bytes = encode(&composed, EncodeFormat::Png).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 12));
    }

    #[test]
    fn encode_produces_decodable_jpeg() {
        let composed = compose(&two_tone(), None, spec(16, 12)).unwrap();
        let bytes = encode(&composed, EncodeFormat::Jpeg).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 12));
    }
}
