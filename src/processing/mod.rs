use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use tracing::debug;

use crate::errors::LogoError;
use crate::models::{LogoSize, ALL_SIZES};

/// Result of rendering one source image into every fixed size.
///
/// Sizes are processed independently: a failure on one size never blocks
/// the others, so callers get the renders that worked plus one message
/// per size that did not.
#[derive(Debug, Default)]
pub struct NormalizeOutcome {
    pub rendered: Vec<(LogoSize, Vec<u8>)>,
    pub failures: Vec<String>,
}

impl NormalizeOutcome {
    pub fn error_summary(&self) -> String {
        self.failures.join("; ")
    }
}

#[derive(Clone, Default)]
pub struct ImageProcessor;

impl ImageProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Render the source into all five fixed sizes as square transparent
    /// PNGs. Decode happens once; SVG input fails every size because the
    /// raster pipeline cannot handle it.
    pub fn normalize_all(&self, data: &[u8]) -> NormalizeOutcome {
        let mut outcome = NormalizeOutcome::default();

        if is_svg(data) {
            outcome
                .failures
                .push("svg input is not supported".to_string());
            return outcome;
        }

        let img = match image::load_from_memory(data) {
            Ok(img) => img,
            Err(e) => {
                outcome.failures.push(format!("decode failed: {e}"));
                return outcome;
            }
        };

        for size in ALL_SIZES {
            match render_size(&img, size.pixels()) {
                Ok(png) => outcome.rendered.push((size, png)),
                Err(e) => outcome.failures.push(format!("{size}: {e}")),
            }
        }

        debug!(
            "Normalized image: {} sizes rendered, {} failed",
            outcome.rendered.len(),
            outcome.failures.len()
        );
        outcome
    }

    /// Flatten transparency onto an opaque background color. Request-time
    /// only; stored artifacts always keep their alpha channel.
    pub fn apply_background(&self, png_data: &[u8], color: &str) -> Result<Vec<u8>, LogoError> {
        let [bg_r, bg_g, bg_b] = parse_hex_color(color)?;

        let img = image::load_from_memory(png_data)?.to_rgba8();
        let (width, height) = img.dimensions();

        let mut flattened = RgbaImage::new(width, height);
        for (x, y, pixel) in img.enumerate_pixels() {
            let alpha = u16::from(pixel[3]);
            let blend = |fg: u8, bg: u8| -> u8 {
                ((u16::from(fg) * alpha + u16::from(bg) * (255 - alpha)) / 255) as u8
            };
            flattened.put_pixel(
                x,
                y,
                Rgba([
                    blend(pixel[0], bg_r),
                    blend(pixel[1], bg_g),
                    blend(pixel[2], bg_b),
                    255,
                ]),
            );
        }

        let mut out = Vec::new();
        flattened.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
        Ok(out)
    }
}

/// Scale to fit within a square of `target` pixels (upscaling smaller
/// sources), then center on a transparent canvas. Never crops.
fn render_size(img: &DynamicImage, target: u32) -> Result<Vec<u8>, LogoError> {
    let resized = img.resize(target, target, FilterType::Lanczos3).to_rgba8();

    let mut canvas = RgbaImage::from_pixel(target, target, Rgba([0, 0, 0, 0]));
    let x = i64::from((target - resized.width()) / 2);
    let y = i64::from((target - resized.height()) / 2);
    image::imageops::overlay(&mut canvas, &resized, x, y);

    let mut out = Vec::new();
    canvas.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
    Ok(out)
}

/// SVG cannot be rasterized here, so it is sniffed up front instead of
/// surfacing as an opaque decode error.
pub fn is_svg(data: &[u8]) -> bool {
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    let trimmed = &data[start..];
    trimmed.starts_with(b"<svg") || trimmed.starts_with(b"<?xml")
}

/// Accepts exactly 6 hex digits, with or without a leading `#`.
pub fn parse_hex_color(value: &str) -> Result<[u8; 3], LogoError> {
    let hex = value.strip_prefix('#').unwrap_or(value);
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(LogoError::invalid_color(value));
    }

    let r = u8::from_str_radix(&hex[0..2], 16).map_err(|_| LogoError::invalid_color(value))?;
    let g = u8::from_str_radix(&hex[2..4], 16).map_err(|_| LogoError::invalid_color(value))?;
    let b = u8::from_str_radix(&hex[4..6], 16).map_err(|_| LogoError::invalid_color(value))?;
    Ok([r, g, b])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_png(img: &RgbaImage) -> Vec<u8> {
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn normalize_renders_every_size_square() {
        // Wide source forces letterboxing onto the square canvas
        let source = encode_png(&RgbaImage::from_pixel(40, 10, Rgba([200, 30, 30, 255])));
        let outcome = ImageProcessor::new().normalize_all(&source);

        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.rendered.len(), ALL_SIZES.len());
        for (size, png) in &outcome.rendered {
            let img = image::load_from_memory(png).unwrap().to_rgba8();
            assert_eq!(img.dimensions(), (size.pixels(), size.pixels()));
            // The band above the centered content stays transparent
            assert_eq!(img.get_pixel(size.pixels() / 2, 0)[3], 0);
        }
    }

    #[test]
    fn normalize_upscales_small_sources() {
        let source = encode_png(&RgbaImage::from_pixel(8, 8, Rgba([0, 0, 255, 255])));
        let outcome = ImageProcessor::new().normalize_all(&source);

        assert!(outcome.failures.is_empty());
        let (size, png) = outcome.rendered.last().unwrap();
        assert_eq!(*size, LogoSize::Xl);
        let img = image::load_from_memory(png).unwrap();
        use image::GenericImageView;
        assert_eq!(img.dimensions(), (256, 256));
    }

    #[test]
    fn normalize_rejects_svg_input() {
        let outcome = ImageProcessor::new().normalize_all(b"<svg xmlns=\"a\"></svg>");
        assert!(outcome.rendered.is_empty());
        assert!(outcome.error_summary().contains("svg"));

        assert!(is_svg(b"  \n<?xml version=\"1.0\"?><svg/>"));
        assert!(!is_svg(b"\x89PNG\r\n"));
    }

    #[test]
    fn normalize_reports_undecodable_input() {
        let outcome = ImageProcessor::new().normalize_all(b"definitely not an image");
        assert!(outcome.rendered.is_empty());
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.error_summary().contains("decode failed"));
    }

    #[test]
    fn apply_background_flattens_all_transparency() {
        let source = encode_png(&RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0])));
        let flattened = ImageProcessor::new()
            .apply_background(&source, "ffffff")
            .unwrap();

        let img = image::load_from_memory(&flattened).unwrap().to_rgba8();
        for pixel in img.pixels() {
            assert_eq!(*pixel, Rgba([255, 255, 255, 255]));
        }
    }

    #[test]
    fn apply_background_accepts_optional_hash_prefix() {
        let source = encode_png(&RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 128])));
        let processor = ImageProcessor::new();

        let with_hash = processor.apply_background(&source, "#00ff00").unwrap();
        let without_hash = processor.apply_background(&source, "00ff00").unwrap();
        assert_eq!(with_hash, without_hash);
    }

    #[test]
    fn invalid_colors_are_rejected() {
        assert!(matches!(
            parse_hex_color("fff"),
            Err(LogoError::InvalidColor { .. })
        ));
        assert!(matches!(
            parse_hex_color("zzzzzz"),
            Err(LogoError::InvalidColor { .. })
        ));
        assert!(matches!(
            parse_hex_color("#0011223"),
            Err(LogoError::InvalidColor { .. })
        ));
        assert_eq!(parse_hex_color("a1B2c3").unwrap(), [0xa1, 0xb2, 0xc3]);
    }
}
