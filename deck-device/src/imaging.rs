//! Image preparation: scaling, cropping and encoding for the wire

use std::fmt;
use std::str::FromStr;

use deck_transport::{Color, ImageFormat, ImageTransform, Rect, Size};
use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageResult, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

const FILTER: FilterType = FilterType::Triangle;

/// How a source image is fitted into a target rectangle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleMode {
    /// Preserve aspect ratio, letterbox on black
    #[default]
    Fit,
    /// Preserve aspect ratio, cover the target and crop the center
    Fill,
    /// Ignore aspect ratio
    Stretch,
}

impl FromStr for ScaleMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fit" => Ok(Self::Fit),
            "fill" => Ok(Self::Fill),
            "stretch" => Ok(Self::Stretch),
            _ => Err(format!("unknown scale mode \"{s}\" (fit, fill, stretch)")),
        }
    }
}

impl fmt::Display for ScaleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fit => "fit",
            Self::Fill => "fill",
            Self::Stretch => "stretch",
        })
    }
}

/// Scale `source` to exactly `size`
pub fn scale(source: &DynamicImage, size: Size, mode: ScaleMode) -> RgbImage {
    if source.width() == size.width && source.height() == size.height {
        return source.to_rgb8();
    }
    match mode {
        ScaleMode::Stretch => source
            .resize_exact(size.width, size.height, FILTER)
            .to_rgb8(),
        ScaleMode::Fill => source
            .resize_to_fill(size.width, size.height, FILTER)
            .to_rgb8(),
        ScaleMode::Fit => {
            let fitted = source.resize(size.width, size.height, FILTER).to_rgb8();
            let mut canvas = solid(size, Color::BLACK);
            let x = (size.width.saturating_sub(fitted.width()) / 2) as i64;
            let y = (size.height.saturating_sub(fitted.height()) / 2) as i64;
            imageops::overlay(&mut canvas, &fitted, x, y);
            canvas
        }
    }
}

/// Flat-colored image of `size`
pub fn solid(size: Size, color: Color) -> RgbImage {
    RgbImage::from_pixel(size.width, size.height, Rgb([color.r, color.g, color.b]))
}

/// Cut `rect` out of `frame`.
///
/// The result always has the size of `rect`; parts of `rect` outside the
/// frame come out black.
pub fn crop_exact(frame: &RgbImage, rect: Rect) -> RgbImage {
    let inside = imageops::crop_imm(frame, rect.x, rect.y, rect.width, rect.height).to_image();
    if inside.width() == rect.width && inside.height() == rect.height {
        return inside;
    }
    let mut canvas = solid(rect.size(), Color::BLACK);
    imageops::overlay(&mut canvas, &inside, 0, 0);
    canvas
}

/// Apply the panel orientation fix-up
pub fn transform(image: &RgbImage, transform: ImageTransform) -> RgbImage {
    match (transform.flip_horizontal, transform.flip_vertical) {
        (true, true) => imageops::rotate180(image),
        (true, false) => imageops::flip_horizontal(image),
        (false, true) => imageops::flip_vertical(image),
        (false, false) => image.clone(),
    }
}

/// Encode into the device's wire format
pub fn encode(
    image: &RgbImage,
    format: ImageFormat,
    orientation: ImageTransform,
    jpeg_quality: u8,
) -> ImageResult<Vec<u8>> {
    let oriented;
    let image = if orientation.is_identity() {
        image
    } else {
        oriented = transform(image, orientation);
        &oriented
    };

    let mut out = Vec::new();
    match format {
        ImageFormat::Jpeg => JpegEncoder::new_with_quality(&mut out, jpeg_quality.clamp(1, 100))
            .write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                ExtendedColorType::Rgb8,
            )?,
        ImageFormat::Bmp => BmpEncoder::new(&mut out).write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgb8,
        )?,
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 0])
        }))
    }

    #[test]
    fn test_scale_modes_hit_target_size() {
        let source = gradient(200, 100);
        for mode in [ScaleMode::Fit, ScaleMode::Fill, ScaleMode::Stretch] {
            let out = scale(&source, Size::new(72, 72), mode);
            assert_eq!(out.dimensions(), (72, 72), "{mode}");
        }
    }

    #[test]
    fn test_fit_letterboxes_on_black() {
        let source = DynamicImage::ImageRgb8(solid(Size::new(200, 100), Color::WHITE));
        let out = scale(&source, Size::new(72, 72), ScaleMode::Fit);
        // 200x100 fits as 72x36, centered vertically
        assert_eq!(*out.get_pixel(36, 0), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(36, 36), Rgb([255, 255, 255]));
        assert_eq!(*out.get_pixel(36, 71), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_crop_exact_pads_outside_frame() {
        let frame = solid(Size::new(100, 100), Color::WHITE);
        let out = crop_exact(&frame, Rect::new(80, 80, 40, 40));
        assert_eq!(out.dimensions(), (40, 40));
        assert_eq!(*out.get_pixel(10, 10), Rgb([255, 255, 255]));
        assert_eq!(*out.get_pixel(30, 30), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_crop_exact_takes_region() {
        let frame = gradient(360, 216);
        let out = crop_exact(&frame.to_rgb8(), Rect::new(144, 72, 72, 72));
        assert_eq!(*out.get_pixel(0, 0), Rgb([144, 72, 0]));
        assert_eq!(*out.get_pixel(71, 71), Rgb([215, 143, 0]));
    }

    #[test]
    fn test_rotate_180() {
        let source = gradient(4, 2).to_rgb8();
        let out = transform(&source, ImageTransform::ROTATE_180);
        assert_eq!(out.get_pixel(0, 0), source.get_pixel(3, 1));
    }

    #[test]
    fn test_encode_formats() {
        let image = solid(Size::new(72, 72), Color::new(200, 10, 10));
        let jpeg = encode(&image, ImageFormat::Jpeg, ImageTransform::NONE, 90).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let bmp = encode(&image, ImageFormat::Bmp, ImageTransform::ROTATE_180, 90).unwrap();
        assert_eq!(&bmp[..2], b"BM");
    }

    #[test]
    fn test_scale_mode_parse() {
        assert_eq!("FILL".parse::<ScaleMode>(), Ok(ScaleMode::Fill));
        assert!("zoom".parse::<ScaleMode>().is_err());
    }
}
