//! Sticker background removal
//!
//! The background color is estimated as the mean of the four corner pixels.
//! Every pixel closer than [`presets::BACKGROUND_THRESHOLD`] to it (Euclidean
//! distance in RGB) becomes fully transparent. Non-uniform backgrounds are
//! simply over- or under-segmented.

use crate::error::{MediaError, Result};
use crate::presets;
use crate::progress::{emit, Status, StatusSink};
use fast_image_resize as fr;
use fr::images::Image as FrImage;
use image::{DynamicImage, ImageFormat, RgbaImage};
use rayon::prelude::*;
use serde::Serialize;
use std::io::Cursor;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RgbColor {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

/// RGBA buffer with its alpha rewritten, plus the color used to do it.
#[derive(Debug, Clone)]
pub struct SegmentationResult {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub background: RgbColor,
    pub cleared_pixels: usize,
}

/// Encoded sticker ready for download or compositing.
#[derive(Debug, Clone)]
pub struct Sticker {
    pub name: String,
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub background: RgbColor,
    pub cleared_pixels: usize,
}

/// Mean RGB of the top-left, top-right, bottom-left and bottom-right pixels.
///
/// Callers validate the buffer first; see [`segment`].
fn reference_color(pixels: &[u8], width: u32, height: u32) -> RgbColor {
    let (w, h) = (width as usize, height as usize);
    let corners = [(0, 0), (w - 1, 0), (0, h - 1), (w - 1, h - 1)];

    let (mut r, mut g, mut b) = (0.0, 0.0, 0.0);
    for (x, y) in corners {
        let i = (y * w + x) * 4;
        r += pixels[i] as f64;
        g += pixels[i + 1] as f64;
        b += pixels[i + 2] as f64;
    }

    let n = corners.len() as f64;
    RgbColor {
        r: r / n,
        g: g / n,
        b: b / n,
    }
}

pub fn color_distance(pixel: [u8; 3], reference: RgbColor) -> f64 {
    let dr = pixel[0] as f64 - reference.r;
    let dg = pixel[1] as f64 - reference.g;
    let db = pixel[2] as f64 - reference.b;
    (dr * dr + dg * dg + db * db).sqrt()
}

pub fn is_background(pixel: [u8; 3], reference: RgbColor) -> bool {
    color_distance(pixel, reference) < presets::BACKGROUND_THRESHOLD
}

pub fn segment(mut pixels: Vec<u8>, width: u32, height: u32) -> Result<SegmentationResult> {
    if width == 0 || height == 0 {
        return Err(MediaError::InvalidPixelBuffer(format!(
            "empty image {}x{}",
            width, height
        )));
    }
    let expected = width as usize * height as usize * 4;
    if pixels.len() != expected {
        return Err(MediaError::InvalidPixelBuffer(format!(
            "expected {} bytes for {}x{} RGBA, got {}",
            expected,
            width,
            height,
            pixels.len()
        )));
    }

    let background = reference_color(&pixels, width, height);
    debug!(
        "Sticker background estimate: ({:.1}, {:.1}, {:.1})",
        background.r, background.g, background.b
    );

    let cleared_pixels = pixels
        .par_chunks_exact_mut(4)
        .map(|px| {
            if is_background([px[0], px[1], px[2]], background) {
                px[3] = 0;
                1usize
            } else {
                0
            }
        })
        .sum::<usize>();

    Ok(SegmentationResult {
        width,
        height,
        pixels,
        background,
        cleared_pixels,
    })
}

/// Scale factor `min(1, cap / width)`, dimensions floored (at least 1).
pub fn fit_width(width: u32, height: u32, cap: u32) -> (u32, u32) {
    let scale = (cap as f64 / width as f64).min(1.0);
    let w = ((width as f64 * scale).floor() as u32).max(1);
    let h = ((height as f64 * scale).floor() as u32).max(1);
    (w, h)
}

fn downscale(image: RgbaImage) -> Result<RgbaImage> {
    let (width, height) = image.dimensions();
    let (dst_width, dst_height) = fit_width(width, height, presets::STICKER_MAX_WIDTH);
    if (dst_width, dst_height) == (width, height) {
        return Ok(image);
    }

    let src_image = FrImage::from_vec_u8(width, height, image.into_raw(), fr::PixelType::U8x4)
        .map_err(|e| MediaError::InvalidPixelBuffer(format!("Failed to create source image: {:?}", e)))?;
    let mut dst_image = FrImage::new(dst_width, dst_height, src_image.pixel_type());

    let options = fr::ResizeOptions::new()
        .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear));
    let mut resizer = fr::Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| MediaError::InvalidPixelBuffer(format!("Resize failed: {:?}", e)))?;

    RgbaImage::from_raw(dst_width, dst_height, dst_image.buffer().to_vec())
        .ok_or_else(|| MediaError::InvalidPixelBuffer("Failed to rebuild resized image".to_string()))
}

/// Decode, downscale, segment and re-encode as PNG.
///
/// `None` means no image was selected; that is reported, not processed.
pub fn make_sticker(image_bytes: Option<&[u8]>, status: Option<&StatusSink>) -> Result<Sticker> {
    let Some(image_bytes) = image_bytes else {
        emit(status, Status::NoImageSelected);
        return Err(MediaError::SegmentationInputMissing);
    };

    emit(status, Status::RemovingBackground);

    let decoded = image::load_from_memory(image_bytes)?.to_rgba8();
    let resized = downscale(decoded)?;
    let (width, height) = resized.dimensions();

    let result = segment(resized.into_raw(), width, height)?;

    let rgba = RgbaImage::from_raw(result.width, result.height, result.pixels)
        .ok_or_else(|| MediaError::InvalidPixelBuffer("Failed to rebuild sticker".to_string()))?;
    let mut png = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(rgba).write_to(&mut png, ImageFormat::Png)?;

    emit(status, Status::StickerReady);

    Ok(Sticker {
        name: presets::STICKER_ASSET_NAME.to_string(),
        png: png.into_inner(),
        width: result.width,
        height: result.height,
        background: result.background,
        cleared_pixels: result.cleared_pixels,
    })
}
