/// Pixel operations applied to question images before they are written back
///
/// Enhancement factors follow the usual "enhance" convention:
/// 1.0 leaves the image unchanged, 0.0 gives black / flat gray / blurred,
/// values above 1.0 strengthen the effect.
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{imageops, imageops::FilterType, DynamicImage, ImageFormat, Rgba, RgbaImage};

use crate::error::{Error, Result};
use crate::state::config::CropSettings;

/// Pixel rectangle, right/bottom exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Rect {
    /// Resolve a percent-based crop against an image size
    pub fn from_percent(settings: &CropSettings, width: u32, height: u32) -> Self {
        let scale = |pct: u32, full: u32| (u64::from(full) * u64::from(pct.min(100)) / 100) as u32;
        Rect {
            left: scale(settings.left, width),
            top: scale(settings.top, height),
            right: scale(settings.right, width),
            bottom: scale(settings.bottom, height),
        }
    }
}

/// Image-processing collaborator
pub trait ImageTransform: Send + Sync {
    fn adjust(&self, image: &DynamicImage, brightness: f32, contrast: f32, sharpness: f32) -> DynamicImage;

    /// Fails with `InvalidRegion` when the rectangle is empty or outside the image
    fn crop(&self, image: &DynamicImage, rect: Rect) -> Result<DynamicImage>;

    /// Counter-clockwise rotation in degrees; the canvas grows to fit
    fn rotate(&self, image: &DynamicImage, degrees: f32) -> Result<DynamicImage>;

    /// Shrink or grow to fit `max_width` x `max_height`, keeping the aspect ratio
    fn resize_to_fit(&self, image: &DynamicImage, max_width: u32, max_height: u32) -> DynamicImage;
}

/// Default implementation on top of the `image` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct PixelTransform;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

impl ImageTransform for PixelTransform {
    fn adjust(&self, image: &DynamicImage, brightness: f32, contrast: f32, sharpness: f32) -> DynamicImage {
        let mut rgba = image.to_rgba8();

        if brightness != 1.0 {
            blend_with(&mut rgba, |_, _| [0.0; 3], brightness.max(0.0));
        }
        if contrast != 1.0 {
            let mean = mean_luminance(&rgba);
            blend_with(&mut rgba, |_, _| [mean; 3], contrast.max(0.0));
        }
        if sharpness != 1.0 {
            let smooth = imageops::blur(&rgba, 1.0);
            blend_with(
                &mut rgba,
                |x, y| {
                    let p = smooth.get_pixel(x, y).0;
                    [f32::from(p[0]), f32::from(p[1]), f32::from(p[2])]
                },
                sharpness.max(0.0),
            );
        }

        DynamicImage::ImageRgba8(rgba)
    }

    fn crop(&self, image: &DynamicImage, rect: Rect) -> Result<DynamicImage> {
        if rect.left >= rect.right || rect.top >= rect.bottom {
            return Err(Error::InvalidRegion(format!(
                "empty crop rectangle ({}, {}) - ({}, {})",
                rect.left, rect.top, rect.right, rect.bottom
            )));
        }
        if rect.right > image.width() || rect.bottom > image.height() {
            return Err(Error::InvalidRegion(format!(
                "crop rectangle ({}, {}) - ({}, {}) exceeds image size {}x{}",
                rect.left,
                rect.top,
                rect.right,
                rect.bottom,
                image.width(),
                image.height()
            )));
        }

        Ok(image.crop_imm(rect.left, rect.top, rect.right - rect.left, rect.bottom - rect.top))
    }

    fn rotate(&self, image: &DynamicImage, degrees: f32) -> Result<DynamicImage> {
        if !degrees.is_finite() {
            return Err(Error::InvalidRegion(format!("rotation angle {degrees} is not a number")));
        }

        let normalized = degrees.rem_euclid(360.0);
        // Quarter turns are lossless; `rotate90` in the image crate is clockwise
        match normalized {
            a if a == 0.0 => Ok(image.clone()),
            a if a == 90.0 => Ok(image.rotate270()),
            a if a == 180.0 => Ok(image.rotate180()),
            a if a == 270.0 => Ok(image.rotate90()),
            a => Ok(DynamicImage::ImageRgba8(rotate_expand(&image.to_rgba8(), a))),
        }
    }

    fn resize_to_fit(&self, image: &DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
        image.resize(max_width.max(1), max_height.max(1), FilterType::Lanczos3)
    }
}

/// out = base + factor * (pixel - base), per RGB channel; alpha is untouched
fn blend_with(img: &mut RgbaImage, base: impl Fn(u32, u32) -> [f32; 3], factor: f32) {
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let b = base(x, y);
        for c in 0..3 {
            let v = b[c] + factor * (f32::from(pixel.0[c]) - b[c]);
            pixel.0[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
}

fn mean_luminance(img: &RgbaImage) -> f32 {
    let count = u64::from(img.width()) * u64::from(img.height());
    if count == 0 {
        return 0.0;
    }
    let sum: f64 = img
        .pixels()
        .map(|p| 0.299 * f64::from(p.0[0]) + 0.587 * f64::from(p.0[1]) + 0.114 * f64::from(p.0[2]))
        .sum();
    (sum / count as f64) as f32
}

/// Arbitrary-angle counter-clockwise rotation with nearest-neighbour
/// sampling; uncovered corners are filled white.
fn rotate_expand(src: &RgbaImage, degrees: f32) -> RgbaImage {
    let theta = f64::from(degrees).to_radians();
    let (sin, cos) = theta.sin_cos();
    let (w, h) = (f64::from(src.width()), f64::from(src.height()));

    let new_w = (w * cos.abs() + h * sin.abs()).round().max(1.0) as u32;
    let new_h = (w * sin.abs() + h * cos.abs()).round().max(1.0) as u32;

    let (cx, cy) = (w / 2.0, h / 2.0);
    let (ncx, ncy) = (f64::from(new_w) / 2.0, f64::from(new_h) / 2.0);

    RgbaImage::from_fn(new_w, new_h, |x, y| {
        let dx = f64::from(x) + 0.5 - ncx;
        let dy = f64::from(y) + 0.5 - ncy;
        let sx = dx * cos - dy * sin + cx;
        let sy = dx * sin + dy * cos + cy;

        if sx >= 0.0 && sy >= 0.0 && sx < w && sy < h {
            *src.get_pixel(sx as u32, sy as u32)
        } else {
            WHITE
        }
    })
}

/// Decode an image file
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    if !path.is_file() {
        return Err(Error::not_found("load image", path));
    }
    image::open(path).map_err(|e| Error::image("load image", path, e))
}

/// Read only the pixel dimensions of an image file
pub fn image_dimensions(path: &Path) -> Result<(u32, u32)> {
    image::image_dimensions(path).map_err(|e| Error::image("read image size", path, e))
}

/// Write an image back to disk; JPEG output uses `quality` (1-100)
pub fn save_image(image: &DynamicImage, path: &Path, quality: u8) -> Result<()> {
    match ImageFormat::from_path(path) {
        Ok(ImageFormat::Jpeg) => {
            let file = File::create(path).map_err(|e| Error::io("save image", path, e))?;
            let encoder = JpegEncoder::new_with_quality(BufWriter::new(file), quality.clamp(1, 100));
            DynamicImage::ImageRgb8(image.to_rgb8())
                .write_with_encoder(encoder)
                .map_err(|e| Error::image("save image", path, e))
        }
        _ => image.save(path).map_err(|e| Error::image("save image", path, e)),
    }
}
