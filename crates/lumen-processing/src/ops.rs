//! Pixel operations without bespoke request logic
//!
//! Each function takes ownership of the working image and returns the transformed one.

use anyhow::{bail, Result};
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use lumen_core::{Color, Kernel};
use serde_json::Value;

/// Pass-through operations the applicator may forward by name
pub const PASS_THROUGH_OPERATIONS: [&str; 6] = [
    "negate",
    "gamma",
    "median",
    "threshold",
    "removeAlpha",
    "ensureAlpha",
];

const DEFAULT_GAMMA: f32 = 2.2;
const DEFAULT_MEDIAN_SIZE: u32 = 3;
const DEFAULT_THRESHOLD: u8 = 128;

pub struct ImageOps;

impl ImageOps {
    /// Gaussian blur with the given sigma, or a mild 3x3 box blur
    pub fn blur(img: DynamicImage, sigma: Option<f32>) -> DynamicImage {
        match sigma {
            Some(sigma) => img.blur(sigma),
            None => Self::apply_kernel(&img, 3, 3, &[1.0; 9], 9.0, 0.0),
        }
    }

    /// Unsharp mask with the given sigma, or a fast 3x3 sharpen
    pub fn sharpen(img: DynamicImage, sigma: Option<f32>) -> DynamicImage {
        match sigma {
            Some(sigma) => img.unsharpen(sigma, 1),
            None => Self::apply_kernel(
                &img,
                3,
                3,
                &[0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0],
                1.0,
                0.0,
            ),
        }
    }

    /// Stretch luminance so the 1st and 99th percentiles span the full range
    pub fn normalize(img: DynamicImage) -> DynamicImage {
        let rgba8 = img.to_rgba8();
        let mut histogram = [0u64; 256];
        for pixel in rgba8.pixels() {
            histogram[luma(pixel) as usize] += 1;
        }

        let total: u64 = histogram.iter().sum();
        if total == 0 {
            return DynamicImage::ImageRgba8(rgba8);
        }
        let low = percentile(&histogram, total / 100);
        let high = percentile(&histogram, total - total / 100 - 1);
        if high <= low {
            return DynamicImage::ImageRgba8(rgba8);
        }

        let scale = 255.0 / (high - low) as f32;
        let stretch = |v: u8| ((v as f32 - low as f32) * scale).round().clamp(0.0, 255.0) as u8;

        let mut normalized = rgba8;
        for pixel in normalized.pixels_mut() {
            let Rgba([r, g, b, a]) = *pixel;
            *pixel = Rgba([stretch(r), stretch(g), stretch(b), a]);
        }
        DynamicImage::ImageRgba8(normalized)
    }

    /// Replace each pixel's chroma with the tint's while keeping its luminance
    pub fn tint(img: DynamicImage, color: Color) -> DynamicImage {
        let (_, tint_cb, tint_cr) = to_ycbcr(color.r, color.g, color.b);
        let mut rgba8 = img.to_rgba8();

        for pixel in rgba8.pixels_mut() {
            let Rgba([r, g, b, a]) = *pixel;
            let (y, _, _) = to_ycbcr(r as f32, g as f32, b as f32);
            let (r, g, b) = from_ycbcr(y, tint_cb, tint_cr);
            *pixel = Rgba([r, g, b, a]);
        }
        DynamicImage::ImageRgba8(rgba8)
    }

    /// Composite onto a solid background and drop the alpha channel
    pub fn flatten(img: DynamicImage, background: Option<Color>) -> DynamicImage {
        let background = background.unwrap_or(Color::rgb(0.0, 0.0, 0.0));
        let rgba8 = img.to_rgba8();
        let (width, height) = rgba8.dimensions();

        let flattened = image::RgbImage::from_fn(width, height, |x, y| {
            let Rgba([r, g, b, a]) = *rgba8.get_pixel(x, y);
            let alpha = a as f32 / 255.0;
            let mix = |fg: u8, bg: f32| (fg as f32 * alpha + bg * (1.0 - alpha)).round() as u8;
            image::Rgb([mix(r, background.r), mix(g, background.g), mix(b, background.b)])
        });
        DynamicImage::ImageRgb8(flattened)
    }

    /// Convolve with a caller-supplied kernel.
    ///
    /// `scale` defaults to the kernel sum (1 when the sum is zero) and `offset` to 0.
    pub fn convolve(img: DynamicImage, kernel: &Kernel) -> Result<DynamicImage> {
        if kernel.width == 0 || kernel.height == 0 {
            bail!("Convolution kernel must not be empty");
        }
        if kernel.kernel.len() != (kernel.width * kernel.height) as usize {
            bail!(
                "Convolution kernel has {} values, expected {}x{}",
                kernel.kernel.len(),
                kernel.width,
                kernel.height
            );
        }

        let sum: f32 = kernel.kernel.iter().sum();
        let scale = kernel
            .scale
            .unwrap_or(if sum == 0.0 { 1.0 } else { sum });
        let offset = kernel.offset.unwrap_or(0.0);

        Ok(Self::apply_kernel(
            &img,
            kernel.width,
            kernel.height,
            &kernel.kernel,
            scale,
            offset,
        ))
    }

    pub fn supports(name: &str) -> bool {
        PASS_THROUGH_OPERATIONS.contains(&name)
    }

    /// Run a named pass-through operation. Unknown names and `value: false` leave the
    /// image unchanged.
    pub fn pass_through(img: DynamicImage, name: &str, value: &Value) -> DynamicImage {
        if value == &Value::Bool(false) {
            return img;
        }

        match name {
            "negate" => {
                let mut inverted = img;
                inverted.invert();
                inverted
            }
            "gamma" => Self::gamma(img, number(value).map(|v| v as f32).unwrap_or(DEFAULT_GAMMA)),
            "median" => {
                let size = number(value).map(|v| v as u32).unwrap_or(DEFAULT_MEDIAN_SIZE);
                let radius = size / 2;
                DynamicImage::ImageRgba8(imageproc::filter::median_filter(
                    &img.to_rgba8(),
                    radius,
                    radius,
                ))
            }
            "threshold" => Self::threshold(
                img,
                number(value)
                    .map(|v| v.clamp(0.0, 255.0) as u8)
                    .unwrap_or(DEFAULT_THRESHOLD),
            ),
            "removeAlpha" => match img.color().has_alpha() {
                true => DynamicImage::ImageRgb8(img.to_rgb8()),
                false => img,
            },
            "ensureAlpha" => DynamicImage::ImageRgba8(img.to_rgba8()),
            _ => img,
        }
    }

    fn gamma(img: DynamicImage, gamma: f32) -> DynamicImage {
        let gamma = gamma.clamp(1.0, 3.0);
        let mut lut = [0u8; 256];
        for (i, entry) in lut.iter_mut().enumerate() {
            *entry = (255.0 * (i as f32 / 255.0).powf(1.0 / gamma)).round() as u8;
        }

        let mut rgba8 = img.to_rgba8();
        for pixel in rgba8.pixels_mut() {
            let Rgba([r, g, b, a]) = *pixel;
            *pixel = Rgba([lut[r as usize], lut[g as usize], lut[b as usize], a]);
        }
        DynamicImage::ImageRgba8(rgba8)
    }

    fn threshold(img: DynamicImage, level: u8) -> DynamicImage {
        let mut rgba8 = img.to_rgba8();
        for pixel in rgba8.pixels_mut() {
            let value = if luma(pixel) >= level { 255 } else { 0 };
            *pixel = Rgba([value, value, value, pixel[3]]);
        }
        DynamicImage::ImageRgba8(rgba8)
    }

    /// Convolve colour channels with edge clamping; alpha is preserved
    fn apply_kernel(
        img: &DynamicImage,
        kernel_width: u32,
        kernel_height: u32,
        kernel: &[f32],
        scale: f32,
        offset: f32,
    ) -> DynamicImage {
        let (width, height) = img.dimensions();
        let rgba8 = img.to_rgba8();
        let mut output = RgbaImage::new(width, height);
        let (half_w, half_h) = ((kernel_width / 2) as i64, (kernel_height / 2) as i64);

        for y in 0..height {
            for x in 0..width {
                let mut acc = [0.0f32; 3];

                for ky in 0..kernel_height {
                    for kx in 0..kernel_width {
                        let nx = (x as i64 + kx as i64 - half_w).clamp(0, width as i64 - 1) as u32;
                        let ny = (y as i64 + ky as i64 - half_h).clamp(0, height as i64 - 1) as u32;
                        let weight = kernel[(ky * kernel_width + kx) as usize];
                        let pixel = rgba8.get_pixel(nx, ny);
                        for (channel, sum) in acc.iter_mut().enumerate() {
                            *sum += pixel[channel] as f32 * weight;
                        }
                    }
                }

                let [r, g, b] = acc.map(|v| (v / scale + offset).round().clamp(0.0, 255.0) as u8);
                output.put_pixel(x, y, Rgba([r, g, b, rgba8.get_pixel(x, y)[3]]));
            }
        }

        DynamicImage::ImageRgba8(output)
    }
}

fn luma(pixel: &Rgba<u8>) -> u8 {
    (0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32).round() as u8
}

/// Smallest luminance whose cumulative count exceeds `rank`
fn percentile(histogram: &[u64; 256], rank: u64) -> u8 {
    let mut cumulative = 0;
    for (value, count) in histogram.iter().enumerate() {
        cumulative += count;
        if cumulative > rank {
            return value as u8;
        }
    }
    255
}

fn to_ycbcr(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let cb = 128.0 - 0.168736 * r - 0.331264 * g + 0.5 * b;
    let cr = 128.0 + 0.5 * r - 0.418688 * g - 0.081312 * b;
    (y, cb, cr)
}

fn from_ycbcr(y: f32, cb: f32, cr: f32) -> (u8, u8, u8) {
    let channel = |v: f32| v.round().clamp(0.0, 255.0) as u8;
    (
        channel(y + 1.402 * (cr - 128.0)),
        channel(y - 0.344136 * (cb - 128.0) - 0.714136 * (cr - 128.0)),
        channel(y + 1.772 * (cb - 128.0)),
    )
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn solid(r: u8, g: u8, b: u8, a: u8) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([r, g, b, a])))
    }

    #[test]
    fn test_box_blur_keeps_solid_colour() {
        let blurred = ImageOps::blur(solid(100, 150, 200, 255), None);
        assert_eq!(blurred.get_pixel(4, 4), Rgba([100, 150, 200, 255]));
    }

    #[test]
    fn test_convolve_identity_and_offset() {
        let identity = Kernel {
            width: 3,
            height: 3,
            kernel: vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0],
            scale: None,
            offset: Some(10.0),
        };
        let out = ImageOps::convolve(solid(50, 60, 70, 200), &identity).unwrap();
        assert_eq!(out.get_pixel(0, 0), Rgba([60, 70, 80, 200]));
    }

    #[test]
    fn test_convolve_zero_sum_kernel_uses_unit_scale() {
        let edge = Kernel {
            width: 3,
            height: 3,
            kernel: vec![-1.0, -1.0, -1.0, -1.0, 8.0, -1.0, -1.0, -1.0, -1.0],
            scale: None,
            offset: None,
        };
        let out = ImageOps::convolve(solid(50, 60, 70, 255), &edge).unwrap();
        assert_eq!(out.get_pixel(3, 3), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_convolve_rejects_mismatched_kernel() {
        let bad = Kernel {
            width: 3,
            height: 3,
            kernel: vec![1.0; 4],
            scale: None,
            offset: None,
        };
        assert!(ImageOps::convolve(solid(0, 0, 0, 255), &bad).is_err());
    }

    #[test]
    fn test_tint_keeps_luminance() {
        let tinted = ImageOps::tint(solid(128, 128, 128, 255), Color::rgb(200.0, 150.0, 150.0));
        let Rgba([r, g, b, _]) = tinted.get_pixel(0, 0);
        assert!(r > g && r > b);
        let y = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        assert!((y - 128.0).abs() < 2.0);
    }

    #[test]
    fn test_flatten_blends_alpha() {
        let flat = ImageOps::flatten(solid(255, 255, 255, 0), Some(Color::rgb(10.0, 20.0, 30.0)));
        assert!(!flat.color().has_alpha());
        assert_eq!(flat.get_pixel(0, 0), Rgba([10, 20, 30, 255]));

        let flat = ImageOps::flatten(solid(255, 255, 255, 0), None);
        assert_eq!(flat.get_pixel(0, 0), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_normalize_stretches_range() {
        let mut pixels = RgbaImage::from_pixel(10, 10, Rgba([100, 100, 100, 255]));
        for x in 0..10 {
            pixels.put_pixel(x, 0, Rgba([150, 150, 150, 255]));
        }
        let normalized = ImageOps::normalize(DynamicImage::ImageRgba8(pixels));
        assert_eq!(normalized.get_pixel(5, 5), Rgba([0, 0, 0, 255]));
        assert_eq!(normalized.get_pixel(5, 0), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_pass_through_allow_list() {
        assert!(!ImageOps::supports("modulate"));
        assert!(ImageOps::supports("ensureAlpha"));

        let negated = ImageOps::pass_through(solid(0, 10, 255, 255), "negate", &json!(true));
        assert_eq!(negated.get_pixel(0, 0), Rgba([255, 245, 0, 255]));

        let untouched = ImageOps::pass_through(solid(0, 10, 255, 255), "negate", &json!(false));
        assert_eq!(untouched.get_pixel(0, 0), Rgba([0, 10, 255, 255]));

        let thresholded = ImageOps::pass_through(solid(200, 200, 200, 255), "threshold", &json!(100));
        assert_eq!(thresholded.get_pixel(0, 0), Rgba([255, 255, 255, 255]));

        let opaque = ImageOps::pass_through(solid(1, 2, 3, 40), "removeAlpha", &json!(true));
        assert!(!opaque.color().has_alpha());

        let median = ImageOps::pass_through(solid(9, 9, 9, 255), "median", &json!(3));
        assert_eq!(median.get_pixel(4, 4), Rgba([9, 9, 9, 255]));
    }
}
