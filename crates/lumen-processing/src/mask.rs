use image::{DynamicImage, GenericImageView, GrayImage, Luma};
use imageproc::drawing::draw_filled_ellipse_mut;
use lumen_core::RoundCropOptions;

/// Elliptical cutout masks
pub struct RoundMask;

impl RoundMask {
    /// Punch an elliptical cutout, then trim the transparent border.
    ///
    /// Radii default to half the shorter side and the centre to the image centre;
    /// non-positive values count as unset. The centre is clamped into the image and
    /// each radius to twice the matching side, past which the ellipse already spans
    /// every pixel on that axis.
    pub fn apply(img: DynamicImage, options: &RoundCropOptions) -> DynamicImage {
        let (width, height) = img.dimensions();
        let (w, h) = (width as f64, height as f64);
        let default_radius = width.min(height) as f64 / 2.0;
        let positive = |value: Option<f64>| value.filter(|v| v.is_finite() && *v > 0.0);

        let rx = positive(options.rx).unwrap_or(default_radius).min(2.0 * w);
        let ry = positive(options.ry).unwrap_or(default_radius).min(2.0 * h);
        let cx = positive(options.left).unwrap_or(w / 2.0).min(w);
        let cy = positive(options.top).unwrap_or(h / 2.0).min(h);

        tracing::debug!(width, height, cx, cy, rx, ry, "Applying round crop");

        let mut mask = GrayImage::new(width, height);
        draw_filled_ellipse_mut(
            &mut mask,
            (cx as i32, cy as i32),
            rx as i32,
            ry as i32,
            Luma([255u8]),
        );

        // Destination-in: keep the image only where the mask is set
        let mut rgba8 = img.to_rgba8();
        for (pixel, coverage) in rgba8.pixels_mut().zip(mask.pixels()) {
            pixel[3] = ((pixel[3] as u16 * coverage[0] as u16) / 255) as u8;
        }

        Self::trim_transparent(DynamicImage::ImageRgba8(rgba8))
    }

    /// Crop to the bounding box of non-transparent pixels. Fully transparent images
    /// are returned unchanged.
    pub fn trim_transparent(img: DynamicImage) -> DynamicImage {
        let rgba8 = img.to_rgba8();
        let mut bounds: Option<(u32, u32, u32, u32)> = None;

        for (x, y, pixel) in rgba8.enumerate_pixels() {
            if pixel[3] == 0 {
                continue;
            }
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((min_x, min_y, max_x, max_y)) => {
                    (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
                }
            });
        }

        match bounds {
            Some((min_x, min_y, max_x, max_y)) => {
                img.crop_imm(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1)
            }
            None => img,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn create_test_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            Rgba([255, 0, 0, 255]),
        ))
    }

    #[test]
    fn test_default_circle() {
        let result = RoundMask::apply(create_test_image(100, 60), &RoundCropOptions::default());
        let (width, height) = result.dimensions();

        // Circle of radius 30 around the centre, border trimmed
        assert!((59..=61).contains(&width));
        assert!((59..=61).contains(&height));
        assert_eq!(result.get_pixel(0, 0)[3], 0);
        assert_eq!(result.get_pixel(width / 2, height / 2), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_non_positive_values_use_defaults() {
        let options = RoundCropOptions {
            top: Some(-1.0),
            left: Some(0.0),
            rx: Some(-5.0),
            ry: None,
        };
        let explicit = RoundMask::apply(create_test_image(40, 40), &options);
        let defaults = RoundMask::apply(create_test_image(40, 40), &RoundCropOptions::default());
        assert_eq!(explicit, defaults);
    }

    #[test]
    fn test_custom_ellipse() {
        let options = RoundCropOptions {
            top: Some(20.0),
            left: Some(20.0),
            rx: Some(10.0),
            ry: Some(5.0),
        };
        let result = RoundMask::apply(create_test_image(100, 100), &options);
        let (width, height) = result.dimensions();
        assert!(width > height);
        assert!((19..=21).contains(&width));
    }

    #[test]
    fn test_oversized_radii_are_clamped() {
        let options = RoundCropOptions {
            top: Some(1e9),
            left: Some(5.0),
            rx: Some(50_000.0),
            ry: Some(50_000.0),
        };
        let result = RoundMask::apply(create_test_image(10, 10), &options);
        let clamped = RoundMask::apply(
            create_test_image(10, 10),
            &RoundCropOptions {
                top: Some(10.0),
                left: Some(5.0),
                rx: Some(20.0),
                ry: Some(20.0),
            },
        );
        assert_eq!(result, clamped);
        assert_eq!(result.dimensions(), (10, 10));
    }

    #[test]
    fn test_trim_fully_transparent() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(5, 5, Rgba([0, 0, 0, 0])));
        assert_eq!(RoundMask::trim_transparent(img).dimensions(), (5, 5));
    }
}
