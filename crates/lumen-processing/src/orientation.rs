use image::{imageops, DynamicImage, GenericImageView, Rgba, RgbaImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};

/// Image orientation operations (EXIF auto-orientation, rotation and flipping)
pub struct ImageOrientation;

impl ImageOrientation {
    /// Rotation and flips needed to display an image with the given EXIF orientation.
    /// Returns (rotate_angle, flip_horizontal, flip_vertical)
    pub fn orientation_transforms(orientation: u32) -> (Option<u16>, bool, bool) {
        match orientation {
            1 => (None, false, false),      // Normal
            2 => (None, true, false),       // Mirror horizontal
            3 => (Some(180), false, false), // Rotate 180
            4 => (None, false, true),       // Mirror vertical
            5 => (Some(90), true, false),   // Transpose
            6 => (Some(90), false, false),  // Rotate 90 CW
            7 => (Some(270), true, false),  // Transverse
            8 => (Some(270), false, false), // Rotate 270 CW
            _ => (None, false, false),      // Invalid, treat as normal
        }
    }

    /// Bake an EXIF orientation into the pixels
    pub fn auto_orient(mut img: DynamicImage, orientation: u32) -> DynamicImage {
        let (rotate, flip_h, flip_v) = Self::orientation_transforms(orientation);

        tracing::debug!(
            orientation = orientation,
            rotate = ?rotate,
            flip_horizontal = flip_h,
            flip_vertical = flip_v,
            "Applying EXIF orientation"
        );

        if let Some(angle) = rotate {
            img = Self::rotate_right_angle(img, angle);
        }
        if flip_h {
            img = img.fliph();
        }
        if flip_v {
            img = img.flipv();
        }
        img
    }

    /// Rotate clockwise by any angle in degrees.
    ///
    /// Multiples of 90 are lossless; other angles grow the canvas to fit the rotated
    /// image and fill the corners with transparent pixels.
    pub fn rotate(img: DynamicImage, degrees: f64) -> DynamicImage {
        let normalized = degrees.rem_euclid(360.0);
        if normalized.fract() == 0.0 && (normalized as u16) % 90 == 0 {
            return Self::rotate_right_angle(img, normalized as u16);
        }

        let (width, height) = img.dimensions();
        let radians = normalized.to_radians();
        let (sin, cos) = (radians.sin().abs(), radians.cos().abs());
        let out_width = (width as f64 * cos + height as f64 * sin).ceil() as u32;
        let out_height = (width as f64 * sin + height as f64 * cos).ceil() as u32;

        let mut canvas = RgbaImage::from_pixel(out_width, out_height, Rgba([0, 0, 0, 0]));
        let x = (out_width as i64 - width as i64) / 2;
        let y = (out_height as i64 - height as i64) / 2;
        imageops::overlay(&mut canvas, &img.to_rgba8(), x, y);

        DynamicImage::ImageRgba8(rotate_about_center(
            &canvas,
            radians as f32,
            Interpolation::Bilinear,
            Rgba([0, 0, 0, 0]),
        ))
    }

    fn rotate_right_angle(img: DynamicImage, angle: u16) -> DynamicImage {
        match angle {
            90 => img.rotate90(),
            180 => img.rotate180(),
            270 => img.rotate270(),
            _ => img,
        }
    }
}
