use image::{imageops, DynamicImage, GenericImageView, Rgba, RgbaImage};
use lumen_core::{Color, ImageFitType, ImageHandlerError, ResizeOptions, MAX_PIXELS};

/// Letterbox colour for `contain` when no background is given
const DEFAULT_BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Image resize operations
pub struct ImageResize;

impl ImageResize {
    /// Size the source is scaled to before any `cover` crop or `contain` letterbox.
    /// `None` when the resize leaves the image untouched.
    pub fn scaled_dimensions(
        orig_width: u32,
        orig_height: u32,
        options: &ResizeOptions,
    ) -> Option<(u32, u32)> {
        let (ow, oh) = (orig_width as f64, orig_height as f64);
        let scaled = match (options.width, options.height) {
            (None, None) => return None,
            (Some(w), None) => (w, ((w as f64 * oh / ow).round() as u32).max(1)),
            (None, Some(h)) => (((h as f64 * ow / oh).round() as u32).max(1), h),
            (Some(w), Some(h)) => {
                let scale_x = w as f64 / ow;
                let scale_y = h as f64 / oh;
                let scale = match options.fit.unwrap_or_default() {
                    ImageFitType::Fill => {
                        return Self::guard(orig_width, orig_height, (w, h), options)
                    }
                    ImageFitType::Inside | ImageFitType::Contain => scale_x.min(scale_y),
                    ImageFitType::Cover | ImageFitType::Outside => scale_x.max(scale_y),
                };
                (
                    ((ow * scale).round() as u32).max(1),
                    ((oh * scale).round() as u32).max(1),
                )
            }
        };
        Self::guard(orig_width, orig_height, scaled, options)
    }

    /// Apply `withoutEnlargement`: a resize that would grow either axis is dropped.
    fn guard(
        orig_width: u32,
        orig_height: u32,
        scaled: (u32, u32),
        options: &ResizeOptions,
    ) -> Option<(u32, u32)> {
        if options.without_enlargement && (scaled.0 > orig_width || scaled.1 > orig_height) {
            return None;
        }
        Some(scaled)
    }

    /// Select appropriate filter type based on resize ratio
    pub fn select_filter(
        orig_width: u32,
        orig_height: u32,
        new_width: u32,
        new_height: u32,
    ) -> imageops::FilterType {
        let width_ratio = orig_width as f32 / new_width as f32;
        let height_ratio = orig_height as f32 / new_height as f32;
        let max_ratio = width_ratio.max(height_ratio);

        if max_ratio > 2.0 {
            imageops::FilterType::Triangle
        } else if max_ratio > 1.5 {
            imageops::FilterType::CatmullRom
        } else {
            imageops::FilterType::Lanczos3
        }
    }

    /// Resize image to exact dimensions
    pub fn resize_exact(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
        let (orig_width, orig_height) = img.dimensions();
        if (orig_width, orig_height) == (width, height) {
            return img.clone();
        }
        let filter = Self::select_filter(orig_width, orig_height, width, height);
        img.resize_exact(width, height, filter)
    }

    /// Fail before allocating a buffer above the pixel limit.
    fn check_pixels(width: u32, height: u32) -> anyhow::Result<()> {
        if width as u64 * height as u64 > MAX_PIXELS {
            return Err(ImageHandlerError::InvalidEdit(format!(
                "resize: {}x{} exceeds the pixel limit of {}",
                width, height, MAX_PIXELS
            ))
            .into());
        }
        Ok(())
    }

    /// Resize following the fit mode of `options`.
    pub fn apply(img: DynamicImage, options: &ResizeOptions) -> anyhow::Result<DynamicImage> {
        let (orig_width, orig_height) = img.dimensions();
        let Some((scaled_width, scaled_height)) =
            Self::scaled_dimensions(orig_width, orig_height, options)
        else {
            return Ok(img);
        };
        Self::check_pixels(scaled_width, scaled_height)?;

        tracing::debug!(
            orig_width,
            orig_height,
            target_width = ?options.width,
            target_height = ?options.height,
            fit = ?options.fit,
            "Applying resize"
        );

        let resized = Self::resize_exact(&img, scaled_width, scaled_height);

        let (Some(width), Some(height)) = (options.width, options.height) else {
            return Ok(resized);
        };

        match options.fit.unwrap_or_default() {
            ImageFitType::Cover => {
                let width = width.min(scaled_width);
                let height = height.min(scaled_height);
                let x = (scaled_width - width) / 2;
                let y = (scaled_height - height) / 2;
                Ok(resized.crop_imm(x, y, width, height))
            }
            ImageFitType::Contain => {
                Self::check_pixels(width, height)?;
                Ok(Self::letterbox(&resized, width, height, options.background))
            }
            _ => Ok(resized),
        }
    }

    /// Centre `img` on a `width` x `height` canvas filled with `background`.
    fn letterbox(
        img: &DynamicImage,
        width: u32,
        height: u32,
        background: Option<Color>,
    ) -> DynamicImage {
        let bg_color = background
            .map(|color| Rgba(color.to_rgba8()))
            .unwrap_or(DEFAULT_BACKGROUND);
        let mut canvas = RgbaImage::from_pixel(width, height, bg_color);

        let (scaled_width, scaled_height) = img.dimensions();
        let x_offset = (width as i64 - scaled_width as i64) / 2;
        let y_offset = (height as i64 - scaled_height as i64) / 2;
        imageops::overlay(&mut canvas, &img.to_rgba8(), x_offset, y_offset);

        DynamicImage::ImageRgba8(canvas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            Rgba([255, 255, 255, 255]),
        ))
    }

    fn options(width: Option<u32>, height: Option<u32>, fit: Option<ImageFitType>) -> ResizeOptions {
        ResizeOptions {
            width,
            height,
            fit,
            ..ResizeOptions::default()
        }
    }

    #[test]
    fn test_single_dimension_keeps_ratio() {
        assert_eq!(
            ImageResize::scaled_dimensions(400, 200, &options(Some(100), None, None)),
            Some((100, 50))
        );
        assert_eq!(
            ImageResize::scaled_dimensions(400, 200, &options(None, Some(400), None)),
            Some((800, 400))
        );
    }

    #[test]
    fn test_fit_modes() {
        let img = create_test_image(400, 200);

        let inside = ImageResize::apply(img.clone(), &options(Some(100), Some(100), Some(ImageFitType::Inside))).unwrap();
        assert_eq!(inside.dimensions(), (100, 50));

        let outside = ImageResize::apply(img.clone(), &options(Some(100), Some(100), Some(ImageFitType::Outside))).unwrap();
        assert_eq!(outside.dimensions(), (200, 100));

        let cover = ImageResize::apply(img.clone(), &options(Some(100), Some(100), None)).unwrap();
        assert_eq!(cover.dimensions(), (100, 100));

        let fill = ImageResize::apply(img.clone(), &options(Some(100), Some(100), Some(ImageFitType::Fill))).unwrap();
        assert_eq!(fill.dimensions(), (100, 100));

        let contain = ImageResize::apply(img, &options(Some(100), Some(100), Some(ImageFitType::Contain))).unwrap();
        assert_eq!(contain.dimensions(), (100, 100));
        // Letterbox bars default to opaque black
        assert_eq!(contain.get_pixel(50, 0), Rgba([0, 0, 0, 255]));
        assert_eq!(contain.get_pixel(50, 50), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_contain_background() {
        let img = create_test_image(400, 200);
        let resize = ResizeOptions {
            background: Some(Color::rgb(255.0, 0.0, 0.0)),
            ..options(Some(100), Some(100), Some(ImageFitType::Contain))
        };
        let contained = ImageResize::apply(img, &resize).unwrap();
        assert_eq!(contained.get_pixel(50, 0), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_without_enlargement() {
        let img = create_test_image(100, 100);
        let resize = ResizeOptions {
            without_enlargement: true,
            ..options(Some(400), None, None)
        };
        assert_eq!(ImageResize::apply(img.clone(), &resize).unwrap().dimensions(), (100, 100));

        let resize = ResizeOptions {
            without_enlargement: true,
            ..options(Some(50), None, None)
        };
        assert_eq!(ImageResize::apply(img, &resize).unwrap().dimensions(), (50, 50));
    }

    #[test]
    fn test_no_dimensions_is_noop() {
        let img = create_test_image(30, 20);
        let resized = ImageResize::apply(img, &ResizeOptions::fit_inside()).unwrap();
        assert_eq!(resized.dimensions(), (30, 20));
    }

    #[test]
    fn test_oversized_target_is_rejected() {
        let img = create_test_image(2, 2);
        let err = ImageResize::apply(
            img.clone(),
            &options(Some(100_000), Some(100_000), Some(ImageFitType::Inside)),
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ImageHandlerError>(),
            Some(ImageHandlerError::InvalidEdit(_))
        ));

        // Scaled image is 3000x3000; the 100000x3000 letterbox canvas is not
        let contain = options(Some(100_000), Some(3_000), Some(ImageFitType::Contain));
        assert!(ImageResize::apply(img, &contain).is_err());
    }

    #[test]
    fn test_select_filter() {
        assert_eq!(
            ImageResize::select_filter(1000, 1000, 100, 100),
            imageops::FilterType::Triangle
        );
        assert_eq!(
            ImageResize::select_filter(1000, 1000, 600, 600),
            imageops::FilterType::CatmullRom
        );
        assert_eq!(
            ImageResize::select_filter(1000, 1000, 900, 900),
            imageops::FilterType::Lanczos3
        );
    }
}
