use anyhow::{Context, Result};
use image::{imageops, DynamicImage, GenericImageView, ImageReader};
use lumen_core::{OverlayOptions, OverlayPosition, ResizeOptions};
use std::io::Cursor;

use crate::geometry::resolve_offset;
use crate::resize::ImageResize;

pub struct Overlay;

impl Overlay {
    /// Composite `overlay_data` onto `img`.
    ///
    /// The overlay is scaled by `wRatio`/`hRatio` percent of the target, made
    /// `alpha` percent transparent and placed at the resolved offsets. An axis
    /// without a usable offset is centred.
    pub fn apply(
        img: DynamicImage,
        overlay_data: &[u8],
        options: &OverlayOptions,
    ) -> Result<DynamicImage> {
        let reader = ImageReader::new(Cursor::new(overlay_data))
            .with_guessed_format()
            .context("Failed to read overlay image")?;
        let overlay_img = reader.decode().context("Failed to decode overlay image")?;

        let (img_width, img_height) = img.dimensions();

        let resize = ResizeOptions {
            width: options
                .w_ratio
                .as_deref()
                .and_then(percentage)
                .map(|ratio| img_width * ratio / 100)
                .filter(|w| *w > 0),
            height: options
                .h_ratio
                .as_deref()
                .and_then(percentage)
                .map(|ratio| img_height * ratio / 100)
                .filter(|h| *h > 0),
            ..ResizeOptions::fit_inside()
        };
        let mut overlay_img = ImageResize::apply(overlay_img, &resize)?.to_rgba8();

        // Destination-in against a single tiled pixel of alpha (1 - alpha/100)
        let alpha = options.alpha.as_deref().and_then(percentage).unwrap_or(0);
        if alpha > 0 {
            let mask = 1.0 - alpha as f32 / 100.0;
            for pixel in overlay_img.pixels_mut() {
                pixel[3] = (pixel[3] as f32 * mask).round() as u8;
            }
        }

        let (wm_width, wm_height) = overlay_img.dimensions();
        let position = options.options.clone().unwrap_or_default();
        let (x, y) = Self::position(&position, (img_width, img_height), (wm_width, wm_height));

        tracing::debug!(
            overlay_width = wm_width,
            overlay_height = wm_height,
            x,
            y,
            alpha,
            "Compositing overlay"
        );

        let mut img_rgba = img.to_rgba8();
        imageops::overlay(&mut img_rgba, &overlay_img, x, y);

        Ok(DynamicImage::ImageRgba8(img_rgba))
    }

    fn position(
        position: &OverlayPosition,
        (img_width, img_height): (u32, u32),
        (wm_width, wm_height): (u32, u32),
    ) -> (i64, i64) {
        let centre = |axis: u32, size: u32| (axis as i64 - size as i64) / 2;
        let x = resolve_offset(position.left.as_deref(), img_width, wm_width)
            .unwrap_or_else(|| centre(img_width, wm_width));
        let y = resolve_offset(position.top.as_deref(), img_height, wm_height)
            .unwrap_or_else(|| centre(img_height, wm_height));
        (x, y)
    }
}

/// Integer percentage in `0..=100` written without leading zeros.
fn percentage(text: &str) -> Option<u32> {
    let value: u32 = text.parse().ok()?;
    (value <= 100 && value.to_string() == text).then_some(value)
}
