//! Geometry utilities
//!
//! Pure coordinate math shared by the smart-crop and overlay handlers: normalized
//! face boxes, padded crop rectangles and positional offsets.

use lumen_core::ImageHandlerError;
use lumen_vision::{BoundingBox, FaceDetail};

/// Pixel rectangle computed from a bounding box. Components may be negative or
/// overflow the image until checked with [`CropRect::to_region`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub left: i64,
    pub top: i64,
    pub width: i64,
    pub height: i64,
}

impl CropRect {
    /// `(left, top, width, height)` if the rectangle is non-empty and inside the image.
    pub fn to_region(&self, image_width: u32, image_height: u32) -> Option<(u32, u32, u32, u32)> {
        if self.left < 0 || self.top < 0 || self.width <= 0 || self.height <= 0 {
            return None;
        }
        if self.left + self.width > image_width as i64 || self.top + self.height > image_height as i64
        {
            return None;
        }
        Some((
            self.left as u32,
            self.top as u32,
            self.width as u32,
            self.height as u32,
        ))
    }
}

/// Clamp each component to `[0, 1]`, then trim the box at the right and bottom edges.
pub fn clamp_bounding_box(bbox: BoundingBox) -> BoundingBox {
    let mut clamped = BoundingBox {
        top: bbox.top.clamp(0.0, 1.0),
        left: bbox.left.clamp(0.0, 1.0),
        width: bbox.width.clamp(0.0, 1.0),
        height: bbox.height.clamp(0.0, 1.0),
    };
    if clamped.left + clamped.width > 1.0 {
        clamped.width = 1.0 - clamped.left;
    }
    if clamped.top + clamped.height > 1.0 {
        clamped.height = 1.0 - clamped.top;
    }
    clamped
}

/// Pixel crop around a normalized box, grown by `padding` pixels on every side and
/// clamped to the image.
pub fn crop_rect_from_box(bbox: &BoundingBox, padding: f64, width: u32, height: u32) -> CropRect {
    let (w, h) = (width as f64, height as f64);

    let left = (bbox.left * w - padding).floor().max(0.0) as i64;
    let top = (bbox.top * h - padding).floor().max(0.0) as i64;
    let extract_width = (bbox.width * w + padding * 2.0).floor() as i64;
    let extract_height = (bbox.height * h + padding * 2.0).floor() as i64;

    CropRect {
        left,
        top,
        width: extract_width.min(width as i64 - left),
        height: extract_height.min(height as i64 - top),
    }
}

/// Resolve an overlay offset along one axis.
///
/// `"10"` is absolute, `"-10"` counts from the far edge, `"25p"` is a percentage of
/// the axis and `"-25p"` a percentage from the far edge. `None` when the token is
/// absent or has no leading integer.
pub fn resolve_offset(token: Option<&str>, axis: u32, overlay: u32) -> Option<i64> {
    let token = token?;
    let (axis, overlay) = (axis as f64, overlay as f64);

    if let Some(percent) = token.strip_suffix('p') {
        let percent = leading_int(percent)? as f64;
        let offset = if percent < 0.0 {
            axis + (axis * percent) / 100.0 - overlay
        } else {
            (axis * percent) / 100.0
        };
        return Some(offset.floor() as i64);
    }

    let value = leading_int(token)?;
    if value < 0 {
        Some((axis + value as f64 - overlay) as i64)
    } else {
        Some(value)
    }
}

/// Optional sign followed by digits at the start of `text`; trailing text is ignored.
fn leading_int(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let (sign, digits) = match text.as_bytes().first() {
        Some(b'-') => (-1, &text[1..]),
        Some(b'+') => (1, &text[1..]),
        _ => (1, text),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|v| sign * v)
}

/// Bounding box of the face at `face_index`, or the whole image when no face was found.
pub fn face_bounding_box(
    faces: &[FaceDetail],
    face_index: i64,
) -> Result<BoundingBox, ImageHandlerError> {
    if faces.is_empty() {
        return Ok(BoundingBox {
            top: 0.0,
            left: 0.0,
            width: 1.0,
            height: 1.0,
        });
    }

    usize::try_from(face_index)
        .ok()
        .and_then(|index| faces.get(index))
        .map(|face| clamp_bounding_box(face.bounding_box))
        .ok_or(ImageHandlerError::SmartCropFaceIndexOutOfRange {
            face_index,
            detected: faces.len(),
        })
}
