//! Thumbor filter table
//!
//! Each filter folds its arguments onto the accumulated edit document. Unknown
//! filters and filters whose arguments do not parse leave the document unchanged.

use lumen_core::{Color, ImageFormatType};
use serde_json::{json, Map, Value};

use crate::mapper::ThumborMapper;

/// Formats the `format` filter may select.
const ACCEPTED_FORMATS: [&str; 7] = ["heic", "heif", "jpeg", "png", "raw", "tiff", "webp"];

pub(crate) fn apply_filter(
    mapper: &ThumborMapper,
    name: &str,
    value: &str,
    file_format: &str,
    edits: &mut Map<String, Value>,
) {
    match name {
        "autojpg" => {
            edits.insert("toFormat".to_string(), json!("jpeg"));
        }
        "background_color" => {
            if let Some(color) = color_value(value) {
                edits.insert("flatten".to_string(), json!({ "background": color }));
            }
        }
        "blur" => {
            let mut args = value.split(',').map(blank_as_nan);
            let radius = args.next().unwrap_or(f64::NAN);
            let sigma = args.next().unwrap_or(f64::NAN);
            let blur = if sigma.is_nan() { radius / 2.0 } else { sigma };
            if blur.is_finite() {
                edits.insert("blur".to_string(), number(blur));
            }
        }
        "convolution" => {
            let mut args = value.split(',');
            let matrix: Option<Vec<f64>> = args
                .next()
                .unwrap_or_default()
                .split(';')
                .map(js_number)
                .collect();
            let width = args.next().and_then(js_number);
            if let (Some(matrix), Some(width)) = (matrix, width) {
                let height = kernel_height(matrix.len(), width);
                let kernel: Vec<Value> = matrix.into_iter().map(number).collect();
                edits.insert(
                    "convolve".to_string(),
                    json!({ "width": number(width), "height": height, "kernel": kernel }),
                );
            }
        }
        "equalize" => {
            edits.insert("normalize".to_string(), json!(true));
        }
        "fill" => {
            if let Some(color) = color_value(value) {
                if let Some(resize) = resize_entry(edits) {
                    resize.insert("fit".to_string(), json!("contain"));
                    resize.insert("background".to_string(), color);
                }
            }
        }
        "format" => {
            let normalized: String = value
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
                .to_lowercase()
                .replacen("jpg", "jpeg", 1);
            if ACCEPTED_FORMATS.contains(&normalized.as_str()) {
                edits.insert("toFormat".to_string(), json!(normalized));
            }
        }
        "grayscale" => {
            edits.insert("grayscale".to_string(), json!(true));
        }
        "no_upscale" => {
            if let Some(resize) = resize_entry(edits) {
                resize.insert("withoutEnlargement".to_string(), json!(true));
            }
        }
        "proportion" => {
            if let (Some(ratio), Some(resize)) = (js_number(value), resize_entry(edits)) {
                for axis in ["width", "height"] {
                    if let Some(size) = resize.get(axis).and_then(Value::as_f64) {
                        resize.insert(axis.to_string(), number(size * ratio));
                    }
                }
            }
        }
        "quality" => {
            let target = ImageFormatType::quality_target(file_format).or_else(|| {
                edits
                    .get("toFormat")
                    .and_then(Value::as_str)
                    .and_then(ImageFormatType::quality_target)
            });
            if let (Some(format), Some(quality)) = (target, js_number(value)) {
                edits.insert(format.as_str().to_string(), json!({ "quality": number(quality) }));
            }
        }
        "rgb" => {
            let channels: Option<Vec<f64>> = value
                .split(',')
                .map(|pct| js_number(pct).map(|p| 255.0 * (p / 100.0)))
                .collect();
            if let Some(&[r, g, b]) = channels.as_deref() {
                edits.insert(
                    "tint".to_string(),
                    json!({ "r": number(r), "g": number(g), "b": number(b) }),
                );
            }
        }
        "rotate" => {
            if let Some(angle) = js_number(value) {
                edits.insert("rotate".to_string(), number(angle));
            }
        }
        "sharpen" => {
            if let Some(amount) = value.split(',').nth(1).and_then(js_number) {
                edits.insert("sharpen".to_string(), number(1.0 + amount / 2.0));
            }
        }
        "stretch" => {
            if let Some(resize) = resize_entry(edits) {
                if resize.get("fit").and_then(Value::as_str) != Some("inside") {
                    resize.insert("fit".to_string(), json!("fill"));
                }
            }
        }
        "strip_exif" | "strip_icc" => {
            edits.insert("rotate".to_string(), Value::Null);
        }
        "upscale" => {
            if let Some(resize) = resize_entry(edits) {
                resize.insert("fit".to_string(), json!("inside"));
            }
        }
        "watermark" => {
            let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
            let args: Vec<&str> = compact.split(',').collect();
            let arg = |i: usize| args.get(i).copied();

            let mut overlay = Map::new();
            for (field, index) in [("bucket", 0), ("key", 1), ("alpha", 4), ("wRatio", 5), ("hRatio", 6)] {
                if let Some(v) = arg(index) {
                    overlay.insert(field.to_string(), json!(v));
                }
            }

            let mut options = Map::new();
            for (field, index) in [("left", 2), ("top", 3)] {
                if let Some(pos) = arg(index).filter(|p| is_position(mapper, p)) {
                    options.insert(field.to_string(), json!(pos));
                }
            }
            overlay.insert("options".to_string(), Value::Object(options));
            edits.insert("overlayWith".to_string(), Value::Object(overlay));
        }
        other => {
            tracing::debug!(filter = %other, "Unsupported thumbor filter ignored");
        }
    }
}

fn is_position(mapper: &ThumborMapper, token: &str) -> bool {
    mapper.is_position(token) || (!token.is_empty() && js_number(token).is_some())
}

/// `resize` object of the document, created when missing.
fn resize_entry(edits: &mut Map<String, Value>) -> Option<&mut Map<String, Value>> {
    if !matches!(edits.get("resize"), Some(Value::Object(_))) {
        edits.insert("resize".to_string(), Value::Object(Map::new()));
    }
    edits.get_mut("resize").and_then(Value::as_object_mut)
}

fn color_value(value: &str) -> Option<Value> {
    match Color::from_thumbor(value) {
        Ok(color) => serde_json::to_value(color).ok(),
        Err(e) => {
            tracing::debug!(color = %value, error = %e, "Ignoring unparseable thumbor colour");
            None
        }
    }
}

/// Rows of a kernel laid out `width` values per row.
fn kernel_height(len: usize, width: f64) -> usize {
    if width >= 1.0 && width.fract() == 0.0 {
        len / width as usize
    } else {
        0
    }
}

/// Numeric argument; blank counts as zero the way thumbor clients rely on.
fn js_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn blank_as_nan(text: &str) -> f64 {
    if text.is_empty() {
        f64::NAN
    } else {
        js_number(text).unwrap_or(f64::NAN)
    }
}

/// Whole numbers serialize as integers so documents stay readable.
fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}
