//! Edit document model
//!
//! An edit document arrives as a JSON object whose key order is significant. It is
//! converted once into an ordered list of [`Edit`] values; the applicator then folds
//! over that list. Unknown keys become [`Edit::PassThrough`] so the applicator can
//! decide whether the operation is allowed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::color::Color;
use crate::error::ImageHandlerError;
use crate::formats::{ImageFitType, ImageFormatType};

/// Edit keys holding per-format encoder options (`{"jpeg": {"quality": 80}}`).
const FORMAT_OPTION_KEYS: [&str; 6] = ["jpeg", "png", "webp", "tiff", "heif", "avif"];

/// Largest pixel count an edit may produce (libvips' `limitInputPixels`, 0x3FFF squared).
pub const MAX_PIXELS: u64 = 268_402_689;

/// Boolean-or-object switch used by `smartCrop`, `roundCrop` and `contentModeration`.
#[derive(Debug, Clone, PartialEq)]
pub enum Toggle<T> {
    Enabled,
    EnabledWithOptions(T),
}

impl<T: Default + Clone> Toggle<T> {
    /// Options record with defaults filled in for the bare `true` form.
    pub fn resolve(&self) -> T {
        match self {
            Toggle::Enabled => T::default(),
            Toggle::EnabledWithOptions(options) => options.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fit: Option<ImageFitType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<Color>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub without_enlargement: bool,
}

impl ResizeOptions {
    /// The resize injected when a document carries none.
    pub fn fit_inside() -> Self {
        ResizeOptions {
            fit: Some(ImageFitType::Inside),
            ..ResizeOptions::default()
        }
    }

    fn from_value(value: &Value) -> Result<Self, ImageHandlerError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Raw {
            #[serde(default, deserialize_with = "lenient::opt_f64")]
            width: Option<f64>,
            #[serde(default, deserialize_with = "lenient::opt_f64")]
            height: Option<f64>,
            #[serde(default)]
            fit: Option<ImageFitType>,
            #[serde(default)]
            background: Option<Color>,
            #[serde(default)]
            without_enlargement: Option<bool>,
        }

        let raw: Raw = serde_json::from_value(value.clone())
            .map_err(|e| ImageHandlerError::InvalidEdit(format!("resize: {}", e)))?;

        Ok(ResizeOptions {
            width: dimension("width", raw.width)?,
            height: dimension("height", raw.height)?,
            fit: raw.fit,
            background: raw.background,
            without_enlargement: raw.without_enlargement.unwrap_or(false),
        })
    }
}

/// Round a requested dimension; zero and absent both mean unconstrained.
fn dimension(name: &str, value: Option<f64>) -> Result<Option<u32>, ImageHandlerError> {
    match value {
        None => Ok(None),
        Some(v) if !v.is_finite() || v < 0.0 => Err(ImageHandlerError::InvalidEdit(format!(
            "resize: {} must be a positive number",
            name
        ))),
        Some(v) => {
            let rounded = v.round();
            if rounded == 0.0 {
                Ok(None)
            } else if rounded > MAX_PIXELS as f64 {
                Err(ImageHandlerError::InvalidEdit(format!(
                    "resize: {} {} exceeds the pixel limit",
                    name, rounded
                )))
            } else {
                Ok(Some(rounded as u32))
            }
        }
    }
}

/// Explicit pixel rectangle from a `crop` edit, validated against the image at apply time.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct CropRegion {
    #[serde(deserialize_with = "lenient::number")]
    pub left: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub top: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub width: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub height: f64,
}

impl CropRegion {
    /// Pixel rectangle `(left, top, width, height)` if it is integral, non-empty and
    /// fully inside an image of the given size.
    pub fn to_pixels(&self, image_width: u32, image_height: u32) -> Option<(u32, u32, u32, u32)> {
        let values = [self.left, self.top, self.width, self.height];
        if values.iter().any(|v| !v.is_finite() || v.fract() != 0.0 || *v < 0.0) {
            return None;
        }
        if self.width == 0.0 || self.height == 0.0 {
            return None;
        }
        if self.left + self.width > image_width as f64 || self.top + self.height > image_height as f64
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

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Kernel {
    pub width: u32,
    pub height: u32,
    pub kernel: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct OverlayPosition {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub left: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub top: Option<String>,
}

/// Watermark composited from the object store.
///
/// Ratios, alpha and offsets keep their textual form; thumbor paths produce strings
/// and the offset grammar (`-50p`, `10`) is resolved against the target image.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayOptions {
    pub bucket: String,
    pub key: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub w_ratio: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub h_ratio: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub alpha: Option<String>,
    #[serde(default)]
    pub options: Option<OverlayPosition>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartCropOptions {
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub face_index: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub padding: Option<f64>,
}

impl SmartCropOptions {
    /// Zero-based face index; negative values never match a detected face.
    pub fn face_index(&self) -> i64 {
        self.face_index.map(|v| v.trunc() as i64).unwrap_or(0)
    }

    pub fn padding(&self) -> f64 {
        self.padding.unwrap_or(0.0)
    }
}

/// Ellipse parameters; unset or non-positive values fall back to the image centre and
/// half the shorter side.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct RoundCropOptions {
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub top: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub left: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub rx: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub ry: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentModerationOptions {
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub min_confidence: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub blur: Option<f64>,
    #[serde(default)]
    pub moderation_labels: Option<Vec<String>>,
}

impl ContentModerationOptions {
    pub const DEFAULT_MIN_CONFIDENCE: f32 = 75.0;
    pub const DEFAULT_BLUR: f32 = 50.0;

    pub fn min_confidence(&self) -> f32 {
        self.min_confidence
            .map(|v| v as f32)
            .unwrap_or(Self::DEFAULT_MIN_CONFIDENCE)
    }

    /// Blur sigma, rounded up.
    pub fn blur(&self) -> f32 {
        self.blur
            .map(|v| v.ceil() as f32)
            .unwrap_or(Self::DEFAULT_BLUR)
    }
}

/// A single operation of an edit document.
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    Resize(ResizeOptions),
    Crop(CropRegion),
    /// `None` auto-orients and strips EXIF/ICC metadata without further rotation.
    Rotate(Option<f64>),
    Flip,
    Flop,
    Grayscale,
    /// `None` is the mild box blur requested with `blur: true`.
    Blur(Option<f32>),
    Sharpen(Option<f32>),
    Normalize,
    Tint(Color),
    Flatten { background: Option<Color> },
    Convolve(Kernel),
    OverlayWith(OverlayOptions),
    SmartCrop(Toggle<SmartCropOptions>),
    RoundCrop(Toggle<RoundCropOptions>),
    ContentModeration(Toggle<ContentModerationOptions>),
    ToFormat(String),
    FormatOptions {
        format: ImageFormatType,
        quality: Option<u8>,
    },
    PassThrough { name: String, value: Value },
}

impl Edit {
    /// Document key this edit was parsed from.
    pub fn name(&self) -> &str {
        match self {
            Edit::Resize(_) => "resize",
            Edit::Crop(_) => "crop",
            Edit::Rotate(_) => "rotate",
            Edit::Flip => "flip",
            Edit::Flop => "flop",
            Edit::Grayscale => "grayscale",
            Edit::Blur(_) => "blur",
            Edit::Sharpen(_) => "sharpen",
            Edit::Normalize => "normalize",
            Edit::Tint(_) => "tint",
            Edit::Flatten { .. } => "flatten",
            Edit::Convolve(_) => "convolve",
            Edit::OverlayWith(_) => "overlayWith",
            Edit::SmartCrop(_) => "smartCrop",
            Edit::RoundCrop(_) => "roundCrop",
            Edit::ContentModeration(_) => "contentModeration",
            Edit::ToFormat(_) => "toFormat",
            Edit::FormatOptions { format, .. } => format.as_str(),
            Edit::PassThrough { name, .. } => name,
        }
    }

    /// Parse one `key: value` pair. `Ok(None)` means the edit is switched off.
    pub fn parse(key: &str, value: &Value) -> Result<Option<Edit>, ImageHandlerError> {
        let invalid = |e: serde_json::Error| ImageHandlerError::InvalidEdit(format!("{}: {}", key, e));

        let edit = match key {
            "resize" => Edit::Resize(ResizeOptions::from_value(value)?),
            "crop" => Edit::Crop(serde_json::from_value(value.clone()).map_err(invalid)?),
            "rotate" => match value {
                Value::Null => Edit::Rotate(None),
                other => Edit::Rotate(Some(number(key, other)?)),
            },
            "flip" => return Ok(flag(value).then_some(Edit::Flip)),
            "flop" => return Ok(flag(value).then_some(Edit::Flop)),
            "grayscale" | "greyscale" => return Ok(flag(value).then_some(Edit::Grayscale)),
            "normalize" | "normalise" => return Ok(flag(value).then_some(Edit::Normalize)),
            "blur" => match value {
                Value::Bool(false) | Value::Null => return Ok(None),
                Value::Bool(true) => Edit::Blur(None),
                other => Edit::Blur(Some(number(key, other)? as f32)),
            },
            "sharpen" => match value {
                Value::Bool(false) | Value::Null => return Ok(None),
                Value::Bool(true) => Edit::Sharpen(None),
                Value::Object(map) => match map.get("sigma") {
                    Some(sigma) => Edit::Sharpen(Some(number(key, sigma)? as f32)),
                    None => Edit::Sharpen(None),
                },
                other => Edit::Sharpen(Some(number(key, other)? as f32)),
            },
            "tint" => Edit::Tint(serde_json::from_value(value.clone()).map_err(invalid)?),
            "flatten" => match value {
                Value::Bool(false) | Value::Null => return Ok(None),
                Value::Bool(true) => Edit::Flatten { background: None },
                Value::Object(map) => Edit::Flatten {
                    background: map
                        .get("background")
                        .map(|bg| serde_json::from_value(bg.clone()))
                        .transpose()
                        .map_err(invalid)?,
                },
                _ => return Err(ImageHandlerError::InvalidEdit(format!("{}: expected object", key))),
            },
            "convolve" => Edit::Convolve(serde_json::from_value(value.clone()).map_err(invalid)?),
            "overlayWith" => {
                Edit::OverlayWith(serde_json::from_value(value.clone()).map_err(invalid)?)
            }
            "smartCrop" => match toggle(key, value)? {
                Some(t) => Edit::SmartCrop(t),
                None => return Ok(None),
            },
            "roundCrop" => match toggle(key, value)? {
                Some(t) => Edit::RoundCrop(t),
                None => return Ok(None),
            },
            "contentModeration" => match toggle(key, value)? {
                Some(t) => Edit::ContentModeration(t),
                None => return Ok(None),
            },
            "toFormat" => match value {
                Value::String(format) => Edit::ToFormat(format.clone()),
                Value::Object(map) => match map.get("format").and_then(Value::as_str) {
                    Some(format) => Edit::ToFormat(format.to_string()),
                    None => {
                        return Err(ImageHandlerError::InvalidEdit(
                            "toFormat: missing format".to_string(),
                        ))
                    }
                },
                _ => {
                    return Err(ImageHandlerError::InvalidEdit(
                        "toFormat: expected a format name".to_string(),
                    ))
                }
            },
            k if FORMAT_OPTION_KEYS.contains(&k) => {
                let format = k
                    .parse::<ImageFormatType>()
                    .map_err(|e| ImageHandlerError::InvalidEdit(e.to_string()))?;
                let quality = match value.get("quality") {
                    Some(q) => Some(number(key, q)?.round().clamp(1.0, 100.0) as u8),
                    None => None,
                };
                Edit::FormatOptions { format, quality }
            }
            other => Edit::PassThrough {
                name: other.to_string(),
                value: value.clone(),
            },
        };

        Ok(Some(edit))
    }
}

fn flag(value: &Value) -> bool {
    !matches!(value, Value::Bool(false) | Value::Null)
}

fn number(key: &str, value: &Value) -> Result<f64, ImageHandlerError> {
    lenient::as_f64(value)
        .ok_or_else(|| ImageHandlerError::InvalidEdit(format!("{}: expected a number", key)))
}

fn toggle<T>(key: &str, value: &Value) -> Result<Option<Toggle<T>>, ImageHandlerError>
where
    T: for<'de> Deserialize<'de>,
{
    match value {
        Value::Bool(true) => Ok(Some(Toggle::Enabled)),
        Value::Bool(false) | Value::Null => Ok(None),
        Value::Object(_) => serde_json::from_value(value.clone())
            .map(|options| Some(Toggle::EnabledWithOptions(options)))
            .map_err(|e| ImageHandlerError::InvalidEdit(format!("{}: {}", key, e))),
        _ => Err(ImageHandlerError::InvalidEdit(format!(
            "{}: expected a boolean or an object",
            key
        ))),
    }
}

/// Ordered list of edits for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditDocument {
    edits: Vec<Edit>,
}

impl EditDocument {
    pub fn new(edits: Vec<Edit>) -> Self {
        EditDocument { edits }
    }

    /// Build a document from a JSON object, keeping its key order. `null` is empty.
    pub fn from_json(value: &Value) -> Result<Self, ImageHandlerError> {
        match value {
            Value::Null => Ok(EditDocument::default()),
            Value::Object(map) => Self::from_map(map),
            _ => Err(ImageHandlerError::InvalidEdit(
                "edits must be a JSON object".to_string(),
            )),
        }
    }

    pub fn from_map(map: &Map<String, Value>) -> Result<Self, ImageHandlerError> {
        let mut edits = Vec::with_capacity(map.len());
        for (key, value) in map {
            if let Some(edit) = Edit::parse(key, value)? {
                edits.push(edit);
            }
        }
        Ok(EditDocument { edits })
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Edit> {
        self.edits.iter()
    }

    pub fn resize(&self) -> Option<&ResizeOptions> {
        self.edits.iter().find_map(|edit| match edit {
            Edit::Resize(options) => Some(options),
            _ => None,
        })
    }

    /// Append `resize.fit = inside` when the document has no resize.
    pub fn with_default_resize(mut self) -> Self {
        if self.resize().is_none() {
            self.edits.push(Edit::Resize(ResizeOptions::fit_inside()));
        }
        self
    }

    /// Whether the output must drop EXIF and ICC metadata.
    pub fn strips_metadata(&self) -> bool {
        self.edits.iter().any(|edit| matches!(edit, Edit::Rotate(None)))
    }
}

impl<'a> IntoIterator for &'a EditDocument {
    type Item = &'a Edit;
    type IntoIter = std::slice::Iter<'a, Edit>;

    fn into_iter(self) -> Self::IntoIter {
        self.edits.iter()
    }
}

/// Deserializers accepting numbers written as strings, the way query-built documents arrive.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn as_f64(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        let value = Value::deserialize(deserializer)?;
        as_f64(&value).ok_or_else(|| serde::de::Error::custom(format!("expected a number, got {}", value)))
    }

    pub fn opt_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::Null => Ok(None),
            Value::String(ref s) if s.trim().is_empty() => Ok(None),
            other => as_f64(&other)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("expected a number, got {}", other))),
        }
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            Value::Number(n) => Ok(Some(n.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "expected a string or number, got {}",
                other
            ))),
        }
    }
}
