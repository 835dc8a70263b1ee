use anyhow::{Context, Result};
use lumen_core::{merge_edits, EditDocument, ImageHandlerError};
use regex::Regex;
use serde_json::{json, Map, Value};

use crate::filters;

/// Compiled grammar for legacy thumbor paths.
pub struct ThumborMapper {
    crop: Regex,
    resize: Regex,
    filter_token: Regex,
    filter_call: Regex,
    position: Regex,
}

impl ThumborMapper {
    pub fn new() -> Result<Self> {
        Ok(ThumborMapper {
            crop: Regex::new(r"(\d+)x(\d+):(\d+)x(\d+)").context("Failed to compile crop pattern")?,
            // A dimension segment sits between slashes (or starts the path) so digits
            // inside file names are never read as a size.
            resize: Regex::new(r"(?:^|/)(\d+)x(\d+)/").context("Failed to compile resize pattern")?,
            filter_token: Regex::new(r"filters:[^)]+").context("Failed to compile filter pattern")?,
            filter_call: Regex::new(r":(.+)\((.*)\)").context("Failed to compile filter call pattern")?,
            position: Regex::new(r"^(100|[1-9]?[0-9]|-(100|[1-9][0-9]?))p$")
                .context("Failed to compile watermark position pattern")?,
        })
    }

    /// Translate a path into an ordered edit document.
    pub fn translate(&self, path: &str) -> Result<EditDocument, ImageHandlerError> {
        EditDocument::from_map(&self.map_path_to_edits(path))
    }

    /// Translate a path into the JSON form of its edit document.
    pub fn map_path_to_edits(&self, path: &str) -> Map<String, Value> {
        let file_format = path.rsplit('.').next().unwrap_or_default().to_lowercase();

        let mut edits = merge_edits([
            self.map_crop(path),
            self.map_resize(path),
            self.map_fit_in(path),
        ]);

        for token in self.filter_tokens(path) {
            let Some(call) = self.filter_call.captures(&token) else {
                tracing::debug!(filter = %token, "Ignoring malformed thumbor filter");
                continue;
            };
            let name = call.get(1).map(|m| m.as_str()).unwrap_or_default();
            let value = call.get(2).map(|m| m.as_str()).unwrap_or_default();
            filters::apply_filter(self, name, value, &file_format, &mut edits);
        }

        tracing::debug!(path = %path, edit_count = edits.len(), "Mapped thumbor path");
        edits
    }

    /// All `filters:name(args)` tokens, sorted by their raw text.
    pub fn filter_tokens(&self, path: &str) -> Vec<String> {
        let mut tokens: Vec<String> = self
            .filter_token
            .find_iter(path)
            .map(|m| format!("{})", m.as_str()))
            .collect();
        tokens.sort();
        tokens
    }

    pub fn map_crop(&self, path: &str) -> Map<String, Value> {
        let Some(caps) = self.crop.captures(path) else {
            return Map::new();
        };
        let coords: Option<Vec<i64>> = (1..=4)
            .map(|i| caps.get(i).and_then(|m| m.as_str().parse().ok()))
            .collect();

        match coords.as_deref() {
            Some(&[left, top, right, bottom]) => object(json!({
                "crop": {
                    "left": left,
                    "top": top,
                    "width": right - left,
                    "height": bottom - top
                }
            })),
            _ => Map::new(),
        }
    }

    pub fn map_resize(&self, path: &str) -> Map<String, Value> {
        let Some(caps) = self.resize.captures(path) else {
            return Map::new();
        };
        let width = caps.get(1).and_then(|m| m.as_str().parse::<u64>().ok());
        let height = caps.get(2).and_then(|m| m.as_str().parse::<u64>().ok());
        let (Some(width), Some(height)) = (width, height) else {
            return Map::new();
        };

        let mut resize = Map::new();
        if width == 0 || height == 0 {
            resize.insert("fit".to_string(), json!("inside"));
        }
        resize.insert("width".to_string(), dimension(width));
        resize.insert("height".to_string(), dimension(height));

        let mut edits = Map::new();
        edits.insert("resize".to_string(), Value::Object(resize));
        edits
    }

    pub fn map_fit_in(&self, path: &str) -> Map<String, Value> {
        if path.contains("fit-in") {
            object(json!({"resize": {"fit": "inside"}}))
        } else {
            Map::new()
        }
    }

    pub(crate) fn is_position(&self, token: &str) -> bool {
        self.position.is_match(token)
    }
}

fn dimension(value: u64) -> Value {
    if value == 0 {
        Value::Null
    } else {
        Value::from(value)
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> ThumborMapper {
        ThumborMapper::new().unwrap()
    }

    #[test]
    fn test_crop_extractor() {
        let edits = mapper().map_crop("10x20:110x220/img.jpg");
        assert_eq!(
            Value::Object(edits),
            json!({"crop": {"left": 10, "top": 20, "width": 100, "height": 200}})
        );
        assert!(mapper().map_crop("/200x300/img.jpg").is_empty());
    }

    #[test]
    fn test_resize_uses_first_segment_only() {
        let edits = mapper().map_resize("/300x400/filters:grayscale()/photo_1200x800/img.jpg");
        assert_eq!(Value::Object(edits), json!({"resize": {"width": 300, "height": 400}}));

        // Dimensions embedded in a file name are not a size segment.
        assert!(mapper().map_resize("/photo_1200x800.jpg").is_empty());
        assert!(mapper().map_resize("/10x20:110x220/img.jpg").is_empty());
    }

    #[test]
    fn test_resize_zero_dimension() {
        let edits = mapper().map_resize("/0x400/img.jpg");
        assert_eq!(
            Value::Object(edits),
            json!({"resize": {"fit": "inside", "width": null, "height": 400}})
        );
        let edits = mapper().map_resize("/400x0/img.jpg");
        assert_eq!(edits["resize"]["height"], Value::Null);
        assert_eq!(edits["resize"]["width"], json!(400));
    }

    #[test]
    fn test_fit_in_extractor() {
        assert_eq!(
            Value::Object(mapper().map_fit_in("/fit-in/img.jpg")),
            json!({"resize": {"fit": "inside"}})
        );
        assert!(mapper().map_fit_in("/img.jpg").is_empty());
    }

    #[test]
    fn test_filter_tokens_sorted() {
        let tokens = mapper().filter_tokens("/filters:quality(80)/filters:format(webp)/img");
        assert_eq!(tokens, vec!["filters:format(webp)", "filters:quality(80)"]);

        let tokens = mapper().filter_tokens("/filters:rotate(90):grayscale()/img.jpg");
        assert_eq!(tokens, vec!["filters:rotate(90)"]);
    }

    #[test]
    fn test_malformed_filter_ignored() {
        let edits = mapper().map_path_to_edits("/filters:grayscale/img.jpg");
        assert!(edits.is_empty());
    }
}
