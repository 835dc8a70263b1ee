use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An sRGB colour with 0-255 channels and a 0-1 alpha.
///
/// Channels stay fractional because `rgb(..)` percentages rarely land on whole values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub alpha: f32,
}

impl Color {
    pub const TRANSPARENT_BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        alpha: 0.0,
    };

    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Color {
            r,
            g,
            b,
            alpha: 1.0,
        }
    }

    /// Parse any CSS colour expression (`#ff0000`, `red`, `rgb(255 0 0)`).
    pub fn parse(value: &str) -> anyhow::Result<Self> {
        let parsed = csscolorparser::parse(value)
            .map_err(|e| anyhow::anyhow!("Invalid colour '{}': {}", value, e))?;
        let [r, g, b, a] = parsed.to_rgba8();
        Ok(Color {
            r: r as f32,
            g: g as f32,
            b: b as f32,
            alpha: a as f32 / 255.0,
        })
    }

    /// Parse a thumbor colour argument: a CSS colour name as-is, anything else as hex digits.
    pub fn from_thumbor(value: &str) -> anyhow::Result<Self> {
        let is_hex = !value.is_empty() && value.chars().all(|c| c.is_ascii_hexdigit());
        if is_hex {
            Self::parse(&format!("#{}", value))
        } else {
            Self::parse(value)
        }
    }

    pub fn to_rgba8(self) -> [u8; 4] {
        [
            self.r.round().clamp(0.0, 255.0) as u8,
            self.g.round().clamp(0.0, 255.0) as u8,
            self.b.round().clamp(0.0, 255.0) as u8,
            (self.alpha * 255.0).round().clamp(0.0, 255.0) as u8,
        ]
    }
}

#[derive(Serialize, Deserialize)]
struct ColorObject {
    r: f32,
    g: f32,
    b: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    alpha: Option<f32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ColorRepr {
    Object(ColorObject),
    Text(String),
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ColorObject {
            r: self.r,
            g: self.g,
            b: self.b,
            alpha: (self.alpha < 1.0).then_some(self.alpha),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match ColorRepr::deserialize(deserializer)? {
            ColorRepr::Object(obj) => Ok(Color {
                r: obj.r,
                g: obj.g,
                b: obj.b,
                alpha: obj.alpha.unwrap_or(1.0),
            }),
            ColorRepr::Text(text) => Color::parse(&text).map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_thumbor_hex_and_names() {
        assert_eq!(Color::from_thumbor("ffff00").unwrap(), Color::rgb(255.0, 255.0, 0.0));
        assert_eq!(Color::from_thumbor("abc").unwrap(), Color::rgb(170.0, 187.0, 204.0));
        assert_eq!(Color::from_thumbor("red").unwrap(), Color::rgb(255.0, 0.0, 0.0));
        assert!(Color::from_thumbor("notacolour").is_err());
    }

    #[test]
    fn test_serialize_omits_opaque_alpha() {
        let value = serde_json::to_value(Color::rgb(1.0, 2.0, 3.0)).unwrap();
        assert_eq!(value, json!({"r": 1.0, "g": 2.0, "b": 3.0}));
    }

    #[test]
    fn test_deserialize_object_or_string() {
        let c: Color = serde_json::from_value(json!({"r": 10, "g": 20, "b": 30, "alpha": 0.5})).unwrap();
        assert_eq!(c.to_rgba8(), [10, 20, 30, 128]);

        let c: Color = serde_json::from_value(json!("#00ff00")).unwrap();
        assert_eq!(c.to_rgba8(), [0, 255, 0, 255]);
    }
}
