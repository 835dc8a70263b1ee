use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Image container formats understood by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormatType {
    Jpeg,
    Png,
    Webp,
    Tiff,
    Heif,
    Heic,
    Avif,
    Gif,
    Raw,
}

impl ImageFormatType {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageFormatType::Jpeg => "jpeg",
            ImageFormatType::Png => "png",
            ImageFormatType::Webp => "webp",
            ImageFormatType::Tiff => "tiff",
            ImageFormatType::Heif => "heif",
            ImageFormatType::Heic => "heic",
            ImageFormatType::Avif => "avif",
            ImageFormatType::Gif => "gif",
            ImageFormatType::Raw => "raw",
        }
    }

    pub fn to_mime_type(self) -> &'static str {
        match self {
            ImageFormatType::Jpeg => "image/jpeg",
            ImageFormatType::Png => "image/png",
            ImageFormatType::Webp => "image/webp",
            ImageFormatType::Tiff => "image/tiff",
            ImageFormatType::Heif => "image/heif",
            ImageFormatType::Heic => "image/heic",
            ImageFormatType::Avif => "image/avif",
            ImageFormatType::Gif => "image/gif",
            ImageFormatType::Raw => "application/octet-stream",
        }
    }

    /// Formats that carry a `{quality}` option in an edit document.
    pub fn quality_target(token: &str) -> Option<Self> {
        match token {
            "jpg" | "jpeg" => Some(ImageFormatType::Jpeg),
            "png" => Some(ImageFormatType::Png),
            "webp" => Some(ImageFormatType::Webp),
            "tiff" => Some(ImageFormatType::Tiff),
            "heif" => Some(ImageFormatType::Heif),
            _ => None,
        }
    }

    /// Formats a caller may request as the output of `process`.
    pub fn output_target(token: &str) -> Option<Self> {
        match token {
            "jpg" | "jpeg" => Some(ImageFormatType::Jpeg),
            "png" => Some(ImageFormatType::Png),
            "webp" => Some(ImageFormatType::Webp),
            "tiff" => Some(ImageFormatType::Tiff),
            "heif" => Some(ImageFormatType::Heif),
            "avif" => Some(ImageFormatType::Avif),
            "raw" => Some(ImageFormatType::Raw),
            _ => None,
        }
    }

    /// Whether the detection service accepts this encoding directly.
    pub fn is_detection_compatible(self) -> bool {
        matches!(self, ImageFormatType::Jpeg | ImageFormatType::Png)
    }
}

impl FromStr for ImageFormatType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(ImageFormatType::Jpeg),
            "png" => Ok(ImageFormatType::Png),
            "webp" => Ok(ImageFormatType::Webp),
            "tif" | "tiff" => Ok(ImageFormatType::Tiff),
            "heif" => Ok(ImageFormatType::Heif),
            "heic" => Ok(ImageFormatType::Heic),
            "avif" => Ok(ImageFormatType::Avif),
            "gif" => Ok(ImageFormatType::Gif),
            "raw" => Ok(ImageFormatType::Raw),
            _ => Err(anyhow::anyhow!("Invalid image format: {}", s)),
        }
    }
}

impl Display for ImageFormatType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// How a resize reconciles the requested box with the source aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFitType {
    #[default]
    Cover,
    Contain,
    Fill,
    Inside,
    Outside,
}

impl ImageFitType {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageFitType::Cover => "cover",
            ImageFitType::Contain => "contain",
            ImageFitType::Fill => "fill",
            ImageFitType::Inside => "inside",
            ImageFitType::Outside => "outside",
        }
    }
}

impl FromStr for ImageFitType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cover" => Ok(ImageFitType::Cover),
            "contain" => Ok(ImageFitType::Contain),
            "fill" => Ok(ImageFitType::Fill),
            "inside" => Ok(ImageFitType::Inside),
            "outside" => Ok(ImageFitType::Outside),
            _ => Err(anyhow::anyhow!("Invalid fit: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse() {
        assert_eq!("JPG".parse::<ImageFormatType>().unwrap(), ImageFormatType::Jpeg);
        assert_eq!("webp".parse::<ImageFormatType>().unwrap(), ImageFormatType::Webp);
        assert!("bmp".parse::<ImageFormatType>().is_err());
    }

    #[test]
    fn test_quality_targets() {
        assert_eq!(ImageFormatType::quality_target("jpg"), Some(ImageFormatType::Jpeg));
        assert_eq!(ImageFormatType::quality_target("heif"), Some(ImageFormatType::Heif));
        assert_eq!(ImageFormatType::quality_target("heic"), None);
        assert_eq!(ImageFormatType::quality_target("gif"), None);
    }

    #[test]
    fn test_output_targets() {
        assert_eq!(ImageFormatType::output_target("raw"), Some(ImageFormatType::Raw));
        assert_eq!(ImageFormatType::output_target("gif"), None);
        assert_eq!(ImageFormatType::output_target("heic"), None);
    }

    #[test]
    fn test_fit_parse() {
        assert_eq!("Inside".parse::<ImageFitType>().unwrap(), ImageFitType::Inside);
        assert!("stretch".parse::<ImageFitType>().is_err());
        assert_eq!(ImageFitType::default(), ImageFitType::Cover);
    }
}
