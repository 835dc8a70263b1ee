//! Lumen Processing Library
//!
//! Raster side of the pipeline: decoding, the pixel operations behind each edit,
//! the edit applicator with its output stage, and the fallback-image loader.

pub mod applicator;
pub mod encode;
pub mod fallback;
pub mod geometry;
pub mod mask;
pub mod metadata;
pub mod ops;
pub mod orientation;
pub mod overlay;
pub mod raster;
pub mod resize;

pub use applicator::{
    convert_output_format, ensure_within_payload_limit, EditApplicator, ProcessedImage,
    PAYLOAD_LIMIT,
};
pub use encode::ImageEncoder;
pub use fallback::{FallbackImage, FallbackResponse};
pub use geometry::{clamp_bounding_box, crop_rect_from_box, resolve_offset, CropRect};
pub use metadata::ImageMetadata;
pub use orientation::ImageOrientation;
pub use raster::RasterImage;
pub use resize::ImageResize;
