//! Lumen core library
//!
//! Shared types for the lumen image pipeline: the error taxonomy, configuration,
//! the edit document model and the deep-merge rule used by the path translator.

pub mod color;
pub mod config;
pub mod edit;
pub mod error;
pub mod formats;
pub mod merge;
pub mod storage_types;

pub use color::Color;
pub use config::{Config, FallbackImageConfig, LogFormat, RewriteConfig};
pub use edit::{
    ContentModerationOptions, CropRegion, Edit, EditDocument, Kernel, OverlayOptions,
    OverlayPosition, ResizeOptions, RoundCropOptions, SmartCropOptions, Toggle, MAX_PIXELS,
};
pub use error::{ErrorMetadata, ImageHandlerError, LogLevel};
pub use formats::{ImageFitType, ImageFormatType};
pub use merge::merge_edits;
pub use storage_types::StorageBackend;
