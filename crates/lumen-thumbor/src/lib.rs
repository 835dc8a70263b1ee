//! Thumbor-style URL path translation
//!
//! Turns legacy request paths such as `/fit-in/200x300/filters:grayscale()/img.jpg`
//! into an edit document. Crop, resize and fit-in segments are extracted
//! independently and deep-merged; `filters:` invocations are then folded over the
//! result in sorted order so `format` always lands before `quality`.

pub mod custom_path;
pub mod filters;
pub mod mapper;

pub use custom_path::parse_custom_path;
pub use mapper::ThumborMapper;
