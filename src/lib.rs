//! Interactive canvas core for a generative image editor: aspect-fit
//! viewport, inpainting mask brush, expansion handles and the exports handed
//! to a remote generation service.

#[macro_use]
pub mod logger;

pub mod cli;
pub mod config;
pub mod error;
pub mod geometry;
pub mod handles;
pub mod host;
pub mod mask;
pub mod ops;
pub mod scripting;
pub mod service;
pub mod sketch;
pub mod source;
pub mod viewport;

pub use config::CanvasConfig;
pub use error::{CanvasError, CanvasResult};
pub use geometry::ViewportRect;
pub use handles::Handle;
pub use host::ViewportCanvas;
pub use mask::{BrushSettings, MaskLayer};
pub use source::{EncodedImage, ImageMime, SourceImage};
pub use viewport::{Command, Query, QueryResult, Tool, ViewportState};
