//! Surface-space rectangles.
//!
//! - Origin top-left, +X right, +Y down
//! - `NormalRect` is resolution independent, `PixelRect` is in physical pixels

mod rect;

pub use rect::{NormalRect, PixelRect};
