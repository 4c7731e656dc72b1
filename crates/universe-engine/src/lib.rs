//! Universe engine crate.
//!
//! Retained-mode scene graph on top of a small GL-shaped device seam:
//! growable device buffers, interleaved attribute layouts, a batched
//! renderer for small primitives, and the display that drives nodes
//! through setup, update, draw and dispose.

pub mod device;
pub mod error;
pub mod input;
pub mod logging;
pub mod time;
pub mod window;

pub mod buffer;
pub mod coords;
pub mod layout;
pub mod paint;
pub mod render;
pub mod scene;
pub mod shape;

pub use error::{RenderError, Result};
