//! Input events as seen by scene nodes.
//!
//! Nothing here exposes winit types; the window runtime translates platform
//! events into `NodeEvent`s.

mod types;

pub use types::{Key, Modifiers, MouseButton, NodeEvent};
