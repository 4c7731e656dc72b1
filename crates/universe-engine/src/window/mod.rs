//! Window + runtime loop.
//!
//! Owns the `winit` EventLoop and the window, and drives a `Display` on it.

mod runtime;

pub use runtime::{Runtime, RuntimeConfig};
