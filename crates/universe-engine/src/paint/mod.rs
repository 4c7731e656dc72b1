//! Color values used for fills and clears.

mod color;

pub use color::Color;
