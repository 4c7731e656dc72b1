//! Interleaved vertex layouts and their mapping to shader inputs.

mod attribute;
mod resolver;

pub use attribute::VertexAttribute;
pub use resolver::{AttributeLayout, AttributeSource};

pub use crate::device::ScalarType;

pub const ATTR_POSITION: &str = "position";
pub const ATTR_NORMAL: &str = "normal";
pub const ATTR_TEXCOORD: &str = "texcoord";
pub const ATTR_COLOR: &str = "color";
