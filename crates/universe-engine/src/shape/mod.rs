//! User-built geometry nodes.
//!
//! - `Shape`: vertices collected between `begin` and `end`, drawn directly
//!   or through the batched renderer
//! - `Rectangle`: batched solid quad

mod accumulator;
mod node;
mod rectangle;

pub use accumulator::{Dims, ShapeGeometry, ShapeVertexAccumulator, VertexKind};
pub use node::{Fill, Shape};
pub use rectangle::Rectangle;
