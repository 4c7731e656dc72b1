//! Retained scene graph.
//!
//! Responsibilities:
//! - own nodes in a generational arena; parent/child links are handles
//! - initialize every node exactly once, parents before children
//! - drive per-frame update/draw through each camera
//! - dispatch input events pre-order from the root

mod camera;
mod display;
mod graph;
mod node;
mod transform;

pub use camera::{Camera, Projection};
pub use display::{Display, DisplayConfig};
pub use graph::NodeId;
pub use node::{AsAny, Group, Node, NodeCtx};
pub use transform::Transform;
