use std::any::Any;

use glam::Mat4;

use crate::error::Result;
use crate::input::NodeEvent;
use crate::render::{BatchRenderer, RenderContext};

use super::camera::Camera;
use super::graph::NodeId;
use super::transform::Transform;

/// Downcasting support for boxed nodes.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// What a node sees while its hooks run.
pub struct NodeCtx<'a> {
    pub id: NodeId,
    /// The node's own local transform.
    pub transform: &'a mut Transform,
    /// Ancestors' matrices times the local matrix, taken before the hook ran.
    pub world: Mat4,
    pub render: &'a mut RenderContext,
    pub batch: &'a mut BatchRenderer,
}

/// Behavior attached to a scene node.
///
/// `setup` runs exactly once, after the parent's setup. `update` and `draw`
/// run every frame while the node is attached to a started display.
pub trait Node: AsAny {
    fn setup(&mut self, ctx: &mut NodeCtx<'_>) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    fn update(&mut self, ctx: &mut NodeCtx<'_>, dt: f32) {
        let _ = (ctx, dt);
    }

    fn draw(&mut self, ctx: &mut NodeCtx<'_>) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    fn on_event(&mut self, event: &NodeEvent) {
        let _ = event;
    }

    /// Releases device resources. Only called on nodes whose setup ran.
    fn dispose(&mut self, render: &mut RenderContext) -> Result<()> {
        let _ = render;
        Ok(())
    }

    /// Cameras are kept in their own registry by the display.
    fn as_camera(&self) -> Option<&Camera> {
        None
    }
}

/// Node without behavior, used to group children under one transform.
#[derive(Debug, Default, Clone, Copy)]
pub struct Group;

impl Node for Group {}
