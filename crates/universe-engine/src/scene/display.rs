use std::collections::HashSet;

use crate::device::{FrameStatus, GraphicsDevice, RenderApi};
use crate::error::{RenderError, Result};
use crate::input::NodeEvent;
use crate::paint::Color;
use crate::render::{BatchConfig, BatchRenderer, RenderContext};

use super::camera::Camera;
use super::graph::{NodeEntry, NodeId, SceneGraph};
use super::node::{Group, Node, NodeCtx};
use super::transform::Transform;

#[derive(Debug, Clone, Copy)]
pub struct DisplayConfig {
    pub clear_color: Color,
    /// Surface size in physical pixels.
    pub width: u32,
    pub height: u32,
    pub texture_units: u32,
    pub batch: BatchConfig,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            clear_color: Color::BLACK,
            width: 1280,
            height: 720,
            texture_units: crate::device::MAX_TEXTURE_UNITS,
            batch: BatchConfig::default(),
        }
    }
}

/// Device-side state, present between `start` and `shutdown`.
struct Active {
    render: RenderContext,
    batch: BatchRenderer,
}

/// Owns the scene tree and drives per-frame traversal.
///
/// The display is the root of its own tree. Every attached node is kept in
/// a flat registry (cameras in a separate one) that `update` and `draw`
/// walk without recursion.
pub struct Display {
    config: DisplayConfig,
    graph: SceneGraph,
    root: NodeId,
    nodes: HashSet<NodeId>,
    cameras: HashSet<NodeId>,
    api: RenderApi,
    active: Option<Active>,
    started: bool,
}

/// Runs `f` on the node's behavior with a fresh `NodeCtx`.
fn with_node<R>(
    graph: &mut SceneGraph,
    active: &mut Active,
    id: NodeId,
    f: impl FnOnce(&mut dyn Node, &mut NodeCtx<'_>) -> R,
) -> Result<R> {
    let world = graph.world_matrix(id)?;
    let NodeEntry { behavior, transform, .. } = graph.get_mut(id)?;
    let mut ctx = NodeCtx {
        id,
        transform,
        world,
        render: &mut active.render,
        batch: &mut active.batch,
    };
    Ok(f(behavior.as_mut(), &mut ctx))
}

/// Registry iteration order is unspecified; sorting keeps frames repeatable.
fn sorted(set: &HashSet<NodeId>) -> Vec<NodeId> {
    let mut ids: Vec<_> = set.iter().copied().collect();
    ids.sort_unstable();
    ids
}

impl Display {
    pub fn new(config: DisplayConfig) -> Self {
        let mut graph = SceneGraph::default();
        let mut root = NodeEntry::new("Display".into(), Box::new(Group));
        root.attached = true;
        let root = graph.insert(root);

        Self {
            config,
            graph,
            root,
            nodes: HashSet::new(),
            cameras: HashSet::new(),
            api: RenderApi::default(),
            active: None,
            started: false,
        }
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[inline]
    pub fn config(&self) -> &DisplayConfig {
        &self.config
    }

    /// Colour every frame is cleared to.
    pub fn background(&self) -> Color {
        self.config.clear_color
    }

    /// Takes effect from the next `draw`.
    pub fn set_background(&mut self, color: Color) {
        self.config.clear_color = color;
    }

    #[inline]
    pub fn renderer(&self) -> RenderApi {
        self.api
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.config.height == 0 {
            1.0
        } else {
            self.config.width as f32 / self.config.height as f32
        }
    }

    /// The render context, once the display has started.
    pub fn render_context(&self) -> Option<&RenderContext> {
        self.active.as_ref().map(|a| &a.render)
    }

    pub fn render_context_mut(&mut self) -> Option<&mut RenderContext> {
        self.active.as_mut().map(|a| &mut a.render)
    }

    /// Selects the backend. Only possible before `start`.
    pub fn set_renderer(&mut self, api: RenderApi) -> Result<()> {
        if self.started {
            return Err(RenderError::usage(
                "display",
                "the renderer cannot change after start",
            ));
        }
        self.api = api;
        Ok(())
    }

    // ── tree ──────────────────────────────────────────────────────────────

    /// Creates a detached node named after its type.
    pub fn create_node<N: Node>(&mut self, node: N) -> NodeId {
        let name = std::any::type_name::<N>();
        let short = name.rsplit("::").next().unwrap_or(name);
        self.create_named(short, node)
    }

    pub fn create_named<N: Node>(&mut self, name: &str, node: N) -> NodeId {
        self.graph.insert(NodeEntry::new(name.to_owned(), Box::new(node)))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.graph.contains(id)
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.len() <= 1
    }

    pub fn name(&self, id: NodeId) -> Result<&str> {
        Ok(&self.graph.get(id)?.name)
    }

    pub fn set_name(&mut self, id: NodeId, name: &str) -> Result<()> {
        self.graph.get_mut(id)?.name = name.to_owned();
        Ok(())
    }

    pub fn children(&self, id: NodeId) -> Result<&[NodeId]> {
        Ok(&self.graph.get(id)?.children)
    }

    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.graph.get(id)?.parent)
    }

    pub fn is_initialized(&self, id: NodeId) -> Result<bool> {
        Ok(self.graph.get(id)?.initialized)
    }

    /// Reachable from the root, and so registered with this display.
    pub fn is_attached(&self, id: NodeId) -> Result<bool> {
        Ok(self.graph.get(id)?.attached)
    }

    pub fn transform(&self, id: NodeId) -> Result<&Transform> {
        Ok(&self.graph.get(id)?.transform)
    }

    pub fn transform_mut(&mut self, id: NodeId) -> Result<&mut Transform> {
        Ok(&mut self.graph.get_mut(id)?.transform)
    }

    pub fn world_matrix(&self, id: NodeId) -> Result<glam::Mat4> {
        self.graph.world_matrix(id)
    }

    pub fn behavior<N: Node>(&self, id: NodeId) -> Result<&N> {
        let entry = self.graph.get(id)?;
        entry.behavior.as_ref().as_any().downcast_ref::<N>().ok_or_else(|| {
            RenderError::mismatch(
                format!("{id} ({})", entry.name),
                format!("is not a {}", std::any::type_name::<N>()),
            )
        })
    }

    pub fn behavior_mut<N: Node>(&mut self, id: NodeId) -> Result<&mut N> {
        let entry = self.graph.get_mut(id)?;
        let label = format!("{id} ({})", entry.name);
        entry.behavior.as_mut().as_any_mut().downcast_mut::<N>().ok_or_else(|| {
            RenderError::mismatch(label, format!("is not a {}", std::any::type_name::<N>()))
        })
    }

    /// Attaches `child` under `parent` and initializes it if it can be.
    ///
    /// A subtree built while detached is registered as a whole once its
    /// root is attached. Any node whose setup fails is detached from its
    /// parent again and the first such error is returned.
    pub fn add(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.graph.get(parent)?;
        let entry = self.graph.get(child)?;
        if child == self.root {
            return Err(RenderError::usage(child.to_string(), "the display root has no parent"));
        }
        if let Some(existing) = entry.parent {
            return Err(RenderError::usage(
                child.to_string(),
                format!("already a child of {existing}"),
            ));
        }
        if self.graph.is_ancestor(child, parent)? {
            return Err(RenderError::usage(
                child.to_string(),
                format!("adding it under {parent} would create a cycle"),
            ));
        }

        self.graph.get_mut(child)?.parent = Some(parent);
        self.graph.get_mut(parent)?.children.push(child);

        if self.graph.get(parent)?.attached {
            self.register_subtree(child)?;
        }
        self.try_initialize(child)
    }

    /// Detaches `child` from `parent` and unregisters its subtree.
    ///
    /// Nodes keep their initialized state and are never set up again.
    pub fn remove(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if self.graph.get(child)?.parent != Some(parent) {
            return Err(RenderError::usage(
                child.to_string(),
                format!("is not a child of {parent}"),
            ));
        }
        self.graph.get_mut(parent)?.children.retain(|&c| c != child);
        self.graph.get_mut(child)?.parent = None;
        self.unregister_subtree(child)
    }

    fn register_subtree(&mut self, id: NodeId) -> Result<()> {
        for node in self.graph.subtree(id)? {
            let entry = self.graph.get_mut(node)?;
            entry.attached = true;
            if entry.camera {
                self.cameras.insert(node);
            } else {
                self.nodes.insert(node);
            }
        }
        Ok(())
    }

    fn unregister_subtree(&mut self, id: NodeId) -> Result<()> {
        for node in self.graph.subtree(id)? {
            self.graph.get_mut(node)?.attached = false;
            self.nodes.remove(&node);
            self.cameras.remove(&node);
        }
        Ok(())
    }

    /// Runs setup on `id` if its parent is initialized (or it is the root),
    /// then retries its children.
    fn try_initialize(&mut self, id: NodeId) -> Result<()> {
        let entry = self.graph.get(id)?;
        if entry.initialized {
            return Ok(());
        }
        let ready = match entry.parent {
            None => id == self.root,
            Some(parent) => self.graph.get(parent)?.initialized,
        };
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };
        if !ready {
            return Ok(());
        }

        log::trace!("setup {id} ({})", entry.name);
        if let Err(err) = with_node(&mut self.graph, active, id, |node, ctx| node.setup(ctx))? {
            // Detached so a later `add` can retry it.
            log::warn!("setup of {id} failed, detaching it: {err}");
            if let Some(parent) = self.graph.get(id)?.parent {
                self.remove(parent, id)?;
            }
            return Err(err);
        }
        self.graph.get_mut(id)?.initialized = true;

        // A failing child does not stop its siblings.
        let mut first = None;
        let children = self.graph.get(id)?.children.clone();
        for child in children {
            if let Err(err) = self.try_initialize(child) {
                first.get_or_insert(err);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Detaches and destroys `id` and its whole subtree, children first.
    pub fn dispose_node(&mut self, id: NodeId) -> Result<()> {
        if id == self.root {
            return Err(RenderError::usage("display", "the root is disposed by shutdown"));
        }
        if let Some(parent) = self.graph.get(id)?.parent {
            self.remove(parent, id)?;
        }

        let order = self.graph.subtree(id)?;
        for node in order.into_iter().rev() {
            let mut entry = self.graph.remove(node)?;
            self.nodes.remove(&node);
            self.cameras.remove(&node);
            if entry.initialized {
                let active = self.active.as_mut().ok_or_else(|| {
                    RenderError::resource("display", "disposing an initialized node after shutdown")
                })?;
                entry.behavior.dispose(&mut active.render)?;
            }
        }
        Ok(())
    }

    // ── lifecycle ─────────────────────────────────────────────────────────

    /// Takes ownership of the device and initializes the attached tree.
    pub fn start(&mut self, device: Box<dyn GraphicsDevice>) -> Result<()> {
        if self.started {
            return Err(RenderError::usage("display", "already started"));
        }
        let mut render = RenderContext::new(
            device,
            self.config.texture_units,
            self.config.width,
            self.config.height,
        )?;
        let batch = BatchRenderer::new(&mut render, self.config.batch)?;
        self.active = Some(Active { render, batch });
        self.started = true;

        log::info!(
            "display started: {}x{}, {} nodes, {} cameras",
            self.config.width,
            self.config.height,
            self.nodes.len(),
            self.cameras.len()
        );
        self.try_initialize(self.root)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.config.width = width;
        self.config.height = height;
        if let Some(active) = self.active.as_mut() {
            active.render.resize(width, height);
        }
    }

    fn active(&mut self) -> Result<&mut Active> {
        self.active
            .as_mut()
            .ok_or_else(|| RenderError::resource("display", "not started"))
    }

    /// Updates the display itself, then every registered non-camera node.
    pub fn update(&mut self, dt: f32) -> Result<()> {
        self.active()?;
        let mut order = vec![self.root];
        order.extend(sorted(&self.nodes));

        let Self { graph, active, .. } = self;
        let Some(active) = active.as_mut() else {
            return Ok(());
        };
        for id in order {
            if !graph.get(id)?.initialized {
                continue;
            }
            with_node(graph, active, id, |node, ctx| node.update(ctx, dt))?;
        }
        Ok(())
    }

    /// Clears once, then renders the tree through every camera.
    pub fn draw(&mut self) -> Result<()> {
        let clear = self.config.clear_color;
        if self.active()?.render.begin_frame()? == FrameStatus::Skipped {
            log::trace!("frame skipped");
            return Ok(());
        }

        let result = self.draw_passes(clear);
        let active = self.active()?;
        if result.is_err() {
            active.batch.abandon();
        }
        let ended = active.render.end_frame();
        result.and(ended)
    }

    fn draw_passes(&mut self, clear: Color) -> Result<()> {
        let mut passes = Vec::with_capacity(self.cameras.len().max(1));
        for id in sorted(&self.cameras) {
            let entry = self.graph.get(id)?;
            if !entry.initialized {
                continue;
            }
            if let Some(camera) = entry.behavior.as_camera() {
                passes.push((*camera, self.graph.world_matrix(id)?));
            }
        }
        if passes.is_empty() {
            passes.push((Camera::DEFAULT, glam::Mat4::IDENTITY));
        }

        let mut order = vec![self.root];
        order.extend(sorted(&self.nodes));

        let Self { graph, active, .. } = self;
        let Some(active) = active.as_mut() else {
            return Ok(());
        };
        active.render.clear(clear)?;

        for (camera, world) in passes {
            let viewport = active.render.set_viewport(camera.viewport)?;
            if viewport.is_empty() {
                continue;
            }
            active
                .render
                .set_view_projection(camera.view_projection(world, viewport.aspect()));

            active.batch.begin()?;
            for &id in &order {
                if !graph.get(id)?.initialized {
                    continue;
                }
                with_node(graph, active, id, |node, ctx| node.draw(ctx))??;
            }
            active.batch.end(&mut active.render)?;
        }
        Ok(())
    }

    /// Delivers `event` to every attached node, parents before children.
    pub fn dispatch(&mut self, event: &NodeEvent) -> Result<()> {
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let entry = self.graph.get_mut(id)?;
            entry.behavior.on_event(event);
            stack.extend(entry.children.iter().rev().copied());
        }
        Ok(())
    }

    /// Disposes the whole tree and releases the device.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.active.is_none() {
            return Ok(());
        }
        let children = self.graph.get(self.root)?.children.clone();
        for child in children {
            self.dispose_node(child)?;
        }

        let root = self.root;
        let Self { graph, active, .. } = self;
        if let Some(mut active) = active.take() {
            let entry = graph.get_mut(root)?;
            if entry.initialized {
                entry.behavior.dispose(&mut active.render)?;
            }
            active.batch.dispose(&mut active.render)?;
            active.render.dispose()?;
        }
        log::info!("display shut down");
        Ok(())
    }
}

impl Default for Display {
    fn default() -> Self {
        Self::new(DisplayConfig::default())
    }
}
