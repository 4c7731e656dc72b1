use std::fmt;

use glam::Mat4;

use crate::error::{RenderError, Result};

use super::node::Node;
use super::transform::Transform;

/// Handle to a node in a display's arena.
///
/// Freed slots are reused with a bumped generation, so a handle to a
/// disposed node never aliases a newer one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {}v{}", self.index, self.generation)
    }
}

pub(crate) struct NodeEntry {
    pub name: String,
    pub behavior: Box<dyn Node>,
    pub transform: Transform,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub initialized: bool,
    /// Reachable from the display root.
    pub attached: bool,
    pub camera: bool,
}

impl NodeEntry {
    pub fn new(name: String, behavior: Box<dyn Node>) -> Self {
        let camera = behavior.as_camera().is_some();
        Self {
            name,
            behavior,
            transform: Transform::default(),
            parent: None,
            children: Vec::new(),
            initialized: false,
            attached: false,
            camera,
        }
    }
}

struct Slot {
    generation: u32,
    entry: Option<NodeEntry>,
}

/// Generational arena holding every node of a display.
#[derive(Default)]
pub(crate) struct SceneGraph {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl SceneGraph {
    pub fn insert(&mut self, entry: NodeEntry) -> NodeId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            return NodeId { index, generation: slot.generation };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot { generation: 0, entry: Some(entry) });
        NodeId { index, generation: 0 }
    }

    pub fn remove(&mut self, id: NodeId) -> Result<NodeEntry> {
        self.get(id)?;
        let slot = &mut self.slots[id.index as usize];
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        slot.entry
            .take()
            .ok_or_else(|| RenderError::resource(id.to_string(), "stale handle"))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_ok()
    }

    pub fn get(&self, id: NodeId) -> Result<&NodeEntry> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_ref())
            .ok_or_else(|| RenderError::resource(id.to_string(), "stale handle"))
    }

    pub fn get_mut(&mut self, id: NodeId) -> Result<&mut NodeEntry> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_mut())
            .ok_or_else(|| RenderError::resource(id.to_string(), "stale handle"))
    }

    /// True if `ancestor` is `id` or lies on its parent chain.
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> Result<bool> {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return Ok(true);
            }
            current = self.get(node)?.parent;
        }
        Ok(false)
    }

    /// Ancestors' local matrices times the node's own.
    pub fn world_matrix(&self, id: NodeId) -> Result<Mat4> {
        let mut world = Mat4::IDENTITY;
        let mut current = Some(id);
        while let Some(node) = current {
            let entry = self.get(node)?;
            world = entry.transform.local_matrix() * world;
            current = entry.parent;
        }
        Ok(world)
    }

    /// `id` and all its descendants, parents before children.
    pub fn subtree(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.get(node)?.children.iter().rev().copied());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::node::Group;
    use glam::Vec3;

    fn entry() -> NodeEntry {
        NodeEntry::new("group".into(), Box::new(Group))
    }

    #[test]
    fn reused_slot_rejects_old_handle() {
        let mut graph = SceneGraph::default();
        let a = graph.insert(entry());
        graph.remove(a).unwrap();
        let b = graph.insert(entry());

        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert!(matches!(graph.get(a), Err(RenderError::ResourceState { .. })));
        assert!(graph.remove(a).is_err());
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn world_matrix_chains_parents() {
        let mut graph = SceneGraph::default();
        let parent = graph.insert(entry());
        let child = graph.insert(entry());
        graph.get_mut(child).unwrap().parent = Some(parent);
        graph.get_mut(parent).unwrap().transform.translate(Vec3::X).scale_uniform(2.0);
        graph.get_mut(child).unwrap().transform.translate(Vec3::Y);

        let p = graph.world_matrix(child).unwrap().transform_point3(Vec3::ZERO);
        assert!(p.abs_diff_eq(Vec3::new(1.0, 2.0, 0.0), 1e-6));
    }
}
