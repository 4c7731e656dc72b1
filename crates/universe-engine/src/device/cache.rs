use crate::error::{RenderError, Result};

use super::types::{BufferId, BufferTarget, ShaderId, TextureId, TextureKind, VertexArrayId};

/// Default number of texture units tracked per context.
pub const MAX_TEXTURE_UNITS: u32 = 32;

/// Mirror of what the device currently has bound.
///
/// The cache is only ever written after the device accepted the matching
/// call, so it never runs ahead of the device. It has no synchronization and
/// belongs to the single thread that owns the device.
#[derive(Debug, Clone)]
pub struct BindingCache {
    vertex_buffer: Option<BufferId>,
    index_buffer: Option<BufferId>,
    vertex_array: Option<VertexArrayId>,
    shader: Option<ShaderId>,
    active_unit: u32,
    units: Vec<[Option<TextureId>; TextureKind::COUNT]>,
}

impl BindingCache {
    pub fn new(texture_units: u32) -> Self {
        Self {
            vertex_buffer: None,
            index_buffer: None,
            vertex_array: None,
            shader: None,
            active_unit: 0,
            units: vec![[None; TextureKind::COUNT]; texture_units.max(1) as usize],
        }
    }

    // ── buffers ───────────────────────────────────────────────────────────

    #[inline]
    pub fn buffer(&self, target: BufferTarget) -> Option<BufferId> {
        match target {
            BufferTarget::Vertex => self.vertex_buffer,
            BufferTarget::Index => self.index_buffer,
        }
    }

    #[inline]
    pub fn is_buffer_bound(&self, target: BufferTarget, id: BufferId) -> bool {
        self.buffer(target) == Some(id)
    }

    pub fn set_buffer(&mut self, target: BufferTarget, id: Option<BufferId>) {
        match target {
            BufferTarget::Vertex => self.vertex_buffer = id,
            BufferTarget::Index => self.index_buffer = id,
        }
    }

    // ── vertex array & shader ─────────────────────────────────────────────

    #[inline]
    pub fn vertex_array(&self) -> Option<VertexArrayId> {
        self.vertex_array
    }

    pub fn set_vertex_array(&mut self, id: Option<VertexArrayId>) {
        self.vertex_array = id;
    }

    #[inline]
    pub fn shader(&self) -> Option<ShaderId> {
        self.shader
    }

    pub fn set_shader(&mut self, id: Option<ShaderId>) {
        self.shader = id;
    }

    // ── textures ──────────────────────────────────────────────────────────

    #[inline]
    pub fn texture_units(&self) -> u32 {
        self.units.len() as u32
    }

    #[inline]
    pub fn active_unit(&self) -> u32 {
        self.active_unit
    }

    /// Selects the unit that later texture queries and updates address.
    pub fn set_active_unit(&mut self, unit: u32) -> Result<()> {
        self.check_unit(unit)?;
        self.active_unit = unit;
        Ok(())
    }

    pub fn check_unit(&self, unit: u32) -> Result<()> {
        if unit >= self.texture_units() {
            return Err(RenderError::usage(
                format!("texture unit {unit}"),
                format!("only {} units are available", self.texture_units()),
            ));
        }
        Ok(())
    }

    /// Texture bound to `kind` on the active unit.
    #[inline]
    pub fn texture(&self, kind: TextureKind) -> Option<TextureId> {
        self.units[self.active_unit as usize][kind.index()]
    }

    pub fn set_texture(&mut self, kind: TextureKind, id: Option<TextureId>) {
        self.units[self.active_unit as usize][kind.index()] = id;
    }

    // ── deletion ──────────────────────────────────────────────────────────

    /// Clears every slot holding `id`. Devices drop bindings of deleted
    /// objects, and the cache has to follow.
    pub fn forget_buffer(&mut self, id: BufferId) {
        if self.vertex_buffer == Some(id) {
            self.vertex_buffer = None;
        }
        if self.index_buffer == Some(id) {
            self.index_buffer = None;
        }
    }

    pub fn forget_vertex_array(&mut self, id: VertexArrayId) {
        if self.vertex_array == Some(id) {
            self.vertex_array = None;
        }
    }

    pub fn forget_shader(&mut self, id: ShaderId) {
        if self.shader == Some(id) {
            self.shader = None;
        }
    }

    pub fn forget_texture(&mut self, id: TextureId) {
        for slots in &mut self.units {
            for slot in slots.iter_mut().filter(|s| **s == Some(id)) {
                *slot = None;
            }
        }
    }
}

impl Default for BindingCache {
    fn default() -> Self {
        Self::new(MAX_TEXTURE_UNITS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_slots_are_per_unit_and_kind() {
        let mut cache = BindingCache::new(4);
        let tex = TextureId::new(7);

        cache.set_texture(TextureKind::D2, Some(tex));
        cache.set_active_unit(2).unwrap();
        assert_eq!(cache.texture(TextureKind::D2), None);

        cache.set_texture(TextureKind::Cube, Some(tex));
        cache.set_active_unit(0).unwrap();
        assert_eq!(cache.texture(TextureKind::D2), Some(tex));
        assert_eq!(cache.texture(TextureKind::Cube), None);
    }

    #[test]
    fn selecting_a_unit_binds_nothing() {
        let mut cache = BindingCache::new(2);
        cache.set_active_unit(1).unwrap();
        for kind in TextureKind::ALL {
            assert_eq!(cache.texture(kind), None);
        }
    }

    #[test]
    fn unit_out_of_range_is_rejected() {
        let mut cache = BindingCache::new(2);
        let err = cache.set_active_unit(2).unwrap_err();
        assert!(matches!(err, RenderError::UsageState { .. }));
        assert_eq!(cache.active_unit(), 0);
    }

    #[test]
    fn forgetting_clears_every_slot() {
        let mut cache = BindingCache::new(3);
        let tex = TextureId::new(1);
        for unit in 0..3 {
            cache.set_active_unit(unit).unwrap();
            cache.set_texture(TextureKind::D2, Some(tex));
        }
        cache.forget_texture(tex);
        for unit in 0..3 {
            cache.set_active_unit(unit).unwrap();
            assert_eq!(cache.texture(TextureKind::D2), None);
        }

        let buf = BufferId::new(9);
        cache.set_buffer(BufferTarget::Vertex, Some(buf));
        cache.forget_buffer(buf);
        assert_eq!(cache.buffer(BufferTarget::Vertex), None);
    }
}
