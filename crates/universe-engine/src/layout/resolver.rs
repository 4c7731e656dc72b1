use std::collections::HashMap;

use crate::buffer::{Bindable, GrowableBuffer};
use crate::device::{ScalarType, ShaderId};
use crate::error::{RenderError, Result};
use crate::render::RenderContext;

use super::attribute::VertexAttribute;

/// Interleaved vertex layout plus a per-shader location cache.
///
/// Attributes are laid out in registration order; each one starts at the
/// running stride at the time it was registered.
#[derive(Debug, Default)]
pub struct AttributeLayout {
    attributes: Vec<VertexAttribute>,
    stride: u32,
    locations: HashMap<(ShaderId, String), Option<u32>>,
    enabled: Vec<u32>,
}

impl AttributeLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `name` at the end of the layout, or returns the existing
    /// registration if it has the same type and count.
    pub fn register(&mut self, name: &str, ty: ScalarType, count: u8) -> Result<&VertexAttribute> {
        if let Some(index) = self.index_of(name) {
            let existing = &self.attributes[index];
            if existing.scalar() != ty || existing.count() != count {
                return Err(RenderError::mismatch(
                    format!("attribute `{name}`"),
                    format!(
                        "registered as {:?}x{} but redefined as {ty:?}x{count}",
                        existing.scalar(),
                        existing.count()
                    ),
                ));
            }
            return Ok(existing);
        }

        let attribute = VertexAttribute::new(name, ty, count, self.stride);
        self.stride += attribute.size();
        self.attributes.push(attribute);
        Ok(&self.attributes[self.attributes.len() - 1])
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name() == name)
    }

    pub fn get(&self, name: &str) -> Option<&VertexAttribute> {
        self.index_of(name).map(|i| &self.attributes[i])
    }

    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    /// Bytes per vertex.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Floats per vertex, for layouts made only of `Float` attributes.
    pub fn float_stride(&self) -> usize {
        self.stride as usize / ScalarType::Float.size()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Location of `name` under `shader`, asked of the device only once.
    pub fn resolve(
        &mut self,
        ctx: &RenderContext,
        shader: ShaderId,
        name: &str,
    ) -> Result<Option<u32>> {
        let key = (shader, name.to_owned());
        let location = match self.locations.get(&key) {
            Some(&cached) => cached,
            None => {
                let found = ctx.attribute_location(shader, name)?;
                self.locations.insert(key, found);
                found
            }
        };
        if let Some(index) = self.index_of(name) {
            self.attributes[index].set_location(location);
        }
        Ok(location)
    }

    /// Enables every attribute the shader consumes. The vertex buffer must
    /// already be bound.
    pub fn bind_all(&mut self, ctx: &mut RenderContext, shader: ShaderId) -> Result<()> {
        self.enabled.clear();
        for index in 0..self.attributes.len() {
            let name = self.attributes[index].name().to_owned();
            let Some(location) = self.resolve(ctx, shader, &name)? else {
                continue;
            };
            ctx.enable_attribute(location, self.attributes[index].pointer(self.stride))?;
            self.enabled.push(location);
        }
        Ok(())
    }

    /// Disables what the last `bind_all` enabled.
    pub fn unbind_all(&mut self, ctx: &mut RenderContext) -> Result<()> {
        for location in self.enabled.drain(..) {
            ctx.disable_attribute(location)?;
        }
        Ok(())
    }
}

/// Something that feeds vertex attributes from its own buffer.
pub trait AttributeSource {
    /// The vertex buffer (once uploaded) and the layout describing it.
    fn parts_mut(&mut self) -> (Option<&mut GrowableBuffer<f32>>, &mut AttributeLayout);

    /// Binds the vertex buffer and enables the layout under `shader`.
    fn bind_attributes(&mut self, ctx: &mut RenderContext, shader: ShaderId) -> Result<()> {
        let (buffer, layout) = self.parts_mut();
        let buffer = buffer.ok_or_else(|| {
            RenderError::usage("attribute source", "no vertex buffer uploaded")
        })?;
        buffer.bind(ctx)?;
        layout.bind_all(ctx, shader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{AttributePointer, BufferTarget, BufferUsage, DeviceCall};
    use crate::layout::{ATTR_COLOR, ATTR_NORMAL, ATTR_POSITION, ATTR_TEXCOORD};
    use crate::render::context::tests::recording_context;

    // ── registration ──────────────────────────────────────────────────────

    #[test]
    fn offsets_follow_registration_order() {
        let mut layout = AttributeLayout::new();
        layout.register(ATTR_POSITION, ScalarType::Float, 3).unwrap();
        layout.register(ATTR_NORMAL, ScalarType::Float, 3).unwrap();
        let color = layout.register(ATTR_COLOR, ScalarType::UnsignedByte, 4).unwrap();

        assert_eq!(color.offset(), 24);
        assert_eq!(layout.stride(), 28);
    }

    #[test]
    fn repeated_registration_returns_existing() {
        let mut layout = AttributeLayout::new();
        layout.register(ATTR_POSITION, ScalarType::Float, 3).unwrap();
        layout.register(ATTR_TEXCOORD, ScalarType::Float, 2).unwrap();
        let again = layout.register(ATTR_POSITION, ScalarType::Float, 3).unwrap();

        assert_eq!(again.offset(), 0);
        assert_eq!(layout.attributes().len(), 2);
        assert_eq!(layout.stride(), 20);
    }

    #[test]
    fn conflicting_count_is_a_mismatch() {
        let mut layout = AttributeLayout::new();
        layout.register(ATTR_POSITION, ScalarType::Float, 3).unwrap();
        let err = layout.register(ATTR_POSITION, ScalarType::Float, 2).unwrap_err();
        assert!(matches!(err, RenderError::ConfigurationMismatch { .. }));
        assert_eq!(layout.stride(), 12);
    }

    #[test]
    fn conflicting_type_is_a_mismatch() {
        let mut layout = AttributeLayout::new();
        layout.register(ATTR_COLOR, ScalarType::Float, 4).unwrap();
        assert!(layout.register(ATTR_COLOR, ScalarType::UnsignedByte, 4).is_err());
    }

    // ── resolution ────────────────────────────────────────────────────────

    #[test]
    fn locations_are_cached_per_shader() {
        let (mut ctx, _log) = recording_context();
        let shaders = *ctx.shaders();
        let mut layout = AttributeLayout::new();
        layout.register(ATTR_POSITION, ScalarType::Float, 3).unwrap();
        layout.register(ATTR_COLOR, ScalarType::Float, 4).unwrap();

        assert_eq!(layout.resolve(&ctx, shaders.color, ATTR_COLOR).unwrap(), Some(1));
        assert_eq!(layout.resolve(&ctx, shaders.texture, ATTR_COLOR).unwrap(), None);
        assert_eq!(layout.get(ATTR_COLOR).unwrap().location(), None);

        // Deleting the shader would fail a fresh lookup; the cache answers.
        ctx.delete_shader(shaders.color).unwrap();
        assert_eq!(layout.resolve(&ctx, shaders.color, ATTR_COLOR).unwrap(), Some(1));
    }

    #[test]
    fn bind_all_enables_consumed_attributes() {
        let (mut ctx, log) = recording_context();
        let shader = ctx.shaders().color;
        let mut layout = AttributeLayout::new();
        layout.register(ATTR_POSITION, ScalarType::Float, 3).unwrap();
        layout.register(ATTR_NORMAL, ScalarType::Float, 3).unwrap();
        layout.register(ATTR_COLOR, ScalarType::Float, 4).unwrap();

        let mut vbo =
            GrowableBuffer::<f32>::new(&mut ctx, BufferTarget::Vertex, BufferUsage::Static, 10)
                .unwrap();
        vbo.bind(&mut ctx).unwrap();
        log.clear();

        layout.bind_all(&mut ctx, shader).unwrap();
        assert_eq!(
            log.calls(),
            vec![
                DeviceCall::EnableAttribute {
                    location: 0,
                    pointer: AttributePointer {
                        components: 3,
                        scalar: ScalarType::Float,
                        stride: 40,
                        offset: 0,
                    },
                },
                DeviceCall::EnableAttribute {
                    location: 1,
                    pointer: AttributePointer {
                        components: 4,
                        scalar: ScalarType::Float,
                        stride: 40,
                        offset: 24,
                    },
                },
            ]
        );

        log.clear();
        layout.unbind_all(&mut ctx).unwrap();
        assert_eq!(log.calls(), vec![DeviceCall::DisableAttribute(0), DeviceCall::DisableAttribute(1)]);
        vbo.dispose(&mut ctx).unwrap();
    }
}
