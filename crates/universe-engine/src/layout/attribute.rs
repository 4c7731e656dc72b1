use crate::device::{AttributePointer, ScalarType};

/// One named per-vertex field inside an interleaved layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexAttribute {
    name: String,
    ty: ScalarType,
    count: u8,
    /// Byte offset inside a vertex.
    offset: u32,
    /// Location under the shader it was last resolved against.
    location: Option<u32>,
}

impl VertexAttribute {
    pub(super) fn new(name: &str, ty: ScalarType, count: u8, offset: u32) -> Self {
        Self {
            name: name.to_owned(),
            ty,
            count,
            offset,
            location: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scalar(&self) -> ScalarType {
        self.ty
    }

    pub fn count(&self) -> u8 {
        self.count
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Size in bytes.
    pub fn size(&self) -> u32 {
        self.count as u32 * self.ty.size() as u32
    }

    pub fn location(&self) -> Option<u32> {
        self.location
    }

    pub(super) fn set_location(&mut self, location: Option<u32>) {
        self.location = location;
    }

    pub(super) fn pointer(&self, stride: u32) -> AttributePointer {
        AttributePointer {
            components: self.count,
            scalar: self.ty,
            stride,
            offset: self.offset,
        }
    }
}
