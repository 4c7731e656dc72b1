//! Device buffers that grow on demand.
//!
//! - `GrowableBuffer<T>`: typed vertex/index buffer with a CPU shadow,
//!   a write cursor and an exclusive mapped window
//! - `grow_capacity`: the shared growth policy

mod growable;
mod growth;

pub use growable::GrowableBuffer;
pub use growth::{
    ACCUMULATOR_GROWTH_THRESHOLD, BUFFER_GROWTH_THRESHOLD, MAX_CAPACITY, grow_capacity,
};

use crate::error::Result;
use crate::render::RenderContext;

/// A device object that can be made current through the binding cache.
pub trait Bindable {
    fn bind(&self, ctx: &mut RenderContext) -> Result<()>;
    fn unbind(&self, ctx: &mut RenderContext) -> Result<()>;
}
