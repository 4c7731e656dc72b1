//! Graphics device seam and its backends.
//!
//! - `GraphicsDevice`: bind-then-operate device API used by the whole engine
//! - `BindingCache`: mirror of device bindings used to skip redundant binds
//! - `RecordingDevice`: headless backend that records every call
//! - `WgpuDevice` + `Gpu`: wgpu backend and the window surface it draws into

mod api;
mod cache;
mod error;
mod frame;
mod gpu;
mod recording;
mod surface;
mod types;
mod wgpu_device;

pub use api::GraphicsDevice;
pub use cache::{BindingCache, MAX_TEXTURE_UNITS};
pub use error::SurfaceErrorAction;
pub use frame::GpuFrame;
pub use gpu::{Gpu, GpuInit};
pub use recording::{CallLog, DeviceCall, RecordingDevice};
pub use types::{
    AttributePointer, BufferId, BufferTarget, BufferUsage, Capability, FrameStatus, Primitive,
    RenderApi, ScalarType, ShaderDesc, ShaderId, TextureAxis, TextureId, TextureKind,
    TextureOptions, TextureWrap, VertexArrayId,
};
pub use wgpu_device::WgpuDevice;
