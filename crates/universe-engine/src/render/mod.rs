//! Rendering on top of the device seam.
//!
//! - `RenderContext`: owns the device, the binding cache and the built-in shaders
//! - `BatchRenderer`: accumulates small renderables into shared buffers
//! - `Texture` / `ImageData`: image upload
//!
//! Convention: geometry is in world units; each camera supplies the
//! view-projection applied at draw time.

pub mod batch;
pub(crate) mod context;
mod hint;
mod renderable;
mod shaders;
mod texture;

pub use batch::{BATCH_VERTEX_FLOATS, BatchConfig, BatchRenderer, MAX_BATCH_VERTICES};
pub use context::{BindStats, RenderContext};
pub use hint::{Hint, RenderHints};
pub use renderable::{BatchMesh, Renderable};
pub use shaders::BuiltinShaders;
pub use texture::{ImageData, Texture};
