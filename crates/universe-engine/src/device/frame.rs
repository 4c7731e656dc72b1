/// An acquired swapchain image plus the encoder recording into it.
///
/// Presentation happens when the surface texture is dropped after submit,
/// so hold it only for the length of one frame.
pub struct GpuFrame {
    pub surface_texture: wgpu::SurfaceTexture,
    pub view: wgpu::TextureView,
    pub encoder: wgpu::CommandEncoder,
}
