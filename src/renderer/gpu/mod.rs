//! The device seam between passes and the GPU.
//!
//! Passes record [`CommandList`]s against opaque handles; a [`GpuDevice`]
//! turns them into real work. [`WgpuDevice`] drives wgpu, [`HeadlessDevice`]
//! records everything for inspection.

mod commands;
mod headless;
mod types;
mod wgpu_device;

pub use commands::{
    ColorAttachment, CommandList, DepthAttachment, GpuCommand, PassDesc, PassEncoder,
    MAX_UNIFORM_BLOCK, UNIFORM_ALIGNMENT,
};
pub use headless::{HeadlessDevice, Submission, TextureContent};
pub use types::{
    AttachmentView, BufferDesc, BufferId, ColorTargetDesc, DepthDesc, GpuError, ProgramDesc,
    ProgramId, TextureDesc, TextureId, TextureSetId, TextureSlotKind, VertexLayout,
};
pub use wgpu_device::WgpuDevice;

pub trait GpuDevice {
    fn backend_name(&self) -> &'static str;

    /// Creates a texture. Validation failures are reported here, never later.
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, GpuError>;
    fn destroy_texture(&mut self, id: TextureId);
    /// Uploads tightly packed texel rows into layer 0.
    fn write_texture(&mut self, id: TextureId, data: &[u8], bytes_per_row: u32)
        -> Result<(), GpuError>;
    fn texture_desc(&self, id: TextureId) -> Option<&TextureDesc>;

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId, GpuError>;
    fn destroy_buffer(&mut self, id: BufferId);
    /// The write is visible to the next submission.
    fn write_buffer(&mut self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), GpuError>;

    fn create_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId, GpuError>;
    /// Binds `textures` to texture group `group` (1-based) of `program`.
    fn create_texture_set(
        &mut self,
        program: ProgramId,
        group: u32,
        textures: &[TextureId],
    ) -> Result<TextureSetId, GpuError>;
    fn destroy_texture_set(&mut self, id: TextureSetId);

    /// Stable handle naming the current surface image.
    fn surface_texture(&self) -> TextureId;
    fn surface_format(&self) -> wgpu::TextureFormat;
    fn surface_size(&self) -> (u32, u32);
    fn resize_surface(&mut self, width: u32, height: u32);
    /// Acquires the next surface image.
    fn begin_frame(&mut self) -> Result<(), GpuError>;
    fn present(&mut self);

    /// Uploads the list's uniforms and executes its commands in order.
    fn submit(&mut self, list: &CommandList);
    /// Errors reported by the driver since the last call.
    fn take_errors(&mut self) -> Vec<String>;
}
