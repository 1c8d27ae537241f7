use std::ops::{Deref, DerefMut, Range};

use bytemuck::Pod;

use super::types::{AttachmentView, BufferId, ProgramId, TextureId, TextureSetId};

/// Dynamic uniform offsets must be aligned to this many bytes.
pub const UNIFORM_ALIGNMENT: usize = 256;

/// Size of the window bound for every uniform block. Blocks larger than this
/// cannot be pushed.
pub const MAX_UNIFORM_BLOCK: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAttachment {
    pub view: AttachmentView,
    pub resolve: Option<AttachmentView>,
    /// `None` loads the existing contents.
    pub clear: Option<wgpu::Color>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthAttachment {
    pub view: AttachmentView,
    pub clear: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PassDesc {
    pub label: String,
    pub color: Vec<ColorAttachment>,
    pub depth: Option<DepthAttachment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    BeginPass(PassDesc),
    SetProgram(ProgramId),
    BindUniforms { frame: u32, draw: u32 },
    BindTextures { group: u32, set: TextureSetId },
    SetVertexBuffer { slot: u32, buffer: BufferId },
    SetIndexBuffer(BufferId),
    Draw { vertices: Range<u32>, instances: Range<u32> },
    DrawIndexed { indices: Range<u32>, instances: Range<u32> },
    EndPass,
    /// Copy `src` into `dst`, resolving multisampled sources and converting
    /// formats where needed.
    Blit { src: TextureId, dst: TextureId },
}

/// Commands recorded by one pass, plus the uniform data they reference.
#[derive(Debug, Clone)]
pub struct CommandList {
    label: &'static str,
    uniforms: Vec<u8>,
    commands: Vec<GpuCommand>,
}

impl CommandList {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            uniforms: Vec::new(),
            commands: Vec::new(),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    pub fn uniform_bytes(&self) -> &[u8] {
        &self.uniforms
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Appends a uniform block to the arena and returns its offset.
    pub fn push_uniform<T: Pod>(&mut self, value: &T) -> u32 {
        let bytes = bytemuck::bytes_of(value);
        debug_assert!(
            bytes.len() <= MAX_UNIFORM_BLOCK,
            "uniform block of {} bytes exceeds the bound window",
            bytes.len()
        );
        let offset = self.uniforms.len().next_multiple_of(UNIFORM_ALIGNMENT);
        self.uniforms.resize(offset, 0);
        self.uniforms.extend_from_slice(bytes);
        offset as u32
    }

    /// Opens a render pass. The pass is closed when the encoder is dropped.
    pub fn begin_pass(&mut self, desc: PassDesc) -> PassEncoder<'_> {
        self.commands.push(GpuCommand::BeginPass(desc));
        PassEncoder { list: self }
    }

    pub fn blit(&mut self, src: TextureId, dst: TextureId) {
        self.commands.push(GpuCommand::Blit { src, dst });
    }

    pub fn draw_calls(&self) -> usize {
        self.commands
            .iter()
            .filter(|cmd| matches!(cmd, GpuCommand::Draw { .. } | GpuCommand::DrawIndexed { .. }))
            .count()
    }
}

/// Records commands inside an open render pass.
pub struct PassEncoder<'a> {
    list: &'a mut CommandList,
}

impl PassEncoder<'_> {
    pub fn set_program(&mut self, program: ProgramId) {
        self.list.commands.push(GpuCommand::SetProgram(program));
    }

    pub fn bind_uniforms(&mut self, frame: u32, draw: u32) {
        self.list
            .commands
            .push(GpuCommand::BindUniforms { frame, draw });
    }

    pub fn bind_textures(&mut self, group: u32, set: TextureSetId) {
        self.list
            .commands
            .push(GpuCommand::BindTextures { group, set });
    }

    pub fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferId) {
        self.list
            .commands
            .push(GpuCommand::SetVertexBuffer { slot, buffer });
    }

    pub fn set_index_buffer(&mut self, buffer: BufferId) {
        self.list.commands.push(GpuCommand::SetIndexBuffer(buffer));
    }

    pub fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.list
            .commands
            .push(GpuCommand::Draw { vertices, instances });
    }

    pub fn draw_indexed(&mut self, indices: Range<u32>, instances: Range<u32>) {
        self.list
            .commands
            .push(GpuCommand::DrawIndexed { indices, instances });
    }
}

impl Deref for PassEncoder<'_> {
    type Target = CommandList;

    fn deref(&self) -> &CommandList {
        self.list
    }
}

impl DerefMut for PassEncoder<'_> {
    fn deref_mut(&mut self) -> &mut CommandList {
        self.list
    }
}

impl Drop for PassEncoder<'_> {
    fn drop(&mut self) {
        self.list.commands.push(GpuCommand::EndPass);
    }
}
