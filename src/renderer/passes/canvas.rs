use super::{FrameContext, RenderPass, StreamBuffer, TextureSetCache};
use crate::asset::TextureSlot;
use crate::renderer::error::RenderError;
use crate::renderer::gpu::{CommandList, GpuDevice, ProgramDesc, TextureSlotKind, VertexLayout};
use crate::renderer::uniforms::CanvasUniform;

const CANVAS_SHADER: &str = include_str!("../../shader/canvas.wgsl");

/// Screen-space quads in one upload and one draw, blended over whatever the
/// next presenting pass reads.
pub struct CanvasPass {
    vertices: StreamBuffer,
    indices: StreamBuffer,
    texture_sets: TextureSetCache,
}

impl Default for CanvasPass {
    fn default() -> Self {
        Self::new()
    }
}

impl CanvasPass {
    pub fn new() -> Self {
        Self {
            vertices: StreamBuffer::new("canvas.vertices", wgpu::BufferUsages::VERTEX),
            indices: StreamBuffer::new("canvas.indices", wgpu::BufferUsages::INDEX),
            texture_sets: TextureSetCache::default(),
        }
    }
}

impl RenderPass for CanvasPass {
    fn name(&self) -> &'static str {
        "CanvasPass"
    }

    fn execute(
        &mut self,
        ctx: &mut FrameContext<'_>,
        list: &mut CommandList,
    ) -> Result<(), RenderError> {
        if ctx.canvas.is_empty() {
            return Ok(());
        }

        let quads = ctx.canvas.len();
        let texture = ctx
            .assets
            .textures
            .resolve(TextureSlot::BaseColor, ctx.canvas.texture());
        let (vertices, indices) = ctx.canvas.drain_geometry();

        let (format, (width, height)) = {
            let frame = ctx.frame_targets()?;
            let target = if ctx.params.post_processing {
                &frame.resolve
            } else {
                &frame.final_target
            };
            let format = match target.color_format(0) {
                Some(format) => format,
                None => ctx.device.surface_format(),
            };
            (format, target.size())
        };

        let vertex_buffer = self
            .vertices
            .write(ctx.device, bytemuck::cast_slice(&vertices))?;
        let index_buffer = self
            .indices
            .write(ctx.device, bytemuck::cast_slice(&indices))?;

        let name = format!("canvas.{format:?}");
        let program = ctx.programs.get_or_create(ctx.device, &name, || {
            ProgramDesc::new("", CANVAS_SHADER)
                .with_vertex_layout(VertexLayout::Canvas)
                .with_texture_group(vec![TextureSlotKind::Color])
                .with_color_target(format, Some(wgpu::BlendState::ALPHA_BLENDING))
                .with_cull_mode(None)
        })?;
        let texture_set = self.texture_sets.get(ctx.device, program, 1, &[texture])?;

        let uniform = list.push_uniform(&CanvasUniform::for_size(width, height));
        let frame = ctx.frame_targets()?;
        let target = if ctx.params.post_processing {
            &frame.resolve
        } else {
            &frame.final_target
        };
        let mut pass = target.begin(list, "CanvasPass", None, None);
        pass.set_program(program);
        pass.bind_uniforms(uniform, uniform);
        pass.bind_textures(1, texture_set);
        pass.set_vertex_buffer(0, vertex_buffer);
        pass.set_index_buffer(index_buffer);
        pass.draw_indexed(0..indices.len() as u32, 0..1);
        drop(pass);

        ctx.stats.canvas_quads += quads;
        Ok(())
    }

    fn release(&mut self, device: &mut dyn GpuDevice) {
        self.vertices.release(device);
        self.indices.release(device);
        self.texture_sets.release(device);
    }
}
