use super::{
    bucket_material, draw_uniform, lit_shader, material_textures, mesh_draw, mesh_program_key,
    FrameContext, RenderPass, StreamBuffer, TargetBoundSet, TextureSetCache,
};
use crate::asset::{Material, Mesh, MeshKind, TextureSlot};
use crate::renderer::error::RenderError;
use crate::renderer::gpu::{
    CommandList, GpuDevice, PassEncoder, ProgramDesc, ProgramId, TextureSlotKind, VertexLayout,
};
use crate::renderer::uniforms::DrawUniform;

const FORWARD_SHADER: &str = lit_shader!("../../shader/forward.wgsl");
const LINES_SHADER: &str = lit_shader!("../../shader/lines.wgsl");
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Group 1 of every lit program: directional map, point-light layers.
pub(crate) fn shadow_group() -> Vec<TextureSlotKind> {
    vec![TextureSlotKind::Depth, TextureSlotKind::DepthArray]
}

pub(crate) fn material_group() -> Vec<TextureSlotKind> {
    vec![TextureSlotKind::Color; TextureSlot::COUNT]
}

/// Sky program shared by the forward and lighting passes. Drawn around the
/// camera at the far plane without writing depth.
pub(crate) fn sky_program(
    ctx: &mut FrameContext<'_>,
    format: wgpu::TextureFormat,
    samples: u32,
) -> Result<ProgramId, RenderError> {
    let name = format!("sky.{format:?}.{samples}");
    ctx.programs.get_or_create(ctx.device, &name, || {
        ProgramDesc::new("", FORWARD_SHADER)
            .with_entries("vs_sky", "fs_sky")
            .with_vertex_layout(VertexLayout::MeshInstanced)
            .with_color_target(format, None)
            .with_depth(DEPTH_FORMAT, false, wgpu::CompareFunction::LessEqual)
            .with_multisample(samples)
    })
}

/// World-space debug lines, depth tested against the scene.
pub(crate) struct LineRenderer {
    vertices: StreamBuffer,
}

impl LineRenderer {
    pub fn new() -> Self {
        Self {
            vertices: StreamBuffer::new("lines.vertices", wgpu::BufferUsages::VERTEX),
        }
    }

    /// Draws and drains the queued lines.
    pub fn draw(
        &mut self,
        ctx: &mut FrameContext<'_>,
        pass: &mut PassEncoder<'_>,
        format: wgpu::TextureFormat,
        samples: u32,
        frame_offset: u32,
    ) -> Result<(), RenderError> {
        if ctx.lines.is_empty() {
            return Ok(());
        }
        let segments = ctx.lines.len();
        let vertices = ctx.lines.drain_vertices();
        let buffer = self
            .vertices
            .write(ctx.device, bytemuck::cast_slice(&vertices))?;
        let name = format!("lines.{format:?}.{samples}");
        let program = ctx.programs.get_or_create(ctx.device, &name, || {
            ProgramDesc::new("", LINES_SHADER)
                .with_vertex_layout(VertexLayout::Line)
                .with_topology(wgpu::PrimitiveTopology::LineList)
                .with_cull_mode(None)
                .with_color_target(format, Some(wgpu::BlendState::ALPHA_BLENDING))
                .with_depth(DEPTH_FORMAT, false, wgpu::CompareFunction::LessEqual)
                .with_multisample(samples)
        })?;

        pass.set_program(program);
        pass.bind_uniforms(frame_offset, frame_offset);
        pass.set_vertex_buffer(0, buffer);
        pass.draw(0..vertices.len() as u32, 0..1);
        ctx.stats.debug_lines += segments;
        Ok(())
    }

    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        self.vertices.release(device);
    }
}

/// Lit single-pass shading of the batch into the scene target.
pub struct ForwardOpaquePass {
    shadow_sets: TargetBoundSet,
    material_sets: TextureSetCache,
    lines: LineRenderer,
}

impl Default for ForwardOpaquePass {
    fn default() -> Self {
        Self::new()
    }
}

impl ForwardOpaquePass {
    pub fn new() -> Self {
        Self {
            shadow_sets: TargetBoundSet::default(),
            material_sets: TextureSetCache::default(),
            lines: LineRenderer::new(),
        }
    }

    fn lit_program(
        ctx: &mut FrameContext<'_>,
        mesh: &Mesh,
        material: &Material,
        format: wgpu::TextureFormat,
        samples: u32,
    ) -> Result<ProgramId, RenderError> {
        let fragment = match mesh.kind {
            MeshKind::Terrain => "fs_terrain",
            MeshKind::Standard | MeshKind::Sky => "fs_standard",
        };
        let name = format!(
            "{}.{format:?}.{samples}",
            mesh_program_key("forward", mesh, material)
        );
        let topology = material.topology.unwrap_or(mesh.topology);
        ctx.programs.get_or_create(ctx.device, &name, || {
            ProgramDesc::new("", FORWARD_SHADER)
                .with_entries("vs_main", fragment)
                .with_vertex_layout(VertexLayout::MeshInstanced)
                .with_texture_group(shadow_group())
                .with_texture_group(material_group())
                .with_color_target(format, None)
                .with_depth(DEPTH_FORMAT, true, wgpu::CompareFunction::Less)
                .with_multisample(samples)
                .with_cull_mode(material.cull_mode())
                .with_polygon_mode(material.polygon_mode())
                .with_topology(topology)
        })
    }
}

impl RenderPass for ForwardOpaquePass {
    fn name(&self) -> &'static str {
        "ForwardOpaquePass"
    }

    fn execute(
        &mut self,
        ctx: &mut FrameContext<'_>,
        list: &mut CommandList,
    ) -> Result<(), RenderError> {
        let frame_offset = list.push_uniform(ctx.frame_uniform);

        let (scene_format, samples, shadow_textures) = {
            let frame = ctx.frame_targets()?;
            let shadows = ctx.shadow_targets()?;
            let format = frame
                .scene
                .color_format(0)
                .ok_or(RenderError::TargetsMissing)?;
            let directional = shadows.directional.depth().ok_or(RenderError::TargetsMissing)?;
            let points = shadows.points.depth().ok_or(RenderError::TargetsMissing)?;
            (format, frame.scene.sample_count(), [directional, points])
        };
        let generation = ctx.targets.generation();

        // Resolve programs and texture sets before the pass opens.
        let (assets, batch) = (ctx.assets, ctx.batch);
        let mut draws = Vec::with_capacity(batch.len());
        let mut sky = Vec::new();
        for bucket in batch.buckets() {
            let (mesh, draw) = mesh_draw(assets, bucket)?;
            let material = bucket_material(assets, bucket, mesh);
            let (textures, mask) = material_textures(assets, material);
            let uniform = draw_uniform(material, mesh.kind, mask);
            if mesh.kind == MeshKind::Sky {
                sky.push((draw, uniform));
                continue;
            }
            let program = Self::lit_program(ctx, mesh, material, scene_format, samples)?;
            let shadow_set =
                self.shadow_sets
                    .get(ctx.device, generation, program, 1, &shadow_textures)?;
            let material_set = self.material_sets.get(ctx.device, program, 2, &textures)?;
            draws.push((program, shadow_set, material_set, draw, uniform));
        }
        let sky_program = if sky.is_empty() {
            None
        } else {
            Some(sky_program(ctx, scene_format, samples)?)
        };

        let frame = ctx.frame_targets()?;
        let mut pass = frame.scene.begin(
            list,
            "ForwardOpaquePass",
            Some(ctx.params.clear_color),
            Some(1.0),
        );

        for (program, shadow_set, material_set, draw, uniform) in &draws {
            let draw_offset = pass.push_uniform(uniform);
            pass.set_program(*program);
            pass.bind_uniforms(frame_offset, draw_offset);
            pass.bind_textures(1, *shadow_set);
            pass.bind_textures(2, *material_set);
            draw.record(&mut pass);
            ctx.stats.instances += draw.instance_count as usize;
        }

        if let Some(program) = sky_program {
            for (draw, uniform) in &sky {
                let draw_offset = pass.push_uniform::<DrawUniform>(uniform);
                pass.set_program(program);
                pass.bind_uniforms(frame_offset, draw_offset);
                draw.record(&mut pass);
                ctx.stats.instances += draw.instance_count as usize;
            }
        }

        self.lines
            .draw(ctx, &mut pass, scene_format, samples, frame_offset)
    }

    fn targets_changed(&mut self, device: &mut dyn GpuDevice, generation: u64) {
        self.shadow_sets.drop_stale(device, generation);
    }

    fn release(&mut self, device: &mut dyn GpuDevice) {
        self.shadow_sets.release(device);
        self.material_sets.release(device);
        self.lines.release(device);
    }
}
