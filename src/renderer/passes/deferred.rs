use super::forward::{material_group, shadow_group, sky_program, LineRenderer};
use super::{
    bucket_material, draw_uniform, lit_shader, material_textures, mesh_draw, mesh_program_key,
    FrameContext, RenderPass, TargetBoundSet, TextureSetCache,
};
use crate::asset::{Material, Mesh, MeshKind};
use crate::renderer::error::RenderError;
use crate::renderer::gpu::{
    ColorAttachment, CommandList, DepthAttachment, GpuDevice, PassDesc, ProgramDesc, ProgramId,
    TextureSlotKind, VertexLayout,
};

const GBUFFER_SHADER: &str = lit_shader!("../../shader/gbuffer.wgsl");
const LIGHTING_SHADER: &str = lit_shader!("../../shader/lighting.wgsl");
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Writes surface attributes of every non-sky bucket into the G-buffer,
/// depth testing against the scene depth.
#[derive(Default)]
pub struct GeometryPass {
    material_sets: TextureSetCache,
}

impl GeometryPass {
    pub fn new() -> Self {
        Self::default()
    }

    fn program(
        ctx: &mut FrameContext<'_>,
        mesh: &Mesh,
        material: &Material,
        formats: &[wgpu::TextureFormat],
    ) -> Result<ProgramId, RenderError> {
        let fragment = match mesh.kind {
            MeshKind::Terrain => "fs_terrain",
            MeshKind::Standard | MeshKind::Sky => "fs_standard",
        };
        let name = mesh_program_key("gbuffer", mesh, material);
        let topology = material.topology.unwrap_or(mesh.topology);
        ctx.programs.get_or_create(ctx.device, &name, || {
            let mut desc = ProgramDesc::new("", GBUFFER_SHADER)
                .with_entries("vs_main", fragment)
                .with_vertex_layout(VertexLayout::MeshInstanced)
                .with_texture_group(material_group())
                .with_depth(DEPTH_FORMAT, true, wgpu::CompareFunction::Less)
                .with_cull_mode(material.cull_mode())
                .with_polygon_mode(material.polygon_mode())
                .with_topology(topology);
            for format in formats {
                desc = desc.with_color_target(*format, None);
            }
            desc
        })
    }
}

impl RenderPass for GeometryPass {
    fn name(&self) -> &'static str {
        "GeometryPass"
    }

    fn execute(
        &mut self,
        ctx: &mut FrameContext<'_>,
        list: &mut CommandList,
    ) -> Result<(), RenderError> {
        let frame_offset = list.push_uniform(ctx.frame_uniform);

        let (formats, colors, depth) = {
            let frame = ctx.frame_targets()?;
            let gbuffer = frame.gbuffer.as_ref().ok_or(RenderError::TargetsMissing)?;
            let formats: Vec<wgpu::TextureFormat> = (0..gbuffer.colors().len())
                .filter_map(|i| gbuffer.color_format(i))
                .collect();
            let depth = frame.scene.depth().ok_or(RenderError::TargetsMissing)?;
            (formats, gbuffer.colors().to_vec(), depth)
        };

        let (assets, batch) = (ctx.assets, ctx.batch);
        let mut draws = Vec::with_capacity(batch.len());
        for bucket in batch.buckets() {
            let (mesh, draw) = mesh_draw(assets, bucket)?;
            if mesh.kind == MeshKind::Sky {
                continue;
            }
            let material = bucket_material(assets, bucket, mesh);
            let (textures, mask) = material_textures(assets, material);
            let program = Self::program(ctx, mesh, material, &formats)?;
            let material_set = self.material_sets.get(ctx.device, program, 1, &textures)?;
            draws.push((program, material_set, draw, draw_uniform(material, mesh.kind, mask)));
        }

        let mut pass = list.begin_pass(PassDesc {
            label: "GeometryPass".into(),
            color: colors
                .iter()
                .map(|&id| ColorAttachment {
                    view: id.into(),
                    resolve: None,
                    clear: Some(wgpu::Color::TRANSPARENT),
                })
                .collect(),
            depth: Some(DepthAttachment {
                view: depth.into(),
                clear: Some(1.0),
            }),
        });

        for (program, material_set, draw, uniform) in &draws {
            let draw_offset = pass.push_uniform(uniform);
            pass.set_program(*program);
            pass.bind_uniforms(frame_offset, draw_offset);
            pass.bind_textures(1, *material_set);
            draw.record(&mut pass);
            ctx.stats.instances += draw.instance_count as usize;
        }
        Ok(())
    }

    fn release(&mut self, device: &mut dyn GpuDevice) {
        self.material_sets.release(device);
    }
}

/// One full-screen pass accumulating every light over the G-buffer into the
/// scene color. Sky and debug lines are drawn on top afterwards.
pub struct LightingPass {
    gbuffer_sets: TargetBoundSet,
    shadow_sets: TargetBoundSet,
    lines: LineRenderer,
}

impl Default for LightingPass {
    fn default() -> Self {
        Self::new()
    }
}

impl LightingPass {
    pub fn new() -> Self {
        Self {
            gbuffer_sets: TargetBoundSet::default(),
            shadow_sets: TargetBoundSet::default(),
            lines: LineRenderer::new(),
        }
    }

    fn program(
        ctx: &mut FrameContext<'_>,
        format: wgpu::TextureFormat,
        channels: usize,
    ) -> Result<ProgramId, RenderError> {
        let name = format!("lighting.{format:?}");
        ctx.programs.get_or_create(ctx.device, &name, || {
            ProgramDesc::new("", LIGHTING_SHADER)
                .with_texture_group(vec![TextureSlotKind::Color; channels])
                .with_texture_group(shadow_group())
                .with_color_target(format, None)
                .with_depth(DEPTH_FORMAT, false, wgpu::CompareFunction::Always)
                .with_cull_mode(None)
        })
    }
}

impl RenderPass for LightingPass {
    fn name(&self) -> &'static str {
        "LightingPass"
    }

    fn execute(
        &mut self,
        ctx: &mut FrameContext<'_>,
        list: &mut CommandList,
    ) -> Result<(), RenderError> {
        let frame_offset = list.push_uniform(ctx.frame_uniform);

        let (format, samples, channels, shadow_textures) = {
            let frame = ctx.frame_targets()?;
            let shadows = ctx.shadow_targets()?;
            let gbuffer = frame.gbuffer.as_ref().ok_or(RenderError::TargetsMissing)?;
            let format = frame
                .scene
                .color_format(0)
                .ok_or(RenderError::TargetsMissing)?;
            let directional = shadows.directional.depth().ok_or(RenderError::TargetsMissing)?;
            let points = shadows.points.depth().ok_or(RenderError::TargetsMissing)?;
            (
                format,
                frame.scene.sample_count(),
                gbuffer.colors().to_vec(),
                [directional, points],
            )
        };
        let generation = ctx.targets.generation();

        let program = Self::program(ctx, format, channels.len())?;
        let gbuffer_set = self
            .gbuffer_sets
            .get(ctx.device, generation, program, 1, &channels)?;
        let shadow_set = self
            .shadow_sets
            .get(ctx.device, generation, program, 2, &shadow_textures)?;

        let (assets, batch) = (ctx.assets, ctx.batch);
        let mut sky = Vec::new();
        for bucket in batch.buckets() {
            let (mesh, draw) = mesh_draw(assets, bucket)?;
            if mesh.kind == MeshKind::Sky {
                let material = bucket_material(assets, bucket, mesh);
                sky.push((draw, draw_uniform(material, mesh.kind, 0)));
            }
        }
        let sky_program = if sky.is_empty() {
            None
        } else {
            Some(sky_program(ctx, format, samples)?)
        };

        let frame = ctx.frame_targets()?;
        let mut pass = frame
            .scene
            .begin(list, "LightingPass", Some(ctx.params.clear_color), None);
        pass.set_program(program);
        pass.bind_uniforms(frame_offset, frame_offset);
        pass.bind_textures(1, gbuffer_set);
        pass.bind_textures(2, shadow_set);
        pass.draw(0..3, 0..1);

        if let Some(program) = sky_program {
            for (draw, uniform) in &sky {
                let draw_offset = pass.push_uniform(uniform);
                pass.set_program(program);
                pass.bind_uniforms(frame_offset, draw_offset);
                draw.record(&mut pass);
                ctx.stats.instances += draw.instance_count as usize;
            }
        }

        self.lines.draw(ctx, &mut pass, format, samples, frame_offset)
    }

    fn targets_changed(&mut self, device: &mut dyn GpuDevice, generation: u64) {
        self.gbuffer_sets.drop_stale(device, generation);
        self.shadow_sets.drop_stale(device, generation);
    }

    fn release(&mut self, device: &mut dyn GpuDevice) {
        self.gbuffer_sets.release(device);
        self.shadow_sets.release(device);
        self.lines.release(device);
    }
}
