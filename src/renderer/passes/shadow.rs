use glam::Mat4;

use super::{mesh_draw, FrameContext, MeshDraw, RenderPass};
use crate::asset::MeshKind;
use crate::renderer::error::RenderError;
use crate::renderer::gpu::{CommandList, PassEncoder, ProgramDesc, ProgramId, VertexLayout};
use crate::renderer::lights::POINT_SHADOW_FACES;
use crate::renderer::uniforms::ShadowCasterUniform;

const SHADOW_SHADER: &str = include_str!("../../shader/shadow.wgsl");
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Depth-only rendering of every shadow caster: once from the main
/// directional light, then six faces per point light holding a shadow slot.
#[derive(Default)]
pub struct ShadowPass;

impl ShadowPass {
    pub fn new() -> Self {
        Self
    }

    fn program(ctx: &mut FrameContext<'_>) -> Result<ProgramId, RenderError> {
        ctx.programs.get_or_create(ctx.device, "shadow.caster", || {
            ProgramDesc::new("", SHADOW_SHADER)
                .depth_only()
                .with_vertex_layout(VertexLayout::MeshInstanced)
                .with_depth_biased(DEPTH_FORMAT, 2, 2.0)
                .with_cull_mode(None)
        })
    }

    fn draw_casters(
        pass: &mut PassEncoder<'_>,
        program: ProgramId,
        view_proj: Mat4,
        casters: &[MeshDraw],
    ) {
        let offset = pass.push_uniform(&ShadowCasterUniform {
            view_proj: view_proj.to_cols_array_2d(),
        });
        pass.set_program(program);
        pass.bind_uniforms(offset, offset);
        for caster in casters {
            caster.record(pass);
        }
    }
}

impl RenderPass for ShadowPass {
    fn name(&self) -> &'static str {
        "ShadowPass"
    }

    fn execute(
        &mut self,
        ctx: &mut FrameContext<'_>,
        list: &mut CommandList,
    ) -> Result<(), RenderError> {
        let directional = ctx.lights.directional.shadow;
        if directional.is_none() && ctx.lights.point_shadows.is_empty() {
            return Ok(());
        }

        let (assets, batch, lights) = (ctx.assets, ctx.batch, ctx.lights);
        let mut casters = Vec::with_capacity(batch.len());
        for bucket in batch.buckets() {
            let (mesh, draw) = mesh_draw(assets, bucket)?;
            if mesh.kind != MeshKind::Sky {
                casters.push(draw);
            }
        }

        let program = Self::program(ctx)?;
        let shadows = ctx.shadow_targets()?;

        if let Some(view_proj) = directional {
            let mut pass = shadows
                .directional
                .begin(list, "ShadowPass.directional", None, Some(1.0));
            Self::draw_casters(&mut pass, program, view_proj, &casters);
        }

        for shadow in &lights.point_shadows {
            for (face, view_proj) in shadow.view_proj.iter().enumerate() {
                let layer = (shadow.slot * POINT_SHADOW_FACES + face) as u32;
                let label = format!("ShadowPass.point[{}].face[{}]", shadow.slot, face);
                let mut pass = shadows.points.begin_layer(list, &label, layer, Some(1.0));
                Self::draw_casters(&mut pass, program, *view_proj, &casters);
            }
        }

        ctx.stats.shadow_slots_used = lights.point_shadows.len();
        Ok(())
    }
}
