use super::{FrameContext, FrameParams, RenderPass, TargetBoundSet};
use crate::renderer::error::RenderError;
use crate::renderer::gpu::{CommandList, GpuDevice, ProgramDesc, TextureSlotKind};
use crate::renderer::uniforms::PostUniform;

const POST_SHADER: &str = include_str!("../../shader/postprocess.wgsl");

/// Tone-maps the resolve target into the final target. Terminal; skipped
/// entirely while post-processing is disabled.
#[derive(Default)]
pub struct PostProcessPass {
    source_sets: TargetBoundSet,
}

impl PostProcessPass {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RenderPass for PostProcessPass {
    fn name(&self) -> &'static str {
        "PostProcessPass"
    }

    fn enabled(&self, params: &FrameParams) -> bool {
        params.post_processing
    }

    fn execute(
        &mut self,
        ctx: &mut FrameContext<'_>,
        list: &mut CommandList,
    ) -> Result<(), RenderError> {
        let source = {
            let frame = ctx.frame_targets()?;
            frame.resolve.color(0).ok_or(RenderError::TargetsMissing)?
        };
        let format = ctx.device.surface_format();
        let generation = ctx.targets.generation();

        let name = format!("post.tonemap.{format:?}");
        let program = ctx.programs.get_or_create(ctx.device, &name, || {
            ProgramDesc::new("", POST_SHADER)
                .with_texture_group(vec![TextureSlotKind::Color])
                .with_color_target(format, None)
                .with_cull_mode(None)
        })?;
        let source_set = self
            .source_sets
            .get(ctx.device, generation, program, 1, &[source])?;

        let uniform = list.push_uniform(&PostUniform {
            params: [ctx.params.exposure, 0.0, 0.0, 0.0],
        });
        let frame = ctx.frame_targets()?;
        let mut pass = frame
            .final_target
            .begin(list, "PostProcessPass", Some(wgpu::Color::BLACK), None);
        pass.set_program(program);
        pass.bind_uniforms(uniform, uniform);
        pass.bind_textures(1, source_set);
        pass.draw(0..3, 0..1);
        Ok(())
    }

    fn targets_changed(&mut self, device: &mut dyn GpuDevice, generation: u64) {
        self.source_sets.drop_stale(device, generation);
    }

    fn release(&mut self, device: &mut dyn GpuDevice) {
        self.source_sets.release(device);
    }
}
