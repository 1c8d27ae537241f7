use super::{FrameContext, RenderPass};
use crate::renderer::error::RenderError;
use crate::renderer::gpu::CommandList;

/// Resolves the multisampled scene color into the resolve target, or
/// straight into the final target when post-processing is off. Nothing after
/// this pass reads the scene target.
#[derive(Default)]
pub struct MsaaResolvePass;

impl MsaaResolvePass {
    pub fn new() -> Self {
        Self
    }
}

impl RenderPass for MsaaResolvePass {
    fn name(&self) -> &'static str {
        "MSAAResolvePass"
    }

    fn execute(
        &mut self,
        ctx: &mut FrameContext<'_>,
        list: &mut CommandList,
    ) -> Result<(), RenderError> {
        let frame = ctx.frame_targets()?;
        let source = frame.scene.color(0).ok_or(RenderError::TargetsMissing)?;
        let destination = if ctx.params.post_processing {
            frame.resolve.color(0)
        } else {
            frame.final_target.color(0)
        }
        .ok_or(RenderError::TargetsMissing)?;

        log::trace!(
            "Resolving scene ({} samples) into {}",
            frame.scene.sample_count(),
            if ctx.params.post_processing { "resolve" } else { "final" }
        );
        list.blit(source, destination);
        Ok(())
    }
}
