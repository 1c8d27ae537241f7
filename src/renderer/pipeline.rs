use super::batch::FrameBatch;
use super::error::RenderError;
use super::gpu::{CommandList, GpuDevice};
use super::lights::FrameLights;
use super::overlay::{Canvas, DebugLines};
use super::passes::{
    CanvasPass, ForwardOpaquePass, FrameContext, FrameParams, GeometryPass, LightingPass,
    MsaaResolvePass, PostProcessPass, RenderPass, ShadowPass,
};
use super::programs::ShaderPrograms;
use super::stats::FrameStats;
use super::targets::RenderTargetManager;
use super::uniforms::FrameUniform;
use crate::asset::Assets;
use crate::settings::ColorStrategy;

/// The fixed sequence of passes run every frame.
///
/// The order is decided once, from the color strategy, and never changes:
/// shadows, opaque color (forward, or geometry then lighting), MSAA resolve,
/// canvas, post-process.
pub struct RenderPipeline {
    strategy: ColorStrategy,
    passes: Vec<Box<dyn RenderPass>>,
    programs: ShaderPrograms,
}

/// Per-frame inputs the pipeline reads but does not own.
pub struct FrameInputs<'a> {
    pub batch: &'a FrameBatch,
    pub lights: &'a FrameLights,
    pub frame_uniform: &'a FrameUniform,
    pub params: FrameParams,
}

impl RenderPipeline {
    pub fn new(strategy: ColorStrategy) -> Self {
        let mut passes: Vec<Box<dyn RenderPass>> = vec![Box::new(ShadowPass::new())];
        match strategy {
            ColorStrategy::Forward => passes.push(Box::new(ForwardOpaquePass::new())),
            ColorStrategy::Deferred => {
                passes.push(Box::new(GeometryPass::new()));
                passes.push(Box::new(LightingPass::new()));
            }
        }
        passes.push(Box::new(MsaaResolvePass::new()));
        passes.push(Box::new(CanvasPass::new()));
        passes.push(Box::new(PostProcessPass::new()));

        log::info!(
            "Render pipeline ({:?}): {}",
            strategy,
            passes.iter().map(|p| p.name()).collect::<Vec<_>>().join(" -> ")
        );

        Self {
            strategy,
            passes,
            programs: ShaderPrograms::new(),
        }
    }

    pub fn strategy(&self) -> ColorStrategy {
        self.strategy
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn programs(&self) -> &ShaderPrograms {
        &self.programs
    }

    /// Runs every enabled pass in order.
    ///
    /// Each pass is submitted on its own; driver errors reported for it are
    /// logged under its name and do not stop the frame. Errors returned by a
    /// pass are fatal and unwind immediately.
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &mut self,
        device: &mut dyn GpuDevice,
        targets: &RenderTargetManager,
        assets: &mut Assets,
        canvas: &mut Canvas,
        lines: &mut DebugLines,
        inputs: FrameInputs<'_>,
        stats: &mut FrameStats,
    ) -> Result<(), RenderError> {
        upload_instances(device, assets, inputs.batch)?;

        let mut ctx = FrameContext {
            device,
            targets,
            programs: &mut self.programs,
            assets,
            batch: inputs.batch,
            lights: inputs.lights,
            frame_uniform: inputs.frame_uniform,
            canvas,
            lines,
            params: inputs.params,
            stats,
        };

        for pass in self.passes.iter_mut() {
            let name = pass.name();
            if !pass.enabled(&ctx.params) {
                log::trace!("{} disabled this frame", name);
                continue;
            }

            let mut list = CommandList::new(name);
            pass.execute(&mut ctx, &mut list)?;
            if !list.is_empty() {
                ctx.device.submit(&list);
            }
            ctx.stats.draw_calls += list.draw_calls();
            ctx.stats.passes.push(name);

            for message in ctx.device.take_errors() {
                log::error!("[{}] {}", name, message);
                ctx.stats.gpu_errors += 1;
            }
        }
        Ok(())
    }

    /// Lets every pass drop state tied to targets older than `generation`.
    pub fn targets_changed(&mut self, device: &mut dyn GpuDevice, generation: u64) {
        for pass in self.passes.iter_mut() {
            pass.targets_changed(device, generation);
        }
    }

    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        for pass in self.passes.iter_mut() {
            pass.release(device);
        }
    }
}

/// Writes every bucket's transforms into its mesh's instance buffer.
fn upload_instances(
    device: &mut dyn GpuDevice,
    assets: &mut Assets,
    batch: &FrameBatch,
) -> Result<(), RenderError> {
    for bucket in batch.buckets() {
        let not_uploaded = RenderError::MeshNotUploaded {
            mesh: bucket.mesh.index(),
        };
        let mesh = match assets.meshes.get_mut(bucket.mesh) {
            Some(mesh) if mesh.is_uploaded() => mesh,
            _ => return Err(not_uploaded),
        };
        let raw: Vec<_> = bucket.instances.iter().map(|i| i.to_raw()).collect();
        mesh.write_instances(device, &raw)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_pipeline_order() {
        let pipeline = RenderPipeline::new(ColorStrategy::Forward);
        assert_eq!(
            pipeline.pass_names(),
            vec![
                "ShadowPass",
                "ForwardOpaquePass",
                "MSAAResolvePass",
                "CanvasPass",
                "PostProcessPass"
            ]
        );
    }

    #[test]
    fn deferred_pipeline_order() {
        let pipeline = RenderPipeline::new(ColorStrategy::Deferred);
        assert_eq!(
            pipeline.pass_names(),
            vec![
                "ShadowPass",
                "GeometryPass",
                "LightingPass",
                "MSAAResolvePass",
                "CanvasPass",
                "PostProcessPass"
            ]
        );
    }
}
