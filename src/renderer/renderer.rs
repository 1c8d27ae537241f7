// renderer/renderer.rs
use glam::{Vec3, Vec4};

use super::batch::FrameBatcher;
use super::camera::CameraRegistry;
use super::error::RenderError;
use super::gpu::{GpuDevice, TextureId};
use super::lights::{LightLimits, LightRegistry};
use super::overlay::{Canvas, DebugLines};
use super::passes::FrameParams;
use super::pipeline::{FrameInputs, RenderPipeline};
use super::stats::FrameStats;
use super::targets::{RenderTargetManager, TargetConfig};
use super::uniforms::FrameUniform;
use crate::asset::{Assets, Handle, Material, Mesh};
use crate::scene::SceneSnapshot;
use crate::settings::RenderSettings;

/// Owns everything a frame needs: targets, the pass pipeline, the batcher,
/// asset and light/camera registries, and the per-frame transient queues.
///
/// There is one renderer per window. It is handed explicitly to whoever
/// drives the frame loop.
pub struct Renderer<D: GpuDevice> {
    device: D,
    settings: RenderSettings,
    targets: RenderTargetManager,
    pipeline: RenderPipeline,
    batcher: FrameBatcher,
    assets: Assets,
    lights: LightRegistry,
    cameras: CameraRegistry,
    canvas: Canvas,
    lines: DebugLines,
    post_processing: bool,
    stats: FrameStats,
    frame_index: u64,
    time: f64,
}

impl<D: GpuDevice> Renderer<D> {
    /// Creates every render target at the device's surface size. A target
    /// that fails validation makes construction fail.
    pub fn new(mut device: D, settings: RenderSettings) -> Result<Self, RenderError> {
        let settings = settings.validate();
        let assets = Assets::new(&mut device)?;

        let mut targets = RenderTargetManager::new(TargetConfig::from_settings(&settings));
        let size = device.surface_size();
        targets.create_targets(&mut device, size)?;

        log::info!(
            "Renderer ready on {} backend ({:?}, post-processing {})",
            device.backend_name(),
            settings.color_strategy,
            if settings.post_processing { "on" } else { "off" }
        );

        Ok(Self {
            pipeline: RenderPipeline::new(settings.color_strategy),
            post_processing: settings.post_processing,
            device,
            settings,
            targets,
            batcher: FrameBatcher::new(),
            assets,
            lights: LightRegistry::new(),
            cameras: CameraRegistry::new(),
            canvas: Canvas::new(),
            lines: DebugLines::new(),
            stats: FrameStats::default(),
            frame_index: 0,
            time: 0.0,
        })
    }

    /// Recreates the size-dependent targets before the next frame.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        self.targets.on_resize(&mut self.device, (width, height))?;
        self.pipeline
            .targets_changed(&mut self.device, self.targets.generation());
        Ok(())
    }

    pub fn size(&self) -> (u32, u32) {
        self.targets.size()
    }

    /// Draws one frame from the committed scene state.
    ///
    /// Transient queues (canvas quads, debug lines) are empty afterwards,
    /// whether or not the frame was drawn.
    pub fn render(&mut self, dt: f64, snapshot: &SceneSnapshot) -> Result<(), RenderError> {
        let result = self.render_frame(dt, snapshot);
        self.canvas.clear();
        self.lines.clear();
        result
    }

    fn render_frame(&mut self, dt: f64, snapshot: &SceneSnapshot) -> Result<(), RenderError> {
        self.time += dt;
        self.frame_index += 1;
        let params = FrameParams {
            clear_color: self.settings.clear_color(),
            exposure: self.settings.exposure,
            post_processing: self.post_processing,
        };
        let mut stats = FrameStats {
            frame_index: self.frame_index,
            ..FrameStats::default()
        };

        if let Err(err) = self.device.begin_frame() {
            let err = RenderError::from(err);
            if err.is_fatal() {
                return Err(err);
            }
            let (width, height) = self.targets.size();
            log::warn!("Skipping frame {}: {}", self.frame_index, err);
            self.device.resize_surface(width, height);
            stats.skipped = true;
            self.stats = stats;
            return Ok(());
        }

        let batch = self.batcher.build_batch(&snapshot.renderables);
        stats.buckets = batch.len();

        let (width, height) = self.targets.size();
        let aspect = width as f32 / height.max(1) as f32;
        let camera = self.cameras.main().resolve(snapshot, aspect);
        let lights = self.lights.resolve(
            snapshot,
            &camera,
            LightLimits {
                max_point_lights: self.settings.max_point_lights as usize,
                max_shadow_point_lights: self.settings.max_shadow_point_lights as usize,
            },
        );
        stats.unshadowed_casters = lights.unshadowed_casters;
        let frame_uniform = FrameUniform::new(&camera, &lights, self.time as f32);

        self.pipeline.run(
            &mut self.device,
            &self.targets,
            &mut self.assets,
            &mut self.canvas,
            &mut self.lines,
            FrameInputs {
                batch,
                lights: &lights,
                frame_uniform: &frame_uniform,
                params,
            },
            &mut stats,
        )?;

        self.device.present();
        log::trace!(
            "Frame {}: {} draw calls over {}",
            stats.frame_index,
            stats.draw_calls,
            stats.passes.join(", ")
        );
        self.stats = stats;
        Ok(())
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn assets(&self) -> &Assets {
        &self.assets
    }

    pub fn assets_mut(&mut self) -> &mut Assets {
        &mut self.assets
    }

    /// Registers a mesh and uploads it.
    pub fn add_mesh(
        &mut self,
        name: impl Into<String>,
        mesh: Mesh,
    ) -> Result<Handle<Mesh>, RenderError> {
        Ok(self.assets.add_mesh(&mut self.device, name, mesh)?)
    }

    pub fn add_material(&mut self, name: impl Into<String>, material: Material) -> Handle<Material> {
        self.assets.add_material(name, material)
    }

    /// Uploads RGBA8 texels as the next scene texture and returns its index.
    pub fn load_texture(
        &mut self,
        name: impl Into<String>,
        width: u32,
        height: u32,
        texels: &[u8],
    ) -> Result<u32, RenderError> {
        Ok(self
            .assets
            .textures
            .load_rgba8(&mut self.device, name, width, height, texels)?)
    }

    /// Uploads meshes that were registered through [`assets_mut`](Self::assets_mut)
    /// without being uploaded.
    pub fn upload_assets(&mut self) -> Result<usize, RenderError> {
        Ok(self.assets.upload_pending(&mut self.device)?)
    }

    pub fn lights(&self) -> &LightRegistry {
        &self.lights
    }

    pub fn lights_mut(&mut self) -> &mut LightRegistry {
        &mut self.lights
    }

    pub fn cameras(&self) -> &CameraRegistry {
        &self.cameras
    }

    pub fn cameras_mut(&mut self) -> &mut CameraRegistry {
        &mut self.cameras
    }

    /// Screen-space quads drawn this frame, in pixel coordinates.
    pub fn canvas(&mut self) -> &mut Canvas {
        &mut self.canvas
    }

    pub fn draw_line(&mut self, a: Vec3, b: Vec3, color: Vec4) {
        self.lines.line(a, b, color);
    }

    pub fn pending_lines(&self) -> usize {
        self.lines.len()
    }

    pub fn last_frame(&self) -> &FrameStats {
        &self.stats
    }

    /// Takes effect at the start of the next frame.
    pub fn set_post_processing(&mut self, enabled: bool) {
        if enabled != self.post_processing {
            log::info!("Post-processing {}", if enabled { "enabled" } else { "disabled" });
        }
        self.post_processing = enabled;
    }

    pub fn post_processing(&self) -> bool {
        self.post_processing
    }

    pub fn pipeline(&self) -> &RenderPipeline {
        &self.pipeline
    }

    pub fn targets(&self) -> &RenderTargetManager {
        &self.targets
    }

    /// Named render-target textures for debug display.
    pub fn debug_textures(&self) -> Vec<(String, TextureId)> {
        self.targets.debug_textures()
    }

    /// Releases every GPU object the renderer created.
    pub fn shutdown(&mut self) {
        self.pipeline.release(&mut self.device);
        self.targets.destroy_targets(&mut self.device);
        self.assets.release(&mut self.device);
        log::info!("Renderer shut down after {} frames", self.frame_index);
    }
}
