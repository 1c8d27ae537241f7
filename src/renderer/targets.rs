use super::error::RenderError;
use super::gpu::{GpuDevice, TextureId};
use super::lights::POINT_SHADOW_FACES;
use super::target::{ColorFormat, RenderTarget, RenderTargetDesc};
use crate::settings::{ColorStrategy, RenderSettings};

/// What the manager builds. Derived from settings once per pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetConfig {
    pub sample_count: u32,
    pub hdr: bool,
    pub strategy: ColorStrategy,
    pub shadow_map_size: u32,
    pub point_shadow_map_size: u32,
    pub shadow_point_slots: u32,
}

impl TargetConfig {
    pub fn from_settings(settings: &RenderSettings) -> Self {
        Self {
            sample_count: settings.sample_count,
            hdr: settings.hdr,
            strategy: settings.color_strategy,
            shadow_map_size: settings.shadow_map_size,
            point_shadow_map_size: settings.point_shadow_map_size,
            shadow_point_slots: settings.max_shadow_point_lights,
        }
    }

    pub fn scene_color_format(&self) -> ColorFormat {
        if self.hdr {
            ColorFormat::Hdr16
        } else {
            ColorFormat::Ldr8
        }
    }

    /// The G-buffer is single-sampled and shares the scene depth, so the
    /// deferred scene target is single-sampled as well.
    pub fn scene_sample_count(&self) -> u32 {
        match self.strategy {
            ColorStrategy::Forward => self.sample_count,
            ColorStrategy::Deferred => 1,
        }
    }
}

/// Shadow maps. Fixed resolution, unaffected by window resizes.
#[derive(Debug)]
pub struct ShadowTargets {
    pub directional: RenderTarget,
    /// Six layers per point-light shadow slot.
    pub points: RenderTarget,
}

/// Size-dependent targets, recreated together on resize.
#[derive(Debug)]
pub struct FrameTargets {
    /// Multisampled color and depth the opaque pass renders into.
    pub scene: RenderTarget,
    /// Single-sampled copy of the scene color that post-processing reads.
    pub resolve: RenderTarget,
    pub gbuffer: Option<RenderTarget>,
    pub final_target: RenderTarget,
}

impl FrameTargets {
    fn create(
        device: &mut dyn GpuDevice,
        config: &TargetConfig,
        (width, height): (u32, u32),
    ) -> Result<Self, RenderError> {
        let color = config.scene_color_format();

        let scene = RenderTarget::create(
            device,
            RenderTargetDesc::new("scene", width, height)
                .with_color("color", color)
                .with_depth()
                .with_samples(config.scene_sample_count()),
        )?;

        let resolve = match RenderTarget::create(
            device,
            RenderTargetDesc::new("resolve", width, height)
                .with_color("color", color)
                .filtered(),
        ) {
            Ok(target) => target,
            Err(err) => {
                let mut scene = scene;
                scene.destroy(device);
                return Err(err);
            }
        };

        let gbuffer = match config.strategy {
            ColorStrategy::Forward => None,
            ColorStrategy::Deferred => match RenderTarget::create(
                device,
                RenderTargetDesc::new("gbuffer", width, height)
                    .with_color("position", ColorFormat::Hdr16)
                    .with_color("normal", ColorFormat::Hdr16)
                    .with_color("albedo", ColorFormat::Ldr8)
                    .with_color("material", ColorFormat::Ldr8)
                    .filtered(),
            ) {
                Ok(target) => Some(target),
                Err(err) => {
                    let (mut scene, mut resolve) = (scene, resolve);
                    scene.destroy(device);
                    resolve.destroy(device);
                    return Err(err);
                }
            },
        };

        Ok(Self {
            scene,
            resolve,
            gbuffer,
            final_target: RenderTarget::from_surface(device),
        })
    }

    fn destroy(&mut self, device: &mut dyn GpuDevice) {
        self.scene.destroy(device);
        self.resolve.destroy(device);
        if let Some(gbuffer) = self.gbuffer.as_mut() {
            gbuffer.destroy(device);
        }
    }
}

pub struct RenderTargetManager {
    config: TargetConfig,
    size: (u32, u32),
    generation: u64,
    shadows: Option<ShadowTargets>,
    frame: Option<FrameTargets>,
}

impl RenderTargetManager {
    pub fn new(config: TargetConfig) -> Self {
        Self {
            config,
            size: (0, 0),
            generation: 0,
            shadows: None,
            frame: None,
        }
    }

    pub fn config(&self) -> &TargetConfig {
        &self.config
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Bumped on every (re)creation; cached texture sets compare against it.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn shadows(&self) -> Option<&ShadowTargets> {
        self.shadows.as_ref()
    }

    pub fn frame(&self) -> Option<&FrameTargets> {
        self.frame.as_ref()
    }

    pub fn is_created(&self) -> bool {
        self.shadows.is_some() && self.frame.is_some()
    }

    pub fn create_targets(
        &mut self,
        device: &mut dyn GpuDevice,
        size: (u32, u32),
    ) -> Result<(), RenderError> {
        self.destroy_targets(device);

        let size = (size.0.max(1), size.1.max(1));
        device.resize_surface(size.0, size.1);

        let mut shadows = self.create_shadow_targets(device)?;
        let frame = match FrameTargets::create(device, &self.config, size) {
            Ok(frame) => frame,
            Err(err) => {
                shadows.directional.destroy(device);
                shadows.points.destroy(device);
                return Err(err);
            }
        };

        log::info!(
            "Render targets created at {}x{} ({:?}, {} samples)",
            size.0,
            size.1,
            self.config.strategy,
            self.config.scene_sample_count()
        );

        self.shadows = Some(shadows);
        self.frame = Some(frame);
        self.size = size;
        self.generation += 1;
        Ok(())
    }

    pub fn destroy_targets(&mut self, device: &mut dyn GpuDevice) {
        if let Some(mut shadows) = self.shadows.take() {
            shadows.directional.destroy(device);
            shadows.points.destroy(device);
        }
        if let Some(mut frame) = self.frame.take() {
            frame.destroy(device);
        }
    }

    /// Rebuilds the size-dependent targets. A zero-sized window (minimized)
    /// is ignored, as is a resize to the current size.
    pub fn on_resize(
        &mut self,
        device: &mut dyn GpuDevice,
        size: (u32, u32),
    ) -> Result<(), RenderError> {
        if size.0 == 0 || size.1 == 0 {
            log::debug!("Ignoring resize to {}x{}", size.0, size.1);
            return Ok(());
        }
        if size == self.size && self.frame.is_some() {
            return Ok(());
        }
        if self.frame.is_none() {
            return self.create_targets(device, size);
        }

        device.resize_surface(size.0, size.1);
        let replacement = match FrameTargets::create(device, &self.config, size) {
            Ok(targets) => targets,
            Err(err) => {
                device.resize_surface(self.size.0, self.size.1);
                return Err(err);
            }
        };
        if let Some(mut previous) = self.frame.replace(replacement) {
            previous.destroy(device);
        }

        log::info!("Render targets resized to {}x{}", size.0, size.1);
        self.size = size;
        self.generation += 1;
        Ok(())
    }

    fn create_shadow_targets(
        &self,
        device: &mut dyn GpuDevice,
    ) -> Result<ShadowTargets, RenderError> {
        let size = self.config.shadow_map_size;
        let mut directional = RenderTarget::create(
            device,
            RenderTargetDesc::new("shadow.directional", size, size)
                .with_depth()
                .filtered(),
        )?;

        let face = self.config.point_shadow_map_size;
        let layers = self.config.shadow_point_slots.max(1) * POINT_SHADOW_FACES as u32;
        let points = RenderTarget::create(
            device,
            RenderTargetDesc::new("shadow.point", face, face)
                .with_depth()
                .with_layers(layers)
                .filtered(),
        );
        match points {
            Ok(points) => Ok(ShadowTargets {
                directional,
                points,
            }),
            Err(err) => {
                directional.destroy(device);
                Err(err)
            }
        }
    }

    /// Named textures for debug display.
    pub fn debug_textures(&self) -> Vec<(String, TextureId)> {
        let mut textures = Vec::new();
        if let Some(shadows) = &self.shadows {
            textures.extend(
                shadows
                    .directional
                    .depth()
                    .map(|id| ("shadow.directional".to_owned(), id)),
            );
            textures.extend(shadows.points.depth().map(|id| ("shadow.point".to_owned(), id)));
        }
        if let Some(frame) = &self.frame {
            if let Some(gbuffer) = &frame.gbuffer {
                textures.extend(gbuffer.attachments());
            }
            textures.extend(frame.scene.attachments());
            textures.extend(frame.resolve.attachments());
        }
        textures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::gpu::HeadlessDevice;

    fn config(strategy: ColorStrategy) -> TargetConfig {
        TargetConfig {
            sample_count: 4,
            hdr: true,
            strategy,
            shadow_map_size: 256,
            point_shadow_map_size: 64,
            shadow_point_slots: 2,
        }
    }

    #[test]
    fn forward_targets_have_no_gbuffer() {
        let mut device = HeadlessDevice::new(320, 200);
        let mut manager = RenderTargetManager::new(config(ColorStrategy::Forward));
        manager.create_targets(&mut device, (320, 200)).unwrap();

        let frame = manager.frame().unwrap();
        assert!(frame.gbuffer.is_none());
        assert_eq!(frame.scene.sample_count(), 4);
        assert_eq!(frame.resolve.sample_count(), 1);
        assert_eq!(manager.generation(), 1);
        // shadow dir + point, scene color + depth, resolve
        assert_eq!(device.live_textures(), 5);
    }

    #[test]
    fn deferred_targets_name_gbuffer_channels() {
        let mut device = HeadlessDevice::new(320, 200);
        let mut manager = RenderTargetManager::new(config(ColorStrategy::Deferred));
        manager.create_targets(&mut device, (320, 200)).unwrap();

        let names: Vec<String> = manager.debug_textures().into_iter().map(|(n, _)| n).collect();
        for expected in [
            "shadow.directional",
            "shadow.point",
            "gbuffer.position",
            "gbuffer.normal",
            "gbuffer.albedo",
            "gbuffer.material",
            "scene.color",
            "scene.depth",
            "resolve.color",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
        assert_eq!(manager.frame().unwrap().scene.sample_count(), 1);
    }

    #[test]
    fn point_shadow_layers_cover_every_slot() {
        let mut device = HeadlessDevice::new(32, 32);
        let mut manager = RenderTargetManager::new(config(ColorStrategy::Forward));
        manager.create_targets(&mut device, (32, 32)).unwrap();
        let points = manager.shadows().unwrap().points.depth().unwrap();
        assert_eq!(device.texture_desc(points).unwrap().layers, 12);
    }

    #[test]
    fn failed_creation_leaves_nothing_behind() {
        let mut device = HeadlessDevice::new(32, 32);
        device.fail_textures_matching("resolve");
        let mut manager = RenderTargetManager::new(config(ColorStrategy::Forward));
        let err = manager.create_targets(&mut device, (32, 32)).unwrap_err();
        assert!(matches!(err, RenderError::TargetValidation { ref target, .. } if target == "resolve"));
        assert_eq!(device.live_textures(), 0);
        assert!(!manager.is_created());
    }

    #[test]
    fn zero_sized_resize_is_ignored() {
        let mut device = HeadlessDevice::new(32, 32);
        let mut manager = RenderTargetManager::new(config(ColorStrategy::Forward));
        manager.create_targets(&mut device, (32, 32)).unwrap();
        manager.on_resize(&mut device, (0, 10)).unwrap();
        assert_eq!(manager.size(), (32, 32));
        assert_eq!(manager.generation(), 1);
    }
}
