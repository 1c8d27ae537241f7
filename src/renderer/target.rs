use super::error::RenderError;
use super::gpu::{
    AttachmentView, ColorAttachment, CommandList, DepthAttachment, GpuDevice, PassDesc,
    PassEncoder, TextureDesc, TextureId,
};

/// Color attachment precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorFormat {
    Ldr8,
    Hdr16,
}

impl ColorFormat {
    pub fn texture_format(self) -> wgpu::TextureFormat {
        match self {
            ColorFormat::Ldr8 => wgpu::TextureFormat::Rgba8Unorm,
            ColorFormat::Hdr16 => wgpu::TextureFormat::Rgba16Float,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorSpec {
    pub name: &'static str,
    pub format: ColorFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderTargetDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub sample_count: u32,
    pub colors: Vec<ColorSpec>,
    pub depth: bool,
    pub stencil: bool,
    /// Attachments are sampled by later passes.
    pub filtered: bool,
    pub layers: u32,
}

impl RenderTargetDesc {
    pub fn new(label: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            sample_count: 1,
            colors: Vec::new(),
            depth: false,
            stencil: false,
            filtered: false,
            layers: 1,
        }
    }

    pub fn with_color(mut self, name: &'static str, format: ColorFormat) -> Self {
        self.colors.push(ColorSpec { name, format });
        self
    }

    pub fn with_depth(mut self) -> Self {
        self.depth = true;
        self
    }

    pub fn with_stencil(mut self) -> Self {
        self.stencil = true;
        self
    }

    pub fn with_samples(mut self, sample_count: u32) -> Self {
        self.sample_count = sample_count;
        self
    }

    pub fn filtered(mut self) -> Self {
        self.filtered = true;
        self
    }

    pub fn with_layers(mut self, layers: u32) -> Self {
        self.layers = layers;
        self
    }

    pub fn depth_format(&self) -> wgpu::TextureFormat {
        if self.stencil {
            wgpu::TextureFormat::Depth24PlusStencil8
        } else {
            wgpu::TextureFormat::Depth32Float
        }
    }

    /// Completeness checks run before any attachment is allocated.
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!("size {}x{} has a zero dimension", self.width, self.height));
        }
        if self.colors.is_empty() && !self.depth {
            return Err("no attachments".into());
        }
        if self.stencil && !self.depth {
            return Err("stencil requested without depth".into());
        }
        if !matches!(self.sample_count, 1 | 2 | 4 | 8 | 16) {
            return Err(format!("unsupported sample count {}", self.sample_count));
        }
        if self.filtered && self.sample_count > 1 {
            return Err("multisampled attachments cannot be filtered".into());
        }
        if self.layers == 0 {
            return Err("zero layers".into());
        }
        if self.layers > 1 && self.sample_count > 1 {
            return Err("layered targets cannot be multisampled".into());
        }
        Ok(())
    }

    fn texture_desc(&self, name: &str, format: wgpu::TextureFormat) -> TextureDesc {
        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC;
        // Color attachments can always be blit sources.
        if self.filtered || !format.is_depth_stencil_format() {
            usage |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        TextureDesc {
            label: format!("{}.{}", self.label, name),
            width: self.width,
            height: self.height,
            layers: self.layers,
            format,
            sample_count: self.sample_count,
            usage,
        }
    }
}

/// An offscreen (or surface-backed) set of attachments sharing one size.
#[derive(Debug)]
pub struct RenderTarget {
    desc: RenderTargetDesc,
    colors: Vec<TextureId>,
    depth: Option<TextureId>,
    owned: bool,
}

impl RenderTarget {
    /// Creates every attachment or none of them.
    pub fn create(device: &mut dyn GpuDevice, desc: RenderTargetDesc) -> Result<Self, RenderError> {
        desc.validate().map_err(|reason| RenderError::TargetValidation {
            target: desc.label.clone(),
            reason,
        })?;

        let mut created: Vec<TextureId> = Vec::new();
        let result = Self::create_attachments(device, &desc, &mut created);
        match result {
            Ok((colors, depth)) => {
                log::debug!(
                    "Created render target '{}' {}x{} ({} color, depth: {}, samples: {})",
                    desc.label,
                    desc.width,
                    desc.height,
                    colors.len(),
                    depth.is_some(),
                    desc.sample_count
                );
                Ok(Self {
                    desc,
                    colors,
                    depth,
                    owned: true,
                })
            }
            Err(err) => {
                for id in created {
                    device.destroy_texture(id);
                }
                Err(RenderError::TargetValidation {
                    target: desc.label.clone(),
                    reason: err.to_string(),
                })
            }
        }
    }

    fn create_attachments(
        device: &mut dyn GpuDevice,
        desc: &RenderTargetDesc,
        created: &mut Vec<TextureId>,
    ) -> Result<(Vec<TextureId>, Option<TextureId>), super::gpu::GpuError> {
        let mut colors = Vec::with_capacity(desc.colors.len());
        for spec in &desc.colors {
            let id = device.create_texture(&desc.texture_desc(spec.name, spec.format.texture_format()))?;
            created.push(id);
            colors.push(id);
        }
        let depth = if desc.depth {
            let id = device.create_texture(&desc.texture_desc("depth", desc.depth_format()))?;
            created.push(id);
            Some(id)
        } else {
            None
        };
        Ok((colors, depth))
    }

    /// Wraps the device surface. The surface is never destroyed by the target.
    pub fn from_surface(device: &dyn GpuDevice) -> Self {
        let (width, height) = device.surface_size();
        Self {
            desc: RenderTargetDesc::new("final", width, height),
            colors: vec![device.surface_texture()],
            depth: None,
            owned: false,
        }
    }

    /// Recreates all attachments at the new size. The old attachments are
    /// released only after the new set exists.
    pub fn resize(
        &mut self,
        device: &mut dyn GpuDevice,
        width: u32,
        height: u32,
    ) -> Result<(), RenderError> {
        if !self.owned {
            self.desc.width = width;
            self.desc.height = height;
            return Ok(());
        }
        let mut desc = self.desc.clone();
        desc.width = width;
        desc.height = height;
        let replacement = RenderTarget::create(device, desc)?;
        let mut old = std::mem::replace(self, replacement);
        old.destroy(device);
        Ok(())
    }

    pub fn destroy(&mut self, device: &mut dyn GpuDevice) {
        if self.owned {
            for id in self.colors.drain(..) {
                device.destroy_texture(id);
            }
            if let Some(depth) = self.depth.take() {
                device.destroy_texture(depth);
            }
        }
    }

    pub fn desc(&self) -> &RenderTargetDesc {
        &self.desc
    }

    pub fn label(&self) -> &str {
        &self.desc.label
    }

    pub fn size(&self) -> (u32, u32) {
        (self.desc.width, self.desc.height)
    }

    pub fn sample_count(&self) -> u32 {
        self.desc.sample_count
    }

    pub fn colors(&self) -> &[TextureId] {
        &self.colors
    }

    pub fn color(&self, index: usize) -> Option<TextureId> {
        self.colors.get(index).copied()
    }

    pub fn depth(&self) -> Option<TextureId> {
        self.depth
    }

    pub fn color_format(&self, index: usize) -> Option<wgpu::TextureFormat> {
        self.desc
            .colors
            .get(index)
            .map(|spec| spec.format.texture_format())
    }

    /// Named attachments, for debug display.
    pub fn attachments(&self) -> impl Iterator<Item = (String, TextureId)> + '_ {
        self.desc
            .colors
            .iter()
            .zip(&self.colors)
            .map(|(spec, id)| (format!("{}.{}", self.desc.label, spec.name), *id))
            .chain(self.depth.map(|id| (format!("{}.depth", self.desc.label), id)))
    }

    /// Opens a pass rendering into every attachment of this target. The pass
    /// ends when the returned encoder is dropped.
    pub fn begin<'a>(
        &self,
        list: &'a mut CommandList,
        label: &str,
        clear_color: Option<wgpu::Color>,
        clear_depth: Option<f32>,
    ) -> PassEncoder<'a> {
        list.begin_pass(PassDesc {
            label: label.to_owned(),
            color: self
                .colors
                .iter()
                .map(|&id| ColorAttachment {
                    view: id.into(),
                    resolve: None,
                    clear: clear_color,
                })
                .collect(),
            depth: self.depth.map(|id| DepthAttachment {
                view: id.into(),
                clear: clear_depth,
            }),
        })
    }

    /// Opens a depth-only pass into one layer of a layered target.
    pub fn begin_layer<'a>(
        &self,
        list: &'a mut CommandList,
        label: &str,
        layer: u32,
        clear_depth: Option<f32>,
    ) -> PassEncoder<'a> {
        list.begin_pass(PassDesc {
            label: label.to_owned(),
            color: Vec::new(),
            depth: self.depth.map(|texture| DepthAttachment {
                view: AttachmentView { texture, layer },
                clear: clear_depth,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::gpu::HeadlessDevice;

    fn scene_desc() -> RenderTargetDesc {
        RenderTargetDesc::new("scene", 64, 32)
            .with_color("color", ColorFormat::Hdr16)
            .with_depth()
            .with_samples(4)
    }

    #[test]
    fn incomplete_descriptions_are_rejected_before_allocation() {
        let mut device = HeadlessDevice::new(8, 8);
        let bad = [
            RenderTargetDesc::new("empty", 8, 8),
            RenderTargetDesc::new("zero", 0, 8).with_depth(),
            RenderTargetDesc::new("stencil", 8, 8).with_stencil(),
            scene_desc().filtered(),
        ];
        for desc in bad {
            let label = desc.label.clone();
            match RenderTarget::create(&mut device, desc) {
                Err(RenderError::TargetValidation { target, .. }) => assert_eq!(target, label),
                other => panic!("expected validation failure for {label}, got {other:?}"),
            }
        }
        assert_eq!(device.live_textures(), 0);
    }

    #[test]
    fn device_failure_releases_partial_attachments() {
        let mut device = HeadlessDevice::new(8, 8);
        device.fail_textures_matching("scene.depth");
        let result = RenderTarget::create(&mut device, scene_desc());
        assert!(matches!(result, Err(RenderError::TargetValidation { .. })));
        assert_eq!(device.live_textures(), 0);
    }

    #[test]
    fn resize_recreates_every_attachment() {
        let mut device = HeadlessDevice::new(8, 8);
        let mut target = RenderTarget::create(&mut device, scene_desc()).unwrap();
        let old_color = target.color(0).unwrap();

        target.resize(&mut device, 128, 96).unwrap();

        assert_eq!(target.size(), (128, 96));
        assert_ne!(target.color(0), Some(old_color));
        assert!(device.texture_desc(old_color).is_none());
        for (_, id) in target.attachments() {
            assert_eq!(device.texture_desc(id).unwrap().size(), (128, 96));
        }
        assert_eq!(device.live_textures(), 2);
    }

    #[test]
    fn failed_resize_keeps_the_old_attachments() {
        let mut device = HeadlessDevice::new(8, 8);
        let mut target = RenderTarget::create(&mut device, scene_desc()).unwrap();
        let color = target.color(0).unwrap();

        device.fail_textures_matching("scene");
        assert!(target.resize(&mut device, 16, 16).is_err());
        assert_eq!(target.color(0), Some(color));
        assert_eq!(target.size(), (64, 32));
        assert_eq!(device.live_textures(), 2);
    }

    #[test]
    fn begin_binds_every_attachment_and_closes_on_drop() {
        let mut device = HeadlessDevice::new(8, 8);
        let target = RenderTarget::create(&mut device, scene_desc()).unwrap();
        let mut list = CommandList::new("Test");
        drop(target.begin(&mut list, "scene", Some(wgpu::Color::BLACK), Some(1.0)));

        match &list.commands()[0] {
            crate::renderer::gpu::GpuCommand::BeginPass(desc) => {
                assert_eq!(desc.color.len(), 1);
                assert_eq!(desc.depth.map(|d| d.clear), Some(Some(1.0)));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(list.commands().len(), 2);
    }
}
