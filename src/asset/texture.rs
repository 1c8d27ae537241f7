use super::material::TextureSlot;
use crate::renderer::gpu::{GpuDevice, GpuError, TextureDesc, TextureId};

#[derive(Debug, Clone)]
pub struct SceneTexture {
    pub name: String,
    pub id: TextureId,
    pub width: u32,
    pub height: u32,
}

/// Scene textures addressed by index, plus the 1x1 defaults every material
/// slot falls back to.
pub struct TextureRegistry {
    textures: Vec<SceneTexture>,
    white: TextureId,
    flat_normal: TextureId,
}

impl TextureRegistry {
    pub fn new(device: &mut dyn GpuDevice) -> Result<Self, GpuError> {
        let white = create_rgba8(device, "default.white", 1, 1, &[255, 255, 255, 255])?;
        let flat_normal = create_rgba8(device, "default.normal", 1, 1, &[128, 128, 255, 255])?;
        Ok(Self {
            textures: Vec::new(),
            white,
            flat_normal,
        })
    }

    /// Uploads tightly packed RGBA8 texels and returns the scene texture index.
    pub fn load_rgba8(
        &mut self,
        device: &mut dyn GpuDevice,
        name: impl Into<String>,
        width: u32,
        height: u32,
        texels: &[u8],
    ) -> Result<u32, GpuError> {
        let name = name.into();
        let id = create_rgba8(device, &name, width, height, texels)?;
        let index = self.textures.len() as u32;
        log::debug!("Loaded texture #{} '{}' ({}x{})", index, name, width, height);
        self.textures.push(SceneTexture {
            name,
            id,
            width,
            height,
        });
        Ok(index)
    }

    pub fn get(&self, index: u32) -> Option<&SceneTexture> {
        self.textures.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    pub fn default_for(&self, slot: TextureSlot) -> TextureId {
        match slot {
            TextureSlot::Normal => self.flat_normal,
            _ => self.white,
        }
    }

    /// The texture to bind for `slot`. Missing or out-of-range indices fall
    /// back to the slot default.
    pub fn resolve(&self, slot: TextureSlot, index: Option<u32>) -> TextureId {
        match index {
            None => self.default_for(slot),
            Some(index) => match self.get(index) {
                Some(texture) => texture.id,
                None => {
                    log::debug!(
                        "Texture #{} for {:?} is out of range ({} loaded), using default",
                        index,
                        slot,
                        self.textures.len()
                    );
                    self.default_for(slot)
                }
            },
        }
    }

    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        for texture in self.textures.drain(..) {
            device.destroy_texture(texture.id);
        }
        device.destroy_texture(self.white);
        device.destroy_texture(self.flat_normal);
    }
}

fn create_rgba8(
    device: &mut dyn GpuDevice,
    label: &str,
    width: u32,
    height: u32,
    texels: &[u8],
) -> Result<TextureId, GpuError> {
    let desc = TextureDesc::new(label, width, height, wgpu::TextureFormat::Rgba8UnormSrgb);
    let id = device.create_texture(&desc)?;
    if let Err(err) = device.write_texture(id, texels, width * 4) {
        device.destroy_texture(id);
        return Err(err);
    }
    Ok(id)
}
