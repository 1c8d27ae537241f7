use bitflags::bitflags;
use glam::{Vec3, Vec4};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MaterialFlags: u32 {
        /// Disables back-face culling.
        const DOUBLE_SIDED = 1 << 0;
        /// Skips lighting; the base color is written as-is.
        const UNLIT = 1 << 1;
        /// Rasterizes edges only.
        const WIREFRAME = 1 << 2;
    }
}

/// Texture slots a material can reference, in binding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    BaseColor = 0,
    Normal = 1,
    Occlusion = 2,
    Roughness = 3,
    Metallic = 4,
    Height = 5,
}

impl TextureSlot {
    pub const COUNT: usize = 6;

    pub const ALL: [TextureSlot; Self::COUNT] = [
        TextureSlot::BaseColor,
        TextureSlot::Normal,
        TextureSlot::Occlusion,
        TextureSlot::Roughness,
        TextureSlot::Metallic,
        TextureSlot::Height,
    ];
}

/// Surface description shared by reference between mesh components.
///
/// Texture slots hold scene texture indices; an empty or out-of-range slot
/// samples the default texture for that slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub base_color: Vec4,
    pub emissive: Vec3,
    pub roughness: f32,
    pub metallic: f32,
    pub ao_strength: f32,
    pub height_scale: f32,
    pub textures: [Option<u32>; TextureSlot::COUNT],
    pub flags: MaterialFlags,
    /// Overrides the mesh topology when set.
    pub topology: Option<wgpu::PrimitiveTopology>,
}

impl Material {
    pub fn new(base_color: Vec4) -> Self {
        Self {
            base_color,
            emissive: Vec3::ZERO,
            roughness: 0.5,
            metallic: 0.0,
            ao_strength: 1.0,
            height_scale: 0.0,
            textures: [None; TextureSlot::COUNT],
            flags: MaterialFlags::empty(),
            topology: None,
        }
    }

    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::new(Vec4::new(r, g, b, 1.0))
    }

    pub fn white() -> Self {
        Self::rgb(1.0, 1.0, 1.0)
    }

    pub fn with_texture(mut self, slot: TextureSlot, index: u32) -> Self {
        self.textures[slot as usize] = Some(index);
        self
    }

    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness.clamp(0.0, 1.0);
        self
    }

    pub fn with_metallic(mut self, metallic: f32) -> Self {
        self.metallic = metallic.clamp(0.0, 1.0);
        self
    }

    pub fn with_emissive(mut self, emissive: Vec3) -> Self {
        self.emissive = emissive;
        self
    }

    pub fn with_flags(mut self, flags: MaterialFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn with_topology(mut self, topology: wgpu::PrimitiveTopology) -> Self {
        self.topology = Some(topology);
        self
    }

    pub fn texture(&self, slot: TextureSlot) -> Option<u32> {
        self.textures[slot as usize]
    }

    pub fn cull_mode(&self) -> Option<wgpu::Face> {
        if self.flags.contains(MaterialFlags::DOUBLE_SIDED) {
            None
        } else {
            Some(wgpu::Face::Back)
        }
    }

    pub fn polygon_mode(&self) -> wgpu::PolygonMode {
        if self.flags.contains(MaterialFlags::WIREFRAME) {
            wgpu::PolygonMode::Line
        } else {
            wgpu::PolygonMode::Fill
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::white()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_drive_raster_state() {
        let material = Material::white().with_flags(MaterialFlags::DOUBLE_SIDED | MaterialFlags::WIREFRAME);
        assert_eq!(material.cull_mode(), None);
        assert_eq!(material.polygon_mode(), wgpu::PolygonMode::Line);
        assert_eq!(Material::default().cull_mode(), Some(wgpu::Face::Back));
    }

    #[test]
    fn texture_slots_are_independent() {
        let material = Material::white()
            .with_texture(TextureSlot::Normal, 3)
            .with_texture(TextureSlot::Height, 7);
        assert_eq!(material.texture(TextureSlot::Normal), Some(3));
        assert_eq!(material.texture(TextureSlot::Height), Some(7));
        assert_eq!(material.texture(TextureSlot::BaseColor), None);
    }
}
