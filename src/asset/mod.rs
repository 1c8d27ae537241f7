pub mod cache;
pub mod handle;
pub mod material;
pub mod mesh;
pub mod primitives;
pub mod texture;

pub use cache::AssetCache;
pub use handle::Handle;
pub use material::{Material, MaterialFlags, TextureSlot};
pub use mesh::{Bounds, Mesh, MeshBuffers, MeshKind};
pub use texture::{SceneTexture, TextureRegistry};

use crate::renderer::gpu::{GpuDevice, GpuError};

/// Mesh, material and texture registries, filled before the first frame.
pub struct Assets {
    pub meshes: AssetCache<Mesh>,
    pub materials: AssetCache<Material>,
    pub textures: TextureRegistry,
    /// Drawn with when neither the component nor the mesh names a material.
    pub default_material: Material,
}

impl Assets {
    pub fn new(device: &mut dyn GpuDevice) -> Result<Self, GpuError> {
        Ok(Self {
            meshes: AssetCache::new(),
            materials: AssetCache::new(),
            textures: TextureRegistry::new(device)?,
            default_material: Material::white(),
        })
    }

    /// Registers a mesh and uploads it right away.
    pub fn add_mesh(
        &mut self,
        device: &mut dyn GpuDevice,
        name: impl Into<String>,
        mut mesh: Mesh,
    ) -> Result<Handle<Mesh>, GpuError> {
        let name = name.into();
        mesh.upload(device, &name)?;
        Ok(self.meshes.insert(name, mesh))
    }

    pub fn add_material(&mut self, name: impl Into<String>, material: Material) -> Handle<Material> {
        self.materials.insert(name, material)
    }

    /// Uploads every mesh registered without an upload.
    pub fn upload_pending(&mut self, device: &mut dyn GpuDevice) -> Result<usize, GpuError> {
        let mut uploaded = 0;
        let pending: Vec<Handle<Mesh>> = self
            .meshes
            .iter()
            .filter(|(_, mesh)| !mesh.is_uploaded())
            .map(|(handle, _)| handle)
            .collect();
        for handle in pending {
            let name = self.meshes.name(handle).unwrap_or("mesh").to_owned();
            if let Some(mesh) = self.meshes.get_mut(handle) {
                mesh.upload(device, &name)?;
                uploaded += 1;
            }
        }
        Ok(uploaded)
    }

    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        for (_, mesh) in self.meshes.iter_mut() {
            mesh.release(device);
        }
        self.textures.release(device);
    }
}
