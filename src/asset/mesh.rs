use glam::Vec3;

use super::{Handle, Material};
use crate::renderer::gpu::{BufferDesc, BufferId, GpuDevice, GpuError};
use crate::renderer::{InstanceRaw, Vertex};

const MIN_INSTANCE_CAPACITY: u32 = 16;

/// Selects the program and draw strategy for a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshKind {
    Standard,
    /// Height-mapped ground; blends by slope and height in the shader.
    Terrain,
    /// Drawn last around the camera with depth writes off. Never casts shadows.
    Sky,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    pub fn from_vertices(vertices: &[Vertex]) -> Self {
        let mut iter = vertices.iter().map(|v| Vec3::from_array(v.pos));
        let Some(first) = iter.next() else {
            return Self {
                min: Vec3::ZERO,
                max: Vec3::ZERO,
            };
        };
        let (min, max) = iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Self { min, max }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }
}

/// GPU-side buffers of an uploaded mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshBuffers {
    pub vertex: BufferId,
    pub index: BufferId,
    pub index_count: u32,
    pub instances: Option<BufferId>,
    pub instance_capacity: u32,
}

#[derive(Debug, Clone)]
pub struct Mesh {
    pub kind: MeshKind,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    pub topology: wgpu::PrimitiveTopology,
    bounds: Bounds,
    /// Used when the mesh component does not override it.
    pub material: Option<Handle<Material>>,
    gpu: Option<MeshBuffers>,
}

impl Mesh {
    pub fn new(kind: MeshKind, vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        let bounds = Bounds::from_vertices(&vertices);
        Self {
            kind,
            vertices,
            indices,
            topology: wgpu::PrimitiveTopology::TriangleList,
            bounds,
            material: None,
            gpu: None,
        }
    }

    pub fn with_material(mut self, material: Handle<Material>) -> Self {
        self.material = Some(material);
        self
    }

    pub fn with_topology(mut self, topology: wgpu::PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn tri_count(&self) -> usize {
        match self.topology {
            wgpu::PrimitiveTopology::TriangleList => self.indices.len() / 3,
            wgpu::PrimitiveTopology::TriangleStrip => self.indices.len().saturating_sub(2),
            _ => 0,
        }
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn is_uploaded(&self) -> bool {
        self.gpu.is_some()
    }

    pub fn buffers(&self) -> Option<&MeshBuffers> {
        self.gpu.as_ref()
    }

    /// Creates the vertex and index buffers. Uploading twice is a no-op.
    pub fn upload(&mut self, device: &mut dyn GpuDevice, label: &str) -> Result<(), GpuError> {
        if self.gpu.is_some() {
            return Ok(());
        }
        if self.vertices.is_empty() || self.indices.is_empty() {
            return Err(GpuError::Validation(format!("mesh '{label}' has no geometry")));
        }

        let vertex_bytes: &[u8] = bytemuck::cast_slice(&self.vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(&self.indices);

        let vertex = device.create_buffer(&BufferDesc {
            label: format!("{label}.vertices"),
            size: vertex_bytes.len() as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        })?;
        let index = match device.create_buffer(&BufferDesc {
            label: format!("{label}.indices"),
            size: index_bytes.len() as u64,
            usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
        }) {
            Ok(index) => index,
            Err(err) => {
                device.destroy_buffer(vertex);
                return Err(err);
            }
        };
        device.write_buffer(vertex, 0, vertex_bytes)?;
        device.write_buffer(index, 0, index_bytes)?;

        log::debug!(
            "Uploaded mesh '{}': {} vertices, {} triangles",
            label,
            self.vertex_count(),
            self.tri_count()
        );

        self.gpu = Some(MeshBuffers {
            vertex,
            index,
            index_count: self.indices.len() as u32,
            instances: None,
            instance_capacity: 0,
        });
        Ok(())
    }

    /// Writes this frame's instance transforms, growing the instance buffer
    /// geometrically when it is too small.
    pub fn write_instances(
        &mut self,
        device: &mut dyn GpuDevice,
        instances: &[InstanceRaw],
    ) -> Result<(), GpuError> {
        let Some(gpu) = self.gpu.as_mut() else {
            return Err(GpuError::Validation("instances written to a mesh that is not uploaded".into()));
        };
        if instances.is_empty() {
            return Ok(());
        }

        let needed = instances.len() as u32;
        if gpu.instances.is_none() || needed > gpu.instance_capacity {
            let capacity = needed.next_power_of_two().max(MIN_INSTANCE_CAPACITY);
            if let Some(old) = gpu.instances.take() {
                device.destroy_buffer(old);
            }
            let buffer = device.create_buffer(&BufferDesc {
                label: "mesh.instances".into(),
                size: capacity as u64 * std::mem::size_of::<InstanceRaw>() as u64,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            })?;
            log::trace!("Instance buffer grown to {} entries", capacity);
            gpu.instances = Some(buffer);
            gpu.instance_capacity = capacity;
        }

        if let Some(buffer) = gpu.instances {
            device.write_buffer(buffer, 0, bytemuck::cast_slice(instances))?;
        }
        Ok(())
    }

    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        if let Some(gpu) = self.gpu.take() {
            device.destroy_buffer(gpu.vertex);
            device.destroy_buffer(gpu.index);
            if let Some(instances) = gpu.instances {
                device.destroy_buffer(instances);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::primitives;
    use crate::renderer::gpu::HeadlessDevice;
    use glam::Mat4;

    #[test]
    fn cube_bounds_and_counts() {
        let (vertices, indices) = primitives::cube_mesh();
        let mesh = Mesh::new(MeshKind::Standard, vertices, indices);
        assert_eq!(mesh.vertex_count(), 24);
        assert_eq!(mesh.tri_count(), 12);
        assert_eq!(mesh.bounds().min, Vec3::splat(-0.5));
        assert_eq!(mesh.bounds().max, Vec3::splat(0.5));
        assert!(!mesh.is_uploaded());
    }

    #[test]
    fn upload_is_idempotent() {
        let mut device = HeadlessDevice::new(4, 4);
        let (vertices, indices) = primitives::cube_mesh();
        let mut mesh = Mesh::new(MeshKind::Standard, vertices, indices);

        mesh.upload(&mut device, "cube").unwrap();
        mesh.upload(&mut device, "cube").unwrap();
        assert_eq!(device.live_buffers(), 2);

        mesh.release(&mut device);
        assert_eq!(device.live_buffers(), 0);
        assert!(!mesh.is_uploaded());
    }

    #[test]
    fn instance_buffer_grows_geometrically() {
        let mut device = HeadlessDevice::new(4, 4);
        let (vertices, indices) = primitives::cube_mesh();
        let mut mesh = Mesh::new(MeshKind::Standard, vertices, indices);
        mesh.upload(&mut device, "cube").unwrap();

        let instances = vec![InstanceRaw::from_matrix(Mat4::IDENTITY); 20];
        mesh.write_instances(&mut device, &instances[..3]).unwrap();
        assert_eq!(mesh.buffers().unwrap().instance_capacity, 16);

        mesh.write_instances(&mut device, &instances).unwrap();
        assert_eq!(mesh.buffers().unwrap().instance_capacity, 32);
        // vertex + index + one instance buffer
        assert_eq!(device.live_buffers(), 3);
    }

    #[test]
    fn instances_need_an_uploaded_mesh() {
        let mut device = HeadlessDevice::new(4, 4);
        let (vertices, indices) = primitives::cube_mesh();
        let mut mesh = Mesh::new(MeshKind::Standard, vertices, indices);
        let instances = [InstanceRaw::from_matrix(Mat4::IDENTITY)];
        assert!(mesh.write_instances(&mut device, &instances).is_err());
    }
}
