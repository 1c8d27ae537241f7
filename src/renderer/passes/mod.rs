//! The passes a frame is made of, and the context they share.
//!
//! Every pass records into its own [`CommandList`]; the pipeline submits the
//! list and collects driver errors under the pass name.

mod canvas;
mod deferred;
mod forward;
mod postprocess;
mod resolve;
mod shadow;

pub use canvas::CanvasPass;
pub use deferred::{GeometryPass, LightingPass};
pub use forward::ForwardOpaquePass;
pub use postprocess::PostProcessPass;
pub use resolve::MsaaResolvePass;
pub use shadow::ShadowPass;

use std::collections::HashMap;

use super::batch::{Bucket, FrameBatch};
use super::error::RenderError;
use super::gpu::{
    BufferDesc, BufferId, CommandList, GpuDevice, PassEncoder, ProgramId, TextureId, TextureSetId,
};
use super::lights::FrameLights;
use super::overlay::{Canvas, DebugLines};
use super::programs::ShaderPrograms;
use super::stats::FrameStats;
use super::targets::{FrameTargets, RenderTargetManager, ShadowTargets};
use super::uniforms::{DrawUniform, FrameUniform};
use crate::asset::{Assets, Material, Mesh, MeshKind, TextureSlot};

/// Shared WGSL declarations prepended to the lit shaders.
macro_rules! lit_shader {
    ($file:literal) => {
        concat!(
            include_str!("../../shader/common.wgsl"),
            "\n",
            include_str!($file)
        )
    };
}
pub(crate) use lit_shader;

/// Per-frame values latched before the first pass runs.
#[derive(Debug, Clone, Copy)]
pub struct FrameParams {
    pub clear_color: wgpu::Color,
    pub exposure: f32,
    pub post_processing: bool,
}

/// Everything a pass may read or consume while recording.
pub struct FrameContext<'a> {
    pub device: &'a mut dyn GpuDevice,
    pub targets: &'a RenderTargetManager,
    pub programs: &'a mut ShaderPrograms,
    pub assets: &'a Assets,
    pub batch: &'a FrameBatch,
    pub lights: &'a FrameLights,
    pub frame_uniform: &'a FrameUniform,
    pub canvas: &'a mut Canvas,
    pub lines: &'a mut DebugLines,
    pub params: FrameParams,
    pub stats: &'a mut FrameStats,
}

impl FrameContext<'_> {
    pub fn frame_targets(&self) -> Result<&FrameTargets, RenderError> {
        self.targets.frame().ok_or(RenderError::TargetsMissing)
    }

    pub fn shadow_targets(&self) -> Result<&ShadowTargets, RenderError> {
        self.targets.shadows().ok_or(RenderError::TargetsMissing)
    }
}

/// One stage of the frame.
pub trait RenderPass {
    fn name(&self) -> &'static str;

    /// Disabled passes are not invoked and issue no GPU work.
    fn enabled(&self, _params: &FrameParams) -> bool {
        true
    }

    fn execute(
        &mut self,
        ctx: &mut FrameContext<'_>,
        list: &mut CommandList,
    ) -> Result<(), RenderError>;

    /// Frees GPU objects the pass created for itself.
    fn release(&mut self, _device: &mut dyn GpuDevice) {}

    /// Called for every pass, enabled or not, once render targets have been
    /// recreated. Sets bound to the old targets must be dropped here.
    fn targets_changed(&mut self, _device: &mut dyn GpuDevice, _generation: u64) {}
}

/// Buffers of one uploaded mesh, ready to draw.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MeshDraw {
    pub vertex: BufferId,
    pub index: BufferId,
    pub instances: BufferId,
    pub index_count: u32,
    pub instance_count: u32,
}

impl MeshDraw {
    pub fn record(&self, pass: &mut PassEncoder<'_>) {
        pass.set_vertex_buffer(0, self.vertex);
        pass.set_vertex_buffer(1, self.instances);
        pass.set_index_buffer(self.index);
        pass.draw_indexed(0..self.index_count, 0..self.instance_count);
    }
}

/// Looks up a bucket's mesh. A mesh that is missing or was never uploaded is
/// a precondition violation.
pub(crate) fn mesh_draw<'m>(
    assets: &'m Assets,
    bucket: &Bucket,
) -> Result<(&'m Mesh, MeshDraw), RenderError> {
    let not_uploaded = || RenderError::MeshNotUploaded {
        mesh: bucket.mesh.index(),
    };
    let mesh = assets.meshes.get(bucket.mesh).ok_or_else(not_uploaded)?;
    let buffers = mesh.buffers().ok_or_else(not_uploaded)?;
    let instances = buffers.instances.ok_or_else(not_uploaded)?;
    Ok((
        mesh,
        MeshDraw {
            vertex: buffers.vertex,
            index: buffers.index,
            instances,
            index_count: buffers.index_count,
            instance_count: bucket.instances.len() as u32,
        },
    ))
}

/// The material a bucket draws with: the component override, then the mesh
/// default, then the registry default.
pub(crate) fn bucket_material<'m>(assets: &'m Assets, bucket: &Bucket, mesh: &Mesh) -> &'m Material {
    let handle = bucket.material.or(mesh.material);
    match handle.and_then(|h| assets.materials.get(h)) {
        Some(material) => material,
        None => {
            if let Some(handle) = handle {
                log::debug!("Material #{} is missing, using default", handle.index());
            }
            &assets.default_material
        }
    }
}

pub(crate) fn kind_index(kind: MeshKind) -> f32 {
    match kind {
        MeshKind::Standard => 0.0,
        MeshKind::Terrain => 1.0,
        MeshKind::Sky => 2.0,
    }
}

/// Resolves every texture slot of `material`, plus the mask of slots bound
/// to a real scene texture.
pub(crate) fn material_textures(
    assets: &Assets,
    material: &Material,
) -> ([TextureId; TextureSlot::COUNT], u32) {
    let textures = &assets.textures;
    let ids = TextureSlot::ALL.map(|slot| textures.resolve(slot, material.texture(slot)));
    let mask = TextureSlot::ALL
        .iter()
        .enumerate()
        .filter(|(_, slot)| {
            material
                .texture(**slot)
                .is_some_and(|index| textures.get(index).is_some())
        })
        .fold(0u32, |mask, (bit, _)| mask | (1 << bit));
    (ids, mask)
}

pub(crate) fn draw_uniform(material: &Material, kind: MeshKind, texture_mask: u32) -> DrawUniform {
    DrawUniform {
        base_color: material.base_color.to_array(),
        emissive_roughness: material.emissive.extend(material.roughness).to_array(),
        params: [
            material.metallic,
            material.ao_strength,
            material.height_scale,
            kind_index(kind),
        ],
        flags: [texture_mask, material.flags.bits(), 0, 0],
    }
}

/// Program name for a lit mesh program. Everything that changes pipeline
/// state is part of the name.
pub(crate) fn mesh_program_key(prefix: &str, mesh: &Mesh, material: &Material) -> String {
    format!(
        "{prefix}.{:?}.{:?}.{:?}.{:?}",
        mesh.kind,
        material.cull_mode(),
        material.polygon_mode(),
        material.topology.unwrap_or(mesh.topology)
    )
}

/// A texture set that depends on render targets. It is rebuilt whenever the
/// target generation moves.
#[derive(Default)]
pub(crate) struct TargetBoundSet {
    sets: HashMap<ProgramId, (u64, TextureSetId)>,
}

impl TargetBoundSet {
    pub fn get(
        &mut self,
        device: &mut dyn GpuDevice,
        generation: u64,
        program: ProgramId,
        group: u32,
        textures: &[TextureId],
    ) -> Result<TextureSetId, RenderError> {
        if let Some(&(built, set)) = self.sets.get(&program) {
            if built == generation {
                return Ok(set);
            }
            device.destroy_texture_set(set);
            self.sets.remove(&program);
        }
        let set = device.create_texture_set(program, group, textures)?;
        log::trace!("Texture set for group {} rebuilt at generation {}", group, generation);
        self.sets.insert(program, (generation, set));
        Ok(set)
    }

    /// Destroys every set built before `generation`.
    pub fn drop_stale(&mut self, device: &mut dyn GpuDevice, generation: u64) {
        self.sets.retain(|_, &mut (built, set)| {
            if built == generation {
                return true;
            }
            device.destroy_texture_set(set);
            false
        });
    }

    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        for (_, (_, set)) in self.sets.drain() {
            device.destroy_texture_set(set);
        }
    }
}

/// Texture sets of fixed scene textures, keyed by program and contents.
#[derive(Default)]
pub(crate) struct TextureSetCache {
    sets: HashMap<(ProgramId, Vec<TextureId>), TextureSetId>,
}

impl TextureSetCache {
    pub fn get(
        &mut self,
        device: &mut dyn GpuDevice,
        program: ProgramId,
        group: u32,
        textures: &[TextureId],
    ) -> Result<TextureSetId, RenderError> {
        let key = (program, textures.to_vec());
        if let Some(set) = self.sets.get(&key) {
            return Ok(*set);
        }
        let set = device.create_texture_set(program, group, textures)?;
        self.sets.insert(key, set);
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        for (_, set) in self.sets.drain() {
            device.destroy_texture_set(set);
        }
    }
}

/// A vertex or index buffer rewritten every frame and grown geometrically.
pub(crate) struct StreamBuffer {
    label: &'static str,
    usage: wgpu::BufferUsages,
    buffer: Option<BufferId>,
    capacity: u64,
}

const MIN_STREAM_CAPACITY: u64 = 4096;

impl StreamBuffer {
    pub fn new(label: &'static str, usage: wgpu::BufferUsages) -> Self {
        Self {
            label,
            usage: usage | wgpu::BufferUsages::COPY_DST,
            buffer: None,
            capacity: 0,
        }
    }

    pub fn write(&mut self, device: &mut dyn GpuDevice, data: &[u8]) -> Result<BufferId, RenderError> {
        let needed = data.len() as u64;
        let buffer = match self.buffer {
            Some(buffer) if needed <= self.capacity => buffer,
            _ => {
                let capacity = needed.next_power_of_two().max(MIN_STREAM_CAPACITY);
                let buffer = device.create_buffer(&BufferDesc {
                    label: self.label.to_owned(),
                    size: capacity,
                    usage: self.usage,
                })?;
                if let Some(old) = self.buffer.replace(buffer) {
                    device.destroy_buffer(old);
                }
                log::debug!("Stream buffer '{}' grown to {} bytes", self.label, capacity);
                self.capacity = capacity;
                buffer
            }
        };
        device.write_buffer(buffer, 0, data)?;
        Ok(buffer)
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        if let Some(buffer) = self.buffer.take() {
            device.destroy_buffer(buffer);
        }
        self.capacity = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{primitives, Handle};
    use crate::renderer::batch::InstanceData;
    use crate::renderer::gpu::HeadlessDevice;
    use glam::{Mat4, Vec4};

    fn assets_with_cube(device: &mut HeadlessDevice) -> (Assets, Handle<Mesh>) {
        let mut assets = Assets::new(device).unwrap();
        let (vertices, indices) = primitives::cube_mesh();
        let cube = assets
            .add_mesh(device, "cube", Mesh::new(MeshKind::Standard, vertices, indices))
            .unwrap();
        (assets, cube)
    }

    fn bucket(mesh: Handle<Mesh>, material: Option<Handle<Material>>) -> Bucket {
        Bucket {
            mesh,
            material,
            instances: vec![InstanceData {
                model: Mat4::IDENTITY,
            }],
        }
    }

    #[test]
    fn mesh_without_instances_is_not_drawable() {
        let mut device = HeadlessDevice::new(8, 8);
        let (assets, cube) = assets_with_cube(&mut device);
        let err = mesh_draw(&assets, &bucket(cube, None)).unwrap_err();
        assert!(matches!(err, RenderError::MeshNotUploaded { mesh } if mesh == cube.index()));
    }

    #[test]
    fn component_override_wins_over_mesh_material() {
        let mut device = HeadlessDevice::new(8, 8);
        let (mut assets, cube) = assets_with_cube(&mut device);
        let red = assets.add_material("red", Material::rgb(1.0, 0.0, 0.0));
        let blue = assets.add_material("blue", Material::rgb(0.0, 0.0, 1.0));
        assets.meshes.get_mut(cube).unwrap().material = Some(blue);

        let mesh = assets.meshes.get(cube).unwrap();
        let chosen = bucket_material(&assets, &bucket(cube, Some(red)), mesh);
        assert_eq!(chosen.base_color, Vec4::new(1.0, 0.0, 0.0, 1.0));
        let fallback = bucket_material(&assets, &bucket(cube, None), mesh);
        assert_eq!(fallback.base_color, Vec4::new(0.0, 0.0, 1.0, 1.0));
    }

    #[test]
    fn out_of_range_textures_fall_back_and_leave_mask_clear() {
        let mut device = HeadlessDevice::new(8, 8);
        let (mut assets, _) = assets_with_cube(&mut device);
        let index = assets
            .textures
            .load_rgba8(&mut device, "bricks", 1, 1, &[1, 2, 3, 4])
            .unwrap();
        let material = Material::white()
            .with_texture(TextureSlot::BaseColor, index)
            .with_texture(TextureSlot::Normal, 42);

        let (ids, mask) = material_textures(&assets, &material);
        assert_eq!(mask, 1);
        assert_eq!(ids[TextureSlot::Normal as usize], assets.textures.default_for(TextureSlot::Normal));
        assert_eq!(ids[TextureSlot::BaseColor as usize], assets.textures.get(index).unwrap().id);
    }

    #[test]
    fn stream_buffer_grows_by_powers_of_two() {
        let mut device = HeadlessDevice::new(8, 8);
        let mut stream = StreamBuffer::new("test.stream", wgpu::BufferUsages::VERTEX);
        let first = stream.write(&mut device, &[0u8; 16]).unwrap();
        assert_eq!(stream.capacity(), MIN_STREAM_CAPACITY);
        assert_eq!(stream.write(&mut device, &[0u8; 100]).unwrap(), first);

        let grown = stream.write(&mut device, &vec![0u8; 5000]).unwrap();
        assert_ne!(grown, first);
        assert_eq!(stream.capacity(), 8192);
        assert_eq!(device.live_buffers(), 1);
    }

    #[test]
    fn target_bound_sets_follow_the_generation() {
        let mut device = HeadlessDevice::new(8, 8);
        let program = device
            .create_program(
                &crate::renderer::gpu::ProgramDesc::new("p", "")
                    .with_color_target(wgpu::TextureFormat::Rgba8Unorm, None)
                    .with_texture_group(vec![crate::renderer::gpu::TextureSlotKind::Color]),
            )
            .unwrap();
        let texture = device
            .create_texture(&crate::renderer::gpu::TextureDesc::new(
                "t",
                1,
                1,
                wgpu::TextureFormat::Rgba8Unorm,
            ))
            .unwrap();

        let mut cached = TargetBoundSet::default();
        let a = cached.get(&mut device, 1, program, 1, &[texture]).unwrap();
        let b = cached.get(&mut device, 1, program, 1, &[texture]).unwrap();
        assert_eq!(a, b);
        let c = cached.get(&mut device, 2, program, 1, &[texture]).unwrap();
        assert_ne!(a, c);
        assert_eq!(device.live_texture_sets(), 1);

        cached.drop_stale(&mut device, 2);
        assert_eq!(device.live_texture_sets(), 1);
        cached.drop_stale(&mut device, 3);
        assert_eq!(device.live_texture_sets(), 0);
    }
}
