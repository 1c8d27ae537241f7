// renderer/batch.rs
use std::collections::HashMap;

use glam::Mat4;

use super::vertex::InstanceRaw;
use crate::asset::{Handle, Material, Mesh};
use crate::scene::Renderable;

/// One instance to draw this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstanceData {
    pub model: Mat4,
}

impl InstanceData {
    pub fn to_raw(&self) -> InstanceRaw {
        InstanceRaw::from_matrix(self.model)
    }
}

/// Every instance of one mesh, in scene order.
#[derive(Debug, Clone)]
pub struct Bucket {
    pub mesh: Handle<Mesh>,
    /// Material override of the first component that reached this bucket.
    pub material: Option<Handle<Material>>,
    pub instances: Vec<InstanceData>,
}

/// Mesh -> ordered instances. Buckets appear in the order their mesh was
/// first seen, so rebuilding from the same scene yields the same batch.
#[derive(Debug, Default)]
pub struct FrameBatch {
    buckets: Vec<Bucket>,
    lookup: HashMap<Handle<Mesh>, usize>,
}

impl FrameBatch {
    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn bucket(&self, mesh: Handle<Mesh>) -> Option<&Bucket> {
        self.lookup.get(&mesh).map(|&index| &self.buckets[index])
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn instance_count(&self) -> usize {
        self.buckets.iter().map(|b| b.instances.len()).sum()
    }

    fn clear(&mut self) {
        self.buckets.clear();
        self.lookup.clear();
    }

    fn push(&mut self, renderable: &Renderable) {
        let instance = InstanceData {
            model: renderable.world,
        };
        match self.lookup.get(&renderable.mesh) {
            Some(&index) => {
                let bucket = &mut self.buckets[index];
                if bucket.material != renderable.material {
                    log::trace!(
                        "{:?} uses {:?} but its bucket draws with {:?}",
                        renderable.entity,
                        renderable.material,
                        bucket.material
                    );
                }
                bucket.instances.push(instance);
            }
            None => {
                self.lookup.insert(renderable.mesh, self.buckets.len());
                self.buckets.push(Bucket {
                    mesh: renderable.mesh,
                    material: renderable.material,
                    instances: vec![instance],
                });
            }
        }
    }
}

/// Groups the committed renderables into per-mesh instance lists.
#[derive(Default)]
pub struct FrameBatcher {
    batch: FrameBatch,
}

impl FrameBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the previous batch and rebuilds it. Inactive renderables are
    /// skipped. Touches no GPU state.
    pub fn build_batch(&mut self, renderables: &[Renderable]) -> &FrameBatch {
        self.batch.clear();
        for renderable in renderables.iter().filter(|r| r.active) {
            self.batch.push(renderable);
        }
        log::trace!(
            "Batched {} instances into {} buckets",
            self.batch.instance_count(),
            self.batch.len()
        );
        &self.batch
    }

    pub fn batch(&self) -> &FrameBatch {
        &self.batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn renderable(world: &mut hecs::World, mesh: usize, x: f32, active: bool) -> Renderable {
        Renderable {
            entity: world.spawn(()),
            mesh: Handle::new(mesh),
            material: None,
            world: Mat4::from_translation(Vec3::new(x, 0.0, 0.0)),
            active,
        }
    }

    #[test]
    fn groups_by_mesh_in_first_seen_order() {
        let mut world = hecs::World::new();
        let renderables = [
            renderable(&mut world, 7, 1.0, true),
            renderable(&mut world, 3, 2.0, true),
            renderable(&mut world, 7, 3.0, true),
        ];

        let mut batcher = FrameBatcher::new();
        let batch = batcher.build_batch(&renderables);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.buckets()[0].mesh, Handle::new(7));
        let xs: Vec<f32> = batch.buckets()[0]
            .instances
            .iter()
            .map(|i| i.model.w_axis.x)
            .collect();
        assert_eq!(xs, vec![1.0, 3.0]);
        assert_eq!(batch.bucket(Handle::new(3)).unwrap().instances.len(), 1);
    }

    #[test]
    fn inactive_renderables_are_skipped() {
        let mut world = hecs::World::new();
        let renderables = [
            renderable(&mut world, 1, 0.0, false),
            renderable(&mut world, 2, 0.0, true),
        ];
        let mut batcher = FrameBatcher::new();
        let batch = batcher.build_batch(&renderables);
        assert_eq!(batch.len(), 1);
        assert!(batch.bucket(Handle::new(1)).is_none());
    }

    #[test]
    fn rebuilding_unchanged_state_is_bitwise_identical() {
        let mut world = hecs::World::new();
        let mut renderables: Vec<Renderable> = (0..12)
            .map(|i| renderable(&mut world, i % 3, i as f32 * 0.37, i % 5 != 0))
            .collect();
        for (i, r) in renderables.iter_mut().enumerate() {
            r.world *= Mat4::from_rotation_y(i as f32 * 0.91);
        }

        let mut batcher = FrameBatcher::new();
        let first: Vec<Bucket> = batcher.build_batch(&renderables).buckets().to_vec();
        let second: Vec<Bucket> = batcher.build_batch(&renderables).buckets().to_vec();

        let meshes = |b: &[Bucket]| b.iter().map(|b| b.mesh).collect::<Vec<_>>();
        assert_eq!(meshes(&first), meshes(&second));
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.instances, b.instances);
            let bits = |bucket: &Bucket| {
                bucket
                    .instances
                    .iter()
                    .flat_map(|i| i.model.to_cols_array().map(f32::to_bits))
                    .collect::<Vec<u32>>()
            };
            assert_eq!(bits(a), bits(b));
        }
    }

    #[test]
    fn rebuild_replaces_the_previous_batch() {
        let mut world = hecs::World::new();
        let first = [renderable(&mut world, 1, 0.0, true)];
        let second = [renderable(&mut world, 2, 0.0, true)];

        let mut batcher = FrameBatcher::new();
        batcher.build_batch(&first);
        let batch = batcher.build_batch(&second);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.instance_count(), 1);
        assert!(batch.bucket(Handle::new(1)).is_none());
        assert!(batcher.build_batch(&[]).is_empty());
    }
}
