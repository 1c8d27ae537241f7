use std::collections::HashMap;

use glam::Mat4;

use crate::asset::{Handle, Material, Mesh};
use crate::scene::components::WorldTransform;

/// One mesh component as committed at the end of a simulation step.
#[derive(Debug, Clone, Copy)]
pub struct Renderable {
    pub entity: hecs::Entity,
    pub mesh: Handle<Mesh>,
    pub material: Option<Handle<Material>>,
    pub world: Mat4,
    pub active: bool,
}

/// The committed scene state the renderer reads while the next simulation
/// step runs.
#[derive(Debug, Clone, Default)]
pub struct SceneSnapshot {
    pub renderables: Vec<Renderable>,
    transforms: HashMap<hecs::Entity, WorldTransform>,
}

impl SceneSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.renderables.clear();
        self.transforms.clear();
    }

    pub fn world_transform(&self, entity: hecs::Entity) -> Option<WorldTransform> {
        self.transforms.get(&entity).copied()
    }

    pub fn insert_transform(&mut self, entity: hecs::Entity, world: WorldTransform) {
        self.transforms.insert(entity, world);
    }

    pub fn is_empty(&self) -> bool {
        self.renderables.is_empty()
    }
}
