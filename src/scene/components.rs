// scene/components.rs
// Plain hecs components

use glam::{Mat4, Vec3};

use crate::asset::{Handle, Material, Mesh};
use crate::renderer::{CameraId, LightId};
use crate::scene::Transform;

/// Local transform relative to the parent (or the world for roots).
#[derive(Debug, Clone, Copy)]
pub struct TransformComponent(pub Transform);

/// World-space matrix and effective activity, computed from the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldTransform {
    pub matrix: Mat4,
    /// False when this entity or any ancestor is inactive.
    pub active: bool,
}

/// Own activity flag. Entities without one count as active.
#[derive(Debug, Clone, Copy)]
pub struct Active(pub bool);

impl Default for Active {
    fn default() -> Self {
        Self(true)
    }
}

/// Draws `mesh` at the owner's world transform. `material` overrides the
/// mesh's own material.
#[derive(Debug, Clone, Copy)]
pub struct MeshComponent {
    pub mesh: Handle<Mesh>,
    pub material: Option<Handle<Material>>,
}

/// Marks the entity as the owner of a registered light.
#[derive(Debug, Clone, Copy)]
pub struct LightComponent(pub LightId);

/// Marks the entity as the owner of a registered camera.
#[derive(Debug, Clone, Copy)]
pub struct CameraComponent(pub CameraId);

#[derive(Debug, Clone)]
pub struct Name(pub String);

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RotateAnimation {
    pub axis: Vec3,
    /// Radians per second.
    pub speed: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct OrbitAnimation {
    pub center: Vec3,
    pub radius: f32,
    pub speed: f32,
    pub offset: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct Parent(pub hecs::Entity);

#[derive(Debug, Clone, Default)]
pub struct Children(pub Vec<hecs::Entity>);
