// scene/mod.rs

pub mod components;
pub mod hierarchy;
pub mod scene;
pub mod snapshot;
pub mod transform;

pub use components::{
    Active, CameraComponent, Children, LightComponent, MeshComponent, Name, OrbitAnimation,
    Parent, RotateAnimation, TransformComponent, WorldTransform,
};
pub use scene::Scene;
pub use snapshot::{Renderable, SceneSnapshot};
pub use transform::Transform;
