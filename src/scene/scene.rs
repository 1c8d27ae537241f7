// scene/scene.rs
use glam::{Quat, Vec3};
use hecs::World;
use rayon::prelude::*;

use super::components::*;
use super::hierarchy;
use super::snapshot::{Renderable, SceneSnapshot};
use super::Transform;
use crate::asset::{Handle, Material, Mesh};
use crate::renderer::{Camera, CameraId, CameraRegistry, Light, LightId, LightRegistry};

/// Entity arena holding everything the simulation moves.
pub struct Scene {
    pub world: World,
    time: f64,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            world: World::new(),
            time: 0.0,
        }
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn spawn(&mut self, name: impl Into<String>, transform: Transform) -> hecs::Entity {
        self.world
            .spawn((Name::new(name), TransformComponent(transform)))
    }

    pub fn spawn_mesh(
        &mut self,
        name: impl Into<String>,
        transform: Transform,
        mesh: Handle<Mesh>,
        material: Option<Handle<Material>>,
    ) -> hecs::Entity {
        self.world.spawn((
            Name::new(name),
            TransformComponent(transform),
            MeshComponent { mesh, material },
        ))
    }

    /// Spawns an entity owning a new light registered under `name`.
    pub fn spawn_light(
        &mut self,
        lights: &mut LightRegistry,
        name: impl Into<String>,
        transform: Transform,
        light: Light,
    ) -> (hecs::Entity, LightId) {
        let name = name.into();
        let entity = self.spawn(name.clone(), transform);
        let id = lights.create(name, light.attached_to(entity));
        self.attach(entity, LightComponent(id), "light");
        (entity, id)
    }

    /// Spawns an entity carrying a new camera registered under `name`.
    pub fn spawn_camera(
        &mut self,
        cameras: &mut CameraRegistry,
        name: impl Into<String>,
        transform: Transform,
        camera: Camera,
    ) -> (hecs::Entity, CameraId) {
        let name = name.into();
        let entity = self.spawn(name.clone(), transform);
        let eye_offset = camera.eye_offset;
        let id = cameras.create(name, camera.attached_to(entity, eye_offset));
        self.attach(entity, CameraComponent(id), "camera");
        (entity, id)
    }

    pub fn set_parent(&mut self, child: hecs::Entity, parent: hecs::Entity) -> bool {
        hierarchy::set_parent(&mut self.world, child, parent)
    }

    /// Returns false when the entity no longer exists.
    pub fn set_active(&mut self, entity: hecs::Entity, active: bool) -> bool {
        self.attach(entity, Active(active), "activity")
    }

    pub fn transform_mut(&mut self, entity: hecs::Entity) -> Option<hecs::RefMut<'_, TransformComponent>> {
        self.world.get::<&mut TransformComponent>(entity).ok()
    }

    pub fn add_rotation(&mut self, entity: hecs::Entity, axis: Vec3, speed: f32) -> bool {
        let axis = axis.normalize_or(Vec3::Y);
        self.attach(entity, RotateAnimation { axis, speed }, "rotation")
    }

    pub fn add_orbit(&mut self, entity: hecs::Entity, orbit: OrbitAnimation) -> bool {
        self.attach(entity, orbit, "orbit")
    }

    fn attach(&mut self, entity: hecs::Entity, component: impl hecs::Component, what: &str) -> bool {
        match self.world.insert_one(entity, component) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Cannot attach {} to {:?}: {:?}", what, entity, e);
                false
            }
        }
    }

    /// Advances one simulation step and commits world transforms.
    pub fn update(&mut self, dt: f64) {
        self.time += dt;

        self.system_rotate_animation(dt);
        self.system_orbit_animation();

        // Always after the systems that move things.
        self.commit();
    }

    /// Recomputes world transforms and activity without advancing time.
    pub fn commit(&mut self) {
        hierarchy::propagate_transforms(&mut self.world);
    }

    /// Copies the committed state into `snapshot`, reusing its storage.
    /// Meshes spawned since the last commit have no world transform yet and
    /// are left out.
    pub fn snapshot_into(&self, snapshot: &mut SceneSnapshot) {
        snapshot.clear();
        for (entity, world) in self.world.query::<&WorldTransform>().iter() {
            snapshot.insert_transform(entity, *world);
        }
        for (entity, (mesh, world)) in self
            .world
            .query::<(&MeshComponent, &WorldTransform)>()
            .iter()
        {
            snapshot.renderables.push(Renderable {
                entity,
                mesh: mesh.mesh,
                material: mesh.material,
                world: world.matrix,
                active: world.active,
            });
        }
    }

    pub fn snapshot(&self) -> SceneSnapshot {
        let mut snapshot = SceneSnapshot::new();
        self.snapshot_into(&mut snapshot);
        snapshot
    }

    fn system_rotate_animation(&mut self, dt: f64) {
        let entities: Vec<_> = self
            .world
            .query::<(&TransformComponent, &RotateAnimation)>()
            .iter()
            .map(|(entity, (transform, anim))| (entity, transform.0, *anim))
            .collect();

        let updates: Vec<_> = entities
            .par_iter()
            .map(|(entity, transform, anim)| {
                let rotation = Quat::from_axis_angle(anim.axis, anim.speed * dt as f32);
                (*entity, (rotation * transform.rotation).normalize())
            })
            .collect();

        for (entity, rotation) in updates {
            if let Ok(mut transform) = self.world.get::<&mut TransformComponent>(entity) {
                transform.0.rotation = rotation;
            }
        }
    }

    fn system_orbit_animation(&mut self) {
        let time = self.time as f32;
        for (_entity, (transform, orbit)) in self
            .world
            .query_mut::<(&mut TransformComponent, &OrbitAnimation)>()
        {
            let angle = time * orbit.speed + orbit.offset;
            transform.0.translation = orbit.center
                + Vec3::new(angle.cos() * orbit.radius, 0.0, angle.sin() * orbit.radius);
        }
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_carries_world_matrices_and_activity() {
        let mut scene = Scene::new();
        let mesh = Handle::new(0);
        let parent = scene.spawn("parent", Transform::from_translation(Vec3::X));
        let child = scene.spawn_mesh("child", Transform::from_translation(Vec3::Y), mesh, None);
        scene.set_parent(child, parent);
        scene.update(0.0);

        let snapshot = scene.snapshot();
        assert_eq!(snapshot.renderables.len(), 1);
        let renderable = snapshot.renderables[0];
        assert!(renderable.active);
        assert!(renderable
            .world
            .w_axis
            .truncate()
            .abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-6));

        scene.set_active(parent, false);
        scene.update(0.0);
        assert!(!scene.snapshot().renderables[0].active);
    }

    #[test]
    fn spawned_lights_are_owned_by_their_entity() {
        let mut scene = Scene::new();
        let mut lights = LightRegistry::new();
        let (entity, id) = scene.spawn_light(
            &mut lights,
            "lamp",
            Transform::from_translation(Vec3::new(0.0, 3.0, 0.0)),
            Light::point(Vec3::ZERO, 10.0),
        );
        assert_eq!(lights.get(id).and_then(|l| l.owner), Some(entity));
        assert_eq!(lights.get_by_name("lamp"), Some(id));
    }

    #[test]
    fn uncommitted_meshes_stay_out_of_the_snapshot() {
        let mut scene = Scene::new();
        scene.spawn_mesh("fresh", Transform::from_translation(Vec3::Z), Handle::new(0), None);
        assert!(scene.snapshot().is_empty());

        scene.commit();
        assert_eq!(scene.snapshot().renderables.len(), 1);
    }

    #[test]
    fn components_on_despawned_entities_are_rejected() {
        let mut scene = Scene::new();
        let gone = scene.spawn("gone", Transform::IDENTITY);
        scene.world.despawn(gone).unwrap();

        assert!(!scene.set_active(gone, false));
        assert!(!scene.add_rotation(gone, Vec3::Y, 1.0));

        let kept = scene.spawn("kept", Transform::IDENTITY);
        assert!(scene.add_rotation(kept, Vec3::Y, 1.0));
    }

    #[test]
    fn rotation_system_spins_entities() {
        let mut scene = Scene::new();
        let e = scene.spawn("spinner", Transform::IDENTITY);
        scene.add_rotation(e, Vec3::Y, std::f32::consts::PI);
        scene.update(0.5);

        let rotation = scene.transform_mut(e).unwrap().0.rotation;
        let expected = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        assert!(rotation.abs_diff_eq(expected, 1e-5));
    }
}
