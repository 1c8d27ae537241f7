use glam::{EulerRot, Mat4, Quat, Vec3};

use crate::asset::{AssetCache, Handle};
use crate::scene::SceneSnapshot;

pub type CameraId = Handle<Camera>;

const MAX_PITCH: f32 = 89.0 * std::f32::consts::PI / 180.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Projection {
    Perspective { fov_y: f32, near: f32, far: f32 },
    /// `height` is the visible world-space height.
    Orthographic { height: f32, near: f32, far: f32 },
}

impl Projection {
    pub fn matrix(&self, aspect: f32) -> Mat4 {
        let aspect = if aspect.is_finite() && aspect > 0.0 {
            aspect
        } else {
            1.0
        };
        match *self {
            Projection::Perspective { fov_y, near, far } => {
                Mat4::perspective_rh(fov_y, aspect, near, far)
            }
            Projection::Orthographic { height, near, far } => {
                let half_h = height * 0.5;
                let half_w = half_h * aspect;
                Mat4::orthographic_rh(-half_w, half_w, -half_h, half_h, near, far)
            }
        }
    }
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Perspective {
            fov_y: 60f32.to_radians(),
            near: 0.1,
            far: 200.0,
        }
    }
}

/// A viewpoint. When `owner` is set the camera follows that entity's world
/// position and `position` is ignored; `eye_offset` is always added.
#[derive(Clone, Debug)]
pub struct Camera {
    pub projection: Projection,
    pub position: Vec3,
    pub eye_offset: Vec3,
    /// Radians around +Y. Zero looks down -Z.
    pub yaw: f32,
    /// Radians, clamped just short of straight up or down.
    pub pitch: f32,
    pub owner: Option<hecs::Entity>,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            projection: Projection::default(),
            position: Vec3::new(0.0, 2.0, 8.0),
            eye_offset: Vec3::ZERO,
            yaw: 0.0,
            pitch: -0.2,
            owner: None,
        }
    }
}

impl Camera {
    pub fn new(projection: Projection) -> Self {
        Self {
            projection,
            ..Self::default()
        }
    }

    pub fn looking_at(mut self, eye: Vec3, target: Vec3) -> Self {
        self.position = eye;
        let dir = (target - eye).normalize_or_zero();
        if dir != Vec3::ZERO {
            self.yaw = (-dir.x).atan2(-dir.z);
            self.pitch = dir.y.clamp(-1.0, 1.0).asin();
        }
        self.pitch = self.pitch.clamp(-MAX_PITCH, MAX_PITCH);
        self
    }

    pub fn attached_to(mut self, owner: hecs::Entity, eye_offset: Vec3) -> Self {
        self.owner = Some(owner);
        self.eye_offset = eye_offset;
        self
    }

    pub fn rotate(&mut self, delta_yaw: f32, delta_pitch: f32) {
        self.yaw += delta_yaw;
        self.pitch = (self.pitch + delta_pitch).clamp(-MAX_PITCH, MAX_PITCH);
    }

    pub fn forward(&self) -> Vec3 {
        Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, 0.0) * Vec3::NEG_Z
    }

    pub fn eye(&self, snapshot: &SceneSnapshot) -> Vec3 {
        let base = self
            .owner
            .and_then(|owner| snapshot.world_transform(owner))
            .map(|world| world.matrix.w_axis.truncate())
            .unwrap_or(self.position);
        base + self.eye_offset
    }

    pub fn resolve(&self, snapshot: &SceneSnapshot, aspect: f32) -> CameraState {
        let position = self.eye(snapshot);
        let forward = self.forward();
        CameraState {
            view: Mat4::look_to_rh(position, forward, Vec3::Y),
            projection: self.projection.matrix(aspect),
            position,
            forward,
        }
    }
}

/// The camera as the passes see it for one frame.
#[derive(Clone, Copy, Debug)]
pub struct CameraState {
    pub view: Mat4,
    pub projection: Mat4,
    pub position: Vec3,
    pub forward: Vec3,
}

pub struct CameraRegistry {
    cameras: AssetCache<Camera>,
    main: Option<CameraId>,
    fallback: Camera,
}

impl CameraRegistry {
    pub fn new() -> Self {
        Self {
            cameras: AssetCache::new(),
            main: None,
            fallback: Camera::default(),
        }
    }

    /// Registers a camera. The first one registered becomes the main camera.
    pub fn create(&mut self, name: impl Into<String>, camera: Camera) -> CameraId {
        let id = self.cameras.insert(name, camera);
        if self.main.is_none() {
            self.main = Some(id);
        }
        id
    }

    pub fn get(&self, id: CameraId) -> Option<&Camera> {
        self.cameras.get(id)
    }

    pub fn get_mut(&mut self, id: CameraId) -> Option<&mut Camera> {
        self.cameras.get_mut(id)
    }

    pub fn get_by_name(&self, name: &str) -> Option<CameraId> {
        self.cameras.get_by_name(name)
    }

    pub fn set_main(&mut self, id: CameraId) -> bool {
        if self.cameras.get(id).is_some() {
            self.main = Some(id);
            true
        } else {
            false
        }
    }

    pub fn main_id(&self) -> Option<CameraId> {
        self.main
    }

    /// The main camera, or the built-in default when none is registered.
    pub fn main(&self) -> &Camera {
        self.main
            .and_then(|id| self.cameras.get(id))
            .unwrap_or(&self.fallback)
    }

    pub fn main_mut(&mut self) -> &mut Camera {
        match self.main.and_then(|id| self.cameras.get_mut(id)) {
            Some(camera) => camera,
            None => &mut self.fallback,
        }
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }
}

impl Default for CameraRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_camera_substitutes_when_none_registered() {
        let registry = CameraRegistry::new();
        assert!(registry.main_id().is_none());
        assert_eq!(registry.main().position, Camera::default().position);
    }

    #[test]
    fn first_camera_becomes_main() {
        let mut registry = CameraRegistry::new();
        let a = registry.create("a", Camera::default());
        let b = registry.create("b", Camera::default());
        assert_eq!(registry.main_id(), Some(a));
        assert!(registry.set_main(b));
        assert_eq!(registry.get_by_name("b"), Some(b));
        assert_eq!(registry.main_id(), Some(b));
    }

    #[test]
    fn looking_at_points_forward_at_target() {
        let camera = Camera::default().looking_at(Vec3::new(0.0, 0.0, 5.0), Vec3::new(5.0, 0.0, 5.0));
        assert!(camera.forward().abs_diff_eq(Vec3::X, 1e-5));

        let state = camera.resolve(&SceneSnapshot::default(), 1.0);
        let target_view = state.view.transform_point3(Vec3::new(10.0, 0.0, 5.0));
        // In view space the target lies straight ahead on -Z.
        assert!(target_view.abs_diff_eq(Vec3::new(0.0, 0.0, -10.0), 1e-4));
    }

    #[test]
    fn pitch_is_clamped() {
        let mut camera = Camera::default();
        camera.rotate(0.0, 10.0);
        assert!(camera.pitch <= MAX_PITCH);
        assert!(camera.forward().is_finite());
    }

    #[test]
    fn view_proj_is_invertible() {
        let state = Camera::default().resolve(&SceneSnapshot::default(), 16.0 / 9.0);
        let vp = state.projection * state.view;
        assert!((vp * vp.inverse()).abs_diff_eq(Mat4::IDENTITY, 1e-4));
    }
}
