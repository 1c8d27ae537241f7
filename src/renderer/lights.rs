use glam::{Mat4, Vec3, Vec4};

use super::camera::CameraState;
use crate::asset::{AssetCache, Handle};
use crate::scene::SceneSnapshot;

pub type LightId = Handle<Light>;

pub const POINT_SHADOW_FACES: usize = 6;

const DIRECTIONAL_SHADOW_DISTANCE: f32 = 30.0;
const DIRECTIONAL_SHADOW_EXTENT: f32 = 15.0;
const SHADOW_NEAR: f32 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Attenuation {
    pub constant: f32,
    pub linear: f32,
    pub quadratic: f32,
    /// Beyond this distance the light contributes nothing.
    pub range: f32,
}

impl Default for Attenuation {
    fn default() -> Self {
        Self {
            constant: 1.0,
            linear: 0.09,
            quadratic: 0.032,
            range: 20.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LightKind {
    /// `direction` is the way the light travels.
    Directional { direction: Vec3 },
    Point { position: Vec3, attenuation: Attenuation },
}

#[derive(Clone, Debug)]
pub struct Light {
    pub kind: LightKind,
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub intensity: f32,
    pub cast_shadow: bool,
    /// Owning entity. Point lights follow its position, directional lights its
    /// orientation, and lights with an inactive owner are skipped.
    pub owner: Option<hecs::Entity>,
}

impl Light {
    pub fn directional(direction: Vec3) -> Self {
        Self {
            kind: LightKind::Directional {
                direction: direction.normalize_or(Vec3::NEG_Y),
            },
            ambient: Vec3::splat(0.1),
            diffuse: Vec3::ONE,
            specular: Vec3::ONE,
            intensity: 1.0,
            cast_shadow: true,
            owner: None,
        }
    }

    pub fn point(position: Vec3, range: f32) -> Self {
        Self {
            kind: LightKind::Point {
                position,
                attenuation: Attenuation {
                    range,
                    ..Attenuation::default()
                },
            },
            ambient: Vec3::splat(0.02),
            diffuse: Vec3::ONE,
            specular: Vec3::ONE,
            intensity: 1.0,
            cast_shadow: false,
            owner: None,
        }
    }

    pub fn with_color(mut self, diffuse: Vec3) -> Self {
        self.diffuse = diffuse;
        self.specular = diffuse;
        self
    }

    pub fn with_ambient(mut self, ambient: Vec3) -> Self {
        self.ambient = ambient;
        self
    }

    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity;
        self
    }

    pub fn with_shadow(mut self, cast_shadow: bool) -> Self {
        self.cast_shadow = cast_shadow;
        self
    }

    pub fn attached_to(mut self, owner: hecs::Entity) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn is_directional(&self) -> bool {
        matches!(self.kind, LightKind::Directional { .. })
    }
}

/// Per-frame limits on light and shadow counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LightLimits {
    pub max_point_lights: usize,
    pub max_shadow_point_lights: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct DirectionalFrameLight {
    pub direction: Vec3,
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub intensity: f32,
    /// Light projection times view, when the light casts shadows.
    pub shadow: Option<Mat4>,
}

#[derive(Clone, Copy, Debug)]
pub struct PointFrameLight {
    pub position: Vec3,
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub intensity: f32,
    pub attenuation: Attenuation,
    pub shadow_slot: Option<usize>,
}

#[derive(Clone, Copy, Debug)]
pub struct PointShadow {
    pub slot: usize,
    pub view_proj: [Mat4; POINT_SHADOW_FACES],
    pub near: f32,
    pub far: f32,
}

/// Lights resolved against the committed scene for one frame.
#[derive(Clone, Debug)]
pub struct FrameLights {
    pub directional: DirectionalFrameLight,
    pub points: Vec<PointFrameLight>,
    pub point_shadows: Vec<PointShadow>,
    /// Casting point lights that did not get a shadow slot.
    pub unshadowed_casters: usize,
    /// Point lights beyond the per-frame light limit.
    pub dropped_lights: usize,
}

pub struct LightRegistry {
    lights: AssetCache<Light>,
    main_directional: Option<LightId>,
    fallback: Light,
    reported_overflow: usize,
}

impl LightRegistry {
    pub fn new() -> Self {
        Self {
            lights: AssetCache::new(),
            main_directional: None,
            fallback: Light::directional(Vec3::new(-0.3, -1.0, -0.2)).with_intensity(0.8),
            reported_overflow: 0,
        }
    }

    /// Registers a light. The first directional light becomes the main one;
    /// later directional lights are kept but not rendered unless promoted.
    pub fn create(&mut self, name: impl Into<String>, light: Light) -> LightId {
        let directional = light.is_directional();
        let id = self.lights.insert(name, light);
        if directional && self.main_directional.is_none() {
            self.main_directional = Some(id);
        }
        id
    }

    pub fn get(&self, id: LightId) -> Option<&Light> {
        self.lights.get(id)
    }

    pub fn get_mut(&mut self, id: LightId) -> Option<&mut Light> {
        self.lights.get_mut(id)
    }

    pub fn get_by_name(&self, name: &str) -> Option<LightId> {
        self.lights.get_by_name(name)
    }

    /// Returns false when `id` does not name a directional light.
    pub fn set_main_directional(&mut self, id: LightId) -> bool {
        match self.lights.get(id) {
            Some(light) if light.is_directional() => {
                self.main_directional = Some(id);
                true
            }
            _ => false,
        }
    }

    /// The main directional light, or the built-in default sun.
    pub fn main_directional(&self) -> &Light {
        self.main_directional
            .and_then(|id| self.lights.get(id))
            .unwrap_or(&self.fallback)
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    /// Resolves positions and shadow assignments for this frame.
    ///
    /// Shadow slots go to casting point lights in registration order until
    /// `max_shadow_point_lights` is reached. The rest are lit without shadows;
    /// a warning is logged whenever the number of such lights changes.
    pub fn resolve(
        &mut self,
        snapshot: &SceneSnapshot,
        camera: &CameraState,
        limits: LightLimits,
    ) -> FrameLights {
        let directional = self.resolve_directional(snapshot, camera);

        let mut points = Vec::new();
        let mut point_shadows = Vec::new();
        let mut unshadowed_casters = 0;
        let mut dropped_lights = 0;

        for (_, light) in self.lights.iter() {
            let LightKind::Point {
                position,
                attenuation,
            } = light.kind
            else {
                continue;
            };
            let position = match light.owner {
                Some(owner) => match snapshot.world_transform(owner) {
                    Some(world) if world.active => world.matrix.transform_point3(position),
                    _ => continue,
                },
                None => position,
            };
            if points.len() >= limits.max_point_lights {
                dropped_lights += 1;
                continue;
            }

            let shadow_slot = if !light.cast_shadow {
                None
            } else if point_shadows.len() < limits.max_shadow_point_lights {
                let slot = point_shadows.len();
                point_shadows.push(build_point_shadow(slot, position, attenuation.range));
                Some(slot)
            } else {
                unshadowed_casters += 1;
                None
            };

            points.push(PointFrameLight {
                position,
                ambient: light.ambient,
                diffuse: light.diffuse,
                specular: light.specular,
                intensity: light.intensity,
                attenuation,
                shadow_slot,
            });
        }

        if unshadowed_casters != self.reported_overflow {
            if unshadowed_casters > 0 {
                log::warn!(
                    "{} shadow-casting point light(s) exceed the cap of {} and render without shadows",
                    unshadowed_casters,
                    limits.max_shadow_point_lights
                );
            }
            self.reported_overflow = unshadowed_casters;
        }
        if dropped_lights > 0 {
            log::trace!("{} point light(s) beyond the frame limit skipped", dropped_lights);
        }

        FrameLights {
            directional,
            points,
            point_shadows,
            unshadowed_casters,
            dropped_lights,
        }
    }

    fn resolve_directional(
        &self,
        snapshot: &SceneSnapshot,
        camera: &CameraState,
    ) -> DirectionalFrameLight {
        let mut light = self.main_directional();
        let owner = light.owner.and_then(|owner| snapshot.world_transform(owner));
        if matches!(owner, Some(world) if !world.active) {
            light = &self.fallback;
        }

        let base = match light.kind {
            LightKind::Directional { direction } => direction,
            LightKind::Point { .. } => Vec3::NEG_Y,
        };
        let direction = owner
            .filter(|world| world.active)
            .map(|world| world.matrix.transform_vector3(base))
            .unwrap_or(base)
            .normalize_or(Vec3::NEG_Y);

        let shadow = light.cast_shadow.then(|| {
            let focus = camera.position + camera.forward * (DIRECTIONAL_SHADOW_EXTENT * 0.5);
            build_directional_shadow(focus, direction, DIRECTIONAL_SHADOW_EXTENT)
        });

        DirectionalFrameLight {
            direction,
            ambient: light.ambient,
            diffuse: light.diffuse,
            specular: light.specular,
            intensity: light.intensity,
            shadow,
        }
    }
}

impl Default for LightRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Orthographic light-space matrix centred on `focus`, with depth mapped to
/// the 0..1 range.
pub fn build_directional_shadow(focus: Vec3, direction: Vec3, extent: f32) -> Mat4 {
    let direction = direction.normalize_or(Vec3::NEG_Y);
    let light_pos = focus - direction * DIRECTIONAL_SHADOW_DISTANCE;
    let view = Mat4::look_at_rh(light_pos, focus, shadow_up(direction));

    let extent = extent.max(0.1);
    let (left, right, bottom, top) = (-extent, extent, -extent, extent);
    let near = SHADOW_NEAR;
    let far = DIRECTIONAL_SHADOW_DISTANCE * 2.0;

    let projection = Mat4::from_cols(
        Vec4::new(2.0 / (right - left), 0.0, 0.0, 0.0),
        Vec4::new(0.0, 2.0 / (top - bottom), 0.0, 0.0),
        Vec4::new(0.0, 0.0, -1.0 / (far - near), 0.0),
        Vec4::new(
            -(right + left) / (right - left),
            -(top + bottom) / (top - bottom),
            -near / (far - near),
            1.0,
        ),
    );

    projection * view
}

/// One 90-degree perspective matrix per cube face, in +X, -X, +Y, -Y, +Z, -Z
/// order.
pub fn build_point_shadow(slot: usize, position: Vec3, range: f32) -> PointShadow {
    use std::f32::consts::FRAC_PI_2;

    let near = SHADOW_NEAR;
    let far = range.max(near + 0.1);
    let projection = Mat4::perspective_rh(FRAC_PI_2, 1.0, near, far);

    let dirs = [
        Vec3::X,
        Vec3::NEG_X,
        Vec3::Y,
        Vec3::NEG_Y,
        Vec3::Z,
        Vec3::NEG_Z,
    ];
    let ups = [Vec3::Y, Vec3::Y, Vec3::Z, Vec3::NEG_Z, Vec3::Y, Vec3::Y];

    let mut view_proj = [Mat4::IDENTITY; POINT_SHADOW_FACES];
    for ((matrix, dir), up) in view_proj.iter_mut().zip(dirs.iter()).zip(ups.iter()) {
        *matrix = projection * Mat4::look_at_rh(position, position + *dir, *up);
    }

    PointShadow {
        slot,
        view_proj,
        near,
        far,
    }
}

fn shadow_up(direction: Vec3) -> Vec3 {
    if direction.abs().dot(Vec3::Y) > 0.95 {
        Vec3::Z
    } else {
        Vec3::Y
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::camera::Camera;

    const LIMITS: LightLimits = LightLimits {
        max_point_lights: 16,
        max_shadow_point_lights: 2,
    };

    fn camera() -> CameraState {
        Camera::default().resolve(&SceneSnapshot::default(), 1.0)
    }

    #[test]
    fn default_sun_is_always_present() {
        let mut registry = LightRegistry::new();
        let frame = registry.resolve(&SceneSnapshot::default(), &camera(), LIMITS);
        assert!(frame.directional.shadow.is_some());
        assert!(frame.points.is_empty());
        assert!(frame.directional.direction.is_normalized());
    }

    #[test]
    fn first_directional_light_becomes_main() {
        let mut registry = LightRegistry::new();
        let point = registry.create("lamp", Light::point(Vec3::ZERO, 5.0));
        let sun = registry.create("sun", Light::directional(Vec3::NEG_Z));
        registry.create("moon", Light::directional(Vec3::NEG_X));

        assert!(!registry.set_main_directional(point));
        assert!(matches!(
            registry.main_directional().kind,
            LightKind::Directional { direction } if direction == Vec3::NEG_Z
        ));
        assert_eq!(registry.get_by_name("sun"), Some(sun));
    }

    #[test]
    fn non_casting_point_lights_take_no_shadow_slot() {
        let mut registry = LightRegistry::new();
        registry.create("fill", Light::point(Vec3::new(1.0, 2.0, 0.0), 8.0));
        registry.create("key", Light::point(Vec3::new(-1.0, 2.0, 0.0), 8.0).with_shadow(true));

        let frame = registry.resolve(&SceneSnapshot::default(), &camera(), LIMITS);
        assert_eq!(frame.points.len(), 2);
        assert_eq!(frame.points[0].shadow_slot, None);
        assert_eq!(frame.points[1].shadow_slot, Some(0));
        assert_eq!(frame.point_shadows.len(), 1);
    }

    #[test]
    fn casters_beyond_the_cap_render_unshadowed() {
        let mut registry = LightRegistry::new();
        for i in 0..4 {
            registry.create(
                format!("lamp{i}"),
                Light::point(Vec3::new(i as f32, 1.0, 0.0), 5.0).with_shadow(true),
            );
        }

        let frame = registry.resolve(&SceneSnapshot::default(), &camera(), LIMITS);
        assert_eq!(frame.point_shadows.len(), 2);
        assert_eq!(frame.unshadowed_casters, 2);
        assert_eq!(frame.points.len(), 4);
        assert!(frame.points[2].shadow_slot.is_none());
    }

    #[test]
    fn point_light_limit_drops_extra_lights() {
        let mut registry = LightRegistry::new();
        for i in 0..3 {
            registry.create(format!("p{i}"), Light::point(Vec3::ZERO, 5.0));
        }
        let limits = LightLimits {
            max_point_lights: 2,
            max_shadow_point_lights: 0,
        };
        let frame = registry.resolve(&SceneSnapshot::default(), &camera(), limits);
        assert_eq!(frame.points.len(), 2);
        assert_eq!(frame.dropped_lights, 1);
    }

    #[test]
    fn directional_shadow_maps_focus_to_the_center() {
        let focus = Vec3::new(3.0, 0.0, -2.0);
        let matrix = build_directional_shadow(focus, Vec3::new(0.2, -1.0, 0.1), 10.0);
        let clip = matrix * focus.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4);
        assert!((0.0..=1.0).contains(&ndc.z));
    }

    #[test]
    fn point_shadow_faces_look_along_axes() {
        let position = Vec3::new(1.0, 2.0, 3.0);
        let shadow = build_point_shadow(0, position, 10.0);
        for (face, dir) in [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z]
            .into_iter()
            .enumerate()
        {
            let clip = shadow.view_proj[face] * (position + dir * 5.0).extend(1.0);
            let ndc = clip.truncate() / clip.w;
            assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4, "face {face}");
        }
        assert_eq!(shadow.far, 10.0);
    }
}
