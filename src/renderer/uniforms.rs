// renderer/uniforms.rs
use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use super::camera::CameraState;
use super::lights::{FrameLights, POINT_SHADOW_FACES};

pub const MAX_POINT_LIGHTS: usize = 16;
pub const MAX_SHADOW_POINT_LIGHTS: usize = 4;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub inverse_view_proj: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    /// Projection times view with the translation removed.
    pub sky_view_proj: [[f32; 4]; 4],
    /// xyz = eye position, w = elapsed seconds.
    pub position_time: [f32; 4],
}

impl CameraUniform {
    pub fn from_state(camera: &CameraState, time: f32) -> Self {
        let view_proj = camera.projection * camera.view;
        let rotation_only = Mat4::from_mat3(glam::Mat3::from_mat4(camera.view));
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            inverse_view_proj: view_proj.inverse().to_cols_array_2d(),
            view: camera.view.to_cols_array_2d(),
            sky_view_proj: (camera.projection * rotation_only).to_cols_array_2d(),
            position_time: camera.position.extend(time).to_array(),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct DirectionalLightRaw {
    /// xyz = direction the light travels, w = 1.0 when shadowed.
    pub direction: [f32; 4],
    pub ambient: [f32; 4],
    /// rgb = diffuse color, a = intensity.
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct PointLightRaw {
    /// xyz = position, w = range.
    pub position_range: [f32; 4],
    pub ambient: [f32; 4],
    /// rgb = diffuse color, a = intensity.
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    /// constant, linear, quadratic, shadow slot (or -1).
    pub attenuation: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct LightsUniform {
    /// x = point light count.
    pub counts: [u32; 4],
    pub directional: DirectionalLightRaw,
    pub points: [PointLightRaw; MAX_POINT_LIGHTS],
}

impl LightsUniform {
    pub fn from_frame(lights: &FrameLights) -> Self {
        let mut uniform = Self::zeroed();

        let sun = &lights.directional;
        uniform.directional = DirectionalLightRaw {
            direction: sun
                .direction
                .extend(if sun.shadow.is_some() { 1.0 } else { 0.0 })
                .to_array(),
            ambient: sun.ambient.extend(0.0).to_array(),
            diffuse: sun.diffuse.extend(sun.intensity).to_array(),
            specular: sun.specular.extend(0.0).to_array(),
        };

        let count = lights.points.len().min(MAX_POINT_LIGHTS);
        uniform.counts[0] = count as u32;
        for (dst, src) in uniform.points.iter_mut().zip(&lights.points) {
            let slot = src.shadow_slot.map(|s| s as f32).unwrap_or(-1.0);
            *dst = PointLightRaw {
                position_range: src.position.extend(src.attenuation.range).to_array(),
                ambient: src.ambient.extend(0.0).to_array(),
                diffuse: src.diffuse.extend(src.intensity).to_array(),
                specular: src.specular.extend(0.0).to_array(),
                attenuation: [
                    src.attenuation.constant,
                    src.attenuation.linear,
                    src.attenuation.quadratic,
                    slot,
                ],
            };
        }

        uniform
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct ShadowsUniform {
    pub directional_view_proj: [[f32; 4]; 4],
    pub point_view_proj: [[[f32; 4]; 4]; MAX_SHADOW_POINT_LIGHTS * POINT_SHADOW_FACES],
}

impl ShadowsUniform {
    pub fn from_frame(lights: &FrameLights) -> Self {
        let mut uniform = Self::zeroed();
        uniform.directional_view_proj = lights
            .directional
            .shadow
            .unwrap_or(Mat4::IDENTITY)
            .to_cols_array_2d();
        for shadow in &lights.point_shadows {
            for (face, matrix) in shadow.view_proj.iter().enumerate() {
                uniform.point_view_proj[shadow.slot * POINT_SHADOW_FACES + face] =
                    matrix.to_cols_array_2d();
            }
        }
        uniform
    }
}

/// Everything the lit programs read once per frame.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct FrameUniform {
    pub camera: CameraUniform,
    pub lights: LightsUniform,
    pub shadows: ShadowsUniform,
}

impl FrameUniform {
    pub fn new(camera: &CameraState, lights: &FrameLights, time: f32) -> Self {
        Self {
            camera: CameraUniform::from_state(camera, time),
            lights: LightsUniform::from_frame(lights),
            shadows: ShadowsUniform::from_frame(lights),
        }
    }
}

/// Per-bucket surface parameters.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct DrawUniform {
    pub base_color: [f32; 4],
    /// rgb = emissive, a = roughness.
    pub emissive_roughness: [f32; 4],
    /// metallic, ao strength, height scale, mesh kind.
    pub params: [f32; 4],
    /// x = bound texture mask, y = material flag bits.
    pub flags: [u32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct ShadowCasterUniform {
    pub view_proj: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct CanvasUniform {
    pub projection: [[f32; 4]; 4],
}

impl CanvasUniform {
    /// Pixel coordinates with the origin in the top-left corner.
    pub fn for_size(width: u32, height: u32) -> Self {
        let projection =
            Mat4::orthographic_rh(0.0, width.max(1) as f32, height.max(1) as f32, 0.0, -1.0, 1.0);
        Self {
            projection: projection.to_cols_array_2d(),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct PostUniform {
    /// x = exposure.
    pub params: [f32; 4],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::gpu::MAX_UNIFORM_BLOCK;
    use glam::{Vec3, Vec4};

    #[test]
    fn frame_uniform_fits_in_one_block() {
        assert!(std::mem::size_of::<FrameUniform>() <= MAX_UNIFORM_BLOCK);
        assert_eq!(std::mem::size_of::<FrameUniform>() % 16, 0);
    }

    #[test]
    fn uniform_sizes_match_shader_layouts() {
        assert_eq!(std::mem::size_of::<CameraUniform>(), 272);
        assert_eq!(std::mem::size_of::<PointLightRaw>(), 80);
        assert_eq!(std::mem::size_of::<LightsUniform>(), 16 + 64 + 80 * MAX_POINT_LIGHTS);
        assert_eq!(std::mem::size_of::<DrawUniform>(), 64);
    }

    #[test]
    fn canvas_projection_maps_pixels_to_clip_space() {
        let projection = Mat4::from_cols_array_2d(&CanvasUniform::for_size(800, 600).projection);
        let top_left = projection * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let bottom_right = projection * Vec4::new(800.0, 600.0, 0.0, 1.0);
        assert!(top_left.truncate().abs_diff_eq(Vec3::new(-1.0, 1.0, 0.5), 1e-5));
        assert!(bottom_right.truncate().abs_diff_eq(Vec3::new(1.0, -1.0, 0.5), 1e-5));
    }
}
