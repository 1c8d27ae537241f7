use glam::{Quat, Vec3, Vec4};
use log::info;

use crate::asset::primitives::{cube_mesh, plane_mesh, sky_sphere_mesh, sphere_mesh, terrain_mesh};
use crate::asset::{Material, MaterialFlags, Mesh, MeshKind, TextureSlot};
use crate::renderer::{Camera, GpuDevice, Light, RenderError, Renderer};
use crate::scene::{OrbitAnimation, Scene, Transform};

/// Scenes the binary can start with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DemoScene {
    /// Spinning cubes on a checkered plane under the sun.
    Simple,
    /// Terrain, sky and orbiting shadow-casting point lights.
    ShadowTest,
}

impl DemoScene {
    pub fn build<D: GpuDevice>(self, renderer: &mut Renderer<D>) -> Result<Scene, RenderError> {
        let scene = match self {
            DemoScene::Simple => setup_simple_scene(renderer)?,
            DemoScene::ShadowTest => setup_shadow_test_scene(renderer)?,
        };
        info!("{:?} scene: {} entities", self, scene.world.len());
        Ok(scene)
    }
}

pub fn default_scene() -> DemoScene {
    DemoScene::ShadowTest
}

fn checkerboard(size: u32, cell: u32, a: [u8; 4], b: [u8; 4]) -> Vec<u8> {
    let mut texels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let even = ((x / cell) + (y / cell)) % 2 == 0;
            texels.extend_from_slice(if even { &a } else { &b });
        }
    }
    texels
}

fn setup_simple_scene<D: GpuDevice>(renderer: &mut Renderer<D>) -> Result<Scene, RenderError> {
    let mut scene = Scene::new();

    let (verts, idx) = cube_mesh();
    let cube = renderer.add_mesh("cube", Mesh::new(MeshKind::Standard, verts, idx))?;
    let (verts, idx) = plane_mesh(20.0, 1);
    let ground = renderer.add_mesh("ground", Mesh::new(MeshKind::Standard, verts, idx))?;

    let checker = renderer.load_texture(
        "checkerboard",
        256,
        256,
        &checkerboard(256, 32, [255, 255, 255, 255], [40, 40, 40, 255]),
    )?;
    let red = renderer.add_material("red", Material::rgb(0.9, 0.2, 0.2));
    let floor = renderer.add_material(
        "floor",
        Material::white().with_texture(TextureSlot::BaseColor, checker),
    );

    scene.spawn_mesh("Ground", Transform::default(), ground, Some(floor));
    for (i, x) in [-2.0, 0.0, 2.0].into_iter().enumerate() {
        let entity = scene.spawn_mesh(
            format!("Cube {i}"),
            Transform::from_translation(Vec3::new(x, 0.5, 0.0)),
            cube,
            Some(red),
        );
        scene.add_rotation(entity, Vec3::Y, 0.5 + i as f32 * 0.25);
    }

    scene.spawn_light(
        renderer.lights_mut(),
        "Sun",
        Transform::default(),
        Light::directional(Vec3::new(-0.4, -1.0, -0.3)),
    );
    renderer
        .cameras_mut()
        .create("Main", Camera::default().looking_at(Vec3::new(0.0, 4.0, 9.0), Vec3::ZERO));

    Ok(scene)
}

fn setup_shadow_test_scene<D: GpuDevice>(renderer: &mut Renderer<D>) -> Result<Scene, RenderError> {
    let mut scene = Scene::new();

    let (verts, idx) = terrain_mesh(40.0, 64, |x, z| {
        (x * 0.15).sin() * (z * 0.12).cos() * 2.5 + ((x * x + z * z).sqrt() * 0.08).powi(2)
    });
    let terrain = renderer.add_mesh("terrain", Mesh::new(MeshKind::Terrain, verts, idx))?;
    let (verts, idx) = sky_sphere_mesh(32, 16);
    let sky = renderer.add_mesh("sky", Mesh::new(MeshKind::Sky, verts, idx))?;
    let (verts, idx) = sphere_mesh(32, 16);
    let sphere = renderer.add_mesh("sphere", Mesh::new(MeshKind::Standard, verts, idx))?;
    let (verts, idx) = cube_mesh();
    let cube = renderer.add_mesh("cube", Mesh::new(MeshKind::Standard, verts, idx))?;

    let sky_material = renderer.add_material(
        "sky",
        Material::new(Vec4::new(0.45, 0.62, 0.9, 1.0)).with_flags(MaterialFlags::UNLIT),
    );
    let stone = renderer.add_material(
        "stone",
        Material::rgb(0.7, 0.7, 0.72).with_roughness(0.8),
    );

    scene.spawn_mesh("Terrain", Transform::from_translation(Vec3::new(0.0, -2.0, 0.0)), terrain, None);
    scene.spawn_mesh("Sky", Transform::default().with_scale(Vec3::splat(500.0)), sky, Some(sky_material));

    for i in 0..8 {
        let angle = i as f32 / 8.0 * std::f32::consts::TAU;
        let position = Vec3::new(angle.cos() * 5.0, 0.5, angle.sin() * 5.0);
        let (mesh, name) = if i % 2 == 0 { (sphere, "Sphere") } else { (cube, "Pillar") };
        let transform = Transform::from_trs(
            position,
            Quat::from_rotation_y(angle),
            if mesh == cube { Vec3::new(0.6, 2.5, 0.6) } else { Vec3::ONE },
        );
        scene.spawn_mesh(format!("{name} {i}"), transform, mesh, Some(stone));
    }

    scene.spawn_light(
        renderer.lights_mut(),
        "Sun",
        Transform::default(),
        Light::directional(Vec3::new(-0.3, -1.0, -0.5))
            .with_color(Vec3::new(1.0, 0.95, 0.85))
            .with_intensity(0.6),
    );

    let colors = [
        Vec3::new(1.0, 0.4, 0.3),
        Vec3::new(0.3, 0.6, 1.0),
        Vec3::new(0.4, 1.0, 0.5),
    ];
    for (i, color) in colors.into_iter().enumerate() {
        let (entity, _) = scene.spawn_light(
            renderer.lights_mut(),
            format!("Lamp {i}"),
            Transform::from_translation(Vec3::new(0.0, 1.5, 0.0)),
            Light::point(Vec3::ZERO, 12.0)
                .with_color(color)
                .with_intensity(2.0)
                .with_shadow(true),
        );
        scene.add_orbit(
            entity,
            OrbitAnimation {
                center: Vec3::new(0.0, 1.5, 0.0),
                radius: 2.5,
                speed: 0.6,
                offset: i as f32 * std::f32::consts::TAU / colors.len() as f32,
            },
        );
    }

    renderer
        .cameras_mut()
        .create("Main", Camera::default().looking_at(Vec3::new(0.0, 7.0, 14.0), Vec3::ZERO));

    Ok(scene)
}
