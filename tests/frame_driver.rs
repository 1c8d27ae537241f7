use glam::Vec3;
use hybrid_renderer::asset::primitives::cube_mesh;
use hybrid_renderer::asset::{Mesh, MeshKind};
use hybrid_renderer::demo_scenes::DemoScene;
use hybrid_renderer::driver::FrameDriver;
use hybrid_renderer::renderer::{HeadlessDevice, Renderer};
use hybrid_renderer::scene::{Scene, Transform};
use hybrid_renderer::settings::{ColorStrategy, RenderSettings};

fn renderer(strategy: ColorStrategy) -> Renderer<HeadlessDevice> {
    let _ = env_logger::builder().is_test(true).try_init();
    let settings = RenderSettings {
        color_strategy: strategy,
        ..RenderSettings::default()
    };
    Renderer::new(HeadlessDevice::new(400, 300), settings).expect("renderer")
}

#[test]
fn demo_scenes_render_cleanly_with_both_strategies() {
    for strategy in [ColorStrategy::Forward, ColorStrategy::Deferred] {
        for demo in [DemoScene::Simple, DemoScene::ShadowTest] {
            let mut renderer = renderer(strategy);
            let scene = demo.build(&mut renderer).unwrap();
            let mut driver = FrameDriver::new(scene);

            for _ in 0..3 {
                driver.step(&mut renderer, 1.0 / 60.0).unwrap();
            }

            let stats = renderer.last_frame();
            assert_eq!(stats.gpu_errors, 0, "{demo:?} with {strategy:?}");
            assert!(stats.instances > 0, "{demo:?} with {strategy:?}");
            assert_eq!(renderer.device().presented_frames(), 3);
        }
    }
}

#[test]
fn shadow_test_lamps_get_shadow_slots() {
    let mut renderer = renderer(ColorStrategy::Forward);
    let scene = DemoScene::ShadowTest.build(&mut renderer).unwrap();
    let mut driver = FrameDriver::new(scene);
    driver.step(&mut renderer, 0.0).unwrap();
    driver.step(&mut renderer, 0.0).unwrap();

    let stats = renderer.last_frame();
    assert_eq!(stats.shadow_slots_used, 3);
    assert_eq!(stats.unshadowed_casters, 0);
}

#[test]
fn renderer_sees_the_previous_step() {
    let mut renderer = renderer(ColorStrategy::Forward);
    let scene = DemoScene::Simple.build(&mut renderer).unwrap();
    let mut driver = FrameDriver::new(scene);

    // The driver commits the built scene before the first step.
    let initial = driver.committed().renderables.len();
    driver.step(&mut renderer, 0.1).unwrap();
    let after_first = driver.committed().clone();

    assert_eq!(initial, after_first.renderables.len());
    assert!((driver.scene().time() - 0.1).abs() < 1e-9);

    driver.step(&mut renderer, 0.1).unwrap();
    let moved = driver
        .committed()
        .renderables
        .iter()
        .zip(after_first.renderables.iter())
        .any(|(now, before)| now.world != before.world);
    assert!(moved, "spinning cubes change between committed steps");
}

#[test]
fn first_frame_skips_meshes_under_inactive_parents() {
    let mut renderer = renderer(ColorStrategy::Forward);
    let (verts, idx) = cube_mesh();
    let cube = renderer
        .add_mesh("cube", Mesh::new(MeshKind::Standard, verts, idx))
        .unwrap();

    let mut scene = Scene::new();
    let group = scene.spawn("group", Transform::default());
    let child = scene.spawn_mesh(
        "child",
        Transform::from_translation(Vec3::new(5.0, 0.0, 0.0)),
        cube,
        None,
    );
    scene.set_parent(child, group);
    scene.set_active(group, false);

    let mut driver = FrameDriver::new(scene);
    driver.step(&mut renderer, 1.0 / 60.0).unwrap();
    assert_eq!(renderer.last_frame().instances, 0);
}
