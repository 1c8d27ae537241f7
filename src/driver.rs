use std::mem;

use crate::renderer::{GpuDevice, RenderError, Renderer};
use crate::scene::{Scene, SceneSnapshot};

/// Runs one simulation step and one render concurrently each frame.
///
/// The simulation advances on a rayon worker and commits into the back
/// snapshot while the calling thread renders the snapshot committed by the
/// previous step. Both finish before the snapshots swap, so the renderer
/// always sees a complete, one-frame-old scene.
pub struct FrameDriver {
    scene: Scene,
    committed: SceneSnapshot,
    back: SceneSnapshot,
}

impl FrameDriver {
    /// Commits the scene as built so the first frame already sees world
    /// transforms and inherited activity.
    pub fn new(mut scene: Scene) -> Self {
        scene.commit();
        let committed = scene.snapshot();
        Self {
            scene,
            committed,
            back: SceneSnapshot::new(),
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Edits made here become visible to the renderer after the next step.
    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    /// The state the next render will read.
    pub fn committed(&self) -> &SceneSnapshot {
        &self.committed
    }

    /// Simulates `dt` seconds while rendering the committed state.
    pub fn step<D: GpuDevice>(
        &mut self,
        renderer: &mut Renderer<D>,
        dt: f64,
    ) -> Result<(), RenderError> {
        let Self {
            scene,
            committed,
            back,
        } = self;

        let result = rayon::in_place_scope(|s| {
            s.spawn(move |_| {
                scene.update(dt);
                scene.snapshot_into(back);
            });
            renderer.render(dt, committed)
        });

        mem::swap(&mut self.committed, &mut self.back);
        result
    }

    /// Advances without rendering. Used before the first frame and by tests.
    pub fn simulate(&mut self, dt: f64) {
        self.scene.update(dt);
        self.scene.snapshot_into(&mut self.committed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{OrbitAnimation, Transform};
    use glam::Vec3;

    #[test]
    fn committed_state_lags_one_step() {
        let mut scene = Scene::new();
        let moving = scene.spawn("moving", Transform::from_translation(Vec3::X));
        scene.add_orbit(
            moving,
            OrbitAnimation {
                center: Vec3::ZERO,
                radius: 1.0,
                speed: 1.0,
                offset: 0.0,
            },
        );

        let mut driver = FrameDriver::new(scene);
        driver.simulate(0.0);
        let before = driver.committed().world_transform(moving).map(|w| w.matrix);
        driver.simulate(0.5);
        let after = driver.committed().world_transform(moving).map(|w| w.matrix);
        assert!(before.is_some());
        assert_ne!(before, after, "simulate commits the new transform");
    }

    #[test]
    fn first_committed_state_is_propagated() {
        let mut scene = Scene::new();
        let group = scene.spawn("group", Transform::from_translation(Vec3::X));
        let child = scene.spawn_mesh(
            "child",
            Transform::from_translation(Vec3::new(5.0, 0.0, 0.0)),
            crate::asset::Handle::new(0),
            None,
        );
        scene.set_parent(child, group);
        scene.set_active(group, false);

        let driver = FrameDriver::new(scene);
        let renderable = driver.committed().renderables[0];
        assert!(!renderable.active);
        assert!(renderable
            .world
            .w_axis
            .truncate()
            .abs_diff_eq(Vec3::new(6.0, 0.0, 0.0), 1e-6));
    }
}
