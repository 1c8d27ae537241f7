// app.rs
use std::sync::Arc;

use glam::{Vec3, Vec4};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::*,
    event_loop::ActiveEventLoop,
    keyboard::{Key, NamedKey},
    window::{Window, WindowId},
};

use crate::demo_scenes::DemoScene;
use crate::driver::FrameDriver;
use crate::renderer::{Rect, RenderError, Renderer, WgpuDevice};
use crate::settings::RenderSettings;
use crate::time::FrameClock;

/// The assembly point: owns the window, the renderer and the frame driver.
pub struct App {
    settings: RenderSettings,
    demo: DemoScene,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer<WgpuDevice>>,
    driver: Option<FrameDriver>,
    clock: FrameClock,
}

impl App {
    pub fn new(settings: RenderSettings, demo: DemoScene) -> Self {
        Self {
            settings,
            demo,
            window: None,
            renderer: None,
            driver: None,
            clock: FrameClock::new(),
        }
    }

    fn init(&mut self, window: Arc<Window>) -> Result<(), String> {
        let device = pollster::block_on(WgpuDevice::new(window.clone(), &self.settings))
            .map_err(|err| format!("GPU initialization failed: {err}"))?;
        let mut renderer =
            Renderer::new(device, self.settings.clone()).map_err(|err| err.to_string())?;
        let scene = self.demo.build(&mut renderer).map_err(|err| err.to_string())?;

        self.driver = Some(FrameDriver::new(scene));
        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn redraw(&mut self) -> Result<(), RenderError> {
        let (Some(renderer), Some(driver)) = (self.renderer.as_mut(), self.driver.as_mut()) else {
            return Ok(());
        };
        let dt = self.clock.tick();

        draw_overlay(renderer);
        driver.step(renderer, dt)
    }
}

/// Axis gizmo and a frame-time bar, redrawn every frame.
fn draw_overlay(renderer: &mut Renderer<WgpuDevice>) {
    renderer.draw_line(Vec3::ZERO, Vec3::X, Vec4::new(1.0, 0.0, 0.0, 1.0));
    renderer.draw_line(Vec3::ZERO, Vec3::Y, Vec4::new(0.0, 1.0, 0.0, 1.0));
    renderer.draw_line(Vec3::ZERO, Vec3::Z, Vec4::new(0.0, 0.0, 1.0, 1.0));

    let draw_calls = renderer.last_frame().draw_calls as f32;
    let canvas = renderer.canvas();
    canvas.quad(Rect::new(8.0, 8.0, 204.0, 14.0), Vec4::new(0.0, 0.0, 0.0, 0.5));
    canvas.quad(
        Rect::new(10.0, 10.0, draw_calls.min(200.0), 10.0),
        Vec4::new(0.2, 0.8, 0.3, 0.9),
    );
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let resolution = &self.settings.resolution;
        let attributes = Window::default_attributes()
            .with_title("hybrid renderer")
            .with_inner_size(PhysicalSize::new(resolution.width, resolution.height));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                log::error!("Failed to create window: {}", err);
                event_loop.exit();
                return;
            }
        };

        if let Err(err) = self.init(window) {
            log::error!("{}", err);
            event_loop.exit();
            return;
        }

        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        if self.window.as_ref().map(|w| w.id()) != Some(id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    if let Err(err) = renderer.resize(size.width, size.height) {
                        log::error!("Resize failed: {}", err);
                        event_loop.exit();
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.redraw() {
                    log::error!("Frame failed: {}", err);
                    event_loop.exit();
                    return;
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key,
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => match logical_key {
                Key::Named(NamedKey::Escape) => event_loop.exit(),
                Key::Character(c) if c.as_str() == "p" => {
                    if let Some(renderer) = self.renderer.as_mut() {
                        let enabled = !renderer.post_processing();
                        renderer.set_post_processing(enabled);
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.shutdown();
        }
    }
}
