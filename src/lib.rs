pub mod app;
pub mod asset;
pub mod demo_scenes;
pub mod driver;
pub mod renderer;
pub mod scene;
pub mod settings;
pub mod time;

use app::App;
use demo_scenes::DemoScene;
use settings::RenderSettings;
use winit::event_loop::EventLoop;

/// Installs `env_logger`. `RUST_LOG` wins; without it the filter is `info`.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

pub fn run(demo: DemoScene) -> Result<(), winit::error::EventLoopError> {
    init_logging();

    log::info!("Starting hybrid renderer ({:?})", demo);

    let settings = RenderSettings::load();
    let event_loop = EventLoop::new()?;
    let mut app = App::new(settings, demo);

    let result = event_loop.run_app(&mut app);

    if let Err(ref err) = result {
        log::error!("Application error: {}", err);
    }

    log::info!("Application shutdown complete");

    result
}
