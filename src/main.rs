use hybrid_renderer::demo_scenes::{default_scene, DemoScene};

fn main() {
    let demo = match std::env::args().nth(1).as_deref() {
        Some("simple") => DemoScene::Simple,
        Some("shadows") | None => default_scene(),
        Some(other) => {
            eprintln!("Unknown scene '{other}', expected 'simple' or 'shadows'");
            std::process::exit(2);
        }
    };

    if let Err(err) = hybrid_renderer::run(demo) {
        eprintln!("Application error: {err}");
    }
}
