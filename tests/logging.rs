// Runs in its own test binary: the logger and the environment are global.

#[test]
fn rust_log_overrides_the_default_filter() {
    std::env::set_var("RUST_LOG", "debug");
    hybrid_renderer::init_logging();

    assert!(log::log_enabled!(log::Level::Debug));
    assert!(!log::log_enabled!(log::Level::Trace));
}
