/// What the last frame did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStats {
    pub frame_index: u64,
    /// Passes invoked this frame, in execution order.
    pub passes: Vec<&'static str>,
    pub draw_calls: usize,
    pub instances: usize,
    pub buckets: usize,
    pub shadow_slots_used: usize,
    /// Shadow-casting point lights left without a shadow slot.
    pub unshadowed_casters: usize,
    pub canvas_quads: usize,
    pub debug_lines: usize,
    /// Driver errors logged during the frame.
    pub gpu_errors: usize,
    /// The frame was skipped because the surface could not be acquired.
    pub skipped: bool,
}

impl FrameStats {
    pub fn ran(&self, pass: &str) -> bool {
        self.passes.iter().any(|p| *p == pass)
    }
}
