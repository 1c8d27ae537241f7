use std::collections::HashMap;

use super::error::RenderError;
use super::gpu::{GpuDevice, ProgramDesc, ProgramId};

/// Compiled programs by name. Programs are created on first use and kept for
/// the life of the pipeline.
#[derive(Default)]
pub struct ShaderPrograms {
    programs: HashMap<String, ProgramId>,
}

impl ShaderPrograms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<ProgramId> {
        self.programs.get(name).copied()
    }

    /// Returns the program named `name`, compiling `build()` when it does not
    /// exist yet. Compilation failures are fatal.
    pub fn get_or_create(
        &mut self,
        device: &mut dyn GpuDevice,
        name: &str,
        build: impl FnOnce() -> ProgramDesc,
    ) -> Result<ProgramId, RenderError> {
        if let Some(id) = self.programs.get(name) {
            return Ok(*id);
        }
        let mut desc = build();
        desc.name = name.to_owned();
        let id = device
            .create_program(&desc)
            .map_err(|err| RenderError::ProgramCreation {
                name: name.to_owned(),
                reason: err.to_string(),
            })?;
        log::debug!("Compiled program '{}'", name);
        self.programs.insert(name.to_owned(), id);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::gpu::HeadlessDevice;

    #[test]
    fn programs_are_compiled_once() {
        let mut device = HeadlessDevice::new(4, 4);
        let mut programs = ShaderPrograms::new();
        let build = || {
            ProgramDesc::new("", "").with_color_target(wgpu::TextureFormat::Rgba8Unorm, None)
        };

        let a = programs.get_or_create(&mut device, "post", build).unwrap();
        let b = programs.get_or_create(&mut device, "post", build).unwrap();
        assert_eq!(a, b);
        assert_eq!(device.program_count(), 1);
        assert_eq!(device.program_desc(a).unwrap().name, "post");
    }

    #[test]
    fn compile_failures_name_the_program() {
        let mut device = HeadlessDevice::new(4, 4);
        let mut programs = ShaderPrograms::new();
        let err = programs
            .get_or_create(&mut device, "broken", || ProgramDesc::new("", ""))
            .unwrap_err();
        assert!(matches!(err, RenderError::ProgramCreation { ref name, .. } if name == "broken"));
        assert!(programs.is_empty());
    }
}
