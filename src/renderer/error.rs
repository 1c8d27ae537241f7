use std::fmt;

use super::gpu::GpuError;

/// Failures surfaced by [`Renderer`](super::Renderer).
#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    /// A render target could not be created completely.
    TargetValidation { target: String, reason: String },
    ProgramCreation { name: String, reason: String },
    /// A pass was asked to draw a mesh that was never uploaded.
    MeshNotUploaded { mesh: usize },
    /// `render` was called before `create_targets` or after `destroy_targets`.
    TargetsMissing,
    Gpu(GpuError),
}

impl RenderError {
    /// Fatal errors unwind out of the frame and must stop the frame loop.
    /// Everything else is logged and the frame is skipped.
    pub fn is_fatal(&self) -> bool {
        match self {
            RenderError::Gpu(GpuError::SurfaceLost)
            | RenderError::Gpu(GpuError::SurfaceOutdated)
            | RenderError::Gpu(GpuError::Timeout) => false,
            _ => true,
        }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::TargetValidation { target, reason } => {
                write!(f, "render target '{target}' failed validation: {reason}")
            }
            RenderError::ProgramCreation { name, reason } => {
                write!(f, "shader program '{name}' could not be created: {reason}")
            }
            RenderError::MeshNotUploaded { mesh } => {
                write!(f, "mesh #{mesh} was drawn before being uploaded to the GPU")
            }
            RenderError::TargetsMissing => write!(f, "render targets have not been created"),
            RenderError::Gpu(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Gpu(err) => Some(err),
            _ => None,
        }
    }
}

impl From<GpuError> for RenderError {
    fn from(err: GpuError) -> Self {
        RenderError::Gpu(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_problems_are_not_fatal() {
        assert!(!RenderError::Gpu(GpuError::SurfaceLost).is_fatal());
        assert!(!RenderError::Gpu(GpuError::Timeout).is_fatal());
        assert!(RenderError::MeshNotUploaded { mesh: 3 }.is_fatal());
        assert!(RenderError::Gpu(GpuError::OutOfMemory("atlas".into())).is_fatal());
    }

    #[test]
    fn display_names_the_target() {
        let err = RenderError::TargetValidation {
            target: "gbuffer".into(),
            reason: "no attachments".into(),
        };
        assert_eq!(
            err.to_string(),
            "render target 'gbuffer' failed validation: no attachments"
        );
    }
}
