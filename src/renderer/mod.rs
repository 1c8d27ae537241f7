pub mod batch;
pub mod camera;
pub mod error;
pub mod gpu;
pub mod lights;
pub mod overlay;
pub mod passes;
pub mod pipeline;
pub mod programs;
pub mod renderer;
pub mod stats;
pub mod target;
pub mod targets;
pub mod uniforms;
pub mod vertex;

pub use batch::{Bucket, FrameBatch, FrameBatcher, InstanceData};
pub use camera::{Camera, CameraId, CameraRegistry, CameraState, Projection};
pub use error::RenderError;
pub use gpu::{GpuDevice, GpuError, HeadlessDevice, TextureId, WgpuDevice};
pub use lights::{Attenuation, Light, LightId, LightKind, LightLimits, LightRegistry};
pub use overlay::{Canvas, DebugLines, Rect};
pub use pipeline::RenderPipeline;
pub use renderer::Renderer;
pub use stats::FrameStats;
pub use target::{ColorFormat, RenderTarget, RenderTargetDesc};
pub use targets::{RenderTargetManager, TargetConfig};
pub use uniforms::{MAX_POINT_LIGHTS, MAX_SHADOW_POINT_LIGHTS};
pub use vertex::{InstanceRaw, Vertex};
