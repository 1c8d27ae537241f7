use std::fmt;

macro_rules! gpu_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

gpu_handle!(
    /// Texture owned by a device (or the device's surface image).
    TextureId
);
gpu_handle!(BufferId);
gpu_handle!(ProgramId);
gpu_handle!(
    /// A bound set of textures for one program group (a bind group in wgpu terms).
    TextureSetId
);

/// Device-level failures.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuError {
    /// No usable adapter, device or surface.
    Initialization(String),
    Validation(String),
    OutOfMemory(String),
    SurfaceLost,
    SurfaceOutdated,
    Timeout,
    UnknownResource(&'static str, u32),
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::Initialization(msg) => write!(f, "GPU initialization failed: {msg}"),
            GpuError::Validation(msg) => write!(f, "validation error: {msg}"),
            GpuError::OutOfMemory(msg) => write!(f, "out of GPU memory: {msg}"),
            GpuError::SurfaceLost => write!(f, "surface lost"),
            GpuError::SurfaceOutdated => write!(f, "surface outdated"),
            GpuError::Timeout => write!(f, "timed out acquiring surface texture"),
            GpuError::UnknownResource(kind, id) => write!(f, "unknown {kind} #{id}"),
        }
    }
}

impl std::error::Error for GpuError {}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub format: wgpu::TextureFormat,
    pub sample_count: u32,
    pub usage: wgpu::TextureUsages,
}

impl TextureDesc {
    pub fn new(label: impl Into<String>, width: u32, height: u32, format: wgpu::TextureFormat) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            layers: 1,
            format,
            sample_count: 1,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_depth(&self) -> bool {
        self.format.is_depth_stencil_format()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BufferDesc {
    pub label: String,
    pub size: u64,
    pub usage: wgpu::BufferUsages,
}

/// A view into one layer of a texture used as a pass attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentView {
    pub texture: TextureId,
    pub layer: u32,
}

impl From<TextureId> for AttachmentView {
    fn from(texture: TextureId) -> Self {
        Self { texture, layer: 0 }
    }
}

/// How a texture is exposed to a program's texture group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSlotKind {
    Color,
    Depth,
    DepthArray,
}

/// Vertex input shape of a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexLayout {
    /// Fullscreen passes generate positions from the vertex index.
    None,
    Mesh,
    MeshInstanced,
    Canvas,
    Line,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorTargetDesc {
    pub format: wgpu::TextureFormat,
    pub blend: Option<wgpu::BlendState>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthDesc {
    pub format: wgpu::TextureFormat,
    pub write: bool,
    pub compare: wgpu::CompareFunction,
    pub constant_bias: i32,
    pub slope_bias: f32,
}

/// Everything a backend needs to compile one program.
///
/// Group 0 is always the shared uniform group (frame block at binding 0, draw
/// block at binding 1). Each entry of `texture_groups` becomes group 1, 2, ...
/// with its textures at bindings `0..n`, a filtering sampler at `n` and a
/// comparison sampler at `n + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramDesc {
    pub name: String,
    pub source: &'static str,
    pub vertex_entry: &'static str,
    pub fragment_entry: Option<&'static str>,
    pub vertex_layout: VertexLayout,
    pub texture_groups: Vec<Vec<TextureSlotKind>>,
    pub color_targets: Vec<ColorTargetDesc>,
    pub depth: Option<DepthDesc>,
    pub sample_count: u32,
    pub topology: wgpu::PrimitiveTopology,
    pub cull_mode: Option<wgpu::Face>,
    pub polygon_mode: wgpu::PolygonMode,
}

impl ProgramDesc {
    pub fn new(name: impl Into<String>, source: &'static str) -> Self {
        Self {
            name: name.into(),
            source,
            vertex_entry: "vs_main",
            fragment_entry: Some("fs_main"),
            vertex_layout: VertexLayout::None,
            texture_groups: Vec::new(),
            color_targets: Vec::new(),
            depth: None,
            sample_count: 1,
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: Some(wgpu::Face::Back),
            polygon_mode: wgpu::PolygonMode::Fill,
        }
    }

    pub fn with_entries(mut self, vertex: &'static str, fragment: &'static str) -> Self {
        self.vertex_entry = vertex;
        self.fragment_entry = Some(fragment);
        self
    }

    /// Depth-only program (no fragment stage).
    pub fn depth_only(mut self) -> Self {
        self.fragment_entry = None;
        self
    }

    pub fn with_vertex_layout(mut self, layout: VertexLayout) -> Self {
        self.vertex_layout = layout;
        self
    }

    pub fn with_texture_group(mut self, slots: Vec<TextureSlotKind>) -> Self {
        self.texture_groups.push(slots);
        self
    }

    pub fn with_color_target(
        mut self,
        format: wgpu::TextureFormat,
        blend: Option<wgpu::BlendState>,
    ) -> Self {
        self.color_targets.push(ColorTargetDesc { format, blend });
        self
    }

    pub fn with_depth(
        mut self,
        format: wgpu::TextureFormat,
        write: bool,
        compare: wgpu::CompareFunction,
    ) -> Self {
        self.depth = Some(DepthDesc {
            format,
            write,
            compare,
            constant_bias: 0,
            slope_bias: 0.0,
        });
        self
    }

    /// Depth state with bias, for shadow casters.
    pub fn with_depth_biased(
        mut self,
        format: wgpu::TextureFormat,
        constant_bias: i32,
        slope_bias: f32,
    ) -> Self {
        self.depth = Some(DepthDesc {
            format,
            write: true,
            compare: wgpu::CompareFunction::LessEqual,
            constant_bias,
            slope_bias,
        });
        self
    }

    pub fn with_multisample(mut self, sample_count: u32) -> Self {
        self.sample_count = sample_count;
        self
    }

    pub fn with_cull_mode(mut self, cull_mode: Option<wgpu::Face>) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    pub fn with_topology(mut self, topology: wgpu::PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_polygon_mode(mut self, mode: wgpu::PolygonMode) -> Self {
        self.polygon_mode = mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_defaults_match_common_mesh_programs() {
        let desc = ProgramDesc::new("test", "");
        assert_eq!(desc.vertex_entry, "vs_main");
        assert_eq!(desc.fragment_entry, Some("fs_main"));
        assert_eq!(desc.cull_mode, Some(wgpu::Face::Back));
        assert_eq!(desc.sample_count, 1);
    }

    #[test]
    fn depth_only_drops_fragment_stage() {
        let desc = ProgramDesc::new("shadow", "")
            .depth_only()
            .with_depth_biased(wgpu::TextureFormat::Depth32Float, 2, 2.0);
        assert!(desc.fragment_entry.is_none());
        let depth = desc.depth.unwrap();
        assert!(depth.write);
        assert_eq!(depth.constant_bias, 2);
    }
}
