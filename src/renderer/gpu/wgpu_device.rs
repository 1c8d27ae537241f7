use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;

use winit::window::Window;

use super::commands::{CommandList, GpuCommand, PassDesc, MAX_UNIFORM_BLOCK};
use super::types::{
    AttachmentView, BufferDesc, BufferId, GpuError, ProgramDesc, ProgramId, TextureDesc,
    TextureId, TextureSetId, TextureSlotKind, VertexLayout,
};
use super::GpuDevice;
use crate::renderer::vertex::{CanvasVertex, InstanceRaw, LineVertex, Vertex};
use crate::settings::RenderSettings;

const SURFACE_ID: TextureId = TextureId(0);
const INITIAL_UNIFORM_CAPACITY: u64 = 64 * 1024;

struct WgpuTexture {
    texture: wgpu::Texture,
    desc: TextureDesc,
    layer_views: Vec<wgpu::TextureView>,
}

struct WgpuProgram {
    name: String,
    pipeline: wgpu::RenderPipeline,
    texture_layouts: Vec<(wgpu::BindGroupLayout, Vec<TextureSlotKind>)>,
}

struct UniformArena {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    capacity: u64,
}

struct Blitter {
    shader: wgpu::ShaderModule,
    single_layout: wgpu::BindGroupLayout,
    multisampled_layout: wgpu::BindGroupLayout,
    pipelines: HashMap<(wgpu::TextureFormat, bool), wgpu::RenderPipeline>,
}

/// wgpu-backed device rendering into a window surface.
pub struct WgpuDevice {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    surface_desc: TextureDesc,
    frame: Option<(wgpu::SurfaceTexture, wgpu::TextureView)>,
    textures: HashMap<TextureId, WgpuTexture>,
    buffers: HashMap<BufferId, (wgpu::Buffer, BufferDesc)>,
    programs: HashMap<ProgramId, WgpuProgram>,
    texture_sets: HashMap<TextureSetId, wgpu::BindGroup>,
    uniform_layout: wgpu::BindGroupLayout,
    uniforms: UniformArena,
    linear_sampler: wgpu::Sampler,
    shadow_sampler: wgpu::Sampler,
    blitter: Blitter,
    next_id: u32,
    errors: Vec<String>,
}

impl WgpuDevice {
    pub async fn new(window: Arc<Window>, settings: &RenderSettings) -> Result<Self, GpuError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window)
            .map_err(|err| GpuError::Initialization(format!("surface: {err}")))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|err| GpuError::Initialization(format!("adapter: {err}")))?;

        log::info!("Using adapter: {:?}", adapter.get_info());

        let mut required_features = wgpu::Features::empty();
        if adapter.features().contains(wgpu::Features::POLYGON_MODE_LINE) {
            required_features |= wgpu::Features::POLYGON_MODE_LINE;
        } else {
            log::warn!("Wireframe fill mode not supported; wireframe materials render solid");
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Device"),
                required_features,
                required_limits: wgpu::Limits::default(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|err| GpuError::Initialization(format!("device: {err}")))?;

        let surface_caps = surface.get_capabilities(&adapter);
        let format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| GpuError::Initialization("surface has no formats".into()))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: settings.present_mode(&surface_caps.present_modes),
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        log::info!(
            "Surface configured: {}x{} {:?} {:?}",
            config.width,
            config.height,
            config.format,
            config.present_mode
        );

        let mut surface_desc = TextureDesc::new("surface", config.width, config.height, format);
        surface_desc.usage = wgpu::TextureUsages::RENDER_ATTACHMENT;

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("UniformArenaLayout"),
            entries: &[uniform_entry(0), uniform_entry(1)],
        });
        let uniforms = UniformArena::new(&device, &uniform_layout, INITIAL_UNIFORM_CAPACITY);

        let linear_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("LinearSampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("ShadowSampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            lod_min_clamp: 0.0,
            lod_max_clamp: 1.0,
            ..Default::default()
        });

        let blitter = Blitter::new(&device);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            surface_desc,
            frame: None,
            textures: HashMap::new(),
            buffers: HashMap::new(),
            programs: HashMap::new(),
            texture_sets: HashMap::new(),
            uniform_layout,
            uniforms,
            linear_sampler,
            shadow_sampler,
            blitter,
            next_id: 1,
            errors: Vec::new(),
        })
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn attachment_view(&self, view: AttachmentView) -> Result<&wgpu::TextureView, String> {
        if view.texture == SURFACE_ID {
            return self
                .frame
                .as_ref()
                .map(|(_, view)| view)
                .ok_or_else(|| "surface image not acquired".to_string());
        }
        let texture = self
            .textures
            .get(&view.texture)
            .ok_or_else(|| format!("texture #{} does not exist", view.texture.0))?;
        texture.layer_views.get(view.layer as usize).ok_or_else(|| {
            format!(
                "layer {} out of range for '{}'",
                view.layer, texture.desc.label
            )
        })
    }

    fn texture_info(&self, id: TextureId) -> Option<&TextureDesc> {
        if id == SURFACE_ID {
            Some(&self.surface_desc)
        } else {
            self.textures.get(&id).map(|t| &t.desc)
        }
    }

    fn ensure_uniform_capacity(&mut self, used: u64) {
        let required = used + MAX_UNIFORM_BLOCK as u64;
        if required <= self.uniforms.capacity {
            return;
        }
        let capacity = required.next_power_of_two();
        log::debug!("Growing uniform arena to {} bytes", capacity);
        self.uniforms = UniformArena::new(&self.device, &self.uniform_layout, capacity);
    }

    fn encode(&mut self, list: &CommandList) {
        if !list.uniform_bytes().is_empty() {
            self.ensure_uniform_capacity(list.uniform_bytes().len() as u64);
            self.queue
                .write_buffer(&self.uniforms.buffer, 0, list.uniform_bytes());
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(list.label()),
            });

        let commands = list.commands();
        let mut index = 0;
        while index < commands.len() {
            match &commands[index] {
                GpuCommand::BeginPass(desc) => {
                    let end = commands[index + 1..]
                        .iter()
                        .position(|cmd| matches!(cmd, GpuCommand::EndPass))
                        .map(|offset| index + 1 + offset)
                        .unwrap_or(commands.len());
                    if let Err(err) = self.encode_pass(&mut encoder, desc, &commands[index + 1..end]) {
                        self.errors.push(format!("{}: {err}", desc.label));
                    }
                    index = end + 1;
                }
                GpuCommand::Blit { src, dst } => {
                    if let Err(err) = self.encode_blit(&mut encoder, *src, *dst) {
                        self.errors.push(format!("blit: {err}"));
                    }
                    index += 1;
                }
                other => {
                    self.errors
                        .push(format!("{other:?} recorded outside of a render pass"));
                    index += 1;
                }
            }
        }

        self.queue.submit(Some(encoder.finish()));
    }

    fn encode_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        desc: &PassDesc,
        body: &[GpuCommand],
    ) -> Result<(), String> {
        let mut color_attachments = Vec::with_capacity(desc.color.len());
        for attachment in &desc.color {
            let view = self.attachment_view(attachment.view)?;
            let resolve_target = match attachment.resolve {
                Some(resolve) => Some(self.attachment_view(resolve)?),
                None => None,
            };
            color_attachments.push(Some(wgpu::RenderPassColorAttachment {
                view,
                depth_slice: None,
                resolve_target,
                ops: wgpu::Operations {
                    load: match attachment.clear {
                        Some(color) => wgpu::LoadOp::Clear(color),
                        None => wgpu::LoadOp::Load,
                    },
                    store: wgpu::StoreOp::Store,
                },
            }));
        }

        let depth_stencil_attachment = match desc.depth {
            Some(depth) => {
                let has_stencil = self
                    .texture_info(depth.view.texture)
                    .map(|d| d.format.has_stencil_aspect())
                    .unwrap_or(false);
                let load = |clear: Option<f32>| match clear {
                    Some(value) => wgpu::LoadOp::Clear(value),
                    None => wgpu::LoadOp::Load,
                };
                Some(wgpu::RenderPassDepthStencilAttachment {
                    view: self.attachment_view(depth.view)?,
                    depth_ops: Some(wgpu::Operations {
                        load: load(depth.clear),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: has_stencil.then_some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(0),
                        store: wgpu::StoreOp::Store,
                    }),
                })
            }
            None => None,
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&desc.label),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for cmd in body {
            match cmd {
                GpuCommand::SetProgram(id) => {
                    let program = self
                        .programs
                        .get(id)
                        .ok_or_else(|| format!("program #{} does not exist", id.0))?;
                    pass.set_pipeline(&program.pipeline);
                }
                GpuCommand::BindUniforms { frame, draw } => {
                    pass.set_bind_group(0, &self.uniforms.bind_group, &[*frame, *draw]);
                }
                GpuCommand::BindTextures { group, set } => {
                    let bind_group = self
                        .texture_sets
                        .get(set)
                        .ok_or_else(|| format!("texture set #{} does not exist", set.0))?;
                    pass.set_bind_group(*group, bind_group, &[]);
                }
                GpuCommand::SetVertexBuffer { slot, buffer } => {
                    let (buffer, _) = self
                        .buffers
                        .get(buffer)
                        .ok_or_else(|| format!("buffer #{} does not exist", buffer.0))?;
                    pass.set_vertex_buffer(*slot, buffer.slice(..));
                }
                GpuCommand::SetIndexBuffer(buffer) => {
                    let (buffer, _) = self
                        .buffers
                        .get(buffer)
                        .ok_or_else(|| format!("buffer #{} does not exist", buffer.0))?;
                    pass.set_index_buffer(buffer.slice(..), wgpu::IndexFormat::Uint32);
                }
                GpuCommand::Draw {
                    vertices,
                    instances,
                } => pass.draw(vertices.clone(), instances.clone()),
                GpuCommand::DrawIndexed { indices, instances } => {
                    pass.draw_indexed(indices.clone(), 0, instances.clone())
                }
                GpuCommand::BeginPass(_) | GpuCommand::EndPass | GpuCommand::Blit { .. } => {
                    return Err(format!("{cmd:?} is not allowed inside a render pass"));
                }
            }
        }

        Ok(())
    }

    fn encode_blit(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        src: TextureId,
        dst: TextureId,
    ) -> Result<(), String> {
        let src_desc = self
            .texture_info(src)
            .cloned()
            .ok_or_else(|| format!("source texture #{} does not exist", src.0))?;
        let dst_desc = self
            .texture_info(dst)
            .cloned()
            .ok_or_else(|| format!("destination texture #{} does not exist", dst.0))?;
        let multisampled = src_desc.sample_count > 1;

        if multisampled && src_desc.format == dst_desc.format && dst_desc.sample_count == 1 {
            // Same format: let the hardware resolve.
            let view = self.attachment_view(src.into())?;
            let resolve_target = self.attachment_view(dst.into())?;
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Resolve"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    depth_slice: None,
                    resolve_target: Some(resolve_target),
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            return Ok(());
        }

        self.blitter
            .ensure_pipeline(&self.device, dst_desc.format, multisampled);

        let source = self
            .textures
            .get(&src)
            .ok_or_else(|| "the surface cannot be a blit source".to_string())?;
        let source_view = source.texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_array_layer: 0,
            array_layer_count: Some(1),
            ..Default::default()
        });
        let (layout, binding) = if multisampled {
            (&self.blitter.multisampled_layout, 1)
        } else {
            (&self.blitter.single_layout, 0)
        };
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("BlitBindGroup"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::TextureView(&source_view),
            }],
        });
        let pipeline = self
            .blitter
            .pipelines
            .get(&(dst_desc.format, multisampled))
            .ok_or_else(|| "blit pipeline missing".to_string())?;

        let target = self.attachment_view(dst.into())?;
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Blit"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
        Ok(())
    }

    fn build_program(
        &self,
        desc: &ProgramDesc,
        polygon_mode: wgpu::PolygonMode,
    ) -> WgpuProgram {
        let shader = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&desc.name),
                source: wgpu::ShaderSource::Wgsl(desc.source.into()),
            });

        let texture_layouts: Vec<(wgpu::BindGroupLayout, Vec<TextureSlotKind>)> = desc
            .texture_groups
            .iter()
            .enumerate()
            .map(|(group, slots)| {
                let label = format!("{}TextureGroup{}", desc.name, group + 1);
                (texture_group_layout(&self.device, &label, slots), slots.clone())
            })
            .collect();

        let mut bind_group_layouts = vec![&self.uniform_layout];
        bind_group_layouts.extend(texture_layouts.iter().map(|(layout, _)| layout));

        let layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&desc.name),
                bind_group_layouts: &bind_group_layouts,
                push_constant_ranges: &[],
            });

        let vertex_buffers = match desc.vertex_layout {
            VertexLayout::None => vec![],
            VertexLayout::Mesh => vec![Vertex::layout()],
            VertexLayout::MeshInstanced => vec![Vertex::layout(), InstanceRaw::layout()],
            VertexLayout::Canvas => vec![CanvasVertex::layout()],
            VertexLayout::Line => vec![LineVertex::layout()],
        };

        let color_targets: Vec<Option<wgpu::ColorTargetState>> = desc
            .color_targets
            .iter()
            .map(|target| {
                Some(wgpu::ColorTargetState {
                    format: target.format,
                    blend: target.blend,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&desc.name),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some(desc.vertex_entry),
                    buffers: &vertex_buffers,
                    compilation_options: Default::default(),
                },
                fragment: desc.fragment_entry.map(|entry| wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some(entry),
                    targets: &color_targets,
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: desc.topology,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: desc.cull_mode,
                    polygon_mode,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: desc.depth.map(|depth| wgpu::DepthStencilState {
                    format: depth.format,
                    depth_write_enabled: depth.write,
                    depth_compare: depth.compare,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState {
                        constant: depth.constant_bias,
                        slope_scale: depth.slope_bias,
                        clamp: 0.0,
                    },
                }),
                multisample: wgpu::MultisampleState {
                    count: desc.sample_count,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview: None,
                cache: None,
            });

        WgpuProgram {
            name: desc.name.clone(),
            pipeline,
            texture_layouts,
        }
    }
}

impl GpuDevice for WgpuDevice {
    fn backend_name(&self) -> &'static str {
        "wgpu"
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, GpuError> {
        let texture = scoped(&self.device, &desc.label, || {
            self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&desc.label),
                size: wgpu::Extent3d {
                    width: desc.width,
                    height: desc.height,
                    depth_or_array_layers: desc.layers,
                },
                mip_level_count: 1,
                sample_count: desc.sample_count,
                dimension: wgpu::TextureDimension::D2,
                format: desc.format,
                usage: desc.usage,
                view_formats: &[],
            })
        })?;

        let layer_views = (0..desc.layers)
            .map(|layer| {
                texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some(&format!("{}Layer{layer}", desc.label)),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_array_layer: layer,
                    array_layer_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();

        let id = TextureId(self.allocate_id());
        log::debug!(
            "Created texture '{}' #{} {}x{}x{} {:?} samples={}",
            desc.label,
            id.0,
            desc.width,
            desc.height,
            desc.layers,
            desc.format,
            desc.sample_count
        );
        self.textures.insert(
            id,
            WgpuTexture {
                texture,
                desc: desc.clone(),
                layer_views,
            },
        );
        Ok(id)
    }

    fn destroy_texture(&mut self, id: TextureId) {
        if let Some(texture) = self.textures.remove(&id) {
            texture.texture.destroy();
        }
    }

    fn write_texture(
        &mut self,
        id: TextureId,
        data: &[u8],
        bytes_per_row: u32,
    ) -> Result<(), GpuError> {
        let texture = self
            .textures
            .get(&id)
            .ok_or(GpuError::UnknownResource("texture", id.0))?;
        scoped(&self.device, &texture.desc.label, || {
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                data,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(texture.desc.height),
                },
                wgpu::Extent3d {
                    width: texture.desc.width,
                    height: texture.desc.height,
                    depth_or_array_layers: 1,
                },
            )
        })
    }

    fn texture_desc(&self, id: TextureId) -> Option<&TextureDesc> {
        self.texture_info(id)
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId, GpuError> {
        let buffer = scoped(&self.device, &desc.label, || {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&desc.label),
                size: desc.size,
                usage: desc.usage | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        })?;
        let id = BufferId(self.allocate_id());
        self.buffers.insert(id, (buffer, desc.clone()));
        Ok(id)
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        if let Some((buffer, _)) = self.buffers.remove(&id) {
            buffer.destroy();
        }
    }

    fn write_buffer(&mut self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), GpuError> {
        let (buffer, desc) = self
            .buffers
            .get(&id)
            .ok_or(GpuError::UnknownResource("buffer", id.0))?;
        if offset + data.len() as u64 > desc.size {
            return Err(GpuError::Validation(format!(
                "write of {} bytes at {} overflows buffer '{}'",
                data.len(),
                offset,
                desc.label
            )));
        }
        self.queue.write_buffer(buffer, offset, data);
        Ok(())
    }

    fn create_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId, GpuError> {
        let mut polygon_mode = desc.polygon_mode;
        if polygon_mode != wgpu::PolygonMode::Fill
            && !self
                .device
                .features()
                .contains(wgpu::Features::POLYGON_MODE_LINE)
        {
            log::warn!("Program '{}' falls back to solid fill", desc.name);
            polygon_mode = wgpu::PolygonMode::Fill;
        }

        let program = scoped(&self.device, &desc.name, || {
            self.build_program(desc, polygon_mode)
        })?;
        let id = ProgramId(self.allocate_id());
        self.programs.insert(id, program);
        Ok(id)
    }

    fn create_texture_set(
        &mut self,
        program: ProgramId,
        group: u32,
        textures: &[TextureId],
    ) -> Result<TextureSetId, GpuError> {
        let program = self
            .programs
            .get(&program)
            .ok_or(GpuError::UnknownResource("program", program.0))?;
        let (layout, slots) = group
            .checked_sub(1)
            .and_then(|g| program.texture_layouts.get(g as usize))
            .ok_or_else(|| {
                GpuError::Validation(format!(
                    "program '{}' has no texture group {group}",
                    program.name
                ))
            })?;
        if slots.len() != textures.len() {
            return Err(GpuError::Validation(format!(
                "program '{}' group {group} expects {} textures, got {}",
                program.name,
                slots.len(),
                textures.len()
            )));
        }

        let mut views = Vec::with_capacity(textures.len());
        for (id, kind) in textures.iter().zip(slots) {
            let texture = self
                .textures
                .get(id)
                .ok_or(GpuError::UnknownResource("texture", id.0))?;
            let dimension = match kind {
                TextureSlotKind::Color | TextureSlotKind::Depth => {
                    wgpu::TextureViewDimension::D2
                }
                TextureSlotKind::DepthArray => wgpu::TextureViewDimension::D2Array,
            };
            views.push(texture.texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some(&texture.desc.label),
                dimension: Some(dimension),
                base_array_layer: 0,
                array_layer_count: Some(match kind {
                    TextureSlotKind::DepthArray => texture.desc.layers,
                    _ => 1,
                }),
                ..Default::default()
            }));
        }

        let mut entries: Vec<wgpu::BindGroupEntry> = views
            .iter()
            .enumerate()
            .map(|(binding, view)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: wgpu::BindingResource::TextureView(view),
            })
            .collect();
        entries.push(wgpu::BindGroupEntry {
            binding: views.len() as u32,
            resource: wgpu::BindingResource::Sampler(&self.linear_sampler),
        });
        entries.push(wgpu::BindGroupEntry {
            binding: views.len() as u32 + 1,
            resource: wgpu::BindingResource::Sampler(&self.shadow_sampler),
        });

        let bind_group = scoped(&self.device, &program.name, || {
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&program.name),
                layout,
                entries: &entries,
            })
        })?;
        let id = TextureSetId(self.allocate_id());
        self.texture_sets.insert(id, bind_group);
        Ok(id)
    }

    fn destroy_texture_set(&mut self, id: TextureSetId) {
        self.texture_sets.remove(&id);
    }

    fn surface_texture(&self) -> TextureId {
        SURFACE_ID
    }

    fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        self.frame = None;
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.surface.configure(&self.device, &self.config);
        self.surface_desc.width = self.config.width;
        self.surface_desc.height = self.config.height;
    }

    fn begin_frame(&mut self) -> Result<(), GpuError> {
        match self.surface.get_current_texture() {
            Ok(frame) => {
                let view = frame
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                self.frame = Some((frame, view));
                Ok(())
            }
            Err(wgpu::SurfaceError::Lost) => {
                self.surface.configure(&self.device, &self.config);
                Err(GpuError::SurfaceLost)
            }
            Err(wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                Err(GpuError::SurfaceOutdated)
            }
            Err(wgpu::SurfaceError::Timeout) => Err(GpuError::Timeout),
            Err(wgpu::SurfaceError::OutOfMemory) => {
                Err(GpuError::OutOfMemory("surface image".into()))
            }
            Err(err) => Err(GpuError::Validation(err.to_string())),
        }
    }

    fn present(&mut self) {
        if let Some((frame, view)) = self.frame.take() {
            drop(view);
            frame.present();
        }
    }

    fn submit(&mut self, list: &CommandList) {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.encode(list);
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            self.errors.push(err.to_string());
        }
    }

    fn take_errors(&mut self) -> Vec<String> {
        std::mem::take(&mut self.errors)
    }
}

impl UniformArena {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, capacity: u64) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("UniformArena"),
            size: capacity,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let binding = |binding| wgpu::BindGroupEntry {
            binding,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &buffer,
                offset: 0,
                size: NonZeroU64::new(MAX_UNIFORM_BLOCK as u64),
            }),
        };
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("UniformArenaBindGroup"),
            layout,
            entries: &[binding(0), binding(1)],
        });
        Self {
            buffer,
            bind_group,
            capacity,
        }
    }
}

impl Blitter {
    fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("BlitShader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../shader/blit.wgsl").into()),
        });
        let layout = |binding, multisampled| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("BlitLayout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled,
                    },
                    count: None,
                }],
            })
        };
        Self {
            single_layout: layout(0, false),
            multisampled_layout: layout(1, true),
            shader,
            pipelines: HashMap::new(),
        }
    }

    fn ensure_pipeline(&mut self, device: &wgpu::Device, format: wgpu::TextureFormat, multisampled: bool) {
        if self.pipelines.contains_key(&(format, multisampled)) {
            return;
        }
        let (layout, entry) = if multisampled {
            (&self.multisampled_layout, "fs_blit_ms")
        } else {
            (&self.single_layout, "fs_blit")
        };
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("BlitPipelineLayout"),
            bind_group_layouts: &[layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("BlitPipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &self.shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &self.shader,
                entry_point: Some(entry),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        self.pipelines.insert((format, multisampled), pipeline);
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: true,
            min_binding_size: NonZeroU64::new(MAX_UNIFORM_BLOCK as u64),
        },
        count: None,
    }
}

fn texture_group_layout(
    device: &wgpu::Device,
    label: &str,
    slots: &[TextureSlotKind],
) -> wgpu::BindGroupLayout {
    let mut entries: Vec<wgpu::BindGroupLayoutEntry> = slots
        .iter()
        .enumerate()
        .map(|(binding, kind)| {
            let (sample_type, view_dimension) = match kind {
                TextureSlotKind::Color => (
                    wgpu::TextureSampleType::Float { filterable: true },
                    wgpu::TextureViewDimension::D2,
                ),
                TextureSlotKind::Depth => (
                    wgpu::TextureSampleType::Depth,
                    wgpu::TextureViewDimension::D2,
                ),
                TextureSlotKind::DepthArray => (
                    wgpu::TextureSampleType::Depth,
                    wgpu::TextureViewDimension::D2Array,
                ),
            };
            wgpu::BindGroupLayoutEntry {
                binding: binding as u32,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type,
                    view_dimension,
                    multisampled: false,
                },
                count: None,
            }
        })
        .collect();
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: slots.len() as u32,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    });
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: slots.len() as u32 + 1,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
        count: None,
    });

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &entries,
    })
}

/// Runs `f` inside validation and out-of-memory error scopes.
fn scoped<T>(device: &wgpu::Device, what: &str, f: impl FnOnce() -> T) -> Result<T, GpuError> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = f();
    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());

    if let Some(err) = validation {
        return Err(GpuError::Validation(format!("{what}: {err}")));
    }
    if let Some(err) = out_of_memory {
        return Err(GpuError::OutOfMemory(format!("{what}: {err}")));
    }
    Ok(value)
}
