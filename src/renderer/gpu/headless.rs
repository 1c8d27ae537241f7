use std::collections::HashMap;

use super::commands::{CommandList, GpuCommand, PassDesc};
use super::types::{
    BufferDesc, BufferId, GpuError, ProgramDesc, ProgramId, TextureDesc, TextureId, TextureSetId,
};
use super::GpuDevice;

/// What the recorder knows about a texture's contents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextureContent {
    Undefined,
    Cleared(wgpu::Color),
    Rendered,
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub label: &'static str,
    pub commands: Vec<GpuCommand>,
    pub uniform_bytes: usize,
}

impl Submission {
    pub fn pass_labels(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().filter_map(|cmd| match cmd {
            GpuCommand::BeginPass(desc) => Some(desc.label.as_str()),
            _ => None,
        })
    }

    pub fn draw_calls(&self) -> usize {
        self.commands
            .iter()
            .filter(|cmd| matches!(cmd, GpuCommand::Draw { .. } | GpuCommand::DrawIndexed { .. }))
            .count()
    }
}

struct HeadlessTexture {
    desc: TextureDesc,
    content: TextureContent,
}

struct HeadlessSet {
    program: ProgramId,
    textures: Vec<TextureId>,
}

/// A device with no GPU behind it. It tracks resources, validates the way a
/// driver would and records every submission.
pub struct HeadlessDevice {
    surface: TextureId,
    textures: HashMap<TextureId, HeadlessTexture>,
    buffers: HashMap<BufferId, BufferDesc>,
    programs: HashMap<ProgramId, ProgramDesc>,
    texture_sets: HashMap<TextureSetId, HeadlessSet>,
    next_id: u32,
    submissions: Vec<Submission>,
    errors: Vec<String>,
    fail_textures_matching: Option<String>,
    injected_error: Option<String>,
    lose_surface: bool,
    presented: u64,
}

impl HeadlessDevice {
    pub fn new(width: u32, height: u32) -> Self {
        let surface = TextureId(0);
        let mut textures = HashMap::new();
        let mut desc = TextureDesc::new(
            "surface",
            width.max(1),
            height.max(1),
            wgpu::TextureFormat::Bgra8UnormSrgb,
        );
        desc.usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
        textures.insert(
            surface,
            HeadlessTexture {
                desc,
                content: TextureContent::Undefined,
            },
        );

        Self {
            surface,
            textures,
            buffers: HashMap::new(),
            programs: HashMap::new(),
            texture_sets: HashMap::new(),
            next_id: 1,
            submissions: Vec::new(),
            errors: Vec::new(),
            fail_textures_matching: None,
            injected_error: None,
            lose_surface: false,
            presented: 0,
        }
    }

    /// Makes texture creation fail validation for labels containing `pattern`.
    pub fn fail_textures_matching(&mut self, pattern: impl Into<String>) {
        self.fail_textures_matching = Some(pattern.into());
    }

    pub fn clear_texture_failures(&mut self) {
        self.fail_textures_matching = None;
    }

    /// Reports a driver error on the next submission.
    pub fn inject_submit_error(&mut self, message: impl Into<String>) {
        self.injected_error = Some(message.into());
    }

    /// Makes the next `begin_frame` report a lost surface.
    pub fn lose_surface(&mut self) {
        self.lose_surface = true;
    }

    pub fn submissions(&self) -> &[Submission] {
        &self.submissions
    }

    pub fn clear_submissions(&mut self) {
        self.submissions.clear();
    }

    /// Labels of every render pass begun, in submission order.
    pub fn pass_labels(&self) -> Vec<String> {
        self.submissions
            .iter()
            .flat_map(|s| s.pass_labels().map(str::to_owned))
            .collect()
    }

    pub fn texture_content(&self, id: TextureId) -> Option<TextureContent> {
        self.textures.get(&id).map(|t| t.content)
    }

    pub fn live_textures(&self) -> usize {
        // The surface is not a live allocation.
        self.textures.len() - 1
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_texture_sets(&self) -> usize {
        self.texture_sets.len()
    }

    /// Texture sets still alive that reference a destroyed texture.
    pub fn dangling_texture_sets(&self) -> usize {
        self.texture_sets
            .values()
            .filter(|set| set.textures.iter().any(|id| !self.textures.contains_key(id)))
            .count()
    }

    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    pub fn program_desc(&self, id: ProgramId) -> Option<&ProgramDesc> {
        self.programs.get(&id)
    }

    pub fn presented_frames(&self) -> u64 {
        self.presented
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn validate_pass(&self, desc: &PassDesc) -> Result<(), String> {
        let mut size = None;
        let views = desc
            .color
            .iter()
            .flat_map(|c| std::iter::once(c.view).chain(c.resolve))
            .chain(desc.depth.map(|d| d.view));

        for view in views {
            let texture = self
                .textures
                .get(&view.texture)
                .ok_or_else(|| format!("attachment texture #{} does not exist", view.texture.0))?;
            if view.layer >= texture.desc.layers {
                return Err(format!(
                    "layer {} out of range for '{}' ({} layers)",
                    view.layer, texture.desc.label, texture.desc.layers
                ));
            }
            match size {
                None => size = Some(texture.desc.size()),
                Some(expected) if expected != texture.desc.size() => {
                    return Err(format!(
                        "attachment '{}' is {:?}, expected {:?}",
                        texture.desc.label,
                        texture.desc.size(),
                        expected
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn execute(&mut self, list: &CommandList) {
        let mut current: Option<&PassDesc> = None;
        let mut program_bound = false;

        for cmd in list.commands() {
            match cmd {
                GpuCommand::BeginPass(desc) => {
                    if let Err(err) = self.validate_pass(desc) {
                        self.errors.push(err);
                    }
                    for attachment in &desc.color {
                        if let (Some(clear), Some(texture)) =
                            (attachment.clear, self.textures.get_mut(&attachment.view.texture))
                        {
                            texture.content = TextureContent::Cleared(clear);
                        }
                    }
                    program_bound = false;
                    current = Some(desc);
                }
                GpuCommand::SetProgram(id) => {
                    if self.programs.contains_key(id) {
                        program_bound = true;
                    } else {
                        self.errors.push(format!("program #{} does not exist", id.0));
                    }
                }
                GpuCommand::BindTextures { set, .. } => {
                    if !self.texture_sets.contains_key(set) {
                        self.errors.push(format!("texture set #{} does not exist", set.0));
                    }
                }
                GpuCommand::SetVertexBuffer { buffer, .. } | GpuCommand::SetIndexBuffer(buffer) => {
                    if !self.buffers.contains_key(buffer) {
                        self.errors.push(format!("buffer #{} does not exist", buffer.0));
                    }
                }
                GpuCommand::Draw { .. } | GpuCommand::DrawIndexed { .. } => {
                    if !program_bound {
                        self.errors.push("draw issued without a program".into());
                    }
                    if let Some(desc) = current {
                        for attachment in &desc.color {
                            if let Some(texture) = self.textures.get_mut(&attachment.view.texture) {
                                texture.content = TextureContent::Rendered;
                            }
                        }
                    }
                }
                GpuCommand::EndPass => {
                    if let Some(desc) = current.take() {
                        for attachment in &desc.color {
                            if let Some(resolve) = attachment.resolve {
                                self.copy_content(attachment.view.texture, resolve.texture);
                            }
                        }
                    }
                }
                GpuCommand::Blit { src, dst } => self.copy_content(*src, *dst),
                GpuCommand::BindUniforms { .. } => {}
            }
        }
    }

    fn copy_content(&mut self, src: TextureId, dst: TextureId) {
        let Some(content) = self.textures.get(&src).map(|t| t.content) else {
            self.errors.push(format!("blit source #{} does not exist", src.0));
            return;
        };
        match self.textures.get_mut(&dst) {
            Some(texture) => texture.content = content,
            None => self
                .errors
                .push(format!("blit destination #{} does not exist", dst.0)),
        }
    }
}

impl GpuDevice for HeadlessDevice {
    fn backend_name(&self) -> &'static str {
        "headless"
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, GpuError> {
        if let Some(pattern) = &self.fail_textures_matching {
            if desc.label.contains(pattern.as_str()) {
                return Err(GpuError::Validation(format!(
                    "texture '{}' rejected by device",
                    desc.label
                )));
            }
        }
        if desc.width == 0 || desc.height == 0 || desc.layers == 0 {
            return Err(GpuError::Validation(format!(
                "texture '{}' has a zero dimension",
                desc.label
            )));
        }
        if !matches!(desc.sample_count, 1 | 2 | 4 | 8 | 16) {
            return Err(GpuError::Validation(format!(
                "texture '{}' has unsupported sample count {}",
                desc.label, desc.sample_count
            )));
        }

        let id = TextureId(self.allocate_id());
        self.textures.insert(
            id,
            HeadlessTexture {
                desc: desc.clone(),
                content: TextureContent::Undefined,
            },
        );
        Ok(id)
    }

    fn destroy_texture(&mut self, id: TextureId) {
        if id != self.surface {
            self.textures.remove(&id);
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
            .get_mut(&id)
            .ok_or(GpuError::UnknownResource("texture", id.0))?;
        let expected = bytes_per_row as usize * texture.desc.height as usize;
        if data.len() < expected {
            return Err(GpuError::Validation(format!(
                "texture '{}' upload of {} bytes, expected {}",
                texture.desc.label,
                data.len(),
                expected
            )));
        }
        texture.content = TextureContent::Rendered;
        Ok(())
    }

    fn texture_desc(&self, id: TextureId) -> Option<&TextureDesc> {
        self.textures.get(&id).map(|t| &t.desc)
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId, GpuError> {
        if desc.size == 0 {
            return Err(GpuError::Validation(format!(
                "buffer '{}' has zero size",
                desc.label
            )));
        }
        let id = BufferId(self.allocate_id());
        self.buffers.insert(id, desc.clone());
        Ok(id)
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        self.buffers.remove(&id);
    }

    fn write_buffer(&mut self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), GpuError> {
        let desc = self
            .buffers
            .get(&id)
            .ok_or(GpuError::UnknownResource("buffer", id.0))?;
        if offset + data.len() as u64 > desc.size {
            return Err(GpuError::Validation(format!(
                "write of {} bytes at {} overflows buffer '{}' ({} bytes)",
                data.len(),
                offset,
                desc.label,
                desc.size
            )));
        }
        Ok(())
    }

    fn create_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId, GpuError> {
        if desc.color_targets.is_empty() && desc.depth.is_none() {
            return Err(GpuError::Validation(format!(
                "program '{}' has no outputs",
                desc.name
            )));
        }
        let id = ProgramId(self.allocate_id());
        self.programs.insert(id, desc.clone());
        Ok(id)
    }

    fn create_texture_set(
        &mut self,
        program: ProgramId,
        group: u32,
        textures: &[TextureId],
    ) -> Result<TextureSetId, GpuError> {
        let desc = self
            .programs
            .get(&program)
            .ok_or(GpuError::UnknownResource("program", program.0))?;
        let slots = group
            .checked_sub(1)
            .and_then(|g| desc.texture_groups.get(g as usize))
            .ok_or_else(|| {
                GpuError::Validation(format!("program '{}' has no texture group {group}", desc.name))
            })?;
        if slots.len() != textures.len() {
            return Err(GpuError::Validation(format!(
                "program '{}' group {group} expects {} textures, got {}",
                desc.name,
                slots.len(),
                textures.len()
            )));
        }
        for id in textures {
            let texture = self
                .textures
                .get(id)
                .ok_or(GpuError::UnknownResource("texture", id.0))?;
            if !texture.desc.usage.contains(wgpu::TextureUsages::TEXTURE_BINDING) {
                return Err(GpuError::Validation(format!(
                    "texture '{}' is not sampleable",
                    texture.desc.label
                )));
            }
        }

        let id = TextureSetId(self.allocate_id());
        self.texture_sets.insert(
            id,
            HeadlessSet {
                program,
                textures: textures.to_vec(),
            },
        );
        Ok(id)
    }

    fn destroy_texture_set(&mut self, id: TextureSetId) {
        self.texture_sets.remove(&id);
    }

    fn surface_texture(&self) -> TextureId {
        self.surface
    }

    fn surface_format(&self) -> wgpu::TextureFormat {
        wgpu::TextureFormat::Bgra8UnormSrgb
    }

    fn surface_size(&self) -> (u32, u32) {
        self.textures
            .get(&self.surface)
            .map(|t| t.desc.size())
            .unwrap_or((1, 1))
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        if let Some(surface) = self.textures.get_mut(&self.surface) {
            surface.desc.width = width.max(1);
            surface.desc.height = height.max(1);
            surface.content = TextureContent::Undefined;
        }
    }

    fn begin_frame(&mut self) -> Result<(), GpuError> {
        if std::mem::take(&mut self.lose_surface) {
            return Err(GpuError::SurfaceLost);
        }
        if let Some(surface) = self.textures.get_mut(&self.surface) {
            surface.content = TextureContent::Undefined;
        }
        Ok(())
    }

    fn present(&mut self) {
        self.presented += 1;
    }

    fn submit(&mut self, list: &CommandList) {
        // Texture sets must still reference live textures.
        let stale: Vec<TextureSetId> = self
            .texture_sets
            .iter()
            .filter(|(_, set)| set.textures.iter().any(|t| !self.textures.contains_key(t)))
            .map(|(id, _)| *id)
            .collect();
        for cmd in list.commands() {
            if let GpuCommand::BindTextures { set, .. } = cmd {
                if stale.contains(set) {
                    let program = self
                        .texture_sets
                        .get(set)
                        .and_then(|s| self.programs.get(&s.program))
                        .map(|p| p.name.as_str())
                        .unwrap_or("?");
                    self.errors.push(format!(
                        "texture set #{} for '{program}' references a destroyed texture",
                        set.0
                    ));
                }
            }
        }

        self.execute(list);
        if let Some(message) = self.injected_error.take() {
            self.errors.push(message);
        }
        self.submissions.push(Submission {
            label: list.label(),
            commands: list.commands().to_vec(),
            uniform_bytes: list.uniform_bytes().len(),
        });
    }

    fn take_errors(&mut self) -> Vec<String> {
        std::mem::take(&mut self.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::gpu::{ColorAttachment, TextureSlotKind};

    fn color_texture(device: &mut HeadlessDevice, label: &str, w: u32, h: u32) -> TextureId {
        let mut desc = TextureDesc::new(label, w, h, wgpu::TextureFormat::Rgba8Unorm);
        desc.usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        device.create_texture(&desc).unwrap()
    }

    fn clear_pass(label: &str, target: TextureId, color: wgpu::Color) -> PassDesc {
        PassDesc {
            label: label.into(),
            color: vec![ColorAttachment {
                view: target.into(),
                resolve: None,
                clear: Some(color),
            }],
            depth: None,
        }
    }

    #[test]
    fn clear_and_blit_track_contents() {
        let mut device = HeadlessDevice::new(64, 64);
        let a = color_texture(&mut device, "a", 64, 64);
        let b = color_texture(&mut device, "b", 64, 64);

        let mut list = CommandList::new("Test");
        drop(list.begin_pass(clear_pass("clear", a, wgpu::Color::RED)));
        list.blit(a, b);
        device.submit(&list);

        assert_eq!(
            device.texture_content(b),
            Some(TextureContent::Cleared(wgpu::Color::RED))
        );
        assert!(device.take_errors().is_empty());
    }

    #[test]
    fn mismatched_attachment_sizes_are_reported() {
        let mut device = HeadlessDevice::new(64, 64);
        let a = color_texture(&mut device, "a", 64, 64);
        let b = color_texture(&mut device, "b", 32, 32);

        let mut desc = clear_pass("mixed", a, wgpu::Color::BLACK);
        desc.color.push(ColorAttachment {
            view: b.into(),
            resolve: None,
            clear: None,
        });
        let mut list = CommandList::new("Test");
        drop(list.begin_pass(desc));
        device.submit(&list);

        let errors = device.take_errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("'b'"));
    }

    #[test]
    fn labelled_texture_failures_are_injected() {
        let mut device = HeadlessDevice::new(8, 8);
        device.fail_textures_matching("gbuffer");
        let desc = TextureDesc::new("gbuffer.normal", 8, 8, wgpu::TextureFormat::Rgba16Float);
        assert!(matches!(
            device.create_texture(&desc),
            Err(GpuError::Validation(_))
        ));
    }

    #[test]
    fn texture_sets_require_sampleable_textures() {
        let mut device = HeadlessDevice::new(8, 8);
        let program = device
            .create_program(
                &ProgramDesc::new("post", "")
                    .with_color_target(wgpu::TextureFormat::Rgba8Unorm, None)
                    .with_texture_group(vec![TextureSlotKind::Color]),
            )
            .unwrap();
        let surface = device.surface_texture();
        assert!(device.create_texture_set(program, 1, &[surface]).is_err());

        let sampled = color_texture(&mut device, "sampled", 8, 8);
        assert!(device.create_texture_set(program, 1, &[sampled]).is_ok());
        assert!(device.create_texture_set(program, 2, &[sampled]).is_err());
    }
}
