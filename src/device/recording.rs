//! A device that records commands instead of executing them.
//!
//! Programs still go through the real WGSL front-end, so compile and link
//! failures, reflection and uniform filtering behave as on the GPU.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::RttError;
use crate::shader::{self, ShaderInterface};

use super::{
    BufferId, DrawCall, ProgramDesc, ProgramId, RenderDevice, TextureDesc, TextureId,
    TextureRegion,
};

/// One call made on a [`RecordingDevice`].
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    CreateTexture(TextureId, TextureDesc),
    ResizeTexture(TextureId, u32, u32),
    WriteTexture(TextureId, TextureRegion),
    DestroyTexture(TextureId),
    CreateProgram(ProgramId),
    DestroyProgram(ProgramId),
    CreateBuffer(BufferId, usize),
    WriteBuffer(BufferId, usize),
    DestroyBuffer(BufferId),
    Clear(TextureId),
    Draw(DrawCall),
    Present,
}

#[derive(Debug)]
pub struct RecordingDevice {
    surface: (u32, u32),
    next_id: u32,
    textures: BTreeMap<TextureId, TextureDesc>,
    programs: BTreeMap<ProgramId, ShaderInterface>,
    buffers: BTreeMap<BufferId, Vec<f32>>,
    commands: Vec<Command>,
    texture_budget: Option<usize>,
    draw_budget: Option<usize>,
    failing_resizes: BTreeSet<TextureId>,
}

impl RecordingDevice {
    /// A device whose surface is `width` x `height`.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            surface: (width, height),
            next_id: 1,
            textures: BTreeMap::new(),
            programs: BTreeMap::new(),
            buffers: BTreeMap::new(),
            commands: Vec::new(),
            texture_budget: None,
            draw_budget: None,
            failing_resizes: BTreeSet::new(),
        }
    }

    /// Makes texture creation fail once `count` more textures exist.
    pub fn fail_texture_allocation_after(&mut self, count: usize) {
        self.texture_budget = Some(count);
    }

    /// Makes draws fail once `count` more draws were recorded.
    pub fn fail_draws_after(&mut self, count: usize) {
        self.draw_budget = Some(count);
    }

    /// Makes every resize of `id` fail.
    pub fn fail_resize_of(&mut self, id: TextureId) {
        self.failing_resizes.insert(id);
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Drains the command log.
    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn draws(&self) -> Vec<&DrawCall> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::Draw(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    pub fn presents(&self) -> usize {
        self.commands.iter().filter(|c| matches!(c, Command::Present)).count()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Live textures, programs and buffers.
    pub fn live_objects(&self) -> (usize, usize, usize) {
        (self.textures.len(), self.programs.len(), self.buffers.len())
    }

    pub fn texture_size(&self, id: TextureId) -> Option<(u32, u32)> {
        self.textures.get(&id).map(|d| (d.width, d.height))
    }

    pub fn texture_desc(&self, id: TextureId) -> Option<&TextureDesc> {
        self.textures.get(&id)
    }

    pub fn buffer_data(&self, id: BufferId) -> Option<&[f32]> {
        self.buffers.get(&id).map(Vec::as_slice)
    }
}

impl RenderDevice for RecordingDevice {
    fn surface_size(&self) -> (u32, u32) {
        self.surface
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        self.surface = (width, height);
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, RttError> {
        if let Some(budget) = self.texture_budget.as_mut() {
            if *budget == 0 {
                return Err(RttError::Device("out of texture memory".into()));
            }
            *budget -= 1;
        }
        let id = TextureId(self.next_id());
        self.textures.insert(id, *desc);
        self.commands.push(Command::CreateTexture(id, *desc));
        Ok(id)
    }

    fn resize_texture(&mut self, id: TextureId, width: u32, height: u32) -> Result<(), RttError> {
        let desc = self.textures.get_mut(&id).ok_or(RttError::UnknownTexture(id))?;
        if self.failing_resizes.contains(&id) {
            return Err(RttError::Device(format!("cannot reallocate {id:?}")));
        }
        desc.width = width;
        desc.height = height;
        self.commands.push(Command::ResizeTexture(id, width, height));
        Ok(())
    }

    fn write_texture(&mut self, id: TextureId, region: TextureRegion, data: &[f32]) -> Result<(), RttError> {
        let desc = self.textures.get(&id).ok_or(RttError::UnknownTexture(id))?;
        if region.x + region.width > desc.width || region.y + region.height > desc.height {
            return Err(RttError::Device(format!(
                "write of {region:?} exceeds {}x{} texture",
                desc.width, desc.height
            )));
        }
        let expected = (region.width * region.height * 4) as usize;
        if data.len() != expected {
            return Err(RttError::Device(format!(
                "write of {region:?} needs {expected} floats, got {}",
                data.len()
            )));
        }
        self.commands.push(Command::WriteTexture(id, region));
        Ok(())
    }

    fn destroy_texture(&mut self, id: TextureId) {
        if self.textures.remove(&id).is_some() {
            self.commands.push(Command::DestroyTexture(id));
        }
    }

    fn create_program(&mut self, desc: &ProgramDesc<'_>) -> Result<ProgramId, RttError> {
        let interface = shader::build_program(desc.vertex, desc.fragment)?;
        let id = ProgramId(self.next_id());
        self.programs.insert(id, interface);
        self.commands.push(Command::CreateProgram(id));
        Ok(id)
    }

    fn program_interface(&self, id: ProgramId) -> Option<&ShaderInterface> {
        self.programs.get(&id)
    }

    fn destroy_program(&mut self, id: ProgramId) {
        if self.programs.remove(&id).is_some() {
            self.commands.push(Command::DestroyProgram(id));
        }
    }

    fn create_buffer(&mut self, data: &[f32]) -> Result<BufferId, RttError> {
        let id = BufferId(self.next_id());
        self.buffers.insert(id, data.to_vec());
        self.commands.push(Command::CreateBuffer(id, data.len()));
        Ok(id)
    }

    fn write_buffer(&mut self, id: BufferId, data: &[f32]) -> Result<(), RttError> {
        let buffer = self.buffers.get_mut(&id).ok_or(RttError::UnknownBuffer(id))?;
        buffer.clear();
        buffer.extend_from_slice(data);
        self.commands.push(Command::WriteBuffer(id, data.len()));
        Ok(())
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        if self.buffers.remove(&id).is_some() {
            self.commands.push(Command::DestroyBuffer(id));
        }
    }

    fn clear(&mut self, target: TextureId) -> Result<(), RttError> {
        if !self.textures.contains_key(&target) {
            return Err(RttError::UnknownTexture(target));
        }
        self.commands.push(Command::Clear(target));
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall) -> Result<(), RttError> {
        if !self.programs.contains_key(&call.program) {
            return Err(RttError::UnknownProgram(call.program));
        }
        if let super::Target::Texture(id) = call.target {
            if !self.textures.contains_key(&id) {
                return Err(RttError::UnknownTexture(id));
            }
        }
        for attribute in &call.attributes {
            if !self.buffers.contains_key(&attribute.buffer) {
                return Err(RttError::UnknownBuffer(attribute.buffer));
            }
        }
        if let Some(budget) = self.draw_budget.as_mut() {
            if *budget == 0 {
                return Err(RttError::Device("device lost".into()));
            }
            *budget -= 1;
        }
        self.commands.push(Command::Draw(call.clone()));
        Ok(())
    }

    fn present(&mut self) {
        self.commands.push(Command::Present);
    }
}
