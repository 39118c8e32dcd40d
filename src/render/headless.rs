use std::collections::HashMap;

use log::{debug, warn};

use crate::error::RenderError;
use crate::geometry::{Primitive, PrimitiveId};
use crate::render::{
    FrameQueue, IdAllocator, MeshHandle, MeshId, QueuedDraw, RenderDevice, TextureHandle,
};
use crate::shader::{LinkedProgram, ProgramHandle, ProgramTable, UniformValue};
use crate::texture::{TextureImage, TextureSlot};

/// One entry of the command stream recorded by [`HeadlessDevice`].
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Clear([f32; 4]),
    UseProgram(ProgramHandle),
    BindMesh(MeshHandle),
    BindTexture(Option<TextureHandle>),
    Draw(QueuedDraw),
    Present,
}

/// A device without a GPU that records what it is asked to do.
///
/// Used by `--summary-only` and by tests to inspect draw order, uniform
/// snapshots and resource lifetimes.
#[derive(Debug)]
pub struct HeadlessDevice {
    size: (u32, u32),
    ids: IdAllocator,
    meshes: HashMap<MeshId, PrimitiveId>,
    textures: HashMap<TextureHandle, TextureSlot>,
    programs: ProgramTable<()>,
    queue: FrameQueue,
    commands: Vec<DrawCommand>,
    frames_presented: u64,
    lost: Option<String>,
}

impl HeadlessDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width.max(1), height.max(1)),
            ids: IdAllocator::default(),
            meshes: HashMap::new(),
            textures: HashMap::new(),
            programs: ProgramTable::default(),
            queue: FrameQueue::default(),
            commands: Vec::new(),
            frames_presented: 0,
            lost: None,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.size = (width, height);
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<DrawCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Draws recorded since the last [`take_commands`](Self::take_commands).
    pub fn draws(&self) -> impl Iterator<Item = &QueuedDraw> {
        self.commands.iter().filter_map(|command| match command {
            DrawCommand::Draw(draw) => Some(draw),
            _ => None,
        })
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn live_meshes(&self) -> usize {
        self.meshes.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn mesh_primitive(&self, mesh: MeshId) -> Option<PrimitiveId> {
        self.meshes.get(&mesh).copied()
    }

    pub fn texture_slot(&self, texture: TextureHandle) -> Option<TextureSlot> {
        self.textures.get(&texture).copied()
    }

    /// Current value of a program's uniform, as the next draw would see it.
    pub fn uniform(&self, program: ProgramHandle, name: &str) -> Option<UniformValue> {
        self.programs.get(program)?.uniforms.get(name)
    }

    pub fn program_label(&self, program: ProgramHandle) -> Option<&str> {
        Some(self.programs.get(program)?.program.label())
    }

    /// Makes every later present fail as if the GPU went away.
    pub fn lose_device(&mut self, reason: impl Into<String>) {
        self.lost = Some(reason.into());
    }
}

impl RenderDevice for HeadlessDevice {
    fn create_mesh(&mut self, primitive: &Primitive) -> Result<MeshHandle, RenderError> {
        let id = self.ids.mesh();
        let byte_len = std::mem::size_of_val(primitive.vertices()) as u64;
        let handle = MeshHandle::from_byte_len(id, byte_len, primitive.layout());
        self.meshes.insert(id, primitive.id());
        debug!("created {id} for {} ({} vertices)", primitive.id(), handle.vertex_count);
        Ok(handle)
    }

    fn destroy_mesh(&mut self, mesh: MeshHandle) {
        if self.meshes.remove(&mesh.id).is_none() {
            warn!("{} released twice", mesh.id);
        }
        self.queue.forget_mesh(mesh.id);
    }

    fn create_texture(
        &mut self,
        slot: TextureSlot,
        image: &TextureImage,
    ) -> Result<TextureHandle, RenderError> {
        let handle = self.ids.texture();
        debug!("created {handle} for {slot} ({}x{})", image.width, image.height);
        self.textures.insert(handle, slot);
        Ok(handle)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(&texture).is_none() {
            warn!("{texture} released twice");
        }
        self.queue.forget_texture(texture);
    }

    fn create_program(&mut self, program: LinkedProgram) -> Result<ProgramHandle, RenderError> {
        Ok(self.programs.insert(program, ()))
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        if self.programs.remove(program).is_none() {
            warn!("{program} released twice");
        }
        self.queue.forget_program(program);
    }

    fn set_uniform(&mut self, program: ProgramHandle, name: &str, value: UniformValue) {
        self.programs.set_uniform(program, name, value);
    }

    fn viewport_size(&self) -> (u32, u32) {
        self.size
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.queue.clear(color);
        self.commands.push(DrawCommand::Clear(color));
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.queue.use_program(program);
        self.commands.push(DrawCommand::UseProgram(program));
    }

    fn bind_mesh(&mut self, mesh: MeshHandle) {
        self.queue.bind_mesh(mesh);
        self.commands.push(DrawCommand::BindMesh(mesh));
    }

    fn bind_texture(&mut self, texture: Option<TextureHandle>) {
        self.queue.bind_texture(texture);
        self.commands.push(DrawCommand::BindTexture(texture));
    }

    fn draw_triangles(&mut self, vertex_count: u32) {
        let Some(slot) = self.queue.program().and_then(|program| self.programs.get(program)) else {
            warn!("draw issued without a live program; skipped");
            return;
        };
        if let Some(draw) = self.queue.push(vertex_count, slot.uniforms.bytes()) {
            self.commands.push(DrawCommand::Draw(draw.clone()));
        }
    }

    fn present(&mut self) -> Result<(), RenderError> {
        if let Some(reason) = &self.lost {
            return Err(RenderError::DeviceLost(reason.clone()));
        }
        self.queue.take();
        self.frames_presented += 1;
        self.commands.push(DrawCommand::Present);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::GeometryCatalog;
    use crate::render::shared::{lamp_fragment_source, lamp_vertex_source};
    use crate::shader::compile_and_link;
    use glam::Mat4;

    #[test]
    fn draws_snapshot_uniforms_at_draw_time() {
        let catalog = GeometryCatalog::still_life();
        let mut device = HeadlessDevice::new(640, 480);
        let lamp = compile_and_link("lamp", lamp_vertex_source(), lamp_fragment_source()).unwrap();
        let program = device.create_program(lamp).unwrap();
        let mesh = device.create_mesh(catalog.get(PrimitiveId::LightMarker)).unwrap();

        device.clear([0.0; 4]);
        device.use_program(program);
        device.bind_mesh(mesh);
        device.set_uniform(program, "model", Mat4::from_scale(glam::Vec3::splat(2.0)).into());
        device.draw_triangles(mesh.vertex_count);
        device.set_uniform(program, "model", Mat4::IDENTITY.into());
        device.draw_triangles(mesh.vertex_count);
        device.present().unwrap();

        let draws: Vec<_> = device.draws().cloned().collect();
        assert_eq!(draws.len(), 2);
        assert_ne!(draws[0].uniforms, draws[1].uniforms);
        assert_eq!(draws[0].vertex_count, 36);
        assert_eq!(device.frames_presented(), 1);
    }

    #[test]
    fn double_release_is_ignored() {
        let catalog = GeometryCatalog::still_life();
        let mut device = HeadlessDevice::new(1, 1);
        let mesh = device.create_mesh(catalog.get(PrimitiveId::Plane)).unwrap();
        let texture = device.create_texture(TextureSlot::Plane, &TextureImage::white()).unwrap();
        device.destroy_mesh(mesh);
        device.destroy_mesh(mesh);
        device.destroy_texture(texture);
        device.destroy_texture(texture);
        assert_eq!(device.live_meshes(), 0);
        assert_eq!(device.live_textures(), 0);
    }

    #[test]
    fn lost_device_fails_present() {
        let mut device = HeadlessDevice::new(10, 10);
        device.lose_device("adapter removed");
        let err = device.present().unwrap_err();
        assert!(matches!(err, RenderError::DeviceLost(ref reason) if reason == "adapter removed"));
    }
}
