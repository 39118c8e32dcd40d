//! Render devices and the per-frame draw loop.
//!
//! [`RenderDevice`] is an immediate-style seam: callers bind a program, a
//! mesh and a texture, write uniforms, then issue draws. Backends snapshot the
//! bound program's uniform block at each draw and replay the queued draws
//! when the frame is presented.

use std::fmt;

use log::warn;

use crate::error::RenderError;
use crate::geometry::Primitive;
use crate::shader::{LinkedProgram, ProgramHandle, UniformValue};
use crate::texture::{TextureImage, TextureSlot};

pub mod frame;
pub mod headless;
pub mod mesh;
pub mod native;
pub mod shared;

pub use frame::{FrameRenderer, FrameState, FrameStats, FrameView, SceneDraw};
pub use headless::{DrawCommand, HeadlessDevice};
pub use mesh::{MeshHandle, MeshId, SceneMeshes};
pub use native::WgpuDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(u32);

impl TextureHandle {
    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TextureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "texture#{}", self.0)
    }
}

/// The operations the frame loop needs from a graphics backend.
///
/// Handles are only valid for the device that created them. Releasing a
/// handle twice logs a warning and is otherwise ignored.
pub trait RenderDevice {
    fn create_mesh(&mut self, primitive: &Primitive) -> Result<MeshHandle, RenderError>;
    fn destroy_mesh(&mut self, mesh: MeshHandle);

    fn create_texture(
        &mut self,
        slot: TextureSlot,
        image: &TextureImage,
    ) -> Result<TextureHandle, RenderError>;
    fn destroy_texture(&mut self, texture: TextureHandle);

    fn create_program(&mut self, program: LinkedProgram) -> Result<ProgramHandle, RenderError>;
    fn destroy_program(&mut self, program: ProgramHandle);

    /// Writes a uniform of `program`. Names the program does not declare are ignored.
    fn set_uniform(&mut self, program: ProgramHandle, name: &str, value: UniformValue);

    fn viewport_size(&self) -> (u32, u32);

    fn clear(&mut self, color: [f32; 4]);
    fn use_program(&mut self, program: ProgramHandle);
    fn bind_mesh(&mut self, mesh: MeshHandle);
    /// Binds a texture for subsequent draws; `None` binds the default white texture.
    fn bind_texture(&mut self, texture: Option<TextureHandle>);
    fn draw_triangles(&mut self, vertex_count: u32);

    /// Submits the queued draws and waits for the frame to be shown.
    fn present(&mut self) -> Result<(), RenderError>;
}

/// A draw captured with everything needed to replay it.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedDraw {
    pub program: ProgramHandle,
    pub mesh: MeshHandle,
    pub texture: Option<TextureHandle>,
    pub vertex_count: u32,
    pub uniforms: Vec<u8>,
}

/// Bind state and draws collected between two presents.
#[derive(Debug, Default)]
pub struct FrameQueue {
    clear_color: Option<[f32; 4]>,
    program: Option<ProgramHandle>,
    mesh: Option<MeshHandle>,
    texture: Option<TextureHandle>,
    draws: Vec<QueuedDraw>,
}

impl FrameQueue {
    pub fn clear(&mut self, color: [f32; 4]) {
        self.clear_color = Some(color);
        self.draws.clear();
    }

    pub fn use_program(&mut self, program: ProgramHandle) {
        self.program = Some(program);
    }

    pub fn bind_mesh(&mut self, mesh: MeshHandle) {
        self.mesh = Some(mesh);
    }

    pub fn bind_texture(&mut self, texture: Option<TextureHandle>) {
        self.texture = texture;
    }

    pub fn program(&self) -> Option<ProgramHandle> {
        self.program
    }

    /// Queues a draw against the current bindings, clamped to the mesh's vertex count.
    pub fn push(&mut self, vertex_count: u32, uniforms: &[u8]) -> Option<&QueuedDraw> {
        let (Some(program), Some(mesh)) = (self.program, self.mesh) else {
            warn!("draw issued without a bound program and mesh; skipped");
            return None;
        };
        self.draws.push(QueuedDraw {
            program,
            mesh,
            texture: self.texture,
            vertex_count: vertex_count.min(mesh.vertex_count),
            uniforms: uniforms.to_vec(),
        });
        self.draws.last()
    }

    /// Drops bindings that refer to a released resource.
    pub fn forget_program(&mut self, program: ProgramHandle) {
        if self.program == Some(program) {
            self.program = None;
        }
        self.draws.retain(|draw| draw.program != program);
    }

    pub fn forget_mesh(&mut self, mesh: MeshId) {
        if self.mesh.is_some_and(|bound| bound.id == mesh) {
            self.mesh = None;
        }
        self.draws.retain(|draw| draw.mesh.id != mesh);
    }

    pub fn forget_texture(&mut self, texture: TextureHandle) {
        if self.texture == Some(texture) {
            self.texture = None;
        }
        for draw in &mut self.draws {
            if draw.texture == Some(texture) {
                draw.texture = None;
            }
        }
    }

    /// Takes the clear color and queued draws, leaving bindings in place.
    pub fn take(&mut self) -> (Option<[f32; 4]>, Vec<QueuedDraw>) {
        (self.clear_color.take(), std::mem::take(&mut self.draws))
    }
}

/// Monotonic id source shared by the backends' resource tables.
#[derive(Debug)]
pub(crate) struct IdAllocator(u32);

impl Default for IdAllocator {
    fn default() -> Self {
        Self(1)
    }
}

impl IdAllocator {
    pub(crate) fn mesh(&mut self) -> MeshId {
        MeshId(self.next())
    }

    pub(crate) fn texture(&mut self) -> TextureHandle {
        TextureHandle(self.next())
    }

    fn next(&mut self) -> u32 {
        let id = self.0;
        self.0 += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::VertexLayout;

    fn mesh(id: u32, vertex_count: u32) -> MeshHandle {
        MeshHandle::new(MeshId(id), vertex_count, VertexLayout::PositionNormalUv)
    }

    #[test]
    fn draws_need_program_and_mesh() {
        let mut queue = FrameQueue::default();
        assert!(queue.push(3, &[]).is_none());
        queue.bind_mesh(mesh(1, 6));
        assert!(queue.push(3, &[]).is_none());
    }

    #[test]
    fn queued_draw_captures_bindings_and_clamps_count() {
        let mut allocator = IdAllocator::default();
        let texture = allocator.texture();
        let mut queue = FrameQueue::default();
        queue.clear([0.0, 0.0, 0.0, 1.0]);
        queue.use_program(crate::shader::ProgramHandle::for_tests(7));
        queue.bind_mesh(mesh(2, 6));
        queue.bind_texture(Some(texture));

        let draw = queue.push(600, &[1, 2, 3, 4]).cloned().unwrap();
        assert_eq!(draw.vertex_count, 6);
        assert_eq!(draw.texture, Some(texture));
        assert_eq!(draw.uniforms, vec![1, 2, 3, 4]);

        queue.forget_texture(texture);
        let (clear, draws) = queue.take();
        assert_eq!(clear, Some([0.0, 0.0, 0.0, 1.0]));
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].texture, None);
        assert!(queue.take().1.is_empty());
    }
}
